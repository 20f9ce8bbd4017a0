//! A single sequence of interval samples.

use super::{canonical_bits, Samples};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A channel shared between readings values.
pub type SharedChannel = Arc<Channel>;

/// Storage precision for decoded or constructed channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPrecision {
    /// 64-bit samples (default).
    #[default]
    Double,
    /// 32-bit samples; values are rounded to single precision on the way in.
    Float,
}

impl ChannelPrecision {
    /// Builds a channel holding `values` at this precision.
    pub fn channel(self, values: &[f64]) -> Channel {
        match self {
            Self::Double => Channel::double(values),
            Self::Float => Channel::float(values),
        }
    }
}

#[derive(Debug, Clone)]
enum Repr {
    Double(Box<[f64]>),
    Float(Box<[f32]>),
    Zeroed(usize),
}

/// An immutable, ordered sequence of samples.
///
/// Equality and hashing look only at the sample values, never at the
/// representation, so a double and a float channel holding the same values
/// compare equal.
#[derive(Debug, Clone)]
pub struct Channel {
    repr: Repr,
}

impl Channel {
    /// Creates a double precision channel.
    pub fn double(values: &[f64]) -> Self {
        Self {
            repr: Repr::Double(values.into()),
        }
    }

    /// Creates a single precision channel.
    pub fn float(values: &[f64]) -> Self {
        Self {
            repr: Repr::Float(values.iter().map(|&v| v as f32).collect()),
        }
    }

    /// Creates an all-zero channel of `len` samples without storing them.
    ///
    /// Prefer [`ZeroedReadingsCache::zeroed_channel`](super::ZeroedReadingsCache::zeroed_channel),
    /// which shares one instance per length.
    pub(crate) fn zeroed(len: usize) -> Self {
        Self {
            repr: Repr::Zeroed(len),
        }
    }

    /// Returns the precision this channel stores its samples in.
    ///
    /// Zeroed channels report [`ChannelPrecision::Double`].
    pub fn precision(&self) -> ChannelPrecision {
        match self.repr {
            Repr::Float(_) => ChannelPrecision::Float,
            Repr::Double(_) | Repr::Zeroed(_) => ChannelPrecision::Double,
        }
    }

    /// Returns true for the shared all-zero representation.
    pub fn is_zeroed(&self) -> bool {
        matches!(self.repr, Repr::Zeroed(_))
    }
}

impl Samples for Channel {
    fn len(&self) -> usize {
        match &self.repr {
            Repr::Double(values) => values.len(),
            Repr::Float(values) => values.len(),
            Repr::Zeroed(len) => *len,
        }
    }

    fn sample(&self, index: usize) -> Option<f64> {
        match &self.repr {
            Repr::Double(values) => values.get(index).copied(),
            Repr::Float(values) => values.get(index).map(|&v| f64::from(v)),
            Repr::Zeroed(len) => (index < *len).then_some(0.0),
        }
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.values_eq(other)
    }
}

impl Eq for Channel {}

impl Hash for Channel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for value in self.iter() {
            canonical_bits(value).hash(state);
        }
    }
}
