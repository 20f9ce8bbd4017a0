//! Multi-channel interval readings.

use super::{Samples, SharedChannel};
use crate::error::{EnergyError, Result};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Readings shared between profiles and caches.
pub type SharedReadings = Arc<Readings>;

#[derive(Debug, Clone)]
enum Repr {
    One(SharedChannel),
    Multi(Box<[SharedChannel]>),
    Zeroed {
        num_channels: usize,
        channel: SharedChannel,
    },
    Missing(SharedChannel),
}

/// One or more equal-length channels of interval samples.
///
/// Channels are numbered from 1. [`Samples::get`] on readings returns the
/// sum of every channel at that index.
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::model::{Channel, Readings, Samples};
/// use std::sync::Arc;
///
/// let readings = Readings::of(vec![
///     Arc::new(Channel::double(&[1.0, 2.0])),
///     Arc::new(Channel::double(&[0.5, 0.5])),
/// ])?;
/// assert_eq!(readings.get(1)?, 2.5);
/// ```
#[derive(Debug, Clone)]
pub struct Readings {
    repr: Repr,
}

impl Readings {
    /// Creates single-channel readings.
    pub fn one(channel: impl Into<SharedChannel>) -> Self {
        Self {
            repr: Repr::One(channel.into()),
        }
    }

    /// Creates readings from two or more channels.
    ///
    /// # Errors
    ///
    /// Fails on an empty list, a single channel, or channels of different
    /// lengths.
    pub fn multi(channels: Vec<SharedChannel>) -> Result<Self> {
        match channels.len() {
            0 => return Err(EnergyError::NoChannels),
            1 => return Err(EnergyError::SingleChannel),
            _ => {}
        }
        let expected = channels[0].len();
        if let Some(bad) = channels.iter().find(|c| c.len() != expected) {
            return Err(EnergyError::UnequalChannelLengths {
                expected,
                actual: bad.len(),
            });
        }
        Ok(Self {
            repr: Repr::Multi(channels.into_boxed_slice()),
        })
    }

    /// Creates readings from any non-empty list of channels, picking the
    /// single or multi-channel form.
    pub fn of(mut channels: Vec<SharedChannel>) -> Result<Self> {
        match channels.len() {
            0 => Err(EnergyError::NoChannels),
            1 => Ok(Self::one(channels.remove(0))),
            _ => Self::multi(channels),
        }
    }

    pub(crate) fn zeroed(num_channels: usize, channel: SharedChannel) -> Self {
        Self {
            repr: Repr::Zeroed {
                num_channels,
                channel,
            },
        }
    }

    pub(crate) fn missing(channel: SharedChannel) -> Self {
        Self {
            repr: Repr::Missing(channel),
        }
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        match &self.repr {
            Repr::One(_) | Repr::Missing(_) => 1,
            Repr::Multi(channels) => channels.len(),
            Repr::Zeroed { num_channels, .. } => *num_channels,
        }
    }

    /// Returns the channel with the 1-based number `channel`.
    pub fn channel(&self, channel: usize) -> Result<&SharedChannel> {
        let num_channels = self.num_channels();
        if channel < 1 || channel > num_channels {
            return Err(EnergyError::ChannelOutOfRange {
                channel,
                num_channels,
            });
        }
        Ok(self.channel_at(channel - 1))
    }

    /// Iterates over the channels in channel-number order.
    pub fn channels(&self) -> impl Iterator<Item = &SharedChannel> + '_ {
        (0..self.num_channels()).map(move |i| self.channel_at(i))
    }

    fn channel_at(&self, index: usize) -> &SharedChannel {
        match &self.repr {
            Repr::One(channel) | Repr::Missing(channel) => channel,
            Repr::Multi(channels) => &channels[index],
            Repr::Zeroed { channel, .. } => channel,
        }
    }

    /// Returns true for the marker that stands in for readings that were never
    /// recorded. Missing readings hold zeros but never equal real zero readings.
    pub fn is_missing(&self) -> bool {
        matches!(self.repr, Repr::Missing(_))
    }

    /// Returns true when every channel is the shared all-zero channel.
    pub fn is_zeroed(&self) -> bool {
        matches!(self.repr, Repr::Zeroed { .. })
    }
}

impl Samples for Readings {
    fn len(&self) -> usize {
        self.channel_at(0).len()
    }

    fn sample(&self, index: usize) -> Option<f64> {
        match &self.repr {
            Repr::One(channel) | Repr::Missing(channel) => channel.sample(index),
            Repr::Zeroed { channel, .. } => channel.sample(index),
            Repr::Multi(channels) => channels
                .iter()
                .try_fold(0.0, |sum, c| c.sample(index).map(|v| sum + v)),
        }
    }
}

impl PartialEq for Readings {
    fn eq(&self, other: &Self) -> bool {
        self.is_missing() == other.is_missing()
            && self.num_channels() == other.num_channels()
            && self.channels().zip(other.channels()).all(|(a, b)| a == b)
    }
}

impl Eq for Readings {}

impl Hash for Readings {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_missing().hash(state);
        self.num_channels().hash(state);
        for channel in self.channels() {
            channel.hash(state);
        }
    }
}
