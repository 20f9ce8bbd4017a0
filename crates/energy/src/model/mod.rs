//! Immutable value types for interval energy readings.
//!
//! - [`Channel`]: one sequence of interval samples
//! - [`Readings`]: one or more equal-length channels, or the missing marker
//! - [`EnergyProfile`]: a meter's kW in / kW out readings for one date
//! - [`EnergyProfileStat`]: max/min/average summary of a profile
//! - [`IdDateRange`]: the dates covered by a meter in the index
//! - [`ZeroedReadingsCache`]: shared all-zero and missing instances

pub mod channel;
pub mod date_range;
pub mod profile;
pub mod readings;
pub mod stat;
pub mod zeroed;

pub use channel::{Channel, ChannelPrecision, SharedChannel};
pub use date_range::IdDateRange;
pub use profile::{EnergyProfile, NetReadings};
pub use readings::{Readings, SharedReadings};
pub use stat::EnergyProfileStat;
pub use zeroed::ZeroedReadingsCache;

use crate::error::{EnergyError, Result};

/// A finite sequence of floating point samples.
///
/// Implementors supply [`Samples::len`] and [`Samples::sample`]; everything
/// else is derived from those two.
pub trait Samples {
    /// Number of samples.
    fn len(&self) -> usize;

    /// Returns the sample at `index`, or `None` past the end.
    fn sample(&self, index: usize) -> Option<f64>;

    /// Returns true when there are no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sample at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`EnergyError::IndexOutOfBounds`] past the end.
    fn get(&self, index: usize) -> Result<f64> {
        self.sample(index).ok_or(EnergyError::IndexOutOfBounds {
            index,
            len: self.len(),
        })
    }

    /// Iterates over the samples in order.
    fn iter(&self) -> SampleIter<'_, Self>
    where
        Self: Sized,
    {
        SampleIter {
            samples: self,
            index: 0,
        }
    }

    /// Largest sample. NaN samples never replace the running maximum
    /// unless the first sample is NaN.
    fn max(&self) -> Result<f64> {
        fold_extreme(self, "max", |candidate, current| candidate > current)
    }

    /// Smallest sample, with the same NaN handling as [`Samples::max`].
    fn min(&self) -> Result<f64> {
        fold_extreme(self, "min", |candidate, current| candidate < current)
    }

    /// Compares two sample sequences by value.
    ///
    /// NaN equals NaN and `0.0` equals `-0.0`.
    fn values_eq(&self, other: &dyn Samples) -> bool {
        if self.len() != other.len() {
            return false;
        }
        (0..self.len()).all(|i| match (self.sample(i), other.sample(i)) {
            (Some(a), Some(b)) => same_value(a, b),
            _ => false,
        })
    }
}

fn fold_extreme<S: Samples + ?Sized>(
    samples: &S,
    what: &'static str,
    replaces: impl Fn(f64, f64) -> bool,
) -> Result<f64> {
    let mut current = samples.sample(0).ok_or(EnergyError::EmptySamples(what))?;
    for i in 1..samples.len() {
        if let Some(value) = samples.sample(i) {
            if replaces(value, current) {
                current = value;
            }
        }
    }
    Ok(current)
}

/// Value equality for samples: NaN equals NaN, signed zeros are equal.
pub(crate) fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Bit pattern used for hashing; every NaN hashes alike, as do both zeros.
pub(crate) fn canonical_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Iterator over a [`Samples`] sequence.
#[derive(Debug)]
pub struct SampleIter<'a, S: ?Sized> {
    samples: &'a S,
    index: usize,
}

impl<S: Samples + ?Sized> Iterator for SampleIter<'_, S> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let value = self.samples.sample(self.index)?;
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.samples.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<S: Samples + ?Sized> ExactSizeIterator for SampleIter<'_, S> {}
