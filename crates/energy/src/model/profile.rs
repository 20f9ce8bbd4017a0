//! Per-meter, per-day energy profiles.

use super::{Readings, Samples, SharedReadings, ZeroedReadingsCache};
use crate::error::{EnergyError, Result};
use chrono::NaiveDate;
use std::sync::Arc;

/// The kW in and kW out readings of one meter for one date.
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::model::{Channel, EnergyProfile, Readings, ZeroedReadingsCache};
/// use chrono::NaiveDate;
/// use std::sync::Arc;
///
/// let zeroes = ZeroedReadingsCache::new();
/// let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// let kw_in = Arc::new(Readings::one(Channel::double(&[1.0, 2.0])));
/// let profile = EnergyProfile::new("meter-1", date, Some(kw_in), None, false, &zeroes)?;
/// assert!(profile.kw_out().is_missing());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnergyProfile {
    id: String,
    date: NaiveDate,
    kw_in: SharedReadings,
    kw_out: SharedReadings,
    cacheable: bool,
}

impl EnergyProfile {
    /// Creates a profile.
    ///
    /// An absent side is filled with the missing marker of the other side's
    /// length; when both are absent the empty readings is used for both.
    ///
    /// # Errors
    ///
    /// Returns [`EnergyError::ReadingsLengthMismatch`] when both sides are
    /// present with different lengths.
    pub fn new(
        id: impl Into<String>,
        date: NaiveDate,
        kw_in: Option<SharedReadings>,
        kw_out: Option<SharedReadings>,
        cacheable: bool,
        zeroes: &ZeroedReadingsCache,
    ) -> Result<Self> {
        let (kw_in, kw_out) = match (kw_in, kw_out) {
            (None, None) => (zeroes.empty_readings(), zeroes.empty_readings()),
            (None, Some(kw_out)) => (zeroes.missing_readings(kw_out.len()), kw_out),
            (Some(kw_in), None) => {
                let kw_out = zeroes.missing_readings(kw_in.len());
                (kw_in, kw_out)
            }
            (Some(kw_in), Some(kw_out)) => (kw_in, kw_out),
        };
        if kw_in.len() != kw_out.len() {
            return Err(EnergyError::ReadingsLengthMismatch {
                kw_in: kw_in.len(),
                kw_out: kw_out.len(),
            });
        }
        Ok(Self {
            id: id.into(),
            date,
            kw_in,
            kw_out,
            cacheable,
        })
    }

    /// Meter identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Date the readings belong to.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Energy imported, per interval.
    pub fn kw_in(&self) -> &SharedReadings {
        &self.kw_in
    }

    /// Energy exported, per interval.
    pub fn kw_out(&self) -> &SharedReadings {
        &self.kw_out
    }

    /// Whether downstream consumers may cache this profile.
    pub fn cacheable(&self) -> bool {
        self.cacheable
    }

    /// Number of intervals.
    pub fn len(&self) -> usize {
        self.kw_in.len()
    }

    /// Returns true for a profile without intervals.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazy `kw_in - kw_out` view, computed per index.
    pub fn kw_net(&self) -> NetReadings<'_> {
        NetReadings {
            kw_in: &self.kw_in,
            kw_out: &self.kw_out,
        }
    }

    /// Returns a copy of this profile with a different cacheable flag.
    pub fn with_cacheable(&self, cacheable: bool) -> Self {
        Self {
            id: self.id.clone(),
            date: self.date,
            kw_in: Arc::clone(&self.kw_in),
            kw_out: Arc::clone(&self.kw_out),
            cacheable,
        }
    }
}

/// Net energy view over a profile's readings.
#[derive(Debug, Clone, Copy)]
pub struct NetReadings<'a> {
    kw_in: &'a Readings,
    kw_out: &'a Readings,
}

impl Samples for NetReadings<'_> {
    fn len(&self) -> usize {
        self.kw_in.len()
    }

    fn sample(&self, index: usize) -> Option<f64> {
        Some(self.kw_in.sample(index)? - self.kw_out.sample(index)?)
    }
}
