//! Summary statistics of an energy profile.

use super::{EnergyProfile, Samples};
use crate::error::{EnergyError, Result};

/// A kW in / kW out / kW net triple, typically the max, min or mean of a
/// profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyProfileStat {
    /// Energy imported.
    pub kw_in: f64,
    /// Energy exported.
    pub kw_out: f64,
    /// `kw_in - kw_out`.
    pub kw_net: f64,
}

/// Per-output counts of non-NaN samples.
struct Counts {
    kw_in: usize,
    kw_out: usize,
    kw_net: usize,
}

impl EnergyProfileStat {
    /// Creates a stat from its three values.
    pub fn new(kw_in: f64, kw_out: f64, kw_net: f64) -> Self {
        Self {
            kw_in,
            kw_out,
            kw_net,
        }
    }

    /// Maximum of each series. kW in and kW out never report below zero.
    pub fn max_of(profile: &EnergyProfile) -> Result<Self> {
        Self::accumulate(
            profile,
            Self::new(0.0, 0.0, f64::NEG_INFINITY),
            f64::max,
            |_, value| value,
        )
    }

    /// Minimum of each series.
    pub fn min_of(profile: &EnergyProfile) -> Result<Self> {
        let inf = f64::INFINITY;
        Self::accumulate(profile, Self::new(inf, inf, inf), f64::min, |_, value| value)
    }

    /// Mean of each series over its non-NaN samples.
    pub fn avg_of(profile: &EnergyProfile) -> Result<Self> {
        Self::accumulate(
            profile,
            Self::new(0.0, 0.0, 0.0),
            |sum, value| sum + value,
            |count, sum| sum / count as f64,
        )
    }

    /// Folds every interval into `init` with `accumulate`, then applies
    /// `finish` to each output with its non-NaN sample count.
    ///
    /// NaN samples count as zero in the fold. The net count drops an interval
    /// when either side is NaN.
    fn accumulate(
        profile: &EnergyProfile,
        init: Self,
        accumulate: impl Fn(f64, f64) -> f64,
        finish: impl Fn(usize, f64) -> f64,
    ) -> Result<Self> {
        let len = profile.len();
        if len == 0 {
            return Err(EnergyError::EmptyProfile);
        }

        let kw_in = profile.kw_in();
        let kw_out = profile.kw_out();
        let mut acc = init;
        let mut counts = Counts {
            kw_in: len,
            kw_out: len,
            kw_net: len,
        };
        for i in 0..len {
            let mut in_value = kw_in.get(i)?;
            let mut out_value = kw_out.get(i)?;
            if in_value.is_nan() || out_value.is_nan() {
                counts.kw_net -= 1;
            }
            if in_value.is_nan() {
                counts.kw_in -= 1;
                in_value = 0.0;
            }
            if out_value.is_nan() {
                counts.kw_out -= 1;
                out_value = 0.0;
            }
            acc.kw_in = accumulate(acc.kw_in, in_value);
            acc.kw_out = accumulate(acc.kw_out, out_value);
            acc.kw_net = accumulate(acc.kw_net, in_value - out_value);
        }

        Ok(Self::new(
            finish(counts.kw_in, acc.kw_in),
            finish(counts.kw_out, acc.kw_out),
            finish(counts.kw_net, acc.kw_net),
        ))
    }
}
