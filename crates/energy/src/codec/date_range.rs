//! Date range payload codec.

use crate::model::IdDateRange;
use chrono::{Datelike, NaiveDate};

/// Encoded size of a date range.
pub const DATE_RANGE_LEN: usize = 12;

/// Encodes the bounds of an [`IdDateRange`] as two 6-byte dates.
///
/// The id is the blob key and is not part of the payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateRangeCodec;

impl DateRangeCodec {
    /// Encodes `from` and `to`.
    pub fn encode(&self, from: NaiveDate, to: NaiveDate) -> [u8; DATE_RANGE_LEN] {
        let mut bytes = [0u8; DATE_RANGE_LEN];
        write_date(&mut bytes[..6], from);
        write_date(&mut bytes[6..], to);
        bytes
    }

    /// Decodes a payload into a range for `id`.
    ///
    /// Returns `None` for short payloads or impossible dates.
    pub fn decode(&self, id: &str, bytes: &[u8]) -> Option<IdDateRange> {
        if bytes.len() < DATE_RANGE_LEN {
            return None;
        }
        let from = read_date(&bytes[..6])?;
        let to = read_date(&bytes[6..12])?;
        Some(IdDateRange::new(id, from, to))
    }
}

fn write_date(out: &mut [u8], date: NaiveDate) {
    out[..4].copy_from_slice(&date.year().to_be_bytes());
    out[4] = date.month() as u8;
    out[5] = date.day() as u8;
}

fn read_date(bytes: &[u8]) -> Option<NaiveDate> {
    let year = i32::from_be_bytes(bytes.get(..4)?.try_into().ok()?);
    NaiveDate::from_ymd_opt(year, u32::from(*bytes.get(4)?), u32::from(*bytes.get(5)?))
}
