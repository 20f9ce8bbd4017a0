//! Binary payload codecs.
//!
//! Every stored attribute is a small byte payload. Sample values are scaled by
//! 1000, rounded half-up to an integer, zigzag encoded and written as 7-bit
//! varints, so a typical half-hourly day of readings takes a byte or two per
//! interval.
//!
//! ## Formats
//!
//! ```text
//! readings:   u8 channels | i32 BE intervals | per channel: i8 number, varints
//! stat:       varint kw_in | varint kw_out | varint kw_net
//! cacheable:  u8 (0 or 1)
//! date range: i32 BE year | u8 month | u8 day   (from, then to)
//! ```
//!
//! Encoders and decoders keep scratch buffers between calls and take
//! `&mut self`, so each reader or writer owns its own instances.

pub mod cacheable;
pub mod date_range;
pub mod readings;
pub mod stat;

pub use cacheable::{CacheableDecoder, CacheableEncoder};
pub use date_range::DateRangeCodec;
pub use readings::{ReadingsDecoder, ReadingsEncoder};
pub use stat::{StatDecoder, StatEncoder};

use crate::error::{EnergyError, Result};

/// Scaled value written for NaN samples.
///
/// Every encodable value scales to a magnitude below `2^62`, so the sentinel
/// can never collide with a real reading.
pub const NAN_SENTINEL: i64 = i64::MIN / 2;

/// Multiplier between stored integer units and kW values.
const SCALE: f64 = 1000.0;

/// Exclusive bound on the magnitude of a scaled value (`2^62`).
const MAX_SCALED: f64 = 4_611_686_018_427_387_904.0;

/// Longest varint needed for a 64-bit value.
pub(crate) const MAX_VARINT_LEN: usize = 10;

/// Serializes values into a reusable internal buffer.
pub trait Encoder {
    /// The value type this encoder accepts.
    type Item: ?Sized;

    /// Encodes `item`, returning a view of the encoder's buffer that is valid
    /// until the next call.
    fn encode(&mut self, item: &Self::Item) -> Result<&[u8]>;
}

/// Deserializes values from stored payloads.
pub trait Decoder {
    /// The value type this decoder produces.
    type Item;

    /// Decodes `bytes`, returning `None` for truncated or malformed input.
    fn decode(&mut self, bytes: &[u8]) -> Option<Self::Item>;
}

/// Converts a kW value to stored integer units.
pub(crate) fn to_units(value: f64) -> Result<i64> {
    if value.is_nan() {
        return Ok(NAN_SENTINEL);
    }
    if value == 0.0 {
        return Ok(0);
    }
    let scaled = (value * SCALE + 0.5).floor();
    if !scaled.is_finite() || scaled.abs() >= MAX_SCALED {
        return Err(EnergyError::UnencodableValue(value));
    }
    Ok(scaled as i64)
}

/// Converts stored integer units back to a kW value.
pub(crate) fn from_units(units: i64) -> f64 {
    if units == NAN_SENTINEL {
        f64::NAN
    } else {
        units as f64 / SCALE
    }
}

/// Appends `value` as a zigzag encoded 7-bit varint.
pub(crate) fn write_varint(buf: &mut Vec<u8>, value: i64) {
    let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;
    while zigzag >= 0x80 {
        buf.push((zigzag as u8 & 0x7f) | 0x80);
        zigzag >>= 7;
    }
    buf.push(zigzag as u8);
}

/// Cursor over a payload. Every read returns `None` past the end.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        let byte = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    pub(crate) fn i8(&mut self) -> Option<i8> {
        self.u8().map(|b| b as i8)
    }

    pub(crate) fn i32_be(&mut self) -> Option<i32> {
        let end = self.pos.checked_add(4)?;
        let bytes: [u8; 4] = self.bytes.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(i32::from_be_bytes(bytes))
    }

    /// Reads a zigzag encoded 7-bit varint.
    pub(crate) fn varint(&mut self) -> Option<i64> {
        let mut result = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.u8()?;
            let bits = u64::from(byte & 0x7f);
            if i == MAX_VARINT_LEN - 1 && bits > 1 {
                return None;
            }
            result |= bits << (7 * i);
            if byte & 0x80 == 0 {
                return Some((result >> 1) as i64 ^ -((result & 1) as i64));
            }
        }
        None
    }
}
