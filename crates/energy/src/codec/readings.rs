//! Readings payload codec.

use super::{from_units, to_units, write_varint, ByteReader, Decoder, Encoder, MAX_VARINT_LEN};
use crate::error::{EnergyError, Result};
use crate::model::{ChannelPrecision, Readings, Samples, SharedChannel, SharedReadings, ZeroedReadingsCache};
use std::sync::Arc;

/// Most channels a readings payload can carry.
pub const MAX_CHANNELS: usize = 127;

/// Encodes [`Readings`] into the compact varint format.
///
/// A channel whose samples all encode to zero is written as its negated
/// channel number with no samples.
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::codec::{Encoder, ReadingsEncoder};
///
/// let mut encoder = ReadingsEncoder::new();
/// let bytes = encoder.encode(&readings)?.to_vec();
/// ```
#[derive(Debug, Default)]
pub struct ReadingsEncoder {
    buffer: Vec<u8>,
}

impl ReadingsEncoder {
    /// Creates an encoder with an empty scratch buffer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for ReadingsEncoder {
    type Item = Readings;

    fn encode(&mut self, readings: &Readings) -> Result<&[u8]> {
        if readings.is_missing() {
            return Err(EnergyError::MissingNotEncodable);
        }
        let num_channels = readings.num_channels();
        if num_channels > MAX_CHANNELS {
            return Err(EnergyError::TooManyChannels(num_channels));
        }
        let len = readings.len();
        let intervals = i32::try_from(len).map_err(|_| EnergyError::TooManyIntervals(len))?;

        self.buffer.clear();
        self.buffer
            .reserve(5 + num_channels * (1 + len.saturating_mul(MAX_VARINT_LEN)));
        self.buffer.push(num_channels as u8);
        self.buffer.extend_from_slice(&intervals.to_be_bytes());

        for (index, channel) in readings.channels().enumerate() {
            let number = (index + 1) as i8;
            let mark = self.buffer.len();
            self.buffer.push(number as u8);

            let mut all_zero = true;
            if !channel.is_zeroed() {
                for value in channel.iter() {
                    let units = to_units(value)?;
                    all_zero &= units == 0;
                    write_varint(&mut self.buffer, units);
                }
            }
            if all_zero {
                self.buffer.truncate(mark);
                self.buffer.push((-number) as u8);
            }
        }
        Ok(&self.buffer)
    }
}

/// Decodes readings payloads.
///
/// All-zero channels come back as the shared zeroed channel, and a payload
/// whose every channel is zero comes back as the shared zeroed readings for
/// its shape.
#[derive(Debug)]
pub struct ReadingsDecoder {
    zeroes: Arc<ZeroedReadingsCache>,
    precision: ChannelPrecision,
    values: Vec<f64>,
}

impl ReadingsDecoder {
    /// Creates a decoder producing channels at `precision`.
    pub fn new(zeroes: Arc<ZeroedReadingsCache>, precision: ChannelPrecision) -> Self {
        Self {
            zeroes,
            precision,
            values: Vec::new(),
        }
    }

    fn decode_channels(
        &mut self,
        reader: &mut ByteReader<'_>,
        num_channels: usize,
        intervals: usize,
    ) -> Option<(Vec<SharedChannel>, bool)> {
        let mut slots: Vec<Option<SharedChannel>> = vec![None; num_channels];
        let mut all_zero = true;
        for _ in 0..num_channels {
            let number = reader.i8()?;
            let slot = slots.get_mut(usize::from(number.unsigned_abs()).checked_sub(1)?)?;
            if slot.is_some() {
                return None;
            }
            let channel = if number < 0 {
                self.zeroes.zeroed_channel(intervals)
            } else {
                all_zero = false;
                self.values.clear();
                // Every sample takes at least one byte.
                self.values.reserve(intervals.min(reader.remaining()));
                for _ in 0..intervals {
                    self.values.push(from_units(reader.varint()?));
                }
                Arc::new(self.precision.channel(&self.values))
            };
            *slot = Some(channel);
        }
        let channels = slots.into_iter().collect::<Option<Vec<_>>>()?;
        Some((channels, all_zero))
    }
}

impl Decoder for ReadingsDecoder {
    type Item = SharedReadings;

    fn decode(&mut self, bytes: &[u8]) -> Option<SharedReadings> {
        let mut reader = ByteReader::new(bytes);
        let num_channels = reader.i8()?;
        if num_channels <= 0 {
            return None;
        }
        let num_channels = num_channels as usize;
        let intervals = usize::try_from(reader.i32_be()?).ok()?;

        let (channels, all_zero) = self.decode_channels(&mut reader, num_channels, intervals)?;
        if all_zero {
            return Some(self.zeroes.zeroed_readings(num_channels, intervals));
        }
        Readings::of(channels).ok().map(Arc::new)
    }
}
