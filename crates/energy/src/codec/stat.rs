//! Profile statistic payload codec.

use super::{from_units, to_units, write_varint, ByteReader, Decoder, Encoder, MAX_VARINT_LEN};
use crate::error::Result;
use crate::model::EnergyProfileStat;

/// Encodes an [`EnergyProfileStat`] as three varints.
#[derive(Debug)]
pub struct StatEncoder {
    buffer: Vec<u8>,
}

impl StatEncoder {
    /// Creates an encoder.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(3 * MAX_VARINT_LEN),
        }
    }
}

impl Default for StatEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for StatEncoder {
    type Item = EnergyProfileStat;

    fn encode(&mut self, stat: &EnergyProfileStat) -> Result<&[u8]> {
        let units = [
            to_units(stat.kw_in)?,
            to_units(stat.kw_out)?,
            to_units(stat.kw_net)?,
        ];
        self.buffer.clear();
        for value in units {
            write_varint(&mut self.buffer, value);
        }
        Ok(&self.buffer)
    }
}

/// Decodes stat payloads.
#[derive(Debug, Default)]
pub struct StatDecoder;

impl StatDecoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for StatDecoder {
    type Item = EnergyProfileStat;

    fn decode(&mut self, bytes: &[u8]) -> Option<EnergyProfileStat> {
        let mut reader = ByteReader::new(bytes);
        let kw_in = from_units(reader.varint()?);
        let kw_out = from_units(reader.varint()?);
        let kw_net = from_units(reader.varint()?);
        Some(EnergyProfileStat::new(kw_in, kw_out, kw_net))
    }
}
