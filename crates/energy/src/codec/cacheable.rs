//! Cacheable flag payload codec.

use super::{Decoder, Encoder};
use crate::error::Result;

static TRUE_BYTES: [u8; 1] = [1];
static FALSE_BYTES: [u8; 1] = [0];

/// Encodes the cacheable flag as a single byte.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheableEncoder;

impl Encoder for CacheableEncoder {
    type Item = bool;

    fn encode(&mut self, cacheable: &bool) -> Result<&[u8]> {
        let bytes: &'static [u8] = if *cacheable { &TRUE_BYTES } else { &FALSE_BYTES };
        Ok(bytes)
    }
}

/// Decodes the cacheable flag: any non-zero first byte is `true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheableDecoder;

impl Decoder for CacheableDecoder {
    type Item = bool;

    fn decode(&mut self, bytes: &[u8]) -> Option<bool> {
        bytes.first().map(|&b| b != 0)
    }
}
