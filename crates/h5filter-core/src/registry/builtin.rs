//! Filters compiled into the library: deflate, shuffle and fletcher32.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::class::{FilterClass, FilterCodec, FilterTarget};
use crate::pipeline::FilterStep;
use crate::telemetry::tags;
use crate::types::{FILTER_DEFLATE, FILTER_FLETCHER32, FILTER_SHUFFLE, FilterFlags, FilterId};

pub const DEFAULT_DEFLATE_LEVEL: u32 = 6;
const FLETCHER32_SIZE: usize = 4;

/// Every built-in class, in id order.
pub fn classes() -> Vec<FilterClass> {
    vec![
        FilterClass::new(FILTER_DEFLATE, "deflate", DeflateFilter),
        FilterClass::new(FILTER_SHUFFLE, "shuffle", ShuffleFilter),
        FilterClass::new(FILTER_FLETCHER32, "fletcher32", Fletcher32Filter),
    ]
}

/// Looks up a built-in class by id.
pub fn lookup(id: FilterId) -> Option<FilterClass> {
    classes().into_iter().find(|class| class.id() == id)
}

/// zlib compression; client data word 0 is the level (0-9, default 6).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeflateFilter;

impl FilterCodec for DeflateFilter {
    fn filter(
        &self,
        flags: FilterFlags,
        client_data: &[u32],
        nbytes: usize,
        buf: &mut Vec<u8>,
    ) -> usize {
        let input = &buf[..nbytes.min(buf.len())];
        let output = if flags.contains(FilterFlags::REVERSE) {
            let mut decoder = ZlibDecoder::new(input);
            let mut output = Vec::with_capacity(input.len().saturating_mul(2));
            decoder.read_to_end(&mut output).map(|_| output)
        } else {
            let level = client_data.first().copied().unwrap_or(DEFAULT_DEFLATE_LEVEL);
            if level > 9 {
                tracing::debug!(target: tags::TARGET_PIPELINE, level, "invalid deflate level");
                return 0;
            }
            let mut encoder = ZlibEncoder::new(
                Vec::with_capacity(input.len() / 2),
                Compression::new(level),
            );
            encoder
                .write_all(input)
                .and_then(|()| encoder.finish())
        };

        match output {
            Ok(output) => {
                let produced = output.len();
                *buf = output;
                produced
            }
            Err(error) => {
                tracing::debug!(target: tags::TARGET_PIPELINE, %error, "deflate failed");
                0
            }
        }
    }
}

/// Byte shuffle; client data word 0 is the element size.
///
/// Trailing bytes that do not form a whole element are copied unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShuffleFilter;

impl FilterCodec for ShuffleFilter {
    fn filter(
        &self,
        flags: FilterFlags,
        client_data: &[u32],
        nbytes: usize,
        buf: &mut Vec<u8>,
    ) -> usize {
        let Some(&element_size) = client_data.first() else {
            return 0;
        };
        let element_size = element_size as usize;
        let nbytes = nbytes.min(buf.len());
        let elements = if element_size == 0 { 0 } else { nbytes / element_size };
        if element_size <= 1 || elements <= 1 {
            return nbytes;
        }

        let body = elements * element_size;
        let mut output = vec![0u8; nbytes];
        let input = &buf[..nbytes];
        if flags.contains(FilterFlags::REVERSE) {
            for element in 0..elements {
                for byte in 0..element_size {
                    output[element * element_size + byte] = input[byte * elements + element];
                }
            }
        } else {
            for element in 0..elements {
                for byte in 0..element_size {
                    output[byte * elements + element] = input[element * element_size + byte];
                }
            }
        }
        output[body..].copy_from_slice(&input[body..]);

        *buf = output;
        nbytes
    }

    fn set_local(
        &self,
        step: &mut FilterStep,
        target: &FilterTarget<'_>,
    ) -> std::result::Result<(), String> {
        let datatype = target
            .datatype
            .ok_or_else(|| "shuffle needs a datatype to pick the element size".to_string())?;
        let size = u32::try_from(datatype.size)
            .map_err(|_| format!("element size {} too large", datatype.size))?;
        step.set_client_data(&[size]);
        Ok(())
    }
}

/// Fletcher-32 checksum appended on write, verified and stripped on read.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fletcher32Filter;

impl FilterCodec for Fletcher32Filter {
    fn filter(
        &self,
        flags: FilterFlags,
        _client_data: &[u32],
        nbytes: usize,
        buf: &mut Vec<u8>,
    ) -> usize {
        let nbytes = nbytes.min(buf.len());
        if flags.contains(FilterFlags::REVERSE) {
            if nbytes < FLETCHER32_SIZE {
                return 0;
            }
            let payload_len = nbytes - FLETCHER32_SIZE;
            if !flags.contains(FilterFlags::SKIP_EDC) {
                let mut stored = [0u8; FLETCHER32_SIZE];
                stored.copy_from_slice(&buf[payload_len..nbytes]);
                let expected = u32::from_le_bytes(stored);
                let actual = fletcher32(&buf[..payload_len]);
                if expected != actual {
                    tracing::debug!(
                        target: tags::TARGET_PIPELINE,
                        expected = format_args!("{expected:#010x}"),
                        actual = format_args!("{actual:#010x}"),
                        "fletcher32 checksum mismatch"
                    );
                    return 0;
                }
            }
            payload_len
        } else {
            let checksum = fletcher32(&buf[..nbytes]);
            buf.truncate(nbytes);
            buf.extend_from_slice(&checksum.to_le_bytes());
            nbytes + FLETCHER32_SIZE
        }
    }
}

/// Fletcher-32 over big-endian 16-bit words; an odd trailing byte is the
/// high half of a final word.
pub fn fletcher32(data: &[u8]) -> u32 {
    const BLOCK_WORDS: usize = 360;

    let mut sum1: u64 = 0;
    let mut sum2: u64 = 0;
    for block in data.chunks(BLOCK_WORDS * 2) {
        for word in block.chunks(2) {
            let value = match word {
                [high, low] => (u64::from(*high) << 8) | u64::from(*low),
                [high] => u64::from(*high) << 8,
                _ => 0,
            };
            sum1 += value;
            sum2 += sum1;
        }
        sum1 %= 65535;
        sum2 %= 65535;
    }

    ((sum2 as u32) << 16) | sum1 as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fletcher32_matches_reference_values() {
        assert_eq!(fletcher32(b""), 0);
        assert_eq!(fletcher32(&[0x01, 0x02]), 0x0102_0102);
        assert_eq!(fletcher32(&[0x01]), 0x0100_0100);
    }

    #[test]
    fn shuffle_leaves_single_byte_elements_alone() {
        let mut buf = vec![1, 2, 3, 4];
        let nbytes = ShuffleFilter.filter(FilterFlags::MANDATORY, &[1], 4, &mut buf);
        assert_eq!(nbytes, 4);
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }

    #[test]
    fn deflate_rejects_out_of_range_level() {
        let mut buf = vec![7u8; 64];
        assert_eq!(DeflateFilter.filter(FilterFlags::MANDATORY, &[10], 64, &mut buf), 0);
        assert_eq!(buf.len(), 64);
    }
}
