//! Reference-sample + cumulative-delta decoding shared by all compressed
//! PMD frames.
//!
//! ```text
//! [ref ch0][ref ch1]…           channels × ref_width bytes, signed LE
//! repeated until the payload ends:
//!   [bit_width:1][sample_count:1][packed deltas]
//! ```
//!
//! The packed block holds `sample_count × channels` signed values of
//! `bit_width` bits, MSB-first, channel-interleaved per sample. Each delta
//! advances that channel's running total, so the output is one absolute
//! sample per delta step on top of the reference sample.

use crate::bits::{BitReader, ByteReader};
use crate::error::PmdError;

/// Decoded compressed payload: the reference sample followed by every
/// reconstructed sample, flattened channel-major per sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaFrame {
    channels: usize,
    values: Vec<i32>,
}

impl DeltaFrame {
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of samples including the reference.
    pub fn sample_count(&self) -> usize {
        self.values.len() / self.channels
    }

    pub fn reference(&self) -> &[i32] {
        &self.values[..self.channels]
    }

    /// Per-sample channel slices, reference first.
    pub fn samples(&self) -> impl ExactSizeIterator<Item = &[i32]> + '_ {
        self.values.chunks_exact(self.channels)
    }

    pub fn into_values(self) -> Vec<i32> {
        self.values
    }
}

/// Decode a compressed payload with `channels` channels whose reference
/// values are `ref_width` bytes wide.
pub fn decode(payload: &[u8], channels: usize, ref_width: usize) -> Result<DeltaFrame, PmdError> {
    if channels == 0 || ref_width == 0 || ref_width > 4 {
        return Err(PmdError::format(format!(
            "delta layout {channels} channels × {ref_width} bytes"
        )));
    }
    let ref_len = channels * ref_width;
    if payload.len() < ref_len {
        return Err(PmdError::too_short("delta reference sample", ref_len, payload.len()));
    }

    let mut reader = ByteReader::new(payload);
    let mut running = Vec::with_capacity(channels);
    for _ in 0..channels {
        running.push(reader.signed(ref_width)? as i32);
    }
    let mut values = running.clone();

    while !reader.is_empty() {
        if reader.remaining() < 2 {
            return Err(PmdError::too_short(
                "delta block header",
                reader.position() + 2,
                payload.len(),
            ));
        }
        let bit_width = u32::from(reader.u8()?);
        let sample_count = usize::from(reader.u8()?);
        if bit_width == 0 || bit_width > 32 {
            return Err(PmdError::format(format!("delta bit width {bit_width}")));
        }
        let bit_len = sample_count * channels * bit_width as usize;
        let block = reader.take(bit_len.div_ceil(8)).map_err(|_| {
            PmdError::format(format!(
                "delta block truncated: {sample_count} samples × {channels} ch × {bit_width} bits"
            ))
        })?;

        let mut bits = BitReader::new(block);
        values.reserve(sample_count * channels);
        for _ in 0..sample_count {
            for acc in running.iter_mut() {
                *acc = acc.wrapping_add(bits.read_signed(bit_width)?);
            }
            values.extend_from_slice(&running);
        }
    }

    Ok(DeltaFrame { channels, values })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Pack signed deltas MSB-first with the given width.
    pub(crate) fn pack(deltas: &[i32], width: u32) -> Vec<u8> {
        let mut out = vec![0u8; (deltas.len() * width as usize).div_ceil(8)];
        let mut bit = 0usize;
        for &d in deltas {
            let raw = (d as u32) & ((1u64 << width) - 1) as u32;
            for i in (0..width).rev() {
                if (raw >> i) & 1 == 1 {
                    out[bit / 8] |= 0x80 >> (bit % 8);
                }
                bit += 1;
            }
        }
        out
    }

    #[test]
    fn cumulative_three_channels() {
        let mut payload = vec![];
        payload.extend_from_slice(&10i16.to_le_bytes());
        payload.extend_from_slice(&(-5i16).to_le_bytes());
        payload.extend_from_slice(&1000i16.to_le_bytes());
        let deltas = [1, -1, 3, 2, 0, -4];
        payload.push(4);
        payload.push(2);
        payload.extend(pack(&deltas, 4));

        let frame = decode(&payload, 3, 2).unwrap();
        assert_eq!(frame.sample_count(), 3);
        assert_eq!(frame.reference(), &[10, -5, 1000]);
        let samples: Vec<&[i32]> = frame.samples().collect();
        assert_eq!(samples[1], &[11, -6, 1003]);
        assert_eq!(samples[2], &[13, -6, 999]);
    }

    #[test]
    fn sample_count_is_deltas_plus_one() {
        for n in 0..20usize {
            let deltas: Vec<i32> = (0..n as i32).map(|i| (i % 7) - 3).collect();
            let mut payload = 100i32.to_le_bytes()[..3].to_vec();
            payload.push(5);
            payload.push(n as u8);
            payload.extend(pack(&deltas, 5));
            let frame = decode(&payload, 1, 3).unwrap();
            assert_eq!(frame.sample_count(), n + 1);
            let mut expect = 100;
            for (sample, d) in frame.samples().skip(1).zip(&deltas) {
                expect += d;
                assert_eq!(sample[0], expect);
            }
        }
    }

    #[test]
    fn consecutive_blocks_continue_accumulating() {
        let mut payload = vec![0x00, 0x00];
        payload.extend([2, 1]);
        payload.extend(pack(&[1], 2));
        payload.extend([3, 2]);
        payload.extend(pack(&[-2, 3], 3));
        let values = decode(&payload, 1, 2).unwrap().into_values();
        assert_eq!(values, vec![0, 1, -1, 2]);
    }

    #[test]
    fn reference_only_payload() {
        let frame = decode(&[0xFF, 0xFF, 0xFF], 1, 3).unwrap();
        assert_eq!(frame.into_values(), vec![-1]);
    }

    #[test]
    fn truncation_is_a_format_error() {
        assert!(decode(&[0x01], 1, 2).is_err());
        assert!(decode(&[0x01, 0x00, 0x08], 1, 2).is_err());
        assert!(decode(&[0x01, 0x00, 0x08, 0x04, 0xFF], 1, 2).is_err());
        assert!(decode(&[0x01, 0x00, 0x00, 0x01], 1, 2).is_err());
    }
}
