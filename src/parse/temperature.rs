//! Temperature and skin-temperature frames (identical layouts).
//!
//! Compressed frames carry the reference sample as the raw IEEE-754 bit
//! pattern. Deltas are accumulated on that 32-bit integer and each result
//! is reinterpreted as an `f32`.

use crate::delta;
use crate::error::PmdError;
use crate::frame::{FrameContext, FrameType, MeasurementFrame};
use crate::types::TemperatureSample;

use super::{records, unsupported};

const SAMPLE_LEN: usize = 4;

pub fn decode_temperature(
    frame: &MeasurementFrame,
    ctx: &FrameContext,
) -> Result<Vec<TemperatureSample>, PmdError> {
    use FrameType::*;
    let values: Vec<f32> = match (frame.compressed, frame.frame_type) {
        (false, Type0) => records(frame, SAMPLE_LEN)?
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        (true, Type0) => delta::decode(&frame.payload, 1, SAMPLE_LEN)?
            .into_values()
            .into_iter()
            .map(|bits| f32::from_bits(bits as u32))
            .collect(),
        (false, Type1 | Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10)
        | (true, Type1 | Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10) => {
            return Err(unsupported(frame))
        }
    };
    let timestamps = frame.sample_timestamps(ctx, values.len())?;
    Ok(values
        .into_iter()
        .zip(timestamps)
        .map(|(temperature, timestamp)| TemperatureSample {
            timestamp,
            temperature,
        })
        .collect())
}
