//! Accelerometer, gyroscope and magnetometer frames.
//!
//! All three carry x, y, z per sample. Raw frames store each axis as a
//! signed little-endian integer of a fixed width; compressed frames use the
//! shared delta layout with 16-bit reference values and are scaled by the
//! factor the device returned when the stream was started.

use crate::bits::signed_le;
use crate::delta;
use crate::error::PmdError;
use crate::frame::{FrameContext, FrameType, MeasurementFrame};
use crate::types::{AccSample, XyzSample};

use super::{records, unsupported};

const AXES: usize = 3;
const COMPRESSED_REF_WIDTH: usize = 2;

/// Decode an accelerometer frame into milli-g samples.
pub fn decode_acc(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<Vec<AccSample>, PmdError> {
    use FrameType::*;
    match (frame.compressed, frame.frame_type) {
        (false, Type0) => raw_acc(frame, ctx, 1),
        (false, Type1) => raw_acc(frame, ctx, 2),
        (false, Type2) => raw_acc(frame, ctx, 3),
        // factor converts to g, the extra 1000 to milli-g
        (true, Type0) => compressed_acc(frame, ctx, ctx.factor * 1000.0),
        (true, Type1) => compressed_acc(frame, ctx, ctx.factor),
        (false, Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10)
        | (true, Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10) => {
            Err(unsupported(frame))
        }
    }
}

/// Decode a gyroscope frame into °/s samples.
pub fn decode_gyro(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<Vec<XyzSample>, PmdError> {
    use FrameType::*;
    match (frame.compressed, frame.frame_type) {
        (false, Type0) => raw_xyz(frame, ctx, 2),
        (true, Type0) => compressed_xyz(frame, ctx),
        (false, Type1 | Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10)
        | (true, Type1 | Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10) => {
            Err(unsupported(frame))
        }
    }
}

/// Decode a magnetometer frame into gauss samples.
pub fn decode_magnetometer(
    frame: &MeasurementFrame,
    ctx: &FrameContext,
) -> Result<Vec<XyzSample>, PmdError> {
    use FrameType::*;
    match (frame.compressed, frame.frame_type) {
        (false, Type0) => raw_xyz(frame, ctx, 2),
        (true, Type0) => compressed_xyz(frame, ctx),
        (false, Type1 | Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10)
        | (true, Type1 | Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10) => {
            Err(unsupported(frame))
        }
    }
}

fn axes(record: &[u8], width: usize) -> [i32; AXES] {
    [
        signed_le(&record[..width]) as i32,
        signed_le(&record[width..2 * width]) as i32,
        signed_le(&record[2 * width..3 * width]) as i32,
    ]
}

fn raw_acc(
    frame: &MeasurementFrame,
    ctx: &FrameContext,
    width: usize,
) -> Result<Vec<AccSample>, PmdError> {
    let chunks = records(frame, AXES * width)?;
    let timestamps = frame.sample_timestamps(ctx, chunks.len())?;
    Ok(chunks
        .zip(timestamps)
        .map(|(record, timestamp)| {
            let [x, y, z] = axes(record, width);
            AccSample { timestamp, x, y, z }
        })
        .collect())
}

fn compressed_acc(
    frame: &MeasurementFrame,
    ctx: &FrameContext,
    scale: f32,
) -> Result<Vec<AccSample>, PmdError> {
    let decoded = delta::decode(&frame.payload, AXES, COMPRESSED_REF_WIDTH)?;
    let timestamps = frame.sample_timestamps(ctx, decoded.sample_count())?;
    let to_milli = |v: i32| (v as f32 * scale).round() as i32;
    Ok(decoded
        .samples()
        .zip(timestamps)
        .map(|(s, timestamp)| AccSample {
            timestamp,
            x: to_milli(s[0]),
            y: to_milli(s[1]),
            z: to_milli(s[2]),
        })
        .collect())
}

fn raw_xyz(
    frame: &MeasurementFrame,
    ctx: &FrameContext,
    width: usize,
) -> Result<Vec<XyzSample>, PmdError> {
    let chunks = records(frame, AXES * width)?;
    let timestamps = frame.sample_timestamps(ctx, chunks.len())?;
    Ok(chunks
        .zip(timestamps)
        .map(|(record, timestamp)| scaled(axes(record, width), ctx.factor, timestamp))
        .collect())
}

fn compressed_xyz(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<Vec<XyzSample>, PmdError> {
    let decoded = delta::decode(&frame.payload, AXES, COMPRESSED_REF_WIDTH)?;
    let timestamps = frame.sample_timestamps(ctx, decoded.sample_count())?;
    Ok(decoded
        .samples()
        .zip(timestamps)
        .map(|(s, timestamp)| scaled([s[0], s[1], s[2]], ctx.factor, timestamp))
        .collect())
}

fn scaled([x, y, z]: [i32; AXES], factor: f32, timestamp: u64) -> XyzSample {
    XyzSample {
        timestamp,
        x: x as f32 * factor,
        y: y as f32 * factor,
        z: z as f32 * factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::tests::pack;
    use crate::parse::test_util::frame;
    use crate::protocol::PmdMeasurementType;

    #[test]
    fn acc_raw_type1_reference_vector() {
        let payload = [
            0xF7, 0xFF, 0xFF, 0xFF, 0xE7, 0x03, // -9, -1, 999
            0xF8, 0xFF, 0x00, 0x00, 0xE8, 0x03, // -8, 0, 1000
        ];
        let f = frame(PmdMeasurementType::Acc, 2_000_000_000, false, FrameType::Type1, &payload);
        let ctx = FrameContext {
            sample_rate: Some(52),
            ..Default::default()
        };
        let samples = decode_acc(&f, &ctx).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!((samples[0].x, samples[0].y, samples[0].z), (-9, -1, 999));
        assert_eq!((samples[1].x, samples[1].y, samples[1].z), (-8, 0, 1000));
        assert_eq!(samples[1].timestamp, 2_000_000_000);
        assert_eq!(samples[0].timestamp, 2_000_000_000 - 19_230_769);
    }

    #[test]
    fn acc_raw_type0_and_type2_widths() {
        let f = frame(PmdMeasurementType::Acc, 1_000, false, FrameType::Type0, &[0xFF, 0x01, 0x80]);
        let s = decode_acc(&f, &FrameContext::default()).unwrap();
        assert_eq!((s[0].x, s[0].y, s[0].z), (-1, 1, -128));

        let f = frame(
            PmdMeasurementType::Acc,
            1_000,
            false,
            FrameType::Type2,
            &[0x00, 0x00, 0x80, 0x01, 0x00, 0x00, 0xFF, 0xFF, 0xFF],
        );
        let s = decode_acc(&f, &FrameContext::default()).unwrap();
        assert_eq!((s[0].x, s[0].y, s[0].z), (-0x800000, 1, -1));
    }

    #[test]
    fn acc_compressed_type0_scales_to_milli_g() {
        let mut payload = vec![];
        for v in [100i16, -200, 4096] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        payload.extend([6, 1]);
        payload.extend(pack(&[1, -1, 10], 6));
        let f = frame(PmdMeasurementType::Acc, 5_000_000, true, FrameType::Type0, &payload);
        let ctx = FrameContext {
            previous_timestamp: 1_000_000,
            factor: 0.000244,
            sample_rate: None,
        };
        let s = decode_acc(&f, &ctx).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!((s[0].x, s[0].y, s[0].z), (24, -49, 999));
        assert_eq!((s[1].x, s[1].y, s[1].z), (25, -49, 1002));
        assert_eq!(s[0].timestamp, 3_000_000);
        assert_eq!(s[1].timestamp, 5_000_000);
    }

    #[test]
    fn acc_rejects_unlisted_forms() {
        for (compressed, ft) in [(false, FrameType::Type3), (true, FrameType::Type2)] {
            let f = frame(PmdMeasurementType::Acc, 0, compressed, ft, &[0; 6]);
            assert!(matches!(
                decode_acc(&f, &FrameContext::default()),
                Err(PmdError::UnsupportedFrameType { .. })
            ));
        }
    }

    #[test]
    fn acc_payload_length_checked_against_type() {
        let f = frame(PmdMeasurementType::Acc, 0, false, FrameType::Type1, &[0; 7]);
        assert!(matches!(
            decode_acc(&f, &FrameContext::default()),
            Err(PmdError::DataFormat(_))
        ));
    }

    #[test]
    fn gyro_raw_applies_factor() {
        let f = frame(
            PmdMeasurementType::Gyro,
            10,
            false,
            FrameType::Type0,
            &[0x0A, 0x00, 0xF6, 0xFF, 0x00, 0x00],
        );
        let ctx = FrameContext {
            factor: 0.5,
            ..Default::default()
        };
        let s = decode_gyro(&f, &ctx).unwrap();
        assert_eq!((s[0].x, s[0].y, s[0].z), (5.0, -5.0, 0.0));
        assert!(decode_gyro(
            &frame(PmdMeasurementType::Gyro, 10, false, FrameType::Type1, &[0; 6]),
            &ctx
        )
        .is_err());
    }

    #[test]
    fn magnetometer_compressed() {
        let mut payload = vec![0x10, 0x00, 0x20, 0x00, 0x30, 0x00];
        payload.extend([4, 2]);
        payload.extend(pack(&[1, 1, 1, -2, -2, -2], 4));
        let f = frame(PmdMeasurementType::Magnetometer, 3_000, true, FrameType::Type0, &payload);
        let ctx = FrameContext {
            previous_timestamp: 0,
            factor: 0.25,
            sample_rate: None,
        };
        let s = decode_magnetometer(&f, &ctx).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!((s[0].x, s[1].x, s[2].x), (4.0, 4.25, 3.75));
        assert_eq!(s.iter().map(|v| v.timestamp).collect::<Vec<_>>(), vec![1_000, 2_000, 3_000]);
    }
}
