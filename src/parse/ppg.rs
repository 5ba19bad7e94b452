//! Optical (PPG) frames.
//!
//! | Form | Record layout |
//! |---|---|
//! | raw 0 | 4 × i24 LE: ppg0, ppg1, ppg2, ambient |
//! | raw 4 | one 36-byte table: 12 integration times, 12 ch1 gains, 12 ch2 gains |
//! | raw 6 | u64 LE sport id |
//! | raw 9 | u32 LE status, then 16 × i24 LE in four groups of four |
//! | compressed 0 | delta layout, 4 channels, 3-byte reference |

use crate::bits::{signed_le, unsigned_le};
use crate::delta;
use crate::error::PmdError;
use crate::frame::{FrameContext, FrameType, MeasurementFrame};
use crate::types::PpgSample;

use super::{records, unsupported};

const CHANNEL_WIDTH: usize = 3;
const CHANNELS: usize = 4;
const CALIBRATION_ROW: usize = 12;
const GROUPED_STATUS_LEN: usize = 4;
const GROUPS: usize = 4;

/// Decode a PPG frame.
pub fn decode_ppg(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<Vec<PpgSample>, PmdError> {
    use FrameType::*;
    match (frame.compressed, frame.frame_type) {
        (false, Type0) => raw_channels(frame, ctx),
        (false, Type4) => calibration(frame),
        (false, Type6) => sport_id(frame, ctx),
        (false, Type9) => grouped(frame, ctx),
        (true, Type0) => compressed_channels(frame, ctx),
        (false, Type1 | Type2 | Type3 | Type5 | Type7 | Type8 | Type10)
        | (true, Type1 | Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10) => {
            Err(unsupported(frame))
        }
    }
}

fn channels_sample(values: &[i32], timestamp: u64) -> PpgSample {
    PpgSample::Channels {
        timestamp,
        ppg: [values[0], values[1], values[2]],
        ambient: values[3],
    }
}

fn raw_channels(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<Vec<PpgSample>, PmdError> {
    let chunks = records(frame, CHANNELS * CHANNEL_WIDTH)?;
    let timestamps = frame.sample_timestamps(ctx, chunks.len())?;
    Ok(chunks
        .zip(timestamps)
        .map(|(record, timestamp)| {
            let values: Vec<i32> = record
                .chunks_exact(CHANNEL_WIDTH)
                .map(|c| signed_le(c) as i32)
                .collect();
            channels_sample(&values, timestamp)
        })
        .collect())
}

fn compressed_channels(
    frame: &MeasurementFrame,
    ctx: &FrameContext,
) -> Result<Vec<PpgSample>, PmdError> {
    let decoded = delta::decode(&frame.payload, CHANNELS, CHANNEL_WIDTH)?;
    let timestamps = frame.sample_timestamps(ctx, decoded.sample_count())?;
    Ok(decoded
        .samples()
        .zip(timestamps)
        .map(|(values, timestamp)| channels_sample(values, timestamp))
        .collect())
}

fn calibration(frame: &MeasurementFrame) -> Result<Vec<PpgSample>, PmdError> {
    let p = &frame.payload;
    if p.len() != 3 * CALIBRATION_ROW {
        return Err(PmdError::format(format!(
            "PPG calibration frame must be {} bytes, got {}",
            3 * CALIBRATION_ROW,
            p.len()
        )));
    }
    let row = |i: usize| {
        let mut out = [0u8; CALIBRATION_ROW];
        out.copy_from_slice(&p[i * CALIBRATION_ROW..(i + 1) * CALIBRATION_ROW]);
        out
    };
    Ok(vec![PpgSample::Calibration {
        timestamp: frame.timestamp,
        num_int_ts: row(0),
        channel1_gain: row(1),
        channel2_gain: row(2),
    }])
}

fn sport_id(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<Vec<PpgSample>, PmdError> {
    let chunks = records(frame, 8)?;
    let timestamps = frame.sample_timestamps(ctx, chunks.len())?;
    Ok(chunks
        .zip(timestamps)
        .map(|(b, timestamp)| PpgSample::SportId {
            timestamp,
            sport_id: unsigned_le(b),
        })
        .collect())
}

fn grouped(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<Vec<PpgSample>, PmdError> {
    let record_len = GROUPED_STATUS_LEN + GROUPS * CHANNELS * CHANNEL_WIDTH;
    let chunks = records(frame, record_len)?;
    let timestamps = frame.sample_timestamps(ctx, chunks.len())?;
    Ok(chunks
        .zip(timestamps)
        .map(|(record, timestamp)| {
            let status = unsigned_le(&record[..GROUPED_STATUS_LEN]) as u32;
            let mut groups = [[0i32; CHANNELS]; GROUPS];
            for (i, c) in record[GROUPED_STATUS_LEN..]
                .chunks_exact(CHANNEL_WIDTH)
                .enumerate()
            {
                groups[i / CHANNELS][i % CHANNELS] = signed_le(c) as i32;
            }
            PpgSample::Grouped {
                timestamp,
                status,
                groups,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::tests::pack;
    use crate::parse::test_util::frame;
    use crate::protocol::PmdMeasurementType;

    fn i24(v: i32) -> [u8; 3] {
        let b = v.to_le_bytes();
        [b[0], b[1], b[2]]
    }

    #[test]
    fn raw_type0_channels_and_ambient() {
        let mut payload = vec![];
        for v in [1, -2, 3, 400, 5, 6, 7, -8] {
            payload.extend(i24(v));
        }
        let f = frame(PmdMeasurementType::Ppg, 200_000_000, false, FrameType::Type0, &payload);
        let ctx = FrameContext {
            sample_rate: Some(135),
            ..Default::default()
        };
        let s = decode_ppg(&f, &ctx).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(
            s[0],
            PpgSample::Channels {
                timestamp: 200_000_000 - 7_407_407,
                ppg: [1, -2, 3],
                ambient: 400
            }
        );
        assert_eq!(s[1].timestamp(), 200_000_000);
    }

    #[test]
    fn compressed_type0() {
        let mut payload = vec![];
        for v in [1000, 2000, 3000, 10] {
            payload.extend(i24(v));
        }
        payload.extend([8, 1]);
        payload.extend(pack(&[-1, 1, 100, 0], 8));
        let f = frame(PmdMeasurementType::Ppg, 2_000, true, FrameType::Type0, &payload);
        let s = decode_ppg(&f, &FrameContext::default()).unwrap();
        assert_eq!(s.len(), 2);
        match s[1] {
            PpgSample::Channels { ppg, ambient, timestamp } => {
                assert_eq!(ppg, [999, 2001, 3100]);
                assert_eq!(ambient, 10);
                assert_eq!(timestamp, 2_000);
            }
            ref other => panic!("{other:?}"),
        }
    }

    #[test]
    fn calibration_frame_is_fixed_shape() {
        let payload: Vec<u8> = (0..36).collect();
        let f = frame(PmdMeasurementType::Ppg, 7, false, FrameType::Type4, &payload);
        let s = decode_ppg(&f, &FrameContext::default()).unwrap();
        match &s[..] {
            [PpgSample::Calibration { num_int_ts, channel1_gain, channel2_gain, timestamp }] => {
                assert_eq!(num_int_ts[0], 0);
                assert_eq!(channel1_gain[0], 12);
                assert_eq!(channel2_gain[11], 35);
                assert_eq!(*timestamp, 7);
            }
            other => panic!("{other:?}"),
        }
        let short = frame(PmdMeasurementType::Ppg, 7, false, FrameType::Type4, &payload[..35]);
        assert!(decode_ppg(&short, &FrameContext::default()).is_err());
    }

    #[test]
    fn sport_id_frame() {
        let f = frame(
            PmdMeasurementType::Ppg,
            9,
            false,
            FrameType::Type6,
            &[0x05, 0, 0, 0, 0, 0, 0, 0],
        );
        assert_eq!(
            decode_ppg(&f, &FrameContext::default()).unwrap(),
            vec![PpgSample::SportId { timestamp: 9, sport_id: 5 }]
        );
    }

    #[test]
    fn grouped_frame() {
        let mut payload = 0xA5u32.to_le_bytes().to_vec();
        for v in 0..16 {
            payload.extend(i24(v - 8));
        }
        let f = frame(PmdMeasurementType::Ppg, 11, false, FrameType::Type9, &payload);
        match &decode_ppg(&f, &FrameContext::default()).unwrap()[..] {
            [PpgSample::Grouped { status, groups, .. }] => {
                assert_eq!(*status, 0xA5);
                assert_eq!(groups[0], [-8, -7, -6, -5]);
                assert_eq!(groups[3], [4, 5, 6, 7]);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn unlisted_forms_fail() {
        for (compressed, ft) in [
            (false, FrameType::Type5),
            (false, FrameType::Type7),
            (true, FrameType::Type7),
            (true, FrameType::Type9),
        ] {
            let f = frame(PmdMeasurementType::Ppg, 0, compressed, ft, &[0; 12]);
            assert!(matches!(
                decode_ppg(&f, &FrameContext::default()),
                Err(PmdError::UnsupportedFrameType { .. })
            ));
        }
    }
}
