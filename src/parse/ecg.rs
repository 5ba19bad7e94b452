use crate::bits::signed_le;
use crate::error::PmdError;
use crate::frame::{FrameContext, FrameType, MeasurementFrame};
use crate::types::EcgSample;

use super::{records, unsupported};

const SAMPLE_LEN: usize = 3;

/// Decode an ECG frame: raw type 0 only, one signed 24-bit µV value per sample.
pub fn decode_ecg(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<Vec<EcgSample>, PmdError> {
    use FrameType::*;
    match (frame.compressed, frame.frame_type) {
        (false, Type0) => {
            let chunks = records(frame, SAMPLE_LEN)?;
            let timestamps = frame.sample_timestamps(ctx, chunks.len())?;
            Ok(chunks
                .zip(timestamps)
                .map(|(b, timestamp)| EcgSample {
                    timestamp,
                    voltage: signed_le(b) as i32,
                })
                .collect())
        }
        (false, Type1 | Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10)
        | (true, _) => Err(unsupported(frame)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::test_util::frame;
    use crate::protocol::PmdMeasurementType;

    #[test]
    fn decodes_signed_microvolts() {
        let payload = [0x02, 0x80, 0xFF, 0x1E, 0x00, 0x00, 0xFF, 0xFF, 0x7F];
        let f = frame(PmdMeasurementType::Ecg, 1_000_000_000, false, FrameType::Type0, &payload);
        let ctx = FrameContext {
            sample_rate: Some(130),
            ..Default::default()
        };
        let s = decode_ecg(&f, &ctx).unwrap();
        assert_eq!(
            s.iter().map(|e| e.voltage).collect::<Vec<_>>(),
            vec![-32766, 30, 0x7FFFFF]
        );
        assert_eq!(s[2].timestamp, 1_000_000_000);
        assert!(s[0].timestamp < s[1].timestamp);
    }

    #[test]
    fn compressed_ecg_is_unsupported() {
        let f = frame(PmdMeasurementType::Ecg, 0, true, FrameType::Type0, &[0; 5]);
        assert!(matches!(
            decode_ecg(&f, &FrameContext::default()),
            Err(PmdError::UnsupportedFrameType { compressed: true, .. })
        ));
    }
}
