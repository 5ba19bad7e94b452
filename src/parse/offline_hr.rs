use crate::error::PmdError;
use crate::frame::{FrameContext, FrameType, MeasurementFrame};
use crate::types::OfflineHrSample;

use super::{records, unsupported};

/// Decode an offline HR frame.
///
/// Raw type 0 carries one HR byte per sample; raw type 1 carries
/// `[hr][ppg_quality][corrected_hr]`. Compressed forms are not used by
/// the recorder.
pub fn decode_offline_hr(
    frame: &MeasurementFrame,
    ctx: &FrameContext,
) -> Result<Vec<OfflineHrSample>, PmdError> {
    use FrameType::*;
    let record_len = match (frame.compressed, frame.frame_type) {
        (false, Type0) => 1,
        (false, Type1) => 3,
        (false, Type2 | Type3 | Type4 | Type5 | Type6 | Type7 | Type8 | Type9 | Type10)
        | (true, _) => return Err(unsupported(frame)),
    };
    let chunks = records(frame, record_len)?;
    let timestamps = frame.sample_timestamps(ctx, chunks.len())?;
    Ok(chunks
        .zip(timestamps)
        .map(|(r, timestamp)| OfflineHrSample {
            timestamp,
            hr: r[0],
            ppg_quality: r.get(1).copied(),
            corrected_hr: r.get(2).copied(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::test_util::frame;
    use crate::protocol::PmdMeasurementType;

    #[test]
    fn one_byte_records() {
        let f = frame(PmdMeasurementType::OfflineHr, 3_000_000_000, false, FrameType::Type0, &[60, 61, 62]);
        let ctx = FrameContext {
            sample_rate: Some(1),
            ..Default::default()
        };
        let s = decode_offline_hr(&f, &ctx).unwrap();
        assert_eq!(s.iter().map(|h| h.hr).collect::<Vec<_>>(), vec![60, 61, 62]);
        assert_eq!(s[0].timestamp, 1_000_000_000);
        assert_eq!(s[0].ppg_quality, None);
    }

    #[test]
    fn three_byte_records() {
        let f = frame(PmdMeasurementType::OfflineHr, 5, false, FrameType::Type1, &[70, 2, 72]);
        let s = decode_offline_hr(&f, &FrameContext::default()).unwrap();
        assert_eq!(
            s,
            vec![OfflineHrSample {
                timestamp: 5,
                hr: 70,
                ppg_quality: Some(2),
                corrected_hr: Some(72)
            }]
        );
        let ragged = frame(PmdMeasurementType::OfflineHr, 5, false, FrameType::Type1, &[70, 2]);
        assert!(decode_offline_hr(&ragged, &FrameContext::default()).is_err());
    }

    #[test]
    fn compressed_is_unsupported() {
        let f = frame(PmdMeasurementType::OfflineHr, 5, true, FrameType::Type0, &[70]);
        assert!(matches!(
            decode_offline_hr(&f, &FrameContext::default()),
            Err(PmdError::UnsupportedFrameType { .. })
        ));
    }
}
