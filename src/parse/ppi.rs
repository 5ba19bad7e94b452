use crate::error::PmdError;
use crate::frame::{FrameType, MeasurementFrame};
use crate::types::PpiSample;

use super::{records, unsupported};

/// `[hr:1][pp_ms:2 LE][pp_error_estimate:2 LE][flags:1]`
const RECORD_LEN: usize = 6;

const BLOCKER_BIT: u8 = 0x01;
const SKIN_CONTACT_STATUS_BIT: u8 = 0x02;
const SKIN_CONTACT_SUPPORTED_BIT: u8 = 0x04;

/// Decode a PPI frame. Raw type 0 only.
///
/// Records are not spread over time: each one is a complete interval and is
/// stamped with the frame timestamp.
pub fn decode_ppi(frame: &MeasurementFrame) -> Result<Vec<PpiSample>, PmdError> {
    use FrameType::*;
    match (frame.compressed, frame.frame_type) {
        (false, Type0) => Ok(records(frame, RECORD_LEN)?
            .map(|r| PpiSample {
                timestamp: frame.timestamp,
                hr: r[0],
                pp_ms: u16::from_le_bytes([r[1], r[2]]),
                pp_error_estimate: u16::from_le_bytes([r[3], r[4]]),
                blocker: r[5] & BLOCKER_BIT != 0,
                skin_contact_status: r[5] & SKIN_CONTACT_STATUS_BIT != 0,
                skin_contact_supported: r[5] & SKIN_CONTACT_SUPPORTED_BIT != 0,
            })
            .collect()),
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
    fn decodes_records_and_flags() {
        let payload = [
            0x3C, 0xE8, 0x03, 0x0A, 0x00, 0x06, // 60 bpm, 1000 ms, ±10, contact+supported
            0x00, 0x20, 0x03, 0xFF, 0xFF, 0x01, // blocker
        ];
        let f = frame(PmdMeasurementType::Ppi, 42, false, FrameType::Type0, &payload);
        let s = decode_ppi(&f).unwrap();
        assert_eq!(
            s[0],
            PpiSample {
                timestamp: 42,
                hr: 60,
                pp_ms: 1000,
                pp_error_estimate: 10,
                blocker: false,
                skin_contact_status: true,
                skin_contact_supported: true,
            }
        );
        assert_eq!(s[1].pp_ms, 800);
        assert_eq!(s[1].pp_error_estimate, 0xFFFF);
        assert!(s[1].blocker);
        assert!(!s[1].skin_contact_supported);
        assert_eq!(s[1].timestamp, 42);
    }

    #[test]
    fn rejects_partial_record_and_compressed() {
        let f = frame(PmdMeasurementType::Ppi, 0, false, FrameType::Type0, &[0; 5]);
        assert!(decode_ppi(&f).is_err());
        let f = frame(PmdMeasurementType::Ppi, 0, true, FrameType::Type0, &[0; 6]);
        assert!(matches!(decode_ppi(&f), Err(PmdError::UnsupportedFrameType { .. })));
    }
}
