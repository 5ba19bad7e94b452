//! Per-measurement PMD frame decoders.
//!
//! All functions in this module are pure: bytes in, typed samples out. Each
//! decoder matches on the `(compressed, frame type)` pairs it supports and
//! returns [`PmdError::UnsupportedFrameType`] for every other pair; no
//! decoder falls back to a default layout.
//!
//! | Measurement | Raw frame types | Compressed frame types |
//! |---|---|---|
//! | ACC | 0 (1 B/axis), 1 (2 B/axis), 2 (3 B/axis) | 0 (factor × 1000 → mG), 1 (factor → mG) |
//! | Gyroscope | 0 (2 B/axis) | 0 |
//! | Magnetometer | 0 (2 B/axis) | 0 |
//! | ECG | 0 (3 B µV) | — |
//! | PPG | 0 (3 ch + ambient), 4 (gain table), 6 (sport id), 9 (status + 16 ch) | 0 (3 ch + ambient) |
//! | PPI | 0 (6 B record) | — |
//! | Offline HR | 0 (1 B), 1 (3 B) | — |
//! | Temperature / Skin temperature | 0 (f32) | 0 (f32 bit pattern + deltas) |

mod ecg;
mod motion;
mod offline_hr;
mod ppg;
mod ppi;
mod temperature;

pub use ecg::decode_ecg;
pub use motion::{decode_acc, decode_gyro, decode_magnetometer};
pub use offline_hr::decode_offline_hr;
pub use ppg::decode_ppg;
pub use ppi::decode_ppi;
pub use temperature::decode_temperature;

use std::slice::ChunksExact;

use crate::error::PmdError;
use crate::frame::{FrameContext, MeasurementFrame};
use crate::protocol::PmdMeasurementType;
use crate::types::PmdSamples;

/// Decode one frame into samples of its measurement type.
///
/// ```
/// # use polar_pmd::frame::{FrameContext, MeasurementFrame};
/// # use polar_pmd::parse::decode_frame;
/// # use polar_pmd::types::PmdSamples;
/// let mut raw = vec![0x02];                                  // ACC
/// raw.extend_from_slice(&2_000_000_000u64.to_le_bytes());
/// raw.push(0x01);                                            // raw, type 1
/// raw.extend_from_slice(&[0xF7, 0xFF, 0xFF, 0xFF, 0xE7, 0x03]);
/// let frame = MeasurementFrame::parse(&raw).unwrap();
/// let ctx = FrameContext { sample_rate: Some(52), ..Default::default() };
/// match decode_frame(&frame, &ctx).unwrap() {
///     PmdSamples::Acc(s) => assert_eq!((s[0].x, s[0].y, s[0].z), (-9, -1, 999)),
///     other => panic!("{other:?}"),
/// }
/// ```
pub fn decode_frame(frame: &MeasurementFrame, ctx: &FrameContext) -> Result<PmdSamples, PmdError> {
    use PmdMeasurementType as T;
    match frame.measurement_type {
        T::Ecg => decode_ecg(frame, ctx).map(PmdSamples::Ecg),
        T::Ppg => decode_ppg(frame, ctx).map(PmdSamples::Ppg),
        T::Acc => decode_acc(frame, ctx).map(PmdSamples::Acc),
        T::Ppi => decode_ppi(frame).map(PmdSamples::Ppi),
        T::Gyro => decode_gyro(frame, ctx).map(PmdSamples::Gyro),
        T::Magnetometer => decode_magnetometer(frame, ctx).map(PmdSamples::Magnetometer),
        T::SkinTemperature => decode_temperature(frame, ctx).map(PmdSamples::SkinTemperature),
        T::Temperature => decode_temperature(frame, ctx).map(PmdSamples::Temperature),
        T::OfflineHr => decode_offline_hr(frame, ctx).map(PmdSamples::OfflineHr),
        T::SdkMode | T::Location | T::Pressure | T::OfflineRecording => Err(PmdError::format(
            format!("no stream decoder for {:?}", frame.measurement_type),
        )),
    }
}

pub(crate) fn unsupported(frame: &MeasurementFrame) -> PmdError {
    PmdError::UnsupportedFrameType {
        measurement: frame.measurement_type,
        compressed: frame.compressed,
        frame_type: frame.frame_type,
    }
}

/// Split a raw payload into fixed-size records, rejecting empty or ragged
/// payloads.
pub(crate) fn records<'a>(
    frame: &'a MeasurementFrame,
    record_len: usize,
) -> Result<ChunksExact<'a, u8>, PmdError> {
    let len = frame.payload.len();
    if len == 0 || len % record_len != 0 {
        return Err(PmdError::format(format!(
            "{:?} {:?} payload of {len} bytes is not a whole number of {record_len}-byte records",
            frame.measurement_type, frame.frame_type
        )));
    }
    Ok(frame.payload.chunks_exact(record_len))
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::frame::{FrameType, MeasurementFrame};
    use crate::protocol::PmdMeasurementType;

    pub fn frame(
        kind: PmdMeasurementType,
        timestamp: u64,
        compressed: bool,
        frame_type: FrameType,
        payload: &[u8],
    ) -> MeasurementFrame {
        MeasurementFrame {
            measurement_type: kind,
            timestamp,
            compressed,
            frame_type,
            payload: payload.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::frame;
    use super::*;
    use crate::frame::FrameType;

    #[test]
    fn dispatch_tags_samples_with_measurement_type() {
        let f = frame(PmdMeasurementType::Ecg, 1_000, false, FrameType::Type0, &[1, 0, 0]);
        let out = decode_frame(&f, &FrameContext::default()).unwrap();
        assert_eq!(out.measurement_type(), PmdMeasurementType::Ecg);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn non_stream_types_are_rejected() {
        let f = frame(PmdMeasurementType::Pressure, 0, false, FrameType::Type0, &[0; 4]);
        assert!(matches!(
            decode_frame(&f, &FrameContext::default()),
            Err(PmdError::DataFormat(_))
        ));
    }

    #[test]
    fn ragged_records_rejected() {
        let f = frame(PmdMeasurementType::Ecg, 0, false, FrameType::Type0, &[1, 2, 3, 4]);
        assert!(records(&f, 3).is_err());
        let f = frame(PmdMeasurementType::Ecg, 0, false, FrameType::Type0, &[]);
        assert!(records(&f, 3).is_err());
    }
}
