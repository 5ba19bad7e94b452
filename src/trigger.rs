//! Offline-recording trigger codec.
//!
//! Trigger status response parameters:
//!
//! ```text
//! [mode:1] then repeated
//!     [status:1][measurement type:1]
//!     [settings length:2 LE][settings TLV]   (only when status = enabled)
//! ```

use std::collections::BTreeMap;

use log::warn;
use serde::Serialize;

use crate::bits::ByteReader;
use crate::error::PmdError;
use crate::protocol::{PmdControlPointCommand, PmdMeasurementType};
use crate::secret::PmdSecret;
use crate::settings::PmdSetting;

/// Measurement types the recorder can be triggered for. All of them appear in
/// a parsed [`PmdOfflineTrigger`].
pub const TRIGGER_MEASUREMENTS: [PmdMeasurementType; 5] = [
    PmdMeasurementType::Ppi,
    PmdMeasurementType::Acc,
    PmdMeasurementType::Ppg,
    PmdMeasurementType::Gyro,
    PmdMeasurementType::Magnetometer,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum PmdOfflineTriggerMode {
    #[default]
    Disabled = 0,
    SystemStart = 1,
    ExerciseStart = 2,
}

impl PmdOfflineTriggerMode {
    pub fn from_u8(v: u8) -> Result<Self, PmdError> {
        match v {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::SystemStart),
            2 => Ok(Self::ExerciseStart),
            other => Err(PmdError::format(format!("unknown trigger mode {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum PmdOfflineTriggerStatus {
    #[default]
    Disabled = 0,
    Enabled = 1,
}

impl PmdOfflineTriggerStatus {
    pub fn from_u8(v: u8) -> Result<Self, PmdError> {
        match v {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::Enabled),
            other => Err(PmdError::format(format!("unknown trigger status {other}"))),
        }
    }
}

/// Trigger state for one measurement type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PmdTriggerEntry {
    pub status: PmdOfflineTriggerStatus,
    /// Present only when `status` is enabled.
    pub setting: Option<PmdSetting>,
}

/// Offline-recording trigger configuration read from the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PmdOfflineTrigger {
    pub mode: PmdOfflineTriggerMode,
    pub triggers: BTreeMap<PmdMeasurementType, PmdTriggerEntry>,
}

impl PmdOfflineTrigger {
    /// Parse the parameters of a trigger status response.
    ///
    /// Types the device does not list are reported as disabled. Entries for
    /// types outside [`TRIGGER_MEASUREMENTS`] are skipped.
    pub fn parse(data: &[u8]) -> Result<Self, PmdError> {
        let mut reader = ByteReader::new(data);
        let mode = PmdOfflineTriggerMode::from_u8(
            reader
                .u8()
                .map_err(|_| PmdError::too_short("offline trigger", 1, data.len()))?,
        )?;

        let mut triggers: BTreeMap<_, _> = TRIGGER_MEASUREMENTS
            .iter()
            .map(|kind| (*kind, PmdTriggerEntry::default()))
            .collect();

        while !reader.is_empty() {
            let status = PmdOfflineTriggerStatus::from_u8(reader.u8()?)?;
            let type_byte = reader
                .u8()
                .map_err(|_| PmdError::format("trigger entry missing measurement type"))?;
            let setting = match status {
                PmdOfflineTriggerStatus::Enabled => {
                    let len = usize::from(reader.u16_le()?);
                    Some(PmdSetting::parse(reader.take(len)?)?)
                }
                PmdOfflineTriggerStatus::Disabled => None,
            };
            match PmdMeasurementType::from_id(type_byte) {
                Some(kind) if triggers.contains_key(&kind) => {
                    triggers.insert(kind, PmdTriggerEntry { status, setting });
                }
                _ => warn!("ignoring offline trigger entry for type 0x{type_byte:02X}"),
            }
        }
        Ok(Self { mode, triggers })
    }

    pub fn entry(&self, kind: PmdMeasurementType) -> Option<&PmdTriggerEntry> {
        self.triggers.get(&kind)
    }
}

/// Encode SET_OFFLINE_RECORDING_TRIGGER_MODE.
pub fn encode_set_trigger_mode(mode: PmdOfflineTriggerMode) -> Vec<u8> {
    PmdControlPointCommand::SetOfflineRecordingTriggerMode.encode(&[mode as u8])
}

/// Encode SET_OFFLINE_RECORDING_TRIGGER_SETTINGS.
///
/// ```text
/// [0x09][status][type][selected settings][security descriptor]
/// ```
///
/// Settings and security are only sent when enabling.
pub fn encode_set_trigger_setting(
    kind: PmdMeasurementType,
    status: PmdOfflineTriggerStatus,
    setting: Option<&PmdSetting>,
    secret: Option<&PmdSecret>,
) -> Result<Vec<u8>, PmdError> {
    let mut params = vec![status as u8, kind.id()];
    if status == PmdOfflineTriggerStatus::Enabled {
        if let Some(setting) = setting {
            params.extend(setting.serialize_selected()?);
        }
        if let Some(secret) = secret {
            params.extend(secret.serialize());
        }
    }
    Ok(PmdControlPointCommand::SetOfflineRecordingTriggerSettings.encode(&params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::PmdSecretStrategy;
    use crate::settings::PmdSettingType;

    #[test]
    fn disabled_mode_still_lists_every_type() {
        let t = PmdOfflineTrigger::parse(&[0x00]).unwrap();
        assert_eq!(t.mode, PmdOfflineTriggerMode::Disabled);
        assert_eq!(t.triggers.len(), 5);
        assert!(t
            .triggers
            .values()
            .all(|e| e.status == PmdOfflineTriggerStatus::Disabled && e.setting.is_none()));
    }

    #[test]
    fn enabled_entry_carries_settings() {
        let data = [
            0x01, // system start
            0x01, 0x02, 0x07, 0x00, 0x00, 0x01, 0x34, 0x00, 0x04, 0x01, 0x03, // ACC enabled
            0x00, 0x03, // PPI disabled
            0x00, 0x00, // ECG ignored
        ];
        let t = PmdOfflineTrigger::parse(&data).unwrap();
        assert_eq!(t.mode, PmdOfflineTriggerMode::SystemStart);
        let acc = t.entry(PmdMeasurementType::Acc).unwrap();
        assert_eq!(acc.status, PmdOfflineTriggerStatus::Enabled);
        let setting = acc.setting.as_ref().unwrap();
        assert_eq!(setting.sample_rate(), Some(52));
        assert_eq!(setting.selected()[&PmdSettingType::Channels], 3);
        assert_eq!(
            t.entry(PmdMeasurementType::Ppi).unwrap().status,
            PmdOfflineTriggerStatus::Disabled
        );
        assert!(t.entry(PmdMeasurementType::Ecg).is_none());
        assert_eq!(t.triggers.len(), 5);
    }

    #[test]
    fn malformed_responses_fail() {
        assert!(PmdOfflineTrigger::parse(&[]).is_err());
        assert!(PmdOfflineTrigger::parse(&[0x03]).is_err());
        assert!(PmdOfflineTrigger::parse(&[0x01, 0x02, 0x02]).is_err());
        assert!(PmdOfflineTrigger::parse(&[0x01, 0x01]).is_err());
        assert!(PmdOfflineTrigger::parse(&[0x01, 0x01, 0x02, 0x04, 0x00, 0x00]).is_err());
    }

    #[test]
    fn setter_layouts() {
        assert_eq!(
            encode_set_trigger_mode(PmdOfflineTriggerMode::ExerciseStart),
            vec![0x08, 0x02]
        );
        let setting = PmdSetting::from_selected([(PmdSettingType::SampleRate, 52)]);
        let secret = PmdSecret::new(PmdSecretStrategy::Xor, vec![0x42]).unwrap();
        assert_eq!(
            encode_set_trigger_setting(
                PmdMeasurementType::Acc,
                PmdOfflineTriggerStatus::Enabled,
                Some(&setting),
                Some(&secret),
            )
            .unwrap(),
            vec![0x09, 0x01, 0x02, 0x00, 0x01, 0x34, 0x00, 0x06, 0x01, 0x01, 0x42]
        );
        assert_eq!(
            encode_set_trigger_setting(
                PmdMeasurementType::Ppi,
                PmdOfflineTriggerStatus::Disabled,
                Some(&setting),
                None,
            )
            .unwrap(),
            vec![0x09, 0x00, 0x03]
        );
    }
}
