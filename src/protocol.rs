//! GATT UUIDs, measurement identifiers, and control-point wire helpers for
//! Polar devices.
//!
//! PMD characteristics live in the Polar vendor namespace
//! `fb005cXX-02e7-f387-1cad-8acd2d8df0c8`; heart rate and health thermometer
//! use the Bluetooth SIG 16-bit assignments.

use std::collections::BTreeSet;

use serde::Serialize;
use uuid::Uuid;

use crate::error::PmdError;
use crate::secret::PmdSecret;
use crate::settings::PmdSetting;

// ── Services ─────────────────────────────────────────────────────────────────

/// Polar Measurement Data service.
pub const PMD_SERVICE: Uuid = Uuid::from_u128(0xfb005c80_02e7_f387_1cad_8acd2d8df0c8);

/// Standard Heart Rate service (0x180D).
pub const HR_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

/// Standard Health Thermometer service (0x1809).
pub const HTS_SERVICE: Uuid = Uuid::from_u128(0x00001809_0000_1000_8000_00805f9b34fb);

/// Polar file-transfer service whose MTU characteristic carries RFC76 frames.
pub const PSFTP_SERVICE: Uuid = Uuid::from_u128(0x0000feee_0000_1000_8000_00805f9b34fb);

// ── Characteristics ───────────────────────────────────────────────────────────

/// PMD control point.
///
/// Reading it returns the feature bitmap (see [`PmdFeature::parse`]); writes
/// carry `[opcode][params…]` commands and notifications carry either a
/// response (`0xF0 …`) or a device-issued command such as
/// [`ONLINE_MEASUREMENT_STOPPED`].
pub const PMD_CONTROL_POINT: Uuid = Uuid::from_u128(0xfb005c81_02e7_f387_1cad_8acd2d8df0c8);

/// PMD data characteristic; every notification is one measurement frame.
pub const PMD_DATA: Uuid = Uuid::from_u128(0xfb005c82_02e7_f387_1cad_8acd2d8df0c8);

/// Heart Rate Measurement (0x2A37).
pub const HR_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// Temperature Measurement (0x2A1C).
pub const TEMPERATURE_MEASUREMENT: Uuid =
    Uuid::from_u128(0x00002a1c_0000_1000_8000_00805f9b34fb);

/// PSFTP MTU characteristic, framed with RFC76.
pub const PSFTP_MTU: Uuid = Uuid::from_u128(0xfb005c51_02e7_f387_1cad_8acd2d8df0c8);

// ── Measurement types ─────────────────────────────────────────────────────────

/// Mask applied to a type byte before lookup; the top bits carry the
/// recording type in control-point commands.
pub const MEASUREMENT_BIT_MASK: u8 = 0x3F;

/// Measurement kinds known to the PMD protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum PmdMeasurementType {
    Ecg = 0,
    Ppg = 1,
    Acc = 2,
    Ppi = 3,
    Gyro = 5,
    Magnetometer = 6,
    SkinTemperature = 7,
    SdkMode = 9,
    Location = 10,
    Pressure = 11,
    Temperature = 12,
    OfflineRecording = 13,
    OfflineHr = 14,
}

impl PmdMeasurementType {
    /// Look up a measurement type from a (possibly flagged) type byte.
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id & MEASUREMENT_BIT_MASK {
            0 => Some(Self::Ecg),
            1 => Some(Self::Ppg),
            2 => Some(Self::Acc),
            3 => Some(Self::Ppi),
            5 => Some(Self::Gyro),
            6 => Some(Self::Magnetometer),
            7 => Some(Self::SkinTemperature),
            9 => Some(Self::SdkMode),
            10 => Some(Self::Location),
            11 => Some(Self::Pressure),
            12 => Some(Self::Temperature),
            13 => Some(Self::OfflineRecording),
            14 => Some(Self::OfflineHr),
            _ => None,
        }
    }

    /// Wire id of this type.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PmdMeasurementType {
    type Error = PmdError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id)
            .ok_or_else(|| PmdError::format(format!("unknown measurement type 0x{id:02X}")))
    }
}

/// Whether a command addresses the live stream or the on-device recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PmdRecordingType {
    #[default]
    Online,
    Offline,
}

impl PmdRecordingType {
    /// Bits OR-ed into the measurement type byte of a command.
    #[must_use]
    pub const fn as_bit_field(self) -> u8 {
        match self {
            Self::Online => 0x00,
            Self::Offline => 0x80,
        }
    }
}

// ── Control point ─────────────────────────────────────────────────────────────

/// Leading byte of every control-point response.
pub const CONTROL_POINT_RESPONSE_CODE: u8 = 0xF0;

/// Leading byte of the device-issued "measurements stopped" notification.
///
/// Followed by one type byte per stopped measurement.
pub const ONLINE_MEASUREMENT_STOPPED: u8 = 0x01;

/// Host-to-device control-point opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PmdControlPointCommand {
    GetMeasurementSettings = 1,
    RequestMeasurementStart = 2,
    StopMeasurement = 3,
    GetSdkModeSettings = 4,
    GetMeasurementStatus = 5,
    GetSdkModeStatus = 6,
    GetOfflineRecordingTriggerStatus = 7,
    SetOfflineRecordingTriggerMode = 8,
    SetOfflineRecordingTriggerSettings = 9,
}

impl PmdControlPointCommand {
    /// Frame a command as `[opcode][params…]`.
    #[must_use]
    pub fn encode(self, params: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + params.len());
        out.push(self as u8);
        out.extend_from_slice(params);
        out
    }
}

/// Encode a GET_MEASUREMENT_SETTINGS request.
pub fn encode_get_settings(kind: PmdMeasurementType, recording: PmdRecordingType) -> Vec<u8> {
    PmdControlPointCommand::GetMeasurementSettings.encode(&[kind.id() | recording.as_bit_field()])
}

/// Encode a REQUEST_MEASUREMENT_START request.
///
/// ```text
/// [0x02][type | recording bit][selected settings TLV][security descriptor]
/// ```
pub fn encode_start(
    kind: PmdMeasurementType,
    recording: PmdRecordingType,
    settings: &PmdSetting,
    secret: Option<&PmdSecret>,
) -> Result<Vec<u8>, PmdError> {
    let mut params = vec![kind.id() | recording.as_bit_field()];
    params.extend(settings.serialize_selected()?);
    if let Some(secret) = secret {
        params.extend(secret.serialize());
    }
    Ok(PmdControlPointCommand::RequestMeasurementStart.encode(&params))
}

/// Encode a STOP_MEASUREMENT request.
pub fn encode_stop(kind: PmdMeasurementType, recording: PmdRecordingType) -> Vec<u8> {
    PmdControlPointCommand::StopMeasurement.encode(&[kind.id() | recording.as_bit_field()])
}

/// Named control-point status codes. Anything else is carried as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmdControlPointStatus {
    Success,
    InvalidOpCode,
    InvalidMeasurementType,
    NotSupported,
    InvalidLength,
    InvalidParameter,
    AlreadyInState,
    InvalidResolution,
    InvalidSampleRate,
    InvalidRange,
    InvalidMtu,
    InvalidNumberOfChannels,
    InvalidState,
    DeviceInCharger,
    DiskFull,
    Unknown(u8),
}

impl From<u8> for PmdControlPointStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::InvalidOpCode,
            2 => Self::InvalidMeasurementType,
            3 => Self::NotSupported,
            4 => Self::InvalidLength,
            5 => Self::InvalidParameter,
            6 => Self::AlreadyInState,
            7 => Self::InvalidResolution,
            8 => Self::InvalidSampleRate,
            9 => Self::InvalidRange,
            10 => Self::InvalidMtu,
            11 => Self::InvalidNumberOfChannels,
            12 => Self::InvalidState,
            13 => Self::DeviceInCharger,
            14 => Self::DiskFull,
            other => Self::Unknown(other),
        }
    }
}

/// A parsed control-point response.
///
/// ```text
/// byte 0 : 0xF0
/// byte 1 : opcode being answered
/// byte 2 : measurement type
/// byte 3 : status (0 = success)
/// byte 4 : "more" flag, present only when the response carries parameters
/// 5..    : parameters
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmdControlPointResponse {
    pub opcode: u8,
    pub measurement_type: u8,
    pub status: u8,
    pub more: bool,
    pub parameters: Vec<u8>,
}

impl PmdControlPointResponse {
    pub fn parse(data: &[u8]) -> Result<Self, PmdError> {
        if data.len() < 4 {
            return Err(PmdError::too_short("control point response", 4, data.len()));
        }
        if data[0] != CONTROL_POINT_RESPONSE_CODE {
            return Err(PmdError::format(format!(
                "control point response code 0x{:02X}",
                data[0]
            )));
        }
        Ok(Self {
            opcode: data[1],
            measurement_type: data[2],
            status: data[3],
            more: data.len() > 4 && data[4] != 0,
            parameters: data.get(5..).map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn status(&self) -> PmdControlPointStatus {
        PmdControlPointStatus::from(self.status)
    }

    /// Turn a non-success status into [`PmdError::ControlPoint`].
    pub fn into_result(self) -> Result<Self, PmdError> {
        match self.status() {
            PmdControlPointStatus::Success => Ok(self),
            _ => Err(PmdError::ControlPoint {
                opcode: self.opcode,
                status: self.status,
            }),
        }
    }
}

// ── Feature bitmap ────────────────────────────────────────────────────────────

/// Leading byte of the feature bitmap read from the control point.
pub const PMD_FEATURE_CODE: u8 = 0x0F;

/// Measurements advertised by the device's PMD feature bitmap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PmdFeature {
    pub supported: BTreeSet<PmdMeasurementType>,
}

impl PmdFeature {
    /// Parse `[0x0F][bitmap0][bitmap1]`.
    ///
    /// | Byte | Bit | Measurement |
    /// |---|---|---|
    /// | 1 | 0 | ECG |
    /// | 1 | 1 | PPG |
    /// | 1 | 2 | ACC |
    /// | 1 | 3 | PPI |
    /// | 1 | 5 | Gyroscope |
    /// | 1 | 6 | Magnetometer |
    /// | 1 | 7 | Skin temperature |
    /// | 2 | 1 | SDK mode |
    /// | 2 | 2 | Location |
    /// | 2 | 3 | Pressure |
    /// | 2 | 4 | Temperature |
    /// | 2 | 5 | Offline recording |
    /// | 2 | 6 | Offline HR |
    pub fn parse(data: &[u8]) -> Result<Self, PmdError> {
        if data.len() < 3 {
            return Err(PmdError::too_short("PMD feature", 3, data.len()));
        }
        if data[0] != PMD_FEATURE_CODE {
            return Err(PmdError::format(format!("PMD feature code 0x{:02X}", data[0])));
        }
        use PmdMeasurementType::*;
        const FIRST: [(u8, PmdMeasurementType); 7] = [
            (0x01, Ecg),
            (0x02, Ppg),
            (0x04, Acc),
            (0x08, Ppi),
            (0x20, Gyro),
            (0x40, Magnetometer),
            (0x80, SkinTemperature),
        ];
        const SECOND: [(u8, PmdMeasurementType); 6] = [
            (0x02, SdkMode),
            (0x04, Location),
            (0x08, Pressure),
            (0x10, Temperature),
            (0x20, OfflineRecording),
            (0x40, OfflineHr),
        ];
        let mut supported = BTreeSet::new();
        for (mask, kind) in FIRST {
            if data[1] & mask != 0 {
                supported.insert(kind);
            }
        }
        for (mask, kind) in SECOND {
            if data[2] & mask != 0 {
                supported.insert(kind);
            }
        }
        Ok(Self { supported })
    }

    #[must_use]
    pub fn is_supported(&self, kind: PmdMeasurementType) -> bool {
        self.supported.contains(&kind)
    }
}
