//! Sample and event types produced by the decoders and the client.
//!
//! Every PMD sample carries its reconstructed device timestamp in
//! nanoseconds (see [`crate::timestamps`]).

use serde::Serialize;

use crate::protocol::PmdMeasurementType;

/// One accelerometer sample in milli-g.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccSample {
    pub timestamp: u64,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// One three-axis sample in sensor units after factor scaling
/// (°/s for the gyroscope, gauss for the magnetometer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct XyzSample {
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One ECG sample in µV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EcgSample {
    pub timestamp: u64,
    pub voltage: i32,
}

/// Optical (PPG) samples. The shape depends on the frame type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PpgSample {
    /// Three optical channels plus the ambient channel.
    Channels {
        timestamp: u64,
        ppg: [i32; 3],
        ambient: i32,
    },
    /// Sport profile the optical front end is tuned for.
    SportId { timestamp: u64, sport_id: u64 },
    /// Integration-time and LED gain table: three rows of twelve entries.
    Calibration {
        timestamp: u64,
        num_int_ts: [u8; 12],
        channel1_gain: [u8; 12],
        channel2_gain: [u8; 12],
    },
    /// Status word followed by four groups of four optical channels.
    Grouped {
        timestamp: u64,
        status: u32,
        groups: [[i32; 4]; 4],
    },
}

impl PpgSample {
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Channels { timestamp, .. }
            | Self::SportId { timestamp, .. }
            | Self::Calibration { timestamp, .. }
            | Self::Grouped { timestamp, .. } => *timestamp,
        }
    }
}

/// One pulse-to-pulse interval record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PpiSample {
    pub timestamp: u64,
    pub hr: u8,
    pub pp_ms: u16,
    pub pp_error_estimate: u16,
    pub blocker: bool,
    pub skin_contact_status: bool,
    pub skin_contact_supported: bool,
}

/// One heart-rate sample recorded offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OfflineHrSample {
    pub timestamp: u64,
    pub hr: u8,
    /// Present on the three-byte record layout only.
    pub ppg_quality: Option<u8>,
    pub corrected_hr: Option<u8>,
}

/// One temperature sample in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureSample {
    pub timestamp: u64,
    pub temperature: f32,
}

/// All samples decoded from one PMD frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "samples", rename_all = "snake_case")]
pub enum PmdSamples {
    Ecg(Vec<EcgSample>),
    Ppg(Vec<PpgSample>),
    Acc(Vec<AccSample>),
    Ppi(Vec<PpiSample>),
    Gyro(Vec<XyzSample>),
    Magnetometer(Vec<XyzSample>),
    SkinTemperature(Vec<TemperatureSample>),
    Temperature(Vec<TemperatureSample>),
    OfflineHr(Vec<OfflineHrSample>),
}

impl PmdSamples {
    pub fn measurement_type(&self) -> PmdMeasurementType {
        match self {
            Self::Ecg(_) => PmdMeasurementType::Ecg,
            Self::Ppg(_) => PmdMeasurementType::Ppg,
            Self::Acc(_) => PmdMeasurementType::Acc,
            Self::Ppi(_) => PmdMeasurementType::Ppi,
            Self::Gyro(_) => PmdMeasurementType::Gyro,
            Self::Magnetometer(_) => PmdMeasurementType::Magnetometer,
            Self::SkinTemperature(_) => PmdMeasurementType::SkinTemperature,
            Self::Temperature(_) => PmdMeasurementType::Temperature,
            Self::OfflineHr(_) => PmdMeasurementType::OfflineHr,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Ecg(s) => s.len(),
            Self::Ppg(s) => s.len(),
            Self::Acc(s) => s.len(),
            Self::Ppi(s) => s.len(),
            Self::Gyro(s) | Self::Magnetometer(s) => s.len(),
            Self::SkinTemperature(s) | Self::Temperature(s) => s.len(),
            Self::OfflineHr(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Heart Rate Measurement characteristic value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartRateData {
    pub hr: u16,
    /// Sensor contact detected. Only meaningful when `contact_supported`.
    pub sensor_contact: bool,
    pub contact_supported: bool,
    /// Accumulated energy in kJ, when the sensor reports it.
    pub energy_expended: Option<u16>,
    /// RR intervals in 1/1024 s, as received.
    pub rrs: Vec<u16>,
    /// RR intervals converted to milliseconds.
    pub rrs_ms: Vec<u32>,
}

/// Temperature unit flag of the Health Thermometer measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

/// Health Thermometer measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThermometerReading {
    pub temperature: f32,
    pub unit: TemperatureUnit,
    /// Body location code, when present.
    pub temperature_type: Option<u8>,
}

/// Events emitted by [`crate::ble::PolarHandle`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PolarEvent {
    /// GATT services discovered; carries the advertised name.
    Connected { name: String },
    HeartRate(HeartRateData),
    Thermometer(ThermometerReading),
    /// The BLE link was lost; no further events follow.
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_serialize_with_type_tag() {
        let samples = PmdSamples::Ecg(vec![EcgSample { timestamp: 5, voltage: -12 }]);
        assert_eq!(samples.measurement_type(), PmdMeasurementType::Ecg);
        assert_eq!(samples.len(), 1);
        let json = serde_json::to_value(&samples).unwrap();
        assert_eq!(json["type"], "ecg");
        assert_eq!(json["samples"][0]["voltage"], -12);
    }

    #[test]
    fn ppg_variants_carry_kind() {
        let s = PpgSample::SportId { timestamp: 9, sport_id: 3 };
        assert_eq!(s.timestamp(), 9);
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["kind"], "sport_id");
        assert_eq!(json["sport_id"], 3);
    }

    #[test]
    fn events_serialize_with_event_tag() {
        let json = serde_json::to_value(PolarEvent::Connected { name: "Polar H10 A1B2C3D4".into() })
            .unwrap();
        assert_eq!(json["event"], "connected");
        assert_eq!(json["name"], "Polar H10 A1B2C3D4");
        let json = serde_json::to_value(PolarEvent::Disconnected).unwrap();
        assert_eq!(json["event"], "disconnected");
    }
}
