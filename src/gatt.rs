//! Standard GATT characteristic decoders: Heart Rate Measurement and Health
//! Thermometer Temperature Measurement.

use crate::bits::ByteReader;
use crate::error::PmdError;
use crate::types::{HeartRateData, TemperatureUnit, ThermometerReading};

const HR_VALUE_U16: u8 = 0x01;
const HR_CONTACT_DETECTED: u8 = 0x02;
const HR_CONTACT_SUPPORTED: u8 = 0x04;
const HR_ENERGY_PRESENT: u8 = 0x08;
const HR_RR_PRESENT: u8 = 0x10;

const HTS_FAHRENHEIT: u8 = 0x01;
const HTS_TIMESTAMP_PRESENT: u8 = 0x02;
const HTS_TYPE_PRESENT: u8 = 0x04;
const HTS_TIMESTAMP_LEN: usize = 7;

/// Convert an RR interval from 1/1024 s to whole milliseconds, rounded.
pub fn rr_to_ms(rr: u16) -> u32 {
    (u32::from(rr) * 1000 + 512) / 1024
}

/// Decode a Heart Rate Measurement (0x2A37) value.
///
/// ```
/// # use polar_pmd::gatt::parse_heart_rate;
/// let hr = parse_heart_rate(&[0x00, 0xFF]).unwrap();
/// assert_eq!(hr.hr, 255);
/// assert!(!hr.sensor_contact);
/// assert!(hr.rrs.is_empty());
/// ```
pub fn parse_heart_rate(data: &[u8]) -> Result<HeartRateData, PmdError> {
    let mut reader = ByteReader::new(data);
    let flags = reader
        .u8()
        .map_err(|_| PmdError::too_short("heart rate measurement", 2, data.len()))?;

    let hr = if flags & HR_VALUE_U16 != 0 {
        reader.u16_le()?
    } else {
        u16::from(reader.u8()?)
    };
    let contact_supported = flags & HR_CONTACT_SUPPORTED != 0;
    let sensor_contact = contact_supported && flags & HR_CONTACT_DETECTED != 0;
    let energy_expended = if flags & HR_ENERGY_PRESENT != 0 {
        Some(reader.u16_le()?)
    } else {
        None
    };

    let mut rrs = Vec::new();
    if flags & HR_RR_PRESENT != 0 {
        while reader.remaining() >= 2 {
            rrs.push(reader.u16_le()?);
        }
    }
    let rrs_ms = rrs.iter().copied().map(rr_to_ms).collect();

    Ok(HeartRateData {
        hr,
        sensor_contact,
        contact_supported,
        energy_expended,
        rrs,
        rrs_ms,
    })
}

/// Decode a Temperature Measurement (0x2A1C) value.
///
/// `[flags][temperature: f32 LE][timestamp: 7 B]?[type: 1 B]?`
pub fn parse_thermometer(data: &[u8]) -> Result<ThermometerReading, PmdError> {
    let mut reader = ByteReader::new(data);
    let flags = reader
        .u8()
        .map_err(|_| PmdError::too_short("temperature measurement", 5, data.len()))?;
    let raw = reader
        .take(4)
        .map_err(|_| PmdError::too_short("temperature measurement", 5, data.len()))?;
    let temperature = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);

    if flags & HTS_TIMESTAMP_PRESENT != 0 {
        reader.take(HTS_TIMESTAMP_LEN)?;
    }
    let temperature_type = if flags & HTS_TYPE_PRESENT != 0 {
        Some(reader.u8()?)
    } else {
        None
    };

    Ok(ThermometerReading {
        temperature,
        unit: if flags & HTS_FAHRENHEIT != 0 {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        },
        temperature_type,
    })
}
