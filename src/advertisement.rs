//! Advertisement parsing for Polar devices: local name, HR broadcast in the
//! manufacturer data, and a median-filtered RSSI.

use std::collections::{HashMap, VecDeque};

use log::debug;
use serde::Serialize;

/// Bluetooth SIG company identifier of Polar Electro Oy.
pub const POLAR_COMPANY_ID: u16 = 0x006B;

/// Number of RSSI samples the median is taken over.
pub const RSSI_WINDOW: usize = 7;

const NAME_PREFIX: &str = "Polar";

const STATUS_BATTERY_LOW: u8 = 0x01;
const STATUS_SENSOR_CONTACT: u8 = 0x02;
const STATUS_FRAME_COUNTER_MASK: u8 = 0x1C;
const STATUS_FRAME_COUNTER_SHIFT: u8 = 2;

/// Model and short device id taken from a `"Polar <model> <id>"` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolarDeviceName {
    /// e.g. `"H10"` or `"Verity Sense"`.
    pub model: String,
    /// Hex id printed on the device, e.g. `"A1B2C3D4"`.
    pub device_id: String,
}

/// Parse an advertised local name.
///
/// ```
/// # use polar_pmd::advertisement::parse_local_name;
/// let n = parse_local_name("Polar H10 A1B2C3D4").unwrap();
/// assert_eq!(n.model, "H10");
/// assert_eq!(n.device_id, "A1B2C3D4");
/// assert!(parse_local_name("HRM-Pro 123456").is_none());
/// ```
pub fn parse_local_name(name: &str) -> Option<PolarDeviceName> {
    let mut words: Vec<&str> = name.split_whitespace().collect();
    if words.len() < 3 || words[0] != NAME_PREFIX {
        return None;
    }
    let device_id = words.pop()?;
    if !device_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(PolarDeviceName {
        model: words[1..].join(" "),
        device_id: device_id.to_owned(),
    })
}

/// Heart-rate broadcast carried in Polar manufacturer data.
///
/// Two payload shapes follow the company id:
///
/// ```text
/// [status][reserved][hr]              3 bytes
/// [status][reserved][hr][slow hr]     4 bytes
/// ```
///
/// Status bits: 0 = battery low, 1 = sensor contact, 2-4 = frame counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HrAdvertisement {
    pub battery_low: bool,
    pub sensor_contact: bool,
    pub frame_counter: u8,
    pub hr: u8,
    pub slow_hr: Option<u8>,
}

/// Parse one manufacturer-data entry. Returns `None` for other vendors and
/// for payloads that match neither shape.
pub fn parse_manufacturer_data(company_id: u16, data: &[u8]) -> Option<HrAdvertisement> {
    if company_id != POLAR_COMPANY_ID {
        return None;
    }
    let (status, hr, slow_hr) = match *data {
        [status, _, hr] => (status, hr, None),
        [status, _, hr, slow] => (status, hr, Some(slow)),
        _ => {
            debug!("unrecognised Polar manufacturer data {data:02X?}");
            return None;
        }
    };
    Some(HrAdvertisement {
        battery_low: status & STATUS_BATTERY_LOW != 0,
        sensor_contact: status & STATUS_SENSOR_CONTACT != 0,
        frame_counter: (status & STATUS_FRAME_COUNTER_MASK) >> STATUS_FRAME_COUNTER_SHIFT,
        hr,
        slow_hr,
    })
}

/// Running median over the last [`RSSI_WINDOW`] RSSI samples.
#[derive(Debug, Clone, Default)]
pub struct RssiFilter {
    samples: VecDeque<i16>,
}

impl RssiFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rssi: i16) {
        if self.samples.len() == RSSI_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(rssi);
    }

    /// Median of the window; the upper middle value when the count is even.
    pub fn median(&self) -> Option<i16> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<i16> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        Some(sorted[sorted.len() / 2])
    }
}

/// Per-device advertisement state accumulated across scan reports.
#[derive(Debug, Clone, Default)]
pub struct AdvertisementTracker {
    name: Option<PolarDeviceName>,
    rssi: RssiFilter,
    hr: Option<HrAdvertisement>,
    last_counter: Option<u8>,
    updated: bool,
}

impl AdvertisementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one advertisement report.
    pub fn process(
        &mut self,
        local_name: Option<&str>,
        rssi: Option<i16>,
        manufacturer_data: &HashMap<u16, Vec<u8>>,
    ) {
        if let Some(parsed) = local_name.and_then(parse_local_name) {
            self.name = Some(parsed);
        }
        if let Some(rssi) = rssi {
            self.rssi.push(rssi);
        }
        self.hr = manufacturer_data
            .iter()
            .find_map(|(id, data)| parse_manufacturer_data(*id, data));
        self.updated = match self.hr {
            Some(hr) => {
                let changed = self.last_counter != Some(hr.frame_counter);
                self.last_counter = Some(hr.frame_counter);
                changed
            }
            None => false,
        };
    }

    pub fn name(&self) -> Option<&PolarDeviceName> {
        self.name.as_ref()
    }

    pub fn rssi(&self) -> Option<i16> {
        self.rssi.median()
    }

    /// HR broadcast of the latest report, if it carried one.
    pub fn hr(&self) -> Option<&HrAdvertisement> {
        self.hr.as_ref()
    }

    /// Whether the latest report carried HR data with a new frame counter.
    pub fn is_updated(&self) -> bool {
        self.updated
    }
}
