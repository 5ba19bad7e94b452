//! Measurement settings TLV codec.
//!
//! ```text
//! repeated: [type:1][count:1][value × count]
//! ```
//!
//! Value width depends on the type (see [`PmdSettingType::field_size`]).
//! A settings response lists every available value per type; a start
//! request carries exactly one value per type.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::bits::{unsigned_le, ByteReader};
use crate::error::PmdError;
use crate::secret::PmdSecretStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[repr(u8)]
pub enum PmdSettingType {
    SampleRate = 0,
    Resolution = 1,
    Range = 2,
    RangeMilliUnit = 3,
    Channels = 4,
    Factor = 5,
    Security = 6,
}

impl PmdSettingType {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::SampleRate),
            1 => Some(Self::Resolution),
            2 => Some(Self::Range),
            3 => Some(Self::RangeMilliUnit),
            4 => Some(Self::Channels),
            5 => Some(Self::Factor),
            6 => Some(Self::Security),
            _ => None,
        }
    }

    /// Bytes per value on the wire.
    ///
    /// Security records carry a one-byte strategy followed by a raw key and
    /// are handled separately.
    pub const fn field_size(self) -> usize {
        match self {
            Self::SampleRate | Self::Resolution | Self::Range => 2,
            Self::RangeMilliUnit | Self::Factor => 4,
            Self::Channels | Self::Security => 1,
        }
    }
}

/// Settings keyed by type. Each set holds the available values, or a single
/// value when the setting describes a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PmdSetting {
    pub settings: BTreeMap<PmdSettingType, BTreeSet<u32>>,
}

impl PmdSetting {
    /// Parse a settings TLV stream.
    ///
    /// ```
    /// # use polar_pmd::settings::{PmdSetting, PmdSettingType};
    /// let s = PmdSetting::parse(&[0x00, 0x01, 0x34, 0x00, 0x04, 0x01, 0x03]).unwrap();
    /// assert!(s.values(PmdSettingType::SampleRate).unwrap().contains(&52));
    /// assert!(s.values(PmdSettingType::Channels).unwrap().contains(&3));
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self, PmdError> {
        let mut reader = ByteReader::new(data);
        let mut settings = BTreeMap::new();
        while !reader.is_empty() {
            let (type_byte, count) = match (reader.u8(), reader.u8()) {
                (Ok(t), Ok(c)) => (t, usize::from(c)),
                _ => return Err(PmdError::format("setting record truncated in header")),
            };
            let kind = PmdSettingType::from_u8(type_byte)
                .ok_or_else(|| PmdError::format(format!("unknown setting type {type_byte}")))?;
            if settings.contains_key(&kind) {
                return Err(PmdError::format(format!("duplicate {kind:?} setting record")));
            }
            let mut values = BTreeSet::new();
            for _ in 0..count {
                let value = if kind == PmdSettingType::Security {
                    let code = reader.u8()?;
                    let strategy = PmdSecretStrategy::from_u8(code)?;
                    reader.take(strategy.key_size())?;
                    u32::from(code)
                } else {
                    unsigned_le(reader.take(kind.field_size()).map_err(|_| {
                        PmdError::format(format!("{kind:?} setting value truncated"))
                    })?) as u32
                };
                values.insert(value);
            }
            settings.insert(kind, values);
        }
        Ok(Self { settings })
    }

    /// Build a selection with one value per type.
    ///
    /// A `Security` entry is kept for inspection but never serialized; send
    /// the key as a [`crate::secret::PmdSecret`] instead.
    pub fn from_selected(selected: impl IntoIterator<Item = (PmdSettingType, u32)>) -> Self {
        Self {
            settings: selected
                .into_iter()
                .map(|(k, v)| (k, BTreeSet::from([v])))
                .collect(),
        }
    }

    pub fn values(&self, kind: PmdSettingType) -> Option<&BTreeSet<u32>> {
        self.settings.get(&kind)
    }

    /// One value per type: the single selected value, or the lowest when
    /// the set lists several options.
    pub fn selected(&self) -> BTreeMap<PmdSettingType, u32> {
        self.settings
            .iter()
            .filter_map(|(k, v)| v.first().map(|first| (*k, *first)))
            .collect()
    }

    /// Selection of the highest available value for every type.
    pub fn max_settings(&self) -> Self {
        Self::from_selected(
            self.settings
                .iter()
                .filter_map(|(k, v)| v.last().map(|last| (*k, *last))),
        )
    }

    /// Encode the selection, one `count = 1` record per type.
    ///
    /// Security is never emitted here; the descriptor is appended by
    /// [`crate::secret::PmdSecret::serialize`]. A value too wide for its
    /// field is a data-format error.
    pub fn serialize_selected(&self) -> Result<Vec<u8>, PmdError> {
        let mut out = Vec::new();
        for (kind, value) in self.selected() {
            if kind == PmdSettingType::Security {
                continue;
            }
            let bytes = value.to_le_bytes();
            let (field, rest) = bytes.split_at(kind.field_size());
            if rest.iter().any(|&b| b != 0) {
                return Err(PmdError::format(format!(
                    "{kind:?} value {value} does not fit in {} bytes",
                    kind.field_size()
                )));
            }
            out.push(kind as u8);
            out.push(1);
            out.extend_from_slice(field);
        }
        Ok(out)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.selected().get(&PmdSettingType::SampleRate).copied()
    }

    /// Scale factor returned by the device in a start response.
    pub fn factor(&self) -> Option<f32> {
        self.selected()
            .get(&PmdSettingType::Factor)
            .map(|bits| f32::from_bits(*bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS_RESPONSE: [u8; 21] = [
        0x00, 0x01, 0x34, 0x00, 0x01, 0x01, 0x10, 0x00, 0x02, 0x04, 0xF5, 0x00, 0xF4, 0x01, 0xE8,
        0x03, 0xD0, 0x07, 0x04, 0x01, 0x03,
    ];

    #[test]
    fn parses_available_settings() {
        let s = PmdSetting::parse(&SETTINGS_RESPONSE).unwrap();
        assert_eq!(s.values(PmdSettingType::SampleRate), Some(&BTreeSet::from([52])));
        assert_eq!(s.values(PmdSettingType::Resolution), Some(&BTreeSet::from([16])));
        assert_eq!(
            s.values(PmdSettingType::Range),
            Some(&BTreeSet::from([245, 500, 1000, 2000]))
        );
        assert_eq!(s.values(PmdSettingType::Channels), Some(&BTreeSet::from([3])));
        assert_eq!(s.settings.len(), 4);
    }

    #[test]
    fn max_settings_picks_highest() {
        let s = PmdSetting::parse(&SETTINGS_RESPONSE).unwrap().max_settings();
        assert_eq!(s.selected()[&PmdSettingType::Range], 2000);
        assert_eq!(s.sample_rate(), Some(52));
    }

    #[test]
    fn selection_round_trips() {
        let selection = PmdSetting::from_selected([
            (PmdSettingType::SampleRate, 208),
            (PmdSettingType::Resolution, 16),
            (PmdSettingType::Range, 8),
            (PmdSettingType::RangeMilliUnit, 0x0102_0304),
            (PmdSettingType::Channels, 3),
        ]);
        let bytes = selection.serialize_selected().unwrap();
        assert_eq!(&bytes[..4], &[0x00, 0x01, 0xD0, 0x00]);
        assert_eq!(PmdSetting::parse(&bytes).unwrap(), selection);
    }

    #[test]
    fn range_milliunit_uses_four_bytes() {
        let s = PmdSetting::parse(&[0x03, 0x01, 0x10, 0x27, 0x00, 0x00]).unwrap();
        assert_eq!(s.values(PmdSettingType::RangeMilliUnit), Some(&BTreeSet::from([10_000])));
    }

    #[test]
    fn factor_is_float_bits() {
        let mut data = vec![0x05, 0x01];
        data.extend_from_slice(&0.000_244_140_62f32.to_bits().to_le_bytes());
        let s = PmdSetting::parse(&data).unwrap();
        assert_eq!(s.factor(), Some(0.000_244_140_62));
    }

    #[test]
    fn security_record_is_skipped_over() {
        let mut data = vec![0x06, 0x01, 0x01, 0xAA];
        data.extend_from_slice(&[0x00, 0x01, 0x82, 0x00]);
        let s = PmdSetting::parse(&data).unwrap();
        assert_eq!(s.values(PmdSettingType::Security), Some(&BTreeSet::from([1])));
        assert_eq!(s.sample_rate(), Some(130));
        assert!(PmdSetting::from_selected([(PmdSettingType::Security, 1)])
            .serialize_selected()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn oversized_value_is_rejected() {
        let err = PmdSetting::from_selected([(PmdSettingType::SampleRate, 70_000)])
            .serialize_selected()
            .unwrap_err();
        assert!(matches!(err, PmdError::DataFormat(_)));
        assert!(PmdSetting::from_selected([(PmdSettingType::Channels, 256)])
            .serialize_selected()
            .is_err());
        assert_eq!(
            PmdSetting::from_selected([(PmdSettingType::Channels, 255)])
                .serialize_selected()
                .unwrap(),
            vec![0x04, 0x01, 0xFF]
        );
    }

    #[test]
    fn malformed_streams_fail() {
        assert!(PmdSetting::parse(&SETTINGS_RESPONSE[..20]).is_err());
        assert!(PmdSetting::parse(&[0x00]).is_err());
        assert!(PmdSetting::parse(&[0x09, 0x01, 0x00]).is_err());
        assert!(PmdSetting::parse(&[0x04, 0x01, 0x03, 0x04, 0x01, 0x03]).is_err());
        assert_eq!(PmdSetting::parse(&[]).unwrap(), PmdSetting::default());
    }
}
