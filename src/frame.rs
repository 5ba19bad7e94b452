//! PMD data-frame header.
//!
//! ```text
//! byte 0     : measurement type
//! bytes 1..9 : device timestamp of the last sample, u64 LE, nanoseconds
//! byte 9     : bit 7 = compressed, bits 0..6 = frame type index
//! bytes 10.. : payload
//! ```

use serde::Serialize;

use crate::error::PmdError;
use crate::protocol::PmdMeasurementType;
use crate::timestamps;

/// Frame layout selector carried in the low seven bits of byte 9.
///
/// Each measurement decoder matches on the `(compressed, FrameType)` pairs it
/// understands and rejects the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FrameType {
    Type0,
    Type1,
    Type2,
    Type3,
    Type4,
    Type5,
    Type6,
    Type7,
    Type8,
    Type9,
    Type10,
}

impl FrameType {
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Type0),
            1 => Some(Self::Type1),
            2 => Some(Self::Type2),
            3 => Some(Self::Type3),
            4 => Some(Self::Type4),
            5 => Some(Self::Type5),
            6 => Some(Self::Type6),
            7 => Some(Self::Type7),
            8 => Some(Self::Type8),
            9 => Some(Self::Type9),
            10 => Some(Self::Type10),
            _ => None,
        }
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }
}

/// One decoded-header PMD notification.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementFrame {
    pub measurement_type: PmdMeasurementType,
    /// Device timestamp of the last sample, nanoseconds.
    pub timestamp: u64,
    pub compressed: bool,
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl MeasurementFrame {
    /// Fixed header length preceding the payload.
    pub const HEADER_LEN: usize = 10;

    const COMPRESSED_BIT: u8 = 0x80;

    /// Split a raw notification into header fields and payload.
    ///
    /// Payload length is validated later, by the decoder for the measurement
    /// type, against what the frame type declares.
    pub fn parse(data: &[u8]) -> Result<Self, PmdError> {
        if data.len() < Self::HEADER_LEN {
            return Err(PmdError::too_short("frame header", Self::HEADER_LEN, data.len()));
        }
        let measurement_type = PmdMeasurementType::try_from(data[0])?;
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&data[1..9]);
        let type_byte = data[9];
        let frame_type = FrameType::from_index(type_byte & !Self::COMPRESSED_BIT).ok_or_else(|| {
            PmdError::format(format!("unknown frame type {}", type_byte & !Self::COMPRESSED_BIT))
        })?;
        Ok(Self {
            measurement_type,
            timestamp: u64::from_le_bytes(ts),
            compressed: type_byte & Self::COMPRESSED_BIT != 0,
            frame_type,
            payload: data[Self::HEADER_LEN..].to_vec(),
        })
    }

    /// Timestamps for `count` samples in this frame.
    pub fn sample_timestamps(
        &self,
        ctx: &FrameContext,
        count: usize,
    ) -> Result<Vec<u64>, PmdError> {
        timestamps::reconstruct(ctx.previous_timestamp, self.timestamp, count, ctx.sample_rate)
    }
}

/// Stream state a decoder needs beyond the frame itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Timestamp of the previous frame of the same stream, 0 if none.
    pub previous_timestamp: u64,
    /// Device-supplied scale factor from the start response.
    pub factor: f32,
    /// Selects rate-anchored timestamps when present.
    pub sample_rate: Option<u32>,
}

impl Default for FrameContext {
    fn default() -> Self {
        Self {
            previous_timestamp: 0,
            factor: 1.0,
            sample_rate: None,
        }
    }
}
