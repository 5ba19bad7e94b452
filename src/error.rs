//! Error taxonomy shared by every decoder and by the stream orchestrator.

use thiserror::Error;

use crate::frame::FrameType;
use crate::protocol::PmdMeasurementType;

/// Errors raised by the PMD codec and by [`crate::pmd_client::PmdClient`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PmdError {
    /// Malformed or undersized buffer, invalid enumerant or key-length mismatch.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// The decoder for `measurement` has no form for this `(compressed, frame_type)` pair.
    #[error("unsupported {measurement:?} frame: compressed={compressed} type={frame_type:?}")]
    UnsupportedFrameType {
        measurement: PmdMeasurementType,
        compressed: bool,
        frame_type: FrameType,
    },

    /// Protocol-level error frame carrying a numeric code.
    #[error("protocol error, code 0x{code:04X}")]
    Protocol { code: u16 },

    /// Control point answered a command with a non-success status.
    #[error("control point command 0x{opcode:02X} failed with status {status}")]
    ControlPoint { opcode: u8, status: u8 },

    /// The transport reported a failure alongside a notification.
    #[error("transport error, code {0}")]
    Transport(u8),

    /// The link is gone; outstanding waits are failed with this value.
    #[error("device disconnected")]
    Disconnected,

    /// The device stopped the measurement stream on its own.
    #[error("{0:?} stream closed by device")]
    StreamClosed(PmdMeasurementType),

    /// A stream for this measurement type is already active.
    #[error("{0:?} is already streaming")]
    AlreadyStreaming(PmdMeasurementType),

    /// No control point response arrived within the configured timeout.
    #[error("timed out waiting for control point response")]
    Timeout,
}

impl PmdError {
    /// Shorthand for [`PmdError::DataFormat`].
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::DataFormat(msg.into())
    }

    /// Undersized-buffer error with the standard wording.
    pub(crate) fn too_short(what: &str, needed: usize, actual: usize) -> Self {
        Self::DataFormat(format!("{what}: need {needed} bytes, got {actual}"))
    }
}
