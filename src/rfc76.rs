//! RFC76 framing used on the PSFTP MTU characteristic.
//!
//! Every notification starts with one header byte:
//!
//! ```text
//! bit 0     next      0 = first frame of a message, 1 = continuation
//! bits 1-2  status    0b11 = more, 0b01 = last, 0b00 = error / interrupt
//! bit 3     reserved
//! bits 4-7  sequence  wraps at 16
//! ```
//!
//! An error frame carries a little-endian `u16` code; an error frame with no
//! payload is an interrupt. Neither ends an in-progress reassembly.

use log::{debug, warn};

use crate::error::PmdError;

const NEXT_BIT: u8 = 0x01;
const STATUS_SHIFT: u8 = 1;
const STATUS_MASK: u8 = 0x03;
const SEQUENCE_SHIFT: u8 = 4;
const SEQUENCE_MODULO: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Rfc76Status {
    Error = 0b00,
    Last = 0b01,
    More = 0b11,
}

impl Rfc76Status {
    fn from_bits(bits: u8) -> Result<Self, PmdError> {
        match bits {
            0b00 => Ok(Self::Error),
            0b01 => Ok(Self::Last),
            0b11 => Ok(Self::More),
            other => Err(PmdError::format(format!("RFC76 status bits {other:02b}"))),
        }
    }
}

/// One RFC76 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rfc76Frame {
    pub next: bool,
    pub status: Rfc76Status,
    pub sequence_number: u8,
    pub payload: Vec<u8>,
}

impl Rfc76Frame {
    /// ```
    /// # use polar_pmd::rfc76::{Rfc76Frame, Rfc76Status};
    /// let f = Rfc76Frame::parse(&[0x02, 0xFF, 0x00]).unwrap();
    /// assert!(!f.next);
    /// assert_eq!(f.status, Rfc76Status::Last);
    /// assert_eq!(f.sequence_number, 0);
    /// assert_eq!(f.payload, vec![0xFF, 0x00]);
    /// ```
    pub fn parse(data: &[u8]) -> Result<Self, PmdError> {
        let (&header, payload) = data
            .split_first()
            .ok_or_else(|| PmdError::too_short("RFC76 frame", 1, 0))?;
        Ok(Self {
            next: header & NEXT_BIT != 0,
            status: Rfc76Status::from_bits((header >> STATUS_SHIFT) & STATUS_MASK)?,
            sequence_number: header >> SEQUENCE_SHIFT,
            payload: payload.to_vec(),
        })
    }

    pub fn header(&self) -> u8 {
        u8::from(self.next)
            | ((self.status as u8) << STATUS_SHIFT)
            | ((self.sequence_number % SEQUENCE_MODULO) << SEQUENCE_SHIFT)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Error frame with no payload.
    pub fn is_interrupt(&self) -> bool {
        self.status == Rfc76Status::Error && self.payload.is_empty()
    }

    /// Protocol error code of an error frame.
    pub fn error_code(&self) -> Option<u16> {
        match (self.status, self.payload.as_slice()) {
            (Rfc76Status::Error, [lo, hi, ..]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
enum ReassemblyState {
    #[default]
    Idle,
    Accumulating(Vec<u8>),
}

/// Single-message reassembly state machine.
///
/// Error frames never interrupt a message in progress. The code of the most
/// recent one is kept for [`take_error`](Self::take_error).
#[derive(Debug, Default)]
pub struct Rfc76Reassembler {
    state: ReassemblyState,
    last_error: Option<u16>,
}

impl Rfc76Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ReassemblyState::Idle)
    }

    /// Drop any partial message and any remembered error.
    pub fn reset(&mut self) {
        self.state = ReassemblyState::Idle;
        self.last_error = None;
    }

    /// Code of the latest dropped error frame as [`PmdError::Protocol`],
    /// clearing it.
    pub fn take_error(&mut self) -> Option<PmdError> {
        self.last_error.take().map(|code| PmdError::Protocol { code })
    }

    /// Feed one frame; returns the complete message when `frame` is the last
    /// one.
    pub fn push(&mut self, frame: Rfc76Frame) -> Option<Vec<u8>> {
        if frame.status == Rfc76Status::Error {
            match frame.error_code() {
                Some(code) => {
                    debug!("RFC76: dropping error frame, code 0x{code:04X}");
                    self.last_error = Some(code);
                }
                None if frame.is_interrupt() => debug!("RFC76: dropping interrupt frame"),
                None => debug!("RFC76: dropping malformed error frame {:02X?}", frame.payload),
            }
            return None;
        }

        let state = std::mem::take(&mut self.state);
        let buffer = match (state, frame.next) {
            (ReassemblyState::Idle, false) => frame.payload,
            (ReassemblyState::Accumulating(partial), false) => {
                warn!(
                    "RFC76: new message started, discarding {} buffered bytes",
                    partial.len()
                );
                frame.payload
            }
            (ReassemblyState::Accumulating(mut partial), true) => {
                partial.extend_from_slice(&frame.payload);
                partial
            }
            (ReassemblyState::Idle, true) => {
                warn!(
                    "RFC76: continuation seq {} with no message in progress",
                    frame.sequence_number
                );
                return None;
            }
        };

        match frame.status {
            Rfc76Status::Last => Some(buffer),
            _ => {
                self.state = ReassemblyState::Accumulating(buffer);
                None
            }
        }
    }
}

/// Split `message` into encoded frames of at most `mtu` bytes each.
///
/// Sequence numbers start at `first_sequence` and wrap at 16.
pub fn fragment(message: &[u8], mtu: usize, first_sequence: u8) -> Result<Vec<Vec<u8>>, PmdError> {
    if mtu < 2 {
        return Err(PmdError::format(format!("RFC76 MTU {mtu} leaves no room for payload")));
    }
    let chunk_len = mtu - 1;
    let chunks: Vec<&[u8]> = if message.is_empty() {
        vec![message]
    } else {
        message.chunks(chunk_len).collect()
    };
    let last = chunks.len() - 1;
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            Rfc76Frame {
                next: i != 0,
                status: if i == last { Rfc76Status::Last } else { Rfc76Status::More },
                sequence_number: ((usize::from(first_sequence) + i) % usize::from(SEQUENCE_MODULO))
                    as u8,
                payload: chunk.to_vec(),
            }
            .encode()
        })
        .collect())
}
