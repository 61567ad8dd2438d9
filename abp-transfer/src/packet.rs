//! Wire-format definitions for data packets and acknowledgments.
//!
//! This module is responsible for:
//! - Defining the alternating-bit sequence domain ([`Seq`]).
//! - Serialising a [`Packet`] / [`Ack`] into bytes ready for transmission.
//! - Parsing raw datagrams back, returning errors for malformed input.
//!
//! No I/O happens here; this is pure data transformation.  Integrity checking
//! is deliberately *not* part of [`Packet::decode`]: a packet with a bad
//! checksum is still a well-formed packet, and the receiver must answer it.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Sequence    |        Integrity code         |  Payload ...  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! An acknowledgment is a single byte carrying a [`Seq`] value.

use std::fmt;

use thiserror::Error;

use crate::checksum::ChecksumKind;

/// Byte length of the fixed-size packet header: seq(1) + checksum(2).
pub const HEADER_LEN: usize = 3;

/// Byte length of an acknowledgment datagram.
pub const ACK_LEN: usize = 1;

/// Sequence byte reserved for the end-of-stream marker.
pub const END_MARKER: u8 = 255;

const OFF_SEQ: usize = 0;
const OFF_CHECKSUM: usize = 1;

/// Alternating-bit sequence number, plus the end-of-stream sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seq {
    Zero,
    One,
    /// Final, empty packet of a transfer (wire value [`END_MARKER`]).
    End,
}

impl Seq {
    /// Parse a wire byte; `None` for anything outside {0, 1, 255}.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Seq::Zero),
            1 => Some(Seq::One),
            END_MARKER => Some(Seq::End),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Seq::Zero => 0,
            Seq::One => 1,
            Seq::End => END_MARKER,
        }
    }

    /// The other alternating bit.  The end marker has no successor.
    pub fn flip(self) -> Self {
        match self {
            Seq::Zero => Seq::One,
            Seq::One => Seq::Zero,
            Seq::End => Seq::End,
        }
    }

    pub fn is_end(self) -> bool {
        self == Seq::End
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seq::End => f.write_str("END"),
            other => write!(f, "{}", other.to_u8()),
        }
    }
}

/// A data packet (or the end marker) as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: Seq,
    /// Integrity code as carried on the wire; not necessarily valid.
    pub checksum: u16,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Frame `payload` under `seq`, computing the integrity code with `kind`.
    pub fn data(seq: Seq, payload: Vec<u8>, kind: ChecksumKind) -> Self {
        let checksum = kind.compute(&payload);
        Self {
            seq,
            checksum,
            payload,
        }
    }

    /// The end-of-stream marker: empty payload, all-zero checksum field.
    pub fn end_marker() -> Self {
        Self {
            seq: Seq::End,
            checksum: 0,
            payload: Vec::new(),
        }
    }

    /// `true` for an end marker that follows the framing convention exactly.
    pub fn is_well_formed_end_marker(&self) -> bool {
        self.seq.is_end() && self.checksum == 0 && self.payload.is_empty()
    }

    /// Recompute the integrity code over the payload and compare.
    pub fn integrity_ok(&self, kind: ChecksumKind) -> bool {
        kind.integrity_ok(&self.payload, self.checksum)
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        buf[OFF_SEQ] = self.seq.to_u8();
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&self.checksum.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the sequence byte is not 0, 1 or [`END_MARKER`].
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }
        let seq = Seq::from_u8(buf[OFF_SEQ]).ok_or(PacketError::UnknownSequence(buf[OFF_SEQ]))?;
        let checksum = u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);

        Ok(Packet {
            seq,
            checksum,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// A one-byte acknowledgment echoing a [`Seq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack(pub Seq);

impl Ack {
    pub fn seq(self) -> Seq {
        self.0
    }

    pub fn encode(self) -> [u8; ACK_LEN] {
        [self.0.to_u8()]
    }

    /// Parse an acknowledgment; anything but a single known byte is rejected.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        match buf {
            [b] => Seq::from_u8(*b)
                .map(Ack)
                .ok_or(PacketError::UnknownSequence(*b)),
            _ => Err(PacketError::BadAckLength(buf.len())),
        }
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("datagram of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    #[error("sequence byte {0} is outside the alternating-bit domain")]
    UnknownSequence(u8),
    #[error("acknowledgment must be exactly one byte, got {0}")]
    BadAckLength(usize),
    #[error("payload of {len} bytes exceeds the {max}-byte chunk size")]
    PayloadTooLarge { len: usize, max: usize },
}
