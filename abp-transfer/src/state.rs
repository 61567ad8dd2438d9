//! Finite-state-machine types for both roles.
//!
//! Transitions live in [`crate::sender`] and [`crate::receiver`]; keeping the
//! state enums here lets sessions, events and tests talk about states without
//! depending on either machine.

use std::fmt;

use crate::packet::Seq;

/// Sender lifecycle.
///
/// ```text
///  IDLE ──chunk sent──▶ AWAITING_ACK(seq) ──matching ack──▶ IDLE
///    │                        │  ▲
///    │ source exhausted       └──┘ timeout: resend same bytes
///    ▼
///  AWAITING_EOF_ACK ──END ack──▶ DONE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// No packet in flight; the next chunk may be sent.
    #[default]
    Idle,
    /// A data packet carrying this bit is in flight.
    AwaitingAck(Seq),
    /// The end marker is in flight.
    AwaitingEofAck,
    /// END ack received; the session is over.
    Done,
}

/// Receiver lifecycle.
///
/// ```text
///  AWAITING_PACKET ──packet──▶ AWAITING_PACKET
///         │
///         └──END marker──▶ CLOSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    AwaitingPacket,
    Closed,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderState::Idle => f.write_str("IDLE"),
            SenderState::AwaitingAck(seq) => write!(f, "AWAITING_ACK({seq})"),
            SenderState::AwaitingEofAck => f.write_str("AWAITING_EOF_ACK"),
            SenderState::Done => f.write_str("DONE"),
        }
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverState::AwaitingPacket => f.write_str("AWAITING_PACKET"),
            ReceiverState::Closed => f.write_str("CLOSED"),
        }
    }
}
