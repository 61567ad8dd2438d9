//! Inbound state for stop-and-wait reliability.
//!
//! [`Receiver`] decides, for every raw datagram, whether its payload belongs
//! in the output and which acknowledgment to answer with:
//! - Only a packet that passes the integrity check **and** carries the
//!   expected bit is accepted.
//! - Anything else is answered with the previous acknowledgment, unchanged,
//!   so a sender that lost it will eventually see it.
//! - Datagrams that cannot be parsed are dropped without an answer.
//!
//! The [`Receiver`] does **not** write the sink or send acks itself; it
//! returns a [`Verdict`] that [`crate::session`] acts on, appending the
//! payload before the ack goes out.

use crate::checksum::ChecksumKind;
use crate::packet::{Ack, Packet, PacketError, Seq};
use crate::state::ReceiverState;

/// Why a well-formed packet was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Integrity code mismatch (including a malformed end marker).
    Corrupt,
    /// Valid packet for the bit already accepted.
    Duplicate,
}

/// Outcome of one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Append `payload` to the sink, then send `ack`.
    Accepted { payload: Vec<u8>, ack: Ack },
    /// Resend the last acknowledgment; the sink is untouched.
    Rejected {
        seq: Seq,
        reason: Rejection,
        ack: Ack,
    },
    /// End marker: send `ack`; the receiver is (now or still) closed.
    Closed { ack: Ack },
    /// Unparseable datagram: no answer.
    Malformed(PacketError),
    /// Data arriving after close: no answer.
    Ignored,
}

impl Verdict {
    /// Acknowledgment to transmit in response, if any.
    pub fn ack(&self) -> Option<Ack> {
        match self {
            Verdict::Accepted { ack, .. }
            | Verdict::Rejected { ack, .. }
            | Verdict::Closed { ack } => Some(*ack),
            Verdict::Malformed(_) | Verdict::Ignored => None,
        }
    }
}

/// Stop-and-wait receive-side state for one transfer.
#[derive(Debug)]
pub struct Receiver {
    /// Bit the next new packet must carry.
    expected: Seq,
    /// Most recent acknowledgment for an accepted packet.
    last_ack: Ack,
    state: ReceiverState,
    checksum: ChecksumKind,
    max_payload: usize,
}

impl Receiver {
    /// Create a receiver expecting bit 0 first.
    ///
    /// `max_payload` is the session chunk size; larger payloads are malformed.
    pub fn new(checksum: ChecksumKind, max_payload: usize) -> Self {
        Self {
            expected: Seq::Zero,
            // Complement of the first expected bit: stale to a fresh sender.
            last_ack: Ack(Seq::One),
            state: ReceiverState::AwaitingPacket,
            checksum,
            max_payload,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn expected(&self) -> Seq {
        self.expected
    }

    pub fn last_ack(&self) -> Ack {
        self.last_ack
    }

    pub fn is_closed(&self) -> bool {
        self.state == ReceiverState::Closed
    }

    /// Process one raw datagram.
    pub fn on_datagram(&mut self, buf: &[u8]) -> Verdict {
        match Packet::decode(buf) {
            Ok(packet) if packet.payload.len() > self.max_payload => {
                Verdict::Malformed(PacketError::PayloadTooLarge {
                    len: packet.payload.len(),
                    max: self.max_payload,
                })
            }
            Ok(packet) => self.on_packet(packet),
            Err(e) => Verdict::Malformed(e),
        }
    }

    /// Process one decoded packet.
    pub fn on_packet(&mut self, packet: Packet) -> Verdict {
        if self.state == ReceiverState::Closed {
            return if packet.is_well_formed_end_marker() {
                Verdict::Closed { ack: Ack(Seq::End) }
            } else {
                Verdict::Ignored
            };
        }

        if packet.seq.is_end() {
            if packet.is_well_formed_end_marker() {
                self.state = ReceiverState::Closed;
                return Verdict::Closed { ack: Ack(Seq::End) };
            }
            // A data packet whose sequence byte was hit in transit.
            return self.reject(packet.seq, Rejection::Corrupt);
        }

        if !packet.integrity_ok(self.checksum) {
            return self.reject(packet.seq, Rejection::Corrupt);
        }
        if packet.seq != self.expected {
            return self.reject(packet.seq, Rejection::Duplicate);
        }

        self.last_ack = Ack(packet.seq);
        self.expected = self.expected.flip();
        Verdict::Accepted {
            payload: packet.payload,
            ack: self.last_ack,
        }
    }

    fn reject(&self, seq: Seq, reason: Rejection) -> Verdict {
        Verdict::Rejected {
            seq,
            reason,
            ack: self.last_ack,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const KIND: ChecksumKind = ChecksumKind::Internet;

    fn wire(seq: Seq, payload: &[u8]) -> Vec<u8> {
        Packet::data(seq, payload.to_vec(), KIND).encode()
    }

    #[test]
    fn initial_state() {
        let r = Receiver::new(KIND, 1024);
        assert_eq!(r.state(), ReceiverState::AwaitingPacket);
        assert_eq!(r.expected(), Seq::Zero);
        assert_eq!(r.last_ack(), Ack(Seq::One));
    }

    #[test]
    fn in_order_packet_accepted() {
        let mut r = Receiver::new(KIND, 1024);
        let v = r.on_datagram(&wire(Seq::Zero, b"hello"));
        assert_eq!(
            v,
            Verdict::Accepted {
                payload: b"hello".to_vec(),
                ack: Ack(Seq::Zero)
            }
        );
        assert_eq!(r.expected(), Seq::One);
        assert_eq!(r.last_ack(), Ack(Seq::Zero));
    }

    #[test]
    fn duplicate_is_reacked_not_accepted() {
        let mut r = Receiver::new(KIND, 1024);
        r.on_datagram(&wire(Seq::Zero, b"hello"));

        for _ in 0..2 {
            let v = r.on_datagram(&wire(Seq::Zero, b"hello"));
            assert_eq!(
                v,
                Verdict::Rejected {
                    seq: Seq::Zero,
                    reason: Rejection::Duplicate,
                    ack: Ack(Seq::Zero)
                }
            );
        }
        assert_eq!(r.expected(), Seq::One);
    }

    #[test]
    fn corrupt_packet_resends_last_ack() {
        let mut r = Receiver::new(KIND, 1024);
        r.on_datagram(&wire(Seq::Zero, b"first"));

        let mut bytes = wire(Seq::One, b"second");
        bytes[4] ^= 0x10;
        let v = r.on_datagram(&bytes);
        assert_eq!(v.ack(), Some(Ack(Seq::Zero)));
        assert!(matches!(
            v,
            Verdict::Rejected {
                reason: Rejection::Corrupt,
                ..
            }
        ));
        assert_eq!(r.expected(), Seq::One);
    }

    #[test]
    fn corrupt_first_packet_gets_complement_ack() {
        let mut r = Receiver::new(KIND, 1024);
        let mut bytes = wire(Seq::Zero, b"first");
        bytes[3] ^= 0x01;
        assert_eq!(r.on_datagram(&bytes).ack(), Some(Ack(Seq::One)));
        assert_eq!(r.expected(), Seq::Zero);
    }

    #[test]
    fn short_datagram_is_dropped_silently() {
        let mut r = Receiver::new(KIND, 1024);
        let v = r.on_datagram(&[0, 1]);
        assert_eq!(v, Verdict::Malformed(PacketError::BufferTooShort(2)));
        assert_eq!(v.ack(), None);
    }

    #[test]
    fn oversized_payload_is_malformed() {
        let mut r = Receiver::new(KIND, 4);
        let v = r.on_datagram(&wire(Seq::Zero, b"too long"));
        assert_eq!(
            v,
            Verdict::Malformed(PacketError::PayloadTooLarge { len: 8, max: 4 })
        );
        assert_eq!(r.expected(), Seq::Zero);
    }

    #[test]
    fn end_marker_closes() {
        let mut r = Receiver::new(KIND, 1024);
        let v = r.on_datagram(&Packet::end_marker().encode());
        assert_eq!(v, Verdict::Closed { ack: Ack(Seq::End) });
        assert!(r.is_closed());

        // Retransmitted end marker is answered again; data is ignored.
        assert_eq!(
            r.on_datagram(&Packet::end_marker().encode()),
            Verdict::Closed { ack: Ack(Seq::End) }
        );
        assert_eq!(r.on_datagram(&wire(Seq::Zero, b"late")), Verdict::Ignored);
    }

    #[test]
    fn data_packet_with_corrupted_end_byte_does_not_close() {
        let mut r = Receiver::new(KIND, 1024);
        r.on_datagram(&wire(Seq::Zero, b"first"));

        let mut bytes = wire(Seq::One, b"second");
        bytes[0] = crate::packet::END_MARKER;
        let v = r.on_datagram(&bytes);
        assert_eq!(v.ack(), Some(Ack(Seq::Zero)));
        assert!(!r.is_closed());
    }
}
