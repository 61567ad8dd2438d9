//! Outbound state for stop-and-wait reliability.
//!
//! [`Sender`] tracks the alternating bit and the single in-flight packet.
//! It does **not** touch the socket or the timer; [`crate::session`] calls
//! these methods and owns the actual send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** packet is in flight at any moment (`unacked`).
//! - A new chunk may only be sent once `unacked` is `None`.
//! - On a matching ack: flip `seq`; clear `unacked`.
//! - On any other ack: nothing changes.
//! - On timeout: increment `tx_count`; resend the same bytes unchanged.

use std::time::{Duration, Instant};

use crate::checksum::ChecksumKind;
use crate::packet::{Ack, Packet, Seq};
use crate::state::SenderState;

// ---------------------------------------------------------------------------
// RetransmitEntry
// ---------------------------------------------------------------------------

/// A packet that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    pub packet: Packet,
    /// Encoded form, kept so every retransmission is byte-identical.
    pub wire: Vec<u8>,
    /// How many times this packet has been transmitted (1 = first send).
    pub tx_count: u32,
    /// Time of the most recent transmission.
    pub sent_at: Instant,
}

/// What an inbound acknowledgment did to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The in-flight chunk is acknowledged; the bit has flipped.
    ///
    /// `rtt` is `None` when the chunk was retransmitted (ambiguous sample).
    Advanced { rtt: Option<Duration> },
    /// The end marker is acknowledged; the sender is done.
    Completed { rtt: Option<Duration> },
    /// Stale, duplicate or unexpected ack; state is unchanged.
    Ignored,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Stop-and-wait send-side state for one transfer.
#[derive(Debug)]
pub struct Sender {
    /// Bit carried by the next (or current in-flight) data packet.
    seq: Seq,
    state: SenderState,
    checksum: ChecksumKind,
    /// The in-flight packet, or `None` when the sender is idle.
    unacked: Option<RetransmitEntry>,
    /// Number of chunks acknowledged so far.
    chunks_acked: u64,
}

impl Sender {
    pub fn new(checksum: ChecksumKind) -> Self {
        Self {
            seq: Seq::Zero,
            state: SenderState::Idle,
            checksum,
            unacked: None,
            chunks_acked: 0,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Bit that the next or in-flight data packet carries.
    pub fn seq(&self) -> Seq {
        self.seq
    }

    pub fn chunks_acked(&self) -> u64 {
        self.chunks_acked
    }

    /// Frame `payload` under the current bit and place it in flight.
    ///
    /// Returns the bytes to transmit.  Panics in debug mode if a packet is
    /// already in flight.
    pub fn send_chunk(&mut self, payload: Vec<u8>) -> &[u8] {
        debug_assert!(
            self.state == SenderState::Idle,
            "send_chunk called in state {}",
            self.state
        );
        let packet = Packet::data(self.seq, payload, self.checksum);
        self.state = SenderState::AwaitingAck(self.seq);
        self.record_sent(packet)
    }

    /// Place the end marker in flight; the source is exhausted.
    pub fn finish(&mut self) -> &[u8] {
        debug_assert!(
            self.state == SenderState::Idle,
            "finish called in state {}",
            self.state
        );
        self.state = SenderState::AwaitingEofAck;
        self.record_sent(Packet::end_marker())
    }

    fn record_sent(&mut self, packet: Packet) -> &[u8] {
        let wire = packet.encode();
        let entry = self.unacked.insert(RetransmitEntry {
            packet,
            wire,
            tx_count: 1,
            sent_at: Instant::now(),
        });
        &entry.wire
    }

    /// Process an inbound acknowledgment.
    pub fn on_ack(&mut self, ack: Ack) -> AckOutcome {
        self.on_ack_at(ack, Instant::now())
    }

    pub fn on_ack_at(&mut self, ack: Ack, now: Instant) -> AckOutcome {
        let expected = match self.state {
            SenderState::AwaitingAck(seq) => seq,
            SenderState::AwaitingEofAck => Seq::End,
            SenderState::Idle | SenderState::Done => return AckOutcome::Ignored,
        };
        if ack.seq() != expected {
            return AckOutcome::Ignored;
        }
        let Some(entry) = self.unacked.take() else {
            return AckOutcome::Ignored;
        };
        let rtt = (entry.tx_count == 1).then(|| now.saturating_duration_since(entry.sent_at));

        if expected.is_end() {
            self.state = SenderState::Done;
            AckOutcome::Completed { rtt }
        } else {
            self.seq = self.seq.flip();
            self.chunks_acked += 1;
            self.state = SenderState::Idle;
            AckOutcome::Advanced { rtt }
        }
    }

    /// Timer expired: bump the transmit count and return the bytes to resend.
    ///
    /// Returns `None` when nothing is in flight.
    pub fn on_timeout(&mut self) -> Option<&[u8]> {
        let entry = self.unacked.as_mut()?;
        entry.tx_count += 1;
        entry.sent_at = Instant::now();
        Some(&entry.wire)
    }

    /// The in-flight packet, if any.
    pub fn in_flight(&self) -> Option<&RetransmitEntry> {
        self.unacked.as_ref()
    }

    /// Number of times the in-flight packet has been sent, or `0` if idle.
    pub fn transmit_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let s = Sender::new(ChecksumKind::Internet);
        assert_eq!(s.state(), SenderState::Idle);
        assert_eq!(s.seq(), Seq::Zero);
        assert!(s.in_flight().is_none());
        assert_eq!(s.transmit_count(), 0);
    }

    #[test]
    fn send_chunk_frames_current_bit() {
        let mut s = Sender::new(ChecksumKind::Internet);
        let wire = s.send_chunk(b"abc".to_vec()).to_vec();
        let pkt = Packet::decode(&wire).unwrap();
        assert_eq!(pkt.seq, Seq::Zero);
        assert!(pkt.integrity_ok(ChecksumKind::Internet));
        assert_eq!(s.state(), SenderState::AwaitingAck(Seq::Zero));
        assert_eq!(s.transmit_count(), 1);
    }

    #[test]
    fn matching_ack_flips_bit() {
        let mut s = Sender::new(ChecksumKind::Internet);
        s.send_chunk(b"abc".to_vec());
        assert!(matches!(
            s.on_ack(Ack(Seq::Zero)),
            AckOutcome::Advanced { rtt: Some(_) }
        ));
        assert_eq!(s.seq(), Seq::One);
        assert_eq!(s.state(), SenderState::Idle);
        assert_eq!(s.chunks_acked(), 1);
    }

    #[test]
    fn non_matching_ack_changes_nothing() {
        let mut s = Sender::new(ChecksumKind::Internet);
        s.send_chunk(b"abc".to_vec());
        assert_eq!(s.on_ack(Ack(Seq::One)), AckOutcome::Ignored);
        assert_eq!(s.on_ack(Ack(Seq::End)), AckOutcome::Ignored);
        assert_eq!(s.seq(), Seq::Zero);
        assert_eq!(s.state(), SenderState::AwaitingAck(Seq::Zero));
        assert!(s.in_flight().is_some());
    }

    #[test]
    fn ack_while_idle_is_ignored() {
        let mut s = Sender::new(ChecksumKind::Internet);
        assert_eq!(s.on_ack(Ack(Seq::Zero)), AckOutcome::Ignored);
        assert_eq!(s.seq(), Seq::Zero);
    }

    #[test]
    fn timeout_resends_identical_bytes() {
        let mut s = Sender::new(ChecksumKind::Crc16);
        let first = s.send_chunk(b"payload".to_vec()).to_vec();
        let again = s.on_timeout().unwrap().to_vec();
        assert_eq!(first, again);
        assert_eq!(s.transmit_count(), 2);
    }

    #[test]
    fn retransmitted_chunk_yields_no_rtt_sample() {
        let mut s = Sender::new(ChecksumKind::Internet);
        s.send_chunk(b"x".to_vec());
        s.on_timeout();
        assert_eq!(s.on_ack(Ack(Seq::Zero)), AckOutcome::Advanced { rtt: None });
    }

    #[test]
    fn end_handshake_completes_on_end_ack_only() {
        let mut s = Sender::new(ChecksumKind::Internet);
        s.send_chunk(b"x".to_vec());
        s.on_ack(Ack(Seq::Zero));

        let wire = s.finish().to_vec();
        assert_eq!(wire, Packet::end_marker().encode());
        assert_eq!(s.state(), SenderState::AwaitingEofAck);

        // A late duplicate of the last data ack is stale.
        assert_eq!(s.on_ack(Ack(Seq::Zero)), AckOutcome::Ignored);
        assert!(matches!(
            s.on_ack(Ack(Seq::End)),
            AckOutcome::Completed { .. }
        ));
        assert_eq!(s.state(), SenderState::Done);
        assert!(s.on_timeout().is_none());
    }

    #[test]
    fn sequence_alternates_over_chunks() {
        let mut s = Sender::new(ChecksumKind::Internet);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let wire = s.send_chunk(vec![0u8; 4]).to_vec();
            seen.push(Packet::decode(&wire).unwrap().seq);
            let seq = s.seq();
            s.on_ack(Ack(seq));
        }
        assert_eq!(seen, vec![Seq::Zero, Seq::One, Seq::Zero, Seq::One]);
    }
}
