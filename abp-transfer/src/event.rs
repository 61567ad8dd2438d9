//! Observable protocol events.
//!
//! Sessions publish a [`TransferEvent`] at every step of the state machines.
//! Any front end (progress bar, visualiser, test probe) subscribes through
//! [`EventEmitter::subscribe`]; the protocol never waits on a subscriber and
//! works the same with none attached.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::packet::Seq;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Sender transmitted a data packet or end marker.
    PacketSent { seq: Seq, len: usize, attempt: u32 },
    /// Sender's timer fired for the in-flight packet.
    TimedOut { seq: Seq, attempt: u32 },
    /// Sender saw an ack; `matched` tells whether it advanced the session.
    AckReceived { seq: Seq, matched: bool },
    /// Adaptive timeout was recomputed.
    TimeoutAdjusted { timeout: Duration },
    /// Receiver appended a payload to the sink.
    ChunkAccepted { seq: Seq, len: usize },
    /// Receiver rejected a packet whose integrity code did not verify.
    CorruptionDetected { seq: Seq },
    /// Receiver rejected a valid packet carrying the already-accepted bit.
    DuplicatePacket { seq: Seq },
    /// Receiver dropped an unparseable datagram.
    MalformedDatagram { len: usize },
    /// Receiver transmitted an acknowledgment.
    AckSent { seq: Seq },
    /// The end-marker handshake completed on this side.
    SessionClosed,
}

/// Fan-out point for [`TransferEvent`]s.
#[derive(Debug, Default)]
pub struct EventEmitter {
    tx: Option<mpsc::UnboundedSender<TransferEvent>>,
}

impl EventEmitter {
    /// Attach a subscriber, replacing any previous one.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TransferEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        rx
    }

    pub fn emit(&self, event: TransferEvent) {
        if let Some(tx) = &self.tx {
            // A dropped subscriber is not the protocol's problem.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscriber_is_noop() {
        EventEmitter::default().emit(TransferEvent::SessionClosed);
    }

    #[test]
    fn subscriber_sees_events_in_order() {
        let mut emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();
        emitter.emit(TransferEvent::AckSent { seq: Seq::Zero });
        emitter.emit(TransferEvent::SessionClosed);
        assert_eq!(rx.try_recv().unwrap(), TransferEvent::AckSent { seq: Seq::Zero });
        assert_eq!(rx.try_recv().unwrap(), TransferEvent::SessionClosed);
    }
}
