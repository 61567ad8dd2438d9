//! Per-session counters handed back to the caller when a transfer ends.

use std::fmt;
use std::time::Duration;

/// What the sending side did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderReport {
    /// Data chunks acknowledged.
    pub chunks: u64,
    /// Payload bytes acknowledged.
    pub bytes: u64,
    /// Datagrams handed to the transport, retransmissions included.
    pub packets_sent: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    /// Acks that did not match the in-flight packet.
    pub stale_acks: u64,
    /// Retransmission timeout in force when the session ended.
    pub final_timeout: Duration,
    pub elapsed: Duration,
}

/// What the receiving side did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverReport {
    /// Chunks appended to the sink.
    pub chunks: u64,
    /// Bytes appended to the sink.
    pub bytes: u64,
    pub acks_sent: u64,
    pub corrupt_packets: u64,
    pub duplicate_packets: u64,
    pub malformed_datagrams: u64,
    /// Datagrams from an address other than the locked-on peer.
    pub foreign_datagrams: u64,
    pub elapsed: Duration,
}

impl fmt::Display for SenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Execution time: {:.4} seconds", self.elapsed.as_secs_f64())?;
        writeln!(f, "Chunks sent: {} ({} bytes)", self.chunks, self.bytes)?;
        writeln!(f, "Packets sent: {}", self.packets_sent)?;
        writeln!(f, "Retransmissions: {}", self.retransmissions)?;
        writeln!(f, "Timeouts: {}", self.timeouts)?;
        writeln!(f, "Stale acks: {}", self.stale_acks)?;
        write!(f, "Final timeout: {:?}", self.final_timeout)
    }
}

impl fmt::Display for ReceiverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Execution time: {:.4} seconds", self.elapsed.as_secs_f64())?;
        writeln!(f, "Chunks received: {} ({} bytes)", self.chunks, self.bytes)?;
        writeln!(f, "Acks sent: {}", self.acks_sent)?;
        writeln!(f, "Corrupt packets: {}", self.corrupt_packets)?;
        writeln!(f, "Duplicate packets: {}", self.duplicate_packets)?;
        writeln!(f, "Malformed datagrams: {}", self.malformed_datagrams)?;
        write!(f, "Foreign datagrams: {}", self.foreign_datagrams)
    }
}
