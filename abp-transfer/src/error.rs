//! Fatal transfer errors.
//!
//! Corruption, duplicates, stale acks and malformed datagrams are recovered
//! inside the protocol and never show up here.  What does show up ends the
//! session.

use std::io;

use thiserror::Error;

use crate::packet::Seq;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Socket, source or sink I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The retry cap was hit without a matching acknowledgment.
    #[error("no acknowledgment for chunk {chunk} (seq {seq}) after {attempts} transmissions")]
    RetriesExhausted { chunk: u64, seq: Seq, attempts: u32 },
    /// The receiver heard nothing for its configured idle timeout.
    #[error("no datagram received within the idle timeout")]
    IdleTimeout,
    /// The session's cancellation token fired.
    #[error("transfer cancelled")]
    Cancelled,
    /// Rejected before any I/O took place.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A pipeline task ended unexpectedly.
    #[error("pipeline task failed: {0}")]
    Pipeline(String),
}
