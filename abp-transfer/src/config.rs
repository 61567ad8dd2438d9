//! Session configuration.
//!
//! Both peers must agree on `chunk_size` and `checksum` out-of-band; the
//! remaining knobs are local to one side.  A config is fixed for the lifetime
//! of a session.

use std::time::Duration;

use crate::checksum::ChecksumKind;
use crate::error::TransferError;
use crate::timer::TimeoutPolicy;

/// Default payload bytes per packet.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Largest chunk that still fits a UDP datagram together with the header.
pub const MAX_CHUNK_SIZE: usize = 65_000;

/// Parameters shared by sender and receiver sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    /// Maximum payload bytes per packet (N).
    pub chunk_size: usize,
    /// Integrity code computed over each payload.
    pub checksum: ChecksumKind,
    /// Sender retransmission timeout.
    pub timeout: TimeoutPolicy,
    /// Sender: give up after this many retransmissions of one packet.
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    /// Pipelined receiver: capacity of each hand-off queue.
    pub queue_depth: usize,
    /// Receiver: keep answering end markers this long after closing.
    pub linger: Duration,
    /// Receiver: fail if no datagram arrives for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            checksum: ChecksumKind::default(),
            timeout: TimeoutPolicy::default(),
            max_retries: None,
            queue_depth: 64,
            linger: Duration::ZERO,
            idle_timeout: None,
        }
    }
}

impl TransferConfig {
    /// Reject configurations that could never complete a transfer.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(TransferError::Config(format!(
                "chunk size {} is outside 1..={MAX_CHUNK_SIZE}",
                self.chunk_size
            )));
        }
        if self.queue_depth == 0 {
            return Err(TransferError::Config("queue depth must be at least 1".into()));
        }
        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(TransferError::Config("idle timeout must be non-zero".into()));
        }
        self.timeout.validate().map_err(TransferError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TransferConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.chunk_size, 1024);
        assert_eq!(cfg.max_retries, None);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let cfg = TransferConfig {
            chunk_size: 0,
            ..TransferConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TransferError::Config(_))));
    }

    #[test]
    fn zero_timeout_rejected() {
        let cfg = TransferConfig {
            timeout: TimeoutPolicy::Fixed(Duration::ZERO),
            ..TransferConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(TransferError::Config(_))));
    }
}
