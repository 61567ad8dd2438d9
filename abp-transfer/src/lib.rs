//! `abp-transfer` — reliable one-way file transfer over UDP using the
//! alternating bit protocol (stop-and-wait ARQ).
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  DATA(seq, checksum, payload)  ┌──────────┐
//!  │  Sender  │───────────────────────────────▶│ Receiver │──▶ sink
//!  └────┬─────┘                                └─────┬────┘
//!       │               ACK(seq)                     │
//!       │◀───────────────────────────────────────────┘
//!       │
//!  ┌────▼───────────────────────────────────┐
//!  │  SenderSession / ReceiverSession       │
//!  │  (own state machine + timer + socket)  │
//!  └────┬───────────────────────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐   ┌───────────────┐
//!  │ Transport │◀──│ FaultyChannel │  (optional fault injection)
//!  └───────────┘   └───────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`checksum`]  — Internet checksum and CRC-16 integrity codes
//! - [`packet`]    — wire format (serialise / deserialise)
//! - [`state`]     — finite-state-machine types
//! - [`sender`]    — stop-and-wait outbound state machine
//! - [`receiver`]  — stop-and-wait inbound state machine
//! - [`timer`]     — retransmit timer, fixed or adaptive
//! - [`session`]   — async drivers binding machines to a transport
//! - [`socket`]    — datagram transport trait and UDP implementation
//! - [`simulator`] — loss / corruption / delay / duplication decorator
//! - [`config`], [`error`], [`event`], [`report`] — session plumbing

pub mod checksum;
pub mod config;
pub mod error;
pub mod event;
pub mod packet;
pub mod receiver;
pub mod report;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use checksum::ChecksumKind;
pub use config::TransferConfig;
pub use error::TransferError;
pub use event::TransferEvent;
pub use report::{ReceiverReport, SenderReport};
pub use session::{ReceiverSession, SenderSession};
pub use socket::{Socket, Transport};
pub use timer::TimeoutPolicy;
