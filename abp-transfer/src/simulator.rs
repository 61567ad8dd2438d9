//! Fault-injecting network layer for testing and evaluation.
//!
//! Real networks drop, delay, duplicate and corrupt datagrams.  To exercise
//! the reliability mechanisms without depending on actual network
//! conditions, [`FaultyChannel`] wraps any [`Transport`] and applies a
//! configurable fault model to every **outbound** datagram:
//!
//! | Fault        | Description                                          |
//! |--------------|------------------------------------------------------|
//! | Loss         | Drop with probability `loss_rate`.                   |
//! | Corruption   | Flip 1–3 payload bits (or the sequence bit of a      |
//! |              | payload-less datagram) with probability              |
//! |              | `corrupt_rate`.                                      |
//! | Delay        | Hold for up to `max_delay` with probability          |
//! |              | `delay_rate`; later datagrams queue behind it.       |
//! | Duplication  | Deliver twice with probability `duplicate_rate`.     |
//! | Scripted     | Drop / corrupt the k-th outbound datagram.           |
//!
//! Wrap the sender's transport to disturb data packets, the receiver's to
//! disturb acknowledgments.  The state machines never see the difference.
//!
//! Delivery order is preserved: a delayed datagram is held inside `send_to`,
//! so nothing sent after it can arrive first.  The alternating bit relies on
//! FIFO delivery; a late copy of an old packet would otherwise be taken for a
//! new chunk carrying the same bit.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::HEADER_LEN;
use crate::socket::Transport;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is corrupted.
    pub corrupt_rate: f64,
    /// Probability that a datagram is delayed.
    pub delay_rate: f64,
    /// Upper bound of the uniform random delay.
    pub max_delay: Duration,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Zero-based outbound datagram indices that are always dropped.
    pub drop_nth: Vec<u64>,
    /// Zero-based outbound datagram indices that always get one bit flipped.
    pub corrupt_nth: Vec<u64>,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl FaultConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, p) in [
            ("loss_rate", self.loss_rate),
            ("corrupt_rate", self.corrupt_rate),
            ("delay_rate", self.delay_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("{name} {p} is outside [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Counters of what the channel actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    /// Outbound datagrams offered to the channel.
    pub offered: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub delayed: u64,
    pub duplicated: u64,
}

/// How one outbound datagram will be delivered.
struct Delivery {
    bytes: Vec<u8>,
    delay: Option<Duration>,
    copies: usize,
}

/// A fault-injecting wrapper around a [`Transport`].
pub struct FaultyChannel<T> {
    inner: T,
    config: FaultConfig,
    rng: Mutex<StdRng>,
    next_index: AtomicU64,
    stats: Mutex<FaultStats>,
}

impl<T: Transport> FaultyChannel<T> {
    pub fn new(inner: T, config: FaultConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            inner,
            config,
            rng: Mutex::new(rng),
            next_index: AtomicU64::new(0),
            stats: Mutex::new(FaultStats::default()),
        }
    }

    /// Snapshot of the injected-fault counters.
    pub fn stats(&self) -> FaultStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Decide the fate of one datagram.  `None` means dropped.
    fn plan(&self, buf: &[u8]) -> Option<Delivery> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut stats = match self.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        stats.offered += 1;

        let cfg = &self.config;
        if cfg.drop_nth.contains(&index) || rng.random_bool(cfg.loss_rate) {
            stats.dropped += 1;
            log::debug!("[sim] drop datagram #{index} ({} bytes)", buf.len());
            return None;
        }

        let mut bytes = buf.to_vec();
        if cfg.corrupt_nth.contains(&index) {
            flip_bits(&mut bytes, 1, &mut rng);
            stats.corrupted += 1;
            log::debug!("[sim] corrupt datagram #{index} (scripted)");
        } else if rng.random_bool(cfg.corrupt_rate) {
            let max_flips = bytes.len().saturating_sub(HEADER_LEN).clamp(1, 3);
            let flips = rng.random_range(1..=max_flips);
            flip_bits(&mut bytes, flips, &mut rng);
            stats.corrupted += 1;
            log::debug!("[sim] corrupt datagram #{index} ({flips} bit(s))");
        }

        let delay = (cfg.max_delay > Duration::ZERO && rng.random_bool(cfg.delay_rate)).then(|| {
            stats.delayed += 1;
            cfg.max_delay.mul_f64(rng.random::<f64>())
        });

        let copies = if rng.random_bool(cfg.duplicate_rate) {
            stats.duplicated += 1;
            2
        } else {
            1
        };

        Some(Delivery {
            bytes,
            delay,
            copies,
        })
    }
}

/// Flip `count` bits in distinct bytes of the payload region.
///
/// Datagrams without payload (acks, the end marker) get the low bit of their
/// first byte flipped instead, which turns ack 0 into 1 and vice versa.
fn flip_bits(bytes: &mut [u8], count: usize, rng: &mut StdRng) {
    if bytes.len() <= HEADER_LEN {
        if let Some(first) = bytes.first_mut() {
            *first ^= 0x01;
        }
        return;
    }
    let payload = &mut bytes[HEADER_LEN..];
    let count = count.min(payload.len());
    for i in rand::seq::index::sample(rng, payload.len(), count).iter() {
        payload[i] ^= 1 << rng.random_range(0..8);
    }
}

impl<T: Transport> Transport for FaultyChannel<T> {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        let Some(delivery) = self.plan(buf) else {
            // The sender cannot tell a lost datagram from a delivered one.
            return Ok(buf.len());
        };

        if let Some(delay) = delivery.delay {
            tokio::time::sleep(delay).await;
        }
        for _ in 0..delivery.copies {
            self.inner.send_to(&delivery.bytes, dest).await?;
        }
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
