//! Retransmission timer.
//!
//! A stop-and-wait sender has exactly one timer: it is armed when a packet
//! goes out and disarmed when the matching acknowledgment arrives.  If it
//! expires first the same packet is sent again.
//!
//! The timeout is either fixed for the whole session or adapted from observed
//! round-trip times:
//!   `RTO = clamp(RTT × multiplier, min, max)`
//! Only samples from packets that were never retransmitted are used (Karn's
//! rule), so an ack for an earlier copy cannot shrink the timeout.

use std::time::{Duration, Instant};

/// Smallest timeout the timer will ever run with.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// How the retransmission timeout is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeoutPolicy {
    /// The same timeout for every transmission.
    Fixed(Duration),
    /// Recomputed from each clean RTT sample.
    Adaptive {
        /// Timeout used until the first sample arrives.
        initial: Duration,
        /// Factor applied to the sampled RTT.
        multiplier: f64,
        /// Lower clamp; never below [`MIN_TIMEOUT`].
        min: Duration,
        /// Upper clamp.
        max: Duration,
    },
}

impl TimeoutPolicy {
    /// The adaptive defaults: 100 ms to start, 1.5 × RTT, capped at 500 ms.
    pub fn adaptive() -> Self {
        Self::adaptive_from(Duration::from_millis(100))
    }

    /// Adaptive defaults, starting from `initial` instead of 100 ms.
    pub fn adaptive_from(initial: Duration) -> Self {
        TimeoutPolicy::Adaptive {
            initial,
            multiplier: 1.5,
            min: MIN_TIMEOUT,
            max: Duration::from_millis(500),
        }
    }

    pub fn initial(&self) -> Duration {
        match *self {
            TimeoutPolicy::Fixed(d) => d,
            TimeoutPolicy::Adaptive { initial, .. } => initial,
        }
    }

    /// Check the policy can never produce a zero or negative-width timeout.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            TimeoutPolicy::Fixed(d) if d < MIN_TIMEOUT => {
                Err(format!("timeout {d:?} is below {MIN_TIMEOUT:?}"))
            }
            TimeoutPolicy::Fixed(_) => Ok(()),
            TimeoutPolicy::Adaptive {
                initial,
                multiplier,
                min,
                max,
            } => {
                if !(multiplier.is_finite() && multiplier > 0.0) {
                    return Err(format!("multiplier {multiplier} must be positive"));
                }
                if min < MIN_TIMEOUT {
                    return Err(format!("minimum timeout {min:?} is below {MIN_TIMEOUT:?}"));
                }
                if max < min {
                    return Err(format!("maximum timeout {max:?} is below minimum {min:?}"));
                }
                if initial < min || initial > max {
                    return Err(format!("initial timeout {initial:?} is outside [{min:?}, {max:?}]"));
                }
                Ok(())
            }
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy::Fixed(Duration::from_millis(50))
    }
}

/// The single retransmission timer owned by a sender.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    policy: TimeoutPolicy,
    /// Current timeout, updated after each RTT sample.
    current: Duration,
    /// Instant the timer was last armed; `None` when disarmed.
    started_at: Option<Instant>,
}

impl RetransmitTimer {
    pub fn new(policy: TimeoutPolicy) -> Self {
        Self {
            current: policy.initial().max(MIN_TIMEOUT),
            policy,
            started_at: None,
        }
    }

    /// Current timeout duration.
    pub fn timeout(&self) -> Duration {
        self.current
    }

    /// Start (or restart) the timer now.
    pub fn arm(&mut self) {
        self.arm_at(Instant::now());
    }

    pub fn arm_at(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    pub fn disarm(&mut self) {
        self.started_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.started_at.is_some()
    }

    /// When the armed timer fires, or `None` if disarmed.
    pub fn deadline(&self) -> Option<Instant> {
        self.started_at.map(|t| t + self.current)
    }

    /// `true` if armed and the timeout has elapsed by `now`.
    pub fn expired_at(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|d| now >= d)
    }

    /// Feed one RTT measurement.  Returns the new timeout when it changed.
    ///
    /// A fixed policy ignores samples.
    pub fn record_rtt_sample(&mut self, rtt: Duration) -> Option<Duration> {
        let TimeoutPolicy::Adaptive {
            multiplier,
            min,
            max,
            ..
        } = self.policy
        else {
            return None;
        };
        // Scale in whole nanoseconds; `as u64` saturates instead of panicking.
        let scaled = Duration::from_nanos((rtt.as_nanos() as f64 * multiplier) as u64);
        let floor = min.max(MIN_TIMEOUT);
        let next = scaled.clamp(floor, max.max(floor));
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }
}
