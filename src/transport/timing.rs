//! RTT estimation and wire timestamps.
//!
//! The estimator follows RFC 6298 and feeds both the reported ping and the
//! reliable channel's retransmission timeout.

use std::time::{Duration, Instant};

/// RTT timing constants.
pub mod constants {
    use std::time::Duration;

    /// Retransmission timeout before the first RTT sample.
    pub const INITIAL_RTO: Duration = Duration::from_millis(250);

    /// Lower bound for the retransmission timeout.
    pub const MIN_RTO: Duration = Duration::from_millis(50);

    /// Upper bound for the retransmission timeout, including backoff.
    pub const MAX_RTO: Duration = Duration::from_secs(4);

    /// Gain for SRTT smoothing (1/8).
    pub const SRTT_ALPHA: f64 = 0.125;

    /// Gain for RTTVAR smoothing (1/4).
    pub const RTTVAR_BETA: f64 = 0.25;

    /// Variance multiplier in the RTO formula.
    pub const RTO_K: f64 = 4.0;

    /// Clock granularity term in the RTO formula.
    pub const GRANULARITY_MS: f64 = 20.0;
}

/// RTT estimator implementing RFC 6298.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT in milliseconds.
    srtt: f64,
    /// RTT variance in milliseconds.
    rttvar: f64,
    /// Current retransmission timeout.
    rto: Duration,
    /// Whether a sample has been taken.
    initialized: bool,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttEstimator {
    /// Create an estimator with no samples.
    pub fn new() -> Self {
        Self {
            srtt: 0.0,
            rttvar: 0.0,
            rto: constants::INITIAL_RTO,
            initialized: false,
        }
    }

    /// Feed a new RTT sample.
    pub fn update(&mut self, sample: Duration) {
        let sample_ms = sample.as_secs_f64() * 1000.0;

        if self.initialized {
            self.rttvar = (1.0 - constants::RTTVAR_BETA) * self.rttvar
                + constants::RTTVAR_BETA * (self.srtt - sample_ms).abs();
            self.srtt =
                (1.0 - constants::SRTT_ALPHA) * self.srtt + constants::SRTT_ALPHA * sample_ms;
        } else {
            self.srtt = sample_ms;
            self.rttvar = sample_ms / 2.0;
            self.initialized = true;
        }

        let rto_ms = self.srtt + f64::max(constants::GRANULARITY_MS, constants::RTO_K * self.rttvar);
        let rto_ms = rto_ms.clamp(
            constants::MIN_RTO.as_millis() as f64,
            constants::MAX_RTO.as_millis() as f64,
        );
        self.rto = Duration::from_millis(rto_ms as u64);
    }

    /// Smoothed RTT, zero before the first sample.
    pub fn srtt(&self) -> Duration {
        Duration::from_micros((self.srtt * 1000.0).round() as u64)
    }

    /// Smoothed RTT rounded to whole milliseconds.
    pub fn ping_ms(&self) -> u32 {
        self.srtt.round() as u32
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Whether at least one sample has been taken.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Retransmission timeout after `attempts` unanswered transmissions.
///
/// Doubles per attempt, capped at [`constants::MAX_RTO`].
pub fn backoff(rto: Duration, attempts: u32) -> Duration {
    let factor = 1u32.checked_shl(attempts.min(16)).unwrap_or(u32::MAX);
    rto.saturating_mul(factor).min(constants::MAX_RTO)
}

/// Millisecond clock used for wire timestamps.
///
/// Timestamps wrap after ~49 days; only differences are ever used.
#[derive(Debug, Clone, Copy)]
pub struct WireClock {
    origin: Instant,
}

impl WireClock {
    /// Create a clock whose zero is `origin`.
    pub fn new(origin: Instant) -> Self {
        Self { origin }
    }

    /// Timestamp for `now`.
    pub fn timestamp(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.origin).as_millis() as u32
    }

    /// Time elapsed since an echoed timestamp.
    pub fn elapsed_since(&self, now: Instant, echo: u32) -> Duration {
        Duration::from_millis(u64::from(self.timestamp(now).wrapping_sub(echo)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtt_estimator_initial() {
        let estimator = RttEstimator::new();
        assert!(!estimator.is_initialized());
        assert_eq!(estimator.rto(), constants::INITIAL_RTO);
        assert_eq!(estimator.ping_ms(), 0);
    }

    #[test]
    fn test_rtt_estimator_first_sample() {
        let mut estimator = RttEstimator::new();
        estimator.update(Duration::from_millis(80));

        assert!(estimator.is_initialized());
        assert_eq!(estimator.ping_ms(), 80);
        // 80 + 4 * 40
        assert_eq!(estimator.rto(), Duration::from_millis(240));
    }

    #[test]
    fn test_rtt_estimator_converges() {
        let mut estimator = RttEstimator::new();
        estimator.update(Duration::from_millis(100));
        for _ in 0..50 {
            estimator.update(Duration::from_millis(20));
        }
        assert!(estimator.ping_ms() < 25);
        assert!(estimator.rto() >= constants::MIN_RTO);
    }

    #[test]
    fn test_rto_clamped() {
        let mut estimator = RttEstimator::new();
        estimator.update(Duration::from_micros(10));
        assert_eq!(estimator.rto(), constants::MIN_RTO);

        estimator.update(Duration::from_secs(30));
        assert_eq!(estimator.rto(), constants::MAX_RTO);
    }

    #[test]
    fn test_backoff() {
        let rto = Duration::from_millis(100);
        assert_eq!(backoff(rto, 0), rto);
        assert_eq!(backoff(rto, 1), Duration::from_millis(200));
        assert_eq!(backoff(rto, 3), Duration::from_millis(800));
        assert_eq!(backoff(rto, 40), constants::MAX_RTO);
    }

    #[test]
    fn test_wire_clock() {
        let origin = Instant::now();
        let clock = WireClock::new(origin);
        let later = origin + Duration::from_millis(1500);

        assert_eq!(clock.timestamp(origin), 0);
        assert_eq!(clock.timestamp(later), 1500);

        let echo = clock.timestamp(origin + Duration::from_millis(1000));
        assert_eq!(clock.elapsed_since(later, echo), Duration::from_millis(500));
    }

    #[test]
    fn test_wire_clock_wraps() {
        let origin = Instant::now();
        let clock = WireClock::new(origin);
        let now = origin + Duration::from_millis(10);
        // Echo from "before" zero after a wrap still yields a small delta
        assert_eq!(
            clock.elapsed_since(now, u32::MAX - 4),
            Duration::from_millis(15)
        );
    }
}
