//! Connectivity supervision: one tri-state status blended from the
//! link-layer and broker-layer observations, the indicator waveform it
//! drives, and the fixed-interval broker reconnect policy.

/// Tri-state connectivity status. Never set directly by application
/// logic; recomputed every tick from the two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Ok,
    NoLink,
    NoBroker,
}

impl LinkStatus {
    pub fn derive(link_up: bool, broker_up: bool) -> Self {
        if !link_up {
            Self::NoLink
        } else if !broker_up {
            Self::NoBroker
        } else {
            Self::Ok
        }
    }

    /// Logical indicator level for this status at the given instant.
    /// `Ok` mirrors the relay; the failure states blink as 50%-duty
    /// square waves (500 ms period without link, 1000 ms without the
    /// broker). Electrical polarity is the pin driver's concern.
    pub fn indicator_lit(self, relay_on: bool, now_ms: u32) -> bool {
        match self {
            Self::NoLink => now_ms % 500 > 250,
            Self::NoBroker => now_ms % 1000 > 500,
            Self::Ok => relay_on,
        }
    }
}

/// Broker reconnect gate: one attempt at most every
/// `min_interval_ms`, no backoff growth, no attempt limit.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    last_attempt_ms: Option<u32>,
    min_interval_ms: u32,
}

impl ReconnectPolicy {
    pub fn new(min_interval_ms: u32) -> Self {
        Self {
            last_attempt_ms: None,
            min_interval_ms,
        }
    }

    pub fn should_attempt(&self, now_ms: u32) -> bool {
        match self.last_attempt_ms {
            Some(last) => now_ms.wrapping_sub(last) >= self.min_interval_ms,
            None => true,
        }
    }

    pub fn record_attempt(&mut self, now_ms: u32) {
        self.last_attempt_ms = Some(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_derivation_truth_table() {
        assert_eq!(LinkStatus::derive(false, false), LinkStatus::NoLink);
        // Link down wins regardless of broker state.
        assert_eq!(LinkStatus::derive(false, true), LinkStatus::NoLink);
        assert_eq!(LinkStatus::derive(true, false), LinkStatus::NoBroker);
        assert_eq!(LinkStatus::derive(true, true), LinkStatus::Ok);
    }

    #[test]
    fn ok_mirrors_relay() {
        assert!(LinkStatus::Ok.indicator_lit(true, 123));
        assert!(!LinkStatus::Ok.indicator_lit(false, 123));
    }

    #[test]
    fn no_link_blinks_at_500ms_period() {
        assert!(!LinkStatus::NoLink.indicator_lit(false, 0));
        assert!(!LinkStatus::NoLink.indicator_lit(false, 250));
        assert!(LinkStatus::NoLink.indicator_lit(false, 251));
        assert!(LinkStatus::NoLink.indicator_lit(false, 499));
        assert!(!LinkStatus::NoLink.indicator_lit(false, 500));
    }

    #[test]
    fn no_broker_blinks_at_1000ms_period() {
        assert!(!LinkStatus::NoBroker.indicator_lit(true, 500));
        assert!(LinkStatus::NoBroker.indicator_lit(true, 501));
        assert!(LinkStatus::NoBroker.indicator_lit(true, 999));
        assert!(!LinkStatus::NoBroker.indicator_lit(true, 1000));
    }

    #[test]
    fn reconnect_floor_is_enforced() {
        let mut policy = ReconnectPolicy::new(5_000);

        assert!(policy.should_attempt(0));
        policy.record_attempt(0);

        assert!(!policy.should_attempt(4_999));
        assert!(policy.should_attempt(5_000));

        policy.record_attempt(5_000);
        assert!(!policy.should_attempt(9_999));
    }

    #[test]
    fn reconnect_gate_survives_clock_wraparound() {
        let mut policy = ReconnectPolicy::new(5_000);
        policy.record_attempt(u32::MAX - 1_000);

        assert!(!policy.should_attempt(u32::MAX));
        assert!(policy.should_attempt(4_000));
    }
}
