/// Countdown timer driving the heater relay. Two states: idle
/// (`run == None`) and running. The relay is on exactly while the
/// timer runs.
///
/// Timestamps come from a free-running 32-bit millisecond counter, so
/// every elapsed-time computation uses `wrapping_sub`; the counter
/// rolling over must not produce a huge elapsed value.
#[derive(Debug, Clone)]
pub struct HeaterTimer {
    run: Option<Run>,
    duration_ms: u32,
}

/// An active run keeps the duration it was started with; changing the
/// configured duration mid-run does not move the deadline.
#[derive(Debug, Clone, Copy)]
struct Run {
    started_ms: u32,
    duration_ms: u32,
}

impl HeaterTimer {
    pub fn new(duration_ms: u32) -> Self {
        Self {
            run: None,
            duration_ms,
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Relay output mirrors the timer state.
    pub fn relay_on(&self) -> bool {
        self.is_running()
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    pub fn duration_min(&self) -> u32 {
        self.duration_ms / 60_000
    }

    pub fn start(&mut self, now_ms: u32) {
        self.run = Some(Run {
            started_ms: now_ms,
            duration_ms: self.duration_ms,
        });
    }

    pub fn stop(&mut self) {
        self.run = None;
    }

    /// Changes the configured run length, effective from the next
    /// start.
    pub fn set_duration_ms(&mut self, duration_ms: u32) {
        self.duration_ms = duration_ms;
    }

    /// Stops the timer once its run duration has elapsed. Returns true
    /// when the timer expired on this call.
    pub fn expire_check(&mut self, now_ms: u32) -> bool {
        let Some(run) = self.run else {
            return false;
        };
        if now_ms.wrapping_sub(run.started_ms) >= run.duration_ms {
            self.run = None;
            return true;
        }
        false
    }

    /// Milliseconds left on the current run; the full configured
    /// duration while idle.
    pub fn remaining_ms(&self, now_ms: u32) -> u32 {
        match self.run {
            Some(run) => {
                let elapsed = now_ms.wrapping_sub(run.started_ms);
                run.duration_ms.saturating_sub(elapsed)
            }
            None => self.duration_ms,
        }
    }

    pub fn remaining_min(&self, now_ms: u32) -> u32 {
        self.remaining_ms(now_ms) / 60_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_with_relay_off() {
        let timer = HeaterTimer::new(60_000);
        assert!(!timer.is_running());
        assert!(!timer.relay_on());
        assert_eq!(timer.remaining_min(0), 1);
    }

    #[test]
    fn relay_follows_timer_state() {
        let mut timer = HeaterTimer::new(60_000);

        timer.start(1_000);
        assert!(timer.relay_on());

        timer.stop();
        assert!(!timer.relay_on());
    }

    #[test]
    fn expires_once_duration_elapsed() {
        let mut timer = HeaterTimer::new(60_000);
        timer.start(1_000);

        assert!(!timer.expire_check(60_999));
        assert!(timer.is_running());

        assert!(timer.expire_check(61_000));
        assert!(!timer.is_running());

        // Already idle: no further expiry events.
        assert!(!timer.expire_check(120_000));
    }

    #[test]
    fn expiry_survives_clock_wraparound() {
        let mut timer = HeaterTimer::new(120_000);
        timer.start(u32::MAX - 30_000);

        // 30s elapsed across the rollover boundary.
        let now = 29_999_u32;
        assert!(!timer.expire_check(now));
        assert_eq!(timer.remaining_ms(now), 90_000);

        assert!(timer.expire_check(89_999));
    }

    #[test]
    fn remaining_reports_floor_minutes() {
        let mut timer = HeaterTimer::new(10 * 60_000);
        assert_eq!(timer.remaining_min(0), 10);

        timer.start(0);
        assert_eq!(timer.remaining_min(61_000), 8);
    }

    #[test]
    fn duration_change_applies_on_next_start() {
        let mut timer = HeaterTimer::new(60_000);
        timer.start(0);

        timer.set_duration_ms(10 * 60_000);
        assert_eq!(timer.duration_min(), 10);

        // Current run still expires on the old deadline.
        assert!(timer.expire_check(60_000));

        timer.start(100_000);
        assert!(!timer.expire_check(100_000 + 60_000));
        assert!(timer.expire_check(100_000 + 10 * 60_000));
    }
}
