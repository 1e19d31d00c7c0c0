use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Single-producer/single-consumer press signal shared between the
/// button interrupt handler and the control loop.
///
/// The producer side (`press_edge`) runs in interrupt context: on a
/// pressed-level edge it records the press unless one was already
/// accepted within the debounce window. The consumer side
/// (`take_press_event`) is an atomic read-and-clear, so a press can
/// never be observed twice and presses faster than one per tick
/// coalesce into one event.
#[derive(Debug)]
pub struct ButtonSignal {
    pressed: AtomicBool,
    last_edge_ms: AtomicU32,
    debounce_ms: u32,
}

impl ButtonSignal {
    pub fn new(debounce_ms: u32) -> Self {
        Self {
            pressed: AtomicBool::new(false),
            last_edge_ms: AtomicU32::new(0),
            debounce_ms,
        }
    }

    /// Called from the ISR on a transition to the pressed level.
    /// Returns whether the edge was accepted.
    pub fn press_edge(&self, now_ms: u32) -> bool {
        let last = self.last_edge_ms.load(Ordering::Relaxed);
        if now_ms.wrapping_sub(last) < self.debounce_ms {
            return false;
        }
        self.last_edge_ms.store(now_ms, Ordering::Relaxed);
        self.pressed.store(true, Ordering::Release);
        true
    }

    /// Consumes the pending press event, if any. At most one event is
    /// outstanding at a time.
    pub fn take_press_event(&self) -> bool {
        self.pressed.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounces_within_window_produce_one_event() {
        let signal = ButtonSignal::new(200);

        // Mechanical bounce train on one physical press.
        assert!(signal.press_edge(1_000));
        assert!(!signal.press_edge(1_005));
        assert!(!signal.press_edge(1_050));
        assert!(!signal.press_edge(1_199));

        assert!(signal.take_press_event());
        assert!(!signal.take_press_event());
    }

    #[test]
    fn presses_outside_window_are_separate_events() {
        let signal = ButtonSignal::new(200);

        assert!(signal.press_edge(1_000));
        assert!(signal.take_press_event());

        assert!(signal.press_edge(1_200));
        assert!(signal.take_press_event());
    }

    #[test]
    fn unconsumed_presses_coalesce() {
        let signal = ButtonSignal::new(200);

        assert!(signal.press_edge(1_000));
        assert!(signal.press_edge(1_300));

        assert!(signal.take_press_event());
        assert!(!signal.take_press_event());
    }

    #[test]
    fn debounce_window_survives_clock_wraparound() {
        let signal = ButtonSignal::new(200);

        assert!(signal.press_edge(u32::MAX - 50));
        assert!(signal.take_press_event());

        // 100 ms after the edge, across the rollover.
        assert!(!signal.press_edge(49));
        // 250 ms after the edge.
        assert!(signal.press_edge(199));
    }
}
