use std::time::{Duration, Instant};

/// Trailing-edge debounce timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed { deadline: Instant },
    Firing,
}

/// Single-shot delayed trigger, restarted on every [`arm`](Debouncer::arm).
///
/// The owner drives it with [`poll`](Debouncer::poll) from the UI thread;
/// once the deadline passes the timer enters `Firing`, and the owner calls
/// [`finish`](Debouncer::finish) after running the triggered work.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DebounceState::Idle,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// (Re)start the countdown from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.state = DebounceState::Armed {
            deadline: now + self.delay,
        };
    }

    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Returns `true` exactly once per armed period, when `now` has reached
    /// the deadline.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            DebounceState::Armed { deadline } if now >= deadline => {
                self.state = DebounceState::Firing;
                true
            }
            _ => false,
        }
    }

    pub fn finish(&mut self) {
        if self.state == DebounceState::Firing {
            self.state = DebounceState::Idle;
        }
    }
}
