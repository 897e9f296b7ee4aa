/// Coalescing broadcast scheduler
///
/// A pending flag plus a single scheduled flush: each trigger reschedules
/// the flush after a fixed delay, capped by a maximum coalescing window from
/// the first trigger of the burst so a steady stream of updates still
/// broadcasts periodically.
use tokio::time::Instant;
use std::time::Duration;

/// Debounced flush scheduler for one broadcast kind
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    max_window: Duration,
    first_trigger: Option<Instant>,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Create a scheduler with the given per-trigger delay and maximum
    /// coalescing window
    pub fn new(delay: Duration, max_window: Duration) -> Self {
        Self {
            delay,
            max_window,
            first_trigger: None,
            deadline: None,
        }
    }

    /// Note a state change: schedules (or reschedules) the flush
    pub fn trigger(&mut self, now: Instant) {
        let first = *self.first_trigger.get_or_insert(now);
        self.deadline = Some((now + self.delay).min(first + self.max_window));
    }

    /// The pending flush deadline, if a flush is scheduled
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a flush is pending
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the pending flush if its deadline has passed
    pub fn take_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.first_trigger = None;
                true
            }
            _ => false,
        }
    }
}
