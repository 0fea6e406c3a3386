//! Bounded linear-backoff reconnect controller

use super::timer::{TimerEvent, TimerSlot};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempt N waits `base_delay * N`
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(5000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Pure decision given the failures counted so far
    pub fn decide(&self, attempts_so_far: u32) -> ReconnectDecision {
        if attempts_so_far >= self.max_attempts {
            return ReconnectDecision::Exhausted {
                attempts: attempts_so_far,
            };
        }
        let attempt = attempts_so_far + 1;
        ReconnectDecision::Scheduled {
            attempt,
            delay: self.delay_for(attempt),
        }
    }

    /// Sum of every delay before giving up
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Decision result for one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// A reconnect timer was armed
    Scheduled { attempt: u32, delay: Duration },
    /// Ceiling reached; no timer armed
    Exhausted { attempts: u32 },
}

/// Reconnect bookkeeping plus the single reconnect timer
#[derive(Debug)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempt_count: u32,
    exhausted: bool,
    pending_delay: Option<Duration>,
    timer: TimerSlot,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt_count: 0,
            exhausted: false,
            pending_delay: None,
            timer: TimerSlot::new(),
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Delay of the armed timer
    pub fn pending_delay(&self) -> Option<Duration> {
        self.timer.is_armed().then_some(self.pending_delay).flatten()
    }

    /// Count a failure and arm the next attempt, superseding any armed timer
    pub fn schedule_next(&mut self, timer_tx: &mpsc::UnboundedSender<TimerEvent>) -> ReconnectDecision {
        let decision = self.policy.decide(self.attempt_count);
        match decision {
            ReconnectDecision::Scheduled { attempt, delay } => {
                self.attempt_count = attempt;
                self.pending_delay = Some(delay);
                let tx = timer_tx.clone();
                self.timer.arm(move |generation| async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(TimerEvent::ReconnectDue { generation });
                });
                info!(
                    attempt = attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduled reconnect"
                );
            }
            ReconnectDecision::Exhausted { attempts } => {
                self.cancel();
                self.exhausted = true;
                error!(attempts = attempts, "Reconnect attempts exhausted");
            }
        }
        decision
    }

    /// Accept a timer firing; false for stale or cancelled timers
    pub fn take_due(&mut self, generation: u64) -> bool {
        let due = self.timer.take_fired(generation);
        if due {
            self.pending_delay = None;
        }
        due
    }

    /// Successful connect: counter back to zero, nothing pending
    pub fn on_connected(&mut self) {
        self.reset();
    }

    /// Manual reconnect: forget past failures and any armed timer
    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.exhausted = false;
        self.cancel();
    }

    /// Disarm the timer, keeping the counter
    pub fn cancel(&mut self) -> bool {
        self.pending_delay = None;
        self.timer.cancel()
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_armed()
    }
}
