//! Cancellable timer slots keyed by generation
//!
//! A slot owns at most one spawned timer task. Every arm or cancel bumps the
//! generation, and timer tasks stamp what they post with the generation they
//! were armed under, so a tick that raced with a cancel is recognisably stale
//! when it reaches the session actor.

use std::future::Future;
use tokio::task::JoinHandle;

/// Timer notifications posted to the session actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    HeartbeatTick { generation: u64 },
    ReconnectDue { generation: u64 },
}

#[derive(Debug, Default)]
pub struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any armed timer with the task built by `task(generation)`
    pub fn arm<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        self.handle = Some(tokio::spawn(task(generation)));
    }

    /// Abort the armed timer; returns whether one was armed
    pub fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether an event stamped `generation` came from the armed timer
    pub fn is_current(&self, generation: u64) -> bool {
        self.handle.is_some() && self.generation == generation
    }

    /// Accept a one-shot firing: disarms the slot if `generation` is current
    pub fn take_fired(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.handle = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new();

        let first_tx = tx.clone();
        slot.arm(|generation| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = first_tx.send(generation);
        });
        let stale = slot.generation();

        slot.arm(|generation| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = tx.send(generation);
        });
        let current = slot.generation();
        assert_ne!(stale, current);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, current);
        assert!(slot.take_fired(fired));
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_invalidates_generation() {
        let mut slot = TimerSlot::new();
        slot.arm(|_| async {});
        let armed = slot.generation();
        assert!(slot.is_current(armed));

        assert!(slot.cancel());
        assert!(!slot.is_current(armed));
        assert!(!slot.take_fired(armed));
        assert!(!slot.cancel());
    }
}
