//! Fixed-period heartbeat scheduler
//!
//! The scheduler only produces ticks. Whether a tick turns into a publish is
//! decided by the session actor, which checks the connection state and the
//! tick's generation when it handles it.

use super::timer::{TimerEvent, TimerSlot};
use crate::platform::Telemetry;
use crate::protocol::{HeartbeatRecord, now_millis};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Debug)]
pub struct HeartbeatScheduler {
    period: Duration,
    timer: TimerSlot,
}

impl HeartbeatScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            timer: TimerSlot::new(),
        }
    }

    /// Start ticking every period, replacing any running timer; the first tick
    /// comes one full period after this call
    pub fn start(&mut self, timer_tx: &mpsc::UnboundedSender<TimerEvent>) {
        let period = self.period;
        let tx = timer_tx.clone();
        self.timer.arm(move |generation| async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the immediate first tick
            interval.tick().await;

            loop {
                interval.tick().await;
                if tx.send(TimerEvent::HeartbeatTick { generation }).is_err() {
                    break;
                }
            }
        });
        debug!(period_secs = period.as_secs(), "Heartbeat started");
    }

    /// No-op when idle; returns whether a timer was running
    pub fn stop(&mut self) -> bool {
        let was_running = self.timer.cancel();
        if was_running {
            debug!("Heartbeat stopped");
        }
        was_running
    }

    pub fn is_active(&self) -> bool {
        self.timer.is_armed()
    }

    /// Whether a tick stamped `generation` belongs to the running timer
    pub fn accepts(&self, generation: u64) -> bool {
        self.timer.is_current(generation)
    }
}

/// Build the liveness record for one tick
pub fn heartbeat_record(device_id: &str, telemetry: Telemetry) -> HeartbeatRecord {
    HeartbeatRecord {
        device_id: device_id.to_string(),
        timestamp: now_millis(),
        status: "online".to_string(),
        battery_level: telemetry.battery_level,
        storage_info: telemetry.storage_info,
        memory_info: telemetry.memory_info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_period_after_first() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut heartbeat = HeartbeatScheduler::new(Duration::from_secs(30));
        let started = tokio::time::Instant::now();
        heartbeat.start(&tx);

        let first = rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));
        let TimerEvent::HeartbeatTick { generation } = first else {
            panic!("expected heartbeat tick");
        };
        assert!(heartbeat.accepts(generation));

        rx.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut heartbeat = HeartbeatScheduler::new(Duration::from_secs(30));
        heartbeat.start(&tx);
        heartbeat.start(&tx);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let mut ticks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            ticks.push(event);
        }
        assert_eq!(ticks.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut heartbeat = HeartbeatScheduler::new(Duration::from_secs(30));
        assert!(!heartbeat.stop());

        heartbeat.start(&tx);
        assert!(heartbeat.is_active());
        assert!(heartbeat.stop());
        assert!(!heartbeat.is_active());
        assert!(!heartbeat.stop());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_heartbeat_record_carries_telemetry() {
        let record = heartbeat_record(
            "d1",
            Telemetry {
                battery_level: Some(42),
                storage_info: "1/2 MB".to_string(),
                memory_info: "3/4 MB".to_string(),
            },
        );
        assert_eq!(record.status, "online");
        assert_eq!(record.battery_level, Some(42));
        assert!(record.timestamp > 0);
    }
}
