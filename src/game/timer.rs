/// Cancellable countdown clock for the reveal phase
///
/// Configured with a total duration and a tick interval. Emits one `Tick` per
/// elapsed interval carrying the remaining seconds, then exactly one
/// `Finished`. Cancellation at any point stops all further events and is
/// idempotent: cancelling twice, or after finish, is a no-op.
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// One interval elapsed; payload is the remaining whole seconds
    Tick(u64),
    Finished,
}

#[derive(Debug)]
pub struct RoundTimer {
    task: JoinHandle<()>,
    events: mpsc::UnboundedReceiver<TimerEvent>,
}

impl RoundTimer {
    /// Start counting down `total`, ticking every `interval`.
    ///
    /// A 15s/1s timer emits `Tick(14)` through `Tick(1)` followed by
    /// `Finished`. Must be called from within a tokio runtime.
    pub fn start(total: Duration, interval: Duration) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let steps = (total.as_millis() / interval.as_millis().max(1)) as u64;
        let interval_secs = interval.as_secs();

        let task = tokio::spawn(async move {
            let mut clock = tokio::time::interval(interval);
            clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately
            clock.tick().await;

            for step in (0..steps).rev() {
                clock.tick().await;
                let event = if step == 0 {
                    TimerEvent::Finished
                } else {
                    TimerEvent::Tick(step * interval_secs)
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
        });

        Self { task, events }
    }

    /// Next event, or `None` once the timer has finished or been cancelled
    pub async fn recv(&mut self) -> Option<TimerEvent> {
        self.events.recv().await
    }

    /// Stop the countdown. No events are observed after this returns;
    /// cancelling an already finished or cancelled timer does nothing.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.events.close();
        // Drain anything emitted before the abort landed
        while self.events.try_recv().is_ok() {}
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
