//! Background tasks that keep countdowns current.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use funnel_core::countdown::{Countdown, CountdownState, CountdownTracker, Urgency};
use funnel_core::Clock;

const TICK: Duration = Duration::from_secs(1);

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
pub struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    #[must_use]
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self(handle)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// What a countdown screen renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownSnapshot {
    pub state: CountdownState,
    pub display: String,
    pub urgency: Urgency,
}

impl CountdownSnapshot {
    fn at(tracker: &mut CountdownTracker, now: DateTime<Utc>) -> Self {
        let state = tracker.observe(now);
        let countdown = tracker.countdown();
        Self {
            state,
            display: countdown.format_remaining(now),
            urgency: countdown.urgency(now),
        }
    }
}

/// Recomputes a countdown every second until it is ready.
pub struct CountdownTicker {
    snapshots: watch::Receiver<CountdownSnapshot>,
    _task: TaskGuard,
}

impl CountdownTicker {
    /// Must be called inside a tokio runtime.
    ///
    /// A fixed clock is advanced by the runtime's elapsed time, so paused-time
    /// tests drive the ticker deterministically.
    #[must_use]
    pub fn spawn(countdown: Countdown, clock: Clock) -> Self {
        let mut tracker = CountdownTracker::new(countdown);
        let started = Instant::now();
        let base = clock.now();
        let now = move || {
            if clock.is_fixed() {
                let elapsed = chrono::Duration::from_std(started.elapsed())
                    .unwrap_or(chrono::Duration::zero());
                base + elapsed
            } else {
                clock.now()
            }
        };

        let first = CountdownSnapshot::at(&mut tracker, now());
        let done = first.state.is_ready();
        let (tx, snapshots) = watch::channel(first);

        let task = tokio::spawn(async move {
            if done {
                return;
            }
            let mut interval = tokio::time::interval(TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let snapshot = CountdownSnapshot::at(&mut tracker, now());
                let ready = snapshot.state.is_ready();
                if tx.send(snapshot).is_err() || ready {
                    break;
                }
            }
            tracing::debug!("countdown ticker stopped");
        });

        Self {
            snapshots,
            _task: TaskGuard::new(task),
        }
    }

    #[must_use]
    pub fn current(&self) -> CountdownSnapshot {
        self.snapshots.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CountdownSnapshot> {
        self.snapshots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::countdown::CountdownFormat;
    use funnel_core::time::fixed_now;

    #[tokio::test(start_paused = true)]
    async fn ticker_counts_down_and_latches_ready() {
        let countdown = Countdown::new(
            Some(fixed_now()),
            chrono::Duration::seconds(3),
            CountdownFormat::Hms,
        );
        let ticker = CountdownTicker::spawn(countdown, Clock::fixed(fixed_now()));
        assert_eq!(ticker.current().display, "00:00:03");

        let mut updates = ticker.subscribe();
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow().display, "00:00:02");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(ticker.current().state.is_ready());
        assert_eq!(ticker.current().display, "00:00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn ready_countdown_never_ticks() {
        let countdown = Countdown::new(
            Some(fixed_now() - chrono::Duration::days(8)),
            chrono::Duration::days(7),
            CountdownFormat::Dhms,
        );
        let ticker = CountdownTicker::spawn(countdown, Clock::fixed(fixed_now()));
        assert!(ticker.current().state.is_ready());
        assert_eq!(ticker.current().urgency, Urgency::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_guard_aborts_task() {
        let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();
        let guard = TaskGuard::new(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = tx.send(());
        }));
        drop(guard);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err());
    }
}
