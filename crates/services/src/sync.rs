//! Keeps the in-memory progress in line with the store.
//!
//! Three triggers rerun `ProgressController::revalidate`: lifecycle events
//! from the UI, writes to the legacy level flags, and a periodic poll.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use storage::legacy::{MODULE2_UNLOCKED_KEY, MODULE3_UNLOCKED_KEY, UNLOCKED_LEVEL_KEY, VIP_UNLOCKED_KEY};
use storage::repository::StoreEvent;

use crate::progress::SharedController;
use crate::timers::TaskGuard;

/// Lets the UI finish its own writes before the store is re-read.
const SETTLE: Duration = Duration::from_millis(50);

const LEVEL_KEYS: [&str; 4] = [
    UNLOCKED_LEVEL_KEY,
    MODULE2_UNLOCKED_KEY,
    MODULE3_UNLOCKED_KEY,
    VIP_UNLOCKED_KEY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Focus,
    VisibilityChange { visible: bool },
}

impl LifecycleEvent {
    fn wants_refresh(self) -> bool {
        match self {
            LifecycleEvent::Focus => true,
            LifecycleEvent::VisibilityChange { visible } => visible,
        }
    }
}

/// Background revalidation task; stops when dropped.
pub struct Revalidator {
    events: mpsc::Sender<LifecycleEvent>,
    level: watch::Receiver<u32>,
    _task: TaskGuard,
}

impl Revalidator {
    /// Must be called inside a tokio runtime.
    pub async fn spawn(controller: SharedController, poll: Duration) -> Self {
        let (initial, mut store_events) = {
            let guard = controller.lock().await;
            (
                guard.record().unlocked_level(),
                guard.store().kv().subscribe(),
            )
        };
        let (events, mut lifecycle) = mpsc::channel::<LifecycleEvent>(16);
        let (level_tx, level) = watch::channel(initial);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            let mut store_open = true;

            loop {
                let refresh = tokio::select! {
                    event = lifecycle.recv() => match event {
                        Some(event) if event.wants_refresh() => {
                            tokio::time::sleep(SETTLE).await;
                            true
                        }
                        Some(_) => false,
                        None => break,
                    },
                    changed = store_events.recv(), if store_open => match changed {
                        Ok(StoreEvent { key, .. }) => LEVEL_KEYS.contains(&key.as_str()),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "store events lagged");
                            true
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            store_open = false;
                            false
                        }
                    },
                    _ = interval.tick() => true,
                };
                if refresh {
                    revalidate(&controller, &level_tx).await;
                }
            }
            debug!("revalidator stopped");
        });

        Self {
            events,
            level,
            _task: TaskGuard::new(task),
        }
    }

    /// Queue a lifecycle event. Returns `false` if the queue is full or closed.
    pub fn notify(&self, event: LifecycleEvent) -> bool {
        self.events.try_send(event).is_ok()
    }

    #[must_use]
    pub fn unlocked_level(&self) -> u32 {
        *self.level.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.level.clone()
    }
}

async fn revalidate(controller: &SharedController, level: &watch::Sender<u32>) {
    let mut guard = controller.lock().await;
    match guard.revalidate().await {
        Ok(changed) => {
            if changed {
                debug!("progress revalidated from store");
            }
            level.send_if_modified(|current| {
                let next = guard.record().unlocked_level();
                let modified = *current != next;
                *current = next;
                modified
            });
        }
        Err(err) => warn!(%err, "revalidation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::time::fixed_now;
    use funnel_core::{Clock, FunnelConfig};
    use storage::repository::Storage;

    use crate::progress::ProgressController;

    async fn controller(storage: &Storage) -> SharedController {
        ProgressController::load(
            storage.progress(),
            Clock::fixed(fixed_now()),
            FunnelConfig::default(),
        )
        .await
        .unwrap()
        .shared()
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_flag_write_raises_level() {
        let storage = Storage::in_memory();
        let controller = controller(&storage).await;
        let revalidator = Revalidator::spawn(controller.clone(), Duration::from_secs(5)).await;
        let mut level = revalidator.subscribe();

        storage.progress().write_level_flags(3).await.unwrap();
        level.changed().await.unwrap();
        assert_eq!(*level.borrow(), 3);
        assert_eq!(controller.lock().await.record().unlocked_level(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn focus_and_poll_pick_up_newer_record() {
        let storage = Storage::in_memory();
        let ours = controller(&storage).await;
        let revalidator = Revalidator::spawn(ours.clone(), Duration::from_secs(5)).await;

        let mut theirs = ProgressController::load(
            storage.progress(),
            Clock::fixed(fixed_now()),
            FunnelConfig::default(),
        )
        .await
        .unwrap();
        theirs.advance_clock(chrono::Duration::minutes(1));
        theirs
            .advance_step(funnel_core::model::ModuleId::Module1, 4)
            .await
            .unwrap();

        assert!(revalidator.notify(LifecycleEvent::Focus));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            ours.lock()
                .await
                .record()
                .checkpoint(funnel_core::model::ModuleId::Module1),
            4
        );
    }

    #[test]
    fn hidden_page_does_not_refresh() {
        assert!(LifecycleEvent::Focus.wants_refresh());
        assert!(LifecycleEvent::VisibilityChange { visible: true }.wants_refresh());
        assert!(!LifecycleEvent::VisibilityChange { visible: false }.wants_refresh());
    }
}
