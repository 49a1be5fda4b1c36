use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use funnel_core::countdown::{Countdown, CountdownFormat};
use funnel_core::machine::UnlockDirective;
use funnel_core::model::{ModuleId, ProgressRecord};
use funnel_core::{Clock, FunnelConfig};
use storage::progress_store::{ProgressStore, StoredProgress};

use crate::error::ProgressError;

/// The two time-gated unlocks derived from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunnelCountdowns {
    /// Anchored on module 1 completion.
    pub module2_gate: Countdown,
    /// Anchored on the first visit.
    pub final_reveal: Countdown,
}

/// Result of navigating back to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnHome {
    pub from: ModuleId,
    /// Level newly granted by a return rule; the UI plays the unlock effect.
    pub unlocked: Option<u32>,
}

/// Controller handle shared by chat screens and background tasks.
pub type SharedController = Arc<Mutex<ProgressController>>;

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Owns the progress record and writes it through on every mutation.
pub struct ProgressController {
    clock: Clock,
    config: FunnelConfig,
    store: ProgressStore,
    record: ProgressRecord,
}

impl ProgressController {
    /// Load the persisted record, falling back to defaults when it is missing,
    /// corrupt or older than the expiry window.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read or written.
    pub async fn load(
        store: ProgressStore,
        clock: Clock,
        config: FunnelConfig,
    ) -> Result<Self, ProgressError> {
        let now = clock.now();
        let record = match store.load_progress().await? {
            StoredProgress::Missing => {
                debug!("no stored progress, starting fresh");
                ProgressRecord::new(now)
            }
            StoredProgress::Corrupt(err) => {
                warn!(%err, "stored progress is corrupt, starting fresh");
                ProgressRecord::new(now)
            }
            StoredProgress::Found(row) => {
                let expired = row
                    .reference_time()
                    .is_some_and(|anchor| now - anchor > config.session_expiry());
                if expired {
                    info!(
                        expiry_days = config.session_expiry().num_days(),
                        "session expired, resetting progress"
                    );
                    store.clear_session().await?;
                    ProgressRecord::new(now)
                } else {
                    row.into_record(now)
                }
            }
        };

        let controller = Self {
            clock,
            config,
            store,
            record,
        };
        controller.persist().await?;
        Ok(controller)
    }

    #[must_use]
    pub fn shared(self) -> SharedController {
        Arc::new(Mutex::new(self))
    }

    #[must_use]
    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn config(&self) -> &FunnelConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Move the clock of a fixed-time controller forward.
    pub fn advance_clock(&mut self, delta: chrono::Duration) {
        self.clock.advance(delta);
    }

    async fn persist(&self) -> Result<(), ProgressError> {
        self.store.save_progress(&self.record).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProgressError` if the record cannot be saved.
    pub async fn navigate_to(&mut self, module: ModuleId) -> Result<u32, ProgressError> {
        self.record.navigate_to(module, self.clock.now());
        self.persist().await?;
        debug!(%module, step = self.record.current_step(), "navigated");
        Ok(self.record.current_step())
    }

    /// # Errors
    ///
    /// Returns `ProgressError` if the record cannot be saved.
    pub async fn advance_step(&mut self, module: ModuleId, step: u32) -> Result<(), ProgressError> {
        self.record.advance_step(module, step, self.clock.now());
        self.persist().await?;
        debug!(%module, step, "step advanced");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProgressError` if the record cannot be saved.
    pub async fn mark_step_completed(
        &mut self,
        module: ModuleId,
        step: u32,
    ) -> Result<bool, ProgressError> {
        let added = self
            .record
            .mark_step_completed(module, step, self.clock.now());
        if added {
            self.persist().await?;
        }
        Ok(added)
    }

    /// Stamp module 1 completion once; later calls keep the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the record or the anchor cannot be saved.
    pub async fn mark_module1_complete(&mut self) -> Result<bool, ProgressError> {
        let now = self.clock.now();
        if !self.record.mark_module1_complete(now) {
            return Ok(false);
        }
        self.store.write_module1_anchor(now).await?;
        self.persist().await?;
        info!(completed_at = %now, "module 1 complete");
        Ok(true)
    }

    /// Raise the unlock level; lower levels are ignored.
    ///
    /// The legacy flags are rewritten from the current level on every call.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the record or the legacy flags cannot be saved.
    pub async fn unlock_level(&mut self, level: u32) -> Result<bool, ProgressError> {
        let raised = self.record.unlock_level(level, self.clock.now());
        self.store.write_level_flags(self.record.unlocked_level()).await?;
        if !raised {
            return Ok(false);
        }
        self.persist().await?;
        info!(level, "level unlocked");
        Ok(true)
    }

    /// Apply the unlock carried by the last message of a batch from `source`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if persisting fails.
    pub async fn apply_unlock(
        &mut self,
        source: ModuleId,
        directive: UnlockDirective,
    ) -> Result<bool, ProgressError> {
        if source == ModuleId::Module1 {
            self.mark_module1_complete().await?;
        }
        self.unlock_level(directive.level).await
    }

    /// Start over, keeping only the diagnostics preference.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if clearing or saving fails.
    pub async fn reset_all(&mut self) -> Result<(), ProgressError> {
        self.record = self.record.reset(self.clock.now());
        let removed = self.store.clear_session().await?;
        self.persist().await?;
        info!(removed, "progress reset");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProgressError` if the record cannot be saved.
    pub async fn toggle_debug_mode(&mut self) -> Result<bool, ProgressError> {
        self.record.toggle_debug_mode();
        self.persist().await?;
        Ok(self.record.debug_mode())
    }

    /// Forget one module's transcript and checkpoint so it replays from step 0.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if clearing or saving fails.
    pub async fn restart_module(&mut self, module: ModuleId) -> Result<(), ProgressError> {
        self.record.restart_module(module, self.clock.now());
        self.store.clear_module(module).await?;
        self.persist().await?;
        info!(%module, "module restarted");
        Ok(())
    }

    /// Go back to the dashboard, applying the configured return rules.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if persisting fails.
    pub async fn return_home(&mut self) -> Result<ReturnHome, ProgressError> {
        let from = self.record.current_module();
        let reached = self
            .record
            .current_step()
            .max(self.record.checkpoint(from));
        let mut unlocked = None;
        if let Some(level) = self.config.return_unlock(from, reached)
            && self.unlock_level(level).await?
        {
            unlocked = Some(level);
        }
        self.navigate_to(ModuleId::Dashboard).await?;
        Ok(ReturnHome { from, unlocked })
    }

    /// Reconcile with what is on disk.
    ///
    /// A stored record with a later interaction replaces the in-memory one,
    /// then the level is raised to whatever the legacy flags imply. Returns
    /// `true` when anything changed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read or written.
    pub async fn revalidate(&mut self) -> Result<bool, ProgressError> {
        let mut changed = false;
        if let StoredProgress::Found(row) = self.store.load_progress().await? {
            let newer = row
                .last_interaction_at
                .is_some_and(|at| at > self.record.last_interaction_at());
            if newer {
                self.record = row.into_record(self.clock.now());
                changed = true;
            }
        }

        let legacy_level = self.store.read_level_flags().await?.implied_level();
        if self.record.merge_level(legacy_level) {
            info!(level = legacy_level, "level raised from legacy flags");
            changed = true;
        }

        if changed {
            self.persist().await?;
        }
        Ok(changed)
    }

    #[must_use]
    pub fn countdowns(&self) -> FunnelCountdowns {
        FunnelCountdowns {
            module2_gate: Countdown::new(
                self.record.module1_completed_at(),
                self.config.module2_gate(),
                CountdownFormat::Hms,
            ),
            final_reveal: Countdown::new(
                Some(self.record.first_access_at()),
                self.config.final_reveal(),
                CountdownFormat::Dhms,
            ),
        }
    }

    /// `true` once the module-2 gate countdown has run out.
    #[must_use]
    pub fn module2_ready(&self) -> bool {
        self.countdowns()
            .module2_gate
            .state(self.clock.now())
            .is_ready()
    }

    /// Seal the final tier and return the countdown its lock screen shows.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the lock cannot be written.
    pub async fn lock_final_tier(&mut self) -> Result<Countdown, ProgressError> {
        self.store.lock_final_tier(self.clock.now()).await?;
        Ok(self.countdowns().final_reveal)
    }

    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read.
    pub async fn final_tier_locked(&self) -> Result<bool, ProgressError> {
        Ok(self.store.final_tier_lock().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use funnel_core::time::fixed_now;
    use storage::legacy::LegacyFlags;
    use storage::progress_store::PROGRESS_KEY;
    use storage::repository::{KeyValueStore, Storage};

    async fn controller() -> ProgressController {
        let storage = Storage::in_memory();
        ProgressController::load(
            storage.progress(),
            Clock::fixed(fixed_now()),
            FunnelConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn fresh_load_persists_defaults() {
        let controller = controller().await;
        assert_eq!(controller.record().unlocked_level(), 1);
        assert!(controller.record().debug_mode());
        assert!(matches!(
            controller.store().load_progress().await.unwrap(),
            StoredProgress::Found(_)
        ));
    }

    #[tokio::test]
    async fn corrupt_record_loads_defaults() {
        let storage = Storage::in_memory();
        storage.kv.set(PROGRESS_KEY, "][").await.unwrap();
        let controller = ProgressController::load(
            storage.progress(),
            Clock::fixed(fixed_now()),
            FunnelConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(controller.record(), &ProgressRecord::new(fixed_now()));
    }

    #[tokio::test]
    async fn unlock_mirrors_legacy_flags_and_ignores_lower_levels() {
        let mut controller = controller().await;
        assert!(controller.unlock_level(3).await.unwrap());
        assert!(!controller.unlock_level(2).await.unwrap());
        assert_eq!(controller.record().unlocked_level(), 3);
        assert_eq!(
            controller.store().read_level_flags().await.unwrap(),
            LegacyFlags::for_level(3)
        );
    }

    #[tokio::test]
    async fn repeated_unlock_restores_missing_legacy_flags() {
        let mut controller = controller().await;
        controller.unlock_level(3).await.unwrap();
        for key in storage::legacy::LEGACY_KEYS {
            controller.store().kv().remove(key).await.unwrap();
        }
        assert_eq!(
            controller.store().read_level_flags().await.unwrap(),
            LegacyFlags::default()
        );

        assert!(!controller.unlock_level(2).await.unwrap());
        assert_eq!(
            controller.store().read_level_flags().await.unwrap(),
            LegacyFlags::for_level(3)
        );
    }

    #[tokio::test]
    async fn module1_completion_anchor_is_written_once() {
        let mut controller = controller().await;
        assert!(controller.mark_module1_complete().await.unwrap());
        controller.advance_clock(Duration::hours(3));
        assert!(!controller.mark_module1_complete().await.unwrap());
        assert_eq!(controller.record().module1_completed_at(), Some(fixed_now()));
        assert_eq!(
            controller.store().module1_anchor().await.unwrap(),
            Some(fixed_now())
        );
    }

    #[tokio::test]
    async fn return_home_applies_rules_once() {
        let mut controller = controller().await;
        controller.unlock_level(2).await.unwrap();
        controller.advance_step(ModuleId::Module2, 11).await.unwrap();
        let first = controller.return_home().await.unwrap();
        assert_eq!(
            first,
            ReturnHome {
                from: ModuleId::Module2,
                unlocked: Some(3)
            }
        );
        assert_eq!(controller.record().current_module(), ModuleId::Dashboard);

        controller.navigate_to(ModuleId::Module2).await.unwrap();
        let second = controller.return_home().await.unwrap();
        assert_eq!(second.unlocked, None);
    }

    #[tokio::test]
    async fn return_home_below_threshold_grants_nothing() {
        let mut controller = controller().await;
        controller.advance_step(ModuleId::Module2, 10).await.unwrap();
        let back = controller.return_home().await.unwrap();
        assert_eq!(back.unlocked, None);
        assert_eq!(controller.record().unlocked_level(), 1);
    }

    #[tokio::test]
    async fn revalidate_merges_legacy_level() {
        let mut controller = controller().await;
        controller.store().write_level_flags(4).await.unwrap();
        assert!(controller.revalidate().await.unwrap());
        assert_eq!(controller.record().unlocked_level(), 4);
        assert!(!controller.revalidate().await.unwrap());
    }

    #[tokio::test]
    async fn revalidate_adopts_newer_stored_record() {
        let storage = Storage::in_memory();
        let clock = Clock::fixed(fixed_now());
        let mut ours = ProgressController::load(storage.progress(), clock, FunnelConfig::default())
            .await
            .unwrap();

        let mut theirs =
            ProgressController::load(storage.progress(), clock, FunnelConfig::default())
                .await
                .unwrap();
        theirs.advance_clock(Duration::minutes(5));
        theirs.advance_step(ModuleId::Module1, 6).await.unwrap();

        assert!(ours.revalidate().await.unwrap());
        assert_eq!(ours.record().checkpoint(ModuleId::Module1), 6);
    }

    #[tokio::test]
    async fn countdowns_follow_record_anchors() {
        let mut controller = controller().await;
        let countdowns = controller.countdowns();
        assert!(!countdowns.module2_gate.is_active());
        assert_eq!(countdowns.final_reveal.anchor(), Some(fixed_now()));

        controller.mark_module1_complete().await.unwrap();
        assert!(!controller.module2_ready());
        controller.advance_clock(Duration::hours(36));
        assert!(controller.module2_ready());
    }

    #[tokio::test]
    async fn restart_module_clears_its_caches() {
        let mut controller = controller().await;
        controller.advance_step(ModuleId::Copilot, 7).await.unwrap();
        controller
            .store()
            .save_typing_checkpoint(ModuleId::Copilot, 4)
            .await
            .unwrap();
        controller.restart_module(ModuleId::Copilot).await.unwrap();
        assert_eq!(controller.record().checkpoint(ModuleId::Copilot), 0);
        assert_eq!(controller.record().current_step(), 0);
        assert_eq!(
            controller
                .store()
                .load_typing_checkpoint(ModuleId::Copilot)
                .await
                .unwrap(),
            None
        );
    }
}
