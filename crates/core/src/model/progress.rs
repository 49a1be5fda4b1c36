use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ModuleId;

/// Version written alongside every persisted progress record.
pub const PROGRESS_SCHEMA_VERSION: u32 = 1;

/// A `(module, step)` pair marked done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepRef {
    pub module: ModuleId,
    pub step: u32,
}

impl StepRef {
    #[must_use]
    pub fn new(module: ModuleId, step: u32) -> Self {
        Self { module, step }
    }
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Canonical session state of the funnel.
///
/// Every mutating method takes `now` from the caller's clock and refreshes
/// `last_interaction_at`, except `toggle_debug_mode` and `merge_level`, which
/// do not count as user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    current_module: ModuleId,
    current_step: u32,
    completed_steps: Vec<StepRef>,
    unlocked_level: u32,
    module_step_checkpoint: BTreeMap<ModuleId, u32>,
    first_access_at: DateTime<Utc>,
    last_interaction_at: DateTime<Utc>,
    module1_completed_at: Option<DateTime<Utc>>,
    debug_mode: bool,
}

impl ProgressRecord {
    /// Fresh record for a first-ever session.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::new_with_debug(now, true)
    }

    #[must_use]
    pub fn new_with_debug(now: DateTime<Utc>, debug_mode: bool) -> Self {
        Self {
            current_module: ModuleId::Dashboard,
            current_step: 0,
            completed_steps: Vec::new(),
            unlocked_level: 1,
            module_step_checkpoint: BTreeMap::new(),
            first_access_at: now,
            last_interaction_at: now,
            module1_completed_at: None,
            debug_mode,
        }
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// Duplicate completed steps are collapsed and a zero level is raised to 1.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        current_module: ModuleId,
        current_step: u32,
        completed_steps: Vec<StepRef>,
        unlocked_level: u32,
        module_step_checkpoint: BTreeMap<ModuleId, u32>,
        first_access_at: DateTime<Utc>,
        last_interaction_at: DateTime<Utc>,
        module1_completed_at: Option<DateTime<Utc>>,
        debug_mode: bool,
    ) -> Self {
        let mut deduped = Vec::with_capacity(completed_steps.len());
        for step in completed_steps {
            if !deduped.contains(&step) {
                deduped.push(step);
            }
        }
        Self {
            current_module,
            current_step,
            completed_steps: deduped,
            unlocked_level: unlocked_level.max(1),
            module_step_checkpoint,
            first_access_at,
            last_interaction_at,
            module1_completed_at,
            debug_mode,
        }
    }

    #[must_use]
    pub fn current_module(&self) -> ModuleId {
        self.current_module
    }

    #[must_use]
    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    #[must_use]
    pub fn completed_steps(&self) -> &[StepRef] {
        &self.completed_steps
    }

    #[must_use]
    pub fn unlocked_level(&self) -> u32 {
        self.unlocked_level
    }

    #[must_use]
    pub fn module_step_checkpoints(&self) -> &BTreeMap<ModuleId, u32> {
        &self.module_step_checkpoint
    }

    /// Last step reached in `module`, 0 if never visited.
    #[must_use]
    pub fn checkpoint(&self, module: ModuleId) -> u32 {
        self.module_step_checkpoint
            .get(&module)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn first_access_at(&self) -> DateTime<Utc> {
        self.first_access_at
    }

    #[must_use]
    pub fn last_interaction_at(&self) -> DateTime<Utc> {
        self.last_interaction_at
    }

    #[must_use]
    pub fn module1_completed_at(&self) -> Option<DateTime<Utc>> {
        self.module1_completed_at
    }

    #[must_use]
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    #[must_use]
    pub fn is_step_completed(&self, module: ModuleId, step: u32) -> bool {
        self.completed_steps.contains(&StepRef::new(module, step))
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_interaction_at = now;
    }

    /// Switch screens, resuming the target module at its checkpoint.
    pub fn navigate_to(&mut self, module: ModuleId, now: DateTime<Utc>) {
        self.current_module = module;
        self.current_step = self.checkpoint(module);
        self.touch(now);
    }

    /// Record that `module` reached `step`.
    ///
    /// The checkpoint only moves forward; `current_step` follows `step` as given.
    pub fn advance_step(&mut self, module: ModuleId, step: u32, now: DateTime<Utc>) {
        self.current_module = module;
        self.current_step = step;
        let checkpoint = self.module_step_checkpoint.entry(module).or_insert(0);
        *checkpoint = (*checkpoint).max(step);
        self.touch(now);
    }

    /// Returns `true` when the step was newly added.
    pub fn mark_step_completed(&mut self, module: ModuleId, step: u32, now: DateTime<Utc>) -> bool {
        let step_ref = StepRef::new(module, step);
        if self.completed_steps.contains(&step_ref) {
            return false;
        }
        self.completed_steps.push(step_ref);
        self.touch(now);
        true
    }

    /// Returns `true` only on the first call.
    pub fn mark_module1_complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.module1_completed_at.is_some() {
            return false;
        }
        self.module1_completed_at = Some(now);
        self.touch(now);
        true
    }

    /// Raise the unlock level. Returns `true` when it changed.
    pub fn unlock_level(&mut self, level: u32, now: DateTime<Utc>) -> bool {
        if level <= self.unlocked_level {
            return false;
        }
        self.unlocked_level = level;
        self.touch(now);
        true
    }

    /// Raise the level from an out-of-band source without counting it as interaction.
    pub fn merge_level(&mut self, level: u32) -> bool {
        if level <= self.unlocked_level {
            return false;
        }
        self.unlocked_level = level;
        true
    }

    /// Forget everything about one module so it can be replayed from step 0.
    pub fn restart_module(&mut self, module: ModuleId, now: DateTime<Utc>) {
        self.module_step_checkpoint.remove(&module);
        self.completed_steps.retain(|step| step.module != module);
        if self.current_module == module {
            self.current_step = 0;
        }
        self.touch(now);
    }

    pub fn toggle_debug_mode(&mut self) {
        self.debug_mode = !self.debug_mode;
    }

    /// Defaults for a new session that keep the diagnostics preference.
    #[must_use]
    pub fn reset(&self, now: DateTime<Utc>) -> Self {
        Self::new_with_debug(now, self.debug_mode)
    }
}
