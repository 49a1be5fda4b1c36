use chrono::Duration;

use crate::model::ModuleId;

/// Unlock granted when the user returns home from a module.
///
/// `min_step` is compared against the step the user had reached in `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnUnlockRule {
    pub from: ModuleId,
    pub min_step: u32,
    pub level: u32,
}

/// Durations and thresholds that drive the funnel's gates.
///
/// These values belong to the content layer. The controller and the countdowns
/// read them but never hardcode them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelConfig {
    session_expiry: Duration,
    module2_gate: Duration,
    final_reveal: Duration,
    revalidate_every: Duration,
    return_rules: Vec<ReturnUnlockRule>,
}

impl FunnelConfig {
    #[must_use]
    pub fn new(
        session_expiry: Duration,
        module2_gate: Duration,
        final_reveal: Duration,
        revalidate_every: Duration,
        return_rules: Vec<ReturnUnlockRule>,
    ) -> Self {
        Self {
            session_expiry,
            module2_gate,
            final_reveal,
            revalidate_every,
            return_rules,
        }
    }

    #[must_use]
    pub fn session_expiry(&self) -> Duration {
        self.session_expiry
    }

    #[must_use]
    pub fn module2_gate(&self) -> Duration {
        self.module2_gate
    }

    #[must_use]
    pub fn final_reveal(&self) -> Duration {
        self.final_reveal
    }

    #[must_use]
    pub fn revalidate_every(&self) -> Duration {
        self.revalidate_every
    }

    #[must_use]
    pub fn return_rules(&self) -> &[ReturnUnlockRule] {
        &self.return_rules
    }

    /// Level granted for leaving `from` at `step`, if any rule applies.
    #[must_use]
    pub fn return_unlock(&self, from: ModuleId, step: u32) -> Option<u32> {
        self.return_rules
            .iter()
            .filter(|rule| rule.from == from && step >= rule.min_step)
            .map(|rule| rule.level)
            .max()
    }

    #[must_use]
    pub fn with_session_expiry(mut self, expiry: Duration) -> Self {
        self.session_expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_module2_gate(mut self, gate: Duration) -> Self {
        self.module2_gate = gate;
        self
    }
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            session_expiry: Duration::days(10),
            module2_gate: Duration::hours(36),
            final_reveal: Duration::days(7),
            revalidate_every: Duration::seconds(5),
            return_rules: vec![
                ReturnUnlockRule {
                    from: ModuleId::Module2,
                    min_step: 11,
                    level: 3,
                },
                ReturnUnlockRule {
                    from: ModuleId::Module3,
                    min_step: 0,
                    level: 4,
                },
            ],
        }
    }
}
