//! Screen gating and back-navigation.

use funnel_core::model::ModuleId;
use tracing::warn;

/// Unlock level needed to open `module`.
#[must_use]
pub fn required_level(module: ModuleId) -> u32 {
    match module {
        ModuleId::Dashboard | ModuleId::Module1 | ModuleId::Copilot | ModuleId::Calculator => 1,
        ModuleId::Module2 => 2,
        ModuleId::Module3 | ModuleId::Community => 3,
    }
}

#[must_use]
pub fn is_reachable(module: ModuleId, unlocked_level: u32) -> bool {
    unlocked_level >= required_level(module)
}

/// Screen to render for a raw module identifier.
///
/// Unknown identifiers and modules above `unlocked_level` fall back to the
/// home screen, so a bad value never leaves the user on a blank page.
#[must_use]
pub fn resolve(raw: &str, unlocked_level: u32) -> ModuleId {
    let module = match raw.parse::<ModuleId>() {
        Ok(module) => module,
        Err(err) => {
            warn!(%err, "unknown screen requested, showing dashboard");
            return ModuleId::Dashboard;
        }
    };
    if is_reachable(module, unlocked_level) {
        module
    } else {
        warn!(
            %module,
            unlocked_level,
            required = required_level(module),
            "screen still locked, showing dashboard"
        );
        ModuleId::Dashboard
    }
}

/// What a back gesture does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    /// Go to the home screen instead of leaving the app.
    Home,
    LeaveApp,
}

#[must_use]
pub fn on_back(current: ModuleId) -> BackAction {
    if current.is_home() {
        BackAction::LeaveApp
    } else {
        BackAction::Home
    }
}
