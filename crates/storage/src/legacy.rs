//! Compatibility layer for the per-level flags older clients read.
//!
//! The unlock level is the single source of truth; these flags are derived
//! from it on write and folded back into it on read, nowhere else.

/// Legacy integer copy of the unlock level.
pub const UNLOCKED_LEVEL_KEY: &str = "unlocked_level";
pub const MODULE2_UNLOCKED_KEY: &str = "module2_unlocked";
pub const MODULE3_UNLOCKED_KEY: &str = "module3_unlocked";
pub const VIP_UNLOCKED_KEY: &str = "vip_unlocked";
/// Anchor of the module-2 gate countdown.
pub const MODULE1_COMPLETED_AT_KEY: &str = "module1_completed_at";
pub const MODULE3_LOCKED_KEY: &str = "module3_machine_locked";
pub const MODULE3_LOCKED_AT_KEY: &str = "module3_locked_at";

/// Every key the legacy layer owns.
pub const LEGACY_KEYS: [&str; 7] = [
    UNLOCKED_LEVEL_KEY,
    MODULE2_UNLOCKED_KEY,
    MODULE3_UNLOCKED_KEY,
    VIP_UNLOCKED_KEY,
    MODULE1_COMPLETED_AT_KEY,
    MODULE3_LOCKED_KEY,
    MODULE3_LOCKED_AT_KEY,
];

/// Boolean flag keys paired with the level each one stands for.
const LEVEL_FLAGS: [(&str, u32); 3] = [
    (MODULE2_UNLOCKED_KEY, 2),
    (MODULE3_UNLOCKED_KEY, 3),
    (VIP_UNLOCKED_KEY, 4),
];

/// Snapshot of the level-related legacy keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyFlags {
    pub unlocked_level: Option<u32>,
    pub module2_unlocked: bool,
    pub module3_unlocked: bool,
    pub vip_unlocked: bool,
}

impl LegacyFlags {
    /// Flags implied by an authoritative level.
    #[must_use]
    pub fn for_level(level: u32) -> Self {
        Self {
            unlocked_level: Some(level),
            module2_unlocked: level >= 2,
            module3_unlocked: level >= 3,
            vip_unlocked: level >= 4,
        }
    }

    /// Highest level any of the flags vouches for, at least 1.
    #[must_use]
    pub fn implied_level(&self) -> u32 {
        let from_flags = LEVEL_FLAGS
            .iter()
            .filter(|(key, _)| self.flag(key))
            .map(|(_, level)| *level)
            .max()
            .unwrap_or(1);
        self.unlocked_level.unwrap_or(1).max(from_flags)
    }

    fn flag(&self, key: &str) -> bool {
        match key {
            MODULE2_UNLOCKED_KEY => self.module2_unlocked,
            MODULE3_UNLOCKED_KEY => self.module3_unlocked,
            VIP_UNLOCKED_KEY => self.vip_unlocked,
            _ => false,
        }
    }

    /// Key/value pairs to write. Flags below the level are left unset.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::with_capacity(4);
        if let Some(level) = self.unlocked_level {
            entries.push((UNLOCKED_LEVEL_KEY, level.to_string()));
        }
        for (key, _) in LEVEL_FLAGS {
            if self.flag(key) {
                entries.push((key, "true".to_owned()));
            }
        }
        entries
    }

    /// Rebuild from raw values; unparseable values count as absent.
    #[must_use]
    pub fn from_raw(
        unlocked_level: Option<&str>,
        module2: Option<&str>,
        module3: Option<&str>,
        vip: Option<&str>,
    ) -> Self {
        let truthy = |raw: Option<&str>| raw.is_some_and(|value| value.trim() == "true");
        Self {
            unlocked_level: unlocked_level.and_then(|raw| raw.trim().parse().ok()),
            module2_unlocked: truthy(module2),
            module3_unlocked: truthy(module3),
            vip_unlocked: truthy(vip),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_maps_to_flags() {
        let flags = LegacyFlags::for_level(3);
        assert!(flags.module2_unlocked);
        assert!(flags.module3_unlocked);
        assert!(!flags.vip_unlocked);
        let keys: Vec<&str> = flags.entries().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec![UNLOCKED_LEVEL_KEY, MODULE2_UNLOCKED_KEY, MODULE3_UNLOCKED_KEY]
        );
    }

    #[test]
    fn implied_level_takes_the_highest_signal() {
        let flags = LegacyFlags::from_raw(Some("2"), None, None, Some("true"));
        assert_eq!(flags.implied_level(), 4);
        let garbage = LegacyFlags::from_raw(Some("abc"), Some("yes"), None, None);
        assert_eq!(garbage.implied_level(), 1);
        assert_eq!(LegacyFlags::default().implied_level(), 1);
    }
}
