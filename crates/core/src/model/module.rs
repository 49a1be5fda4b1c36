use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown module identifier: {raw}")]
pub struct ModuleParseError {
    pub raw: String,
}

/// Screens of the funnel. `Dashboard` is home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleId {
    Dashboard,
    Module1,
    Module2,
    Module3,
    Copilot,
    Community,
    Calculator,
}

impl ModuleId {
    pub const ALL: [ModuleId; 7] = [
        ModuleId::Dashboard,
        ModuleId::Module1,
        ModuleId::Module2,
        ModuleId::Module3,
        ModuleId::Copilot,
        ModuleId::Community,
        ModuleId::Calculator,
    ];

    /// Modules that own a chat transcript (every screen except home).
    pub const CHAT: [ModuleId; 6] = [
        ModuleId::Module1,
        ModuleId::Module2,
        ModuleId::Module3,
        ModuleId::Copilot,
        ModuleId::Community,
        ModuleId::Calculator,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleId::Dashboard => "dashboard",
            ModuleId::Module1 => "module1",
            ModuleId::Module2 => "module2",
            ModuleId::Module3 => "module3",
            ModuleId::Copilot => "copilot",
            ModuleId::Community => "community",
            ModuleId::Calculator => "calculator",
        }
    }

    #[must_use]
    pub fn is_home(self) -> bool {
        matches!(self, ModuleId::Dashboard)
    }

    /// Screen title shown in the header bar.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            ModuleId::Dashboard => "SISTEMA TAXI PRO 5.0",
            ModuleId::Module1 => "PILLAR 1 - INSTALLATION",
            ModuleId::Module2 => "PILLAR 2 - PROFESSIONAL WEBSITE",
            ModuleId::Module3 => "PILLAR 3 - GOOGLE ADS",
            ModuleId::Copilot => "COPILOT 6.0 - AUTOMATED SERVICE",
            ModuleId::Community => "VIP COMMUNITY",
            ModuleId::Calculator => "PROFIT CALCULATOR",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleId {
    type Err = ModuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ModuleId::ALL
            .into_iter()
            .find(|module| module.as_str() == normalized)
            .ok_or_else(|| ModuleParseError { raw: s.to_owned() })
    }
}
