use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::ModuleId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ActionError {
    #[error("action label cannot be empty")]
    EmptyLabel,
    #[error("invalid action URL: {raw}")]
    InvalidUrl { raw: String },
}

//
// ─── DIRECTIVES ────────────────────────────────────────────────────────────────
//

/// Control commands exchanged between the UI and the step-machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    /// Generic "continue" to the next step.
    Advance,
    /// Clear the module's accumulated data and start over.
    Reset,
    /// Replay every message up to the current step.
    RestoreSession,
    /// Emit the current step's content again after a reload cut it off.
    Resume,
    /// Raise the unlock level without waiting for a message reveal.
    RequestUnlock { level: u32 },
    /// Show one of the scripted intro screens that precede step 0.
    Intro { screen: u32 },
    /// Leave the intro and enter the live simulation.
    StartSimulation,
}

/// Input handed to a step-machine, decoded once at the UI boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    /// First display of a module with no history.
    Init,
    Directive(Directive),
    Text(String),
}

impl StepInput {
    /// Decode a raw string from the UI.
    ///
    /// Control tokens become directives; anything else is free text.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("init") {
            return StepInput::Init;
        }
        match trimmed.to_uppercase().as_str() {
            "RESTORE_SESSION" => StepInput::Directive(Directive::RestoreSession),
            "RESET" => StepInput::Directive(Directive::Reset),
            "START_SIMULATION" => StepInput::Directive(Directive::StartSimulation),
            "CONTINUE" | "CONTINUAR" => StepInput::Directive(Directive::Advance),
            _ => StepInput::Text(trimmed.to_owned()),
        }
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            StepInput::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Trimmed, upper-cased text used for token comparison.
    #[must_use]
    pub fn normalized(&self) -> Option<String> {
        self.text().map(normalize_token)
    }

    #[must_use]
    pub fn is_directive(&self, directive: &Directive) -> bool {
        matches!(self, StepInput::Directive(d) if d == directive)
    }
}

impl From<Directive> for StepInput {
    fn from(directive: Directive) -> Self {
        StepInput::Directive(directive)
    }
}

/// Trim and case-fold a token for comparison.
#[must_use]
pub fn normalize_token(raw: &str) -> String {
    raw.trim().to_uppercase()
}

//
// ─── MESSAGE ACTIONS ───────────────────────────────────────────────────────────
//

/// What pressing a message's button does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Send a hidden directive to the module's machine.
    Send(Directive),
    /// Send the button label as if the user typed it.
    Reply,
    OpenUrl(Url),
    /// Unlock `level` and move on to `target`.
    Unlock { level: u32, target: ModuleId },
    /// Wipe the module transcript and restart its simulation.
    Restart,
    /// Seal the last pillar behind the long countdown.
    LockFinalTier,
}

/// Button attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAction {
    label: String,
    kind: ActionKind,
}

impl MessageAction {
    /// # Errors
    ///
    /// Returns `ActionError::EmptyLabel` if the label is blank.
    pub fn new(label: impl Into<String>, kind: ActionKind) -> Result<Self, ActionError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(ActionError::EmptyLabel);
        }
        Ok(Self { label, kind })
    }

    /// Button that sends its label back as the user's reply.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::EmptyLabel` if the label is blank.
    pub fn reply(label: impl Into<String>) -> Result<Self, ActionError> {
        Self::new(label, ActionKind::Reply)
    }

    /// # Errors
    ///
    /// Returns `ActionError::InvalidUrl` if `raw` does not parse.
    pub fn open_url(label: impl Into<String>, raw: &str) -> Result<Self, ActionError> {
        let url = Url::parse(raw).map_err(|_| ActionError::InvalidUrl {
            raw: raw.to_owned(),
        })?;
        Self::new(label, ActionKind::OpenUrl(url))
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Normalized label, the token a button-driven step expects.
    #[must_use]
    pub fn token(&self) -> String {
        normalize_token(&self.label)
    }

    #[must_use]
    pub fn unlock_level(&self) -> Option<u32> {
        match self.kind {
            ActionKind::Unlock { level, .. } => Some(level),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_restart(&self) -> bool {
        matches!(self.kind, ActionKind::Restart)
    }
}
