//! Step-machines: pure interpreters from `(step, input, data)` to the next step
//! and the messages to display.

mod calculator;
mod intake;
mod scripted;

use std::time::Duration;

use thiserror::Error;

use crate::model::{MessageAction, ModuleId, StepInput};

pub use calculator::{CalculatorData, CalculatorMachine};
pub use intake::{IntakeData, IntakeMachine, IntakePath, IntakeStage};
pub use scripted::{IntroScreen, Script, ScriptedMachine, StepContent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScriptError {
    #[error("script for {module} has no content for step {step}")]
    MissingStep { module: ModuleId, step: u32 },
    #[error("script for {module} has an empty message list at step {step}")]
    EmptyStep { module: ModuleId, step: u32 },
}

/// Unlock requested by the content of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockDirective {
    pub level: u32,
}

/// One display unit, appended after waiting `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMessage {
    pub text: String,
    pub action: Option<MessageAction>,
    pub delay: Duration,
}

impl OutputMessage {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: None,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_action(text: impl Into<String>, action: MessageAction) -> Self {
        Self {
            text: text.into(),
            action: Some(action),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Data a module accumulates across turns.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ModuleData {
    #[default]
    Empty,
    Intake(IntakeData),
    Calculator(CalculatorData),
}

/// What a machine decided for one input.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub messages: Vec<OutputMessage>,
    pub next_step: u32,
    pub data: ModuleData,
    pub unlock: Option<UnlockDirective>,
    pub suggestions: Vec<String>,
    pub finished: bool,
}

impl StepOutcome {
    /// No output and no movement.
    #[must_use]
    pub fn unchanged(step: u32, data: &ModuleData) -> Self {
        Self {
            messages: Vec::new(),
            next_step: step,
            data: data.clone(),
            unlock: None,
            suggestions: Vec::new(),
            finished: false,
        }
    }

    #[must_use]
    pub fn moved(step: u32, messages: Vec<OutputMessage>, data: ModuleData) -> Self {
        Self {
            messages,
            next_step: step,
            data,
            unlock: None,
            suggestions: Vec::new(),
            finished: false,
        }
    }

    #[must_use]
    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn is_noop(&self, step: u32) -> bool {
        self.messages.is_empty() && self.next_step == step
    }
}

/// Interpreter for one module's conversation.
pub trait StepMachine: Send + Sync {
    fn module(&self) -> ModuleId;

    fn process(&self, step: u32, input: &StepInput, data: &ModuleData) -> StepOutcome;

    /// `true` when the machine keeps answers in `ModuleData`, which is not
    /// persisted. A session restored from cache must re-prompt such machines.
    fn is_stateful(&self) -> bool {
        false
    }
}
