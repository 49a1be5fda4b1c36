use std::collections::BTreeMap;
use std::time::Duration;

use crate::machine::{
    ModuleData, OutputMessage, ScriptError, StepMachine, StepOutcome, UnlockDirective,
};
use crate::model::{normalize_token, Directive, MessageAction, ModuleId, StepInput};

/// Tokens that advance any button-driven step.
const CONTINUE_TOKENS: [&str; 2] = ["CONTINUE", "CONTINUAR"];

/// Pause before each message after the first in a step.
const MESSAGE_GAP: Duration = Duration::from_millis(700);

/// Content registered for one numbered step.
///
/// The action rides on the last message. `accepts` lists extra tokens that
/// advance past this step besides the action label and the continue tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContent {
    messages: Vec<String>,
    action: MessageAction,
    accepts: Vec<String>,
    suggestions: Vec<String>,
    unlock: Option<UnlockDirective>,
}

impl StepContent {
    #[must_use]
    pub fn new<I, S>(messages: I, action: MessageAction) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
            action,
            accepts: Vec::new(),
            suggestions: Vec::new(),
            unlock: None,
        }
    }

    #[must_use]
    pub fn single(text: impl Into<String>, action: MessageAction) -> Self {
        Self::new([text.into()], action)
    }

    #[must_use]
    pub fn accepting(mut self, token: &str) -> Self {
        self.accepts.push(normalize_token(token));
        self
    }

    /// Quick replies offered while this step is current.
    #[must_use]
    pub fn suggesting<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn unlocking(mut self, level: u32) -> Self {
        self.unlock = Some(UnlockDirective { level });
        self
    }

    #[must_use]
    pub fn action(&self) -> &MessageAction {
        &self.action
    }

    #[must_use]
    pub fn unlock(&self) -> Option<UnlockDirective> {
        self.unlock
    }

    fn accepts_token(&self, token: &str) -> bool {
        token == self.action.token()
            || CONTINUE_TOKENS.contains(&token)
            || self.accepts.iter().any(|accepted| accepted == token)
    }

    fn render(&self) -> Vec<OutputMessage> {
        let last = self.messages.len().saturating_sub(1);
        self.messages
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let message = if index == last {
                    OutputMessage::with_action(text.clone(), self.action.clone())
                } else {
                    OutputMessage::text(text.clone())
                };
                if index == 0 {
                    message
                } else {
                    message.delayed(MESSAGE_GAP)
                }
            })
            .collect()
    }
}

/// Scripted screen shown at step 0 before the numbered content begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntroScreen {
    pub text: String,
    pub action: MessageAction,
    pub delay: Duration,
}

impl IntroScreen {
    #[must_use]
    pub fn new(text: impl Into<String>, action: MessageAction) -> Self {
        Self {
            text: text.into(),
            action,
            delay: Duration::from_millis(1000),
        }
    }
}

/// Content table for a button-driven module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub module: ModuleId,
    pub intro: Vec<IntroScreen>,
    /// Step whose content is emitted when the last intro screen is passed.
    pub begin_at: u32,
    pub steps: BTreeMap<u32, StepContent>,
}

impl Script {
    #[must_use]
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            intro: Vec::new(),
            begin_at: 0,
            steps: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn intro(mut self, screen: IntroScreen) -> Self {
        self.intro.push(screen);
        self
    }

    #[must_use]
    pub fn begin_at(mut self, step: u32) -> Self {
        self.begin_at = step;
        self
    }

    /// Register content for the next free step number.
    #[must_use]
    pub fn step(mut self, content: StepContent) -> Self {
        let next = self
            .steps
            .keys()
            .next_back()
            .map_or(0, |last| last.saturating_add(1));
        self.steps.insert(next, content);
        self
    }

    #[must_use]
    pub fn last_step(&self) -> Option<u32> {
        self.steps.keys().next_back().copied()
    }
}

//
// ─── INTERPRETER ───────────────────────────────────────────────────────────────
//

/// Interpreter for `Script` tables.
#[derive(Debug, Clone)]
pub struct ScriptedMachine {
    script: Script,
}

impl ScriptedMachine {
    /// # Errors
    ///
    /// Returns `ScriptError` if step 0 or `begin_at` has no content, or a step
    /// has no messages.
    pub fn new(script: Script) -> Result<Self, ScriptError> {
        let module = script.module;
        for required in [0, script.begin_at] {
            if !script.steps.contains_key(&required) {
                return Err(ScriptError::MissingStep {
                    module,
                    step: required,
                });
            }
        }
        if let Some((step, _)) = script
            .steps
            .iter()
            .find(|(_, content)| content.messages.is_empty())
        {
            return Err(ScriptError::EmptyStep {
                module,
                step: *step,
            });
        }
        Ok(Self { script })
    }

    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }

    fn content(&self, step: u32) -> Option<&StepContent> {
        self.script.steps.get(&step)
    }

    fn emit_step(&self, step: u32, data: &ModuleData) -> StepOutcome {
        match self.content(step) {
            Some(content) => {
                let mut outcome = StepOutcome::moved(step, content.render(), data.clone())
                    .with_suggestions(content.suggestions.iter().cloned());
                outcome.unlock = content.unlock;
                outcome
            }
            None => StepOutcome::unchanged(step, data),
        }
    }

    fn intro_screen(&self, screen: u32, data: &ModuleData) -> StepOutcome {
        let index = usize::try_from(screen).unwrap_or(usize::MAX);
        match self.script.intro.get(index) {
            Some(intro) => StepOutcome::moved(
                0,
                vec![
                    OutputMessage::with_action(intro.text.clone(), intro.action.clone())
                        .delayed(intro.delay),
                ],
                data.clone(),
            ),
            None if index == self.script.intro.len() => self.emit_step(self.script.begin_at, data),
            None => StepOutcome::unchanged(0, data),
        }
    }

    fn restore(&self, step: u32, data: &ModuleData) -> StepOutcome {
        let messages = (0..=step)
            .filter_map(|index| self.content(index))
            .flat_map(StepContent::render)
            .collect();
        let mut outcome = StepOutcome::moved(step, messages, data.clone());
        if let Some(content) = self.content(step) {
            outcome.unlock = content.unlock;
            outcome.suggestions.clone_from(&content.suggestions);
        }
        outcome
    }

    fn is_advance(&self, step: u32, input: &StepInput) -> bool {
        if input.is_directive(&Directive::Advance) {
            return true;
        }
        let Some(token) = input.normalized() else {
            return false;
        };
        match self.content(step) {
            Some(content) => content.accepts_token(&token),
            None => CONTINUE_TOKENS.contains(&token.as_str()),
        }
    }
}

impl StepMachine for ScriptedMachine {
    fn module(&self) -> ModuleId {
        self.script.module
    }

    fn process(&self, step: u32, input: &StepInput, data: &ModuleData) -> StepOutcome {
        if self.is_advance(step, input) {
            let next = step.saturating_add(1);
            if self.content(next).is_none() {
                let mut outcome = StepOutcome::unchanged(step, data);
                outcome.finished = true;
                return outcome;
            }
            return self.emit_step(next, data);
        }

        match input {
            StepInput::Directive(Directive::RestoreSession) => self.restore(step, data),
            StepInput::Directive(Directive::Resume) if step == 0 => {
                self.emit_step(self.script.begin_at, data)
            }
            StepInput::Directive(Directive::Resume) => self.emit_step(step, data),
            StepInput::Init if step == 0 => self.intro_screen(0, data),
            StepInput::Directive(Directive::Intro { screen }) if step == 0 => {
                self.intro_screen(*screen, data)
            }
            _ => StepOutcome::unchanged(step, data),
        }
    }
}
