//! One module's chat screen: transcript, machine turns and button handling.

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use funnel_core::countdown::Countdown;
use funnel_core::machine::{ModuleData, StepMachine, StepOutcome, UnlockDirective};
use funnel_core::model::{
    ActionKind, ChatEntry, Directive, EntryId, ModuleId, Sender, StepInput, Transcript,
};
use storage::progress_store::ProgressStore;

use crate::error::ChatError;
use crate::progress::SharedController;

/// Something the screen has to do outside the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenUrl(Url),
    /// Play the unlock animation, then offer `next`.
    ShowUnlockOverlay { level: u32, next: ModuleId },
    /// Swap the chat for the final-tier lock screen.
    ShowFinalLock(Countdown),
}

pub struct ChatSession {
    module: ModuleId,
    machine: Arc<dyn StepMachine>,
    controller: SharedController,
    store: ProgressStore,
    transcript: Transcript,
    step: u32,
    data: ModuleData,
    pending_unlock: Option<UnlockDirective>,
    suggestions: Vec<String>,
    finished: bool,
}

impl ChatSession {
    /// Enter the machine's module and rebuild its screen.
    ///
    /// A cached transcript is shown as-is up to its typing checkpoint. If that
    /// cut off the current step, its content is emitted again. Without a
    /// cached transcript, a module at step 0 starts fresh and any other step
    /// is replayed instantly from the script.
    ///
    /// # Errors
    ///
    /// Returns `ChatError` if progress or the transcript cache cannot be
    /// read or written.
    pub async fn open(
        machine: Arc<dyn StepMachine>,
        controller: SharedController,
    ) -> Result<Self, ChatError> {
        let module = machine.module();
        let (step, store) = {
            let mut guard = controller.lock().await;
            let step = guard.navigate_to(module).await?;
            (step, guard.store().clone())
        };

        let cached = store.load_transcript(module).await?.unwrap_or_default();
        let checkpoint = store.load_typing_checkpoint(module).await?;
        let transcript = Transcript::restore(cached, checkpoint);

        let mut session = Self {
            module,
            machine,
            controller,
            store,
            transcript,
            step,
            data: ModuleData::default(),
            pending_unlock: None,
            suggestions: Vec::new(),
            finished: false,
        };

        if !session.transcript.is_empty() {
            debug!(%module, step, entries = session.transcript.len(), "transcript restored");
            if session.machine.is_stateful() && step > 0 {
                session.run(Directive::RestoreSession.into()).await?;
            } else if session.transcript.awaiting_click().is_none() {
                session.resume().await?;
            }
        } else if step == 0 {
            session.run(StepInput::Init).await?;
        } else {
            session.replay().await?;
        }
        Ok(session)
    }

    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    #[must_use]
    pub fn step(&self) -> u32 {
        self.step
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn pending_unlock(&self) -> Option<UnlockDirective> {
        self.pending_unlock
    }

    /// Whether the free-text box is shown.
    #[must_use]
    pub fn input_visible(&self) -> bool {
        match self.module {
            ModuleId::Copilot => self.step >= 2 && !self.transcript.ends_with_restart(),
            ModuleId::Calculator => self.step >= 1 && !self.finished,
            _ => false,
        }
    }

    /// Submit what the user typed or a suggestion they picked.
    ///
    /// While the input box is shown everything typed is an answer; otherwise
    /// control tokens are decoded. Visible text is echoed into the transcript
    /// before the machine answers. Returns the ids of the bot entries appended.
    ///
    /// # Errors
    ///
    /// Returns `ChatError` if progress or the transcript cannot be saved.
    pub async fn send(&mut self, raw: &str) -> Result<Vec<EntryId>, ChatError> {
        let input = if self.input_visible() {
            let text = raw.trim();
            if text.is_empty() {
                return Ok(Vec::new());
            }
            StepInput::Text(text.to_owned())
        } else {
            StepInput::decode(raw)
        };
        self.submit(input, raw).await
    }

    /// The UI finished animating entry `id`.
    ///
    /// Returns the level that was unlocked, if revealing the last entry
    /// completed an unlock.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::UnknownEntry` for an id not in the transcript, or a
    /// storage error.
    pub async fn message_revealed(&mut self, id: EntryId) -> Result<Option<u32>, ChatError> {
        let index = self
            .transcript
            .mark_finished(id)
            .ok_or(ChatError::UnknownEntry(id))?;
        if let Some(checkpoint) = self.transcript.typing_checkpoint() {
            self.store
                .save_typing_checkpoint(self.module, checkpoint)
                .await?;
        }
        self.save_transcript().await?;

        if index + 1 != self.transcript.len() {
            return Ok(None);
        }
        let from_action = self
            .transcript
            .get(id)
            .and_then(|entry| entry.action.as_ref())
            .and_then(|action| action.unlock_level())
            .map(|level| UnlockDirective { level });
        let Some(directive) = self.pending_unlock.take().or(from_action) else {
            return Ok(None);
        };
        let unlocked = self
            .controller
            .lock()
            .await
            .apply_unlock(self.module, directive)
            .await?;
        Ok(unlocked.then_some(directive.level))
    }

    /// Press the button on entry `id`. Each button works once.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::UnknownEntry` for an id not in the transcript, or a
    /// storage error.
    pub async fn click(&mut self, id: EntryId) -> Result<Option<Effect>, ChatError> {
        let action = self
            .transcript
            .get(id)
            .ok_or(ChatError::UnknownEntry(id))?
            .action
            .clone();
        let Some(action) = action else {
            return Ok(None);
        };
        if !self.transcript.mark_clicked(id) {
            debug!(module = %self.module, %id, "button already used");
            return Ok(None);
        }
        self.save_transcript().await?;

        match action.kind().clone() {
            ActionKind::Send(directive) => {
                self.run(directive.into()).await?;
                Ok(None)
            }
            ActionKind::Reply => {
                self.submit(StepInput::decode(action.label()), action.label())
                    .await?;
                Ok(None)
            }
            ActionKind::OpenUrl(url) => Ok(Some(Effect::OpenUrl(url))),
            ActionKind::Unlock { level, target } => {
                self.unlock_now(UnlockDirective { level }).await?;
                Ok(Some(Effect::ShowUnlockOverlay {
                    level,
                    next: target,
                }))
            }
            ActionKind::Restart => {
                self.restart().await?;
                Ok(None)
            }
            ActionKind::LockFinalTier => {
                let countdown = self.controller.lock().await.lock_final_tier().await?;
                info!(module = %self.module, "final tier locked");
                Ok(Some(Effect::ShowFinalLock(countdown)))
            }
        }
    }

    /// Wipe this module's transcript and progress and start the simulation over.
    ///
    /// # Errors
    ///
    /// Returns `ChatError` if progress or the transcript cannot be saved.
    pub async fn restart(&mut self) -> Result<Vec<EntryId>, ChatError> {
        self.controller
            .lock()
            .await
            .restart_module(self.module)
            .await?;
        self.transcript.clear();
        self.data = ModuleData::default();
        self.pending_unlock = None;
        self.finished = false;
        self.step = 0;
        self.run(Directive::Reset.into()).await
    }

    /// Rebuild the screen from the script without animation.
    async fn replay(&mut self) -> Result<(), ChatError> {
        let outcome = self
            .machine
            .process(self.step, &Directive::RestoreSession.into(), &self.data);
        let unlock = outcome.unlock;
        let (_, last) = self.apply(outcome, false).await?;
        debug!(module = %self.module, step = self.step, entries = self.transcript.len(), "session replayed");

        if let Some(last) = last {
            self.transcript.mark_finished(last);
            if let Some(checkpoint) = self.transcript.typing_checkpoint() {
                self.store
                    .save_typing_checkpoint(self.module, checkpoint)
                    .await?;
            }
        }
        if let Some(directive) = unlock {
            self.unlock_now(directive).await?;
        }
        self.save_transcript().await?;
        Ok(())
    }

    /// Emit the current step again after a reload dropped its unrevealed tail.
    ///
    /// Messages still on screen are skipped. If the whole step is already
    /// shown, its button never led anywhere and is re-armed.
    async fn resume(&mut self) -> Result<(), ChatError> {
        let mut outcome = self
            .machine
            .process(self.step, &Directive::Resume.into(), &self.data);
        let tail = self.transcript.len().saturating_sub(outcome.messages.len());
        let shown: Vec<String> = self.transcript.entries()[tail..]
            .iter()
            .filter(|entry| entry.sender == Sender::Bot)
            .map(|entry| entry.text.clone())
            .collect();
        let emitted = outcome.messages.len();
        outcome.messages.retain(|message| !shown.contains(&message.text));
        let (appended, _) = self.apply(outcome, true).await?;
        debug!(module = %self.module, step = self.step, appended = appended.len(), "cut-off step resumed");

        if emitted > 0 && appended.is_empty() && !self.is_terminal() {
            let last_bot = self
                .transcript
                .entries()
                .iter()
                .rev()
                .find(|entry| entry.sender == Sender::Bot && entry.action.is_some())
                .map(|entry| entry.id);
            if let Some(id) = last_bot
                && self.transcript.rearm(id)
            {
                debug!(module = %self.module, %id, "button re-armed");
                self.save_transcript().await?;
            }
        }
        Ok(())
    }

    /// No further step follows the current one.
    fn is_terminal(&self) -> bool {
        self.machine
            .process(self.step, &Directive::Advance.into(), &self.data)
            .finished
    }

    async fn unlock_now(&mut self, directive: UnlockDirective) -> Result<bool, ChatError> {
        self.pending_unlock = None;
        let unlocked = self
            .controller
            .lock()
            .await
            .apply_unlock(self.module, directive)
            .await?;
        Ok(unlocked)
    }

    async fn submit(&mut self, input: StepInput, raw: &str) -> Result<Vec<EntryId>, ChatError> {
        if matches!(
            input,
            StepInput::Text(_) | StepInput::Directive(Directive::Advance)
        ) {
            self.transcript.push(ChatEntry::user(raw.trim()));
        }
        self.run(input).await
    }

    async fn run(&mut self, input: StepInput) -> Result<Vec<EntryId>, ChatError> {
        if let StepInput::Directive(Directive::RequestUnlock { level }) = input {
            self.unlock_now(UnlockDirective { level }).await?;
            return Ok(Vec::new());
        }
        let outcome = self.machine.process(self.step, &input, &self.data);
        let (appended, _) = self.apply(outcome, true).await?;
        Ok(appended)
    }

    /// Append the outcome's messages in order and commit its step.
    async fn apply(
        &mut self,
        outcome: StepOutcome,
        animate: bool,
    ) -> Result<(Vec<EntryId>, Option<EntryId>), ChatError> {
        let StepOutcome {
            messages,
            next_step,
            data,
            unlock,
            suggestions,
            finished,
        } = outcome;
        let from = self.step;
        debug!(module = %self.module, from, to = next_step, messages = messages.len(), "step processed");

        let mut appended = Vec::with_capacity(messages.len());
        let mut last = None;
        for message in messages {
            if animate && !message.delay.is_zero() {
                tokio::time::sleep(message.delay).await;
            }
            let mut entry = ChatEntry::bot(message.text, message.action);
            entry.typing_finished = !animate;
            let id = entry.id;
            if self.transcript.push(entry) {
                appended.push(id);
                last = Some(id);
            } else {
                debug!(module = %self.module, "duplicate message dropped");
            }
        }

        self.data = data;
        self.suggestions = suggestions;
        self.finished = finished;
        self.save_transcript().await?;
        if let Some(directive) = unlock {
            if appended.is_empty() {
                self.unlock_now(directive).await?;
            } else {
                self.pending_unlock = Some(directive);
            }
        }

        if next_step != from {
            self.step = next_step;
            let mut controller = self.controller.lock().await;
            controller.mark_step_completed(self.module, from).await?;
            controller.advance_step(self.module, next_step).await?;
        }
        Ok((appended, last))
    }

    async fn save_transcript(&self) -> Result<(), ChatError> {
        self.store
            .save_transcript(self.module, self.transcript.entries())
            .await?;
        Ok(())
    }
}
