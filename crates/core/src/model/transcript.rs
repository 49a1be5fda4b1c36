use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::model::MessageAction;

/// How many trailing entries are checked for an identical message before appending.
const DUPLICATE_WINDOW: usize = 3;

/// Identifier of one chat entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Bot,
    User,
}

/// One message in a module's chat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: EntryId,
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<MessageAction>,
    #[serde(default)]
    pub typing_finished: bool,
    #[serde(default)]
    pub action_clicked: bool,
}

impl ChatEntry {
    #[must_use]
    pub fn bot(text: impl Into<String>, action: Option<MessageAction>) -> Self {
        Self {
            id: EntryId::new(),
            sender: Sender::Bot,
            text: text.into(),
            action,
            typing_finished: false,
            action_clicked: false,
        }
    }

    /// User replies are never animated.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(),
            sender: Sender::User,
            text: text.into(),
            action: None,
            typing_finished: true,
            action_clicked: false,
        }
    }
}

//
// ─── TRANSCRIPT ────────────────────────────────────────────────────────────────
//

/// Ordered chat log plus the index of the last entry whose reveal finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<ChatEntry>,
    typing_checkpoint: Option<usize>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from its cached entries.
    ///
    /// Entries sharing an id collapse into one (first position, last content).
    /// Only entries at or before `checkpoint` survive, and they are marked as
    /// already revealed so the UI renders them instantly.
    #[must_use]
    pub fn restore(cached: Vec<ChatEntry>, checkpoint: Option<usize>) -> Self {
        let mut unique: Vec<ChatEntry> = Vec::with_capacity(cached.len());
        for entry in cached {
            match unique.iter_mut().find(|existing| existing.id == entry.id) {
                Some(existing) => *existing = entry,
                None => unique.push(entry),
            }
        }

        let Some(checkpoint) = checkpoint else {
            return Self::new();
        };

        let entries: Vec<ChatEntry> = unique
            .into_iter()
            .take(checkpoint.saturating_add(1))
            .map(|mut entry| {
                entry.typing_finished = true;
                entry
            })
            .collect();
        let typing_checkpoint = entries.len().checked_sub(1);
        Self {
            entries,
            typing_checkpoint,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.last()
    }

    #[must_use]
    pub fn typing_checkpoint(&self) -> Option<usize> {
        self.typing_checkpoint
    }

    #[must_use]
    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<&ChatEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Append an entry. A bot message identical to one of the last few
    /// entries is dropped; user replies are always kept.
    ///
    /// Returns `false` when the entry was dropped as a duplicate.
    pub fn push(&mut self, entry: ChatEntry) -> bool {
        if entry.sender == Sender::User {
            self.entries.push(entry);
            return true;
        }
        let start = self.entries.len().saturating_sub(DUPLICATE_WINDOW);
        let duplicate = self.entries[start..]
            .iter()
            .any(|existing| existing.sender == entry.sender && existing.text == entry.text);
        if duplicate {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Mark an entry's reveal as finished and move the typing checkpoint up to it.
    ///
    /// Returns the entry's index, or `None` for an unknown id.
    pub fn mark_finished(&mut self, id: EntryId) -> Option<usize> {
        let index = self.position(id)?;
        self.entries[index].typing_finished = true;
        self.typing_checkpoint = Some(self.typing_checkpoint.map_or(index, |cp| cp.max(index)));
        Some(index)
    }

    /// Flag the entry's button as used. Returns `false` if it was already clicked.
    pub fn mark_clicked(&mut self, id: EntryId) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) if !entry.action_clicked => {
                entry.action_clicked = true;
                true
            }
            _ => false,
        }
    }

    /// Make the entry's button usable again. Returns `false` if it was not clicked.
    pub fn rearm(&mut self, id: EntryId) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) if entry.action_clicked => {
                entry.action_clicked = false;
                true
            }
            _ => false,
        }
    }

    /// Last bot entry whose button has not been pressed yet.
    #[must_use]
    pub fn awaiting_click(&self) -> Option<&ChatEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.sender == Sender::Bot)
            .filter(|entry| entry.action.is_some() && !entry.action_clicked)
    }

    /// `true` when the last entry offers a restart, i.e. the simulation ended.
    #[must_use]
    pub fn ends_with_restart(&self) -> bool {
        self.last()
            .and_then(|entry| entry.action.as_ref())
            .is_some_and(MessageAction::is_restart)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.typing_checkpoint = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionKind;

    fn bot(text: &str) -> ChatEntry {
        ChatEntry::bot(text, None)
    }

    #[test]
    fn restore_keeps_entries_up_to_checkpoint() {
        let cached = vec![bot("one"), bot("two"), bot("three")];
        let transcript = Transcript::restore(cached, Some(1));
        assert_eq!(transcript.len(), 2);
        assert!(transcript.entries().iter().all(|e| e.typing_finished));
        assert_eq!(transcript.typing_checkpoint(), Some(1));
    }

    #[test]
    fn restore_without_checkpoint_is_empty() {
        let transcript = Transcript::restore(vec![bot("one")], None);
        assert!(transcript.is_empty());
    }

    #[test]
    fn restore_collapses_duplicate_ids() {
        let first = bot("draft");
        let mut updated = first.clone();
        updated.text = "final".to_owned();
        let transcript = Transcript::restore(vec![first, bot("other"), updated], Some(5));
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[0].text, "final");
    }

    #[test]
    fn push_drops_recent_duplicates() {
        let mut transcript = Transcript::new();
        assert!(transcript.push(bot("hello")));
        assert!(!transcript.push(bot("hello")));
        assert!(transcript.push(ChatEntry::user("hello")));
        assert!(transcript.push(ChatEntry::user("hello")));
        for text in ["a", "b", "c"] {
            transcript.push(bot(text));
        }
        assert!(transcript.push(bot("hello")));
    }

    #[test]
    fn mark_finished_moves_checkpoint_forward_only() {
        let mut transcript = Transcript::new();
        let first = bot("first");
        let second = bot("second");
        let (first_id, second_id) = (first.id, second.id);
        transcript.push(first);
        transcript.push(second);
        assert_eq!(transcript.mark_finished(second_id), Some(1));
        assert_eq!(transcript.mark_finished(first_id), Some(0));
        assert_eq!(transcript.typing_checkpoint(), Some(1));
        assert_eq!(transcript.mark_finished(EntryId::new()), None);
    }

    #[test]
    fn click_is_single_shot_and_restart_detected() {
        let mut transcript = Transcript::new();
        let action = MessageAction::new("RESTART SIMULATION", ActionKind::Restart).unwrap();
        let entry = ChatEntry::bot("summary", Some(action));
        let id = entry.id;
        transcript.push(entry);
        assert!(transcript.mark_clicked(id));
        assert!(!transcript.mark_clicked(id));
        assert!(transcript.ends_with_restart());
    }

    #[test]
    fn rearmed_button_is_awaiting_again() {
        let mut transcript = Transcript::new();
        let action = MessageAction::reply("CONTINUE").unwrap();
        let entry = ChatEntry::bot("step", Some(action));
        let id = entry.id;
        transcript.push(entry);
        transcript.push(ChatEntry::user("CONTINUE"));
        assert_eq!(transcript.awaiting_click().map(|e| e.id), Some(id));

        transcript.mark_clicked(id);
        assert!(transcript.awaiting_click().is_none());
        assert!(transcript.rearm(id));
        assert!(!transcript.rearm(id));
        assert_eq!(transcript.awaiting_click().map(|e| e.id), Some(id));
    }
}
