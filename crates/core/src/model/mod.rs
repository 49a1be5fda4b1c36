mod directive;
mod module;
mod progress;
mod transcript;

pub use directive::{
    normalize_token, ActionError, ActionKind, Directive, MessageAction, StepInput,
};
pub use module::{ModuleId, ModuleParseError};
pub use progress::{ProgressRecord, StepRef, PROGRESS_SCHEMA_VERSION};
pub use transcript::{ChatEntry, EntryId, Sender, Transcript};
