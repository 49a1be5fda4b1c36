use thiserror::Error;

use crate::model::{ActionError, ModuleParseError};
use crate::machine::ScriptError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Module(#[from] ModuleParseError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}
