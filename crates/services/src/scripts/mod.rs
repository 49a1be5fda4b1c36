//! Content tables for the button-driven modules.
//!
//! Unlock thresholds live here, next to the copy that triggers them; the
//! interpreter in `funnel_core::machine` knows nothing about them.

mod community;
mod module1;
mod module2;
mod module3;

use funnel_core::model::{ActionError, MessageAction};

pub use community::{community, DEFAULT_COMMUNITY_URL};
pub use module1::module1;
pub use module2::module2;
pub use module3::module3;

fn continue_action() -> Result<MessageAction, ActionError> {
    MessageAction::reply("CONTINUE")
}
