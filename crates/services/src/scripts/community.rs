use funnel_core::machine::{Script, StepContent};
use funnel_core::model::{MessageAction, ModuleId};

use super::continue_action;

pub const DEFAULT_COMMUNITY_URL: &str = "https://chat.whatsapp.com/";

/// Three welcome screens; the last one opens the group invite.
///
/// # Errors
///
/// Returns `funnel_core::Error` if `group_url` is not a valid URL.
pub fn community(group_url: &str) -> Result<Script, funnel_core::Error> {
    let join = MessageAction::open_url("JOIN VIP COMMUNITY", group_url)?;
    Ok(Script::new(ModuleId::Community)
        .step(StepContent::single(
            "Welcome to the collaboration space. The VIP community is where drivers compare notes.",
            continue_action()?,
        ))
        .step(StepContent::single(
            "It is a place focused on growth and mutual support. Ask freely.",
            continue_action()?,
        ))
        .step(StepContent::single(
            "Share your results, learn new strategies and grow next to people chasing the same goal.",
            join,
        )))
}
