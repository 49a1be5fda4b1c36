use funnel_core::machine::{Script, StepContent};
use funnel_core::model::{ActionKind, MessageAction, ModuleId};

use super::continue_action;

const STEPS: [&str; 6] = [
    "Look around. Most people just get through the day; few know how to build a dynasty.",
    "The level is higher here and the rules changed. To run paid traffic you need an owner's posture.",
    "The engine is tuned and your professional site is ready to deliver maximum authority.",
    "From now on execution is under my command. My only job is solid return in your pocket.",
    "But I only give my time to those who prove they can take it. You have 7 days to master the machine.",
    "Master the machine and don't be afraid to click. Prepare your infrastructure now.",
];

const FINAL: &str = "In 7 days I'll be waiting here to run ads at full throttle and bring the best customers in your region straight to your WhatsApp.";

/// Final pillar: steps 0 to 6; the last action seals the tier behind the long countdown.
///
/// # Errors
///
/// Returns `funnel_core::Error` if an action label is blank.
pub fn module3() -> Result<Script, funnel_core::Error> {
    let mut script = Script::new(ModuleId::Module3);
    for text in STEPS {
        script = script.step(StepContent::single(text, continue_action()?));
    }
    let lock = MessageAction::new("ACTIVATE SALES MACHINE", ActionKind::LockFinalTier)?;
    Ok(script.step(StepContent::single(FINAL, lock)))
}
