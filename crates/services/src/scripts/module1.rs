use funnel_core::machine::{IntroScreen, Script, StepContent};
use funnel_core::model::{ActionKind, Directive, MessageAction, ModuleId};

use super::continue_action;

const INTRO: [&str; 5] = [
    "Hello, and welcome to Taxi Pro. This is where your professional upgrade begins.",
    "I'm your instructor and the administrator of this infrastructure.",
    "Our focus is performance: the Copilot answers your customers while you drive.",
    "WINNER'S MINDSET\n\nBefore we press any button we align the direction: you are building an automated business.",
    "INSTALLATION MAP\n\nThe system runs on three bases: the assistant, the website and the ads.",
];

const PHASES: [&str; 16] = [
    "PHASE 1: THE FOUNDATION\n\nInstall the official app from the button below.",
    "MANDATORY PERMISSIONS\n\nEnable every notification and battery exemption the app asks for.",
    "PHASE 2: WORKSPACE\n\nLink the app to your business WhatsApp number.",
    "PHASE 3: CREATING YOUR AI ACCOUNT\n\nSign up with the e-mail you use every day.",
    "PHASE 4: THE AI'S FUEL\n\nAdd credit to the account so the assistant can answer.",
    "PHASE 5: THE MASTER KEY\n\nGenerate your API key and keep it somewhere safe.",
    "PHASE 6: CONNECTING THE WIRES\n\nPaste the key into the app's AI settings.",
    "PHASE 7: AI CONFIGURATION\n\nPick the recommended model in the app.",
    "PHASE 8: AI PARAMETERS\n\nCopy the parameters exactly as shown.",
    "PHASE 9: THE COPILOT\n\nPaste the Copilot instructions into the prompt field.",
    "PHASE 10: YOUR BRAND\n\nSet the business name the assistant will introduce itself with.",
    "To remove the reply tag later, just switch off the reply key.",
    "PHASE 11: WHERE NOT TO TOUCH\n\nLeave the advanced switches exactly as they are.",
    "PHASE 12: TURNING THE AI ON\n\nEnable the assistant and send yourself a test message.",
    "SUPER BONUS: FREE CREDITS\n\nRedeem the welcome credits before they expire.",
    "Check every phase once more before moving on.",
];

const OVERVIEW: &str = "Follow the exact sequence of the 12 PHASES OF PILLAR 1.";
const VICTORY: &str = "VICTORY: PILLAR 1 100% COMPLETE\n\nYour assistant is live. The next pillar is waiting for you.";

/// Installation pillar: steps 0 to 17, the last one unlocking level 2.
///
/// # Errors
///
/// Returns `funnel_core::Error` if an action label is blank.
pub fn module1() -> Result<Script, funnel_core::Error> {
    let mut script = Script::new(ModuleId::Module1);
    for (index, text) in INTRO.iter().enumerate() {
        let next = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let label = if index == 2 { "START PILLAR 1" } else { "CONTINUE" };
        let action = MessageAction::new(label, ActionKind::Send(Directive::Intro { screen: next }))?;
        script = script.intro(IntroScreen::new(*text, action));
    }

    script = script.step(StepContent::single(OVERVIEW, continue_action()?));
    for phase in PHASES {
        script = script.step(StepContent::single(phase, continue_action()?));
    }

    let access = MessageAction::new(
        "ACCESS PILLAR 2",
        ActionKind::Unlock {
            level: 2,
            target: ModuleId::Module2,
        },
    )?;
    Ok(script.step(StepContent::single(VICTORY, access).unlocking(2)))
}
