use funnel_core::machine::{IntroScreen, Script, StepContent};
use funnel_core::model::{ActionKind, Directive, MessageAction, ModuleId};

use super::continue_action;

const INTRO: [(&str, &str); 4] = [
    ("Welcome to Pillar 2. Your assistant is running; now it needs a storefront.", "CONTINUE"),
    ("A professional website gives you the authority the market expects.", "CONTINUE"),
    ("We will clone a ready-made site and make it yours in eleven moves.", "START PILLAR 2"),
    ("ROADMAP\n\nPrepare, clone, clean, brand, publish.", "CONTINUE"),
];

const PHASES: [&str; 10] = [
    "PHASE 1: PREPARING THE SITE\n\nFollow this order exactly so nothing breaks.",
    "LET'S CLONE THE SITE\n\nUse the menu at the top right and choose duplicate.",
    "Clean the sample content, keeping the section layout.",
    "PHASE 2: YOUR BRAND\n\nUpload your logo and pick your colours.",
    "Write the services you offer: airport, city tour, scheduled rides.",
    "PHASE 3: CONTACT\n\nPoint every button to your WhatsApp number.",
    "Test each button from your phone.",
    "PHASE 4: DOMAIN\n\nConnect the address customers will type.",
    "PHASE 5: PUBLISH\n\nPress publish and open the live address.",
    "Share the link with three people and ask what they see first.",
];

const DONE: &str = "PILLAR 2 COMPLETE\n\nYour website is live and wired to your assistant.";

/// Website pillar: intro screens lead into step 1; step 11 unlocks level 3.
///
/// # Errors
///
/// Returns `funnel_core::Error` if an action label is blank.
pub fn module2() -> Result<Script, funnel_core::Error> {
    let mut script = Script::new(ModuleId::Module2).begin_at(1);
    for (index, (text, label)) in INTRO.iter().enumerate() {
        let next = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let action = MessageAction::new(*label, ActionKind::Send(Directive::Intro { screen: next }))?;
        script = script.intro(IntroScreen::new(*text, action));
    }

    script = script.step(
        StepContent::single("Waiting for initialisation...", MessageAction::reply("START")?)
            .accepting("INICIAR"),
    );
    for phase in PHASES {
        script = script.step(StepContent::single(phase, continue_action()?));
    }

    let access = MessageAction::new(
        "ACCESS PILLAR 3",
        ActionKind::Unlock {
            level: 3,
            target: ModuleId::Module3,
        },
    )?;
    Ok(script.step(StepContent::single(DONE, access).unlocking(3)))
}
