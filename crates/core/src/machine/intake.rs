use std::fmt::Write as _;
use std::time::Duration;

use crate::machine::{ModuleData, OutputMessage, StepMachine, StepOutcome};
use crate::model::{normalize_token, ActionKind, Directive, MessageAction, ModuleId, StepInput};

const REPLY_DELAY: Duration = Duration::from_millis(800);

const RESTART_LABEL: &str = "RESTART SIMULATION";

const INTRO: [&str; 4] = [
    "Systems online. This is your Copilot, the assistant you installed to answer passengers while you drive.",
    "I stay on call in your WhatsApp: I greet the passenger, collect pickup and destination, and hand you a closed ride, 24 hours a day.",
    "No more taking your hands off the wheel to avoid losing a fare. I handle the conversation, you handle the trip.",
    "Now let's validate your machine. Play the passenger: press the button below to start the simulation.",
];

const ASK_PATH: &str = "Hello! The driver is at the wheel right now, so I'll get your booking started.\n\nDo you need a car NOW, would you like to SCHEDULE, or are you after a CITY TOUR?";
const ASK_NAME: &str = "Perfect! To open your ticket in the driver's system, what is your full name?";
const ASK_PICKUP: &str = "Where should I pick you up? (street and number or a landmark)";
const ASK_DATE: &str = "Which DATE is the booking for? (day/month)";
const ASK_TIME: &str = "What TIME should the driver arrive?";
const ASK_DURATION: &str = "Roughly how many hours would you like the tour to last?";
const ASK_DATE_TIME: &str = "Which date and time do you prefer to start?";
const ASK_TOUR_PEOPLE: &str = "How many people are joining the tour?";
const ASK_TOUR_PICKUP: &str = "Where should I pick you all up?";
const ASK_DESTINATION: &str = "What is the destination of the trip?";
const ASK_PEOPLE_BAGS: &str = "How many passengers and bags?";
const ASK_RETURN: &str = "Do you need a return trip? (yes/no)";
const ASK_RETURN_TIME: &str = "What time is the return?";
const ASK_RETURN_PICKUP: &str = "Where should I pick you up for the return?";
const ASK_RETURN_SAME_DEST: &str = "Is the final destination the same as the outbound trip?";

const FALLBACK_PREFIX: &str = "I'm a digital assistant and can't process that right now. The driver will talk to you shortly, but to move your ticket forward I need to know:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakePath {
    Now,
    Schedule,
    CityTour,
}

impl IntakePath {
    fn detect(token: &str) -> Option<Self> {
        if token.contains("CITYTOUR") || token.contains("CITY TOUR") {
            Some(Self::CityTour)
        } else if token.contains("NOW") || token.contains("AGORA") {
            Some(Self::Now)
        } else if token.contains("SCHEDULE") || token.contains("AGENDAR") {
            Some(Self::Schedule)
        } else {
            None
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Now => "NOW",
            Self::Schedule => "SCHEDULE",
            Self::CityTour => "CITY TOUR",
        }
    }
}

/// Sub-stage of the intake conversation, independent of the numeric step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntakeStage {
    #[default]
    WaitingPath,
    WaitingName,
    WaitingPickup,
    WaitingDate,
    WaitingTime,
    WaitingDuration,
    WaitingDateTime,
    WaitingTourPeople,
    WaitingTourPickup,
    WaitingDestination,
    WaitingPeopleBags,
    WaitingReturn,
    WaitingReturnTime,
    WaitingReturnPickup,
    WaitingReturnSameDestination,
    Finished,
}

impl IntakeStage {
    #[must_use]
    pub fn question(self) -> Option<&'static str> {
        let question = match self {
            Self::WaitingPath => ASK_PATH,
            Self::WaitingName => ASK_NAME,
            Self::WaitingPickup => ASK_PICKUP,
            Self::WaitingDate => ASK_DATE,
            Self::WaitingTime => ASK_TIME,
            Self::WaitingDuration => ASK_DURATION,
            Self::WaitingDateTime => ASK_DATE_TIME,
            Self::WaitingTourPeople => ASK_TOUR_PEOPLE,
            Self::WaitingTourPickup => ASK_TOUR_PICKUP,
            Self::WaitingDestination => ASK_DESTINATION,
            Self::WaitingPeopleBags => ASK_PEOPLE_BAGS,
            Self::WaitingReturn => ASK_RETURN,
            Self::WaitingReturnTime => ASK_RETURN_TIME,
            Self::WaitingReturnPickup => ASK_RETURN_PICKUP,
            Self::WaitingReturnSameDestination => ASK_RETURN_SAME_DEST,
            Self::Finished => return None,
        };
        Some(question)
    }

    fn suggestions(self) -> &'static [&'static str] {
        match self {
            Self::WaitingPath => &["NOW", "SCHEDULE", "CITY TOUR"],
            Self::WaitingReturn | Self::WaitingReturnSameDestination => &["YES", "NO"],
            _ => &[],
        }
    }
}

/// Fields collected by the intake simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeData {
    pub stage: IntakeStage,
    pub path: Option<IntakePath>,
    pub name: String,
    pub pickup: String,
    pub date: String,
    pub time: String,
    pub duration: String,
    pub date_time: String,
    pub people: String,
    pub destination: String,
    pub wants_return: bool,
    pub return_time: String,
    pub return_pickup: String,
    pub return_same_destination: String,
    pub last_question: String,
}

impl IntakeData {
    fn asking(mut self, stage: IntakeStage) -> Self {
        self.stage = stage;
        if let Some(question) = stage.question() {
            question.clone_into(&mut self.last_question);
        }
        self
    }

    /// Order summary built from every collected field.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = String::from("ORDER SUMMARY\n\n");
        let _ = writeln!(summary, "Name: {}", self.name);
        match self.path {
            Some(IntakePath::CityTour) => {
                let _ = writeln!(summary, "Type: CITY TOUR");
                let _ = writeln!(summary, "Duration: {}", self.duration);
                let _ = writeln!(summary, "Date/time: {}", self.date_time);
                let _ = writeln!(summary, "People: {}", self.people);
                let _ = write!(summary, "Pickup: {}", self.pickup);
            }
            path => {
                let label = path.map_or("NOW", IntakePath::label);
                let _ = writeln!(summary, "Type: {label}");
                if path == Some(IntakePath::Schedule) {
                    let _ = writeln!(summary, "Date: {}", self.date);
                    let _ = writeln!(summary, "Time: {}", self.time);
                }
                let _ = writeln!(summary, "Pickup: {}", self.pickup);
                let _ = writeln!(summary, "Destination: {}", self.destination);
                let _ = write!(summary, "Passengers/bags: {}", self.people);
                if self.wants_return {
                    let _ = write!(
                        summary,
                        "\n\nRETURN\nTime: {}\nPickup: {}\nSame destination: {}",
                        self.return_time, self.return_pickup, self.return_same_destination
                    );
                }
            }
        }
        summary
    }
}

fn is_yes(token: &str) -> bool {
    matches!(token, "YES" | "Y" | "SIM")
}

fn is_no(token: &str) -> bool {
    matches!(token, "NO" | "N" | "NÃO" | "NAO")
}

//
// ─── MACHINE ───────────────────────────────────────────────────────────────────
//

/// Copilot booking simulation.
///
/// Step 0 shows the intro screens, step 1 asks the path, and from step 2 on
/// every turn is dispatched on `IntakeData::stage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntakeMachine;

impl IntakeMachine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn intro(screen: u32) -> Option<OutputMessage> {
        let index = usize::try_from(screen).ok()?;
        let text = INTRO.get(index)?;
        let action = if index + 1 == INTRO.len() {
            MessageAction::new(
                "START SIMULATION",
                ActionKind::Send(Directive::StartSimulation),
            )
        } else {
            MessageAction::new(
                "CONTINUE",
                ActionKind::Send(Directive::Intro { screen: screen + 1 }),
            )
        };
        let action = action.ok()?;
        Some(OutputMessage::with_action(*text, action).delayed(REPLY_DELAY))
    }

    fn ask(stage: IntakeStage, data: IntakeData, next_step: u32) -> StepOutcome {
        let data = data.asking(stage);
        let message = OutputMessage::text(data.last_question.clone()).delayed(REPLY_DELAY);
        StepOutcome::moved(next_step, vec![message], ModuleData::Intake(data))
            .with_suggestions(stage.suggestions().iter().copied())
    }

    fn ask_path(step: u32) -> StepOutcome {
        Self::ask(IntakeStage::WaitingPath, IntakeData::default(), step)
    }

    fn fallback(step: u32, data: IntakeData) -> StepOutcome {
        let text = format!("{FALLBACK_PREFIX}\n\n{}", data.last_question);
        let suggestions = data.stage.suggestions();
        StepOutcome::moved(
            step.saturating_add(1),
            vec![OutputMessage::text(text).delayed(REPLY_DELAY)],
            ModuleData::Intake(data),
        )
        .with_suggestions(suggestions.iter().copied())
    }

    fn finish(step: u32, mut data: IntakeData) -> StepOutcome {
        data.stage = IntakeStage::Finished;
        let closure = if data.path == Some(IntakePath::Now) {
            "The driver will contact you shortly to confirm availability and the fare. Keep an eye on your phone!"
        } else {
            "The driver will contact you shortly to confirm the schedule and the fare. Keep an eye on your phone!"
        };
        let text = format!("{}\n\n{closure}", data.summary());
        let message = OutputMessage::text(text).delayed(REPLY_DELAY);
        let message = match MessageAction::new(RESTART_LABEL, ActionKind::Restart) {
            Ok(restart) => OutputMessage {
                action: Some(restart),
                ..message
            },
            Err(_) => message,
        };
        let mut outcome =
            StepOutcome::moved(step.saturating_add(1), vec![message], ModuleData::Intake(data));
        outcome.finished = true;
        outcome
    }

    fn collect(step: u32, answer: &str, mut data: IntakeData) -> StepOutcome {
        let token = normalize_token(answer);
        let next = step.saturating_add(1);
        match data.stage {
            IntakeStage::WaitingPath => match IntakePath::detect(&token) {
                Some(path) => {
                    data.path = Some(path);
                    Self::ask(IntakeStage::WaitingName, data, next)
                }
                None => Self::fallback(step, data),
            },
            IntakeStage::WaitingName => {
                if answer.chars().count() < 2 {
                    return Self::fallback(step, data);
                }
                answer.clone_into(&mut data.name);
                let stage = match data.path {
                    Some(IntakePath::Schedule) => IntakeStage::WaitingDate,
                    Some(IntakePath::CityTour) => IntakeStage::WaitingDuration,
                    Some(IntakePath::Now) | None => IntakeStage::WaitingPickup,
                };
                Self::ask(stage, data, next)
            }
            IntakeStage::WaitingPickup => {
                answer.clone_into(&mut data.pickup);
                Self::ask(IntakeStage::WaitingDestination, data, next)
            }
            IntakeStage::WaitingDate => {
                answer.clone_into(&mut data.date);
                Self::ask(IntakeStage::WaitingTime, data, next)
            }
            IntakeStage::WaitingTime => {
                answer.clone_into(&mut data.time);
                Self::ask(IntakeStage::WaitingPickup, data, next)
            }
            IntakeStage::WaitingDuration => {
                answer.clone_into(&mut data.duration);
                Self::ask(IntakeStage::WaitingDateTime, data, next)
            }
            IntakeStage::WaitingDateTime => {
                answer.clone_into(&mut data.date_time);
                Self::ask(IntakeStage::WaitingTourPeople, data, next)
            }
            IntakeStage::WaitingTourPeople => {
                answer.clone_into(&mut data.people);
                Self::ask(IntakeStage::WaitingTourPickup, data, next)
            }
            IntakeStage::WaitingTourPickup => {
                answer.clone_into(&mut data.pickup);
                Self::finish(step, data)
            }
            IntakeStage::WaitingDestination => {
                answer.clone_into(&mut data.destination);
                Self::ask(IntakeStage::WaitingPeopleBags, data, next)
            }
            IntakeStage::WaitingPeopleBags => {
                answer.clone_into(&mut data.people);
                Self::ask(IntakeStage::WaitingReturn, data, next)
            }
            IntakeStage::WaitingReturn if is_yes(&token) => {
                data.wants_return = true;
                Self::ask(IntakeStage::WaitingReturnTime, data, next)
            }
            IntakeStage::WaitingReturn if is_no(&token) => {
                data.wants_return = false;
                Self::finish(step, data)
            }
            IntakeStage::WaitingReturn => Self::fallback(step, data),
            IntakeStage::WaitingReturnTime => {
                answer.clone_into(&mut data.return_time);
                Self::ask(IntakeStage::WaitingReturnPickup, data, next)
            }
            IntakeStage::WaitingReturnPickup => {
                answer.clone_into(&mut data.return_pickup);
                Self::ask(IntakeStage::WaitingReturnSameDestination, data, next)
            }
            IntakeStage::WaitingReturnSameDestination => {
                answer.clone_into(&mut data.return_same_destination);
                Self::finish(step, data)
            }
            IntakeStage::Finished => {
                let mut outcome = StepOutcome::unchanged(step, &ModuleData::Intake(data));
                outcome.finished = true;
                outcome
            }
        }
    }
}

impl StepMachine for IntakeMachine {
    fn module(&self) -> ModuleId {
        ModuleId::Copilot
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn process(&self, step: u32, input: &StepInput, data: &ModuleData) -> StepOutcome {
        let intake = match data {
            ModuleData::Intake(intake) => intake.clone(),
            _ => IntakeData::default(),
        };

        match input {
            StepInput::Directive(Directive::StartSimulation | Directive::Reset) => {
                return Self::ask_path(2);
            }
            StepInput::Text(text) if normalize_token(text) == RESTART_LABEL => {
                return Self::ask_path(2);
            }
            _ => {}
        }

        match (step, input) {
            (0, StepInput::Directive(Directive::Resume)) => {
                let last = u32::try_from(INTRO.len() - 1).unwrap_or_default();
                Self::intro(last).map_or_else(
                    || StepOutcome::unchanged(step, data),
                    |message| StepOutcome::moved(0, vec![message], data.clone()),
                )
            }
            (0, StepInput::Init | StepInput::Directive(Directive::RestoreSession)) => {
                Self::intro(0).map_or_else(
                    || StepOutcome::unchanged(step, data),
                    |message| StepOutcome::moved(0, vec![message], data.clone()),
                )
            }
            (0, StepInput::Directive(Directive::Intro { screen })) => Self::intro(*screen)
                .map_or_else(
                    || StepOutcome::unchanged(step, data),
                    |message| StepOutcome::moved(0, vec![message], data.clone()),
                ),
            (0, _) => StepOutcome::unchanged(step, data),
            (1, _) => Self::ask_path(2),
            // Collected fields live only in memory; a restored session re-asks the path.
            (_, StepInput::Directive(Directive::RestoreSession)) => Self::ask_path(step),
            (_, StepInput::Text(answer)) => Self::collect(step, answer, intake),
            _ => StepOutcome::unchanged(step, data),
        }
    }
}
