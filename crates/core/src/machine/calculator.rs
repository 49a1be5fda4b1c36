use std::time::Duration;

use crate::machine::{ModuleData, OutputMessage, StepMachine, StepOutcome};
use crate::model::{normalize_token, Directive, ModuleId, StepInput};

const WEEKS_PER_MONTH: f64 = 4.0;
const HEALTHY_MONTHLY_PROFIT: f64 = 3000.0;
const REPORT_GAP: Duration = Duration::from_millis(600);

const STEP_ASK_GROSS: u32 = 1;
const STEP_ASK_COST: u32 = 2;
const STEP_ASK_DAYS: u32 = 3;
const STEP_REPORT: u32 = 4;
const STEP_CLOSED: u32 = 5;

/// Figures entered so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalculatorData {
    pub daily_gross: f64,
    pub daily_cost: f64,
    pub days_per_week: f64,
    pub monthly_profit: Option<f64>,
}

impl CalculatorData {
    #[must_use]
    pub fn monthly_gross(&self) -> f64 {
        self.daily_gross * self.days_per_week * WEEKS_PER_MONTH
    }

    #[must_use]
    pub fn monthly_cost(&self) -> f64 {
        self.daily_cost * self.days_per_week * WEEKS_PER_MONTH
    }

    #[must_use]
    pub fn monthly_net(&self) -> f64 {
        (self.daily_gross - self.daily_cost) * self.days_per_week * WEEKS_PER_MONTH
    }
}

/// Keep digits and the decimal separator, then parse.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter_map(|c| match c {
            '0'..='9' | '.' => Some(c),
            ',' => Some('.'),
            _ => None,
        })
        .collect();
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn bot(text: impl Into<String>) -> OutputMessage {
    OutputMessage::text(text).delayed(REPORT_GAP)
}

/// Monthly profit calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorMachine;

impl CalculatorMachine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn welcome() -> StepOutcome {
        StepOutcome::moved(
            STEP_ASK_GROSS,
            vec![
                OutputMessage::text("REAL PROFIT CALCULATOR"),
                bot("Many drivers bill a lot and lose it all to invisible costs."),
                bot("I'll work out your NET MONTHLY PROFIT now."),
                bot("To start: what is your AVERAGE DAILY GROSS?\nE.g. 400"),
            ],
            ModuleData::Calculator(CalculatorData::default()),
        )
    }

    fn retry(step: u32, data: CalculatorData, text: &str) -> StepOutcome {
        StepOutcome::moved(step, vec![bot(text)], ModuleData::Calculator(data))
    }

    fn report(mut data: CalculatorData) -> StepOutcome {
        let net = data.monthly_net();
        data.monthly_profit = Some(net);
        let verdict = if net > HEALTHY_MONTHLY_PROFIT {
            "Excellent result! With paid ads we can scale this even further."
        } else {
            "Careful: your margin is tight. Raising your fares is urgent."
        };
        StepOutcome::moved(
            STEP_REPORT,
            vec![
                bot("PROCESSING FINANCIAL DATA..."),
                bot("ANALYSIS RESULT:"),
                bot(format!("Monthly gross: R$ {:.2}", data.monthly_gross())),
                bot(format!("Monthly cost: R$ {:.2}", data.monthly_cost())),
                bot(format!("ESTIMATED NET PROFIT: R$ {net:.2}")),
                bot(verdict),
                bot("Would you like to run a new simulation?"),
            ],
            ModuleData::Calculator(data),
        )
        .with_suggestions(["SIMULATE AGAIN", "EXIT"])
    }
}

impl StepMachine for CalculatorMachine {
    fn module(&self) -> ModuleId {
        ModuleId::Calculator
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn process(&self, step: u32, input: &StepInput, data: &ModuleData) -> StepOutcome {
        let mut figures = match data {
            ModuleData::Calculator(figures) => *figures,
            _ => CalculatorData::default(),
        };

        if matches!(
            input,
            StepInput::Init | StepInput::Directive(Directive::Reset | Directive::RestoreSession)
        ) {
            return Self::welcome();
        }
        let Some(text) = input.text() else {
            return StepOutcome::unchanged(step, data);
        };

        match step {
            0 => Self::welcome(),
            STEP_ASK_GROSS => match parse_amount(text).filter(|v| *v > 0.0) {
                Some(gross) => {
                    figures.daily_gross = gross;
                    StepOutcome::moved(
                        STEP_ASK_COST,
                        vec![bot(format!(
                            "Right, R$ {gross:.2} per day.\n\nNow: how much do you spend on FUEL + FOOD per day?\nE.g. 120"
                        ))],
                        ModuleData::Calculator(figures),
                    )
                }
                None => Self::retry(step, figures, "Invalid value. Type numbers only. E.g. 400"),
            },
            STEP_ASK_COST => match parse_amount(text).filter(|v| *v >= 0.0) {
                Some(cost) => {
                    figures.daily_cost = cost;
                    StepOutcome::moved(
                        STEP_ASK_DAYS,
                        vec![bot("Got it.\n\nFinally: how many DAYS PER WEEK do you work?\nE.g. 5 or 6")],
                        ModuleData::Calculator(figures),
                    )
                    .with_suggestions(["5", "6", "7"])
                }
                None => Self::retry(step, figures, "Invalid value. Type numbers only."),
            },
            STEP_ASK_DAYS => match parse_amount(text).filter(|v| *v > 0.0 && *v <= 7.0) {
                Some(days) => {
                    figures.days_per_week = days;
                    Self::report(figures)
                }
                None => Self::retry(step, figures, "Please type a number between 1 and 7.")
                    .with_suggestions(["5", "6", "7"]),
            },
            STEP_REPORT => {
                let token = normalize_token(text);
                if token.contains("SIMULATE") || token.contains("SIMULAR") {
                    StepOutcome::moved(
                        STEP_ASK_GROSS,
                        vec![bot("Restarting calculator...\n\nWhat is your AVERAGE DAILY GROSS?")],
                        ModuleData::Calculator(CalculatorData::default()),
                    )
                } else {
                    let mut outcome = StepOutcome::moved(
                        STEP_CLOSED,
                        vec![bot("Calculator closed. Focus on profit!")],
                        ModuleData::Calculator(figures),
                    );
                    outcome.finished = true;
                    outcome
                }
            }
            _ => {
                let mut outcome = StepOutcome::unchanged(step, data);
                outcome.finished = true;
                outcome
            }
        }
    }
}
