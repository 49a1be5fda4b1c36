use chrono::Duration;
use funnel_core::countdown::{Countdown, CountdownFormat, CountdownState, CountdownTracker};
use funnel_core::machine::{
    IntakeMachine, IntakeStage, ModuleData, ScriptedMachine, StepMachine, UnlockDirective,
};
use funnel_core::model::{ModuleId, ProgressRecord, StepInput};
use funnel_core::time::fixed_now;
use funnel_core::FunnelConfig;
use services::scripts::{self, DEFAULT_COMMUNITY_URL};
use services::{Clock, FunnelServices, ProgressController};
use storage::repository::Storage;

async fn load(storage: &Storage, clock: Clock) -> ProgressController {
    ProgressController::load(storage.progress(), clock, FunnelConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn checkpoint_survives_navigating_away_and_back() {
    let storage = Storage::in_memory();
    let mut controller = load(&storage, Clock::fixed(fixed_now())).await;

    controller.navigate_to(ModuleId::Module1).await.unwrap();
    for step in 1..=9 {
        controller.advance_step(ModuleId::Module1, step).await.unwrap();
    }
    controller.navigate_to(ModuleId::Copilot).await.unwrap();
    controller.advance_step(ModuleId::Copilot, 4).await.unwrap();

    let resumed = controller.navigate_to(ModuleId::Module1).await.unwrap();
    assert_eq!(resumed, 9);
    assert_eq!(controller.record().checkpoint(ModuleId::Module1), 9);
}

#[tokio::test]
async fn unlock_level_never_decreases() {
    let storage = Storage::in_memory();
    let mut controller = load(&storage, Clock::fixed(fixed_now())).await;
    controller.unlock_level(3).await.unwrap();
    controller.unlock_level(2).await.unwrap();
    assert_eq!(controller.record().unlocked_level(), 3);
}

#[tokio::test]
async fn module1_completion_keeps_first_timestamp() {
    let storage = Storage::in_memory();
    let mut controller = load(&storage, Clock::fixed(fixed_now())).await;
    controller.mark_module1_complete().await.unwrap();
    controller.advance_clock(Duration::hours(5));
    controller.mark_module1_complete().await.unwrap();
    assert_eq!(controller.record().module1_completed_at(), Some(fixed_now()));
}

#[tokio::test]
async fn record_older_than_ten_days_loads_defaults() {
    let storage = Storage::in_memory();
    let mut first = load(&storage, Clock::fixed(fixed_now())).await;
    first.unlock_level(3).await.unwrap();
    first.advance_step(ModuleId::Module2, 6).await.unwrap();

    let later = Clock::fixed(fixed_now() + Duration::days(11));
    let reloaded = load(&storage, later).await;
    assert_eq!(reloaded.record().unlocked_level(), 1);
    assert_eq!(reloaded.record().checkpoint(ModuleId::Module2), 0);
    assert_eq!(
        reloaded.record(),
        &ProgressRecord::new(fixed_now() + Duration::days(11))
    );
}

#[tokio::test]
async fn recent_record_is_preserved_except_last_interaction() {
    let storage = Storage::in_memory();
    let mut first = load(&storage, Clock::fixed(fixed_now())).await;
    first.unlock_level(2).await.unwrap();
    first.advance_step(ModuleId::Module1, 12).await.unwrap();
    first.mark_step_completed(ModuleId::Module1, 11).await.unwrap();
    first.mark_module1_complete().await.unwrap();
    let before = first.record().clone();

    let later = fixed_now() + Duration::days(1);
    let reloaded = load(&storage, Clock::fixed(later)).await;
    let after = reloaded.record();

    assert_eq!(after.last_interaction_at(), later);
    assert_eq!(after.current_module(), before.current_module());
    assert_eq!(after.current_step(), before.current_step());
    assert_eq!(after.completed_steps(), before.completed_steps());
    assert_eq!(after.unlocked_level(), before.unlocked_level());
    assert_eq!(
        after.module_step_checkpoints(),
        before.module_step_checkpoints()
    );
    assert_eq!(after.first_access_at(), before.first_access_at());
    assert_eq!(after.module1_completed_at(), before.module1_completed_at());
    assert_eq!(after.debug_mode(), before.debug_mode());
}

#[test]
fn countdown_turns_ready_exactly_at_deadline_and_stays_ready() {
    let anchor = fixed_now();
    let duration = Duration::hours(36);
    let countdown = Countdown::new(Some(anchor), duration, CountdownFormat::Hms);

    let almost = anchor + duration - Duration::seconds(1);
    assert!(matches!(
        countdown.state(almost),
        CountdownState::Waiting { .. }
    ));
    assert_eq!(countdown.state(anchor + duration), CountdownState::Ready);

    let mut tracker = CountdownTracker::new(countdown);
    assert!(!tracker.observe(almost).is_ready());
    assert!(tracker.observe(anchor + duration).is_ready());
    assert!(tracker.observe(almost).is_ready());
}

#[tokio::test]
async fn reset_all_clears_progress_but_keeps_debug_mode() {
    let storage = Storage::in_memory();
    let mut controller = load(&storage, Clock::fixed(fixed_now())).await;
    assert!(!controller.toggle_debug_mode().await.unwrap());
    controller.unlock_level(4).await.unwrap();
    controller.advance_step(ModuleId::Module3, 5).await.unwrap();
    controller
        .mark_step_completed(ModuleId::Module3, 4)
        .await
        .unwrap();

    controller.reset_all().await.unwrap();
    let record = controller.record();
    assert_eq!(record.unlocked_level(), 1);
    assert!(record.completed_steps().is_empty());
    assert!(record.module_step_checkpoints().is_empty());
    assert!(!record.debug_mode());
}

#[test]
fn expected_token_advances_exactly_when_next_step_exists() {
    let scripts = [
        scripts::module1().unwrap(),
        scripts::module2().unwrap(),
        scripts::module3().unwrap(),
        scripts::community(DEFAULT_COMMUNITY_URL).unwrap(),
    ];
    for script in scripts {
        let steps = script.steps.clone();
        let machine = ScriptedMachine::new(script).unwrap();
        for (&step, content) in &steps {
            let token = StepInput::Text(content.action().label().to_owned());
            let outcome = machine.process(step, &token, &ModuleData::Empty);
            if steps.contains_key(&(step + 1)) {
                assert_eq!(outcome.next_step, step + 1, "{} step {step}", machine.module());
                assert!(!outcome.messages.is_empty());
            } else {
                assert_eq!(outcome.next_step, step);
                assert!(outcome.messages.is_empty());
            }
        }
    }
}

#[test]
fn unrecognised_intake_answer_keeps_stage_and_repeats_question() {
    let machine = IntakeMachine::new();
    let asked = machine.process(1, &StepInput::Init, &ModuleData::Empty);
    assert_eq!(asked.next_step, 2);

    let confused = machine.process(2, &StepInput::Text("???".to_owned()), &asked.data);
    assert_eq!(confused.next_step, 3);
    let ModuleData::Intake(data) = &confused.data else {
        panic!("intake data expected");
    };
    assert_eq!(data.stage, IntakeStage::WaitingPath);
    let question = IntakeStage::WaitingPath.question().unwrap();
    assert!(confused.messages[0].text.contains(question));

    let named = machine.process(3, &StepInput::Text("now".to_owned()), &confused.data);
    let short = machine.process(4, &StepInput::Text("x".to_owned()), &named.data);
    let ModuleData::Intake(data) = &short.data else {
        panic!("intake data expected");
    };
    assert_eq!(data.stage, IntakeStage::WaitingName);
    assert_eq!(short.next_step, 5);
    assert!(short.messages[0]
        .text
        .contains(IntakeStage::WaitingName.question().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn module1_walkthrough_unlocks_level_two() {
    let services = FunnelServices::in_memory(
        Clock::fixed(fixed_now()),
        FunnelConfig::default(),
        DEFAULT_COMMUNITY_URL,
    )
    .await
    .unwrap();
    let mut session = services.open_chat(ModuleId::Module1).await.unwrap();

    for _ in 0..64 {
        if session.step() == 17 {
            break;
        }
        let button = session
            .transcript()
            .entries()
            .iter()
            .rev()
            .find(|entry| entry.action.is_some() && !entry.action_clicked)
            .map(|entry| entry.id)
            .unwrap();
        session.click(button).await.unwrap();
    }
    assert_eq!(session.step(), 17);

    let last = session.transcript().last().unwrap().clone();
    assert_eq!(
        last.action.as_ref().and_then(|action| action.unlock_level()),
        Some(2)
    );
    assert_eq!(session.pending_unlock(), Some(UnlockDirective { level: 2 }));

    assert_eq!(session.message_revealed(last.id).await.unwrap(), Some(2));
    let controller = services.controller();
    let guard = controller.lock().await;
    assert_eq!(guard.record().unlocked_level(), 2);
    assert!(guard.store().read_level_flags().await.unwrap().module2_unlocked);
    assert_eq!(guard.record().checkpoint(ModuleId::Module1), 17);
}
