use chrono::Duration;
use funnel_core::model::{ModuleId, Sender};
use funnel_core::time::fixed_now;
use funnel_core::FunnelConfig;
use services::scripts::DEFAULT_COMMUNITY_URL;
use services::{ChatSession, Clock, Effect, FunnelServices};

async fn services() -> FunnelServices {
    FunnelServices::in_memory(
        Clock::fixed(fixed_now()),
        FunnelConfig::default(),
        DEFAULT_COMMUNITY_URL,
    )
    .await
    .unwrap()
}

async fn jump_to(services: &FunnelServices, module: ModuleId, step: u32) {
    services
        .controller()
        .lock()
        .await
        .advance_step(module, step)
        .await
        .unwrap();
}

fn last_bot_text(session: &ChatSession) -> String {
    session
        .transcript()
        .entries()
        .iter()
        .rev()
        .find(|entry| entry.sender == Sender::Bot)
        .map(|entry| entry.text.clone())
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn copilot_simulation_runs_to_summary_and_restarts() {
    let services = services().await;
    let mut session = services.open_chat(ModuleId::Copilot).await.unwrap();
    assert!(!session.input_visible());

    session.send("START_SIMULATION").await.unwrap();
    for answer in ["now", "Maria Silva", "Main St 10", "Airport", "2 people, 1 bag", "no"] {
        assert!(session.input_visible(), "input hidden before {answer}");
        session.send(answer).await.unwrap();
    }

    let summary = last_bot_text(&session);
    assert!(summary.contains("Name: Maria Silva"));
    assert!(summary.contains("Destination: Airport"));
    assert_eq!(session.step(), 8);
    assert!(!session.input_visible());

    let restart = session.transcript().last().unwrap().id;
    assert_eq!(session.click(restart).await.unwrap(), None);
    assert_eq!(session.step(), 2);
    assert_eq!(session.transcript().len(), 1);
    assert!(session.input_visible());
}

#[tokio::test(start_paused = true)]
async fn replaying_module2_finale_applies_its_unlock() {
    let services = services().await;
    jump_to(&services, ModuleId::Module2, 11).await;

    let session = services.open_chat(ModuleId::Module2).await.unwrap();
    assert!(session.transcript().len() > 11);
    assert!(session
        .transcript()
        .entries()
        .iter()
        .all(|entry| entry.typing_finished));
    assert_eq!(
        services.controller().lock().await.record().unlocked_level(),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn community_button_opens_group_link() {
    let services = services().await;
    jump_to(&services, ModuleId::Community, 2).await;

    let mut session = services.open_chat(ModuleId::Community).await.unwrap();
    let join = session.transcript().last().unwrap().id;
    match session.click(join).await.unwrap() {
        Some(Effect::OpenUrl(url)) => assert_eq!(url.as_str(), DEFAULT_COMMUNITY_URL),
        other => panic!("unexpected effect {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn module3_finale_locks_final_tier() {
    let services = services().await;
    jump_to(&services, ModuleId::Module3, 6).await;

    let mut session = services.open_chat(ModuleId::Module3).await.unwrap();
    let activate = session.transcript().last().unwrap().id;
    let Some(Effect::ShowFinalLock(countdown)) = session.click(activate).await.unwrap() else {
        panic!("final lock expected");
    };
    assert_eq!(countdown.anchor(), Some(fixed_now()));
    assert_eq!(countdown.duration(), Duration::days(7));

    let controller = services.controller();
    let guard = controller.lock().await;
    assert!(guard.final_tier_locked().await.unwrap());
    assert_eq!(
        guard.store().final_tier_lock().await.unwrap(),
        Some(fixed_now())
    );
}

#[tokio::test(start_paused = true)]
async fn calculator_reports_monthly_profit() {
    let services = services().await;
    let mut session = services.open_chat(ModuleId::Calculator).await.unwrap();
    assert_eq!(session.step(), 1);
    assert!(session.input_visible());

    for answer in ["400", "120", "5"] {
        session.send(answer).await.unwrap();
    }
    let report = last_bot_text(&session);
    assert!(report.contains("8000.00"));
    assert!(report.contains("5600.00"));
    assert!(!session.suggestions().is_empty());

    session.send("EXIT").await.unwrap();
    assert!(session.is_finished());
    assert!(!session.input_visible());
}

#[tokio::test(start_paused = true)]
async fn dashboard_has_no_chat() {
    let services = services().await;
    assert!(services.open_chat(ModuleId::Dashboard).await.is_err());
}
