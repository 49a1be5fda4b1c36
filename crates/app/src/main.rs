use std::fmt;

use funnel_core::model::{ModuleId, Sender};
use funnel_core::FunnelConfig;
use services::navigation::{self, BackAction};
use services::scripts::DEFAULT_COMMUNITY_URL;
use services::{ChatSession, Clock, Effect, FunnelServices, LifecycleEvent, Revalidator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  funnel [--db <sqlite_url>] [--log <filter>] [--community-url <url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://funnel.sqlite3");
    eprintln!("  --log info");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  FUNNEL_DB_URL, FUNNEL_LOG, FUNNEL_COMMUNITY_URL");
}

fn print_commands() {
    println!("Commands:");
    println!("  open <module>   enter a module (module1, module2, module3, copilot, community, calculator)");
    println!("  click [n]       press the last button, or the button on entry n");
    println!("  back            go back");
    println!("  status          show progress");
    println!("  reset           start over");
    println!("  debug           toggle diagnostics");
    println!("  quit");
    println!("Anything else is sent to the open chat.");
}

struct Args {
    db_url: String,
    log_filter: String,
    community_url: String,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("FUNNEL_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://funnel.sqlite3".into(), normalize_sqlite_url);
        let mut log_filter = std::env::var("FUNNEL_LOG").unwrap_or_else(|_| "info".into());
        let mut community_url = std::env::var("FUNNEL_COMMUNITY_URL")
            .unwrap_or_else(|_| DEFAULT_COMMUNITY_URL.into());

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--log" => log_filter = require_value(args, "--log")?,
                "--community-url" => community_url = require_value(args, "--community-url")?,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            log_filter,
            community_url,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

//
// ─── TERMINAL SCREENS ──────────────────────────────────────────────────────────
//

/// The screen currently shown and how much of its transcript is on the terminal.
struct Screen {
    chat: Option<ChatSession>,
    printed: usize,
}

impl Screen {
    fn home() -> Self {
        Self {
            chat: None,
            printed: 0,
        }
    }

    fn chat(session: ChatSession) -> Self {
        Self {
            chat: Some(session),
            printed: 0,
        }
    }
}

async fn render_dashboard(services: &FunnelServices) {
    let controller = services.controller();
    let level = controller.lock().await.record().unlocked_level();
    println!();
    println!("== {} ==  (level {level})", ModuleId::Dashboard.title());
    for module in ModuleId::CHAT {
        let marker = if navigation::is_reachable(module, level) {
            "open"
        } else {
            "locked"
        };
        println!("  {:<11} {:<38} [{marker}]", module.as_str(), module.title());
    }

    let (gate, reveal) = services.spawn_countdowns().await;
    let gate = gate.current();
    if gate.state.is_ready() {
        println!("  pillar 2 gate: ready");
    } else {
        println!("  pillar 2 gate: {}", gate.display);
    }
    let reveal = reveal.current();
    println!(
        "  final tier reveal: {} ({:?} urgency)",
        reveal.display, reveal.urgency
    );
}

/// Print entries not yet on screen and report each as revealed.
async fn flush_chat(screen: &mut Screen) -> Result<(), Box<dyn std::error::Error>> {
    let Some(session) = screen.chat.as_mut() else {
        return Ok(());
    };
    let fresh: Vec<_> = session
        .transcript()
        .entries()
        .iter()
        .enumerate()
        .skip(screen.printed)
        .map(|(index, entry)| (index, entry.clone()))
        .collect();
    if screen.printed == 0 {
        println!();
        println!("== {} ==", session.module().title());
    }

    for (index, entry) in fresh {
        match entry.sender {
            Sender::Bot => println!("[{index}] {}", entry.text),
            Sender::User => println!("[{index}] > {}", entry.text),
        }
        if let Some(action) = &entry.action {
            let used = if entry.action_clicked { " (used)" } else { "" };
            println!("      [ {} ]{used}", action.label());
        }
        if entry.sender == Sender::Bot
            && !entry.typing_finished
            && let Some(level) = session.message_revealed(entry.id).await?
        {
            println!("*** LEVEL {level} UNLOCKED ***");
        }
    }
    screen.printed = session.transcript().len();

    if !session.suggestions().is_empty() {
        println!("      suggestions: {}", session.suggestions().join(" | "));
    }
    if session.input_visible() {
        println!("      (type your answer)");
    }
    Ok(())
}

fn print_effect(effect: Effect) {
    match effect {
        Effect::OpenUrl(url) => println!("-> open {url}"),
        Effect::ShowUnlockOverlay { level, next } => {
            println!("*** LEVEL {level} UNLOCKED: {} is ready ***", next.title());
        }
        Effect::ShowFinalLock(countdown) => {
            println!(
                "*** SALES MACHINE LOCKED. Final tier opens in {} ***",
                countdown.format_remaining(Clock::default_clock().now())
            );
        }
    }
}

async fn handle_line(
    line: &str,
    services: &FunnelServices,
    screen: &mut Screen,
) -> Result<bool, Box<dyn std::error::Error>> {
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(command, rest)| (command, rest.trim()));

    match command {
        "quit" | "exit" => return Ok(false),
        "help" => print_commands(),
        "open" => {
            let level = services.controller().lock().await.record().unlocked_level();
            let module = navigation::resolve(rest, level);
            if module.is_home() {
                *screen = Screen::home();
                render_dashboard(services).await;
            } else {
                *screen = Screen::chat(services.open_chat(module).await?);
                flush_chat(screen).await?;
            }
        }
        "back" => {
            let current = screen
                .chat
                .as_ref()
                .map_or(ModuleId::Dashboard, ChatSession::module);
            match navigation::on_back(current) {
                BackAction::LeaveApp => return Ok(false),
                BackAction::Home => {
                    let back = services.controller().lock().await.return_home().await?;
                    if let Some(level) = back.unlocked {
                        println!("*** LEVEL {level} UNLOCKED ***");
                    }
                    *screen = Screen::home();
                    render_dashboard(services).await;
                }
            }
        }
        "status" => {
            let controller = services.controller();
            let guard = controller.lock().await;
            let record = guard.record();
            println!(
                "module={} step={} level={} completed={} debug={}",
                record.current_module(),
                record.current_step(),
                record.unlocked_level(),
                record.completed_steps().len(),
                record.debug_mode()
            );
            if record.debug_mode() {
                for (module, step) in record.module_step_checkpoints() {
                    println!("  checkpoint {module}: {step}");
                }
            }
        }
        "reset" => {
            services.controller().lock().await.reset_all().await?;
            *screen = Screen::home();
            render_dashboard(services).await;
        }
        "debug" => {
            let on = services
                .controller()
                .lock()
                .await
                .toggle_debug_mode()
                .await?;
            println!("diagnostics {}", if on { "on" } else { "off" });
        }
        "click" => {
            let Some(session) = screen.chat.as_mut() else {
                println!("no chat open");
                return Ok(true);
            };
            let entries = session.transcript().entries();
            let target = match rest.parse::<usize>() {
                Ok(index) => entries.get(index),
                Err(_) => entries.iter().rev().find(|entry| entry.action.is_some()),
            }
            .map(|entry| entry.id);
            match target {
                Some(id) => {
                    if let Some(effect) = session.click(id).await? {
                        print_effect(effect);
                    }
                    flush_chat(screen).await?;
                }
                None => println!("no button to press"),
            }
        }
        _ => match screen.chat.as_mut() {
            Some(session) => {
                session.send(line).await?;
                flush_chat(screen).await?;
            }
            None => println!("unknown command, try `help`"),
        },
    }
    Ok(true)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let parsed = Args::parse(&mut args).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_logging(&parsed.log_filter);

    prepare_sqlite_file(&parsed.db_url)?;
    let services = FunnelServices::new_sqlite(
        &parsed.db_url,
        Clock::default_clock(),
        FunnelConfig::default(),
        &parsed.community_url,
    )
    .await?;
    info!(db = %parsed.db_url, "funnel ready");

    let revalidator: Revalidator = services.spawn_revalidator().await;
    let mut screen = Screen::home();
    render_dashboard(&services).await;
    print_commands();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !revalidator.notify(LifecycleEvent::Focus) {
            debug!("revalidation queue full");
        }
        if !handle_line(line, &services, &mut screen).await? {
            break;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
