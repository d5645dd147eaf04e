mod agent;
mod config;
mod logging;
mod session;
mod types;
mod ui;

use std::{io, time::Duration};

use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event as CEvent, KeyCode,
        KeyEventKind, KeyModifiers,
    },
    execute,
    style::{Print, Stylize},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc;

use crate::agent::gateway::Gateway;
use crate::agent::provider::{GeminiProvider, build_http_client};
use crate::config::Config;
use crate::session::audit::ExchangeAudit;
use crate::session::dispatch::{Applied, Dispatcher, WorkerEvent};
use crate::session::orchestrator::{Orchestrator, Phase};
use crate::types::Stage;
use crate::ui::format::{
    format_already_final, format_briefing, format_help, format_insights,
    format_insights_digest, format_stage_advanced, format_steps, format_turn,
};
use crate::ui::screen::Screen;

// ── App state ─────────────────────────────────────────────────────────────────

pub(crate) struct App {
    pub orchestrator: Orchestrator,
    pub dispatcher: Dispatcher<GeminiProvider>,
    pub quit: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Next,
    Insights,
    Steps,
    Reset,
    Help,
    Quit,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let (config, warnings) = Config::load()?;
    let log_path = logging::init(&config);
    for w in &warnings {
        tracing::warn!("{w}");
    }
    tracing::info!(
        reply_model = %config.reply_model,
        summary_model = %config.summary_model,
        merge_policy = config.merge_policy.as_str(),
        "session starting"
    );

    let http_client = build_http_client(&config)?;
    let gateway = Gateway::new(GeminiProvider::new(http_client, &config), &config);
    let audit = ExchangeAudit::new(&config.audit_file());
    let (tx, rx) = mpsc::channel::<WorkerEvent>(8);
    let mut app = App {
        orchestrator: Orchestrator::new(config.merge_policy, audit),
        dispatcher: Dispatcher::new(gateway, tx),
        quit: false,
    };

    enable_raw_mode()?;
    execute!(io::stdout(), EnableBracketedPaste)?;
    let mut screen = match Screen::new(&config) {
        Ok(screen) => screen,
        Err(e) => {
            let _ = execute!(io::stdout(), DisableBracketedPaste);
            let _ = disable_raw_mode();
            return Err(e.into());
        }
    };

    for w in &warnings {
        screen.emit(&[format!("  {}", w.as_str().dark_yellow())]);
    }
    if log_path.is_none() {
        screen.emit(&[format!(
            "  {}",
            "Could not open the session log; continuing without it.".dark_yellow()
        )]);
    }
    screen.emit(&format_briefing());

    let run_result = run_loop(&mut app, &mut screen, rx, config.opening_message.clone()).await;

    screen.teardown();
    let _ = execute!(io::stdout(), DisableBracketedPaste);
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), Print("\r\n"));
    tracing::info!(turns = app.orchestrator.conversation().len(), "session ended");
    run_result
}

async fn run_loop(
    app: &mut App,
    screen: &mut Screen,
    mut rx: mpsc::Receiver<WorkerEvent>,
    opening: Option<String>,
) -> anyhow::Result<()> {
    if let Some(text) = opening {
        send_message(app, screen, &text);
    }

    loop {
        while let Ok(event) = rx.try_recv() {
            let applied = app.dispatcher.apply(&mut app.orchestrator, event);
            render_applied(app, screen, applied);
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                CEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    handle_key(app, screen, key.code, key.modifiers)
                }
                CEvent::Paste(text) => handle_paste(screen, &text),
                CEvent::Resize(..) => screen.refresh(),
                _ => {}
            }
        }

        if app.quit {
            break;
        }
        if screen.is_running {
            screen.spinner_tick = screen.spinner_tick.wrapping_add(1);
            screen.refresh();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    Ok(())
}

// ── Exchange flow ─────────────────────────────────────────────────────────────

fn send_message(app: &mut App, screen: &mut Screen, text: &str) {
    let Some(turn) = app.dispatcher.send(&mut app.orchestrator, text) else {
        return;
    };
    screen.emit(&format_turn(&turn, false));
    sync_status(app, screen);
}

fn render_applied(app: &App, screen: &mut Screen, applied: Applied) {
    match applied {
        Applied::Replied { turn, degraded } => {
            screen.emit(&format_turn(&turn, degraded));
            sync_status(app, screen);
        }
        Applied::Merged { changed } => {
            sync_status(app, screen);
            if changed {
                screen.emit(&format_insights_digest(app.orchestrator.state()));
            }
        }
        Applied::Dropped => {}
    }
}

/// Spinner and status text follow the orchestrator phase.
fn sync_status(app: &App, screen: &mut Screen) {
    let label = match app.orchestrator.phase() {
        Phase::Idle => None,
        Phase::AwaitingReply => Some("Thinking..."),
        Phase::AwaitingSummary => Some("Updating insights..."),
    };
    screen.is_running = label.is_some();
    screen.status = label.unwrap_or_default().to_string();
    screen.refresh();
}

// ── Key handling ──────────────────────────────────────────────────────────────

fn handle_key(app: &mut App, screen: &mut Screen, key: KeyCode, modifiers: KeyModifiers) {
    if modifiers.contains(KeyModifiers::CONTROL) {
        match key {
            KeyCode::Char('c') => app.quit = true,
            KeyCode::Char('n') => advance_stage(app, screen),
            _ => {}
        }
        return;
    }

    match key {
        KeyCode::Enter => submit_input(app, screen),
        KeyCode::Esc => {
            if screen.input.is_empty() {
                app.quit = true;
            } else {
                screen.input.clear();
                screen.refresh();
            }
        }
        KeyCode::Backspace => {
            screen.input.pop();
            screen.refresh();
        }
        KeyCode::Char(c) if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT => {
            screen.input.push(c);
            screen.refresh();
        }
        _ => {}
    }
}

fn handle_paste(screen: &mut Screen, pasted: &str) {
    let normalized = pasted.replace("\r\n", "\n").replace('\r', "\n");
    screen.input.push_str(&normalized);
    screen.refresh();
}

fn submit_input(app: &mut App, screen: &mut Screen) {
    let text = screen.input.trim().to_string();
    if text.is_empty() {
        return;
    }

    if let Some(command) = parse_command(&text) {
        screen.input.clear();
        run_command(app, screen, command);
        return;
    }

    if !app.orchestrator.is_idle() {
        // Keep the draft; only one exchange runs at a time.
        screen.status = "Still working on the last message...".to_string();
        screen.refresh();
        return;
    }
    screen.input.clear();
    send_message(app, screen, &text);
}

fn run_command(app: &mut App, screen: &mut Screen, command: Command) {
    match command {
        Command::Next => advance_stage(app, screen),
        Command::Insights => screen.emit(&format_insights(app.orchestrator.state())),
        Command::Steps => screen.emit(&format_steps(app.orchestrator.stage())),
        Command::Help => screen.emit(&format_help()),
        Command::Quit => app.quit = true,
        Command::Reset => {
            let fresh = app.orchestrator.conversation().is_empty()
                && app.orchestrator.stage() == Stage::default();
            if fresh {
                screen.emit(&["  Nothing to reset yet.".grey().to_string()]);
            } else if app.orchestrator.reset() {
                screen.stage = app.orchestrator.stage();
                screen.status.clear();
                screen.emit(&["  Session cleared.".grey().to_string(), String::new()]);
                screen.emit(&format_briefing());
            } else {
                screen.emit(&[format!(
                    "  {}",
                    "Wait for the current reply before resetting.".dark_yellow()
                )]);
            }
        }
    }
}

fn advance_stage(app: &mut App, screen: &mut Screen) {
    if app.orchestrator.advance_stage() {
        let stage = app.orchestrator.stage();
        screen.stage = stage;
        screen.emit(&format_stage_advanced(stage));
    } else {
        screen.emit(&format_already_final());
    }
}

/// Slash commands. Unknown `/words` (paths, typos) are sent as messages.
fn parse_command(text: &str) -> Option<Command> {
    let rest = text.trim().strip_prefix('/')?;
    let mut words = rest.split_whitespace();
    let name = words.next()?.to_ascii_lowercase();
    if words.next().is_some() {
        return None;
    }
    match name.as_str() {
        "next" => Some(Command::Next),
        "insights" => Some(Command::Insights),
        "steps" => Some(Command::Steps),
        "reset" => Some(Command::Reset),
        "help" | "?" => Some(Command::Help),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}
