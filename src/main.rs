mod app;
mod category;
mod cli;
mod collab;
mod config;
mod dataset;
mod error;
mod export;
mod filter;
mod fsguard;
mod input;
mod k8s;
mod loader;
mod locals;
mod model;
mod rows;
mod runtime;
mod ui;

use anyhow::{Context, Result};
use app::{App, Message};
use clap::Parser;
use cli::CliArgs;
use collab::{SystemClipboard, SystemClock};
use config::{LogFormat, Settings};
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use k8s::ClusterActions;
use loader::RepoLoader;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use runtime::Runtime;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const TICK: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let settings = config::load(&args).context("failed to load configuration")?;
    init_tracing(&settings)?;
    info!(
        repo = %settings.repo_path.display(),
        env = %settings.environment,
        config = ?settings.source,
        "starting"
    );

    let dataset = loader::load_dataset_sync(&settings.repo_path, &settings.environment)
        .with_context(|| format!("failed to load {}", settings.environment))?;
    let export_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let mut app = App::new(dataset, settings.category, &settings.filter, export_dir);

    run(&mut app, &settings).await
}

fn init_tracing(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_new(settings.effective_log_level())
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false);

    // The terminal owns stdout, so logs go to a file or nowhere.
    match (&settings.log_file, settings.log_format) {
        (Some(path), format) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let writer = Mutex::new(file);
            let _ = match format {
                LogFormat::Json => builder.json().with_writer(writer).try_init(),
                LogFormat::Text => builder.compact().with_writer(writer).try_init(),
            };
        }
        (None, _) => {
            let _ = builder.compact().with_writer(io::sink).try_init();
        }
    }

    Ok(())
}

async fn run(app: &mut App, settings: &Settings) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, settings).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(terminal: &mut TuiTerminal, app: &mut App, settings: &Settings) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let mut runtime = Runtime::new(
        Arc::new(RepoLoader),
        Arc::new(ClusterActions::new(
            settings.kubeconfig.clone(),
            settings.actions.clone(),
        )),
        Arc::new(Mutex::new(SystemClipboard)),
        Arc::new(SystemClock),
        settings.repo_path.clone(),
        settings.kubeconfig.clone(),
        tx,
    );

    let size = terminal.size().context("failed to read terminal size")?;
    app.handle(Message::WindowSize(size.width, size.height));
    let command = app.start();
    runtime.execute(command);

    let mut reader = EventStream::new();
    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.view_mode(), app.input_mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            runtime.execute(command);
                        }
                    }
                    Some(Ok(Event::Resize(width, height))) => {
                        let command = app.handle(Message::WindowSize(width, height));
                        runtime.execute(command);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                let command = app.handle(Message::Tick);
                runtime.execute(command);
            }
            maybe_message = rx.recv() => {
                if let Some(message) = maybe_message {
                    let command = app.handle(message);
                    runtime.execute(command);
                }
            }
        }
    }

    runtime.shutdown();
    Ok(())
}
