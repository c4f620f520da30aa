//! Taxdesk - a terminal console for the taxdesk backend.
//!
//! This application provides a keyboard-driven console for an office's
//! client registry and PER/DCOMP request tracking. It keeps the user signed
//! in by refreshing tokens ahead of expiry and re-validating the session
//! when the terminal regains focus.

mod app;
mod ui;

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use taxdesk_core::auth::ActivityEvent;
use taxdesk_core::Config;

use app::{App, AppState};
use ui::input::handle_input;
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

/// Log file name prefix; the appender adds the date
const LOG_FILE_NAME: &str = "taxdesk.log";

const USAGE: &str = "Usage: taxdesk [--login | --logout | --help]

  (no arguments)  start the console
  --login         sign in on the plain terminal and store the session
  --logout        sign out and remove the stored session";

/// What the command line asked for
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Console,
    Login,
    Logout,
    Help,
}

fn parse_command(arg: Option<&str>) -> std::result::Result<Command, String> {
    match arg {
        None => Ok(Command::Console),
        Some("--login") => Ok(Command::Login),
        Some("--logout") => Ok(Command::Logout),
        Some("--help") | Some("-h") => Ok(Command::Help),
        Some(other) => Err(other.to_string()),
    }
}

/// Initialize the tracing subscriber, writing to a daily log file.
/// The terminal belongs to the UI, so nothing is logged to stderr.
fn init_tracing(config: &Config) -> Result<WorkerGuard> {
    let log_dir = config.log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME));

    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=taxdesk_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Route panic messages into the log instead of the (raw mode) terminal
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let message = ui::boundary::panic_message(info.payload());
        error!(%location, %message, "Panic");
    }));
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let _log_guard = match init_tracing(&config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {:#}", e);
            None
        }
    };
    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    // Check for CLI commands. Return instead of process::exit so the log
    // guard still flushes.
    let args: Vec<String> = std::env::args().collect();
    match parse_command(args.get(1).map(String::as_str)) {
        Ok(Command::Console) => {}
        Ok(Command::Login) => return login_interactive(config).await.map(|()| ExitCode::SUCCESS),
        Ok(Command::Logout) => return logout(config).await.map(|()| ExitCode::SUCCESS),
        Ok(Command::Help) => {
            println!("{}", USAGE);
            return Ok(ExitCode::SUCCESS);
        }
        Err(other) => {
            warn!(argument = %other, "Unknown command line argument");
            eprintln!("Unknown argument: {}\n\n{}", other, USAGE);
            return Ok(ExitCode::from(2));
        }
    }

    info!("Taxdesk starting");

    let mut app = App::new(config)?;
    app.start().await;

    // Setup terminal
    install_panic_hook();
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Main loop
    let result = run_app(&mut terminal, &mut app).await;

    app.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        error!(error = %e, "Console exited with an error");
        eprintln!("Error: {}", e);
    }

    info!("Taxdesk shutting down");
    Ok(ExitCode::SUCCESS)
}

/// Interactive login on the plain terminal
async fn login_interactive(config: Config) -> Result<()> {
    let mut app = App::new(config)?;
    println!("\n=== Taxdesk Login ===\n");

    let email = match app.config.last_username.clone() {
        Some(last) => {
            let input = prompt(&format!("Email [{}]: ", last))?;
            if input.is_empty() {
                last
            } else {
                input
            }
        }
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    println!("\nAuthenticating...");
    let user = app
        .session
        .sign_in(&email, &password)
        .await
        .context("Login failed")?;

    app.config.last_username = Some(email.clone());
    app.config.save()?;

    match user {
        Some(user) => println!(
            "Signed in as {} ({})\n",
            user.display_name(),
            user.role.display_name()
        ),
        None => println!("Signed in as {}\n", email),
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Revoke and forget the stored session
async fn logout(config: Config) -> Result<()> {
    let app = App::new(config)?;
    app.session.initialize().await;
    app.session.logout().await;
    println!("Signed out.");
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        // Route guard first, so a screen is never drawn for an ended session
        app.check_auth_changes();

        // Draw UI
        terminal.draw(|f| render(f, app))?;

        // Poll for events with timeout to allow background updates
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    app.notify_activity(ActivityEvent::Interaction);

                    // Ctrl+C to quit
                    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                        return Ok(());
                    }

                    // Handle input
                    if handle_input(app, key).await? {
                        return Ok(());
                    }
                }
                Event::Mouse(_) => app.notify_activity(ActivityEvent::Interaction),
                Event::FocusGained => {
                    app.notify_activity(ActivityEvent::Visibility(true));
                    app.notify_activity(ActivityEvent::Focus);
                }
                Event::FocusLost => app.notify_activity(ActivityEvent::Visibility(false)),
                _ => {}
            }
        }

        // Check for completed background tasks
        app.check_background_tasks();

        // Check if we should quit
        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}
