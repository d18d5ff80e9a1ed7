//! Pomocycle - a headless work/break interval timer.
//!
//! Counts down focus sessions and breaks in the terminal, keeps a daily
//! tally with a weekly history, and announces finished sessions with a tone
//! and a desktop notification. Type `help` for the commands.
//!
//! `--headless` disables the tone and desktop notifications. `--start`
//! starts the first session right away. The timer keeps running after stdin
//! closes; interrupt the process to stop it.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::{info, warn};

mod audio;
mod engine;
mod event;
mod i18n;
mod models;
mod notifications;
mod persistence;
mod timer;
mod wake_lock;

use engine::{Engine, EngineParts, LocalCalendar, TickOutcome};
use event::EventResult;
use i18n::Translator;
use notifications::{DesktopNotifier, Notifier, NullNotifier};
use persistence::Database;
use timer::{ThreadTicker, TimerMessage};

/// Everything the main loop reacts to.
enum AppMessage {
    Timer(TimerMessage),
    Input(String),
    InputClosed,
}

impl From<TimerMessage> for AppMessage {
    fn from(message: TimerMessage) -> Self {
        Self::Timer(message)
    }
}

/// Initializes the tracing subscriber. Logs go to stderr so they do not
/// interleave with the status line.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Opens the durable store, falling back to memory when it is unavailable.
fn open_database() -> Result<Database, persistence::DatabaseError> {
    match Database::open_default() {
        Ok(db) => Ok(db),
        Err(e) => {
            warn!(
                error = %e,
                path = %Database::db_path().display(),
                "storage unavailable, nothing will be saved"
            );
            Database::new_in_memory()
        }
    }
}

/// Forwards stdin lines to the main loop.
fn spawn_input_reader(tx: Sender<AppMessage>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(AppMessage::Input(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to read input");
                    break;
                }
            }
        }
        let _ = tx.send(AppMessage::InputClosed);
    });
}

/// Redraws the status line in place.
fn render(engine: &mut Engine, translator: &Translator) {
    engine.roll_day_if_needed();
    print!(
        "{}",
        timer::redraw_line(&timer::format_status(&engine.snapshot(), translator))
    );
    if let Err(e) = io::stdout().flush() {
        warn!(error = %e, "failed to draw status line");
    }
}

/// Prints a message above the status line.
fn say(text: &str) {
    println!("{}", timer::redraw_line(text));
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let db = open_database()?;
    let translator = Translator::new(i18n::detect_language(db.load_language().as_deref()));

    // Ticks and input share one channel so the engine is only touched here.
    let (tx, rx) = mpsc::channel();
    spawn_input_reader(tx.clone());

    let has_flag = |flag: &str| std::env::args().any(|arg| arg == flag);
    let notifier: Box<dyn Notifier> = if has_flag("--headless") {
        Box::new(NullNotifier)
    } else {
        Box::new(DesktopNotifier::new(translator.clone()))
    };

    let mut engine = Engine::new(EngineParts {
        db,
        notifier,
        scheduler: Box::new(ThreadTicker::new(tx)),
        wake_lock: wake_lock::platform(),
        calendar: Box::new(LocalCalendar),
    });
    engine.request_notification_permission();
    if has_flag("--start") {
        engine.start();
    }

    say(&translator.translate("app.title"));
    render(&mut engine, &translator);

    for message in rx {
        match message {
            AppMessage::Timer(TimerMessage::Tick { generation }) => {
                match engine.on_tick(generation) {
                    TickOutcome::Ignored => {}
                    TickOutcome::Counted => render(&mut engine, &translator),
                    TickOutcome::Completed(completion) => {
                        say(&format!(
                            "{} ✓ → {}",
                            translator.translate(completion.finished.label_key()),
                            translator.translate(completion.next.label_key())
                        ));
                        if completion.goal_reached {
                            say(&translator.translate("messages.goalReached"));
                        }
                        render(&mut engine, &translator);
                    }
                }
            }
            AppMessage::Input(line) => {
                let result = event::parse_command(&line)
                    .and_then(|command| event::handle_command(&mut engine, &translator, command));
                match result {
                    Ok(EventResult::Quit) => break,
                    Ok(EventResult::StateChanged) => render(&mut engine, &translator),
                    Ok(EventResult::Output(text)) => {
                        say(&text);
                        render(&mut engine, &translator);
                    }
                    Err(e) => {
                        print!("{}", timer::CLEAR_LINE);
                        eprintln!("{}", e);
                        render(&mut engine, &translator);
                    }
                }
            }
            AppMessage::InputClosed => {
                info!("input closed, timer keeps running");
            }
        }
    }

    engine.pause();
    println!();
    Ok(())
}
