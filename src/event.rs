//! Command input handling.
//!
//! Each line typed by the user is parsed into a [`Command`] and applied to
//! the engine. Malformed input is rejected before the engine is touched.

use crate::engine::Engine;
use crate::i18n::{self, LanguageError, Translator, SUPPORTED_LANGUAGES};
use crate::models::{minutes_to_secs, Settings, ValidationError};
use crate::timer;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}' (try: help)")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
    #[error("unknown setting '{0}'")]
    UnknownSetting(String),
    #[error("expected on/off, got '{0}'")]
    InvalidSwitch(String),
    #[error("expected key=value, got '{0}'")]
    MalformedAssignment(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Language(#[from] LanguageError),
}

/// A single change requested by `config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    WorkMinutes(i64),
    BreakMinutes(i64),
    LongBreakMinutes(i64),
    Cycles(i64),
    Sound(bool),
    Notifications(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Toggle,
    Reset,
    Goal(i64),
    Configure(Vec<SettingChange>),
    Stats,
    Language(Option<String>),
    Status,
    Help,
    Quit,
}

/// Result of handling a command.
#[derive(Debug, Clone, PartialEq)]
pub enum EventResult {
    /// User requested quit.
    Quit,
    /// State changed, status line needs redrawing.
    StateChanged,
    /// Text to print as is.
    Output(String),
}

const HELP: &str = "\
commands:
  start | pause | toggle | reset
  goal <n>
  config work=<min> break=<min> long=<min> cycles=<n> sound=on|off notify=on|off
  stats
  lang [code]
  status | help | quit";

/// Parses one line of input.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(Command::Status);
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "start" | "resume" => Command::Start,
        "pause" => Command::Pause,
        "toggle" | "space" => Command::Toggle,
        "reset" => Command::Reset,
        "goal" => {
            let value = words.next().ok_or(CommandError::MissingArgument("goal"))?;
            Command::Goal(parse_number(value)?)
        }
        "config" => {
            let changes = words.map(parse_setting).collect::<Result<Vec<_>, _>>()?;
            if changes.is_empty() {
                return Err(CommandError::MissingArgument("config"));
            }
            Command::Configure(changes)
        }
        "stats" => Command::Stats,
        "lang" => Command::Language(words.next().map(str::to_string)),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn parse_number(value: &str) -> Result<i64, CommandError> {
    value
        .parse()
        .map_err(|_| CommandError::InvalidNumber(value.to_string()))
}

fn parse_switch(value: &str) -> Result<bool, CommandError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(CommandError::InvalidSwitch(value.to_string())),
    }
}

fn parse_setting(assignment: &str) -> Result<SettingChange, CommandError> {
    let (key, value) = assignment
        .split_once('=')
        .ok_or_else(|| CommandError::MalformedAssignment(assignment.to_string()))?;

    let change = match key {
        "work" => SettingChange::WorkMinutes(parse_number(value)?),
        "break" => SettingChange::BreakMinutes(parse_number(value)?),
        "long" => SettingChange::LongBreakMinutes(parse_number(value)?),
        "cycles" => SettingChange::Cycles(parse_number(value)?),
        "sound" => SettingChange::Sound(parse_switch(value)?),
        "notify" => SettingChange::Notifications(parse_switch(value)?),
        other => return Err(CommandError::UnknownSetting(other.to_string())),
    };
    Ok(change)
}

/// Applies `changes` to a copy of `current`.
pub fn apply_changes(
    current: &Settings,
    changes: &[SettingChange],
) -> Result<Settings, ValidationError> {
    let mut settings = current.clone();
    for change in changes {
        match *change {
            SettingChange::WorkMinutes(m) => settings.work_secs = minutes_to_secs("work time", m)?,
            SettingChange::BreakMinutes(m) => {
                settings.short_break_secs = minutes_to_secs("break time", m)?
            }
            SettingChange::LongBreakMinutes(m) => {
                settings.long_break_secs = minutes_to_secs("long break time", m)?
            }
            SettingChange::Cycles(n) => {
                settings.cycles_before_long_break = u32::try_from(n)
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or(ValidationError::InvalidCycleCount)?
            }
            SettingChange::Sound(on) => settings.sound_enabled = on,
            SettingChange::Notifications(on) => settings.notifications_enabled = on,
        }
    }
    Ok(settings)
}

/// Handles a command and updates the engine accordingly.
pub fn handle_command(
    engine: &mut Engine,
    translator: &Translator,
    command: Command,
) -> Result<EventResult, CommandError> {
    let result = match command {
        Command::Start => {
            engine.start();
            EventResult::StateChanged
        }
        Command::Pause => {
            engine.pause();
            EventResult::StateChanged
        }
        Command::Toggle => {
            engine.toggle();
            EventResult::StateChanged
        }
        Command::Reset => {
            engine.reset();
            EventResult::StateChanged
        }
        Command::Goal(n) => {
            let goal = u32::try_from(n).map_err(|_| ValidationError::InvalidDailyGoal)?;
            engine.set_daily_goal(goal)?;
            EventResult::Output(translator.translate("messages.goalSaved"))
        }
        Command::Configure(changes) => {
            let settings = apply_changes(engine.settings(), &changes)?;
            engine.update_configuration(settings)?;
            EventResult::Output(translator.translate("messages.settingsSaved"))
        }
        Command::Stats => {
            EventResult::Output(timer::format_weekly_chart(&engine.weekly_stats(), translator))
        }
        Command::Language(None) => EventResult::Output(language_list(translator.language())),
        Command::Language(Some(lang)) => {
            translator.set_language(&lang)?;
            if let Err(e) = engine.store().save_language(translator.language()) {
                warn!(error = %e, "failed to save language");
            }
            EventResult::Output(translator.translate("messages.languageChanged"))
        }
        Command::Status => EventResult::StateChanged,
        Command::Help => EventResult::Output(HELP.to_string()),
        Command::Quit => EventResult::Quit,
    };
    Ok(result)
}

fn language_list(current: &str) -> String {
    SUPPORTED_LANGUAGES
        .iter()
        .map(|lang| {
            let marker = if *lang == current { "*" } else { " " };
            format!("{} {} {}", marker, lang, i18n::language_name(lang))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
