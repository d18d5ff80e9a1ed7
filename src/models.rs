//! Data models for the interval timer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Completed work sessions per day when no goal has been set.
pub const DEFAULT_DAILY_GOAL: u32 = 8;

/// Rejected user-supplied configuration. The previous state is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be a positive number of seconds")]
    NonPositiveDuration { field: &'static str },
    #[error("{field} is too large")]
    DurationOverflow { field: &'static str },
    #[error("cycle count must be at least 1")]
    InvalidCycleCount,
    #[error("daily goal must be a positive number")]
    InvalidDailyGoal,
}

/// Kind of the session currently counting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Work,
    ShortBreak,
    LongBreak,
}

impl Mode {
    /// Translation key of the label shown next to the countdown.
    pub fn label_key(self) -> &'static str {
        match self {
            Self::Work => "timer.work",
            Self::ShortBreak => "timer.break",
            Self::LongBreak => "timer.longBreak",
        }
    }
}

/// User-configurable settings. Serialized with the field names the
/// stored record has always used; all durations are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(rename = "workTime")]
    pub work_secs: u32,
    #[serde(rename = "breakTime")]
    pub short_break_secs: u32,
    #[serde(rename = "longBreakTime")]
    pub long_break_secs: u32,
    /// Number of work sessions before a long break.
    #[serde(rename = "cycleCount")]
    pub cycles_before_long_break: u32,
    #[serde(rename = "notificationEnabled", default = "enabled")]
    pub notifications_enabled: bool,
    #[serde(rename = "soundEnabled", default = "enabled")]
    pub sound_enabled: bool,
    #[serde(rename = "todayGoal", default = "default_goal")]
    pub daily_goal: u32,
}

fn enabled() -> bool {
    true
}

fn default_goal() -> u32 {
    DEFAULT_DAILY_GOAL
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_secs: 25 * 60,
            short_break_secs: 5 * 60,
            long_break_secs: 15 * 60,
            cycles_before_long_break: 4,
            notifications_enabled: true,
            sound_enabled: true,
            daily_goal: DEFAULT_DAILY_GOAL,
        }
    }
}

impl Settings {
    /// Checks every field a session depends on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, secs) in [
            ("work time", self.work_secs),
            ("break time", self.short_break_secs),
            ("long break time", self.long_break_secs),
        ] {
            if secs == 0 {
                return Err(ValidationError::NonPositiveDuration { field });
            }
        }
        if self.cycles_before_long_break == 0 {
            return Err(ValidationError::InvalidCycleCount);
        }
        if self.daily_goal == 0 {
            return Err(ValidationError::InvalidDailyGoal);
        }
        Ok(())
    }

    /// Length of a fresh session of the given kind.
    pub fn duration_for(&self, mode: Mode) -> u32 {
        match mode {
            Mode::Work => self.work_secs,
            Mode::ShortBreak => self.short_break_secs,
            Mode::LongBreak => self.long_break_secs,
        }
    }
}

/// Converts a user-entered minute count into seconds.
pub fn minutes_to_secs(field: &'static str, minutes: i64) -> Result<u32, ValidationError> {
    if minutes <= 0 {
        return Err(ValidationError::NonPositiveDuration { field });
    }
    minutes
        .checked_mul(60)
        .and_then(|secs| u32::try_from(secs).ok())
        .ok_or(ValidationError::DurationOverflow { field })
}

/// Runtime session state, owned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub mode: Mode,
    pub remaining_secs: u32,
    /// Work session in progress within the current cycle, 1-based.
    pub current_cycle: u32,
    pub running: bool,
    pub completed_today: u32,
    /// Local calendar day `completed_today` belongs to.
    pub date: NaiveDate,
    /// Whether the goal-reached event already fired for `date`.
    pub goal_announced: bool,
}

impl Session {
    /// A fresh work session for the given day.
    pub fn new(settings: &Settings, summary: SessionSummary) -> Self {
        Self {
            mode: Mode::Work,
            remaining_secs: settings.work_secs,
            current_cycle: 1,
            running: false,
            completed_today: summary.completed_today,
            date: summary.date,
            goal_announced: summary.completed_today >= settings.daily_goal,
        }
    }
}

/// Durable part of the session: today's completion count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub date: NaiveDate,
    pub completed_today: u32,
}

/// Per-day completion record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyStat {
    pub count: u32,
    pub date: NaiveDate,
}

impl DailyStat {
    pub fn new(date: NaiveDate, count: u32) -> Self {
        Self { count, date }
    }
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub mode: Mode,
    pub remaining_secs: u32,
    pub total_secs: u32,
    pub current_cycle: u32,
    pub cycles_before_long_break: u32,
    pub completed_today: u32,
    pub daily_goal: u32,
    pub running: bool,
}

impl Snapshot {
    /// Returns the progress (0.0 to 1.0) through the current session.
    pub fn progress_percent(&self) -> f32 {
        if self.total_secs == 0 {
            return 1.0;
        }
        (1.0 - self.remaining_secs as f32 / self.total_secs as f32).clamp(0.0, 1.0)
    }
}
