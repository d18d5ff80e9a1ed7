//! SQLite persistence layer for settings and daily stats.
//!
//! Records are JSON documents stored under string keys, so the stored
//! shapes stay stable whatever the storage medium. Reads never fail:
//! unavailable storage and corrupt records are logged and treated as
//! absent.

use crate::models::{DailyStat, SessionSummary, Settings, DEFAULT_DAILY_GOAL};
use chrono::{Days, NaiveDate};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const SETTINGS_KEY: &str = "pomodoroSettings";
const LANGUAGE_KEY: &str = "appLanguage";
const DB_PATH_ENV: &str = "POMOCYCLE_DB";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to create database directory")]
    DirectoryCreation,
}

fn stat_key(date: NaiveDate) -> String {
    format!("stats-{}", date.format("%Y-%m-%d"))
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens the database at the default location, initializing tables if needed.
    pub fn open_default() -> Result<Self, DatabaseError> {
        Self::open(&Self::db_path())
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| DatabaseError::DirectoryCreation)?;
        }

        let conn = Connection::open(path)?;
        Self::initialize_tables(&conn)?;
        debug!(path = %path.display(), "database opened");

        Ok(Self { conn })
    }

    /// Creates an in-memory database. Nothing written survives the process.
    pub fn new_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_tables(&conn)?;
        Ok(Self { conn })
    }

    fn initialize_tables(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    /// `POMOCYCLE_DB` if set, otherwise the platform data directory.
    pub fn db_path() -> PathBuf {
        if let Some(path) = std::env::var_os(DB_PATH_ENV) {
            return PathBuf::from(path);
        }
        ProjectDirs::from("com", "pomocycle", "Pomocycle")
            .map(|dirs| dirs.data_dir().join("pomocycle.db"))
            .unwrap_or_else(|| PathBuf::from("pomocycle.db"))
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn
            .query_row("SELECT value FROM records WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put_raw(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO records (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Reads and decodes a record, treating every failure as absence.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.get_raw(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "storage unavailable, using defaults");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "skipping corrupt record");
                None
            }
        }
    }

    /// Loads settings and today's completion count.
    pub fn load(&self, today: NaiveDate) -> (Settings, SessionSummary) {
        let settings = self.load_settings();
        let summary = SessionSummary {
            date: today,
            completed_today: self.load_daily_stat(today).unwrap_or(0),
        };
        (settings, summary)
    }

    /// Loads settings, returning defaults if absent, corrupt or invalid.
    pub fn load_settings(&self) -> Settings {
        let Some(mut settings) = self.get_json::<Settings>(SETTINGS_KEY) else {
            return Settings::default();
        };

        if settings.daily_goal == 0 {
            settings.daily_goal = DEFAULT_DAILY_GOAL;
        }
        match settings.validate() {
            Ok(()) => settings,
            Err(e) => {
                warn!(error = %e, "stored settings are invalid, using defaults");
                Settings::default()
            }
        }
    }

    /// Saves settings to the database.
    pub fn save_settings(&self, settings: &Settings) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(settings)?;
        self.put_raw(SETTINGS_KEY, &json)
    }

    /// Writes the completion count for a day, creating the record if needed.
    pub fn save_daily_stat(&self, date: NaiveDate, count: u32) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(&DailyStat::new(date, count))?;
        self.put_raw(&stat_key(date), &json)
    }

    /// Gets the completion count recorded for a day.
    pub fn load_daily_stat(&self, date: NaiveDate) -> Option<u32> {
        self.get_json::<DailyStat>(&stat_key(date))
            .map(|stat| stat.count)
    }

    /// Returns one entry per day for the `window_days` days ending at
    /// `today`, oldest first. Days without a record count as zero.
    pub fn load_recent_stats(&self, window_days: u32, today: NaiveDate) -> Vec<DailyStat> {
        (0..window_days)
            .rev()
            .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
            .map(|date| DailyStat::new(date, self.load_daily_stat(date).unwrap_or(0)))
            .collect()
    }

    /// Loads the language code chosen by the user, if any.
    pub fn load_language(&self) -> Option<String> {
        match self.get_raw(LANGUAGE_KEY) {
            Ok(lang) => lang,
            Err(e) => {
                warn!(error = %e, "storage unavailable, detecting language");
                None
            }
        }
    }

    pub fn save_language(&self, lang: &str) -> Result<(), DatabaseError> {
        self.put_raw(LANGUAGE_KEY, lang)
    }

    /// Makes every subsequent read and write fail.
    #[cfg(test)]
    pub fn break_storage(&self) {
        self.conn.execute_batch("DROP TABLE records;").unwrap();
    }

    #[cfg(test)]
    pub fn put_raw_for_test(&self, key: &str, value: &str) {
        self.put_raw(key, value).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    #[test]
    fn test_database_creation() {
        let db = Database::new_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_settings_save_and_load() {
        let db = Database::new_in_memory().unwrap();

        // Default settings should be returned when nothing is saved
        assert_eq!(db.load_settings(), Settings::default());

        let custom_settings = Settings {
            work_secs: 30 * 60,
            short_break_secs: 10 * 60,
            long_break_secs: 20 * 60,
            cycles_before_long_break: 3,
            notifications_enabled: true,
            sound_enabled: false,
            daily_goal: 6,
        };
        db.save_settings(&custom_settings).unwrap();

        assert_eq!(db.load_settings(), custom_settings);
    }

    #[test]
    fn test_settings_overwrite() {
        let db = Database::new_in_memory().unwrap();

        let settings1 = Settings {
            work_secs: 1800,
            ..Settings::default()
        };
        db.save_settings(&settings1).unwrap();

        let settings2 = Settings {
            work_secs: 2700,
            ..Settings::default()
        };
        db.save_settings(&settings2).unwrap();

        assert_eq!(db.load_settings().work_secs, 2700);
    }

    #[test]
    fn test_settings_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pomocycle.db");

        let settings = Settings {
            long_break_secs: 1200,
            daily_goal: 10,
            ..Settings::default()
        };
        {
            let db = Database::open(&path).unwrap();
            db.save_settings(&settings).unwrap();
            db.save_daily_stat(date(3, 1), 5).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let (loaded, summary) = db.load(date(3, 1));
        assert_eq!(loaded, settings);
        assert_eq!(summary.completed_today, 5);
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        let db = Database::new_in_memory().unwrap();

        db.put_raw_for_test(SETTINGS_KEY, "not json at all");
        assert_eq!(db.load_settings(), Settings::default());

        db.put_raw_for_test(SETTINGS_KEY, r#"{"workTime":"soon"}"#);
        assert_eq!(db.load_settings(), Settings::default());

        db.put_raw_for_test(SETTINGS_KEY, "[1, 2, 3]");
        assert_eq!(db.load_settings(), Settings::default());
    }

    #[test]
    fn test_invalid_stored_settings_fall_back_to_defaults() {
        let db = Database::new_in_memory().unwrap();
        db.put_raw_for_test(
            SETTINGS_KEY,
            r#"{"workTime":0,"breakTime":300,"longBreakTime":900,"cycleCount":4}"#,
        );
        assert_eq!(db.load_settings(), Settings::default());
    }

    #[test]
    fn test_zero_goal_uses_default_goal() {
        let db = Database::new_in_memory().unwrap();
        db.put_raw_for_test(
            SETTINGS_KEY,
            r#"{"workTime":600,"breakTime":60,"longBreakTime":900,"cycleCount":2,"todayGoal":0}"#,
        );
        let settings = db.load_settings();
        assert_eq!(settings.work_secs, 600);
        assert_eq!(settings.daily_goal, DEFAULT_DAILY_GOAL);
    }

    #[test]
    fn test_daily_stat_for_nonexistent_date() {
        let db = Database::new_in_memory().unwrap();
        assert_eq!(db.load_daily_stat(date(1, 15)), None);
    }

    #[test]
    fn test_daily_stat_save_and_load() {
        let db = Database::new_in_memory().unwrap();
        db.save_daily_stat(date(1, 15), 3).unwrap();
        db.save_daily_stat(date(1, 15), 4).unwrap();

        assert_eq!(db.load_daily_stat(date(1, 15)), Some(4));
        assert_eq!(db.load_daily_stat(date(1, 16)), None);
    }

    #[test]
    fn test_daily_stat_record_shape() {
        let db = Database::new_in_memory().unwrap();
        db.save_daily_stat(date(1, 15), 3).unwrap();

        let raw = db.get_raw("stats-2024-01-15").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["count"], 3);
        assert_eq!(value["date"], "2024-01-15");
    }

    #[test]
    fn test_corrupt_daily_stat_is_absent() {
        let db = Database::new_in_memory().unwrap();
        db.put_raw_for_test("stats-2024-01-15", "{broken");
        assert_eq!(db.load_daily_stat(date(1, 15)), None);

        db.put_raw_for_test("stats-2024-01-16", r#"{"date":"2024-01-16"}"#);
        assert_eq!(db.load_daily_stat(date(1, 16)), None);
    }

    #[test]
    fn test_load_recent_stats() {
        let db = Database::new_in_memory().unwrap();
        db.save_daily_stat(date(2, 27), 2).unwrap();
        db.save_daily_stat(date(3, 1), 6).unwrap();
        db.save_daily_stat(date(3, 4), 1).unwrap();
        // Outside the window: ignored, not purged.
        db.save_daily_stat(date(2, 20), 9).unwrap();

        let stats = db.load_recent_stats(7, date(3, 4));
        let dates: Vec<_> = stats.iter().map(|s| s.date).collect();
        let counts: Vec<_> = stats.iter().map(|s| s.count).collect();

        assert_eq!(dates.first(), Some(&date(2, 27)));
        assert_eq!(dates.last(), Some(&date(3, 4)));
        assert_eq!(dates.len(), 7);
        assert_eq!(counts, vec![2, 0, 0, 6, 0, 0, 1]);
        assert_eq!(db.load_daily_stat(date(2, 20)), Some(9));
    }

    #[test]
    fn test_load_recent_stats_empty_window() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.load_recent_stats(0, date(3, 4)).is_empty());
    }

    #[test]
    fn test_unavailable_storage_falls_back() {
        let db = Database::new_in_memory().unwrap();
        db.save_daily_stat(date(1, 15), 3).unwrap();
        db.break_storage();

        let (settings, summary) = db.load(date(1, 15));
        assert_eq!(settings, Settings::default());
        assert_eq!(summary.completed_today, 0);
        assert!(db.save_settings(&Settings::default()).is_err());
        assert!(db.save_daily_stat(date(1, 15), 4).is_err());
        assert_eq!(db.load_language(), None);
    }

    #[test]
    fn test_language_save_and_load() {
        let db = Database::new_in_memory().unwrap();
        assert_eq!(db.load_language(), None);
        db.save_language("ja").unwrap();
        assert_eq!(db.load_language().as_deref(), Some("ja"));
    }
}
