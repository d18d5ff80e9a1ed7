//! Translated UI strings.
//!
//! Keys are dotted paths into a nested JSON table (`"timer.work"`). A key
//! that does not resolve to a string is returned unchanged so missing
//! translations stay visible.

use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

pub const SUPPORTED_LANGUAGES: [&str; 12] = [
    "ko", "en", "ja", "zh", "es", "pt", "id", "tr", "de", "fr", "hi", "ru",
];

/// Used when neither the saved choice nor the environment names a supported language.
pub const DEFAULT_LANGUAGE: &str = "ko";

const EN: &str = include_str!("../locales/en.json");
const KO: &str = include_str!("../locales/ko.json");
const JA: &str = include_str!("../locales/ja.json");

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LanguageError {
    #[error("language '{0}' is not supported")]
    Unsupported(String),
}

struct Locale {
    lang: &'static str,
    table: Value,
}

/// Shared handle to the active translation table. Clones see language changes.
#[derive(Clone)]
pub struct Translator {
    locale: Rc<RefCell<Locale>>,
}

impl Translator {
    /// Creates a translator for `lang`, or the default language if unsupported.
    pub fn new(lang: &str) -> Self {
        let lang = supported(lang).unwrap_or(DEFAULT_LANGUAGE);
        Self {
            locale: Rc::new(RefCell::new(Locale {
                lang,
                table: load_table(lang),
            })),
        }
    }

    /// Looks up `key`, returning the key itself when unresolved.
    pub fn translate(&self, key: &str) -> String {
        let locale = self.locale.borrow();
        match lookup(&locale.table, key) {
            Some(text) => text.to_string(),
            None => {
                debug!(key, lang = locale.lang, "missing translation");
                key.to_string()
            }
        }
    }

    /// Switches every clone of this translator to `lang`.
    pub fn set_language(&self, lang: &str) -> Result<(), LanguageError> {
        let lang = supported(lang).ok_or_else(|| LanguageError::Unsupported(lang.to_string()))?;
        let table = load_table(lang);
        *self.locale.borrow_mut() = Locale { lang, table };
        Ok(())
    }

    pub fn language(&self) -> &'static str {
        self.locale.borrow().lang
    }
}

fn supported(lang: &str) -> Option<&'static str> {
    let lang = lang.trim().to_ascii_lowercase();
    SUPPORTED_LANGUAGES.iter().copied().find(|l| *l == lang)
}

/// Parses the embedded table for `lang`. Languages without their own table use English.
fn load_table(lang: &str) -> Value {
    let source = match lang {
        "ko" => KO,
        "ja" => JA,
        _ => EN,
    };
    match serde_json::from_str(source) {
        Ok(table) => table,
        Err(e) => {
            warn!(lang, error = %e, "translation table is corrupt, falling back to English");
            serde_json::from_str(EN).unwrap_or(Value::Null)
        }
    }
}

/// Resolves a dotted path to a string leaf.
pub fn lookup<'a>(table: &'a Value, key: &str) -> Option<&'a str> {
    key.split('.')
        .try_fold(table, |node, part| node.get(part))?
        .as_str()
}

/// Extracts a supported language from a POSIX locale such as `ja_JP.UTF-8`.
pub fn language_from_locale(locale: &str) -> Option<&'static str> {
    let prefix = locale.split(['_', '-', '.', '@']).next()?;
    supported(prefix)
}

/// Picks the UI language: saved choice, then environment, then the default.
pub fn detect_language(saved: Option<&str>) -> &'static str {
    if let Some(lang) = saved.and_then(supported) {
        return lang;
    }

    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .and_then(|value| language_from_locale(&value))
        .unwrap_or(DEFAULT_LANGUAGE)
}

/// Native name of a language, for the language list.
pub fn language_name(lang: &str) -> &str {
    match lang {
        "ko" => "한국어",
        "en" => "English",
        "ja" => "日本語",
        "zh" => "中文",
        "es" => "Español",
        "pt" => "Português",
        "id" => "Bahasa Indonesia",
        "tr" => "Türkçe",
        "de" => "Deutsch",
        "fr" => "Français",
        "hi" => "हिन्दी",
        "ru" => "Русский",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_nested_key() {
        let t = Translator::new("en");
        assert_eq!(t.translate("timer.work"), "Focus");
        assert_eq!(t.translate("notifications.breakComplete"), "Break is over. Ready to focus again?");
    }

    #[test]
    fn test_missing_key_returns_key() {
        let t = Translator::new("en");
        assert_eq!(t.translate("timer.nope"), "timer.nope");
        assert_eq!(t.translate("nope"), "nope");
        assert_eq!(t.translate(""), "");
    }

    #[test]
    fn test_non_leaf_key_returns_key() {
        let t = Translator::new("en");
        assert_eq!(t.translate("timer"), "timer");
        assert_eq!(t.translate("timer.work.deeper"), "timer.work.deeper");
    }

    #[test]
    fn test_unsupported_language_uses_default() {
        let t = Translator::new("xx");
        assert_eq!(t.language(), DEFAULT_LANGUAGE);
        assert_eq!(t.translate("timer.work"), "집중");
    }

    #[test]
    fn test_language_without_table_uses_english() {
        let t = Translator::new("de");
        assert_eq!(t.language(), "de");
        assert_eq!(t.translate("timer.longBreak"), "Long Break");
    }

    #[test]
    fn test_set_language_updates_clones() {
        let t = Translator::new("en");
        let shared = t.clone();

        t.set_language("ja").unwrap();
        assert_eq!(shared.language(), "ja");
        assert_eq!(shared.translate("timer.work"), "集中");
    }

    #[test]
    fn test_set_language_rejects_unsupported() {
        let t = Translator::new("en");
        assert_eq!(
            t.set_language("klingon"),
            Err(LanguageError::Unsupported("klingon".to_string()))
        );
        assert_eq!(t.language(), "en");
    }

    #[test]
    fn test_language_from_locale() {
        assert_eq!(language_from_locale("ja_JP.UTF-8"), Some("ja"));
        assert_eq!(language_from_locale("en-US"), Some("en"));
        assert_eq!(language_from_locale("de"), Some("de"));
        assert_eq!(language_from_locale("C.UTF-8"), None);
        assert_eq!(language_from_locale(""), None);
    }

    #[test]
    fn test_detect_language_prefers_saved_choice() {
        assert_eq!(detect_language(Some("fr")), "fr");
    }

    #[test]
    fn test_all_tables_share_keys() {
        for key in [
            "app.title",
            "timer.work",
            "timer.break",
            "timer.longBreak",
            "notifications.workComplete",
            "notifications.breakComplete",
            "messages.longBreakTime",
            "messages.goalReached",
            "stats.weekly",
            "days.sun",
        ] {
            for lang in ["en", "ko", "ja"] {
                let table = load_table(lang);
                assert!(lookup(&table, key).is_some(), "{lang} is missing {key}");
            }
        }
    }

    #[test]
    fn test_language_name() {
        assert_eq!(language_name("ja"), "日本語");
        assert_eq!(language_name("xx"), "xx");
    }
}
