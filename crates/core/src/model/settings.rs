use std::time::Duration;

use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

use crate::model::answer::lenient_i64;
use crate::model::ids::{FormId, SessionId};

/// Delay before a statically configured form redirect.
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_millis(2000);

/// Per-form behaviour switches embedded in the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizSettings {
    pub show_intro_screen: bool,
    pub auto_advance: bool,
    pub redirect_url: Option<Url>,
    pub redirect_delay: Duration,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            show_intro_screen: true,
            auto_advance: false,
            redirect_url: None,
            redirect_delay: DEFAULT_REDIRECT_DELAY,
        }
    }
}

impl QuizSettings {
    /// Reads the JSON settings blob. Unknown keys are ignored.
    ///
    /// Each key is read on its own: a key with an unusable value falls back
    /// to its default and is logged, the others still apply. A blob that is
    /// not a JSON object yields the defaults.
    #[must_use]
    pub fn from_json(payload: &str) -> Self {
        let defaults = Self::default();
        let payload = payload.trim();
        if payload.is_empty() {
            return defaults;
        }

        let map = match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!("ignoring quiz settings that are not a JSON object");
                return defaults;
            }
            Err(err) => {
                warn!(error = %err, "ignoring malformed quiz settings");
                return defaults;
            }
        };

        let show_intro_screen = setting(&map, "show_intro_screen", lenient_bool)
            .unwrap_or(defaults.show_intro_screen);
        let auto_advance =
            setting(&map, "auto_advance", lenient_bool).unwrap_or(defaults.auto_advance);
        let redirect_url = setting(&map, "redirect_url", redirect_setting).flatten();
        let redirect_delay = setting(&map, "redirect_delay_ms", |value| {
            lenient_i64(value).and_then(|ms| u64::try_from(ms).ok())
        })
        .map_or(defaults.redirect_delay, Duration::from_millis);

        Self {
            show_intro_screen,
            auto_advance,
            redirect_url,
            redirect_delay,
        }
    }
}

/// Reads one key. Absent and `null` are silent; anything `parse` rejects is logged.
fn setting<T>(map: &Map<String, Value>, key: &str, parse: impl Fn(&Value) -> Option<T>) -> Option<T> {
    let value = map.get(key).filter(|value| !value.is_null())?;
    let parsed = parse(value);
    if parsed.is_none() {
        warn!(key, value = %value, "ignoring unusable quiz setting");
    }
    parsed
}

/// `Some(None)` for a blank redirect, which just means "no redirect".
fn redirect_setting(value: &Value) -> Option<Option<Url>> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return Some(None);
    }
    Url::parse(raw).ok().map(Some)
}

/// Reads a flag the way WordPress stores them: booleans, `0`/`1`, or strings
/// such as `"1"`, `"true"`, `"yes"`, `"on"`.
fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Everything a session container carries into the runtime, read once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub form_id: FormId,
    pub session_id: SessionId,
    pub settings: QuizSettings,
}

impl SessionConfig {
    #[must_use]
    pub fn new(form_id: FormId, session_id: SessionId, settings: QuizSettings) -> Self {
        Self {
            form_id,
            session_id,
            settings,
        }
    }

    /// Builds the config from the raw values a page embeds.
    ///
    /// A missing or blank session id gets a freshly generated one.
    #[must_use]
    pub fn from_embedded(form_id: FormId, session_id: Option<&str>, settings_json: &str) -> Self {
        let session_id = session_id
            .and_then(|raw| raw.parse::<SessionId>().ok())
            .unwrap_or_else(SessionId::generate);
        Self::new(form_id, session_id, QuizSettings::from_json(settings_json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_uses_defaults() {
        let settings = QuizSettings::from_json("");
        assert!(settings.show_intro_screen);
        assert!(!settings.auto_advance);
        assert_eq!(settings.redirect_delay, DEFAULT_REDIRECT_DELAY);
    }

    #[test]
    fn reads_known_keys() {
        let settings = QuizSettings::from_json(
            r#"{"show_intro_screen": false, "auto_advance": true,
                "redirect_url": "https://example.com/done", "redirect_delay_ms": 500,
                "theme": "dark"}"#,
        );
        assert!(!settings.show_intro_screen);
        assert!(settings.auto_advance);
        assert_eq!(
            settings.redirect_url.as_ref().map(Url::as_str),
            Some("https://example.com/done")
        );
        assert_eq!(settings.redirect_delay, Duration::from_millis(500));
    }

    #[test]
    fn malformed_blob_falls_back() {
        assert_eq!(QuizSettings::from_json("{nope"), QuizSettings::default());
    }

    #[test]
    fn one_bad_key_keeps_the_others() {
        let settings = QuizSettings::from_json(
            r#"{"show_intro_screen": false, "auto_advance": "maybe", "redirect_delay_ms": [1]}"#,
        );
        assert!(!settings.show_intro_screen);
        assert!(!settings.auto_advance);
        assert_eq!(settings.redirect_delay, DEFAULT_REDIRECT_DELAY);
    }

    #[test]
    fn wordpress_style_strings_are_accepted() {
        let settings = QuizSettings::from_json(
            r#"{"show_intro_screen": "0", "auto_advance": "1", "redirect_delay_ms": "1500"}"#,
        );
        assert!(!settings.show_intro_screen);
        assert!(settings.auto_advance);
        assert_eq!(settings.redirect_delay, Duration::from_millis(1500));

        let settings = QuizSettings::from_json(r#"{"auto_advance": 1, "redirect_url": ""}"#);
        assert!(settings.auto_advance);
        assert_eq!(settings.redirect_url, None);
    }

    #[test]
    fn non_object_blob_falls_back() {
        assert_eq!(QuizSettings::from_json("[true]"), QuizSettings::default());
    }

    #[test]
    fn invalid_redirect_is_dropped() {
        let settings = QuizSettings::from_json(r#"{"redirect_url": "/relative"}"#);
        assert_eq!(settings.redirect_url, None);
    }

    #[test]
    fn blank_session_id_is_generated() {
        let config = SessionConfig::from_embedded(FormId::new(3), Some("  "), "{}");
        assert!(!config.session_id.as_str().is_empty());

        let config = SessionConfig::from_embedded(FormId::new(3), Some("abc"), "{}");
        assert_eq!(config.session_id, SessionId::new("abc"));
    }
}
