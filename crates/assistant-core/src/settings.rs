use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreResult;
use crate::storage::StorageBackend;

pub const SETTINGS_KEY: &str = "ai-research-assistant-settings";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
            Theme::System => "system",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            "system" => Ok(Theme::System),
            other => Err(format!("unknown theme '{}' (expected dark, light or system)", other)),
        }
    }
}

/// Process-wide user preferences
///
/// Fields missing from the stored record take their default, so records
/// written by older versions keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub streaming_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            model: "gpt-4".to_string(),
            api_key: None,
            streaming_enabled: true,
        }
    }
}

impl Settings {
    /// Without a key the front end answers from canned content instead of the endpoint.
    pub fn is_demo_mode(&self) -> bool {
        self.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
    }
}

/// Fields to change in a [`SettingsStore::write`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub model: Option<String>,
    /// `Some(None)` removes the stored key.
    pub api_key: Option<Option<String>>,
    pub streaming_enabled: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    fn apply(self, settings: &mut Settings) {
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
        if let Some(model) = self.model {
            settings.model = model;
        }
        if let Some(api_key) = self.api_key {
            settings.api_key = api_key;
        }
        if let Some(streaming_enabled) = self.streaming_enabled {
            settings.streaming_enabled = streaming_enabled;
        }
    }
}

pub struct SettingsStore<B> {
    backend: B,
}

impl<B: StorageBackend> SettingsStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Stored settings over defaults; pure defaults when missing or corrupt.
    ///
    /// A field whose stored value does not fit keeps its default while the
    /// other stored fields still apply.
    pub fn read(&self) -> Settings {
        match self.backend.get(SETTINGS_KEY) {
            Ok(Some(raw)) => merge_over_defaults(&raw),
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read settings");
                Settings::default()
            }
        }
    }

    /// Merge `patch` onto the current settings and rewrite the whole record.
    pub fn write(&self, patch: SettingsPatch) -> StoreResult<Settings> {
        let mut settings = self.read();
        patch.apply(&mut settings);

        let json = serde_json::to_string(&settings)?;
        self.backend.set(SETTINGS_KEY, &json)?;
        Ok(settings)
    }
}

fn merge_over_defaults(raw: &str) -> Settings {
    let stored = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::warn!(kind = json_kind(&other), "discarding settings that are not an object");
            return Settings::default();
        }
        Err(e) => {
            tracing::warn!(error = %e, "discarding corrupt settings");
            return Settings::default();
        }
    };

    let mut merged = match serde_json::to_value(Settings::default()) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (field, value) in stored {
        let mut candidate = merged.clone();
        candidate.insert(field.clone(), value);
        if serde_json::from_value::<Settings>(Value::Object(candidate.clone())).is_ok() {
            merged = candidate;
        } else {
            tracing::warn!(%field, "ignoring invalid stored setting");
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
