//! Typed key-value settings with registered defaults and change listeners.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dialog::DataRetention;
use crate::nav::PathfindingConfig;
use crate::persist::{read_json, write_json_atomic, PersistError};

pub const NAV_MAX_ITERATIONS: &str = "nav.max_iterations";
pub const NAV_CACHE_TIMEOUT_MS: &str = "nav.cache_timeout_ms";
pub const NAV_MAX_CACHE_SIZE: &str = "nav.max_cache_size";
pub const UI_CLEAR_DATA_ON_CLOSE: &str = "ui.clear_data_on_close";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
        }
    }

    /// Converts `self` to the kind of `template`, allowing integer literals for float settings.
    fn conform_to(self, template: &SettingValue) -> Option<SettingValue> {
        match (template, self) {
            (Self::Float(_), Self::Int(value)) => Some(Self::Float(value as f64)),
            (template, value) if template.kind() == value.kind() => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

pub trait SettingType: Sized {
    const KIND: &'static str;
    fn from_setting(value: &SettingValue) -> Option<Self>;
    fn into_setting(self) -> SettingValue;
}

impl SettingType for bool {
    const KIND: &'static str = "bool";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Bool(self)
    }
}

impl SettingType for i64 {
    const KIND: &'static str = "int";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Int(self)
    }
}

impl SettingType for f64 {
    const KIND: &'static str = "float";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Float(self)
    }
}

impl SettingType for String {
    const KIND: &'static str = "string";

    fn from_setting(value: &SettingValue) -> Option<Self> {
        match value {
            SettingValue::Text(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Text(self)
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown setting '{key}'")]
    UnknownKey { key: String },
    #[error("setting '{key}' already has a default")]
    DuplicateDefault { key: String },
    #[error("setting '{key}' is a {expected}, got {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerFn = dyn FnMut(&str, &SettingValue);

struct Listener {
    id: ListenerId,
    key_prefix: Option<String>,
    callback: Box<ListenerFn>,
}

#[derive(Default)]
pub struct SettingsService {
    defaults: BTreeMap<String, SettingValue>,
    values: BTreeMap<String, SettingValue>,
    listeners: Vec<Listener>,
    next_listener_id: u64,
}

impl SettingsService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service preloaded with the keys the engine itself reads.
    pub fn with_engine_defaults() -> Self {
        let nav = PathfindingConfig::default();
        let mut settings = Self::new();
        for (key, value) in [
            (NAV_MAX_ITERATIONS, SettingValue::Int(nav.max_iterations as i64)),
            (NAV_CACHE_TIMEOUT_MS, SettingValue::Int(nav.cache_timeout_ms as i64)),
            (NAV_MAX_CACHE_SIZE, SettingValue::Int(nav.max_cache_size as i64)),
            (UI_CLEAR_DATA_ON_CLOSE, SettingValue::Bool(false)),
        ] {
            settings.defaults.insert(key.to_string(), value);
        }
        settings
    }

    pub fn register_default(
        &mut self,
        key: impl Into<String>,
        value: impl SettingType,
    ) -> Result<(), SettingsError> {
        let key = key.into();
        if self.defaults.contains_key(&key) {
            return Err(SettingsError::DuplicateDefault { key });
        }
        self.defaults.insert(key, value.into_setting());
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    pub fn value(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key).or_else(|| self.defaults.get(key))
    }

    pub fn get<T: SettingType>(&self, key: &str) -> Result<T, SettingsError> {
        let value = self.value(key).ok_or_else(|| SettingsError::UnknownKey {
            key: key.to_string(),
        })?;
        T::from_setting(value).ok_or_else(|| SettingsError::TypeMismatch {
            key: key.to_string(),
            expected: T::KIND,
            found: value.kind(),
        })
    }

    /// Returns whether the stored value changed. Listeners only hear about changes.
    pub fn set<T: SettingType>(&mut self, key: &str, value: T) -> Result<bool, SettingsError> {
        self.set_value(key, value.into_setting())
    }

    pub fn set_value(&mut self, key: &str, value: SettingValue) -> Result<bool, SettingsError> {
        let default = self.defaults.get(key).ok_or_else(|| SettingsError::UnknownKey {
            key: key.to_string(),
        })?;
        let found = value.kind();
        let value = value
            .conform_to(default)
            .ok_or_else(|| SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: default.kind(),
                found,
            })?;
        Ok(self.store(key, value))
    }

    pub fn reset(&mut self, key: &str) -> Result<bool, SettingsError> {
        let default = self
            .defaults
            .get(key)
            .cloned()
            .ok_or_else(|| SettingsError::UnknownKey {
                key: key.to_string(),
            })?;
        Ok(self.store(key, default))
    }

    pub fn reset_all(&mut self) -> usize {
        let keys = self.values.keys().cloned().collect::<Vec<_>>();
        keys.iter()
            .filter(|key| self.reset(key).unwrap_or(false))
            .count()
    }

    /// `key_prefix` of `None` listens to every key.
    pub fn subscribe<F>(&mut self, key_prefix: Option<&str>, listener: F) -> ListenerId
    where
        F: FnMut(&str, &SettingValue) + 'static,
    {
        self.next_listener_id += 1;
        let id = ListenerId(self.next_listener_id);
        self.listeners.push(Listener {
            id,
            key_prefix: key_prefix.map(ToString::to_string),
            callback: Box::new(listener),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id != id);
        self.listeners.len() != before
    }

    /// Applies a saved settings file. A missing file leaves defaults in place.
    ///
    /// The whole file is validated before anything is applied.
    pub fn load(&mut self, path: &Path) -> Result<usize, SettingsError> {
        let raw = match read_json::<BTreeMap<String, SettingValue>>(path) {
            Ok(raw) => raw,
            Err(error) if error.is_not_found() => {
                debug!(path = %path.display(), "settings_file_missing");
                return Ok(0);
            }
            Err(error) => return Err(error.into()),
        };

        let mut accepted = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let Some(default) = self.defaults.get(&key) else {
                warn!(key = %key, path = %path.display(), "settings_unknown_key_ignored");
                continue;
            };
            let found = value.kind();
            let value = value
                .conform_to(default)
                .ok_or_else(|| SettingsError::TypeMismatch {
                    key: key.clone(),
                    expected: default.kind(),
                    found,
                })?;
            accepted.push((key, value));
        }

        let count = accepted.len();
        for (key, value) in accepted {
            self.store(&key, value);
        }
        info!(path = %path.display(), applied = count, "settings_loaded");
        Ok(count)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        write_json_atomic(path, &self.values)?;
        info!(path = %path.display(), values = self.values.len(), "settings_saved");
        Ok(())
    }

    pub fn pathfinding_config(&self) -> PathfindingConfig {
        let defaults = PathfindingConfig::default();
        PathfindingConfig {
            max_iterations: self
                .positive(NAV_MAX_ITERATIONS)
                .map_or(defaults.max_iterations, |value| value as usize),
            cache_timeout_ms: self
                .positive(NAV_CACHE_TIMEOUT_MS)
                .map_or(defaults.cache_timeout_ms, |value| value as u64),
            max_cache_size: self
                .positive(NAV_MAX_CACHE_SIZE)
                .map_or(defaults.max_cache_size, |value| value as usize),
            ..defaults
        }
    }

    pub fn data_retention(&self) -> DataRetention {
        match self.get::<bool>(UI_CLEAR_DATA_ON_CLOSE) {
            Ok(true) => DataRetention::ClearOnClose,
            _ => DataRetention::Retain,
        }
    }

    fn positive(&self, key: &str) -> Option<i64> {
        self.get::<i64>(key).ok().filter(|value| *value > 0)
    }

    fn store(&mut self, key: &str, value: SettingValue) -> bool {
        if self.value(key) == Some(&value) {
            return false;
        }
        if self.defaults.get(key) == Some(&value) {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value.clone());
        }
        debug!(key, value = %value, "setting_changed");
        for listener in &mut self.listeners {
            let matches = listener
                .key_prefix
                .as_deref()
                .map_or(true, |prefix| key.starts_with(prefix));
            if matches {
                (listener.callback)(key, &value);
            }
        }
        true
    }
}
