//! Persisted user settings
//!
//! Settings live in a flat string key-value store. Structured values are
//! stored as JSON. Every load succeeds: an empty store, a malformed value or
//! an out-of-range number all yield the documented default.

use crate::calibration::ClickCalibration;
use crate::error::InteractionError;
use crate::types::{ClickMode, FingerSettings, HandCount, PrimaryHandPreference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Storage keys
pub mod keys {
    pub const MAX_HANDS: &str = "maxHands";
    pub const CLICK_MODE: &str = "clickMode";
    pub const FINGER_SETTINGS: &str = "fingerSettings";
    pub const PRIMARY_HAND: &str = "primaryHandPreference";
    pub const CLICK_CALIBRATION: &str = "clickCalibration";

    pub const ALL: [&str; 5] = [
        MAX_HANDS,
        CLICK_MODE,
        FINGER_SETTINGS,
        PRIMARY_HAND,
        CLICK_CALIBRATION,
    ];
}

/// String key-value persistence
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), InteractionError>;
    fn remove(&mut self, key: &str) -> Result<(), InteractionError>;
}

/// Volatile store, used by tests and embedders without persistence
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), InteractionError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), InteractionError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object file, rewritten on every change
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "settings file is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no settings file, starting empty");
                BTreeMap::new()
            }
        };

        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), InteractionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), InteractionError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), InteractionError> {
        self.values.remove(key);
        self.flush()
    }
}

// ============================================================================
// Typed accessors
// ============================================================================

pub fn load_max_hands(store: &dyn SettingsStore) -> HandCount {
    match store.get(keys::MAX_HANDS) {
        Some(raw) => match raw
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(|n| HandCount::try_from(n).ok())
        {
            Some(count) => count,
            None => {
                warn!(value = %raw, "invalid stored hand count, using default");
                HandCount::default()
            }
        },
        None => HandCount::default(),
    }
}

pub fn save_max_hands(store: &mut dyn SettingsStore, count: HandCount) -> Result<(), InteractionError> {
    store.set(keys::MAX_HANDS, count.as_u8().to_string())
}

pub fn load_click_mode(store: &dyn SettingsStore) -> ClickMode {
    match store.get(keys::CLICK_MODE) {
        Some(raw) => ClickMode::parse(raw.trim()).unwrap_or_else(|| {
            warn!(value = %raw, "invalid stored click mode, using default");
            ClickMode::default()
        }),
        None => ClickMode::default(),
    }
}

pub fn save_click_mode(store: &mut dyn SettingsStore, mode: ClickMode) -> Result<(), InteractionError> {
    store.set(keys::CLICK_MODE, mode.as_str().to_string())
}

/// Load the pinch finger pair. A pair naming the same finger twice cannot
/// form a pinch and is treated as corrupt.
pub fn load_finger_settings(store: &dyn SettingsStore) -> FingerSettings {
    let Some(raw) = store.get(keys::FINGER_SETTINGS) else {
        return FingerSettings::default();
    };

    match serde_json::from_str::<FingerSettings>(&raw) {
        Ok(settings) if settings.primary != settings.secondary => settings,
        Ok(_) => {
            warn!("stored finger settings use the same finger twice, using default");
            FingerSettings::default()
        }
        Err(e) => {
            warn!(error = %e, "invalid stored finger settings, using default");
            FingerSettings::default()
        }
    }
}

pub fn save_finger_settings(
    store: &mut dyn SettingsStore,
    settings: &FingerSettings,
) -> Result<(), InteractionError> {
    store.set(keys::FINGER_SETTINGS, serde_json::to_string(settings)?)
}

pub fn load_primary_hand_preference(store: &dyn SettingsStore) -> PrimaryHandPreference {
    match store.get(keys::PRIMARY_HAND) {
        Some(raw) => PrimaryHandPreference::parse(raw.trim()).unwrap_or_else(|| {
            warn!(value = %raw, "invalid stored hand preference, using default");
            PrimaryHandPreference::default()
        }),
        None => PrimaryHandPreference::default(),
    }
}

pub fn save_primary_hand_preference(
    store: &mut dyn SettingsStore,
    preference: PrimaryHandPreference,
) -> Result<(), InteractionError> {
    store.set(keys::PRIMARY_HAND, preference.as_str().to_string())
}

/// Load the click calibration, clamping stored values into their safe ranges
pub fn load_click_calibration(store: &dyn SettingsStore) -> ClickCalibration {
    let Some(raw) = store.get(keys::CLICK_CALIBRATION) else {
        return ClickCalibration::default();
    };

    match serde_json::from_str::<ClickCalibration>(&raw) {
        Ok(calibration) => calibration.sanitized(),
        Err(e) => {
            warn!(error = %e, "invalid stored click calibration, using defaults");
            ClickCalibration::default()
        }
    }
}

pub fn save_click_calibration(
    store: &mut dyn SettingsStore,
    calibration: &ClickCalibration,
) -> Result<(), InteractionError> {
    store.set(keys::CLICK_CALIBRATION, serde_json::to_string(calibration)?)
}

/// Persist and return the default calibration
pub fn reset_click_calibration(
    store: &mut dyn SettingsStore,
    now: DateTime<Utc>,
) -> Result<ClickCalibration, InteractionError> {
    let calibration = ClickCalibration::defaults_at(now);
    save_click_calibration(store, &calibration)?;
    Ok(calibration)
}

/// Parse and store one setting given as text, rejecting values the loaders
/// would silently replace with a default
pub fn set_setting(store: &mut dyn SettingsStore, key: &str, value: &str) -> Result<(), InteractionError> {
    let invalid = || InteractionError::ParseError(format!("invalid value for {key}: {value}"));

    match key {
        keys::MAX_HANDS => {
            let count = value
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(|n| HandCount::try_from(n).ok())
                .ok_or_else(invalid)?;
            save_max_hands(store, count)
        }
        keys::CLICK_MODE => save_click_mode(store, ClickMode::parse(value.trim()).ok_or_else(invalid)?),
        keys::PRIMARY_HAND => save_primary_hand_preference(
            store,
            PrimaryHandPreference::parse(value.trim()).ok_or_else(invalid)?,
        ),
        keys::FINGER_SETTINGS => {
            let fingers: FingerSettings = serde_json::from_str(value)?;
            if fingers.primary == fingers.secondary {
                return Err(invalid());
            }
            save_finger_settings(store, &fingers)
        }
        keys::CLICK_CALIBRATION => {
            let calibration: ClickCalibration = serde_json::from_str(value)?;
            save_click_calibration(store, &calibration.sanitized())
        }
        other => Err(InteractionError::UnknownSetting(other.to_string())),
    }
}

/// Every persisted setting the interaction core reads
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub max_hands: HandCount,
    pub click_mode: ClickMode,
    pub fingers: FingerSettings,
    pub primary_hand: PrimaryHandPreference,
    pub calibration: ClickCalibration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_hands: HandCount::default(),
            click_mode: ClickMode::default(),
            fingers: FingerSettings::default(),
            primary_hand: PrimaryHandPreference::default(),
            calibration: ClickCalibration::default(),
        }
    }
}

impl Settings {
    /// Apply the same recovery rules the per-key loaders use: the calibration
    /// is clamped and a pinch pair naming one finger twice reverts to the
    /// default pair.
    pub fn sanitized(self) -> Self {
        let fingers = if self.fingers.primary == self.fingers.secondary {
            warn!("finger settings use the same finger twice, using default");
            FingerSettings::default()
        } else {
            self.fingers
        };

        Self {
            fingers,
            calibration: self.calibration.sanitized(),
            ..self
        }
    }

    pub fn load(store: &dyn SettingsStore) -> Self {
        Self {
            max_hands: load_max_hands(store),
            click_mode: load_click_mode(store),
            fingers: load_finger_settings(store),
            primary_hand: load_primary_hand_preference(store),
            calibration: load_click_calibration(store),
        }
    }

    pub fn save(&self, store: &mut dyn SettingsStore) -> Result<(), InteractionError> {
        save_max_hands(store, self.max_hands)?;
        save_click_mode(store, self.click_mode)?;
        save_finger_settings(store, &self.fingers)?;
        save_primary_hand_preference(store, self.primary_hand)?;
        save_click_calibration(store, &self.calibration)
    }
}
