use directories::ProjectDirs;
use doc_model::{Language, Settings, Theme};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve configuration directory")]
    NoConfigDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "FeReader", "FeReader")
            .ok_or(StorageError::NoConfigDirectory)?;

        Ok(Self { root: dirs.config_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// Reads the settings file, repairing it in place. A missing or unreadable
    /// file, a missing key or an out-of-range value falls back to the default
    /// for that key, and the repaired file is written back right away.
    pub fn load_or_create(&self) -> Result<Settings, StorageError> {
        let path = self.settings_path();

        let (settings, complete) = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => settings_from_map(&map),
                Ok(_) | Err(_) => {
                    warn!(path = %path.display(), "settings file is malformed, using defaults");
                    (Settings::default(), false)
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, creating one");
                (Settings::default(), false)
            }
            Err(err) => return Err(err.into()),
        };

        if !complete {
            self.save_settings(&settings)?;
        }

        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let settings = settings.clone().normalized();
        let bytes = serde_json::to_vec_pretty(&settings)?;
        fs::write(self.settings_path(), bytes)?;
        info!(path = %self.settings_path().display(), "saved settings");
        Ok(())
    }
}

/// Builds settings key by key. The flag is false when any key had to be filled in.
fn settings_from_map(map: &Map<String, Value>) -> (Settings, bool) {
    let defaults = Settings::default();
    let mut complete = true;

    let mut field = |key: &str| {
        let value = map.get(key);
        if value.is_none() {
            warn!(key, "settings key missing, using default");
            complete = false;
        }
        value
    };

    let theme = field("theme")
        .and_then(Value::as_str)
        .and_then(|value| value.parse::<Theme>().ok());
    let font_family = field("font_family")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned);
    let font_size = field("font_size").and_then(Value::as_i64).map(Settings::clamp_font_size);
    let language = field("language")
        .and_then(Value::as_str)
        .and_then(|value| value.parse::<Language>().ok());

    let repaired =
        theme.is_none() || font_family.is_none() || font_size.is_none() || language.is_none();
    let settings = Settings {
        theme: theme.unwrap_or(defaults.theme),
        font_family: font_family.unwrap_or(defaults.font_family),
        font_size: font_size.unwrap_or(defaults.font_size),
        language: language.unwrap_or(defaults.language),
    };

    let stored_size = map.get("font_size").and_then(Value::as_i64);
    let clamped = stored_size.is_some_and(|size| size != i64::from(settings.font_size));

    (settings, complete && !repaired && !clamped)
}
