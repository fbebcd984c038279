//! Persisted user preferences, treated as an opaque key-value store.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::model::TemperatureUnit;

pub const TEMPERATURE_UNIT_KEY: &str = "temperature_unit";

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Reads the unit preference. Absent, unreadable or unknown values mean Celsius.
pub fn load_temperature_unit(store: &dyn PreferenceStore) -> TemperatureUnit {
    match store.get(TEMPERATURE_UNIT_KEY) {
        Ok(Some(value)) => value.parse().unwrap_or_else(|e| {
            tracing::warn!(%value, error = %e, "Ignoring unrecognised temperature unit preference");
            TemperatureUnit::default()
        }),
        Ok(None) => TemperatureUnit::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read temperature unit preference");
            TemperatureUnit::default()
        }
    }
}

pub fn save_temperature_unit(store: &dyn PreferenceStore, unit: TemperatureUnit) -> Result<()> {
    store.set(TEMPERATURE_UNIT_KEY, unit.as_str())
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Flat TOML table on disk. The file is re-read on every `get` and rewritten on every `set`.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read preferences file: {}", self.path.display())
        })?;

        toml::from_str(&contents).with_context(|| {
            format!("Failed to parse preferences file: {}", self.path.display())
        })
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut values = self.read_all()?;
        values.insert(key.to_owned(), value.to_owned());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create preferences directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string(&values).context("Failed to serialize preferences to TOML")?;
        fs::write(&self.path, toml)
            .with_context(|| format!("Failed to write preferences file: {}", self.path.display()))?;

        Ok(())
    }
}
