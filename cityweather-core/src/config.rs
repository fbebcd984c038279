use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Environment variable that overrides `api_key` from the config file.
pub const API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/reverse";
pub const DEFAULT_IP_LOCATION_URL: &str = "https://ipinfo.io/json";
pub const DEFAULT_LANGUAGE: &str = "cz";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Where the pipeline gets its device position from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    /// Last known fix stored in the config file.
    #[default]
    Fixed,
    /// Approximate position from the public IP address.
    Ip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Outcome of the location permission prompt.
    pub enabled: bool,
    pub source: LocationSource,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ip_lookup_url: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source: LocationSource::default(),
            latitude: None,
            longitude: None,
            ip_lookup_url: DEFAULT_IP_LOCATION_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: format!("cityweather/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// language = "cz"
///
/// [location]
/// source = "fixed"
/// latitude = 50.08
/// longitude = 14.42
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    /// Language hint passed to the provider as `lang`.
    pub language: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub location: LocationConfig,
    pub geocoder: GeocoderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            language: DEFAULT_LANGUAGE.to_string(),
            base_url: DEFAULT_WEATHER_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            location: LocationConfig::default(),
            geocoder: GeocoderConfig::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Default location of the preference store, next to the config file.
    pub fn preferences_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("preferences.toml"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "cityweather", "cityweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// API key from the environment, falling back to the config file.
    pub fn api_key(&self) -> Result<String> {
        let from_env = std::env::var(API_KEY_ENV).ok();
        resolve_api_key(from_env, self.api_key.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured last known fix, if both coordinates are present.
    pub fn fixed_location(&self) -> Option<crate::Coordinates> {
        match (self.location.latitude, self.location.longitude) {
            (Some(latitude), Some(longitude)) => Some(crate::Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }
}

fn resolve_api_key(from_env: Option<String>, from_file: Option<&str>) -> Result<String> {
    from_env
        .filter(|key| !key.trim().is_empty())
        .or_else(|| {
            from_file
                .filter(|key| !key.trim().is_empty())
                .map(str::to_owned)
        })
        .ok_or_else(|| {
            anyhow!(
                "No OpenWeather API key configured.\n\
                 Hint: run `cityweather configure` or set {API_KEY_ENV}."
            )
        })
}
