use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A device position as reported by a
/// [`GeoLocationProvider`](crate::location::GeoLocationProvider).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Non-blank city name, sent to the provider exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CityName(String);

impl CityName {
    pub fn parse(input: &str) -> Result<Self, FetchError> {
        if input.trim().is_empty() {
            return Err(FetchError::EmptyCity);
        }
        Ok(Self(input.to_owned()))
    }

    /// For names known to be non-blank at compile time.
    pub(crate) fn from_known(value: &'static str) -> Self {
        Self(value.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CityName {
    type Error = FetchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(FetchError::EmptyCity);
        }
        Ok(Self(value))
    }
}

impl From<CityName> for String {
    fn from(value: CityName) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Value stored under the `temperature_unit` preference key.
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "Celsius",
            TemperatureUnit::Fahrenheit => "Fahrenheit",
        }
    }

    /// Value of the provider's `units` query parameter.
    pub fn query_value(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "metric",
            TemperatureUnit::Fahrenheit => "imperial",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }

    /// The provider reports wind speed in the same unit system as temperature.
    pub fn wind_speed_unit(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "m/s",
            TemperatureUnit::Fahrenheit => "mph",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemperatureUnit {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "celsius" | "c" | "metric" => Ok(TemperatureUnit::Celsius),
            "fahrenheit" | "f" | "imperial" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err(anyhow::anyhow!(
                "Unknown temperature unit '{value}'. Supported units: Celsius, Fahrenheit."
            )),
        }
    }
}

/// Current conditions for one city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub city: String,
    pub temperature_value: f64,
    pub condition_description: String,
    pub humidity_percent: i32,
    pub wind_speed: f64,
    pub icon_code: String,
    pub observed_at: Option<DateTime<Utc>>,
    /// Unit system the values were requested in.
    pub unit: TemperatureUnit,
}

impl Weather {
    pub fn condition(&self) -> Condition {
        Condition::from_icon_code(&self.icon_code)
    }
}

/// Coarse condition family encoded in the first two characters of an icon code ("01d", "10n", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Clear,
    FewClouds,
    Clouds,
    Rain,
    Thunderstorm,
    Snow,
    Mist,
    Unknown,
}

impl Condition {
    pub fn from_icon_code(code: &str) -> Self {
        match code.get(..2) {
            Some("01") => Self::Clear,
            Some("02") => Self::FewClouds,
            Some("03" | "04") => Self::Clouds,
            Some("09" | "10") => Self::Rain,
            Some("11") => Self::Thunderstorm,
            Some("13") => Self::Snow,
            Some("50") => Self::Mist,
            _ => Self::Unknown,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Clear => "☀️",
            Self::FewClouds => "⛅",
            Self::Clouds => "☁️",
            Self::Rain => "🌧️",
            Self::Thunderstorm => "⛈️",
            Self::Snow => "❄️",
            Self::Mist => "🌫️",
            Self::Unknown => "🌡️",
        }
    }
}

/// What an observer of the pipeline sees. Exactly one variant is active at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Loading,
    Success(Weather),
    Failure(String),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Success(_) | PipelineState::Failure(_))
    }

    pub fn weather(&self) -> Option<&Weather> {
        match self {
            PipelineState::Success(weather) => Some(weather),
            _ => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            PipelineState::Failure(message) => Some(message),
            _ => None,
        }
    }
}
