//! Core library for the `cityweather` client.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Device location, reverse geocoding and the OpenWeather client
//! - A persisted temperature-unit preference
//! - [`WeatherPipeline`], the location → city → weather state machine
//!
//! It is used by `cityweather-cli`, but any front end can drive the pipeline
//! and observe its [`PipelineState`].

pub mod config;
pub mod error;
pub mod geocode;
pub mod location;
pub mod model;
pub mod pipeline;
pub mod preferences;
pub mod provider;

pub use config::{Config, LocationSource};
pub use error::{FetchError, LocationError};
pub use geocode::{ReverseGeocoder, UNKNOWN_CITY};
pub use location::GeoLocationProvider;
pub use model::{CityName, Condition, Coordinates, PipelineState, TemperatureUnit, Weather};
pub use pipeline::{PipelineOptions, WeatherPipeline};
pub use preferences::PreferenceStore;
pub use provider::WeatherClient;
