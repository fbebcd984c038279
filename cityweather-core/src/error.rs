//! Error kinds surfaced by the pipeline's collaborators.
//!
//! None of these escape the pipeline: each is turned into a
//! [`PipelineState::Failure`](crate::model::PipelineState::Failure) message.

use thiserror::Error;

/// Failure message published when no device position could be obtained.
pub const LOCATION_UNAVAILABLE: &str = "location unavailable";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("No location fix available: {0}")]
    Unavailable(String),

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Timed out waiting for a location fix")]
    TimedOut,
}

impl LocationError {
    pub fn user_message(&self) -> String {
        LOCATION_UNAVAILABLE.to_string()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("City name is empty")]
    EmptyCity,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Weather provider error: {0}")]
    Provider(String),

    #[error("Failed to parse weather response: {0}")]
    Parse(String),
}

impl FetchError {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCity => "empty city".to_string(),
            Self::Network(_) => "network error: check your connection".to_string(),
            Self::Provider(msg) => format!("weather provider error: {msg}"),
            Self::Parse(_) => "unexpected response from weather provider".to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}
