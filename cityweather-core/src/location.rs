//! Device position sources.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    config::{Config, LocationSource},
    error::LocationError,
    model::Coordinates,
};

#[async_trait]
pub trait GeoLocationProvider: Send + Sync + Debug {
    /// Last known position of the device. No retry is attempted.
    async fn current_location(&self) -> Result<Coordinates, LocationError>;
}

/// Serves a stored last known fix.
#[derive(Debug, Clone, Default)]
pub struct FixedLocationProvider {
    last_known: Option<Coordinates>,
}

impl FixedLocationProvider {
    pub fn new(last_known: Option<Coordinates>) -> Self {
        Self { last_known }
    }
}

#[async_trait]
impl GeoLocationProvider for FixedLocationProvider {
    async fn current_location(&self) -> Result<Coordinates, LocationError> {
        self.last_known
            .ok_or_else(|| LocationError::Unavailable("no last known location".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    loc: String,
}

/// Approximates the device position from its public IP address.
#[derive(Debug, Clone)]
pub struct IpLocationProvider {
    url: String,
    http: Client,
}

impl IpLocationProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LocationError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LocationError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl GeoLocationProvider for IpLocationProvider {
    async fn current_location(&self) -> Result<Coordinates, LocationError> {
        let res = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| LocationError::Unavailable(format!("IP lookup failed: {e}")))?;

        if !res.status().is_success() {
            return Err(LocationError::Unavailable(format!(
                "IP lookup returned status {}",
                res.status()
            )));
        }

        let body: IpInfoResponse = res
            .json()
            .await
            .map_err(|e| LocationError::Unavailable(format!("invalid IP lookup response: {e}")))?;

        let coords = parse_loc(&body.loc)?;
        tracing::debug!(%coords, "Resolved approximate location from IP");
        Ok(coords)
    }
}

fn parse_loc(loc: &str) -> Result<Coordinates, LocationError> {
    let invalid = || LocationError::Unavailable(format!("invalid coordinates '{loc}'"));

    let (lat, lon) = loc.split_once(',').ok_or_else(invalid)?;
    let latitude = lat.trim().parse::<f64>().map_err(|_| invalid())?;
    let longitude = lon.trim().parse::<f64>().map_err(|_| invalid())?;

    Ok(Coordinates::new(latitude, longitude))
}

/// Applies the outcome of the location permission prompt to an inner provider.
#[derive(Debug, Clone)]
pub struct PermissionGate<P> {
    granted: bool,
    inner: P,
}

impl<P> PermissionGate<P> {
    pub fn new(granted: bool, inner: P) -> Self {
        Self { granted, inner }
    }
}

#[async_trait]
impl<P: GeoLocationProvider> GeoLocationProvider for PermissionGate<P> {
    async fn current_location(&self) -> Result<Coordinates, LocationError> {
        if !self.granted {
            return Err(LocationError::PermissionDenied);
        }
        self.inner.current_location().await
    }
}

/// Construct the location provider selected in the config.
pub fn location_provider_from_config(
    config: &Config,
) -> Result<Box<dyn GeoLocationProvider>, LocationError> {
    let granted = config.location.enabled;

    let boxed: Box<dyn GeoLocationProvider> = match config.location.source {
        LocationSource::Fixed => Box::new(PermissionGate::new(
            granted,
            FixedLocationProvider::new(config.fixed_location()),
        )),
        LocationSource::Ip => Box::new(PermissionGate::new(
            granted,
            IpLocationProvider::new(config.location.ip_lookup_url.clone(), config.timeout())?,
        )),
    };

    Ok(boxed)
}
