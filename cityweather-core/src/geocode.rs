//! Reverse geocoding: coordinates to a city name.
//!
//! [`ReverseGeocoder`] never fails. Lookup errors and incomplete candidates are
//! absorbed by [`FallbackGeocoder`], which ends at [`UNKNOWN_CITY`].

use std::{fmt::Debug, time::Duration};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{config::Config, model::{CityName, Coordinates}};

pub const UNKNOWN_CITY: &str = "unknown city";

/// One candidate address returned by a geocoding service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub locality: Option<String>,
    pub subregion: Option<String>,
}

/// Raw access to a geocoding service.
#[async_trait]
pub trait AddressLookup: Send + Sync + Debug {
    async fn addresses(&self, coords: Coordinates) -> Result<Vec<Address>>;
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync + Debug {
    async fn city_for(&self, coords: Coordinates) -> CityName;
}

/// Picks a city name from the first candidate: locality, then subregion, then [`UNKNOWN_CITY`].
#[derive(Debug, Clone)]
pub struct FallbackGeocoder<L> {
    lookup: L,
}

impl<L> FallbackGeocoder<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl<L: AddressLookup> ReverseGeocoder for FallbackGeocoder<L> {
    async fn city_for(&self, coords: Coordinates) -> CityName {
        match self.lookup.addresses(coords).await {
            Ok(candidates) => city_from_candidates(&candidates),
            Err(e) => {
                tracing::warn!(%coords, error = %e, "Reverse geocoding failed");
                unknown_city()
            }
        }
    }
}

pub fn unknown_city() -> CityName {
    CityName::from_known(UNKNOWN_CITY)
}

fn city_from_candidates(candidates: &[Address]) -> CityName {
    let Some(first) = candidates.first() else {
        tracing::warn!("Reverse geocoding returned no candidates");
        return unknown_city();
    };

    let name = first
        .locality
        .as_deref()
        .and_then(|s| CityName::parse(s).ok())
        .or_else(|| first.subregion.as_deref().and_then(|s| CityName::parse(s).ok()));

    match name {
        Some(city) => {
            tracing::info!(city = %city, "Reverse geocoded");
            city
        }
        None => {
            tracing::warn!("First geocoding candidate has neither locality nor subregion");
            unknown_city()
        }
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state_district: Option<String>,
    state: Option<String>,
}

impl From<NominatimAddress> for Address {
    fn from(addr: NominatimAddress) -> Self {
        Address {
            locality: addr.city.or(addr.town).or(addr.village).or(addr.municipality),
            subregion: addr.county.or(addr.state_district).or(addr.state),
        }
    }
}

/// OpenStreetMap Nominatim reverse lookup. Returns at most one candidate.
#[derive(Debug, Clone)]
pub struct NominatimLookup {
    base_url: String,
    http: Client,
}

impl NominatimLookup {
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to create geocoding client")?;

        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }
}

#[async_trait]
impl AddressLookup for NominatimLookup {
    async fn addresses(&self, coords: Coordinates) -> Result<Vec<Address>> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", "10".to_string()),
            ])
            .send()
            .await
            .context("Failed to send reverse geocoding request")?;

        let status = res.status();
        if !status.is_success() {
            return Err(anyhow!("Reverse geocoding failed with status {status}"));
        }

        let body: NominatimResponse =
            res.json().await.context("Failed to parse reverse geocoding JSON")?;

        Ok(body.address.map(Address::from).into_iter().collect())
    }
}

pub fn geocoder_from_config(config: &Config) -> Result<FallbackGeocoder<NominatimLookup>> {
    let lookup = NominatimLookup::new(
        config.geocoder.base_url.clone(),
        &config.geocoder.user_agent,
        config.timeout(),
    )?;
    Ok(FallbackGeocoder::new(lookup))
}
