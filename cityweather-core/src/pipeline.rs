//! Location → city → weather orchestration.
//!
//! [`WeatherPipeline`] owns the single [`PipelineState`] and publishes every
//! transition on a `tokio::sync::watch` channel. Callers observe it through
//! [`WeatherPipeline::subscribe`]; nothing is pushed into caller-owned state.
//!
//! Each request takes a ticket when it enters `Loading`. A completion is only
//! published if its ticket is still the newest, so a slow earlier request can
//! never overwrite the outcome of a later one.

use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{
    sync::watch,
    task::{AbortHandle, JoinHandle},
    time::timeout,
};

use crate::{
    config::DEFAULT_TIMEOUT_SECS,
    error::{FetchError, LocationError},
    geocode::{ReverseGeocoder, unknown_city},
    location::GeoLocationProvider,
    model::{CityName, PipelineState, TemperatureUnit},
    preferences::{PreferenceStore, load_temperature_unit, save_temperature_unit},
    provider::WeatherClient,
};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upper bound for each stage: location, geocoding and the weather request.
    pub stage_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

struct Inner {
    location: Arc<dyn GeoLocationProvider>,
    geocoder: Arc<dyn ReverseGeocoder>,
    client: Arc<dyn WeatherClient>,
    preferences: Arc<dyn PreferenceStore>,
    options: PipelineOptions,
    state: watch::Sender<PipelineState>,
    latest_ticket: AtomicU64,
    in_flight: Mutex<Option<AbortHandle>>,
}

/// Cheap to clone; all clones drive the same state.
#[derive(Clone)]
pub struct WeatherPipeline {
    inner: Arc<Inner>,
}

impl fmt::Debug for WeatherPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherPipeline")
            .field("location", &self.inner.location)
            .field("geocoder", &self.inner.geocoder)
            .field("client", &self.inner.client)
            .field("options", &self.inner.options)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl WeatherPipeline {
    pub fn new(
        location: Arc<dyn GeoLocationProvider>,
        geocoder: Arc<dyn ReverseGeocoder>,
        client: Arc<dyn WeatherClient>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self::with_options(location, geocoder, client, preferences, PipelineOptions::default())
    }

    pub fn with_options(
        location: Arc<dyn GeoLocationProvider>,
        geocoder: Arc<dyn ReverseGeocoder>,
        client: Arc<dyn WeatherClient>,
        preferences: Arc<dyn PreferenceStore>,
        options: PipelineOptions,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);

        Self {
            inner: Arc::new(Inner {
                location,
                geocoder,
                client,
                preferences,
                options,
                state,
                latest_ticket: AtomicU64::new(0),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.inner.state.borrow().clone()
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        load_temperature_unit(self.inner.preferences.as_ref())
    }

    /// Persist the user's unit choice. Takes effect on the next fetch.
    pub fn set_temperature_unit(&self, unit: TemperatureUnit) -> anyhow::Result<()> {
        save_temperature_unit(self.inner.preferences.as_ref(), unit)
    }

    /// Locate the device, resolve its city and fetch that city's weather.
    ///
    /// Returns the outcome of this call. If a newer request started meanwhile,
    /// the outcome is returned but not published.
    pub async fn resolve_and_fetch(&self) -> PipelineState {
        let ticket = self.begin();
        self.run_resolve_and_fetch(ticket).await
    }

    /// Fetch weather for a typed city name, skipping geolocation.
    pub async fn fetch_for(&self, city: &str) -> PipelineState {
        let ticket = self.begin();
        self.run_fetch_for(ticket, city.to_owned()).await
    }

    /// Like [`resolve_and_fetch`](Self::resolve_and_fetch), but runs on the Tokio runtime
    /// and aborts the previously spawned request. Must be called within a runtime.
    pub fn spawn_resolve_and_fetch(&self) -> JoinHandle<PipelineState> {
        let pipeline = self.clone();
        self.track(move |ticket| async move { pipeline.run_resolve_and_fetch(ticket).await })
    }

    /// Like [`fetch_for`](Self::fetch_for), but runs on the Tokio runtime and
    /// aborts the previously spawned request. Must be called within a runtime.
    pub fn spawn_fetch_for(&self, city: impl Into<String>) -> JoinHandle<PipelineState> {
        let pipeline = self.clone();
        let city = city.into();
        self.track(move |ticket| async move { pipeline.run_fetch_for(ticket, city).await })
    }

    fn track<W, F>(&self, work: W) -> JoinHandle<PipelineState>
    where
        W: FnOnce(u64) -> F,
        F: Future<Output = PipelineState> + Send + 'static,
    {
        // Ticket order and abort order must agree, so both happen under `in_flight`.
        let mut in_flight = self.inner.in_flight.lock();
        let ticket = self.begin();
        let handle = tokio::spawn(work(ticket));
        if let Some(previous) = in_flight.replace(handle.abort_handle()) {
            previous.abort();
        }
        handle
    }

    /// Enter `Loading` and take the newest ticket.
    fn begin(&self) -> u64 {
        let mut ticket = 0;
        // The ticket is taken under the watch lock so it is ordered with `finish`.
        self.inner.state.send_modify(|state| {
            ticket = self.inner.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;
            *state = PipelineState::Loading;
        });
        tracing::debug!(ticket, "Pipeline request started");
        ticket
    }

    fn finish(&self, ticket: u64, outcome: PipelineState) -> PipelineState {
        let published = self.inner.state.send_if_modified(|state| {
            if self.inner.latest_ticket.load(Ordering::SeqCst) != ticket {
                return false;
            }
            *state = outcome.clone();
            true
        });

        if !published {
            tracing::debug!(ticket, "Dropping result of superseded request");
        }
        outcome
    }

    async fn run_resolve_and_fetch(&self, ticket: u64) -> PipelineState {
        let outcome = match self.locate_city().await {
            Ok(city) => self.fetch_weather(city).await,
            Err(e) => {
                tracing::warn!(error = %e, "Could not determine device location");
                PipelineState::Failure(e.user_message())
            }
        };
        self.finish(ticket, outcome)
    }

    async fn run_fetch_for(&self, ticket: u64, city: String) -> PipelineState {
        let outcome = match CityName::parse(&city) {
            Ok(city) => self.fetch_weather(city).await,
            Err(e) => PipelineState::Failure(e.user_message()),
        };
        self.finish(ticket, outcome)
    }

    async fn locate_city(&self) -> Result<CityName, LocationError> {
        let stage_timeout = self.inner.options.stage_timeout;

        let coords = timeout(stage_timeout, self.inner.location.current_location())
            .await
            .map_err(|_| LocationError::TimedOut)??;

        let city = match timeout(stage_timeout, self.inner.geocoder.city_for(coords)).await {
            Ok(city) => city,
            Err(_) => {
                tracing::warn!(%coords, "Reverse geocoding timed out");
                unknown_city()
            }
        };

        tracing::info!(%coords, city = %city, "Resolved current city");
        Ok(city)
    }

    async fn fetch_weather(&self, city: CityName) -> PipelineState {
        let unit = self.temperature_unit();

        let stage_timeout = self.inner.options.stage_timeout;
        let result = timeout(stage_timeout, self.inner.client.fetch(&city, unit))
            .await
            .unwrap_or_else(|_| Err(FetchError::Network("request timed out".to_string())));

        match result {
            Ok(weather) => {
                tracing::info!(
                    city = %weather.city,
                    temperature = weather.temperature_value,
                    %unit,
                    "Weather loaded"
                );
                PipelineState::Success(weather)
            }
            Err(e) => {
                tracing::warn!(city = %city, error = %e, "Weather fetch failed");
                PipelineState::Failure(e.user_message())
            }
        }
    }
}
