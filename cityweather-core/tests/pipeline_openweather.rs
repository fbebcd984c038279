//! End-to-end pipeline runs against a mocked OpenWeather endpoint.

use std::{sync::Arc, time::Duration};

use cityweather_core::{
    Coordinates, PipelineOptions, PipelineState, TemperatureUnit, WeatherPipeline,
    geocode::{Address, AddressLookup, FallbackGeocoder},
    location::FixedLocationProvider,
    preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore},
    provider::openweather::OpenWeatherClient,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug)]
struct OneAddress(Address);

#[async_trait::async_trait]
impl AddressLookup for OneAddress {
    async fn addresses(&self, _coords: Coordinates) -> anyhow::Result<Vec<Address>> {
        Ok(vec![self.0.clone()])
    }
}

fn current_weather(name: &str, temp: f64) -> serde_json::Value {
    serde_json::json!({
        "weather": [{"description": "jasno", "icon": "01d"}],
        "main": {"temp": temp, "humidity": 60},
        "wind": {"speed": 3.2},
        "name": name
    })
}

fn pipeline(
    server: &MockServer,
    preferences: Arc<dyn PreferenceStore>,
    fix: Option<Coordinates>,
) -> WeatherPipeline {
    let client = OpenWeatherClient::builder("TEST_KEY")
        .base_url(format!("{}/data/2.5/weather", server.uri()))
        .build()
        .unwrap();

    let geocoder = FallbackGeocoder::new(OneAddress(Address {
        locality: Some("Praha".to_string()),
        subregion: None,
    }));

    WeatherPipeline::with_options(
        Arc::new(FixedLocationProvider::new(fix)),
        Arc::new(geocoder),
        Arc::new(client),
        preferences,
        PipelineOptions { stage_timeout: Duration::from_secs(5) },
    )
}

#[tokio::test]
async fn resolves_location_and_fetches_weather() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Praha"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_weather("Praha", 21.5)))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(
        &server,
        Arc::new(MemoryPreferenceStore::new()),
        Some(Coordinates::new(50.08, 14.42)),
    );

    let state = pipeline.resolve_and_fetch().await;
    let weather = state.weather().expect("weather loaded");

    assert_eq!(weather.city, "Praha");
    assert_eq!(weather.temperature_value, 21.5);
    assert_eq!(weather.humidity_percent, 60);
    assert_eq!(weather.icon_code, "01d");
}

#[tokio::test]
async fn missing_fix_fails_without_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_weather("Praha", 21.5)))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, Arc::new(MemoryPreferenceStore::new()), None);

    let state = pipeline.resolve_and_fetch().await;
    assert_eq!(state, PipelineState::Failure("location unavailable".to_string()));
}

#[tokio::test]
async fn missing_main_ends_in_failure() {
    let server = MockServer::start().await;

    let mut body = current_weather("Praha", 21.5);
    body.as_object_mut().unwrap().remove("main");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, Arc::new(MemoryPreferenceStore::new()), None);

    let state = pipeline.fetch_for("Praha").await;
    assert!(matches!(state, PipelineState::Failure(_)));
    assert_eq!(pipeline.state(), state);
}

#[tokio::test]
async fn persisted_unit_switches_query_units() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let preferences = Arc::new(FilePreferenceStore::new(dir.path().join("preferences.toml")));

    Mock::given(method("GET"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_weather("Brno", 12.0)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("units", "imperial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_weather("Brno", 53.6)))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&server, preferences.clone(), None);

    let celsius = pipeline.fetch_for("Brno").await;
    assert_eq!(celsius.weather().map(|w| w.temperature_value), Some(12.0));
    assert_eq!(celsius.weather().map(|w| w.unit), Some(TemperatureUnit::Celsius));

    pipeline.set_temperature_unit(TemperatureUnit::Fahrenheit).unwrap();

    let fahrenheit = pipeline.fetch_for("Brno").await;
    assert_eq!(fahrenheit.weather().map(|w| w.temperature_value), Some(53.6));
    assert_eq!(fahrenheit.weather().map(|w| w.unit), Some(TemperatureUnit::Fahrenheit));

    let reopened = FilePreferenceStore::new(preferences.path());
    assert_eq!(
        cityweather_core::preferences::load_temperature_unit(&reopened),
        TemperatureUnit::Fahrenheit
    );
}
