use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    config::{DEFAULT_LANGUAGE, DEFAULT_TIMEOUT_SECS, DEFAULT_WEATHER_URL},
    error::FetchError,
    model::{CityName, TemperatureUnit, Weather},
};

use super::WeatherClient;

#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    base_url: String,
    language: String,
    http: Client,
}

#[derive(Debug)]
pub struct OpenWeatherClientBuilder {
    api_key: String,
    base_url: String,
    language: String,
    timeout: Duration,
}

impl OpenWeatherClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> anyhow::Result<OpenWeatherClient> {
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("Failed to create OpenWeather HTTP client")?;

        Ok(OpenWeatherClient {
            api_key: self.api_key,
            base_url: self.base_url,
            language: self.language,
            http,
        })
    }
}

impl OpenWeatherClient {
    pub fn builder(api_key: impl Into<String>) -> OpenWeatherClientBuilder {
        OpenWeatherClientBuilder {
            api_key: api_key.into(),
            base_url: DEFAULT_WEATHER_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    async fn fetch_current(
        &self,
        city: &CityName,
        unit: TemperatureUnit,
    ) -> Result<Weather, FetchError> {
        tracing::debug!(city = %city, units = unit.query_value(), "Requesting current weather");

        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("q", city.as_str()),
                ("units", unit.query_value()),
                ("appid", self.api_key.as_str()),
                ("lang", self.language.as_str()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            let message = provider_message(&body).unwrap_or_else(|| status.to_string());
            tracing::debug!(%status, body = %truncate_body(&body), "OpenWeather rejected request");
            return Err(FetchError::Provider(message));
        }

        parse_current(&body, unit)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: i32,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    dt: Option<i64>,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwErrorBody {
    message: Option<String>,
}

fn parse_current(body: &str, unit: TemperatureUnit) -> Result<Weather, FetchError> {
    let parsed: OwCurrentResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let condition = parsed
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Parse("`weather` array is empty".to_string()))?;

    Ok(Weather {
        city: parsed.name,
        temperature_value: parsed.main.temp,
        condition_description: condition.description,
        humidity_percent: parsed.main.humidity,
        wind_speed: parsed.wind.speed,
        icon_code: condition.icon,
        observed_at: parsed.dt.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)),
        unit,
    })
}

/// The provider's own error text, e.g. `{"cod":"404","message":"city not found"}`.
fn provider_message(body: &str) -> Option<String> {
    serde_json::from_str::<OwErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
}

#[async_trait]
impl WeatherClient for OpenWeatherClient {
    async fn fetch(&self, city: &CityName, unit: TemperatureUnit) -> Result<Weather, FetchError> {
        self.fetch_current(city, unit).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn praha_body() -> serde_json::Value {
        serde_json::json!({
            "coord": {"lon": 14.42, "lat": 50.09},
            "weather": [{"id": 800, "main": "Clear", "description": "jasno", "icon": "01d"}],
            "main": {"temp": 21.5, "feels_like": 21.0, "humidity": 60, "pressure": 1016},
            "wind": {"speed": 3.2, "deg": 240},
            "dt": 1_718_000_000,
            "name": "Praha",
            "cod": 200
        })
    }

    fn client(server: &MockServer) -> OpenWeatherClient {
        OpenWeatherClient::builder("TEST_KEY")
            .base_url(format!("{}/data/2.5/weather", server.uri()))
            .build()
            .unwrap()
    }

    fn city(name: &str) -> CityName {
        CityName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn fetch_parses_current_weather() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "Praha"))
            .and(query_param("units", "metric"))
            .and(query_param("appid", "TEST_KEY"))
            .and(query_param("lang", "cz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(praha_body()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let weather = client(&mock_server)
            .fetch(&city("Praha"), TemperatureUnit::Celsius)
            .await
            .unwrap();

        assert_eq!(weather.city, "Praha");
        assert_eq!(weather.temperature_value, 21.5);
        assert_eq!(weather.condition_description, "jasno");
        assert_eq!(weather.humidity_percent, 60);
        assert_eq!(weather.wind_speed, 3.2);
        assert_eq!(weather.icon_code, "01d");
        assert_eq!(weather.observed_at.map(|t| t.timestamp()), Some(1_718_000_000));
        assert_eq!(weather.unit, TemperatureUnit::Celsius);
    }

    #[tokio::test]
    async fn fahrenheit_requests_imperial_without_conversion() {
        let mock_server = MockServer::start().await;

        let mut body = praha_body();
        body["main"]["temp"] = serde_json::json!(70.7);

        Mock::given(method("GET"))
            .and(query_param("units", "imperial"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let weather = client(&mock_server)
            .fetch(&city("Praha"), TemperatureUnit::Fahrenheit)
            .await
            .unwrap();

        assert_eq!(weather.temperature_value, 70.7);
        assert_eq!(weather.unit, TemperatureUnit::Fahrenheit);
    }

    #[tokio::test]
    async fn missing_main_is_parse_error() {
        let mock_server = MockServer::start().await;

        let mut body = praha_body();
        body.as_object_mut().unwrap().remove("main");

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server)
            .fetch(&city("Praha"), TemperatureUnit::Celsius)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn mistyped_or_empty_fields_are_parse_errors() {
        let mock_server = MockServer::start().await;

        let mut mistyped = praha_body();
        mistyped["main"]["humidity"] = serde_json::json!("sixty");
        Mock::given(method("GET"))
            .and(query_param("q", "Mistyped"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mistyped))
            .mount(&mock_server)
            .await;

        let mut empty_weather = praha_body();
        empty_weather["weather"] = serde_json::json!([]);
        Mock::given(method("GET"))
            .and(query_param("q", "Empty"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_weather))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(query_param("q", "Garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = client(&mock_server);
        for name in ["Mistyped", "Empty", "Garbage"] {
            let err = client.fetch(&city(name), TemperatureUnit::Celsius).await.unwrap_err();
            assert!(matches!(err, FetchError::Parse(_)), "{name}: {err:?}");
        }
    }

    #[tokio::test]
    async fn provider_message_is_surfaced() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "cod": "404",
                "message": "city not found"
            })))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server)
            .fetch(&city("Atlantis"), TemperatureUnit::Celsius)
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Provider("city not found".to_string()));
    }

    #[tokio::test]
    async fn provider_error_without_message_uses_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server)
            .fetch(&city("Praha"), TemperatureUnit::Celsius)
            .await
            .unwrap_err();

        match err {
            FetchError::Provider(msg) => assert!(msg.contains("502"), "{msg}"),
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        // Nothing listens on a port that was bound and released.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let client = OpenWeatherClient::builder("TEST_KEY")
            .base_url(format!("http://127.0.0.1:{port}/data/2.5/weather"))
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        let err = client.fetch(&city("Praha"), TemperatureUnit::Celsius).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)), "{err:?}");
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "č".repeat(300);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
