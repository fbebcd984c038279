use crate::{
    CityName, Config, TemperatureUnit, Weather, error::FetchError,
    provider::openweather::OpenWeatherClient,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Current-weather lookup by city name.
///
/// Returned temperatures are already in `unit`; implementations do no numeric conversion.
#[async_trait]
pub trait WeatherClient: Send + Sync + Debug {
    async fn fetch(&self, city: &CityName, unit: TemperatureUnit) -> Result<Weather, FetchError>;
}

/// Construct the OpenWeather client from config.
pub fn client_from_config(config: &Config) -> anyhow::Result<OpenWeatherClient> {
    let api_key = config.api_key()?;

    OpenWeatherClient::builder(api_key)
        .base_url(config.base_url.clone())
        .language(config.language.clone())
        .timeout(config.timeout())
        .build()
}
