use std::{io::IsTerminal, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cityweather_core::{
    Config, LocationSource, PipelineOptions, PipelineState, TemperatureUnit, WeatherPipeline,
    geocode::geocoder_from_config,
    location::location_provider_from_config,
    preferences::{FilePreferenceStore, load_temperature_unit, save_temperature_unit},
    provider::client_from_config,
};
use inquire::{Confirm, CustomType, Password, Select, Text};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cityweather", version, about = "Current weather for your city")]
pub struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the API key, language and location source.
    Configure,

    /// Show current weather for CITY, or for the current location if omitted.
    Show {
        /// City name; skips location lookup.
        city: Option<String>,
    },

    /// Show or set the temperature unit.
    Unit {
        /// "celsius" or "fahrenheit".
        unit: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { city } => show(city).await,
            Command::Unit { unit } => unit_command(unit),
        }
    }
}

fn preference_store() -> Result<FilePreferenceStore> {
    Ok(FilePreferenceStore::new(Config::preferences_file_path()?))
}

fn build_pipeline(config: &Config) -> Result<WeatherPipeline> {
    tracing::debug!(
        source = ?config.location.source,
        language = %config.language,
        "Building weather pipeline"
    );

    let client = client_from_config(config)?;
    let location = location_provider_from_config(config)?;
    let geocoder = geocoder_from_config(config)?;

    Ok(WeatherPipeline::with_options(
        Arc::from(location),
        Arc::new(geocoder),
        Arc::new(client),
        Arc::new(preference_store()?),
        PipelineOptions { stage_timeout: config.timeout() },
    ))
}

async fn show(city: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let pipeline = build_pipeline(&config)?;
    let mut rx = pipeline.subscribe();

    let handle = match city {
        Some(city) => pipeline.spawn_fetch_for(city),
        None => pipeline.spawn_resolve_and_fetch(),
    };

    if *rx.borrow_and_update() == PipelineState::Loading {
        eprintln!("Loading weather...");
    }

    let mut state = handle.await.context("Weather request task failed")?;
    let interactive = std::io::stdin().is_terminal();

    loop {
        match state {
            PipelineState::Success(weather) => {
                println!("{}", render::weather_card(&weather));
                return Ok(());
            }
            PipelineState::Failure(message) => {
                if !interactive {
                    anyhow::bail!("{message}");
                }

                eprintln!("Error: {message}");
                // Manual entry keeps the session alive after any failure.
                let Some(city) = Text::new("City name (Esc to quit):").prompt_skippable()? else {
                    anyhow::bail!("{message}");
                };
                state = pipeline.fetch_for(&city).await;
            }
            PipelineState::Idle | PipelineState::Loading => {
                anyhow::bail!("Weather request ended without a result");
            }
        }
    }
}

fn unit_command(unit: Option<String>) -> Result<()> {
    let store = preference_store()?;

    match unit {
        Some(value) => {
            let unit: TemperatureUnit = value.parse()?;
            save_temperature_unit(&store, unit)?;
            println!("Temperature unit set to {unit}.");
        }
        None => {
            println!("{}", load_temperature_unit(&store));
        }
    }

    Ok(())
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .with_help_message("Stored in the config file. OPENWEATHER_API_KEY overrides it.")
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.api_key = Some(api_key.trim().to_string());
    }

    let language = Text::new("Language for weather descriptions:")
        .with_default(&config.language)
        .prompt()?;
    config.language = language;

    config.location.enabled = Confirm::new("Allow cityweather to use your location?")
        .with_default(config.location.enabled)
        .prompt()?;

    if config.location.enabled {
        let sources = vec!["fixed", "ip"];
        let source = Select::new("Location source:", sources)
            .with_help_message(
                "fixed: coordinates you enter now; ip: approximate from your IP address",
            )
            .prompt()?;

        config.location.source = match source {
            "ip" => LocationSource::Ip,
            _ => LocationSource::Fixed,
        };

        if config.location.source == LocationSource::Fixed {
            config.location.latitude = CustomType::<f64>::new("Latitude:").prompt_skippable()?;
            config.location.longitude = CustomType::<f64>::new("Longitude:").prompt_skippable()?;
        }
    }

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());

    Ok(())
}
