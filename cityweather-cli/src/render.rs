use cityweather_core::{TemperatureUnit, Weather};

/// Multi-line weather card for the terminal, labelled in the unit the values were fetched in.
pub fn weather_card(weather: &Weather) -> String {
    let unit = weather.unit;
    let mut lines = vec![
        weather.city.clone(),
        format!(
            "{}  {}",
            weather.condition().glyph(),
            temperature(weather.temperature_value, unit)
        ),
        capitalize(&weather.condition_description),
        format!(
            "Humidity: {}%   Wind: {} {}",
            weather.humidity_percent,
            weather.wind_speed,
            unit.wind_speed_unit()
        ),
    ];

    if let Some(observed_at) = weather.observed_at {
        lines.push(format!("Observed: {}", observed_at.format("%Y-%m-%d %H:%M UTC")));
    }

    lines.join("\n")
}

/// Whole degrees, truncated toward zero.
fn temperature(value: f64, unit: TemperatureUnit) -> String {
    format!("{}{}", value.trunc() as i64, unit.symbol())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
