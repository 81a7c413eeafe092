//! Turns a [`WeatherSample`] into a short comma-separated narrative.

use crate::model::WeatherSample;

/// WMO weather interpretation codes as used by Open-Meteo.
/// See: https://open-meteo.com/en/docs#weathervariables
pub fn weather_code_phrase(code: i64) -> Option<&'static str> {
    let phrase = match code {
        0 => "clear",
        1 => "mostly clear",
        2 => "partly cloudy",
        3 => "cloudy",
        45 => "fog",
        48 => "freezing fog",
        51 => "light drizzle",
        53 => "moderate drizzle",
        55 => "heavy drizzle",
        56 => "light freezing drizzle",
        57 => "heavy freezing drizzle",
        61 => "light rain",
        63 => "moderate rain",
        65 => "heavy rain",
        66 => "light freezing rain",
        67 => "heavy freezing rain",
        71 => "light snow",
        73 => "moderate snow",
        75 => "heavy snow",
        77 => "snow grains",
        80 => "light rain showers",
        81 => "moderate rain showers",
        82 => "heavy rain showers",
        85 => "light snow showers",
        86 => "heavy snow showers",
        95 => "thunderstorm",
        96 => "thunderstorm with light hail",
        99 => "thunderstorm with heavy hail",
        _ => return None,
    };
    Some(phrase)
}

fn cloud_phrase(cover: f64) -> &'static str {
    if cover < 15.0 {
        "clear sky"
    } else if cover < 50.0 {
        "partly cloudy"
    } else {
        "overcast"
    }
}

fn wind_phrase(speed: f64) -> Option<&'static str> {
    if speed >= 50.0 {
        Some("stormy")
    } else if speed >= 25.0 {
        Some("windy")
    } else {
        None
    }
}

/// Build the narrative. Phrase order is fixed:
/// code, clouds, wind, precipitation chance, precipitation, rain, showers, snowfall.
pub fn summarize(sample: &WeatherSample) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(8);

    if let Some(text) = sample.weather_code.and_then(weather_code_phrase) {
        parts.push(text.to_owned());
    }
    if let Some(cover) = sample.cloud_cover {
        parts.push(cloud_phrase(cover).to_owned());
    }
    if let Some(text) = sample.wind_speed.and_then(wind_phrase) {
        parts.push(text.to_owned());
    }
    if let Some(pop) = sample.precipitation_probability.filter(|p| *p >= 40.0) {
        parts.push(format!("precip. chance {pop}%"));
    }
    if let Some(mm) = sample.precipitation.filter(|v| *v > 0.0) {
        parts.push(format!("{:.1} mm precipitation", round1(mm)));
    }
    if let Some(mm) = sample.rain.filter(|v| *v > 0.0) {
        parts.push(format!("{:.1} mm rain", round1(mm)));
    }
    if sample.showers.is_some_and(|v| v > 0.0) {
        parts.push("showers".to_owned());
    }
    if sample.snowfall.is_some_and(|v| v > 0.0) {
        parts.push("snowfall".to_owned());
    }

    parts.join(", ")
}

/// Round to one decimal, half away from zero. Never returns negative zero.
pub fn round1(value: f64) -> f64 {
    // -0.0 + 0.0 is +0.0
    (value * 10.0).round() / 10.0 + 0.0
}

pub fn c_to_f(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn f_to_c(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// "12.3°C (54.1°F)". Fahrenheit is derived from the rounded Celsius value.
pub fn format_temperature(celsius: f64) -> String {
    let c = round1(celsius);
    format!("{}°C ({}°F)", c, round1(c_to_f(c)))
}
