//! Upstream services: hourly weather and image generation.

use crate::{
    Config,
    error::CoreError,
    model::{WeatherSample, coerce_number},
    provider::{gemini::GeminiImageGenerator, openmeteo::OpenMeteoProvider},
};
use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::HashMap, fmt::Debug, time::Duration};

pub mod gemini;
pub mod openmeteo;

/// Hourly forecast for one location, aligned on `time`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlyForecast {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub utc_offset_seconds: i32,
    #[serde(default)]
    pub hourly: HourlySeries,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub time: Vec<String>,
    /// Every other hourly variable, by name. Cells stay untyped until sampled.
    #[serde(flatten)]
    pub values: HashMap<String, Value>,
}

impl HourlyForecast {
    pub fn times(&self) -> &[String] {
        &self.hourly.time
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| Utc.fix())
    }

    /// Numeric value of `variable` at `idx`, if present and numeric.
    pub fn value_at(&self, variable: &str, idx: usize) -> Option<f64> {
        self.hourly.values.get(variable)?.as_array()?.get(idx).and_then(coerce_number)
    }

    /// Gather the fields the narrative cares about for one hour.
    pub fn sample_at(&self, idx: usize) -> WeatherSample {
        let v = |name: &str| self.value_at(name, idx);
        WeatherSample {
            temperature: v("temperature_2m"),
            apparent_temperature: v("apparent_temperature"),
            precipitation_probability: v("precipitation_probability"),
            precipitation: v("precipitation"),
            rain: v("rain"),
            showers: v("showers"),
            snowfall: v("snowfall"),
            cloud_cover: v("cloud_cover"),
            wind_speed: v("wind_speed_10m"),
            wind_gust: v("wind_gusts_10m"),
            weather_code: v("weather_code").map(|c| c.round() as i64),
        }
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn hourly_forecast(&self, lat: f64, lon: f64) -> anyhow::Result<HourlyForecast>;
}

/// Raw `generateContent` response, reduced to what image extraction needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    /// Upstream has used both spellings over time, sometimes in the same part.
    #[serde(default, rename = "inlineData")]
    pub inline_data: Option<InlineData>,
    #[serde(default, rename = "inline_data")]
    pub inline_data_snake: Option<InlineData>,
}

impl Part {
    /// Inline payloads of this part, camelCase spelling first.
    pub fn inline_payloads(&self) -> impl Iterator<Item = &InlineData> {
        self.inline_data.iter().chain(self.inline_data_snake.iter())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InlineData {
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

impl GenerateContentResponse {
    /// First non-empty inline payload of the first candidate.
    pub fn first_inline_image(&self) -> Option<&InlineData> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .flat_map(Part::inline_payloads)
            .find(|inline| inline.data.as_deref().is_some_and(|d| !d.is_empty()))
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync + Debug {
    /// Fails with [`CoreError::MissingCredential`] when no request could be made.
    fn check_credentials(&self) -> Result<(), CoreError>;

    async fn generate_content(&self, prompt: &str) -> anyhow::Result<GenerateContentResponse>;
}

pub fn weather_provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let provider = OpenMeteoProvider::with_base_url(
        config.weather.base_url.clone(),
        config.timeouts.weather(),
    )?;
    Ok(Box::new(provider))
}

/// The generator is built even without a key; the missing credential is
/// reported by [`ImageGenerator::check_credentials`] when a run starts.
pub fn image_generator_from_config(config: &Config) -> anyhow::Result<Box<dyn ImageGenerator>> {
    let generator = GeminiImageGenerator::new(
        config.image_api_key().map(str::to_owned),
        config.image.model.clone(),
        config.image.base_url.clone(),
        config.timeouts.image(),
    )?;
    Ok(Box::new(generator))
}

pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("citysky/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn forecast() -> HourlyForecast {
        serde_json::from_value(json!({
            "timezone": "Europe/Paris",
            "utc_offset_seconds": 7200,
            "hourly": {
                "time": ["2024-05-01T00:00", "2024-05-01T01:00"],
                "temperature_2m": [11.2, "12.5"],
                "weather_code": [61, null],
                "cloud_cover": [80, "lots"],
                "wind_speed_10m": [10.0],
                "precipitation_probability": [20, 30]
            }
        }))
        .expect("valid forecast")
    }

    #[test]
    fn sample_at_coerces_cells() {
        let f = forecast();
        assert_eq!(f.times().len(), 2);
        assert_eq!(f.offset().local_minus_utc(), 7200);

        let first = f.sample_at(0);
        assert_eq!(first.temperature, Some(11.2));
        assert_eq!(first.weather_code, Some(61));
        assert_eq!(first.cloud_cover, Some(80.0));
        assert_eq!(first.wind_speed, Some(10.0));
        assert_eq!(first.snowfall, None);

        let second = f.sample_at(1);
        assert_eq!(second.temperature, Some(12.5));
        assert_eq!(second.weather_code, None);
        assert_eq!(second.cloud_cover, None);
        assert_eq!(second.wind_speed, None);
    }

    #[test]
    fn missing_hourly_block_is_empty() {
        let f: HourlyForecast = serde_json::from_value(json!({})).expect("valid");
        assert!(f.times().is_empty());
        assert_eq!(f.sample_at(0), WeatherSample::default());
    }

    #[test]
    fn inline_image_accepts_both_spellings() {
        let camel: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
            ]}}]
        }))
        .expect("valid");
        assert_eq!(camel.first_inline_image().and_then(|i| i.data.as_deref()), Some("AAAA"));

        let snake: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "inline_data": { "mime_type": "image/png", "data": "BBBB" } }
            ]}}]
        }))
        .expect("valid");
        let inline = snake.first_inline_image().expect("inline image");
        assert_eq!(inline.data.as_deref(), Some("BBBB"));
        assert_eq!(inline.mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn part_with_both_spellings_still_parses() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{
                "inlineData": { "data": "" },
                "inline_data": { "mime_type": "image/png", "data": "CCCC" }
            }]}}]
        }))
        .expect("valid");
        let inline = resp.first_inline_image().expect("inline image");
        assert_eq!(inline.data.as_deref(), Some("CCCC"));
    }

    #[test]
    fn empty_payloads_are_not_images() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "data": "" } },
                { "text": "sorry" }
            ]}}]
        }))
        .expect("valid");
        assert!(resp.first_inline_image().is_none());

        let none: GenerateContentResponse = serde_json::from_value(json!({})).expect("valid");
        assert!(none.first_inline_image().is_none());
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        assert_eq!(truncate_body("short"), "short");
        let long = "é".repeat(300);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 203);
    }
}
