use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::{
    provider::{HourlyForecast, http_client, truncate_body},
};

use super::WeatherProvider;

/// Hourly variables requested for every forecast.
pub const HOURLY_VARIABLES: &[&str] = &[
    "temperature_2m",
    "relative_humidity_2m",
    "rain",
    "showers",
    "snowfall",
    "snow_depth",
    "precipitation",
    "precipitation_probability",
    "apparent_temperature",
    "dew_point_2m",
    "weather_code",
    "pressure_msl",
    "surface_pressure",
    "cloud_cover",
    "cloud_cover_low",
    "cloud_cover_mid",
    "cloud_cover_high",
    "visibility",
    "vapour_pressure_deficit",
    "wind_gusts_10m",
    "wind_direction_10m",
    "wind_speed_10m",
];

/// Open-Meteo forecast API. No key required.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: String,
    http: Client,
}

impl OpenMeteoProvider {
    pub fn with_base_url(base_url: String, timeout: Duration) -> Result<Self> {
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), http: http_client(timeout)? })
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    async fn hourly_forecast(&self, lat: f64, lon: f64) -> Result<HourlyForecast> {
        let url = format!("{}/forecast", self.base_url);
        let hourly = HOURLY_VARIABLES.join(",");

        tracing::debug!(%url, lat, lon, "Requesting hourly forecast");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("hourly", hourly),
                ("forecast_days", "1".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .context("Failed to send request to Open-Meteo")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read Open-Meteo response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Open-Meteo request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: HourlyForecast =
            serde_json::from_str(&body).context("Failed to parse Open-Meteo forecast JSON")?;

        tracing::debug!(
            hours = parsed.times().len(),
            timezone = parsed.timezone.as_deref().unwrap_or("?"),
            "Open-Meteo forecast received"
        );

        Ok(parsed)
    }
}
