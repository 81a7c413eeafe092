use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A normalized entry of the city dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    pub name: String,
    pub country: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl CityRecord {
    /// "Paris, FR" or just "Paris".
    pub fn label(&self) -> String {
        match &self.country {
            Some(country) => format!("{}, {}", self.name, country),
            None => self.name.clone(),
        }
    }

    /// One line of a search result list.
    pub fn display_line(&self) -> String {
        let coords = format!("{:.2}, {:.2}", self.lat, self.lon);
        match &self.country {
            Some(country) => format!("{} • {} • {}", self.name, country, coords),
            None => format!("{} • {}", self.name, coords),
        }
    }
}

/// One hourly forecast row. Every field may be missing upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub temperature: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub precipitation: Option<f64>,
    pub rain: Option<f64>,
    pub showers: Option<f64>,
    pub snowfall: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub weather_code: Option<i64>,
}

/// Where the image for a run came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageResult {
    Generated { path: PathBuf },
    Fallback { path: PathBuf, reason: String },
}

impl ImageResult {
    pub fn path(&self) -> &Path {
        match self {
            ImageResult::Generated { path } | ImageResult::Fallback { path, .. } => path,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ImageResult::Fallback { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ImageResult::Generated { .. } => None,
            ImageResult::Fallback { reason, .. } => Some(reason),
        }
    }
}

/// Coerce a loosely typed JSON cell into a finite number.
///
/// Numbers and numeric strings are accepted; everything else (null, bool,
/// blank strings, NaN/inf) yields `None`.
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}
