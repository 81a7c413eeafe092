//! City index: ingestion of the loosely typed city dataset and name search.

use std::path::Path;

use serde_json::Value;

use crate::{error::CoreError, model::CityRecord, model::coerce_number};

/// Maximum number of search hits handed to the UI.
pub const SEARCH_LIMIT: usize = 30;

/// Canonical field → accepted source spellings, in priority order.
/// Dotted aliases address one level of nesting (`coord.lat`).
const NAME_ALIASES: &[&str] = &["name", "ascii", "city", "town", "display_name"];
const COUNTRY_ALIASES: &[&str] = &["country", "countryCode", "cc", "country_name"];
const LAT_ALIASES: &[&str] = &["lat", "latitude", "y", "coord.lat"];
const LON_ALIASES: &[&str] = &["lon", "lng", "longitude", "x", "coord.lon"];

/// Ordered, immutable set of normalized cities.
#[derive(Debug, Clone, Default)]
pub struct CityIndex {
    cities: Vec<CityRecord>,
}

impl CityIndex {
    /// Normalize raw records; anything that does not yield a name and finite
    /// coordinates is dropped.
    pub fn load<'a, I>(raw: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let cities: Vec<CityRecord> = raw.into_iter().filter_map(normalize_city).collect();
        Self { cities }
    }

    /// Build from a whole dataset document: either a bare array or `{ "cities": [...] }`.
    pub fn from_document(doc: &Value) -> Self {
        let records = match doc {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => match map.get("cities") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        };
        let index = Self::load(records);
        tracing::debug!(kept = index.len(), total = records.len(), "City dataset normalized");
        index
    }

    /// Read and normalize a dataset file.
    pub async fn from_path(path: &Path) -> Result<Self, CoreError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CoreError::Dataset(format!("{}: {e}", path.display())))?;
        let doc: Value = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Dataset(format!("{}: {e}", path.display())))?;
        Ok(Self::from_document(&doc))
    }

    /// Case-insensitive substring match on the name, dataset order, at most
    /// [`SEARCH_LIMIT`] hits. A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<&CityRecord> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.cities
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&needle))
            .take(SEARCH_LIMIT)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CityRecord> {
        self.cities.iter()
    }
}

fn normalize_city(raw: &Value) -> Option<CityRecord> {
    let name = first_text(raw, NAME_ALIASES)?;
    let country = first_text(raw, COUNTRY_ALIASES);
    let lat = first_present(raw, LAT_ALIASES).and_then(coerce_number)?;
    let lon = first_present(raw, LON_ALIASES).and_then(coerce_number)?;

    Some(CityRecord { name, country, lat, lon })
}

fn lookup<'a>(raw: &'a Value, alias: &str) -> Option<&'a Value> {
    alias.split('.').try_fold(raw, |node, key| node.get(key))
}

/// First alias holding a non-empty string.
fn first_text(raw: &Value, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|alias| lookup(raw, alias))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

/// First alias that is present and not null. Coercion happens afterwards, so a
/// garbage value in a higher-priority alias is not masked by a lower one.
fn first_present<'a>(raw: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().filter_map(|alias| lookup(raw, alias)).find(|v| !v.is_null())
}
