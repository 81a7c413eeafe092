use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_IMAGE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.open-meteo.com/v1";

/// Environment variable holding the image-generation credential.
pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const MODEL_VAR: &str = "GOOGLE_MODEL";

/// Image-generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_IMAGE_MODEL.to_string(),
            base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_WEATHER_BASE_URL.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// City dataset (JSON array, or object with a `cities` array).
    pub cities: PathBuf,
    /// Where generated and placeholder images are written.
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { cities: PathBuf::from("cities500.json"), output_dir: PathBuf::from("public/img") }
    }
}

/// Per-stage limits, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub dataset_secs: u64,
    pub weather_secs: u64,
    pub image_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self { dataset_secs: 30, weather_secs: 15, image_secs: 90 }
    }
}

impl TimeoutsConfig {
    pub fn dataset(&self) -> Duration {
        Duration::from_secs(self.dataset_secs)
    }

    pub fn weather(&self) -> Duration {
        Duration::from_secs(self.weather_secs)
    }

    pub fn image(&self) -> Duration {
        Duration::from_secs(self.image_secs)
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [image]
/// api_key = "..."
/// model = "gemini-2.5-flash-image-preview"
///
/// [paths]
/// cities = "/data/cities500.json"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub image: ImageConfig,
    pub weather: WeatherConfig,
    pub paths: PathsConfig,
    pub timeouts: TimeoutsConfig,
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Load from disk and apply process environment overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut cfg = Self::load()?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "citysky", "citysky")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// `GOOGLE_API_KEY` and `GOOGLE_MODEL` win over the file. Blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_blank(API_KEY_VAR) {
            self.image.api_key = Some(key);
        }
        if let Some(model) = non_blank(MODEL_VAR) {
            self.image.model = model;
        }
    }

    pub fn set_image_api_key(&mut self, api_key: String) {
        self.image.api_key = Some(api_key);
    }

    /// Returns the image API key, if present and non-blank.
    pub fn image_api_key(&self) -> Option<&str> {
        self.image.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Diagnostic rendering of the key that never reveals it in full.
    pub fn masked_image_api_key(&self) -> Option<String> {
        let key = self.image_api_key()?;
        let chars: Vec<char> = key.chars().collect();
        let len = chars.len();
        if len <= 10 {
            return Some(format!("…(len={len})"));
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[len - 4..].iter().collect();
        Some(format!("{head}…{tail} (len={len})"))
    }
}
