//! Image orchestration: ask the generator for a picture, fall back to an SVG poster.

use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use regex::Regex;

use crate::{error::CoreError, model::ImageResult, provider::ImageGenerator};

pub const NO_IMAGE_REASON: &str = "No image data from Google GenAI";

const MAX_STEM_LEN: usize = 40;

static UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\-_]+").expect("static pattern is valid"));

/// Prompt sent to the generator.
pub fn build_prompt(city: &str, narrative: &str, local_time: Option<&str>) -> String {
    let time_part = local_time
        .filter(|t| !t.is_empty())
        .map(|t| format!(" Time of day: {t} (local)."))
        .unwrap_or_default();
    format!(
        "Create a high-quality, photorealistic image of {city} where the weather is clearly \
         visible: {narrative}. Realistic lighting, natural colors, no text or overlays.{time_part}"
    )
}

/// Lowercase, collapse every run outside `[a-z0-9-_]` into `-`, cap at 40 chars.
pub fn sanitize_city(city: &str) -> String {
    let lowered = city.to_lowercase();
    let replaced = UNSAFE_RUN.replace_all(&lowered, "-");
    let stem: String = replaced.chars().take(MAX_STEM_LEN).collect();
    if stem.is_empty() { "city".to_string() } else { stem }
}

fn file_name(city: &str, ext: &str) -> String {
    format!("{}-{}.{}", sanitize_city(city), Utc::now().timestamp_millis(), ext)
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// 1280x720 poster with the city and narrative over a soft gradient.
pub fn fallback_svg(city: &str, narrative: &str) -> String {
    let city = escape_xml(city);
    let narrative = escape_xml(narrative);
    format!(
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="1280" height="720" viewBox="0 0 1280 720">
  <defs>
    <linearGradient id="g1" x1="0" y1="0" x2="1" y2="1">
      <stop offset="0%" stop-color="#bfe6ff"/>
      <stop offset="50%" stop-color="#ffe9c2"/>
      <stop offset="100%" stop-color="#ffd1c2"/>
    </linearGradient>
  </defs>
  <rect fill="url(#g1)" width="1280" height="720"/>
  <g fill="#0b1220">
    <text x="640" y="360" text-anchor="middle" font-family="Inter, Arial" font-weight="700" font-size="56">{city}</text>
    <text x="640" y="420" text-anchor="middle" font-family="Inter, Arial" font-size="28" opacity="0.72">{narrative}</text>
  </g>
</svg>
"##
    )
}

/// Produces exactly one image file per call under `output_dir`.
#[derive(Debug, Clone)]
pub struct ImageOrchestrator {
    generator: Arc<dyn ImageGenerator>,
    output_dir: PathBuf,
    timeout: Duration,
}

impl ImageOrchestrator {
    pub fn new(generator: Arc<dyn ImageGenerator>, output_dir: PathBuf, timeout: Duration) -> Self {
        Self { generator, output_dir, timeout }
    }

    /// Fails only when the generator has no credential; nothing is written then.
    pub fn check_credentials(&self) -> Result<(), CoreError> {
        self.generator.check_credentials()
    }

    /// Generate an image, or a placeholder when upstream yields nothing usable.
    ///
    /// Upstream errors, timeouts, empty payloads and undecodable base64 all end in
    /// [`ImageResult::Fallback`]. Only a missing credential or a local write
    /// failure is an error.
    pub async fn generate_image(
        &self,
        city: &str,
        narrative: &str,
        local_time: Option<&str>,
    ) -> Result<ImageResult, CoreError> {
        self.check_credentials()?;

        let prompt = build_prompt(city, narrative, local_time);

        let reason = match tokio::time::timeout(self.timeout, self.generator.generate_content(&prompt)).await {
            Ok(Ok(response)) => match response.first_inline_image().and_then(|i| i.data.as_deref()) {
                Some(b64) => match BASE64.decode(b64.trim()) {
                    Ok(bytes) => {
                        let path = self.persist(&file_name(city, "png"), &bytes).await?;
                        tracing::info!(path = %path.display(), "Generated image saved");
                        return Ok(ImageResult::Generated { path });
                    }
                    Err(e) => {
                        tracing::debug!("Discarding undecodable image payload: {e}");
                        NO_IMAGE_REASON.to_string()
                    }
                },
                None => NO_IMAGE_REASON.to_string(),
            },
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("Image generation timed out after {:?}", self.timeout),
        };

        tracing::warn!(%reason, "Image generation unavailable, using fallback");
        let svg = fallback_svg(city, narrative);
        let path = self.persist(&file_name(city, "svg"), svg.as_bytes()).await?;
        Ok(ImageResult::Fallback { path, reason })
    }

    async fn persist(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, CoreError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}
