//! Core library for the `citysky` CLI.
//!
//! This crate defines:
//! - City dataset ingestion and search
//! - Forecast slot selection and the weather narrative
//! - Image generation with a guaranteed placeholder fallback
//! - The pipeline controller that sequences one run per city selection
//!
//! It is used by `citysky-cli`, but can also be reused by other binaries or services.

pub mod city;
pub mod config;
pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod slot;
pub mod summary;

pub use city::CityIndex;
pub use config::Config;
pub use error::CoreError;
pub use image::ImageOrchestrator;
pub use model::{CityRecord, ImageResult, WeatherSample};
pub use pipeline::{BoardState, Pipeline, PipelineTimeouts, RunBoard, RunId, RunOutcome, Stage};
pub use provider::{ImageGenerator, WeatherProvider};
pub use slot::select_slot;
pub use summary::summarize;

use std::sync::Arc;

/// Wire a pipeline from configuration: Open-Meteo for weather, Gemini for images.
pub fn pipeline_from_config(config: &Config) -> anyhow::Result<Pipeline> {
    let weather: Arc<dyn WeatherProvider> = provider::weather_provider_from_config(config)?.into();
    let generator: Arc<dyn ImageGenerator> = provider::image_generator_from_config(config)?.into();
    let images =
        ImageOrchestrator::new(generator, config.paths.output_dir.clone(), config.timeouts.image());

    Ok(Pipeline::new(weather, images)
        .with_timeouts(PipelineTimeouts { weather: config.timeouts.weather() }))
}
