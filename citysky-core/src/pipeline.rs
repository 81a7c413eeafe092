//! Pipeline controller: city → weather → narrative → image, one run per selection.
//!
//! Every run gets a fresh [`RunId`]. Stage updates and the final result are
//! published on a [`RunBoard`] and only land if they belong to the newest run,
//! so a slow, superseded run can never overwrite what a newer one shows.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    error::CoreError,
    image::ImageOrchestrator,
    model::{CityRecord, ImageResult, WeatherSample},
    provider::WeatherProvider,
    slot::{local_time_label, select_slot_with_offset},
    summary::{format_temperature, summarize},
};

/// Monotonically increasing run identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Selecting,
    FetchingWeather,
    Summarizing,
    GeneratingImage,
    Done,
    Error,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Error)
    }
}

/// Everything one run carries between stages. Owned by that run only.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub city: CityRecord,
    pub reference: DateTime<Utc>,
}

/// Finished run, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub city: CityRecord,
    pub slot_time: Option<String>,
    pub timezone: Option<String>,
    pub local_time: String,
    pub sample: WeatherSample,
    pub narrative: String,
    pub image: ImageResult,
}

impl RunOutcome {
    /// "Paris, FR, 12.3°C (54.1°F)"
    pub fn headline(&self) -> String {
        match self.sample.temperature {
            Some(t) => format!("{}, {}", self.city.label(), format_temperature(t)),
            None => self.city.label(),
        }
    }
}

/// What the UI shows. Written only through generation-checked updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardState {
    pub latest: RunId,
    pub stage: Stage,
    pub status: Option<String>,
    pub error: Option<String>,
    pub result: Option<RunOutcome>,
}

/// Shared view of the newest run.
#[derive(Debug, Clone)]
pub struct RunBoard {
    tx: Arc<watch::Sender<BoardState>>,
}

impl Default for RunBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl RunBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BoardState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> BoardState {
        self.tx.borrow().clone()
    }

    /// A newer run takes over the board. Older ids are ignored. The previous
    /// result stays visible until the new run is `Done`.
    pub fn begin(&self, run_id: RunId, status: impl Into<String>) -> bool {
        let status = status.into();
        self.tx.send_if_modified(|state| {
            if run_id <= state.latest {
                return false;
            }
            state.latest = run_id;
            state.stage = Stage::Selecting;
            state.status = Some(status);
            state.error = None;
            true
        })
    }

    pub fn stage(&self, run_id: RunId, stage: Stage, status: Option<String>) -> bool {
        self.tx.send_if_modified(|state| {
            if state.latest != run_id || state.stage.is_terminal() {
                return false;
            }
            state.stage = stage;
            state.status = status;
            true
        })
    }

    /// Result and status change together.
    pub fn complete(&self, outcome: RunOutcome) -> bool {
        self.tx.send_if_modified(|state| {
            if state.latest != outcome.run_id {
                return false;
            }
            state.stage = Stage::Done;
            state.status = outcome
                .image
                .reason()
                .map(|r| format!("Note: Using fallback image. Reason: {r}"));
            state.error = None;
            state.result = Some(outcome);
            true
        })
    }

    pub fn fail(&self, run_id: RunId, message: String) -> bool {
        self.tx.send_if_modified(|state| {
            if state.latest != run_id {
                return false;
            }
            state.stage = Stage::Error;
            state.status = None;
            state.error = Some(message);
            true
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineTimeouts {
    pub weather: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self { weather: Duration::from_secs(15) }
    }
}

/// Sequences the stages of a run and reports them on the board.
#[derive(Debug, Clone)]
pub struct Pipeline {
    weather: Arc<dyn WeatherProvider>,
    images: ImageOrchestrator,
    board: RunBoard,
    next_run: Arc<AtomicU64>,
    timeouts: PipelineTimeouts,
}

impl Pipeline {
    pub fn new(weather: Arc<dyn WeatherProvider>, images: ImageOrchestrator) -> Self {
        Self {
            weather,
            images,
            board: RunBoard::new(),
            next_run: Arc::new(AtomicU64::new(1)),
            timeouts: PipelineTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: PipelineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn board(&self) -> &RunBoard {
        &self.board
    }

    /// Run the pipeline for `city` as of now.
    pub async fn select(&self, city: CityRecord) -> Result<RunOutcome, CoreError> {
        self.select_at(city, Utc::now()).await
    }

    /// Run the pipeline for `city` with an explicit reference instant.
    pub async fn select_at(
        &self,
        city: CityRecord,
        reference: DateTime<Utc>,
    ) -> Result<RunOutcome, CoreError> {
        let ctx = RunContext {
            run_id: RunId(self.next_run.fetch_add(1, Ordering::Relaxed)),
            city,
            reference,
        };

        self.board.begin(ctx.run_id, format!("Selected {}", ctx.city.label()));
        tracing::info!(run = %ctx.run_id, city = %ctx.city.label(), "Run started");

        match self.execute(&ctx).await {
            Ok(outcome) => {
                tracing::info!(run = %ctx.run_id, fallback = outcome.image.is_fallback(), "Run done");
                if !self.board.complete(outcome.clone()) {
                    tracing::debug!(run = %ctx.run_id, "Superseded run result discarded");
                }
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(run = %ctx.run_id, "Run failed: {err}");
                self.board.fail(ctx.run_id, err.user_message());
                Err(err)
            }
        }
    }

    async fn execute(&self, ctx: &RunContext) -> Result<RunOutcome, CoreError> {
        // Without a credential no image request can be made, so stop before any I/O.
        self.images.check_credentials()?;

        self.board.stage(
            ctx.run_id,
            Stage::FetchingWeather,
            Some(format!("Fetching weather for {}...", ctx.city.name)),
        );
        let forecast = with_timeout(
            "Weather fetch",
            self.timeouts.weather,
            self.weather.hourly_forecast(ctx.city.lat, ctx.city.lon),
        )
        .await?
        .map_err(|e| CoreError::Weather(format!("{e:#}")))?;

        self.board.stage(ctx.run_id, Stage::Summarizing, Some("Summarizing conditions...".into()));
        let idx = select_slot_with_offset(forecast.times(), ctx.reference, forecast.offset());
        let sample = forecast.sample_at(idx);
        let narrative = summarize(&sample);
        let local_time = local_time_label(ctx.reference, forecast.utc_offset_seconds);
        tracing::debug!(run = %ctx.run_id, slot = idx, %narrative, "Conditions summarized");

        self.board.stage(ctx.run_id, Stage::GeneratingImage, Some("Generating image...".into()));
        let image = self
            .images
            .generate_image(&ctx.city.name, &narrative, Some(local_time.as_str()))
            .await?;

        Ok(RunOutcome {
            run_id: ctx.run_id,
            city: ctx.city.clone(),
            slot_time: forecast.times().get(idx).cloned(),
            timezone: forecast.timezone.clone(),
            local_time,
            sample,
            narrative,
            image,
        })
    }
}

async fn with_timeout<F, T>(stage: &'static str, after: Duration, fut: F) -> Result<T, CoreError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(after, fut).await.map_err(|_| CoreError::Timeout { stage, after })
}
