use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use chrono::{DateTime, Utc};
use citysky_core::{
    CityIndex, Config, CoreError, RunOutcome,
    config::{API_KEY_VAR, DEFAULT_IMAGE_MODEL},
    pipeline_from_config,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "citysky", version, about = "City weather, told in a sentence and a picture")]
pub struct Cli {
    /// City dataset to use instead of the configured one.
    #[arg(long, global = true)]
    pub cities: Option<PathBuf>,

    /// Directory for generated images instead of the configured one.
    #[arg(long, global = true)]
    pub out_dir: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the image-generation API key and model.
    Configure,

    /// List cities whose name contains the query.
    Search {
        query: String,
    },

    /// Weather narrative and image for a city.
    Show {
        /// City name or part of it.
        query: String,

        /// Which search hit to use, starting at 1.
        #[arg(long, default_value_t = 1)]
        pick: usize,

        /// Reference instant (RFC 3339); if absent, means "now".
        #[arg(long)]
        date: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show configuration diagnostics without revealing secrets.
    Doctor,
}

impl Cli {
    pub fn init_logging(&self) {
        let default = if self.verbose { "debug" } else { "warn" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    pub async fn run(self) -> anyhow::Result<ExitCode> {
        match &self.command {
            Command::Configure => configure()?,
            Command::Doctor => doctor(&self.config()?)?,
            Command::Search { query } => {
                let config = self.config()?;
                match load_index(&config).await {
                    Ok(index) => {
                        for city in index.search(query) {
                            println!("{}", city.display_line());
                        }
                    }
                    Err(err) => return Ok(report(&err)),
                }
            }
            Command::Show { query, pick, date, json } => {
                let config = self.config()?;
                let reference = parse_reference(date.as_deref())?;
                return show(&config, query, *pick, reference, *json).await;
            }
        }

        Ok(ExitCode::SUCCESS)
    }

    /// Config file + environment, then command-line overrides.
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load_with_env()?;
        if let Some(cities) = &self.cities {
            config.paths.cities = cities.clone();
        }
        if let Some(out_dir) = &self.out_dir {
            config.paths.output_dir = out_dir.clone();
        }
        Ok(config)
    }
}

fn parse_reference(date: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    date.map(|raw| {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("Invalid --date '{raw}', expected RFC 3339"))
    })
    .transpose()
}

async fn load_index(config: &Config) -> Result<CityIndex, CoreError> {
    let after = config.timeouts.dataset();
    tokio::time::timeout(after, CityIndex::from_path(&config.paths.cities))
        .await
        .map_err(|_| CoreError::Timeout { stage: "City dataset load", after })?
}

async fn show(
    config: &Config,
    query: &str,
    pick: usize,
    reference: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let index = match load_index(config).await {
        Ok(index) => index,
        Err(err) => return Ok(report(&err)),
    };

    let hits = index.search(query);
    let Some(city) = pick.checked_sub(1).and_then(|i| hits.get(i)).map(|c| (*c).clone()) else {
        return Ok(report(&CoreError::NoMatch(query.to_string())));
    };

    let pipeline = pipeline_from_config(config)?;

    // Status lines go to stderr while the run is in flight.
    let mut rx = pipeline.board().subscribe();
    let printer = tokio::spawn(async move {
        let mut last: Option<String> = None;
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().status.clone();
            if let Some(line) = status.filter(|s| last.as_ref() != Some(s)) {
                eprintln!("{line}");
                last = Some(line);
            }
        }
    });

    let result = pipeline.select_at(city, reference.unwrap_or_else(Utc::now)).await;
    printer.abort();

    match result {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                render(&outcome);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(report(&err)),
    }
}

fn render(outcome: &RunOutcome) {
    println!("{}", outcome.headline());
    if outcome.narrative.is_empty() {
        println!("(no notable conditions)");
    } else {
        println!("{}", outcome.narrative);
    }
    println!("Image: {}", outcome.image.path().display());
    if let Some(reason) = outcome.image.reason() {
        eprintln!("Note: Using fallback image. Reason: {reason}");
    }
}

/// The only place failures reach the user.
fn report(err: &CoreError) -> ExitCode {
    eprintln!("Error:\n  {}", err.user_message().replace('\n', "\n  "));
    ExitCode::from(exit_status(err))
}

/// 2 for configuration problems, 1 for everything else.
fn exit_status(err: &CoreError) -> u8 {
    if err.is_config() { 2 } else { 1 }
}

fn configure() -> anyhow::Result<()> {
    // Start from the file only, so environment values are not persisted by accident.
    let mut config = Config::load()?;

    let key = inquire::Password::new("Google API key:")
        .without_confirmation()
        .with_help_message("Stored in the citysky config file")
        .prompt()
        .context("Failed to read API key")?;
    let model = inquire::Text::new("Image model:")
        .with_default(&config.image.model)
        .prompt()
        .context("Failed to read model name")?;

    if !key.trim().is_empty() {
        config.set_image_api_key(key.trim().to_string());
    }
    config.image.model = chosen_model(&model, &config.image.model);
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

/// A blank answer keeps the current model, or the default when none is set.
fn chosen_model(answer: &str, current: &str) -> String {
    [answer.trim(), current.trim()]
        .into_iter()
        .find(|m| !m.is_empty())
        .unwrap_or(DEFAULT_IMAGE_MODEL)
        .to_string()
}

fn doctor(config: &Config) -> anyhow::Result<()> {
    let config_path = Config::config_file_path()?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let dot_env = cwd.join(".env");

    println!("config file:  {} (exists: {})", config_path.display(), config_path.exists());
    println!("cwd .env:     {} (exists: {})", dot_env.display(), dot_env.exists());
    match config.masked_image_api_key() {
        Some(masked) => println!("{API_KEY_VAR}: set, {masked}"),
        None => println!("{API_KEY_VAR}: not set"),
    }
    println!("image model:  {}", config.image.model);
    println!(
        "cities:       {} (exists: {})",
        config.paths.cities.display(),
        config.paths.cities.exists()
    );
    println!("output dir:   {}", config.paths.output_dir.display());
    Ok(())
}
