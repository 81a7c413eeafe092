use std::time::Duration;

use thiserror::Error;

/// Failures that end a pipeline run.
///
/// Image-generation upstream failures are deliberately absent: they turn into a
/// fallback image instead of an error.
#[derive(Debug, Error)]
pub enum CoreError {
    /// City dataset could not be read or parsed.
    #[error("Could not load city dataset: {0}")]
    Dataset(String),

    #[error("No city matches '{0}'")]
    NoMatch(String),

    /// Weather provider failed or returned something unusable.
    #[error("Failed to load weather: {0}")]
    Weather(String),

    #[error(
        "{var} not configured.\n\
         Hint: run `citysky configure` or set {var} in the environment or a .env file."
    )]
    MissingCredential { var: &'static str },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Plain text shown to the user when a run ends in `Error`.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Configuration problems are not worth retrying.
    pub fn is_config(&self) -> bool {
        matches!(self, CoreError::MissingCredential { .. })
    }
}
