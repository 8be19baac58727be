//! Error taxonomy for the analysis run
//!
//! Each layer recovers locally where it can; only exhaustion of local
//! recovery surfaces through [`PipelineError`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Reading or decoding the event source.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read event source {source_name}: {error}")]
    Read {
        source_name: String,
        #[source]
        error: std::io::Error,
    },
    #[error("event source {source_name} is not a valid JSON event array: {error}")]
    Parse {
        source_name: String,
        #[source]
        error: serde_json::Error,
    },
}

/// Failure of a single request to the model.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("quota exceeded{}", .retry_after.map(|d| format!(" (retry in {:.1}s)", d.as_secs_f64())).unwrap_or_default())]
    QuotaExceeded { retry_after: Option<Duration> },
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("model API error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("could not reach model API: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode model response: {0}")]
    Decode(String),
}

/// Failure of a whole [`ModelCaller::call`](crate::llm::ModelCaller::call) retry loop.
#[derive(Debug, Error)]
pub enum ModelCallError {
    #[error("model {model} failed: {source}")]
    Backend {
        model: String,
        #[source]
        source: BackendError,
    },
    #[error("model call failed after {attempts} attempts (last error: {last_error})")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Fatal outcome of one analysis run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    ModelCall(#[from] ModelCallError),
    #[error("failed to serialize events for the prompt: {0}")]
    Prompt(#[from] serde_json::Error),
    #[error(
        "could not recover a report from the model response (compact retry included). Raw response saved to {}",
        .artifact.display()
    )]
    ResponseRecovery { artifact: PathBuf },
    #[error("failed to write diagnostic artifact {}: {error}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}
