use thiserror::Error;

/// Error taxonomy for the ingestion-and-reply pipeline. Transport and Db
/// failures are considered transient and eligible for in-step retry; the
/// rest fail the enclosing message without aborting the tick.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("classification error: {0}")]
    Classification(String),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Transport(_) | PipelineError::Db(_))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
