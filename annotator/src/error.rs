//! The pipeline error taxonomy. Every fatal condition ends up as one of these
//! variants; advisory conditions are logged and never surface here.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing tool, unwritable directory, invalid option combination.
    /// Detected eagerly, before any stage runs.
    #[error("configuration error: {0}")]
    Config(String),
    /// A stage produced zero usable records. The run cannot yield a meaningful
    /// result, so this is fatal at the point of detection.
    #[error("{stage}: no usable records left ({detail})")]
    EmptyResult { stage: &'static str, detail: String },
    /// Non-zero exit of an invoked binary. Never retried: the tools are assumed
    /// deterministic for a given input.
    #[error("external tool failed (exit {status}): {command}\n{stderr}")]
    ToolFailure {
        command: String,
        status: i32,
        stderr: String,
    },
    /// An expected artifact of a predecessor stage does not exist.
    #[error("{stage}: required artifact missing: {}", path.display())]
    MissingArtifact { stage: &'static str, path: PathBuf },
    #[error("failed to parse {what}: {msg}")]
    Parse { what: String, msg: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn parse<W: Into<String>, M: std::fmt::Display>(what: W, msg: M) -> Self {
        PipelineError::Parse {
            what: what.into(),
            msg: msg.to_string(),
        }
    }
}

impl From<definitions::ParseError> for PipelineError {
    fn from(e: definitions::ParseError) -> Self {
        PipelineError::parse("record", e)
    }
}
