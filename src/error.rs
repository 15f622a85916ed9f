use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::reader::SampleBinCounts;

#[derive(Debug, Error, Diagnostic)]
pub enum SeqError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied to view sample {0}")]
    PermissionDenied(String),

    #[error("signal store unavailable at {path}: {message}")]
    StoreUnavailable { path: String, message: String },

    #[error("no normalization factor for bin size {bin_size} in {path}")]
    NormalizationMissing { path: String, bin_size: u32 },

    #[error("unsupported bin size {requested} (supported: {supported})")]
    InvalidBinSize { requested: i64, supported: String },

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("catalog query failed: {0}")]
    Catalog(String),

    #[error("query for sample {sample} timed out after {millis} ms")]
    Timeout { sample: String, millis: u64 },

    #[error("batch worker unavailable: {0}")]
    Worker(String),

    #[error("missing config file seqbins.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl SeqError {
    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SeqError::NotFound(_) | SeqError::PermissionDenied(_) | SeqError::MissingConfig => 2,
            SeqError::StoreUnavailable { .. }
            | SeqError::NormalizationMissing { .. }
            | SeqError::Catalog(_)
            | SeqError::Timeout { .. }
            | SeqError::Worker(_) => 3,
            _ => 1,
        }
    }
}

impl From<rusqlite::Error> for SeqError {
    fn from(err: rusqlite::Error) -> Self {
        SeqError::Catalog(err.to_string())
    }
}

/// A reader failure that still carries the zero-bin skeleton built for the
/// request. Callers that only need "something per sample" keep `partial`.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ReadFailure {
    pub partial: SampleBinCounts,
    #[source]
    pub error: SeqError,
}

impl ReadFailure {
    pub fn into_parts(self) -> (SampleBinCounts, SeqError) {
        (self.partial, self.error)
    }
}
