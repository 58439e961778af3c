use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::SessionState;

#[derive(Debug, Error, Diagnostic)]
pub enum AssistantError {
    #[error("{operation} requires {required}; run the earlier pipeline steps first")]
    NotLoaded {
        operation: &'static str,
        required: &'static str,
    },

    #[error("{operation} is not allowed in state {state}")]
    IllegalState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("no samples matched pattern '{pattern}' (excluding '{exclude}')")]
    EmptySelection { pattern: String, exclude: String },

    #[error("formula error: {0}")]
    Formula(String),

    #[error("coefficient '{name}' not found; available: {available}")]
    ContrastNotFound { name: String, available: String },

    #[error("invalid sample pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("missing column '{column}' in {table}")]
    MissingColumn { table: &'static str, column: String },

    #[error("probe '{0}' is not present in the platform annotation table")]
    UnknownProbe(String),

    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("no features left to fit; normalization filtered out every feature")]
    NoFeatures,

    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("invalid GEO series accession: {0}")]
    InvalidSeriesAccession(String),

    #[error("invalid GEO platform accession: {0}")]
    InvalidPlatformAccession(String),

    #[error("platform {platform} not found in series {series}")]
    PlatformNotFound { series: String, platform: String },

    #[error("malformed SOFT text at line {line}: {message}")]
    SoftParse { line: usize, message: String },

    #[error("GEO request failed: {0}")]
    GeoHttp(String),

    #[error("GEO returned status {status}: {message}")]
    GeoStatus { status: u16, message: String },

    #[error("model gateway request failed: {0}")]
    GatewayHttp(String),

    #[error("model gateway returned status {status}: {message}")]
    GatewayStatus { status: u16, message: String },

    #[error("unexpected model gateway response: {0}")]
    GatewayResponse(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
