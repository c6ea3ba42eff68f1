//! Error types surfaced by the extraction core.
//!
//! Parsing-level anomalies (a node without a title, a missing subtitle) are
//! absorbed by the extractor and never show up here. Only session-level
//! failures escape a session.

use thiserror::Error;

/// Failure of one extraction session.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The scroll container is absent from the rendering. Signals a markup or
    /// selector mismatch and is never retried.
    #[error("scroll container `{selector}` not found at step {step}")]
    ContainerNotFound { step: u32, selector: String },

    /// The session's owner cancelled it. No partial result is kept.
    #[error("extraction cancelled")]
    Cancelled,

    /// The render surface failed to navigate, evaluate a script or return markup.
    #[error("render surface failure: {0:#}")]
    Surface(#[from] anyhow::Error),
}

impl ExtractionError {
    /// True for failures caused by the page no longer matching the configured contract.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::ContainerNotFound { .. })
    }
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("step size must be greater than zero")]
    ZeroStepSize,

    #[error("pause duration must be a finite, non-negative number of seconds (got {0})")]
    InvalidPause(f64),

    #[error("max consecutive no-progress steps must be at least 1")]
    ZeroPatience,

    #[error("invalid value `{value}` for {key}")]
    InvalidVar { key: String, value: String },
}
