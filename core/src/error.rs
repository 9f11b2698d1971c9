//! Error types for the analysis pipeline.
//!
//! A typed, `thiserror`-derived error for conditions callers are expected to
//! match on, alongside `protocols::packet::PacketParseError` for per-header
//! parse failures; everything else that doesn't need a specific variant
//! returns plain `anyhow::Result`.

use thiserror::Error;

/// Fatal or caller-recoverable conditions raised by a single analysis pass.
///
/// Per spec: every kind except [`CoreError::Canceled`] and
/// [`CoreError::ParseSkip`] aborts the current pass and propagates
/// unchanged. `ParseSkip` is dropped silently by the decoder and never
/// surfaces past it; it is part of this enum only so decoder call sites can
/// match on it uniformly with `?`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bad magic or framing at the start of a capture file.
    #[error("invalid capture format: {0}")]
    InvalidCaptureFormat(String),

    /// Unexpected EOF in the middle of a record.
    #[error("truncated capture: {0}")]
    Truncated(String),

    /// The cancellation token tripped mid-pass.
    #[error("analysis canceled")]
    Canceled,

    /// A rule's summary template failed to parse or render.
    #[error("template error in rule {rule_id}: {reason}")]
    TemplateError { rule_id: String, reason: String },

    /// A single frame could not be parsed (unknown link/transport protocol).
    ///
    /// Dropped silently from flow aggregation; still contributes wire bytes
    /// to the timeseries. Never propagated with `?` — callers check for it
    /// explicitly and continue the pass.
    #[error("unparseable frame: {0}")]
    ParseSkip(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
