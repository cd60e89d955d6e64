use thiserror::Error;

/// Errors the analysis core surfaces to its caller.
///
/// Most degraded states are not errors here: an unrecognized payload decodes
/// to an empty point list, and a track with fewer than two points analyzes
/// to a zeroed result. Only conditions the caller must be able to
/// distinguish from a degraded-but-valid output become variants.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No valid heart-rate samples remained after parsing and
    /// deduplication. Distinct from "zero matches within tolerance", which
    /// is reported through `AlignmentSummary`.
    #[error("no valid heart-rate samples to align")]
    InsufficientSamples,
}
