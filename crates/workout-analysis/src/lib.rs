//! Analysis core for recorded running activities.
//!
//! Ingests tracks from heterogeneous sources (GPX-style XML, flat point
//! lists, vendor feature-set exports) plus optional auxiliary heart-rate
//! streams, and derives distance, pace, per-kilometer splits, elevation
//! gain, chart samples, best-effort windows, and a deterministic narrative
//! of pacing quality.
//!
//! Every stage degrades rather than fails: unrecognized payloads decode to
//! an empty track, tracks with fewer than two points analyze to a zeroed
//! result, and only a heart-rate stream with zero valid samples surfaces a
//! typed error. The whole pipeline is pure and stateless per call;
//! concurrent analyses need no coordination.

pub mod alignment;
pub mod analyzer;
pub mod decoder;
pub mod errors;
pub mod insights;
pub mod models;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::models::{AlignmentSummary, AnalysisOptions, AnalysisResult};

/// Run the full pipeline over raw payloads: decode, analyze, optionally
/// align a heart-rate stream, and append the narrative.
///
/// A heart-rate payload with no usable samples degrades to an unaligned
/// result (`None` alignment summary) rather than failing the analysis.
pub fn analyze_payload(
    track: &Bytes,
    heart_rate: Option<&Bytes>,
    options: &AnalysisOptions,
) -> (AnalysisResult, Option<AlignmentSummary>) {
    let points = decoder::decode(track);
    debug!(points = points.len(), "decoded track payload");

    let mut result = analyzer::analyze(&points, options);

    let alignment = heart_rate.and_then(|payload| {
        let samples = alignment::parse_heart_rate_samples(payload);
        match alignment::align(&mut result, &points, &samples, options.hr_tolerance_ms) {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("heart-rate stream not aligned: {e}");
                None
            }
        }
    });

    result.insights = insights::generate(&result, options);
    (result, alignment)
}
