//! Alignment of an independently sampled heart-rate stream onto a
//! primary track by nearest-timestamp matching within a tolerance.
//!
//! Matched samples are folded into splits and chart samples, but only
//! where heart rate embedded in the track itself has not already filled
//! the field. The embedded source takes precedence.

use std::collections::HashMap;
use std::collections::HashSet;

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use crate::analyzer::{haversine_m, sort_by_timestamp};
use crate::decoder::parse_iso_timestamp;
use crate::errors::AnalysisError;
use crate::models::{AlignmentSummary, AnalysisResult, HeartRateSample, Point};

/// Epoch values below this magnitude are seconds, not milliseconds.
const EPOCH_MS_THRESHOLD: f64 = 1e11;

/// Parse a heart-rate sample payload.
///
/// Accepts a JSON array of objects carrying `heart_rate`/`hr` and one of
/// `start_time`/`timestamp`/`time` (epoch milliseconds, epoch seconds, or
/// ISO-8601); the array may also sit one level inside a wrapper object.
/// Invalid entries are skipped; unparsable payloads yield an empty vec.
pub fn parse_heart_rate_samples(content: &Bytes) -> Vec<HeartRateSample> {
    let Ok(value) = serde_json::from_slice::<Value>(content) else {
        return Vec::new();
    };
    let items = match &value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.values().find_map(Value::as_array),
        _ => None,
    };
    items.map_or_else(Vec::new, |items| {
        items.iter().filter_map(sample_from_json).collect()
    })
}

fn sample_from_json(value: &Value) -> Option<HeartRateSample> {
    let obj = value.as_object()?;
    let bpm = obj
        .get("heart_rate")
        .or_else(|| obj.get("hr"))
        .and_then(Value::as_f64)?;
    if bpm <= 0.0 || !bpm.is_finite() {
        return None;
    }
    let time = obj
        .get("start_time")
        .or_else(|| obj.get("timestamp"))
        .or_else(|| obj.get("time"))?;
    let timestamp_ms = match time {
        Value::Number(n) => {
            let v = n.as_f64()?;
            // Magnitude disambiguates seconds from milliseconds.
            if v.abs() < EPOCH_MS_THRESHOLD {
                (v * 1000.0) as i64
            } else {
                v as i64
            }
        }
        Value::String(s) => (parse_iso_timestamp(s)? * 1000.0) as i64,
        _ => return None,
    };
    Some(HeartRateSample {
        timestamp_ms,
        bpm: bpm.round() as u32,
    })
}

/// Deduplicate by `(timestamp, bpm)`, preserving first-occurrence order.
fn deduplicate(samples: &[HeartRateSample]) -> Vec<HeartRateSample> {
    let mut seen = HashSet::new();
    samples
        .iter()
        .copied()
        .filter(|s| seen.insert((s.timestamp_ms, s.bpm)))
        .collect()
}

/// Align heart-rate samples onto an analyzed track.
///
/// `points` must be the same sequence the analysis was produced from; the
/// per-point timestamps and cumulative distances are rebuilt here. Fails
/// only when zero valid samples remain after deduplication; zero matches
/// within tolerance is a valid outcome, reported through the summary.
pub fn align(
    result: &mut AnalysisResult,
    points: &[Point],
    samples: &[HeartRateSample],
    tolerance_ms: u32,
) -> Result<AlignmentSummary, AnalysisError> {
    let samples = deduplicate(samples);
    if samples.is_empty() {
        return Err(AnalysisError::InsufficientSamples);
    }

    // Timestamp index over timed points, carrying each point's cumulative
    // distance along the track (same ordering the analyzer uses).
    let sorted = sort_by_timestamp(points);
    let mut index: Vec<(i64, f64)> = Vec::new();
    let mut cumulative = 0.0;
    for (i, pt) in sorted.iter().enumerate() {
        if i > 0 {
            cumulative += haversine_m(&sorted[i - 1], pt);
        }
        if let Some(ts) = pt.timestamp {
            index.push(((ts * 1000.0) as i64, cumulative));
        }
    }

    let mut matched = 0usize;
    let mut chart_fill: HashMap<usize, (f64, u32)> = HashMap::new();
    let mut split_fill: HashMap<usize, (f64, u32)> = HashMap::new();

    for sample in &samples {
        let Some((distance_m, diff_ms)) = nearest_track_position(&index, sample.timestamp_ms)
        else {
            continue;
        };
        if diff_ms > i64::from(tolerance_ms) {
            continue;
        }
        matched += 1;

        if let Some(chart_idx) = nearest_chart_index(&result.chart.km, distance_m) {
            let entry = chart_fill.entry(chart_idx).or_insert((0.0, 0));
            entry.0 += f64::from(sample.bpm);
            entry.1 += 1;
        }

        let split_idx = (distance_m / 1000.0) as usize;
        if split_idx < result.splits.len() {
            let entry = split_fill.entry(split_idx).or_insert((0.0, 0));
            entry.0 += f64::from(sample.bpm);
            entry.1 += 1;
        }
    }

    // Embedded heart rate takes precedence; only fill what is absent.
    for (idx, (sum, count)) in &chart_fill {
        if result.chart.heart_rate[*idx].is_none() {
            result.chart.heart_rate[*idx] = Some(sum / f64::from(*count));
        }
    }
    for (idx, (sum, count)) in &split_fill {
        if result.splits[*idx].heart_rate_bpm.is_none() {
            result.splits[*idx].heart_rate_bpm = Some(sum / f64::from(*count));
        }
    }

    // Track-wide aggregates from the full stream, matched or not, unless a
    // richer embedded source already populated them.
    if result.summary.avg_heart_rate_bpm.is_none() {
        let bpms: Vec<f64> = samples.iter().map(|s| f64::from(s.bpm)).collect();
        let sum: f64 = bpms.iter().sum();
        result.summary.avg_heart_rate_bpm = Some(sum / bpms.len() as f64);
        result.summary.max_heart_rate_bpm = bpms.iter().copied().reduce(f64::max);
        result.summary.min_heart_rate_bpm = bpms.iter().copied().reduce(f64::min);
    }

    let summary = AlignmentSummary {
        matched,
        unmatched: samples.len() - matched,
        samples_total: samples.len(),
        track_points: points.len(),
        tolerance_ms,
    };
    debug!(
        matched = summary.matched,
        unmatched = summary.unmatched,
        "aligned heart-rate stream"
    );
    Ok(summary)
}

/// Cumulative track distance of the timed point nearest to `ts_ms`, with
/// the absolute time difference. Equal distances prefer the earlier index.
fn nearest_track_position(index: &[(i64, f64)], ts_ms: i64) -> Option<(f64, i64)> {
    if index.is_empty() {
        return None;
    }
    let insert = index.partition_point(|&(ts, _)| ts < ts_ms);
    let mut best: Option<(f64, i64)> = None;
    // Earlier candidate first so ties resolve toward it.
    for candidate in [insert.checked_sub(1), Some(insert)].into_iter().flatten() {
        if let Some(&(ts, dist)) = index.get(candidate) {
            let diff = (ts - ts_ms).abs();
            if best.is_none_or(|(_, b)| diff < b) {
                best = Some((dist, diff));
            }
        }
    }
    best
}

/// Index of the chart sample whose cumulative distance is closest to
/// `distance_m`. The `km` array is non-decreasing.
fn nearest_chart_index(km: &[f64], distance_m: f64) -> Option<usize> {
    if km.is_empty() {
        return None;
    }
    let target_km = distance_m / 1000.0;
    let insert = km.partition_point(|&v| v < target_km);
    let mut best: Option<(usize, f64)> = None;
    for candidate in [insert.checked_sub(1), Some(insert)].into_iter().flatten() {
        if let Some(&v) = km.get(candidate) {
            let diff = (v - target_km).abs();
            if best.is_none_or(|(_, b)| diff < b) {
                best = Some((candidate, diff));
            }
        }
    }
    best.map(|(idx, _)| idx)
}
