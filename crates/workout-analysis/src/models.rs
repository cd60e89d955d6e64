use serde::{Deserialize, Serialize};

/// A single geolocated track point as produced by the decoder.
///
/// Every field beyond the coordinates is optional: real exports routinely
/// lack elevation, timestamps, or sensor channels, and every consumer must
/// handle the absent case explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    pub elevation: Option<f64>,
    /// Seconds since the Unix epoch.
    pub timestamp: Option<f64>,
    /// Steps per minute.
    pub cadence: Option<f64>,
    /// Beats per minute.
    pub heart_rate: Option<f64>,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            elevation: None,
            timestamp: None,
            cadence: None,
            heart_rate: None,
        }
    }
}

/// The interval between two temporally adjacent points.
///
/// Derived during analysis, never persisted. `elapsed_s` is `None` when
/// either endpoint lacks a timestamp or the clock ran backwards across the
/// segment; distance still counts in that case, pace does not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub distance_m: f64,
    pub elapsed_s: Option<f64>,
    pub pace_s_per_km: Option<f64>,
}

/// One kilometer of cumulative distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Split {
    /// 1-based kilometer index.
    pub index: u32,
    pub pace_s_per_km: Option<f64>,
    pub elevation_gain_m: f64,
    pub cadence_spm: Option<f64>,
    pub heart_rate_bpm: Option<f64>,
}

/// A fixed-distance-interval snapshot used for plotting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartSample {
    pub cumulative_km: f64,
    pub pace_s_per_km: Option<f64>,
    pub elevation_m: Option<f64>,
    pub heart_rate_bpm: Option<f64>,
}

/// Chart samples as parallel arrays of equal length, the shape the
/// plotting layer consumes directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub km: Vec<f64>,
    pub pace_s: Vec<Option<f64>>,
    pub elevation: Vec<Option<f64>>,
    pub heart_rate: Vec<Option<f64>>,
}

impl ChartSeries {
    pub fn push(&mut self, sample: ChartSample) {
        self.km.push(sample.cumulative_km);
        self.pace_s.push(sample.pace_s_per_km);
        self.elevation.push(sample.elevation_m);
        self.heart_rate.push(sample.heart_rate_bpm);
    }

    pub fn len(&self) -> usize {
        self.km.len()
    }

    pub fn is_empty(&self) -> bool {
        self.km.is_empty()
    }
}

/// Best (lowest) pace sustained over each canonical target distance,
/// found via sliding window independently of splits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BestEfforts {
    pub best_400m_pace_s: Option<f64>,
    pub best_1k_pace_s: Option<f64>,
    pub best_5k_pace_s: Option<f64>,
}

/// Pace over one ~200 m sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaceWindow {
    pub pace_s_per_km: f64,
    pub window_m: f64,
}

/// The five fastest and five slowest ~200 m windows over the track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaceExtremes {
    pub fastest: Vec<PaceWindow>,
    pub slowest: Vec<PaceWindow>,
}

/// Track-wide summary metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub distance_m: f64,
    pub duration_s: f64,
    pub avg_pace_s_per_km: Option<f64>,
    pub elevation_gain_m: f64,
    pub avg_cadence_spm: Option<f64>,
    pub avg_heart_rate_bpm: Option<f64>,
    pub max_heart_rate_bpm: Option<f64>,
    pub min_heart_rate_bpm: Option<f64>,
    pub calories_kcal: f64,
}

/// A heart-rate sample from an independently recorded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub timestamp_ms: i64,
    pub bpm: u32,
}

/// Which narrative group an insight belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSection {
    Summary,
    WentWell,
    WatchOut,
    Bmi,
}

/// One human-readable observation derived from computed metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub section: InsightSection,
    pub text: String,
}

/// Aggregate output of one analysis request.
///
/// Created fresh per call; the surrounding system decides whether to
/// persist it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: Summary,
    pub splits: Vec<Split>,
    pub chart: ChartSeries,
    pub best_efforts: BestEfforts,
    pub pace_extremes: PaceExtremes,
    pub insights: Vec<Insight>,
}

/// Outcome counters from aligning an auxiliary heart-rate stream onto a
/// track, for observability and test verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlignmentSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub samples_total: usize,
    pub track_points: usize,
    pub tolerance_ms: u32,
}

/// Per-call configuration, passed by value and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AnalysisOptions {
    /// Body weight for the calorie estimate; a 70 kg default applies when
    /// absent.
    pub weight_kg: Option<f64>,
    /// Body height; BMI insights are produced only when both height and
    /// weight are supplied.
    pub height_cm: Option<f64>,
    /// Maximum time difference for matching an auxiliary heart-rate sample
    /// to a track timestamp.
    pub hr_tolerance_ms: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            weight_kg: None,
            height_cm: None,
            hr_tolerance_ms: 5_000,
        }
    }
}
