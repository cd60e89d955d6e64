//! The geometric and temporal core: turns an ordered point sequence into
//! distance, duration, elevation gain, per-kilometer splits, chart samples,
//! best-effort paces, and pace-extreme windows.
//!
//! Pure function of its input plus per-call options; concurrent analyses
//! share no state.

use std::cmp::Ordering;

use geo::{Distance as _, Haversine};

use crate::models::{
    AnalysisOptions, AnalysisResult, BestEfforts, ChartSample, PaceExtremes, PaceWindow, Point,
    Segment, Split, Summary,
};

/// A chart sample is emitted every time this much unsampled distance
/// accumulates.
pub const CHART_SAMPLE_INTERVAL_M: f64 = 100.0;
/// Splits close on full kilometers.
pub const SPLIT_DISTANCE_M: f64 = 1000.0;
/// Window size for the fastest/slowest pace scan.
pub const PACE_EXTREME_WINDOW_M: f64 = 200.0;
/// How many fastest/slowest windows are retained.
pub const PACE_EXTREME_COUNT: usize = 5;
/// Canonical best-effort target distances in meters.
pub const BEST_EFFORT_TARGETS_M: [f64; 3] = [400.0, 1000.0, 5000.0];

/// Crude running energy cost: kcal per kilogram of body weight per
/// kilometer.
pub const KCAL_PER_KG_PER_KM: f64 = 1.036;
/// Body weight assumed when the caller supplies none.
pub const DEFAULT_WEIGHT_KG: f64 = 70.0;

/// Great-circle distance in meters between two points.
pub fn haversine_m(a: &Point, b: &Point) -> f64 {
    Haversine.distance(
        geo::Point::new(a.lon, a.lat),
        geo::Point::new(b.lon, b.lat),
    )
}

/// Stable sort by timestamp; points lacking a timestamp sort last, with
/// original relative order preserved on both sides.
pub(crate) fn sort_by_timestamp(points: &[Point]) -> Vec<Point> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    sorted
}

/// Elapsed seconds across a segment, `None` when either endpoint lacks a
/// timestamp or the clock ran backwards.
fn segment_elapsed(last: &Point, cur: &Point) -> Option<f64> {
    match (last.timestamp, cur.timestamp) {
        (Some(t0), Some(t1)) if t1 >= t0 => Some(t1 - t0),
        _ => None,
    }
}

/// Per-kilometer accumulator state.
#[derive(Debug, Default)]
struct KmBucket {
    distance_m: f64,
    time_s: f64,
    elevation_gain_m: f64,
    cadence_sum: f64,
    cadence_count: u32,
    hr_sum: f64,
    hr_count: u32,
}

impl KmBucket {
    /// Reset everything except distance and time, which carry boundary
    /// remainders.
    fn reset_channels(&mut self) {
        self.elevation_gain_m = 0.0;
        self.cadence_sum = 0.0;
        self.cadence_count = 0;
        self.hr_sum = 0.0;
        self.hr_count = 0;
    }
}

/// Analyze an ordered point sequence.
///
/// Fewer than two points yields a zeroed result, never an error.
pub fn analyze(points: &[Point], options: &AnalysisOptions) -> AnalysisResult {
    if points.len() < 2 {
        return AnalysisResult::default();
    }

    let sorted = sort_by_timestamp(points);

    let mut segments: Vec<Segment> = Vec::with_capacity(sorted.len() - 1);

    let mut total_dist = 0.0;
    let mut total_time = 0.0;
    let mut total_elev_gain = 0.0;
    let mut cad_sum = 0.0;
    let mut cad_count = 0u32;
    let mut hr_sum = 0.0;
    let mut hr_count = 0u32;
    let mut max_hr: Option<f64> = None;

    let mut bucket = KmBucket::default();
    let mut km_index: u32 = 1;
    let mut splits: Vec<Split> = Vec::new();

    let mut result = AnalysisResult::default();
    let mut accum_since_sample = 0.0;

    let mut last = &sorted[0];
    for cur in &sorted[1..] {
        let d = haversine_m(last, cur);
        let dt = segment_elapsed(last, cur);

        let pace_s = match dt {
            Some(dt) if d > 0.0 && dt > 0.0 => Some(dt / (d / 1000.0)),
            _ => None,
        };

        segments.push(Segment {
            distance_m: d,
            elapsed_s: dt,
            pace_s_per_km: pace_s,
        });

        total_dist += d;
        if let Some(dt) = dt {
            total_time += dt;
        }

        // Gain counts strictly positive elevation deltas only.
        if let (Some(prev_ele), Some(cur_ele)) = (last.elevation, cur.elevation) {
            let diff = cur_ele - prev_ele;
            if diff > 0.0 {
                total_elev_gain += diff;
                bucket.elevation_gain_m += diff;
            }
        }

        if let Some(cad) = cur.cadence {
            cad_sum += cad;
            cad_count += 1;
            bucket.cadence_sum += cad;
            bucket.cadence_count += 1;
        }

        if let Some(hr) = cur.heart_rate {
            hr_sum += hr;
            hr_count += 1;
            bucket.hr_sum += hr;
            bucket.hr_count += 1;
            max_hr = Some(max_hr.map_or(hr, |m: f64| m.max(hr)));
        }

        bucket.distance_m += d;
        if let Some(dt) = dt {
            bucket.time_s += dt;
        }

        // Chart sample roughly every 100 m. The accumulator resets to zero
        // rather than carrying the remainder; a slight under-sample.
        accum_since_sample += d;
        if accum_since_sample >= CHART_SAMPLE_INTERVAL_M {
            accum_since_sample = 0.0;
            result.chart.push(ChartSample {
                cumulative_km: total_dist / 1000.0,
                pace_s_per_km: pace_s,
                elevation_m: cur.elevation,
                heart_rate_bpm: cur.heart_rate,
            });
        }

        // Close splits; one very long segment can close several. The
        // overrun fraction of the closing segment's time carries into the
        // next split.
        while bucket.distance_m >= SPLIT_DISTANCE_M {
            let over = bucket.distance_m - SPLIT_DISTANCE_M;
            let mut split_time = bucket.time_s;
            match dt {
                Some(dt) if dt > 0.0 && d > 0.0 && over > 0.0 && bucket.time_s > 0.0 => {
                    let ratio = over / d;
                    split_time = bucket.time_s - ratio * dt;
                    bucket.time_s = ratio * dt;
                }
                _ => bucket.time_s = 0.0,
            }

            splits.push(Split {
                index: km_index,
                // The split is exactly one kilometer, so its pace equals
                // its prorated time.
                pace_s_per_km: (split_time > 0.0).then_some(split_time),
                elevation_gain_m: bucket.elevation_gain_m,
                cadence_spm: (bucket.cadence_count > 0)
                    .then(|| bucket.cadence_sum / f64::from(bucket.cadence_count)),
                heart_rate_bpm: (bucket.hr_count > 0)
                    .then(|| bucket.hr_sum / f64::from(bucket.hr_count)),
            });
            km_index += 1;
            bucket.distance_m = over;
            bucket.reset_channels();
        }

        last = cur;
    }

    let avg_pace = (total_dist > 0.0 && total_time > 0.0)
        .then(|| total_time / (total_dist / 1000.0));

    let weight_kg = options.weight_kg.unwrap_or(DEFAULT_WEIGHT_KG);

    result.summary = Summary {
        distance_m: total_dist,
        duration_s: total_time,
        avg_pace_s_per_km: avg_pace,
        elevation_gain_m: total_elev_gain,
        avg_cadence_spm: (cad_count > 0).then(|| cad_sum / f64::from(cad_count)),
        avg_heart_rate_bpm: (hr_count > 0).then(|| hr_sum / f64::from(hr_count)),
        max_heart_rate_bpm: max_hr,
        min_heart_rate_bpm: None,
        calories_kcal: KCAL_PER_KG_PER_KM * weight_kg * (total_dist / 1000.0),
    };
    result.splits = splits;

    result.best_efforts = BestEfforts {
        best_400m_pace_s: best_window_pace(&segments, BEST_EFFORT_TARGETS_M[0]),
        best_1k_pace_s: best_window_pace(&segments, BEST_EFFORT_TARGETS_M[1]),
        best_5k_pace_s: best_window_pace(&segments, BEST_EFFORT_TARGETS_M[2]),
    };
    result.pace_extremes = pace_extremes(&segments);

    result
}

/// Best (lowest) pace over any window of at least `target_m` meters,
/// found with a two-pointer sliding window over segments.
fn best_window_pace(segments: &[Segment], target_m: f64) -> Option<f64> {
    let mut window_dist = 0.0;
    let mut window_time = 0.0;
    let mut start = 0;
    let mut best: Option<f64> = None;

    for i in 0..segments.len() {
        window_dist += segments[i].distance_m;
        window_time += segments[i].elapsed_s.unwrap_or(0.0);

        while window_dist >= target_m && start <= i {
            if window_time > 0.0 && window_dist > 0.0 {
                let pace = window_time / (window_dist / 1000.0);
                best = Some(best.map_or(pace, |b: f64| b.min(pace)));
            }
            window_dist -= segments[start].distance_m;
            window_time -= segments[start].elapsed_s.unwrap_or(0.0);
            start += 1;
        }
    }

    best
}

/// The five fastest and five slowest ~200 m window paces; ties keep
/// encounter order (stable sort).
fn pace_extremes(segments: &[Segment]) -> PaceExtremes {
    let mut window_paces: Vec<f64> = Vec::new();
    let mut window_dist = 0.0;
    let mut window_time = 0.0;
    let mut start = 0;

    for i in 0..segments.len() {
        window_dist += segments[i].distance_m;
        window_time += segments[i].elapsed_s.unwrap_or(0.0);

        while window_dist >= PACE_EXTREME_WINDOW_M && start <= i {
            if window_time > 0.0 && window_dist > 0.0 {
                window_paces.push(window_time / (window_dist / 1000.0));
            }
            window_dist -= segments[start].distance_m;
            window_time -= segments[start].elapsed_s.unwrap_or(0.0);
            start += 1;
        }
    }

    let mut fastest = window_paces.clone();
    fastest.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mut slowest = window_paces;
    slowest.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let to_windows = |paces: &[f64]| {
        paces
            .iter()
            .take(PACE_EXTREME_COUNT)
            .map(|&pace| PaceWindow {
                pace_s_per_km: pace,
                window_m: PACE_EXTREME_WINDOW_M,
            })
            .collect()
    };

    PaceExtremes {
        fastest: to_windows(&fastest),
        slowest: to_windows(&slowest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Degrees of latitude per meter near the equator.
    const DEG_PER_M: f64 = 1.0 / 111_194.93;

    fn timed_point(lat: f64, lon: f64, ts: f64) -> Point {
        Point {
            timestamp: Some(ts),
            ..Point::new(lat, lon)
        }
    }

    /// Closed 100 m x 100 m square at 1 m/s: 5 corner points, 100 s apart.
    fn square_track() -> Vec<Point> {
        let side = 100.0 * DEG_PER_M;
        vec![
            timed_point(0.0, 0.0, 0.0),
            timed_point(side, 0.0, 100.0),
            timed_point(side, side, 200.0),
            timed_point(0.0, side, 300.0),
            timed_point(0.0, 0.0, 400.0),
        ]
    }

    #[test]
    fn test_degenerate_inputs_zeroed() {
        let empty = analyze(&[], &AnalysisOptions::default());
        assert_eq!(empty.summary.distance_m, 0.0);
        assert_eq!(empty.summary.duration_s, 0.0);
        assert!(empty.splits.is_empty());
        assert!(empty.chart.is_empty());
        assert_eq!(empty.best_efforts.best_1k_pace_s, None);

        let single = analyze(&[Point::new(50.0, 19.9)], &AnalysisOptions::default());
        assert_eq!(single.summary.distance_m, 0.0);
    }

    #[test]
    fn test_square_track_distance_and_pace() {
        let result = analyze(&square_track(), &AnalysisOptions::default());
        assert!(
            (result.summary.distance_m - 400.0).abs() < 1.0,
            "distance was {}",
            result.summary.distance_m
        );
        assert_eq!(result.summary.duration_s, 400.0);
        // 1 m/s == 1000 s/km on every segment and on average.
        let avg = result.summary.avg_pace_s_per_km.unwrap();
        assert!((avg - 1000.0).abs() < 5.0, "avg pace was {avg}");
    }

    #[test]
    fn test_segment_distances_sum_to_total() {
        let points = square_track();
        let sorted_total: f64 = points
            .windows(2)
            .map(|w| haversine_m(&w[0], &w[1]))
            .sum();
        let result = analyze(&points, &AnalysisOptions::default());
        assert!((sorted_total - result.summary.distance_m).abs() < 1e-9);
    }

    #[test]
    fn test_clock_anomaly_drops_elapsed_keeps_distance() {
        let a = timed_point(0.0, 0.0, 100.0);
        let b = timed_point(0.0, 100.0 * DEG_PER_M, 50.0);
        assert_eq!(segment_elapsed(&a, &b), None);
        assert_eq!(segment_elapsed(&b, &a), Some(50.0));
        assert_eq!(segment_elapsed(&a, &Point::new(0.0, 0.0)), None);
        // Equal timestamps are zero elapsed, not an anomaly.
        assert_eq!(segment_elapsed(&a, &a), Some(0.0));
    }

    #[test]
    fn test_untimed_points_sort_last_stably() {
        let side = 100.0 * DEG_PER_M;
        let points = vec![
            Point::new(3.0 * side, 0.0),
            timed_point(0.0, 0.0, 10.0),
            Point::new(4.0 * side, 0.0),
            timed_point(side, 0.0, 20.0),
        ];
        let result = analyze(&points, &AnalysisOptions::default());
        // Timed points first (10, 20), then untimed in original order.
        // Distance: 100 + 200 + 100 = 400 m.
        assert!((result.summary.distance_m - 400.0).abs() < 1.0);
        // Untimed segments contribute distance but no duration.
        assert_eq!(result.summary.duration_s, 10.0);
        // Same input analyzed again is bit-identical.
        let again = analyze(&points, &AnalysisOptions::default());
        assert_eq!(result, again);
    }

    #[test]
    fn test_splits_close_with_prorated_time() {
        // 2.5 km straight line, one point every 100 m, 30 s apart
        // (constant 300 s/km).
        let step = 100.0 * DEG_PER_M;
        let points: Vec<Point> = (0..26)
            .map(|i| timed_point(f64::from(i) * step, 0.0, f64::from(i) * 30.0))
            .collect();
        let result = analyze(&points, &AnalysisOptions::default());

        // Only full kilometers close; the final 500 m stays open.
        assert_eq!(result.splits.len(), 2);
        assert_eq!(result.splits[0].index, 1);
        assert_eq!(result.splits[1].index, 2);
        for split in &result.splits {
            let pace = split.pace_s_per_km.unwrap();
            assert!((pace - 300.0).abs() < 2.0, "split pace was {pace}");
        }

        // Credited split distance plus the open remainder equals the total.
        let credited = result.splits.len() as f64 * SPLIT_DISTANCE_M;
        assert!(credited <= result.summary.distance_m + 1e-6);
        assert!(result.summary.distance_m - credited < SPLIT_DISTANCE_M);
    }

    #[test]
    fn test_single_long_segment_closes_multiple_splits() {
        // Two points 2.2 km apart: the one segment closes splits 1 and 2.
        let points = vec![
            timed_point(0.0, 0.0, 0.0),
            timed_point(2200.0 * DEG_PER_M, 0.0, 660.0),
        ];
        let result = analyze(&points, &AnalysisOptions::default());
        assert_eq!(result.splits.len(), 2);
        // First close prorates: 660 * (1000/2200) = 300 s.
        let first = result.splits[0].pace_s_per_km.unwrap();
        assert!((first - 300.0).abs() < 2.0, "first split pace was {first}");
    }

    #[test]
    fn test_chart_samples_every_100m_nondecreasing() {
        let step = 50.0 * DEG_PER_M;
        let points: Vec<Point> = (0..40)
            .map(|i| timed_point(f64::from(i) * step, 0.0, f64::from(i) * 15.0))
            .collect();
        let result = analyze(&points, &AnalysisOptions::default());
        assert!(!result.chart.is_empty());
        for pair in result.chart.km.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(result.chart.km.len(), result.chart.pace_s.len());
        assert_eq!(result.chart.km.len(), result.chart.elevation.len());
        assert_eq!(result.chart.km.len(), result.chart.heart_rate.len());
    }

    #[test]
    fn test_best_efforts_find_fast_section() {
        // 2 km at 360 s/km with a fast 400 m burst (240 s/km) in the middle.
        let step = 100.0 * DEG_PER_M;
        let mut ts = 0.0;
        let mut points = vec![timed_point(0.0, 0.0, 0.0)];
        for i in 1..21 {
            let fast = (8..12).contains(&i);
            ts += if fast { 24.0 } else { 36.0 };
            points.push(timed_point(f64::from(i) * step, 0.0, ts));
        }
        let result = analyze(&points, &AnalysisOptions::default());
        let best_400 = result.best_efforts.best_400m_pace_s.unwrap();
        assert!((best_400 - 240.0).abs() < 5.0, "best 400 m was {best_400}");
        let best_1k = result.best_efforts.best_1k_pace_s.unwrap();
        assert!(best_1k < result.summary.avg_pace_s_per_km.unwrap());
        assert_eq!(result.best_efforts.best_5k_pace_s, None);
    }

    #[test]
    fn test_pace_extremes_top_five() {
        let step = 100.0 * DEG_PER_M;
        let points: Vec<Point> = (0..31)
            .map(|i| timed_point(f64::from(i) * step, 0.0, f64::from(i * i)))
            .collect();
        let result = analyze(&points, &AnalysisOptions::default());
        assert_eq!(result.pace_extremes.fastest.len(), 5);
        assert_eq!(result.pace_extremes.slowest.len(), 5);
        assert!(
            result.pace_extremes.fastest[0].pace_s_per_km
                <= result.pace_extremes.slowest[0].pace_s_per_km
        );
        for pair in result.pace_extremes.fastest.windows(2) {
            assert!(pair[0].pace_s_per_km <= pair[1].pace_s_per_km);
        }
    }

    #[test]
    fn test_calories_scale_with_weight() {
        let result_default = analyze(&square_track(), &AnalysisOptions::default());
        let options = AnalysisOptions {
            weight_kg: Some(80.0),
            ..AnalysisOptions::default()
        };
        let result_heavier = analyze(&square_track(), &options);
        let expected = KCAL_PER_KG_PER_KM * 80.0 * (result_heavier.summary.distance_m / 1000.0);
        assert!((result_heavier.summary.calories_kcal - expected).abs() < 1e-9);
        assert!(result_heavier.summary.calories_kcal > result_default.summary.calories_kcal);
    }

    #[test]
    fn test_embedded_sensor_channels_aggregate() {
        let step = 100.0 * DEG_PER_M;
        let points: Vec<Point> = (0..12)
            .map(|i| Point {
                cadence: Some(170.0 + f64::from(i)),
                heart_rate: Some(140.0 + f64::from(i)),
                elevation: Some(200.0 + f64::from(i)),
                ..timed_point(f64::from(i) * step, 0.0, f64::from(i) * 30.0)
            })
            .collect();
        let result = analyze(&points, &AnalysisOptions::default());
        assert_eq!(result.summary.max_heart_rate_bpm, Some(151.0));
        // First point's channels never enter the pairwise walk.
        let avg_hr = result.summary.avg_heart_rate_bpm.unwrap();
        assert!((avg_hr - 146.0).abs() < 1e-9);
        assert!((result.summary.elevation_gain_m - 11.0).abs() < 1e-9);
        assert_eq!(result.splits.len(), 1);
        assert!(result.splits[0].heart_rate_bpm.is_some());
        assert!(result.splits[0].cadence_spm.is_some());
        // Embedded channels flow through to the chart samples too.
        assert!(!result.chart.heart_rate.is_empty());
        assert!(result.chart.heart_rate.iter().all(Option::is_some));
        assert_eq!(result.chart.heart_rate[0], Some(141.0));
    }
}
