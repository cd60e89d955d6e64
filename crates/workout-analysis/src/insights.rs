//! Rule engine turning computed metrics into categorized, human-readable
//! observations: pacing stability, split distribution, anomaly flags,
//! physiological suggestions, and an optional BMI section.
//!
//! Thresholds are fixed, not configurable; the output is deterministic
//! for a given result.

use crate::models::{AnalysisOptions, AnalysisResult, Insight, InsightSection, Split};

/// Split-pace variability ratio below this reads as "very even".
const VARIABILITY_VERY_EVEN: f64 = 0.03;
/// ... and below this as "fairly even"; above it becomes a watch-out.
const VARIABILITY_FAIRLY_EVEN: f64 = 0.06;
/// Pace change between first and last third that counts as a real
/// negative/positive split, in s/km.
const PHASE_SHIFT_S_PER_KM: f64 = 5.0;
/// A split slower than this multiple of the median looks like a pause.
const SLOW_OUTLIER_RATIO: f64 = 1.6;
/// ... or slower than the median by this many s/km.
const SLOW_OUTLIER_DELTA_S: f64 = 60.0;
/// A split faster than this multiple of the median looks like a descent
/// or a measurement spike.
const FAST_OUTLIER_RATIO: f64 = 0.6;
const FAST_OUTLIER_DELTA_S: f64 = 45.0;
/// First-to-last split heart-rate rise flagged as cardiovascular drift.
const HR_DRIFT_BPM: f64 = 8.0;
/// Cadence bands in steps per minute.
const CADENCE_LOW_SPM: f64 = 150.0;
const CADENCE_HIGH_SPM: f64 = 190.0;
/// WHO BMI band boundaries.
const BMI_UNDERWEIGHT: f64 = 18.5;
const BMI_NORMAL: f64 = 25.0;
const BMI_OVERWEIGHT: f64 = 30.0;

/// Format seconds-per-kilometer as `M:SS min/km`.
pub fn format_pace(pace_s_per_km: f64) -> String {
    let total = pace_s_per_km.round() as i64;
    format!("{}:{:02} min/km", total / 60, total % 60)
}

/// Generate the ordered narrative for a populated analysis result.
pub fn generate(result: &AnalysisResult, options: &AnalysisOptions) -> Vec<Insight> {
    let mut lines = Vec::new();

    summary_lines(result, &mut lines);

    let paces: Vec<f64> = result
        .splits
        .iter()
        .filter_map(|s| s.pace_s_per_km)
        .collect();
    variability_lines(&paces, &mut lines);
    phase_lines(&result.splits, &mut lines);
    anomaly_lines(&result.splits, &paces, &mut lines);
    heart_rate_drift_line(&result.splits, &mut lines);
    cadence_lines(result.summary.avg_cadence_spm, &mut lines);

    if let (Some(height_cm), Some(weight_kg)) = (options.height_cm, options.weight_kg) {
        bmi_lines(height_cm, weight_kg, &mut lines);
    }

    lines
}

fn push(lines: &mut Vec<Insight>, section: InsightSection, text: String) {
    lines.push(Insight { section, text });
}

fn summary_lines(result: &AnalysisResult, lines: &mut Vec<Insight>) {
    let summary = &result.summary;
    if summary.distance_m > 0.0 {
        push(
            lines,
            InsightSection::Summary,
            format!("Covered {:.2} km.", summary.distance_m / 1000.0),
        );
    }
    if let Some(pace) = summary.avg_pace_s_per_km {
        push(
            lines,
            InsightSection::Summary,
            format!("Average pace {}.", format_pace(pace)),
        );
    }
    if let Some(best_1k) = result.best_efforts.best_1k_pace_s {
        push(
            lines,
            InsightSection::Summary,
            format!("Fastest kilometer at {}.", format_pace(best_1k)),
        );
    }
    if summary.elevation_gain_m > 0.0 {
        push(
            lines,
            InsightSection::Summary,
            format!("Total ascent {:.0} m.", summary.elevation_gain_m),
        );
    }
    if let Some(cadence) = summary.avg_cadence_spm {
        push(
            lines,
            InsightSection::Summary,
            format!("Average cadence {cadence:.0} spm."),
        );
    }
    if let Some(hr) = summary.avg_heart_rate_bpm {
        push(
            lines,
            InsightSection::Summary,
            format!("Average heart rate {hr:.0} bpm."),
        );
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn median(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn variability_lines(paces: &[f64], lines: &mut Vec<Insight>) {
    let Some(mean_pace) = mean(paces) else {
        return;
    };
    if paces.len() < 2 || mean_pace <= 0.0 {
        return;
    }
    let ratio = std_dev(paces, mean_pace) / mean_pace;
    if ratio < VARIABILITY_VERY_EVEN {
        push(
            lines,
            InsightSection::WentWell,
            "Very even kilometer splits - excellent pacing control.".to_string(),
        );
    } else if ratio < VARIABILITY_FAIRLY_EVEN {
        push(
            lines,
            InsightSection::WentWell,
            "Fairly even kilometer splits.".to_string(),
        );
    } else {
        push(
            lines,
            InsightSection::WatchOut,
            format!(
                "Split paces varied noticeably (ratio {ratio:.2}); aim for a steadier rhythm."
            ),
        );
    }
}

/// Compare mean pace of the first third of splits against the last third.
fn phase_lines(splits: &[Split], lines: &mut Vec<Insight>) {
    if splits.len() < 3 {
        return;
    }
    let third = (splits.len() / 3).max(1);
    let first: Vec<f64> = splits[..third].iter().filter_map(|s| s.pace_s_per_km).collect();
    let last: Vec<f64> = splits[splits.len() - third..]
        .iter()
        .filter_map(|s| s.pace_s_per_km)
        .collect();
    let (Some(first_mean), Some(last_mean)) = (mean(&first), mean(&last)) else {
        return;
    };
    let diff = last_mean - first_mean;
    if diff <= -PHASE_SHIFT_S_PER_KM {
        push(
            lines,
            InsightSection::WentWell,
            format!(
                "Negative split: the final third was {:.0} s/km faster than the start.",
                -diff
            ),
        );
    } else if diff >= PHASE_SHIFT_S_PER_KM {
        push(
            lines,
            InsightSection::WatchOut,
            format!(
                "The final third was {diff:.0} s/km slower than the start - consider a gentler opening pace."
            ),
        );
    }
}

fn anomaly_lines(splits: &[Split], paces: &[f64], lines: &mut Vec<Insight>) {
    let mut sorted = paces.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let Some(median_pace) = median(&sorted) else {
        return;
    };
    for split in splits {
        let Some(pace) = split.pace_s_per_km else {
            continue;
        };
        if pace > median_pace * SLOW_OUTLIER_RATIO || pace - median_pace > SLOW_OUTLIER_DELTA_S {
            push(
                lines,
                InsightSection::WatchOut,
                format!(
                    "Kilometer {} was far slower than your median pace - likely a pause or a positioning error.",
                    split.index
                ),
            );
        } else if pace < median_pace * FAST_OUTLIER_RATIO
            || median_pace - pace > FAST_OUTLIER_DELTA_S
        {
            push(
                lines,
                InsightSection::WatchOut,
                format!(
                    "Kilometer {} was far faster than your median pace - likely a descent or a measurement spike.",
                    split.index
                ),
            );
        }
    }
}

fn heart_rate_drift_line(splits: &[Split], lines: &mut Vec<Insight>) {
    let first = splits.iter().find_map(|s| s.heart_rate_bpm);
    let last = splits.iter().rev().find_map(|s| s.heart_rate_bpm);
    if let (Some(first), Some(last)) = (first, last) {
        if last - first >= HR_DRIFT_BPM {
            push(
                lines,
                InsightSection::WatchOut,
                format!(
                    "Heart rate drifted up {:.0} bpm over the run - watch hydration and aerobic base.",
                    last - first
                ),
            );
        }
    }
}

fn cadence_lines(avg_cadence: Option<f64>, lines: &mut Vec<Insight>) {
    let Some(cadence) = avg_cadence else {
        return;
    };
    if cadence < CADENCE_LOW_SPM {
        push(
            lines,
            InsightSection::WatchOut,
            format!(
                "Average cadence {cadence:.0} spm is on the low side - short cadence drills could help."
            ),
        );
    } else if cadence > CADENCE_HIGH_SPM {
        push(
            lines,
            InsightSection::WatchOut,
            format!(
                "Average cadence {cadence:.0} spm is unusually high - worth checking stride mechanics."
            ),
        );
    } else {
        push(
            lines,
            InsightSection::WentWell,
            format!("Cadence {cadence:.0} spm sits in a healthy range."),
        );
    }
}

fn bmi_lines(height_cm: f64, weight_kg: f64, lines: &mut Vec<Insight>) {
    if height_cm <= 0.0 || weight_kg <= 0.0 {
        return;
    }
    let height_m = height_cm / 100.0;
    let bmi = weight_kg / (height_m * height_m);
    let normal_min_kg = BMI_UNDERWEIGHT * height_m * height_m;
    let normal_max_kg = BMI_NORMAL * height_m * height_m;

    push(lines, InsightSection::Bmi, format!("BMI {bmi:.1}."));
    push(
        lines,
        InsightSection::Bmi,
        format!(
            "Normal-weight range for your height: {normal_min_kg:.1}-{normal_max_kg:.1} kg."
        ),
    );

    if bmi < BMI_UNDERWEIGHT {
        push(
            lines,
            InsightSection::Bmi,
            format!(
                "You are about {:.1} kg under the normal-weight range; make sure energy intake supports your training.",
                normal_min_kg - weight_kg
            ),
        );
    } else if bmi < BMI_NORMAL {
        push(
            lines,
            InsightSection::Bmi,
            "You are inside the normal-weight range; keep the current balance of training and nutrition.".to_string(),
        );
    } else if bmi < BMI_OVERWEIGHT {
        push(
            lines,
            InsightSection::Bmi,
            format!(
                "You are about {:.1} kg above the normal-weight range; easy aerobic volume is the safest lever.",
                weight_kg - normal_max_kg
            ),
        );
    } else {
        push(
            lines,
            InsightSection::Bmi,
            format!(
                "You are about {:.1} kg above the normal-weight range; prefer low-impact sessions while building up.",
                weight_kg - normal_max_kg
            ),
        );
    }
}
