use std::fs;
use std::path::PathBuf;

use bytes::Bytes;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use workout_analysis::analyze_payload;
use workout_analysis::models::AnalysisOptions;

/// Analyze a recorded running activity and print the result as JSON.
#[derive(Parser)]
#[command(name = "analyze")]
struct Cli {
    /// Track payload: GPX, a JSON point list, or a vendor export.
    track: PathBuf,

    /// Optional auxiliary heart-rate sample file (JSON).
    #[arg(long)]
    heart_rate: Option<PathBuf>,

    /// Body weight for the calorie estimate.
    #[arg(long)]
    weight_kg: Option<f64>,

    /// Body height; enables the BMI section when weight is also given.
    #[arg(long)]
    height_cm: Option<f64>,

    /// Heart-rate alignment tolerance in milliseconds.
    #[arg(long, default_value_t = 5000)]
    tolerance_ms: u32,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let track = Bytes::from(fs::read(&cli.track)?);
    let heart_rate = match &cli.heart_rate {
        Some(path) => Some(Bytes::from(fs::read(path)?)),
        None => None,
    };

    let options = AnalysisOptions {
        weight_kg: cli.weight_kg,
        height_cm: cli.height_cm,
        hr_tolerance_ms: cli.tolerance_ms,
    };

    let (result, alignment) = analyze_payload(&track, heart_rate.as_ref(), &options);

    if let Some(summary) = alignment {
        tracing::info!(
            matched = summary.matched,
            unmatched = summary.unmatched,
            "heart-rate stream aligned"
        );
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
