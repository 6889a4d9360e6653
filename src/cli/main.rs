use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use student_risk_engine::{
    batch,
    config::Config,
    ml::{FittedTransform, PredictionService},
    models::StudentRecord,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sre-cli")]
#[command(about = "Student Risk Engine CLI", long_about = None, version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Override the model artifact path
    #[arg(long)]
    model: Option<PathBuf>,

    /// Override the feature transform artifact path
    #[arg(long)]
    transform: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict one student from a JSON document
    Predict {
        /// JSON file holding the student record; reads stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Inline JSON student record
        #[arg(short, long, conflicts_with = "input")]
        json: Option<String>,
    },

    /// Predict every row of a CSV file
    Batch {
        /// CSV input; falls back to batch.input_path from configuration
        #[arg(value_name = "INPUT_CSV")]
        input: Option<PathBuf>,

        /// JSON output; the CSV copy is written next to it
        #[arg(value_name = "OUTPUT_JSON")]
        output: Option<PathBuf>,

        /// Spread predictions over all cores
        #[arg(short, long)]
        parallel: bool,
    },

    /// Fit a feature transform from a CSV of training records
    FitTransform {
        #[arg(value_name = "TRAINING_CSV")]
        input: PathBuf,

        /// Destination; defaults to artifacts.transform_path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("student_risk_engine={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(model) = cli.model {
        config.artifacts.model_path = model;
    }
    if let Some(transform) = cli.transform {
        config.artifacts.transform_path = transform;
    }

    match cli.command {
        Commands::Predict { input, json } => {
            let text = match (input, json) {
                (_, Some(json)) => json,
                (Some(path), None) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => std::io::read_to_string(std::io::stdin())
                    .context("failed to read student record from stdin")?,
            };
            let record: StudentRecord =
                serde_json::from_str(&text).context("invalid student record")?;

            let service = PredictionService::load(&config.artifacts)?;
            let result = service.predict_one(&record)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Batch {
            input,
            output,
            parallel,
        } => {
            let Some(input) = input.or_else(|| config.batch.input_path.clone()) else {
                bail!("no input CSV given and batch.input_path is not configured");
            };
            if let Some(output) = output {
                config.batch.output_path = output;
            }
            let output = config.batch.output_path.clone();
            let csv_path = config.batch_csv_path();

            tracing::info!(input = %input.display(), "Starting batch prediction");
            let service = PredictionService::load(&config.artifacts)?
                .with_progress_interval(config.batch.progress_interval);
            let rows = batch::read_rows(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;

            let report =
                batch::process_rows(&service, rows, config.batch.top_recommendations, parallel);
            batch::save_results(&output, &csv_path, &report.results)?;
            report.summary.log();

            println!("{}", serde_json::to_string_pretty(&report.summary)?);
            tracing::info!(
                json = %output.display(),
                csv = %csv_path.display(),
                "Batch prediction completed"
            );
        }

        Commands::FitTransform { input, output } => {
            let rows = batch::read_rows(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let total = rows.len();
            let records: Vec<StudentRecord> =
                rows.into_iter().filter_map(|row| row.record.ok()).collect();
            if records.len() < total {
                tracing::warn!(
                    skipped = total - records.len(),
                    "Rows that failed to decode were left out of fitting"
                );
            }

            let transform = FittedTransform::fit(&records)?;
            let output = output.unwrap_or_else(|| config.artifacts.transform_path.clone());
            transform.save(&output)?;
            println!("{}", output.display());
        }
    }

    Ok(())
}
