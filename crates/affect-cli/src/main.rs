use affect_core::analytics::{self, ReportOptions};
use affect_core::EmotionSample;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

mod client;

use client::Client;

#[derive(Parser)]
#[command(name = "affect", about = "Affect identity and emotion analytics CLI")]
struct Cli {
    /// Base URL of the affectd daemon
    #[arg(long, env = "AFFECT_SERVER", default_value = "http://127.0.0.1:3001")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Register a face descriptor under a name
    Register {
        #[arg(short, long)]
        name: String,
        /// JSON file holding the descriptor array
        #[arg(short, long)]
        descriptor: PathBuf,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        gender_probability: Option<f64>,
    },
    /// Recognize a face descriptor against enrolled identities
    Recognize {
        /// JSON file holding the descriptor array
        #[arg(short, long)]
        descriptor: PathBuf,
    },
    /// List attendance records
    Attendance,
    /// Show identity and attendance statistics
    Stats,
    /// Show the summary of a capture session
    Summary {
        session: String,
    },
    /// Show the ten-segment timeline of a capture session
    Timeline {
        session: String,
        /// Session length in seconds (defaults to the session's own)
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Analyze a JSON file of samples locally, without the daemon
    Analyze {
        file: PathBuf,
        /// Session length in seconds (defaults to the last sample's timestamp)
        #[arg(long)]
        duration: Option<f64>,
        /// Trend bucket width in seconds
        #[arg(long, default_value_t = analytics::DEFAULT_TREND_INTERVAL_SECS)]
        interval: f64,
        /// Key-moment threshold
        #[arg(long, default_value_t = analytics::DEFAULT_KEY_MOMENT_THRESHOLD)]
        threshold: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.server);

    let output = match cli.command {
        Commands::Status => client.get("/health").await?,
        Commands::Register {
            name,
            descriptor,
            gender,
            gender_probability,
        } => {
            let descriptor = read_descriptor(&descriptor)?;
            client
                .post(
                    "/api/register-face",
                    &json!({
                        "name": name,
                        "descriptor": descriptor,
                        "gender": gender,
                        "genderProbability": gender_probability,
                    }),
                )
                .await?
        }
        Commands::Recognize { descriptor } => {
            let descriptor = read_descriptor(&descriptor)?;
            client
                .post("/api/recognize-face", &json!({ "descriptor": descriptor }))
                .await?
        }
        Commands::Attendance => client.get("/api/attendance").await?,
        Commands::Stats => client.get("/api/data").await?,
        Commands::Summary { session } => {
            client.get(&format!("/api/sessions/{session}/summary")).await?
        }
        Commands::Timeline { session, duration } => {
            let path = match duration {
                Some(d) => format!("/api/sessions/{session}/timeline?duration={d}"),
                None => format!("/api/sessions/{session}/timeline"),
            };
            client.get(&path).await?
        }
        Commands::Analyze {
            file,
            duration,
            interval,
            threshold,
        } => analyze_file(&file, duration, interval, threshold)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_descriptor(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading descriptor file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))
}

fn read_samples(path: &Path) -> Result<Vec<EmotionSample>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading sample file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing samples in {}", path.display()))
}

fn analyze_file(path: &Path, duration: Option<f64>, interval: f64, threshold: f64) -> Result<Value> {
    let samples = read_samples(path)?;
    let duration = duration
        .or_else(|| samples.last().map(|s| s.timestamp))
        .unwrap_or(0.0);
    tracing::info!(samples = samples.len(), duration, "analyzing sample file");

    let options = ReportOptions {
        key_moment_threshold: threshold,
        trend_interval_secs: interval,
    };
    let report = analytics::report(&samples, duration, &options);
    Ok(serde_json::to_value(report)?)
}
