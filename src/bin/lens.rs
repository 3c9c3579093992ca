//! Lens CLI - Command-line interface for Health Lens
//!
//! Commands:
//! - types: List record types and counts
//! - summary: Health overview of an export
//! - daily: Daily values of one metric
//! - correlate: Compare two metrics' daily series
//! - ecg: List ECG recordings

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use health_lens::{AnalysisSession, CanonicalMetric, LensConfig, LensError, MetricSelector, LENS_VERSION};

/// Lens - Analysis engine for personal wellness-data exports
#[derive(Parser)]
#[command(name = "lens")]
#[command(version = LENS_VERSION)]
#[command(about = "Analyze wellness-data exports", long_about = None)]
struct Cli {
    /// Configuration file (TOML); falls back to HEALTH_LENS_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "json-pretty")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List record types with their counts
    Types {
        /// Export archive, directory or file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Heart rate, steps, sleep, stress and ECG overview
    Summary {
        /// Export archive, directory or file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Daily values of one metric
    Daily {
        /// Export archive, directory or file
        #[arg(short, long)]
        input: PathBuf,

        /// steps, heart_rate, resting_heart_rate, sleep or stress
        #[arg(short, long)]
        metric: String,
    },

    /// Correlation and regression between two metrics
    Correlate {
        /// Export archive, directory or file
        #[arg(short, long)]
        input: PathBuf,

        /// Independent metric (canonical name or raw type)
        #[arg(long)]
        x: String,

        /// Dependent metric (canonical name or raw type)
        #[arg(long)]
        y: String,
    },

    /// ECG recordings found in the export
    Ecg {
        /// Export archive, directory or file
        #[arg(short, long)]
        input: PathBuf,

        /// Include raw signal samples
        #[arg(long)]
        with_signal: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("health_lens=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LensCliError> {
    let config = LensConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Types { input } => {
            with_session(&input, config, &cli.format, |session| Ok(session.data_types()))
        }
        Commands::Summary { input } => {
            with_session(&input, config, &cli.format, |session| Ok(session.summary()))
        }
        Commands::Daily { input, metric } => {
            let metric: CanonicalMetric = metric
                .parse()
                .map_err(LensCliError::InvalidArgument)?;
            with_session(&input, config, &cli.format, |session| session.daily(metric))
        }
        Commands::Correlate { input, x, y } => {
            let x: MetricSelector = x.parse().map_err(LensCliError::InvalidArgument)?;
            let y: MetricSelector = y.parse().map_err(LensCliError::InvalidArgument)?;
            with_session(&input, config, &cli.format, |session| session.correlate(&x, &y))
        }
        Commands::Ecg { input, with_signal } => {
            with_session(&input, config, &cli.format, |session| {
                let mut records = session.ecg_records();
                if !with_signal {
                    for record in &mut records {
                        record.signal.clear();
                    }
                }
                Ok(records)
            })
        }
    }
}

/// Open a session, run one query, close the session, then print the result
fn with_session<T, F>(
    input: &Path,
    config: LensConfig,
    format: &OutputFormat,
    query: F,
) -> Result<(), LensCliError>
where
    T: Serialize,
    F: FnOnce(&AnalysisSession) -> Result<T, LensError>,
{
    let session = AnalysisSession::open(input, config)?;
    let outcome = query(&session);
    session.close()?;
    let value = outcome?;

    let rendered = format_output(&value, format)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", rendered)?;
    Ok(())
}

fn format_output<T: Serialize>(value: &T, format: &OutputFormat) -> Result<String, LensCliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(value)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(value)?),
    }
}

// Error types

#[derive(Debug)]
enum LensCliError {
    Lens(LensError),
    Io(io::Error),
    Json(serde_json::Error),
    InvalidArgument(String),
}

impl From<LensError> for LensCliError {
    fn from(e: LensError) -> Self {
        LensCliError::Lens(e)
    }
}

impl From<io::Error> for LensCliError {
    fn from(e: io::Error) -> Self {
        LensCliError::Io(e)
    }
}

impl From<serde_json::Error> for LensCliError {
    fn from(e: serde_json::Error) -> Self {
        LensCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LensCliError> for CliError {
    fn from(e: LensCliError) -> Self {
        match e {
            LensCliError::Lens(e) => CliError {
                code: e.code().to_string(),
                message: e.to_string(),
                hint: hint_for(&e).map(str::to_string),
            },
            LensCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LensCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            LensCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Run 'lens types' to list available record types".to_string()),
            },
        }
    }
}

fn hint_for(e: &LensError) -> Option<&'static str> {
    match e {
        LensError::SourceNotFound(_) => {
            Some("Pass an export archive, an export directory or an .xml/.json/.csv file")
        }
        LensError::AmbiguousSource(_) => {
            Some("Pass the export file directly or set source.multiple_exports = \"first\"")
        }
        LensError::ParseFailure(_) => Some("Check that the export is complete and not truncated"),
        LensError::InsufficientData(_) => {
            Some("Run 'lens types' to see which record types the export contains")
        }
        LensError::DegenerateStatistic(_) => Some("Pick metrics that vary over the exported days"),
        LensError::EncodingFailure(_) => Some("Add the file's encoding to the configured encodings"),
        LensError::Config(_) => Some("Check the configuration file against the documented keys"),
        LensError::Io(_) => Some("Check file paths and permissions"),
    }
}
