use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gdelt_signal_parse::collect::{dataset_info, list_files, log_dataset_info, merge_kind};
use gdelt_signal_parse::pipeline::{default_threads, run_pipeline, PipelineConfig};
use gdelt_signal_parse::report::{log_run_summary, memory_usage};
use gdelt_signal_parse::{FileKind, ThemeFilter};
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::fs;
use std::path::PathBuf;
use time::macros::format_description;

#[derive(Parser)]
#[command(name = "GDELT Economic Signal Parser")]
#[command(about = "Aggregate GDELT knowledge-graph files into a daily economic news-sentiment series")]
#[command(version = "0.1.0")]
struct Cli {
    #[arg(short, long, global = true, default_value = "INFO", help = "Logging level (DEBUG, INFO, WARN, ERROR)")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Filter and aggregate GKG files into the daily signal CSV (resumable)
    Process {
        #[arg(short, long, default_value = "data", help = "Directory containing .gkg.csv files")]
        input: PathBuf,

        #[arg(short, long, default_value = "results/gdelt_economic_signals.csv", help = "Signal CSV to append to")]
        output: PathBuf,

        #[arg(long, default_value = "processed_log.txt", help = "Ledger of files already processed")]
        ledger: PathBuf,

        #[arg(long, help = "Also list files that failed to process here")]
        failed_log: Option<PathBuf>,

        #[arg(short, long, default_value = "0", help = "Number of worker threads (0 for CPU cores - 1)")]
        threads: usize,

        #[arg(long, help = "Comma-separated theme keywords overriding the economic defaults")]
        themes: Option<String>,

        #[arg(long, help = "Write the run summary as JSON to this path")]
        summary_json: Option<PathBuf>,

        #[arg(long, help = "Hide the progress bar")]
        no_progress: bool,
    },
    /// Merge raw GDELT files of one kind into a deduplicated CSV
    Merge {
        #[arg(short, long, default_value = ".", help = "Directory containing GDELT files")]
        data_dir: PathBuf,

        #[arg(short, long, value_enum, default_value = "all", help = "Which table to merge")]
        kind: KindArg,

        #[arg(short, long, help = "Output directory (defaults to the data directory)")]
        output_dir: Option<PathBuf>,
    },
    /// Show which GDELT files are available
    Info {
        #[arg(short, long, default_value = ".", help = "Directory containing GDELT files")]
        data_dir: PathBuf,
    },
    /// Write every file name under a directory to a listing file
    ListFiles {
        #[arg(short, long, default_value = "data", help = "Directory to list")]
        data_dir: PathBuf,

        #[arg(short, long, default_value = "file-list.txt", help = "Listing file to write")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Export,
    Gkg,
    Mentions,
    All,
}

impl KindArg {
    fn kinds(self) -> Vec<FileKind> {
        match self {
            KindArg::Export => vec![FileKind::Export],
            KindArg::Gkg => vec![FileKind::Gkg],
            KindArg::Mentions => vec![FileKind::Mentions],
            KindArg::All => FileKind::ALL.to_vec(),
        }
    }
}

fn setup_logging(log_level_str: &str) -> Result<()> {
    let log_level = match log_level_str.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        other => {
            eprintln!("Invalid log level '{}', defaulting to INFO.", other);
            LevelFilter::Info
        }
    };

    SimpleLogger::new()
        .with_level(log_level)
        .with_timestamp_format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .init()?;

    Ok(())
}

fn resolve_threads(thread_count: usize) -> usize {
    if thread_count == 0 {
        let threads = default_threads();
        info!("Auto-detected {} CPU cores. Using {} worker threads.", num_cpus::get(), threads);
        threads
    } else {
        info!("Using specified {} worker threads.", thread_count);
        thread_count
    }
}

#[allow(clippy::too_many_arguments)]
fn run_process(
    input: PathBuf,
    output: PathBuf,
    ledger: PathBuf,
    failed_log: Option<PathBuf>,
    threads: usize,
    themes: Option<String>,
    summary_json: Option<PathBuf>,
    no_progress: bool,
) -> Result<()> {
    let filter = themes.as_deref().map(ThemeFilter::parse).unwrap_or_default();
    info!("Theme keywords: {}", filter.keywords().join(", "));

    let mut config = PipelineConfig::new(input, output, ledger);
    config.failed_log = failed_log;
    config.threads = resolve_threads(threads);
    config.filter = filter;
    config.show_progress = !no_progress;

    memory_usage::log_memory_usage("initial");
    let summary = run_pipeline(&config)?;
    log_run_summary(&summary);
    memory_usage::log_memory_usage("final");

    if let Some(path) = summary_json {
        let body = serde_json::to_string_pretty(&summary.to_json())?;
        fs::write(&path, format!("{body}\n"))
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!("Run summary written to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level)?;

    match cli.command {
        Command::Process {
            input,
            output,
            ledger,
            failed_log,
            threads,
            themes,
            summary_json,
            no_progress,
        } => run_process(
            input,
            output,
            ledger,
            failed_log,
            threads,
            themes,
            summary_json,
            no_progress,
        )?,
        Command::Merge { data_dir, kind, output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| data_dir.clone());
            let mut merged = 0;
            for kind in kind.kinds() {
                let output = output_dir.join(kind.default_output());
                for report in merge_kind(&data_dir, kind, &output)? {
                    info!(
                        "  {} - {} {} records",
                        report.output.display(),
                        report.rows_out,
                        kind.label()
                    );
                    merged += 1;
                }
            }
            if merged == 0 {
                warn!("Nothing merged.");
            }
        }
        Command::Info { data_dir } => {
            let dataset = dataset_info(&data_dir)?;
            log_dataset_info(&data_dir, &dataset);
        }
        Command::ListFiles { data_dir, output } => {
            list_files(&data_dir, &output)?;
        }
    }

    Ok(())
}
