//! End-to-end driver: discover GKG files, skip the ones already in the
//! ledger, reduce the rest in parallel and fan results back in to a single
//! writer that owns the sink and the ledger.

use crate::aggregate::{aggregate_daily, DailyAggregate};
use crate::detect::detect_version;
use crate::filter::ThemeFilter;
use crate::ledger::Ledger;
use crate::reader::{read_gkg_file, ReadOutcome};
use crate::report::format_elapsed;
use crate::schema::GkgVersion;
use crate::sink::SignalSink;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde_json::json;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const GKG_PATTERNS: [&str; 2] = ["*.gkg.csv", "*.gkg.csv.gz"];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output: PathBuf,
    pub ledger: PathBuf,
    /// Dead-letter list for files whose processing failed.
    pub failed_log: Option<PathBuf>,
    pub threads: usize,
    pub filter: ThemeFilter,
    pub show_progress: bool,
}

impl PipelineConfig {
    pub fn new<P: Into<PathBuf>>(input_dir: P, output: P, ledger: P) -> Self {
        Self {
            input_dir: input_dir.into(),
            output: output.into(),
            ledger: ledger.into(),
            failed_log: None,
            threads: default_threads(),
            filter: ThemeFilter::default(),
            show_progress: false,
        }
    }
}

/// One core is left free for the writer and the OS.
pub fn default_threads() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// Nothing in the file passed the theme filter.
    NoMatchingRows,
    /// Relevant records existed but none had a usable date and tone.
    UnusableTone,
}

/// What one file contributed. Errors are kept apart from legitimate emptiness.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Aggregated(Vec<DailyAggregate>),
    Empty(EmptyReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub file_name: String,
    pub path: PathBuf,
    pub version: GkgVersion,
    pub outcome: FileOutcome,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_malformed: usize,
    pub elapsed: Duration,
}

/// Ledger identifier of an input file: its base name.
pub fn file_identifier(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// GKG files directly inside `directory`. Subdirectories are not searched,
/// since the ledger identifies files by base name alone.
pub fn find_gkg_files<P: AsRef<Path>>(directory: P) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in GKG_PATTERNS {
        let pattern = directory.as_ref().join(pattern);
        let pattern_str = pattern.to_string_lossy();
        debug!("Searching for files matching pattern: {}", pattern_str);
        paths.extend(glob(&pattern_str)?.filter_map(Result::ok).filter(|p| p.is_file()));
    }
    paths.sort();
    paths.dedup();
    if paths.is_empty() {
        warn!("No GKG files found under {}", directory.as_ref().display());
    }
    Ok(paths)
}

/// Processes one file end to end. Never fails; problems become `FileOutcome::Failed`.
pub fn process_file(path: &Path, filter: &ThemeFilter) -> FileReport {
    let start = Instant::now();
    let file_name = file_identifier(path);
    let version = detect_version(path);

    let mut report = FileReport {
        file_name,
        path: path.to_path_buf(),
        version,
        outcome: FileOutcome::Empty(EmptyReason::NoMatchingRows),
        rows_read: 0,
        rows_kept: 0,
        rows_malformed: 0,
        elapsed: Duration::ZERO,
    };

    let result =
        panic::catch_unwind(AssertUnwindSafe(|| read_gkg_file(path, Some(version), filter)));
    report.outcome = match result {
        Ok(Ok(read)) => {
            report.rows_read = read.stats.lines;
            report.rows_malformed = read.stats.skipped;
            match read.outcome {
                ReadOutcome::NoMatchingRows => FileOutcome::Empty(EmptyReason::NoMatchingRows),
                ReadOutcome::Rows(records) => {
                    let aggregation = aggregate_daily(&records);
                    report.rows_malformed += aggregation.malformed;
                    report.rows_kept = records.len() - aggregation.malformed;
                    if aggregation.rows.is_empty() {
                        FileOutcome::Empty(EmptyReason::UnusableTone)
                    } else {
                        FileOutcome::Aggregated(aggregation.rows)
                    }
                }
            }
        }
        Ok(Err(e)) => FileOutcome::Failed(e.to_string()),
        Err(_) => FileOutcome::Failed(format!("panic while reading {}", path.display())),
    };
    report.elapsed = start.elapsed();
    report
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub files_found: usize,
    pub files_skipped: usize,
    pub files_processed: usize,
    pub files_with_data: usize,
    pub files_empty: usize,
    pub files_failed: usize,
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_malformed: usize,
    pub aggregates_written: usize,
    pub failed_files: Vec<String>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, report: &FileReport, rows_written: usize) {
        self.files_processed += 1;
        self.rows_read += report.rows_read;
        self.rows_kept += report.rows_kept;
        self.rows_malformed += report.rows_malformed;
        self.aggregates_written += rows_written;
        match &report.outcome {
            FileOutcome::Aggregated(_) => self.files_with_data += 1,
            FileOutcome::Empty(_) => self.files_empty += 1,
            FileOutcome::Failed(_) => {
                self.files_failed += 1;
                self.failed_files.push(report.file_name.clone());
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "files_found": self.files_found,
            "files_skipped": self.files_skipped,
            "files_processed": self.files_processed,
            "files_with_data": self.files_with_data,
            "files_empty": self.files_empty,
            "files_failed": self.files_failed,
            "rows_read": self.rows_read,
            "rows_kept": self.rows_kept,
            "rows_malformed": self.rows_malformed,
            "aggregates_written": self.aggregates_written,
            "failed_files": self.failed_files,
            "elapsed_secs": self.elapsed.as_secs_f64(),
        })
    }
}

/// State owned by the fan-in thread. Nothing here is shared with workers.
struct FanIn {
    sink: SignalSink,
    ledger: Ledger,
    failed_log: Option<Ledger>,
    summary: RunSummary,
}

impl FanIn {
    /// Sink rows are flushed before the ledger entry is written, so a crash in
    /// between re-processes the file on the next run instead of losing it.
    fn commit(&mut self, report: &FileReport) -> Result<()> {
        let mut written = 0;
        match &report.outcome {
            FileOutcome::Aggregated(rows) => {
                written = self.sink.append(rows)?;
                self.sink.flush()?;
            }
            FileOutcome::Empty(reason) => {
                debug!("No data from {}: {:?}", report.file_name, reason);
            }
            FileOutcome::Failed(reason) => {
                warn!("Failed to process {}: {}", report.file_name, reason);
                if let Some(failed_log) = self.failed_log.as_mut() {
                    failed_log.mark_done(&report.file_name)?;
                }
            }
        }
        self.ledger
            .mark_done(&report.file_name)
            .context("Ledger write failed; resume state can no longer be trusted")?;
        self.summary.record(report, written);
        Ok(())
    }

    fn drain(
        mut self,
        receiver: Receiver<FileReport>,
        progress_bar: ProgressBar,
    ) -> Result<RunSummary> {
        info!("Writer thread started.");
        for report in receiver {
            self.commit(&report)?;
            progress_bar.inc(1);
            let took = format_elapsed(report.elapsed);
            let msg = match &report.outcome {
                FileOutcome::Aggregated(rows) => {
                    format!("OK: {} ({} days, {})", report.file_name, rows.len(), took)
                }
                FileOutcome::Empty(_) => format!("EMPTY: {} ({})", report.file_name, took),
                FileOutcome::Failed(_) => format!("ERR: {} ({})", report.file_name, took),
            };
            progress_bar.set_message(msg);
        }
        info!(
            "Writer thread finished receiving. Wrote {} rows to {}.",
            self.sink.rows_written(),
            self.sink.path().display()
        );
        Ok(self.summary)
    }
}

fn new_progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let progress_bar = ProgressBar::new(len as u64);
    match ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec}) {msg}")
    {
        Ok(style) => progress_bar.set_style(style.progress_chars("=> ")),
        Err(e) => warn!("Falling back to default progress bar style: {}", e),
    }
    progress_bar
}

/// Runs the ingestion pipeline once over `config.input_dir`.
///
/// Per-file failures are counted and never abort the run. Sink and ledger
/// write failures are fatal and returned as errors.
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunSummary> {
    let start = Instant::now();
    if config.filter.is_empty() {
        return Err(anyhow!("No theme keywords configured; every record would be dropped"));
    }

    let ledger = Ledger::open(&config.ledger)?;
    let sink = SignalSink::open(&config.output)?;
    let failed_log = config.failed_log.as_ref().map(Ledger::open).transpose()?;

    let all_files = find_gkg_files(&config.input_dir)?;
    let pending: Vec<PathBuf> = all_files
        .iter()
        .filter(|p| !ledger.is_done(&file_identifier(p)))
        .cloned()
        .collect();

    info!("Total files: {}", all_files.len());
    info!("Already processed: {}", all_files.len() - pending.len());
    info!("Remaining: {}", pending.len());

    let mut fan_in = FanIn {
        sink,
        ledger,
        failed_log,
        summary: RunSummary {
            files_found: all_files.len(),
            files_skipped: all_files.len() - pending.len(),
            ..RunSummary::default()
        },
    };

    if pending.is_empty() {
        info!("All files processed!");
        fan_in.summary.elapsed = start.elapsed();
        return Ok(fan_in.summary);
    }

    let threads = config.threads.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("Failed to build worker thread pool")?;
    info!("Processing {} files on {} worker threads", pending.len(), threads);

    let progress_bar = new_progress_bar(pending.len(), config.show_progress);
    progress_bar.set_message("Starting processing...");

    let channel_capacity = (threads * 4).max(8);
    let (report_sender, report_receiver): (Sender<FileReport>, Receiver<FileReport>) =
        bounded(channel_capacity);

    let pb_clone = progress_bar.clone();
    let writer_thread = thread::spawn(move || fan_in.drain(report_receiver, pb_clone));

    let filter = &config.filter;
    let sent = pool.install(|| {
        pending.par_iter().try_for_each_with(report_sender, |sender, path| {
            sender.send(process_file(path, filter)).map_err(|_| ())
        })
    });
    if sent.is_err() {
        error!("Writer thread stopped early; remaining files were not submitted.");
    }

    let mut summary = match writer_thread.join() {
        Ok(result) => result?,
        Err(e) => return Err(anyhow!("Writer thread panicked: {:?}", e)),
    };
    summary.elapsed = start.elapsed();

    progress_bar.finish_with_message(format!(
        "Processing finished. {} with data, {} empty, {} errors.",
        summary.files_with_data, summary.files_empty, summary.files_failed
    ));
    Ok(summary)
}
