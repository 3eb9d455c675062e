use std::path::PathBuf;
use thiserror::Error;

/// Per-file read failures. The pipeline records these against the file and
/// moves on; they never abort a run.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path} near line {line}: {source}")]
    Decode {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },
    #[error("no parseable lines in {path} ({skipped} of {lines} skipped)")]
    Unparseable {
        path: PathBuf,
        lines: usize,
        skipped: usize,
    },
}
