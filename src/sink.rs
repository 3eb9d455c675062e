use crate::aggregate::DailyAggregate;
use crate::schema::SIGNAL_HEADER;
use anyhow::{Context, Result};
use csv::Writer;
use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only CSV of daily economic-signal rows.
///
/// Rows are keyed by date but never deduplicated here: two files covering the
/// same day each contribute a row. A last row left without its newline by an
/// interrupted write is closed off on open, so new rows start on a fresh line.
pub struct SignalSink {
    writer: Writer<File>,
    file_path: PathBuf,
    rows_written: usize,
}

impl SignalSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directory structure for: {}", file_path.display())
            })?;
        }

        let needs_header = fs::metadata(&file_path).map_or(true, |m| m.len() == 0);
        let torn_tail = ends_mid_row(&file_path)
            .with_context(|| format!("Failed to inspect output file: {}", file_path.display()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .with_context(|| format!("Failed to open output file: {}", file_path.display()))?;

        if torn_tail {
            warn!(
                "{} ends with an unterminated row; starting new rows on a fresh line",
                file_path.display()
            );
            file.write_all(b"\n")
                .and_then(|_| file.flush())
                .with_context(|| format!("Failed to repair output file: {}", file_path.display()))?;
        }

        let mut writer = Writer::from_writer(file);
        if needs_header {
            info!("Initializing signal output file: {}", file_path.display());
            writer
                .write_record(SIGNAL_HEADER)
                .context("Failed to write header to signal output file")?;
            writer
                .flush()
                .context("Failed to flush header to signal output file")?;
        } else {
            info!("Appending to existing signal output file: {}", file_path.display());
        }

        Ok(Self { writer, file_path, rows_written: 0 })
    }

    pub fn append(&mut self, rows: &[DailyAggregate]) -> Result<usize> {
        for row in rows {
            self.writer.write_record(row.to_record()).with_context(|| {
                format!("Failed to write row for {} to {}", row.date, self.file_path.display())
            })?;
        }
        self.rows_written += rows.len();
        Ok(rows.len())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().with_context(|| {
            format!("Failed to flush signal output file: {}", self.file_path.display())
        })
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// True when a non-empty file does not end in `\n`.
fn ends_mid_row(path: &Path) -> io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
