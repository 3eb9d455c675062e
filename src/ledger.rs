use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only list of file names, one per line.
///
/// Used as the resume ledger (files that will not be submitted again) and as
/// the dead-letter list of files that failed. Entries are never removed.
/// A trailing line without a newline is treated as an interrupted write and
/// ignored; the next append starts on a fresh line.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: HashSet<String>,
    file: File,
    needs_newline: bool,
}

impl Ledger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create directory for ledger: {}", path.display())
            })?;
        }

        let (entries, needs_newline) = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read ledger: {}", path.display()))?;
            parse_entries(&raw, &path)
        } else {
            (HashSet::new(), false)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open ledger for append: {}", path.display()))?;

        debug!("Loaded {} entries from {}", entries.len(), path.display());
        Ok(Self { path, entries, file, needs_newline })
    }

    pub fn is_done(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// Appends `id` and flushes it to the OS before returning.
    pub fn mark_done(&mut self, id: &str) -> Result<()> {
        if self.entries.contains(id) {
            return Ok(());
        }
        let mut line = String::with_capacity(id.len() + 2);
        if self.needs_newline {
            line.push('\n');
        }
        line.push_str(id);
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .with_context(|| {
                format!("Failed to append '{}' to ledger {}", id, self.path.display())
            })?;
        self.needs_newline = false;
        self.entries.insert(id.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A ledger backed by a read-only handle, so every append fails.
    #[cfg(test)]
    pub(crate) fn read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::write(&path, "")?;
        let file = File::open(&path)?;
        Ok(Self { path, entries: HashSet::new(), file, needs_newline: false })
    }
}

fn parse_entries(raw: &str, path: &Path) -> (HashSet<String>, bool) {
    let (complete, partial) = match raw.rfind('\n') {
        Some(idx) => (&raw[..idx], &raw[idx + 1..]),
        None => ("", raw),
    };
    if !partial.is_empty() {
        warn!(
            "Ignoring unterminated last entry '{}' in {}",
            partial,
            path.display()
        );
    }
    let entries = complete
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    (entries, !partial.is_empty())
}
