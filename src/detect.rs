use crate::reader::open_input;
use crate::schema::{GkgVersion, LEGACY_FIELD_LIMIT};
use log::{debug, warn};
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Guesses the GKG generation of a file from the width of its first line.
///
/// The heuristic trusts the first line: a truncated or garbled first line
/// classifies the whole file. Anything that prevents reading that line falls
/// back to [`GkgVersion::Current`] with a warning.
pub fn detect_version(path: &Path) -> GkgVersion {
    match read_first_line(path) {
        Ok(Some(line)) => {
            let version = classify_line(&line);
            debug!("Detected {} GKG layout for {}", version, path.display());
            version
        }
        Ok(None) => {
            warn!("{} is empty; assuming current GKG layout", path.display());
            GkgVersion::Current
        }
        Err(e) => {
            warn!(
                "Could not read first line of {} ({}); assuming current GKG layout",
                path.display(),
                e
            );
            GkgVersion::Current
        }
    }
}

/// Classifies one raw line by its tab-separated field count.
pub fn classify_line(line: &[u8]) -> GkgVersion {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let fields = line.iter().filter(|&&b| b == b'\t').count() + 1;
    if fields <= LEGACY_FIELD_LIMIT {
        GkgVersion::Legacy
    } else {
        GkgVersion::Current
    }
}

fn read_first_line(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let mut reader = BufReader::new(open_input(path)?);
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}
