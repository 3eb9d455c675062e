use crate::detect::detect_version;
use crate::error::ReadError;
use crate::filter::ThemeFilter;
use crate::schema::{GkgLayout, GkgVersion};
use csv::{ByteRecord, ReaderBuilder};
use flate2::read::GzDecoder;
use log::debug;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// A GKG record projected onto the normalized columns and known to be relevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GkgRecord {
    pub date: String,
    pub source: String,
    pub themes: String,
    pub tone: String,
    pub organizations: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub lines: usize,
    pub skipped: usize,
    pub kept: usize,
}

#[derive(Debug)]
pub enum ReadOutcome {
    Rows(Vec<GkgRecord>),
    /// The file parsed but nothing passed the theme filter.
    NoMatchingRows,
}

#[derive(Debug)]
pub struct FileRead {
    pub version: GkgVersion,
    pub outcome: ReadOutcome,
    pub stats: ReadStats,
}

/// Opens an input file, decompressing it on the fly when it ends in `.gz`.
pub fn open_input(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    let is_gz = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if is_gz {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Reads one GKG file, keeping only relevant records in normalized form.
///
/// Lines that are too short for the layout or whose projected fields are not
/// valid UTF-8 are skipped one at a time. A file where every line was skipped
/// is reported as [`ReadError::Unparseable`].
pub fn read_gkg_file(
    path: &Path,
    version: Option<GkgVersion>,
    filter: &ThemeFilter,
) -> Result<FileRead, ReadError> {
    let version = version.unwrap_or_else(|| detect_version(path));
    let layout = version.layout();

    let input = open_input(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ReadError::NotFound(path.to_path_buf()),
        _ => ReadError::Open { path: path.to_path_buf(), source: e },
    })?;

    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(input);

    let mut stats = ReadStats::default();
    let mut rows = Vec::new();
    let mut record = ByteRecord::new();

    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                let line = e.position().map_or(stats.lines as u64 + 1, |p| p.line());
                return Err(ReadError::Decode { path: path.to_path_buf(), line, source: e });
            }
            Err(e) => {
                stats.lines += 1;
                stats.skipped += 1;
                debug!("Skipping unreadable line in {}: {}", path.display(), e);
                continue;
            }
        }
        stats.lines += 1;

        match project(&record, layout, filter) {
            Projection::Kept(row) => {
                stats.kept += 1;
                rows.push(row);
            }
            Projection::Irrelevant => {}
            Projection::Malformed => stats.skipped += 1,
        }
    }

    if stats.lines > 0 && stats.skipped == stats.lines {
        return Err(ReadError::Unparseable {
            path: path.to_path_buf(),
            lines: stats.lines,
            skipped: stats.skipped,
        });
    }

    debug!(
        "Read {} ({} layout): {} lines, {} kept, {} skipped",
        path.display(),
        version,
        stats.lines,
        stats.kept,
        stats.skipped
    );

    let outcome = if rows.is_empty() {
        ReadOutcome::NoMatchingRows
    } else {
        ReadOutcome::Rows(rows)
    };
    Ok(FileRead { version, outcome, stats })
}

enum Projection {
    Kept(GkgRecord),
    Irrelevant,
    Malformed,
}

fn project(record: &ByteRecord, layout: &GkgLayout, filter: &ThemeFilter) -> Projection {
    if record.len() < layout.min_fields() {
        return Projection::Malformed;
    }
    let field = move |offset: usize| std::str::from_utf8(record.get(offset).unwrap_or_default());

    let themes = match field(layout.themes) {
        Ok(t) => t,
        Err(_) => return Projection::Malformed,
    };
    if !filter.is_relevant(Some(themes)) {
        return Projection::Irrelevant;
    }

    match (
        field(layout.date),
        field(layout.source),
        field(layout.tone),
        field(layout.organizations),
    ) {
        (Ok(date), Ok(source), Ok(tone), Ok(organizations)) => Projection::Kept(GkgRecord {
            date: date.to_string(),
            source: source.to_string(),
            themes: themes.to_string(),
            tone: tone.to_string(),
            organizations: organizations.to_string(),
        }),
        _ => Projection::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    fn legacy_line(date: &str, themes: &str, tone: &str) -> String {
        format!("{date}\t1\t\t{themes}\t\t\tFederal Reserve\t{tone}\t\tnytimes.com\thttp://x\n")
    }

    fn current_line(date: &str, themes: &str, tone: &str) -> String {
        let mut fields = vec![""; 27];
        fields[0] = "20150218230000-0";
        fields[1] = date;
        fields[3] = "reuters.com";
        fields[7] = themes;
        fields[13] = "imf";
        fields[15] = tone;
        format!("{}\n", fields.join("\t"))
    }

    #[test]
    fn legacy_rows_are_projected_onto_current_names() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("20150101.gkg.csv");
        let body = [
            legacy_line("20150101", "ECON_STOCKMARKET;", "5.0,2,1,3.0,0,0"),
            legacy_line("20150101", "PROTEST;", "1,1,1,1,0,0"),
        ]
        .concat();
        fs::write(&path, body).expect("write");

        let read = read_gkg_file(&path, None, &ThemeFilter::default()).expect("read");
        assert_eq!(read.version, GkgVersion::Legacy);
        assert_eq!(read.stats, ReadStats { lines: 2, skipped: 0, kept: 1 });
        let ReadOutcome::Rows(rows) = read.outcome else {
            panic!("expected rows");
        };
        assert_eq!(
            rows,
            vec![GkgRecord {
                date: "20150101".into(),
                source: "nytimes.com".into(),
                themes: "ECON_STOCKMARKET;".into(),
                tone: "5.0,2,1,3.0,0,0".into(),
                organizations: "Federal Reserve".into(),
            }]
        );
    }

    #[test]
    fn current_rows_use_current_offsets() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("20150218230000.gkg.csv");
        fs::write(&path, current_line("20150218230000", "TAX_FNCACT;", "-2.1,1,3,4,0,0,10"))
            .expect("write");

        let read = read_gkg_file(&path, None, &ThemeFilter::default()).expect("read");
        assert_eq!(read.version, GkgVersion::Current);
        let ReadOutcome::Rows(rows) = read.outcome else {
            panic!("expected rows");
        };
        assert_eq!(rows[0].date, "20150218230000");
        assert_eq!(rows[0].source, "reuters.com");
        assert_eq!(rows[0].organizations, "imf");
        assert_eq!(rows[0].tone, "-2.1,1,3,4,0,0,10");
    }

    fn with_invalid_byte(line: String) -> Vec<u8> {
        line.into_bytes()
            .into_iter()
            .map(|b| if b == b'~' { 0xff } else { b })
            .collect()
    }

    #[test]
    fn short_and_non_utf8_lines_are_skipped_individually() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("mixed.gkg.csv");
        let mut body = legacy_line("20150101", "ECON_INFLATION;", "1,1,1,1,0,0").into_bytes();
        body.extend_from_slice(b"20150101\tonly\tthree\n");
        body.extend(with_invalid_byte(legacy_line("20150101", "ECON_DEBT~;", "1,1,1,1,0,0")));
        // invalid bytes outside the projected columns are tolerated
        body.extend(with_invalid_byte(
            "20150102\t1\t\tECON_DEBT;\t\t\t\t1,1,1,1,0,0\t\tsite.com\thttp://x~\n".to_string(),
        ));
        fs::write(&path, body).expect("write");

        let read = read_gkg_file(&path, Some(GkgVersion::Legacy), &ThemeFilter::default())
            .expect("read");
        assert_eq!(read.stats, ReadStats { lines: 4, skipped: 2, kept: 2 });
    }

    #[test]
    fn no_relevant_rows_is_not_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("quiet.gkg.csv");
        fs::write(&path, current_line("20150101000000", "PROTEST;", "1,1,1,1")).expect("write");

        let read = read_gkg_file(&path, None, &ThemeFilter::default()).expect("read");
        assert!(matches!(read.outcome, ReadOutcome::NoMatchingRows));
    }

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nope.gkg.csv");
        let err = read_gkg_file(&path, Some(GkgVersion::Legacy), &ThemeFilter::default())
            .expect_err("missing file");
        assert!(matches!(err, ReadError::NotFound(_)));
    }

    #[test]
    fn file_with_no_usable_lines_is_unparseable() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("garbage.gkg.csv");
        fs::write(&path, "a\tb\nc\td\n").expect("write");

        let err = read_gkg_file(&path, None, &ThemeFilter::default()).expect_err("garbage");
        assert!(matches!(err, ReadError::Unparseable { lines: 2, skipped: 2, .. }));
    }

    #[test]
    fn gzip_inputs_are_decompressed() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("20150101.gkg.csv.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(legacy_line("20150101", "ECON_BANKRUPTCY;", "1,1,1,1,0,0").as_bytes())
            .expect("compress");
        fs::write(&path, encoder.finish().expect("finish")).expect("write");

        let read = read_gkg_file(&path, None, &ThemeFilter::default()).expect("read");
        assert_eq!(read.version, GkgVersion::Legacy);
        assert_eq!(read.stats.kept, 1);
    }
}
