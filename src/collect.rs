//! Merge-and-dedupe of raw GDELT tables and dataset inspection.
//!
//! These sit next to the signal pipeline: they read the same input directory
//! but produce full-width, comma-separated tables for downstream analysis.

use crate::detect::detect_version;
use crate::reader::open_input;
use crate::schema::{Dedupe, FileKind, GkgVersion};
use anyhow::{Context, Result};
use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use glob::glob;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::PrimitiveDateTime;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub files_read: usize,
    pub files_failed: usize,
    pub rows_in: usize,
    pub rows_out: usize,
    pub output: PathBuf,
    /// GKG generation of the merged files; `None` for export and mentions.
    pub version: Option<GkgVersion>,
}

/// Files of one kind directly inside `dir`, sorted by name.
pub fn find_kind_files(dir: &Path, kind: FileKind) -> Result<Vec<PathBuf>> {
    let pattern = dir.join(format!("*{}", kind.suffix()));
    let mut paths: Vec<PathBuf> = glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .collect();
    paths.sort();
    Ok(paths)
}

fn read_raw_table(path: &Path) -> Result<Vec<ByteRecord>> {
    let input = open_input(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(input);
    let mut rows = Vec::new();
    for record in reader.byte_records() {
        rows.push(record.with_context(|| format!("Failed to parse {}", path.display()))?);
    }
    Ok(rows)
}

fn row_key(record: &ByteRecord) -> Vec<u8> {
    let mut key = Vec::with_capacity(record.as_slice().len() + record.len());
    for field in record.iter() {
        key.extend_from_slice(field);
        key.push(0x1f);
    }
    key
}

/// Applies a dedupe policy, preserving the order of the surviving rows.
pub fn dedupe_rows(rows: Vec<ByteRecord>, policy: Dedupe) -> Vec<ByteRecord> {
    match policy {
        Dedupe::LastByColumn(column) => {
            let mut last_seen: HashMap<&[u8], usize> = HashMap::with_capacity(rows.len());
            for (idx, row) in rows.iter().enumerate() {
                last_seen.insert(row.get(column).unwrap_or_default(), idx);
            }
            let keep: HashSet<usize> = last_seen.into_values().collect();
            rows.into_iter()
                .enumerate()
                .filter_map(|(idx, row)| keep.contains(&idx).then_some(row))
                .collect()
        }
        Dedupe::ExactRow => {
            let mut seen = HashSet::with_capacity(rows.len());
            rows.into_iter().filter(|row| seen.insert(row_key(row))).collect()
        }
    }
}

/// One merged output: the files feeding it and how they are headed and deduped.
struct MergePlan {
    files: Vec<PathBuf>,
    columns: &'static [&'static str],
    dedupe: Dedupe,
    output: PathBuf,
    version: Option<GkgVersion>,
}

/// Legacy GKG files carry a different column set and no record id, so they
/// are merged on their own, next to `output`, and deduped by exact row.
fn plan_merge(kind: FileKind, files: Vec<PathBuf>, output: &Path) -> Vec<MergePlan> {
    if kind != FileKind::Gkg {
        return vec![MergePlan {
            files,
            columns: kind.columns(),
            dedupe: kind.dedupe(),
            output: output.to_path_buf(),
            version: None,
        }];
    }

    let (legacy, current): (Vec<PathBuf>, Vec<PathBuf>) = files
        .into_iter()
        .partition(|path| detect_version(path) == GkgVersion::Legacy);
    let mut plans = Vec::with_capacity(2);
    if !current.is_empty() {
        plans.push(MergePlan {
            files: current,
            columns: kind.columns(),
            dedupe: kind.dedupe(),
            output: output.to_path_buf(),
            version: Some(GkgVersion::Current),
        });
    }
    if !legacy.is_empty() {
        let legacy_output = legacy_output_path(output);
        info!(
            "{} legacy gkg files will be merged separately into {}",
            legacy.len(),
            legacy_output.display()
        );
        plans.push(MergePlan {
            files: legacy,
            columns: GkgVersion::Legacy.layout().columns,
            dedupe: Dedupe::ExactRow,
            output: legacy_output,
            version: Some(GkgVersion::Legacy),
        });
    }
    plans
}

/// `merged_gkg.csv` becomes `merged_gkg_legacy.csv`.
pub fn legacy_output_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| FileKind::Gkg.label().to_string());
    let extension = output
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    output.with_file_name(format!("{stem}_legacy{extension}"))
}

/// Merges every file of `kind` in `dir` into headed CSVs.
///
/// Most kinds produce one file at `output`. GKG directories holding legacy
/// files also produce a second file from [`legacy_output_path`]. Returns an
/// empty list when there is nothing to merge.
pub fn merge_kind(dir: &Path, kind: FileKind, output: &Path) -> Result<Vec<MergeReport>> {
    let files = find_kind_files(dir, kind)?;
    if files.is_empty() {
        warn!("No {} files found in {}", kind.label(), dir.display());
        return Ok(Vec::new());
    }

    let mut reports = Vec::new();
    for plan in plan_merge(kind, files, output) {
        if let Some(report) = merge_plan(kind, plan)? {
            reports.push(report);
        }
    }
    Ok(reports)
}

fn merge_plan(kind: FileKind, plan: MergePlan) -> Result<Option<MergeReport>> {
    let label = match plan.version {
        Some(version) => format!("{} ({})", kind.label(), version),
        None => kind.label().to_string(),
    };
    info!("Merging {} {} files...", plan.files.len(), label);
    let mut report = MergeReport {
        output: plan.output.clone(),
        version: plan.version,
        ..MergeReport::default()
    };
    let mut rows = Vec::new();
    let total = plan.files.len();
    for (i, file) in plan.files.iter().enumerate() {
        match read_raw_table(file) {
            Ok(table) => {
                info!("  [{}/{}] {} ({} rows)", i + 1, total, file.display(), table.len());
                report.files_read += 1;
                rows.extend(table);
            }
            Err(e) => {
                warn!("  [{}/{}] {} skipped: {:#}", i + 1, total, file.display(), e);
                report.files_failed += 1;
            }
        }
    }
    if report.files_read == 0 {
        warn!("Every {} file failed to parse; nothing written", label);
        return Ok(None);
    }

    report.rows_in = rows.len();
    let rows = dedupe_rows(rows, plan.dedupe);
    report.rows_out = rows.len();

    let output = &plan.output;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create directory structure for: {}", output.display())
        })?;
    }
    let file = File::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    let mut writer = WriterBuilder::new().flexible(true).from_writer(file);
    writer
        .write_record(plan.columns)
        .context("Failed to write merged header")?;
    for row in &rows {
        writer.write_byte_record(row)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", output.display()))?;

    info!(
        "Total {} records: {} ({} before deduplication). Saved to: {}",
        label,
        report.rows_out,
        report.rows_in,
        output.display()
    );
    Ok(Some(report))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSnapshot {
    pub file_name: String,
    pub captured_at: Option<PrimitiveDateTime>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetInfo {
    pub export_files: usize,
    pub gkg_files: usize,
    pub mentions_files: usize,
    pub exports: Vec<ExportSnapshot>,
    /// Record count of the first file of each kind that has one.
    pub sample_counts: Vec<(FileKind, Result<usize, String>)>,
}

/// Parses the `YYYYMMDDHHMMSS` prefix of a GDELT file name.
pub fn capture_timestamp(file_name: &str) -> Option<PrimitiveDateTime> {
    let stamp = file_name.split('.').next()?;
    let format = format_description!("[year][month][day][hour][minute][second]");
    PrimitiveDateTime::parse(stamp, format).ok()
}

pub fn dataset_info(dir: &Path) -> Result<DatasetInfo> {
    let mut info = DatasetInfo::default();
    for kind in FileKind::ALL {
        let files = find_kind_files(dir, kind)?;
        match kind {
            FileKind::Export => {
                info.export_files = files.len();
                for path in &files {
                    let file_name = crate::pipeline::file_identifier(path);
                    let size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                    info.exports.push(ExportSnapshot {
                        captured_at: capture_timestamp(&file_name),
                        file_name,
                        size_bytes,
                    });
                }
            }
            FileKind::Gkg => info.gkg_files = files.len(),
            FileKind::Mentions => info.mentions_files = files.len(),
        }
        if let Some(first) = files.first() {
            let count = read_raw_table(first).map(|t| t.len()).map_err(|e| format!("{:#}", e));
            info.sample_counts.push((kind, count));
        }
    }
    Ok(info)
}

pub fn log_dataset_info(dir: &Path, info: &DatasetInfo) {
    let stamp_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    info!("GDELT dataset in {}", dir.display());
    info!("Export files (events): {}", info.export_files);
    info!("GKG files (knowledge graph): {}", info.gkg_files);
    info!("Mentions files: {}", info.mentions_files);
    if !info.exports.is_empty() {
        info!("Available timestamps:");
        for snap in &info.exports {
            let when = snap
                .captured_at
                .and_then(|t| t.format(stamp_format).ok())
                .unwrap_or_else(|| "unknown".to_string());
            let size_kb = snap.size_bytes as f64 / 1024.0;
            info!("  {} UTC - {:.1} KB ({})", when, size_kb, snap.file_name);
        }
    }
    for (kind, count) in &info.sample_counts {
        match count {
            Ok(n) => info!("Sample record count ({}, first file): {}", kind.label(), n),
            Err(e) => warn!(
                "Sample record count ({}, first file): error reading - {}",
                kind.label(),
                e
            ),
        }
    }
}

/// Writes the name of every regular file under `dir`, one per line.
pub fn list_files(dir: &Path, output: &Path) -> Result<usize> {
    let pattern = dir.join("**").join("*");
    let mut names: Vec<String> = glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .map(|p| crate::pipeline::file_identifier(&p))
        .collect();
    names.sort();

    let file = File::create(output)
        .with_context(|| format!("Failed to create listing: {}", output.display()))?;
    let mut out = BufWriter::new(file);
    for name in &names {
        writeln!(out, "{}", name)?;
    }
    out.flush()
        .with_context(|| format!("Failed to flush listing: {}", output.display()))?;
    info!("Saved {} files to {}", names.len(), output.display());
    Ok(names.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(fields: &[&str]) -> ByteRecord {
        ByteRecord::from(fields.to_vec())
    }

    #[test]
    fn last_by_column_keeps_final_occurrence_in_place() {
        let rows = vec![rec(&["1", "a"]), rec(&["2", "b"]), rec(&["1", "c"])];
        let kept = dedupe_rows(rows, Dedupe::LastByColumn(0));
        assert_eq!(kept, vec![rec(&["2", "b"]), rec(&["1", "c"])]);
    }

    #[test]
    fn exact_row_dedupe_keeps_first_and_respects_boundaries() {
        let rows = vec![rec(&["a", "bc"]), rec(&["ab", "c"]), rec(&["a", "bc"])];
        let kept = dedupe_rows(rows, Dedupe::ExactRow);
        assert_eq!(kept, vec![rec(&["a", "bc"]), rec(&["ab", "c"])]);
    }

    #[test]
    fn capture_timestamp_reads_file_prefix() {
        let ts = capture_timestamp("20251201000000.export.CSV").expect("timestamp");
        assert_eq!(ts.year(), 2025);
        assert_eq!(u8::from(ts.month()), 12);
        assert_eq!(ts.hour(), 0);
        assert!(capture_timestamp("merged_export.csv").is_none());
    }

    #[test]
    fn merge_writes_header_and_dedupes_export_events() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("20150101000000.export.CSV"), "1\t20150101\n2\t20150101\n")
            .expect("write");
        fs::write(dir.path().join("20150102000000.export.CSV"), "1\t20150102\n").expect("write");
        let output = dir.path().join("merged_export.csv");

        let reports = merge_kind(dir.path(), FileKind::Export, &output).expect("merge");
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.files_read, 2);
        assert_eq!(report.rows_in, 3);
        assert_eq!(report.rows_out, 2);

        let merged = fs::read_to_string(&output).expect("read");
        let mut lines = merged.lines();
        assert!(lines.next().expect("header").starts_with("GLOBALEVENTID,SQLDATE,MonthYear"));
        assert_eq!(lines.collect::<Vec<_>>(), vec!["2,20150101", "1,20150102"]);
    }

    #[test]
    fn merge_without_inputs_writes_nothing() {
        let dir = tempdir().expect("tempdir");
        let output = dir.path().join("merged_mentions.csv");
        assert!(merge_kind(dir.path(), FileKind::Mentions, &output).expect("merge").is_empty());
        assert!(!output.exists());
    }

    #[test]
    fn legacy_gkg_files_merge_separately_without_date_collapse() {
        let dir = tempdir().expect("tempdir");
        let legacy = [
            "20150101\t1\t\tECON_A;\t\t\tIMF\t1,0,0,1\t\ta.com\thttp://a\n",
            "20150101\t1\t\tECON_B;\t\t\tIMF\t2,0,0,1\t\tb.com\thttp://b\n",
            "20150101\t1\t\tECON_C;\t\t\tIMF\t3,0,0,1\t\tc.com\thttp://c\n",
        ]
        .concat();
        fs::write(dir.path().join("20150101.gkg.csv"), &legacy).expect("write legacy");
        let mut current = vec![""; 27];
        current[0] = "20150218230000-0";
        current[1] = "20150218230000";
        fs::write(dir.path().join("20150218230000.gkg.csv"), format!("{}\n", current.join("\t")))
            .expect("write current");
        let output = dir.path().join("merged_gkg.csv");

        let reports = merge_kind(dir.path(), FileKind::Gkg, &output).expect("merge");
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].version, Some(GkgVersion::Current));
        assert_eq!(reports[0].output, output);
        assert_eq!((reports[0].rows_in, reports[0].rows_out), (1, 1));
        assert_eq!(reports[1].version, Some(GkgVersion::Legacy));
        assert_eq!(reports[1].output, dir.path().join("merged_gkg_legacy.csv"));
        assert_eq!((reports[1].rows_in, reports[1].rows_out), (3, 3));

        let merged = fs::read_to_string(&output).expect("read current");
        assert!(merged.starts_with("GKGRECORDID,DATE,"));
        assert!(!merged.contains("ECON_"));

        let merged_legacy = fs::read_to_string(&reports[1].output).expect("read legacy");
        let mut lines = merged_legacy.lines();
        assert!(lines.next().expect("header").starts_with("DATE,NUMARTS,COUNTS,THEMES"));
        assert_eq!(lines.filter(|l| l.starts_with("20150101,1,,ECON_")).count(), 3);
    }

    #[test]
    fn legacy_output_sits_next_to_the_main_output() {
        assert_eq!(
            legacy_output_path(Path::new("out/merged_gkg.csv")),
            PathBuf::from("out/merged_gkg_legacy.csv")
        );
    }

    #[test]
    fn info_counts_each_kind() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("20150101000000.export.CSV"), "1\tx\n2\ty\n").expect("write");
        fs::write(dir.path().join("20150101000000.gkg.csv"), "20150101\tx\n").expect("write");

        let info = dataset_info(dir.path()).expect("info");
        assert_eq!((info.export_files, info.gkg_files, info.mentions_files), (1, 1, 0));
        assert!(info.exports[0].captured_at.is_some());
        assert_eq!(info.sample_counts[0], (FileKind::Export, Ok(2)));
    }

    #[test]
    fn list_files_walks_subdirectories() {
        let dir = tempdir().expect("tempdir");
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("2015")).expect("mkdir");
        fs::write(data.join("a.gkg.csv"), "").expect("write");
        fs::write(data.join("2015").join("b.export.CSV"), "").expect("write");
        let listing = dir.path().join("file-list.txt");

        assert_eq!(list_files(&data, &listing).expect("list"), 2);
        assert_eq!(fs::read_to_string(&listing).expect("read"), "a.gkg.csv\nb.export.CSV\n");
    }
}
