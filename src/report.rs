use crate::pipeline::RunSummary;
use log::{info, warn};
use std::time::Duration;

pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = elapsed.subsec_millis();

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, millis)
    }
}

pub fn log_run_summary(summary: &RunSummary) {
    info!("-------------------- FINAL SUMMARY --------------------");
    info!("Total execution time: {}", format_elapsed(summary.elapsed));
    info!("Input files found: {}", summary.files_found);
    info!("Skipped (already in ledger): {}", summary.files_skipped);
    info!("Files processed: {}", summary.files_processed);
    info!("  with data: {}", summary.files_with_data);
    info!("  empty: {}", summary.files_empty);
    if summary.files_failed > 0 {
        warn!("  failed: {}", summary.files_failed);
        for name in summary.failed_files.iter().take(10) {
            warn!("    - {}", name);
        }
        if summary.failed_files.len() > 10 {
            warn!("    ... (and {} more)", summary.failed_files.len() - 10);
        }
    }
    info!("Lines read: {}", summary.rows_read);
    info!("Relevant records kept: {}", summary.rows_kept);
    info!("Malformed lines/records dropped: {}", summary.rows_malformed);
    info!("Daily rows appended: {}", summary.aggregates_written);
}

pub mod memory_usage {
    use log::info;

    #[derive(Debug)]
    pub struct MemoryStats {
        pub rss_mb: f64,
        pub vm_size_mb: f64,
    }

    #[cfg(target_os = "linux")]
    pub fn get_memory_usage() -> Option<MemoryStats> {
        let content = std::fs::read_to_string("/proc/self/status").ok()?;
        let field_kb = |name: &str| {
            content
                .lines()
                .find(|line| line.starts_with(name))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|s| s.parse::<f64>().ok())
        };
        Some(MemoryStats {
            rss_mb: field_kb("VmRSS:")? / 1024.0,
            vm_size_mb: field_kb("VmSize:")? / 1024.0,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn get_memory_usage() -> Option<MemoryStats> {
        None
    }

    pub fn log_memory_usage(note: &str) {
        if let Some(stats) = get_memory_usage() {
            info!(
                "Memory usage ({}): {:.1} MB physical (RSS), {:.1} MB virtual",
                note, stats.rss_mb, stats.vm_size_mb
            );
        } else {
            info!("Memory usage tracking not available on this platform ({})", std::env::consts::OS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_uses_the_largest_unit() {
        assert_eq!(format_elapsed(Duration::from_millis(1_250)), "1.250s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(3_725)), "1h 2m 5s");
    }
}
