//! Turns GDELT knowledge-graph exports into a daily economic news-sentiment
//! series, and merges the raw GDELT tables for downstream analysis.

pub mod aggregate;
pub mod collect;
pub mod detect;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod pipeline;
pub mod reader;
pub mod report;
pub mod schema;
pub mod sink;

pub use aggregate::{aggregate_daily, DailyAggregate};
pub use detect::detect_version;
pub use error::ReadError;
pub use filter::ThemeFilter;
pub use ledger::Ledger;
pub use pipeline::{process_file, run_pipeline, FileOutcome, PipelineConfig, RunSummary};
pub use reader::read_gkg_file;
pub use schema::{FileKind, GkgVersion};
pub use sink::SignalSink;
