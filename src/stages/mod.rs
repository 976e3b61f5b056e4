//! The pipeline's stage functions
//!
//! Each stage is a plain function from typed inputs to a typed output or a
//! [`PipelineError`](crate::error::PipelineError). None of them keeps state
//! between calls or retries on its own; sequencing and retries belong to
//! the [`orchestrator`](crate::orchestrator).

pub mod loader;
pub mod merger;
pub mod writer;

pub use loader::{load_table, CsvOptions};
pub use merger::{merge_tables, MergeOptions};
pub use writer::{read_records, records_to_string, write_records};
