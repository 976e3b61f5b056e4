//! # merge-csv
//!
//! Reads two CSV files, outer-joins them on a key column and writes the
//! merged rows as pretty-printed JSON records.
//!
//! ## Usage
//!
//! ```bash
//! merge-csv run [--config merge-csv.yml] [--left a.csv] [--right b.csv] [--output merged.json]
//! ```
//!
//! ## Modules
//!
//! - `config` - YAML configuration, environment overrides and path resolution
//! - `error` - Error type with numeric codes shared by every stage
//! - `orchestrator` - Stage graph, retries, hand-off store and run report
//! - `stages` - The loader, merger and writer stage functions
//! - `table` - In-memory tables and cell values
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod stages;
pub mod table;

pub use error::{PipelineError, Result};
