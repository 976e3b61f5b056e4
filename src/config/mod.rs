//! Pipeline configuration
//!
//! Values come from, lowest precedence first: built-in defaults, a YAML
//! file, `MERGE_CSV_*` environment variables, and command-line overrides.
//! [`PipelineConfig::resolve`] validates the result and turns it into the
//! [`PipelineSettings`] the orchestrator runs with.

use crate::error::{ErrorCode, PipelineError, Result};
use crate::orchestrator::retry::RetryConfig;
use crate::stages::{CsvOptions, MergeOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod loader;

pub use loader::{load_config, load_config_file, DEFAULT_CONFIG_FILE};

pub const ENV_DATA_DIR: &str = "MERGE_CSV_DATA_DIR";
pub const ENV_LEFT: &str = "MERGE_CSV_LEFT";
pub const ENV_RIGHT: &str = "MERGE_CSV_RIGHT";
pub const ENV_OUTPUT: &str = "MERGE_CSV_OUTPUT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline name shown in logs and the run report
    pub name: String,
    /// Directory that relative input and output paths are resolved against
    pub data_dir: PathBuf,
    pub inputs: InputsConfig,
    pub output: PathBuf,
    pub csv: CsvOptions,
    pub merge: MergeOptions,
    pub retry: RetryConfig,
    /// Run independent stages concurrently
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub left: PathBuf,
    pub right: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "split_merge_csv".to_string(),
            data_dir: PathBuf::from("data"),
            inputs: InputsConfig::default(),
            output: PathBuf::from("merged.json"),
            csv: CsvOptions::default(),
            merge: MergeOptions::default(),
            retry: RetryConfig::default(),
            parallel: true,
        }
    }
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            left: PathBuf::from("file1.csv"),
            right: PathBuf::from("file2.csv"),
        }
    }
}

/// Values given on the command line; `None` leaves the configured value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub left: Option<PathBuf>,
    pub right: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub key: Option<String>,
    pub delimiter: Option<char>,
    pub sequential: bool,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub name: String,
    pub left: PathBuf,
    pub right: PathBuf,
    pub output: PathBuf,
    pub csv: CsvOptions,
    pub merge: MergeOptions,
    pub retry: RetryConfig,
    pub parallel: bool,
}

impl PipelineConfig {
    /// Apply `MERGE_CSV_*` variables from the process environment
    pub fn merge_env_vars(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides read through `lookup`; empty values are ignored
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty()).map(PathBuf::from);

        if let Some(dir) = var(ENV_DATA_DIR) {
            self.data_dir = dir;
        }
        if let Some(left) = var(ENV_LEFT) {
            self.inputs.left = left;
        }
        if let Some(right) = var(ENV_RIGHT) {
            self.inputs.right = right;
        }
        if let Some(output) = var(ENV_OUTPUT) {
            self.output = output;
        }
    }

    /// Apply command-line overrides.
    ///
    /// Paths given on the command line are taken relative to `cwd`, not to
    /// the data directory.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides, cwd: &Path) {
        if let Some(left) = &overrides.left {
            self.inputs.left = cwd.join(left);
        }
        if let Some(right) = &overrides.right {
            self.inputs.right = cwd.join(right);
        }
        if let Some(output) = &overrides.output {
            self.output = cwd.join(output);
        }
        if let Some(key) = &overrides.key {
            self.merge.key = key.clone();
        }
        if let Some(delimiter) = overrides.delimiter {
            self.csv.delimiter = delimiter;
        }
        if overrides.sequential {
            self.parallel = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                "pipeline name must not be empty",
            ));
        }
        for (field, path) in [
            ("inputs.left", &self.inputs.left),
            ("inputs.right", &self.inputs.right),
            ("output", &self.output),
        ] {
            if path.as_os_str().is_empty() {
                return Err(PipelineError::config_with_code(
                    ErrorCode::CONFIG_INVALID_VALUE,
                    format!("{} must not be empty", field),
                ));
            }
        }
        self.csv.delimiter_byte()?;
        self.merge.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    /// Validate and resolve relative paths against the data directory
    pub fn resolve(&self) -> Result<PipelineSettings> {
        self.validate()?;
        Ok(PipelineSettings {
            name: self.name.clone(),
            left: self.data_dir.join(&self.inputs.left),
            right: self.data_dir.join(&self.inputs.right),
            output: self.data_dir.join(&self.output),
            csv: self.csv.clone(),
            merge: self.merge.clone(),
            retry: self.retry.clone(),
            parallel: self.parallel,
        })
    }
}
