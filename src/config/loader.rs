use super::PipelineConfig;
use crate::error::{ErrorCode, ErrorExt, PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "merge-csv.yml";

/// Parse a YAML configuration file
pub fn load_config_file(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .to_config_error(
            ErrorCode::CONFIG_NOT_FOUND,
            format!("cannot read config file {}", path.display()),
        )
        .map_err(|e| e.with_path(path))?;

    serde_yaml::from_str(&content)
        .to_config_error(
            ErrorCode::CONFIG_INVALID_YAML,
            format!("invalid configuration in {}", path.display()),
        )
        .map_err(|e| e.with_path(path))
}

/// Load configuration from `explicit`, or from [`DEFAULT_CONFIG_FILE`] in
/// `cwd` if it exists, or fall back to defaults. Environment overrides are
/// applied on top.
///
/// Returns the config and the file it came from.
pub fn load_config(
    explicit: Option<&Path>,
    cwd: &Path,
) -> Result<(PipelineConfig, Option<PathBuf>)> {
    let source = match explicit {
        Some(path) => {
            let path = cwd.join(path);
            if !path.is_file() {
                return Err(PipelineError::config_with_code(
                    ErrorCode::CONFIG_NOT_FOUND,
                    format!("config file {} not found", path.display()),
                )
                .with_path(&path));
            }
            Some(path)
        }
        None => Some(cwd.join(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
    };

    let mut config = match &source {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            load_config_file(path)?
        }
        None => {
            debug!("No config file found, using defaults");
            PipelineConfig::default()
        }
    };
    config.merge_env_vars();

    Ok((config, source))
}
