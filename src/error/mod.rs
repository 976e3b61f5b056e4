use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod codes;
pub mod helpers;

pub use codes::{describe_error_code, ErrorCode};
pub use helpers::ErrorExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The unified error type for every pipeline stage and the orchestrator
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[E{code:04}] Source unavailable: {}", .path.display())]
    SourceUnavailable {
        code: u16,
        path: PathBuf,
        #[source]
        source: Option<BoxError>,
    },

    #[error("[E{code:04}] Malformed input in {}: {message}", .path.display())]
    MalformedInput {
        code: u16,
        path: PathBuf,
        /// 1-based line of the offending record, when known
        line: Option<u64>,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("[E{code:04}] Key column '{column}' missing from {side} table")]
    KeyColumnMissing {
        code: u16,
        column: String,
        side: String,
    },

    #[error("[E{code:04}] Destination unwritable: {}", .path.display())]
    DestinationUnwritable {
        code: u16,
        path: PathBuf,
        #[source]
        source: Option<BoxError>,
    },

    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<BoxError>,
    },

    #[error("[E{code:04}] Workflow error: {message}")]
    Workflow {
        code: u16,
        message: String,
        stage: Option<String>,
        #[source]
        source: Option<BoxError>,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a source error from the I/O failure that caused it
    pub fn source_unavailable(path: impl AsRef<Path>, err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::PermissionDenied => ErrorCode::SOURCE_PERMISSION_DENIED,
            _ => ErrorCode::SOURCE_UNAVAILABLE,
        };
        Self::SourceUnavailable {
            code,
            path: path.as_ref().to_path_buf(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a malformed input error
    pub fn malformed(
        code: u16,
        path: impl AsRef<Path>,
        line: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let message = match line {
            Some(line) => format!("line {}: {}", line, message),
            None => message,
        };
        Self::MalformedInput {
            code,
            path: path.as_ref().to_path_buf(),
            line,
            message,
            source: None,
        }
    }

    /// Create a missing key column error; `side` names the table ("left" or "right")
    pub fn key_column_missing(column: impl Into<String>, side: impl Into<String>) -> Self {
        Self::KeyColumnMissing {
            code: ErrorCode::MERGE_KEY_COLUMN_MISSING,
            column: column.into(),
            side: side.into(),
        }
    }

    /// Create a destination error with specific code
    pub fn destination_unwritable(code: u16, path: impl AsRef<Path>) -> Self {
        Self::DestinationUnwritable {
            code,
            path: path.as_ref().to_path_buf(),
            source: None,
        }
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a workflow error with specific code, optionally naming the stage
    pub fn workflow(code: u16, message: impl Into<String>, stage: Option<String>) -> Self {
        Self::Workflow {
            code,
            message: message.into(),
            stage,
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        match &mut self {
            Self::SourceUnavailable { source: src, .. }
            | Self::MalformedInput { source: src, .. }
            | Self::DestinationUnwritable { source: src, .. }
            | Self::Config { source: src, .. }
            | Self::Workflow { source: src, .. } => {
                *src = Some(source.into());
            }
            Self::KeyColumnMissing { .. } => {}
        }
        self
    }

    /// Attach the file a configuration error refers to
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        if let Self::Config { path: p, .. } = &mut self {
            *p = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::SourceUnavailable { code, .. }
            | Self::MalformedInput { code, .. }
            | Self::KeyColumnMissing { code, .. }
            | Self::DestinationUnwritable { code, .. }
            | Self::Config { code, .. }
            | Self::Workflow { code, .. } => *code,
        }
    }

    /// Stable snake_case name of the error kind, used in run reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::MalformedInput { .. } => "malformed_input",
            Self::KeyColumnMissing { .. } => "key_column_missing",
            Self::DestinationUnwritable { .. } => "destination_unwritable",
            Self::Config { .. } => "config",
            Self::Workflow { .. } => "workflow",
        }
    }

    /// Whether another attempt could succeed without the inputs changing.
    ///
    /// Only I/O-rooted failures qualify; parse and schema failures are
    /// deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::DestinationUnwritable { .. }
        )
    }

    /// The path this error refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::SourceUnavailable { path, .. }
            | Self::MalformedInput { path, .. }
            | Self::DestinationUnwritable { path, .. } => Some(path),
            Self::Config { path, .. } => path.as_deref(),
            Self::KeyColumnMissing { .. } | Self::Workflow { .. } => None,
        }
    }
}
