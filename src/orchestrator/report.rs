//! Per-run status report

use super::graph::StageId;
use crate::error::{ErrorCode, ErrorExt, PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    /// Skipped because a predecessor did not succeed
    UpstreamFailed,
}

impl StageStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            StageStatus::Success => "✅",
            StageStatus::Failed => "❌",
            StageStatus::UpstreamFailed => "⏭️",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub kind: &'static str,
    pub code: u16,
    pub message: String,
}

impl From<&PipelineError> for ErrorSummary {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub status: StageStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    /// Rows in the stage's output table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    /// Predecessor whose failure caused this stage to be skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<StageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
    #[serde(skip)]
    pub failure: Option<PipelineError>,
}

impl StageRecord {
    pub fn succeeded(&self) -> bool {
        self.status == StageStatus::Success
    }

    pub(crate) fn failed(
        stage: StageId,
        attempts: u32,
        started_at: Option<DateTime<Utc>>,
        duration_ms: u64,
        err: PipelineError,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            attempts,
            started_at,
            duration_ms,
            rows: None,
            upstream: None,
            error: Some(ErrorSummary::from(&err)),
            failure: Some(err),
        }
    }

    pub(crate) fn upstream_failed(stage: StageId, upstream: StageId) -> Self {
        Self {
            stage,
            status: StageStatus::UpstreamFailed,
            attempts: 0,
            started_at: None,
            duration_ms: 0,
            rows: None,
            upstream: Some(upstream),
            error: Some(ErrorSummary {
                kind: "workflow",
                code: ErrorCode::WORKFLOW_UPSTREAM_FAILED,
                message: format!("upstream stage '{}' did not succeed", upstream),
            }),
            failure: None,
        }
    }
}

/// Outcome of one pipeline run, in execution order
#[derive(Debug, Serialize)]
pub struct PipelineRun {
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stages: Vec<StageRecord>,
}

impl PipelineRun {
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(StageRecord::succeeded)
    }

    pub fn record(&self, stage: StageId) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn status(&self, stage: StageId) -> Option<StageStatus> {
        self.record(stage).map(|r| r.status)
    }

    /// The first stage that failed on its own, not by propagation
    pub fn first_failure(&self) -> Option<&StageRecord> {
        self.stages
            .iter()
            .find(|r| r.status == StageStatus::Failed)
    }

    /// Move the first stage error out of the report
    pub fn take_failure(&mut self) -> Option<PipelineError> {
        self.stages
            .iter_mut()
            .find(|r| r.status == StageStatus::Failed)
            .and_then(|r| r.failure.take())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).to_workflow_error(
            ErrorCode::WORKFLOW_GENERIC,
            "failed to render run report",
            None,
        )
    }
}
