//! Pipeline driver
//!
//! [`Orchestrator::run`] walks the [`StageGraph`] batch by batch. Stages of
//! one batch run as blocking tasks and are joined before the next batch
//! starts. A stage whose predecessor did not succeed is recorded as
//! upstream-failed and never executed. Outputs travel between stages
//! through the [`HandOff`] store.

pub mod graph;
pub mod handoff;
pub mod report;
pub mod retry;

pub use graph::{StageDeclaration, StageGraph, StageId, PIPELINE};
pub use handoff::HandOff;
pub use report::{ErrorSummary, PipelineRun, StageRecord, StageStatus};
pub use retry::{retry_async, BackoffStrategy, RetryConfig, RetryPolicy};

use crate::config::PipelineSettings;
use crate::error::{ErrorCode, ErrorExt, PipelineError, Result};
use crate::stages::{load_table, merge_tables, write_records};
use crate::table::Table;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What a stage produced
#[derive(Debug)]
pub enum StageOutput {
    /// A table for downstream stages
    Table(Table),
    /// Rows persisted to the output file
    Written { rows: usize },
}

impl StageOutput {
    pub fn rows(&self) -> usize {
        match self {
            StageOutput::Table(table) => table.len(),
            StageOutput::Written { rows } => *rows,
        }
    }
}

fn wrong_inputs(stage: StageId, expected: usize, got: usize) -> PipelineError {
    PipelineError::workflow(
        ErrorCode::WORKFLOW_MISSING_ARTIFACT,
        format!("stage '{}' expects {} inputs, got {}", stage, expected, got),
        Some(stage.to_string()),
    )
}

/// Run one stage once with its inputs in predecessor order
pub fn execute_stage(
    stage: StageId,
    settings: &PipelineSettings,
    inputs: &[Arc<Table>],
) -> Result<StageOutput> {
    match stage {
        StageId::ReadCsv1 | StageId::ReadCsv2 => {
            let path = if stage == StageId::ReadCsv1 {
                &settings.left
            } else {
                &settings.right
            };
            let table = load_table(path, &settings.csv)?;
            info!("{} read {} rows from {}", stage, table.len(), path.display());
            Ok(StageOutput::Table(table))
        }
        StageId::MergeCsvs => match inputs {
            [left, right] => {
                let merged = merge_tables(left, right, &settings.merge)?;
                info!(
                    "{} merged {} + {} rows into {}",
                    stage,
                    left.len(),
                    right.len(),
                    merged.len()
                );
                Ok(StageOutput::Table(merged))
            }
            _ => Err(wrong_inputs(stage, 2, inputs.len())),
        },
        StageId::ConvertToJson => match inputs {
            [merged] => {
                write_records(merged, &settings.output)?;
                info!(
                    "{} wrote {} records to {}",
                    stage,
                    merged.len(),
                    settings.output.display()
                );
                Ok(StageOutput::Written { rows: merged.len() })
            }
            _ => Err(wrong_inputs(stage, 1, inputs.len())),
        },
    }
}

/// Run a stage under its retry policy and record the outcome
async fn run_stage(
    stage: StageId,
    settings: Arc<PipelineSettings>,
    inputs: Vec<Arc<Table>>,
) -> (StageRecord, Option<Table>) {
    let policy = settings.retry.policy_for(stage).clone();
    let started_at = Utc::now();
    let clock = Instant::now();

    let outcome = retry_async(&policy, stage.as_str(), || {
        let settings = Arc::clone(&settings);
        let inputs = inputs.clone();
        async move {
            tokio::task::spawn_blocking(move || execute_stage(stage, &settings, &inputs))
                .await
                .to_workflow_error(
                    ErrorCode::WORKFLOW_TASK_PANICKED,
                    format!("stage '{}' task did not complete", stage),
                    Some(stage.to_string()),
                )?
        }
    })
    .await;

    let duration_ms = clock.elapsed().as_millis() as u64;
    match outcome.result {
        Ok(output) => {
            let record = StageRecord {
                stage,
                status: StageStatus::Success,
                attempts: outcome.attempts,
                started_at: Some(started_at),
                duration_ms,
                rows: Some(output.rows()),
                upstream: None,
                error: None,
                failure: None,
            };
            let table = match output {
                StageOutput::Table(table) => Some(table),
                StageOutput::Written { .. } => None,
            };
            (record, table)
        }
        Err(err) => {
            error!(
                "{} failed after {} attempt(s): {}",
                stage, outcome.attempts, err
            );
            let record =
                StageRecord::failed(stage, outcome.attempts, Some(started_at), duration_ms, err);
            (record, None)
        }
    }
}

pub struct Orchestrator {
    graph: StageGraph,
    settings: Arc<PipelineSettings>,
}

impl Orchestrator {
    pub fn new(settings: PipelineSettings) -> Result<Self> {
        Ok(Self {
            graph: StageGraph::pipeline()?,
            settings: Arc::new(settings),
        })
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The first predecessor of `stage` that has not succeeded
    fn blocked_by(&self, stage: StageId, records: &[StageRecord]) -> Option<StageId> {
        self.graph.predecessors(stage).iter().copied().find(|dep| {
            !records
                .iter()
                .any(|r| r.stage == *dep && r.succeeded())
        })
    }

    /// Run every stage once, in dependency order.
    ///
    /// Stage failures are recorded in the returned report rather than
    /// returned as errors.
    pub async fn run(&self) -> PipelineRun {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut handoff = HandOff::new();
        let mut records: Vec<StageRecord> = Vec::new();

        info!("Starting pipeline '{}'", self.settings.name);

        for batch in self.graph.batches() {
            let mut batch_records = Vec::with_capacity(batch.len());
            let mut ready = Vec::with_capacity(batch.len());

            for &stage in &batch {
                if let Some(upstream) = self.blocked_by(stage, &records) {
                    warn!("Skipping {}: upstream stage {} did not succeed", stage, upstream);
                    batch_records.push(StageRecord::upstream_failed(stage, upstream));
                    continue;
                }
                match handoff.get_all(self.graph.predecessors(stage)) {
                    Ok(inputs) => ready.push((stage, inputs)),
                    Err(err) => batch_records.push(StageRecord::failed(stage, 0, None, 0, err)),
                }
            }

            let finished = if self.settings.parallel {
                join_all(ready.into_iter().map(|(stage, inputs)| {
                    run_stage(stage, Arc::clone(&self.settings), inputs)
                }))
                .await
            } else {
                let mut finished = Vec::with_capacity(ready.len());
                for (stage, inputs) in ready {
                    finished.push(run_stage(stage, Arc::clone(&self.settings), inputs).await);
                }
                finished
            };

            for (record, table) in finished {
                if let Some(table) = table {
                    handoff.put(record.stage, table);
                }
                batch_records.push(record);
            }
            batch_records.sort_by_key(|r| batch.iter().position(|s| *s == r.stage));
            records.extend(batch_records);
        }

        debug!("{} stage output(s) handed off", handoff.len());

        let run = PipelineRun {
            pipeline: self.settings.name.clone(),
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            stages: records,
        };

        if run.succeeded() {
            info!(
                "Pipeline '{}' succeeded in {}ms",
                run.pipeline, run.duration_ms
            );
        } else if let Some(failed) = run.first_failure() {
            error!(
                "Pipeline '{}' failed at stage {} after {} attempt(s)",
                run.pipeline, failed.stage, failed.attempts
            );
        } else {
            error!("Pipeline '{}' failed", run.pipeline);
        }
        run
    }
}
