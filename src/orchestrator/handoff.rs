//! Hand-off store between stages
//!
//! Each successful stage that produces a table puts it here under its own
//! stage id; downstream stages get it by the same id. Tables are shared as
//! immutable snapshots.

use super::graph::StageId;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::table::Table;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct HandOff {
    tables: HashMap<StageId, Arc<Table>>,
}

impl HandOff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `table` as the output of `stage`, replacing any earlier output
    pub fn put(&mut self, stage: StageId, table: Table) -> Arc<Table> {
        let table = Arc::new(table);
        self.tables.insert(stage, Arc::clone(&table));
        table
    }

    pub fn get(&self, stage: StageId) -> Result<Arc<Table>> {
        self.tables.get(&stage).cloned().ok_or_else(|| {
            PipelineError::workflow(
                ErrorCode::WORKFLOW_MISSING_ARTIFACT,
                format!("no output recorded for stage '{}'", stage),
                Some(stage.to_string()),
            )
        })
    }

    /// Outputs of `stages`, in the given order
    pub fn get_all(&self, stages: &[StageId]) -> Result<Vec<Arc<Table>>> {
        stages.iter().map(|s| self.get(*s)).collect()
    }

    /// Number of stage outputs held
    pub(crate) fn len(&self) -> usize {
        self.tables.len()
    }
}
