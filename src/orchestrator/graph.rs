//! Static stage graph
//!
//! The pipeline's four stages and their predecessors are declared once in
//! [`PIPELINE`]. [`StageGraph`] validates a declaration list (unknown
//! predecessors, duplicates, cycles) and derives the execution batches.

use crate::error::{ErrorCode, PipelineError, Result};
use petgraph::algo::toposort;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageId {
    #[serde(rename = "read_csv_1")]
    ReadCsv1,
    #[serde(rename = "read_csv_2")]
    ReadCsv2,
    #[serde(rename = "merge_csvs")]
    MergeCsvs,
    #[serde(rename = "convert_to_json")]
    ConvertToJson,
}

impl StageId {
    pub const ALL: [StageId; 4] = [
        StageId::ReadCsv1,
        StageId::ReadCsv2,
        StageId::MergeCsvs,
        StageId::ConvertToJson,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::ReadCsv1 => "read_csv_1",
            StageId::ReadCsv2 => "read_csv_2",
            StageId::MergeCsvs => "merge_csvs",
            StageId::ConvertToJson => "convert_to_json",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        StageId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| {
                PipelineError::workflow(
                    ErrorCode::WORKFLOW_UNKNOWN_STAGE,
                    format!("unknown stage '{}'", s),
                    Some(s.to_string()),
                )
            })
    }
}

/// A stage and the stages whose output it consumes, in input order
#[derive(Debug, Clone, Copy)]
pub struct StageDeclaration {
    pub id: StageId,
    pub depends_on: &'static [StageId],
}

/// read_csv_1, read_csv_2 >> merge_csvs >> convert_to_json
pub const PIPELINE: [StageDeclaration; 4] = [
    StageDeclaration {
        id: StageId::ReadCsv1,
        depends_on: &[],
    },
    StageDeclaration {
        id: StageId::ReadCsv2,
        depends_on: &[],
    },
    StageDeclaration {
        id: StageId::MergeCsvs,
        depends_on: &[StageId::ReadCsv1, StageId::ReadCsv2],
    },
    StageDeclaration {
        id: StageId::ConvertToJson,
        depends_on: &[StageId::MergeCsvs],
    },
];

#[derive(Debug, Clone)]
pub struct StageGraph {
    /// Edge weight is the input slot the predecessor feeds
    graph: DiGraph<StageId, usize>,
    nodes: HashMap<StageId, NodeIndex>,
    declarations: Vec<StageDeclaration>,
}

impl StageGraph {
    /// The graph of the merge pipeline
    pub fn pipeline() -> Result<Self> {
        Self::from_declarations(&PIPELINE)
    }

    pub fn from_declarations(declarations: &[StageDeclaration]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        for decl in declarations {
            if nodes.contains_key(&decl.id) {
                return Err(PipelineError::workflow(
                    ErrorCode::WORKFLOW_GENERIC,
                    format!("stage '{}' declared twice", decl.id),
                    Some(decl.id.to_string()),
                ));
            }
            nodes.insert(decl.id, graph.add_node(decl.id));
        }

        for decl in declarations {
            for (slot, dep) in decl.depends_on.iter().enumerate() {
                let from = nodes.get(dep).ok_or_else(|| {
                    PipelineError::workflow(
                        ErrorCode::WORKFLOW_UNKNOWN_STAGE,
                        format!("stage '{}' depends on undeclared stage '{}'", decl.id, dep),
                        Some(decl.id.to_string()),
                    )
                })?;
                graph.add_edge(*from, nodes[&decl.id], slot);
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            let stage = graph[cycle.node_id()];
            return Err(PipelineError::workflow(
                ErrorCode::WORKFLOW_CIRCULAR_DEPENDENCY,
                format!("stage '{}' is part of a dependency cycle", stage),
                Some(stage.to_string()),
            ));
        }

        Ok(Self {
            graph,
            nodes,
            declarations: declarations.to_vec(),
        })
    }

    /// Declared predecessors of `stage`, in declaration order
    pub fn predecessors(&self, stage: StageId) -> &[StageId] {
        self.declarations
            .iter()
            .find(|d| d.id == stage)
            .map(|d| d.depends_on)
            .unwrap_or(&[])
    }

    /// Stages that consume `stage`'s output directly
    pub fn downstream(&self, stage: StageId) -> Vec<StageId> {
        let Some(&node) = self.nodes.get(&stage) else {
            return Vec::new();
        };
        let mut successors: Vec<StageId> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect();
        successors.sort();
        successors
    }

    /// Groups of stages that may run together.
    ///
    /// Every stage's predecessors sit in earlier batches; within a batch
    /// stages keep declaration order.
    pub fn batches(&self) -> Vec<Vec<StageId>> {
        let mut done: HashSet<StageId> = HashSet::new();
        let mut batches = Vec::new();

        while done.len() < self.declarations.len() {
            let ready: Vec<StageId> = self
                .declarations
                .iter()
                .filter(|d| !done.contains(&d.id))
                .filter(|d| d.depends_on.iter().all(|dep| done.contains(dep)))
                .map(|d| d.id)
                .collect();
            // construction rejected cycles, so some stage is always ready
            if ready.is_empty() {
                break;
            }
            done.extend(ready.iter().copied());
            batches.push(ready);
        }

        batches
    }

    /// All stages in execution order
    pub fn stages(&self) -> Vec<StageId> {
        self.batches().into_iter().flatten().collect()
    }

    /// Graphviz rendering; edges are labelled with the input slot they feed
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }
}
