//! Result rows emitted by run handlers.

use serde::{Deserialize, Serialize};

use crate::value::StateMap;

/// One per-timestep, per-substep snapshot.
///
/// Identifiers are filled in by the run handler; the dispatcher never reads
/// or rewrites them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Experiment identifier.
    #[serde(default)]
    pub experiment: u32,
    /// Simulation identifier.
    pub simulation: u32,
    /// Parameter subset identifier.
    #[serde(default)]
    pub subset: u32,
    /// Run index.
    pub run: u32,
    /// Substep within the timestep; 0 for the genesis row.
    pub substep: u32,
    /// Timestep.
    pub timestep: u64,
    /// State variables after this substep.
    pub state: StateMap,
}

/// Arbitrarily nested result rows.
///
/// Serialized untagged: a row is a JSON object, a group a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultTree {
    /// A single row.
    Row(ResultRow),
    /// Ordered children.
    Group(Vec<ResultTree>),
}

impl ResultTree {
    /// An empty group.
    #[must_use]
    pub const fn empty() -> Self {
        Self::Group(Vec::new())
    }

    /// Number of leaf rows in the tree.
    #[must_use]
    pub fn row_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Self::Row(_) => count += 1,
                Self::Group(children) => stack.extend(children.iter()),
            }
        }
        count
    }
}

impl From<ResultRow> for ResultTree {
    fn from(row: ResultRow) -> Self {
        Self::Row(row)
    }
}

impl From<Vec<ResultRow>> for ResultTree {
    fn from(rows: Vec<ResultRow>) -> Self {
        Self::Group(rows.into_iter().map(Self::Row).collect())
    }
}

impl From<Vec<ResultTree>> for ResultTree {
    fn from(children: Vec<ResultTree>) -> Self {
        Self::Group(children)
    }
}
