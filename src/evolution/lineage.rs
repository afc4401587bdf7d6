//! Lineage log: an append-only record of parent/child edges, written to
//! `lineage.jsonl` by the artifact writer (spec §6).

use serde::{Deserialize, Serialize};

use crate::graph::GraphId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEdge {
    pub parent: GraphId,
    pub child: GraphId,
    pub generation: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LineageLog {
    pub edges: Vec<LineageEdge>,
}

impl LineageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, parent: GraphId, child: GraphId, generation: u32) {
        self.edges.push(LineageEdge { parent, child, generation });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_edges_in_append_order() {
        let mut log = LineageLog::new();
        let a = GraphId::new();
        let b = GraphId::new();
        log.record(a, b, 1);
        assert_eq!(log.edges.len(), 1);
        assert_eq!(log.edges[0].parent, a);
        assert_eq!(log.edges[0].child, b);
    }
}
