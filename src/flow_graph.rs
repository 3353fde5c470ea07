//! Directed drainage graph between named subcatchments and network nodes.
//!
//! An edge A -> B means A drains into B. The flow-graph dissolve walks this
//! graph from the outlets upward, so it must be acyclic.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{Error, Result};
use crate::subcatchment::Subcatchment;
use crate::tables::FlowEdge;

#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph from explicit edges.
    pub fn from_edges(edges: &[FlowEdge]) -> Self {
        let mut g = Self::new();
        for edge in edges {
            g.add_edge(&edge.from, &edge.to);
        }
        g
    }

    /// Graph whose edges are each routed polygon's `name -> outlet`.
    pub fn from_subcatchments(polys: &[Subcatchment]) -> Self {
        let mut g = Self::new();
        for p in polys {
            g.add_node(&p.name);
            if p.is_routed() {
                g.add_edge(&p.name, &p.outlet);
            }
        }
        g
    }

    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        let a = self.add_node(from);
        let b = self.add_node(to);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Names ordered so that every node comes after all nodes it drains into
    /// (outlets first, sources last).
    pub fn reverse_topological_order(&self) -> Result<Vec<String>> {
        let order = toposort(&self.graph, None).map_err(|cycle| Error::CyclicFlowGraph {
            node: self.graph[cycle.node_id()].clone(),
        })?;
        Ok(order
            .into_iter()
            .rev()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Nodes that drain directly into `name`, sorted by name.
    pub fn predecessors(&self, name: &str) -> Vec<String> {
        let Some(&idx) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut preds: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|p| self.graph[p].clone())
            .collect();
        preds.sort();
        preds
    }

    /// Nodes `name` drains into, sorted by name.
    pub fn successors(&self, name: &str) -> Vec<String> {
        let Some(&idx) = self.nodes.get(name) else {
            return Vec::new();
        };
        let mut succ: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|p| self.graph[p].clone())
            .collect();
        succ.sort();
        succ
    }
}
