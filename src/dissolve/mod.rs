//! Adaptive dissolve of fine subcatchments into coarser ones.
//!
//! Two interchangeable strategies:
//! - **Flow graph** ([`topological`]): one pass over the drainage graph from the
//!   outlets upward, absorbing upstream polygons of the same class
//! - **Tiled** ([`tiled`]): iterative neighbour dissolve inside spatial tiles run
//!   in parallel, followed by a global reconciliation pass
//!
//! Both lose the identity of the fine cells; merge-back recovers per-cell
//! attributes afterwards.

pub mod tiled;
pub mod topological;

pub use tiled::{dissolve_tiled, partition_tiles, ConvergenceTracker, Tile};
pub use topological::dissolve_flow_graph;

use std::collections::HashMap;

use crate::config::{DissolveParams, DissolveStrategy};
use crate::context::RunContext;
use crate::error::Result;
use crate::flow_graph::FlowGraph;
use crate::geometry;
use crate::subcatchment::Subcatchment;
use crate::tables::FlowEdge;

/// Result of a dissolve run
#[derive(Clone, Debug)]
pub struct DissolveOutput {
    pub polygons: Vec<Subcatchment>,
    pub strategy: DissolveStrategy,
    /// Input count minus output count
    pub merges: usize,
    /// Tiles processed (1 for the flow-graph strategy)
    pub tiles: usize,
    /// Largest iteration count any tile needed (0 for the flow-graph strategy)
    pub iterations: usize,
}

impl DissolveOutput {
    pub fn total_area(&self) -> f64 {
        self.polygons.iter().map(|p| p.area).sum()
    }
}

/// Run the configured dissolve strategy.
///
/// `edges` is only used by the flow-graph strategy; without it the graph is
/// derived from each polygon's outlet.
pub fn dissolve(
    polys: &[Subcatchment],
    edges: Option<&[FlowEdge]>,
    params: &DissolveParams,
    ctx: &mut RunContext,
) -> Result<DissolveOutput> {
    let output = match params.strategy {
        DissolveStrategy::FlowGraph => {
            let graph = match edges {
                Some(edges) => FlowGraph::from_edges(edges),
                None => FlowGraph::from_subcatchments(polys),
            };
            dissolve_flow_graph(polys, &graph)?
        }
        DissolveStrategy::Tiled => dissolve_tiled(polys, params)?,
    };

    ctx.diagnostics.info(format!(
        "Dissolve ({}): {} polygons -> {} ({} merges, {} tiles)",
        output.strategy,
        polys.len(),
        output.polygons.len(),
        output.merges,
        output.tiles
    ));
    Ok(output)
}

/// How attribute values are combined when a group is dissolved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    /// Plain mean of elevation and slope
    Mean,
    /// Area-weighted mean of elevation and slope
    AreaWeighted,
}

/// Group records by `key` and dissolve each group into one polygon.
///
/// Groups come out in order of first appearance. Each keeps the first
/// record's identity; area is summed and geometry unioned.
pub fn dissolve_by<K, F>(records: Vec<Subcatchment>, key: F, aggregation: Aggregation) -> Vec<Subcatchment>
where
    K: std::hash::Hash + Eq,
    F: Fn(&Subcatchment) -> K,
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<Subcatchment>> = Vec::new();
    for record in records {
        let k = key(&record);
        match slots.get(&k) {
            Some(&slot) => groups[slot].push(record),
            None => {
                slots.insert(k, groups.len());
                groups.push(vec![record]);
            }
        }
    }
    groups
        .into_iter()
        .map(|group| combine_group(group, aggregation))
        .collect()
}

fn combine_group(mut group: Vec<Subcatchment>, aggregation: Aggregation) -> Subcatchment {
    if group.len() == 1 {
        return group.swap_remove(0);
    }
    let n = group.len() as f64;
    let area: f64 = group.iter().map(|r| r.area).sum();
    let (elevation, slope) = match aggregation {
        Aggregation::Mean => (
            group.iter().map(|r| r.elevation).sum::<f64>() / n,
            group.iter().map(|r| r.slope).sum::<f64>() / n,
        ),
        Aggregation::AreaWeighted if area > 0.0 => (
            group.iter().map(|r| r.elevation * r.area).sum::<f64>() / area,
            group.iter().map(|r| r.slope * r.area).sum::<f64>() / area,
        ),
        Aggregation::AreaWeighted => (
            group.iter().map(|r| r.elevation).sum::<f64>() / n,
            group.iter().map(|r| r.slope).sum::<f64>() / n,
        ),
    };
    let geometry = geometry::union_all(group.iter().map(|r| &r.geometry));
    let first = group.swap_remove(0);
    Subcatchment {
        area,
        elevation,
        slope,
        geometry,
        ..first
    }
}
