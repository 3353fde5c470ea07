//! Flow-graph dissolve.
//!
//! Walks the drainage graph from the outlets upward. Each polygon not yet
//! absorbed becomes an aggregate and pulls in every upstream polygon that
//! - has the same land use, and
//! - either shares the aggregate's outlet or drains into the aggregate itself
//!
//! Absorption is transitive: a polygon pulled in exposes its own upstream
//! neighbours to the same test. Aggregates are then grouped by
//! `(outlet, landuse)` so polygons draining to the same place end up together
//! even when they are not connected in the graph.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{dissolve_by, Aggregation, DissolveOutput};
use crate::config::DissolveStrategy;
use crate::error::Result;
use crate::flow_graph::FlowGraph;
use crate::subcatchment::{merge_pair, Subcatchment};

/// Dissolve `polys` along `graph`.
///
/// Polygons absent from the graph are still processed as isolated nodes.
/// Fails with [`crate::Error::CyclicFlowGraph`] before merging anything if
/// the graph has a cycle.
pub fn dissolve_flow_graph(polys: &[Subcatchment], graph: &FlowGraph) -> Result<DissolveOutput> {
    let mut graph = graph.clone();
    for p in polys {
        graph.add_node(&p.name);
    }
    let order = graph.reverse_topological_order()?;

    let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(polys.len());
    for (i, p) in polys.iter().enumerate() {
        by_name.entry(p.name.as_str()).or_insert(i);
    }

    let mut consumed: HashSet<usize> = HashSet::with_capacity(polys.len());
    let mut aggregates: Vec<Subcatchment> = Vec::new();

    for node in &order {
        let Some(&idx) = by_name.get(node.as_str()) else {
            continue;
        };
        if !consumed.insert(idx) {
            continue;
        }

        let mut current = polys[idx].clone();
        let mut frontier: VecDeque<String> = VecDeque::from([node.clone()]);
        while let Some(member) = frontier.pop_front() {
            for up in graph.predecessors(&member) {
                let Some(&ui) = by_name.get(up.as_str()) else {
                    continue;
                };
                if consumed.contains(&ui) {
                    continue;
                }
                let upstream = &polys[ui];
                let joins = upstream.landuse == current.landuse
                    && (upstream.outlet == current.outlet || upstream.outlet == member);
                if joins {
                    current = merge_pair(&current, upstream);
                    consumed.insert(ui);
                    frontier.push_back(up);
                }
            }
        }
        aggregates.push(current);
    }

    let polygons = dissolve_by(
        aggregates,
        |r| (r.outlet.clone(), r.landuse),
        Aggregation::Mean,
    );
    let merges = polys.len().saturating_sub(polygons.len());
    Ok(DissolveOutput {
        polygons,
        strategy: DissolveStrategy::FlowGraph,
        merges,
        tiles: 1,
        iterations: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::subcatchment::tests::cell_poly;
    use crate::tables::FlowEdge;

    fn total_area(polys: &[Subcatchment]) -> f64 {
        polys.iter().map(|p| p.area).sum()
    }

    /// 3x3 block where every outer cell drains into the centre.
    fn converging_block() -> Vec<Subcatchment> {
        let mut polys = Vec::new();
        for r in 0..3 {
            for c in 0..3 {
                let outlet = if (r, c) == (1, 1) { "*" } else { "s1_1" };
                polys.push(cell_poly(r, c, 30, outlet));
            }
        }
        polys
    }

    #[test]
    fn test_converging_block_collapses_to_one() {
        let polys = converging_block();
        let out = dissolve_flow_graph(&polys, &FlowGraph::from_subcatchments(&polys)).unwrap();
        assert_eq!(out.polygons.len(), 1);
        assert_eq!(out.polygons[0].name, "s1_1");
        assert!((out.polygons[0].area - 9.0).abs() < 1e-9);
        assert_eq!(out.merges, 8);
        assert!((crate::geometry::area(&out.polygons[0].geometry) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_absorption_is_transitive() {
        // s0_0 -> s0_1 -> s0_2 -> j1, all the same land use
        let polys = vec![
            cell_poly(0, 0, 30, "s0_1"),
            cell_poly(0, 1, 30, "s0_2"),
            cell_poly(0, 2, 30, "j1"),
        ];
        let out = dissolve_flow_graph(&polys, &FlowGraph::from_subcatchments(&polys)).unwrap();
        assert_eq!(out.polygons.len(), 1);
        assert_eq!(out.polygons[0].name, "s0_2");
        assert_eq!(out.polygons[0].outlet, "j1");
    }

    #[test]
    fn test_land_use_boundary_stops_absorption() {
        let polys = vec![
            cell_poly(0, 0, 60, "s0_1"),
            cell_poly(0, 1, 30, "j1"),
        ];
        let out = dissolve_flow_graph(&polys, &FlowGraph::from_subcatchments(&polys)).unwrap();
        assert_eq!(out.polygons.len(), 2);
        assert!((total_area(&out.polygons) - 2.0).abs() < 1e-9);
        assert_eq!(out.merges, 0);
    }

    #[test]
    fn test_cycle_is_fatal() {
        let polys = vec![cell_poly(0, 0, 30, "s0_1"), cell_poly(0, 1, 30, "s0_0")];
        let result = dissolve_flow_graph(&polys, &FlowGraph::from_subcatchments(&polys));
        assert!(matches!(result, Err(Error::CyclicFlowGraph { .. })));
    }

    #[test]
    fn test_isolated_polygons_survive_explicit_graph() {
        let polys = vec![
            cell_poly(0, 0, 30, "s0_1"),
            cell_poly(0, 1, 30, "j1"),
            cell_poly(5, 5, 60, "*"),
        ];
        let graph = FlowGraph::from_edges(&[FlowEdge::new("s0_0", "s0_1")]);
        let out = dissolve_flow_graph(&polys, &graph).unwrap();
        assert_eq!(out.polygons.len(), 2);
        assert!(out.polygons.iter().any(|p| p.name == "s5_5"));
        assert!((total_area(&out.polygons) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_branching_tree_counts_each_polygon_once() {
        // Two branches converging on s1_1, one branch reachable twice via explicit edges
        let polys = vec![
            cell_poly(0, 0, 30, "s1_1"),
            cell_poly(0, 1, 30, "s1_1"),
            cell_poly(1, 0, 30, "s0_0"),
            cell_poly(1, 1, 30, "j1"),
        ];
        let graph = FlowGraph::from_edges(&[
            FlowEdge::new("s0_0", "s1_1"),
            FlowEdge::new("s0_1", "s1_1"),
            FlowEdge::new("s1_0", "s0_0"),
            FlowEdge::new("s1_0", "s0_1"),
            FlowEdge::new("s1_1", "j1"),
        ]);
        let out = dissolve_flow_graph(&polys, &graph).unwrap();
        assert_eq!(out.polygons.len(), 1);
        assert!((out.polygons[0].area - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_rerun_is_stable() {
        let polys = converging_block();
        let first = dissolve_flow_graph(&polys, &FlowGraph::from_subcatchments(&polys)).unwrap();
        let second =
            dissolve_flow_graph(&first.polygons, &FlowGraph::from_subcatchments(&first.polygons)).unwrap();
        assert_eq!(second.polygons.len(), first.polygons.len());
        assert_eq!(second.merges, 0);
        assert!((total_area(&second.polygons) - total_area(&first.polygons)).abs() < 1e-9);
    }
}
