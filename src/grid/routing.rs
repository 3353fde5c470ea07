//! Outlet resolution for grid cells.
//!
//! Two routing modes:
//! 1. Flow-direction codes (1..=8) pointing at a built-up neighbour
//! 2. Nearest open junction, through an R-tree over junction points
//!
//! Cells without land use or without elevation are never routed.

use rstar::primitives::GeomWithData;
use rstar::RTree;

use super::Grid;
use crate::cell::{direction_slot, SinkKind};
use crate::context::Diagnostics;
use crate::landuse;
use crate::tables::Junction;

/// Which cells junction routing touches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JunctionRouting {
    /// Every classified cell, replacing earlier routing
    #[default]
    All,
    /// Only classified cells still unrouted after flow-direction routing
    UnroutedOnly,
}

/// Summary of one routing pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoutingStats {
    pub routed: usize,
    pub sinks: usize,
    pub unrouted: usize,
    pub skipped: usize,
}

type JunctionPoint = GeomWithData<[f64; 2], usize>;

impl Grid {
    /// Route each classified cell along its flow-direction code.
    ///
    /// The target must be inside the grid and have a land-use code at or above
    /// the built-area threshold; otherwise the cell stays unrouted. A no-flow
    /// code marks the cell as a sink.
    pub fn route_by_flowdir(&mut self) -> RoutingStats {
        let mut stats = RoutingStats::default();
        let threshold = self.params.built_area_threshold;

        for row in 0..self.nrows {
            for col in 0..self.ncols {
                let cell = self.cell(row, col);
                if !landuse::is_classified(cell.landuse) || !cell.has_elevation() {
                    stats.skipped += 1;
                    continue;
                }

                let Some(slot) = direction_slot(cell.flowdir) else {
                    self.cell_mut(row, col).is_sink = SinkKind::Sink;
                    stats.sinks += 1;
                    continue;
                };

                let target = self
                    .neighbor_position(row, col, slot)
                    .map(|(r2, c2)| (r2, c2, self.cell(r2, c2)))
                    .filter(|(_, _, n)| n.landuse >= threshold)
                    .map(|(r2, c2, n)| (n.name.clone(), self.linear_index(r2, c2), (n.center_x, n.center_y)));

                match target {
                    Some((name, idx, coord)) => {
                        let cell = self.cell_mut(row, col);
                        cell.set_outlet(&name, idx as i64, coord);
                        cell.is_sink = SinkKind::Routed;
                        let dist = cell.neighbor_distances[slot];
                        if dist > 0.0 {
                            cell.flow_width = cell.area / dist;
                        }
                        stats.routed += 1;
                    }
                    None => stats.unrouted += 1,
                }
            }
        }

        log::info!(
            "Flow-direction routing: {} routed, {} sinks, {} unrouted, {} skipped",
            stats.routed,
            stats.sinks,
            stats.unrouted,
            stats.skipped
        );
        stats
    }

    /// Route classified cells to their nearest open junction.
    ///
    /// Equidistant junctions resolve to the one listed first. `outlet_id` is the
    /// junction's index in `junctions`. Connected roofs are marked as forced
    /// connections.
    pub fn route_to_junctions(
        &mut self,
        junctions: &[Junction],
        mode: JunctionRouting,
        diagnostics: &mut Diagnostics,
    ) -> RoutingStats {
        let mut stats = RoutingStats::default();

        let points: Vec<JunctionPoint> = junctions
            .iter()
            .enumerate()
            .filter(|(_, j)| j.is_open)
            .map(|(i, j)| GeomWithData::new([j.x, j.y], i))
            .collect();
        if points.is_empty() {
            diagnostics.warn("No open junctions available; junction routing skipped");
            return stats;
        }
        let tree = RTree::bulk_load(points);

        for row in 0..self.nrows {
            for col in 0..self.ncols {
                let cell = self.cell(row, col);
                if !landuse::is_classified(cell.landuse) {
                    stats.skipped += 1;
                    continue;
                }
                if mode == JunctionRouting::UnroutedOnly && cell.is_routed() {
                    continue;
                }

                let Some(idx) = nearest_junction(&tree, [cell.center_x, cell.center_y]) else {
                    stats.unrouted += 1;
                    continue;
                };
                let junction = &junctions[idx];
                let cell = self.cell_mut(row, col);
                cell.set_outlet(&junction.name, idx as i64, (junction.x, junction.y));
                cell.is_sink = if cell.landuse == landuse::ROOF_CONNECTED {
                    SinkKind::Forced
                } else {
                    SinkKind::Routed
                };
                stats.routed += 1;
            }
        }

        log::info!(
            "Junction routing ({:?}): {} cells routed to {} open junctions",
            mode,
            stats.routed,
            tree.size()
        );
        stats
    }
}

/// Index of the closest junction; ties go to the lowest index.
fn nearest_junction(tree: &RTree<JunctionPoint>, query: [f64; 2]) -> Option<usize> {
    let dist2 = |p: &[f64; 2]| (p[0] - query[0]).powi(2) + (p[1] - query[1]).powi(2);

    let mut best: Option<(f64, usize)> = None;
    for candidate in tree.nearest_neighbor_iter(&query) {
        let d = dist2(candidate.geom());
        match best {
            None => best = Some((d, candidate.data)),
            Some((best_d, best_idx)) => {
                if d > best_d {
                    break;
                }
                if candidate.data < best_idx {
                    best = Some((best_d, candidate.data));
                }
            }
        }
    }
    best.map(|(_, idx)| idx)
}
