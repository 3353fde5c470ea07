//! Merge-back: rebuild cell records from dissolved polygons.
//!
//! Dissolve keeps one representative record per polygon, so per-cell detail is
//! lost. Here every dissolved polygon is intersected with the original cells it
//! covers and its attributes are recomputed from those overlaps:
//! - elevation and slope: means weighted by intersection area
//! - land use and outlet: mode, ties going to the first original cell
//! - area: sum of intersection areas; cell size and flow width follow from it

use std::collections::HashMap;

use crate::cell::{Cell, NO_FLOW};
use crate::config::MergeBackParams;
use crate::context::RunContext;
use crate::geometry;
use crate::relink::relink_outlets;
use crate::subcatchment::Subcatchment;

/// Output of [`merge_back`].
#[derive(Clone, Debug, Default)]
pub struct MergeBackResult {
    pub cells: Vec<Cell>,
    /// Original cell name -> merged cell that received its largest overlap
    pub ownership: HashMap<String, String>,
    /// Dissolved polygons dropped for covering no original cell
    pub skipped: usize,
}

/// One original cell overlapping a dissolved polygon.
struct Contribution<'a> {
    source: &'a Subcatchment,
    index: usize,
    area: f64,
}

/// Recompute cell attributes for every dissolved polygon.
///
/// Output names are `sc1`, `sc2`, … drawn from the run's id allocator. When
/// `params.relink_outlets` is set, outlets naming absorbed cells are rewritten
/// afterwards (see [`relink_outlets`]).
pub fn merge_back(
    dissolved: &[Subcatchment],
    original: &[Subcatchment],
    params: &MergeBackParams,
    ctx: &mut RunContext,
) -> MergeBackResult {
    let index = geometry::envelope_index(original.iter().map(|o| &o.geometry), 0.0);
    let mut cells = Vec::with_capacity(dissolved.len());
    let mut best: HashMap<usize, (f64, String)> = HashMap::new();
    let mut skipped = 0;

    for poly in dissolved {
        let contributions = overlaps(poly, original, &index, params.min_intersection_area);
        if contributions.is_empty() {
            ctx.diagnostics.warn(format!(
                "Dissolved polygon '{}' does not overlap any original cell; skipped",
                poly.name
            ));
            skipped += 1;
            continue;
        }

        let name = format!("sc{}", ctx.ids.next_id().seq + 1);
        let cell = aggregate(&name, poly, &contributions, params.width_ratio);
        for c in &contributions {
            let entry = best.entry(c.index).or_insert((0.0, String::new()));
            if c.area > entry.0 {
                *entry = (c.area, name.clone());
            }
        }
        cells.push(cell);
    }

    let ownership = best
        .into_iter()
        .map(|(i, (_, owner))| (original[i].name.clone(), owner))
        .collect();

    let mut result = MergeBackResult {
        cells,
        ownership,
        skipped,
    };
    if params.relink_outlets {
        let stats = relink_outlets(&mut result.cells, &result.ownership, original);
        log::info!(
            "Relinked {} outlets ({} cells became sinks)",
            stats.rewritten,
            stats.sinks
        );
    }
    log::info!(
        "Merge-back: {} dissolved polygons -> {} cells ({} skipped)",
        dissolved.len(),
        result.cells.len(),
        result.skipped
    );
    result
}

/// Original cells overlapping `poly` by more than `min_area`, in original order.
fn overlaps<'a>(
    poly: &Subcatchment,
    original: &'a [Subcatchment],
    index: &rstar::RTree<geometry::IndexedEnvelope>,
    min_area: f64,
) -> Vec<Contribution<'a>> {
    let Some(env) = geometry::envelope(&poly.geometry, 0.0) else {
        return Vec::new();
    };
    let mut candidates: Vec<usize> = index
        .locate_in_envelope_intersecting(&env)
        .map(|e| e.index)
        .collect();
    candidates.sort_unstable();

    candidates
        .into_iter()
        .filter_map(|i| {
            let area = geometry::intersection_area(&poly.geometry, &original[i].geometry);
            (area > min_area).then(|| Contribution {
                source: &original[i],
                index: i,
                area,
            })
        })
        .collect()
}

/// Most frequent value; ties go to the value seen first.
fn mode<T: Eq + std::hash::Hash>(values: impl IntoIterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (order, v) in values.into_iter().enumerate() {
        counts.entry(v).or_insert((0, order)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, oa)), (_, (cb, ob))| ca.cmp(cb).then(ob.cmp(oa)))
        .map(|(v, _)| v)
}

fn aggregate(name: &str, poly: &Subcatchment, parts: &[Contribution<'_>], width_ratio: f64) -> Cell {
    let area: f64 = parts.iter().map(|c| c.area).sum();
    let weighted = |f: fn(&Subcatchment) -> f64| parts.iter().map(|c| f(c.source) * c.area).sum::<f64>() / area;
    let elevation = weighted(|s| s.elevation);
    let slope = weighted(|s| s.slope);

    let landuse = mode(parts.iter().map(|c| c.source.landuse)).unwrap_or(poly.landuse);
    let outlet = mode(parts.iter().map(|c| c.source.outlet.as_str()))
        .unwrap_or(poly.outlet.as_str())
        .to_string();

    // Hydrologic parameters from the largest cell of the dominant class
    let params = parts
        .iter()
        .filter(|c| c.source.landuse == landuse)
        .fold(None::<&Contribution<'_>>, |acc, c| match acc {
            Some(a) if a.area >= c.area => Some(a),
            _ => Some(c),
        })
        .map(|c| c.source.params.clone())
        .unwrap_or_else(|| poly.params.clone());

    let routing = parts.iter().find(|c| c.source.outlet == outlet).map(|c| c.source);
    let (center_x, center_y) = geometry::centroid(&poly.geometry).unwrap_or_else(|| {
        let centers = parts
            .iter()
            .filter_map(|c| geometry::centroid(&c.source.geometry).map(|xy| (xy, c.area)));
        let (sx, sy) = centers.fold((0.0, 0.0), |(sx, sy), ((x, y), w)| (sx + x * w, sy + y * w));
        (sx / area, sy / area)
    });

    let mut cell = Cell {
        name: name.to_string(),
        center_x,
        center_y,
        elevation,
        flowdir: NO_FLOW,
        cell_size: area.sqrt(),
        slope,
        area,
        flow_width: width_ratio * area.sqrt(),
        landuse,
        params,
        ..Cell::default()
    };
    match routing {
        Some(src) => {
            cell.set_outlet(&outlet, src.outlet_id, src.outlet_coord);
            cell.is_sink = src.is_sink;
        }
        None => cell.clear_outlet(),
    }
    cell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subcatchment::tests::cell_poly;

    fn params() -> MergeBackParams {
        MergeBackParams {
            relink_outlets: false,
            ..MergeBackParams::default()
        }
    }

    fn dissolved(cx: f64, cy: f64, size: f64, landuse: i32, outlet: &str) -> Subcatchment {
        let mut p = cell_poly(0, 0, landuse, outlet);
        p.name = "d".into();
        p.geometry = geometry::square(cx, cy, size);
        p.area = size * size;
        p
    }

    #[test]
    fn test_attributes_from_covered_cells() {
        let mut a = cell_poly(0, 0, 30, "j1");
        a.elevation = 10.0;
        a.slope = 0.02;
        a.params.imperv = 80.0;
        let mut b = cell_poly(1, 0, 30, "j1");
        b.elevation = 20.0;
        b.slope = 0.04;
        let merged = dissolved(0.5, -1.0, 1.0, 30, "j1");
        // Polygon covers all of neither: half of each cell
        let mut ctx = RunContext::new();
        let out = merge_back(&[merged], &[a, b], &params(), &mut ctx);

        assert_eq!(out.cells.len(), 1);
        let c = &out.cells[0];
        assert_eq!(c.name, "sc1");
        assert!((c.area - 1.0).abs() < 1e-9);
        assert!((c.elevation - 15.0).abs() < 1e-9);
        assert!((c.slope - 0.03).abs() < 1e-9);
        assert!((c.cell_size - 1.0).abs() < 1e-9);
        assert!((c.flow_width - 0.7).abs() < 1e-9);
        assert_eq!(c.outlet, "j1");
        assert_eq!(c.landuse, 30);
        // Tie on overlap area keeps the first cell's parameters
        assert_eq!(c.params.imperv, 80.0);
        assert!((c.center_x - 0.5).abs() < 1e-9);
        assert!((c.center_y + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_use_intersection_area() {
        let mut a = cell_poly(0, 0, 30, "j1");
        a.elevation = 10.0;
        let mut b = cell_poly(0, 1, 30, "j1");
        b.elevation = 40.0;
        // All of a plus a quarter of b
        let mut merged = dissolved(0.5, -0.5, 1.0, 30, "j1");
        merged.geometry = geometry::union_all([&merged.geometry, &geometry::square(1.25, -0.5, 0.5)]);
        let mut ctx = RunContext::new();
        let out = merge_back(&[merged], &[a, b], &params(), &mut ctx);
        let c = &out.cells[0];
        assert!((c.area - 1.25).abs() < 1e-9);
        assert!((c.elevation - (10.0 * 1.0 + 40.0 * 0.25) / 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_mode_ties_go_to_first_cell() {
        let a = cell_poly(0, 0, 60, "j2");
        let mut b = cell_poly(0, 1, 30, "j1");
        b.outlet_id = 7;
        b.outlet_coord = (3.0, 4.0);
        let merged = dissolved(1.0, -0.5, 2.0, 30, "j1");
        let mut ctx = RunContext::new();
        let out = merge_back(&[merged], &[a, b], &params(), &mut ctx);
        let c = &out.cells[0];
        assert_eq!(c.landuse, 60);
        assert_eq!(c.outlet, "j2");
        assert_eq!(c.outlet_id, 0);
    }

    #[test]
    fn test_dominant_outlet_keeps_its_routing_target() {
        let a = cell_poly(0, 0, 30, "j2");
        let mut b = cell_poly(0, 1, 30, "j1");
        b.outlet_id = 7;
        b.outlet_coord = (3.0, 4.0);
        let mut c = cell_poly(0, 2, 30, "j1");
        c.outlet_id = 7;
        c.outlet_coord = (3.0, 4.0);
        let merged = dissolved(1.5, -0.5, 3.0, 30, "j1");
        let mut ctx = RunContext::new();
        let out = merge_back(&[merged], &[a, b, c], &params(), &mut ctx);
        let cell = &out.cells[0];
        assert_eq!(cell.outlet, "j1");
        assert_eq!(cell.outlet_id, 7);
        assert_eq!(cell.outlet_coord, (3.0, 4.0));
        assert!((cell.area - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_polygon_without_overlap_is_skipped() {
        let a = cell_poly(0, 0, 30, "j1");
        let far = dissolved(50.0, 50.0, 1.0, 30, "j1");
        let near = dissolved(0.5, -0.5, 1.0, 30, "j1");
        let mut ctx = RunContext::new();
        let out = merge_back(&[far, near], &[a], &params(), &mut ctx);
        assert_eq!(out.cells.len(), 1);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.cells[0].name, "sc1");
        assert_eq!(ctx.diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_ownership_follows_largest_overlap() {
        let a = cell_poly(0, 0, 30, "j1");
        let b = cell_poly(0, 1, 30, "j1");
        // First polygon takes three quarters of a and a quarter of b
        let first = dissolved(0.75, -0.5, 1.0, 30, "j1");
        let second = dissolved(1.75, -0.5, 1.0, 30, "j1");
        let mut ctx = RunContext::new();
        let out = merge_back(&[first, second], &[a, b], &params(), &mut ctx);
        assert_eq!(out.cells.len(), 2);
        assert_eq!(out.ownership["s0_0"], "sc1");
        assert_eq!(out.ownership["s0_1"], "sc2");
    }

    #[test]
    fn test_mode_helper() {
        assert_eq!(mode(vec![3, 1, 1, 3]), Some(3));
        assert_eq!(mode(vec![2, 1, 1]), Some(1));
        assert_eq!(mode(Vec::<i32>::new()), None);
    }
}
