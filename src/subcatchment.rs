//! Polygon records exchanged with the dissolve engine.

use geo::MultiPolygon;

use crate::cell::{Cell, HydroParams, SinkKind, UNROUTED, UNROUTED_ID};
use crate::geometry;
use crate::landuse;

/// A subcatchment polygon with its routing and classification attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Subcatchment {
    pub name: String,
    pub flowzone: i32,
    pub landuse: i32,
    pub outlet: String,
    pub outlet_id: i64,
    pub outlet_coord: (f64, f64),
    pub is_sink: SinkKind,
    pub area: f64,
    pub elevation: f64,
    /// Fractional slope
    pub slope: f64,
    pub params: HydroParams,
    pub geometry: MultiPolygon<f64>,
}

/// Attributes two polygons must share to be merged.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DissolveKey {
    pub flowzone: i32,
    pub landuse: i32,
    pub outlet: String,
}

impl Subcatchment {
    /// Square footprint of a grid cell.
    pub fn from_cell(cell: &Cell, flowzone_threshold: i32) -> Self {
        Self {
            name: cell.name.clone(),
            flowzone: landuse::flowzone(cell.landuse, flowzone_threshold),
            landuse: cell.landuse,
            outlet: cell.outlet.clone(),
            outlet_id: cell.outlet_id,
            outlet_coord: cell.outlet_coord,
            is_sink: cell.is_sink,
            area: cell.area,
            elevation: cell.elevation,
            slope: cell.slope,
            params: cell.params.clone(),
            geometry: geometry::square(cell.center_x, cell.center_y, cell.cell_size),
        }
    }

    /// Full-key used by the tiled dissolve and its reconciliation pass.
    pub fn dissolve_key(&self) -> DissolveKey {
        DissolveKey {
            flowzone: self.flowzone,
            landuse: self.landuse,
            outlet: self.outlet.clone(),
        }
    }

    /// `(landuse, outlet)` equality, the merge condition shared by every strategy.
    pub fn same_class(&self, other: &Subcatchment) -> bool {
        self.landuse == other.landuse && self.outlet == other.outlet
    }

    pub fn is_routed(&self) -> bool {
        self.outlet != UNROUTED
    }

    pub fn unrouted(name: &str, landuse: i32, geometry: MultiPolygon<f64>) -> Self {
        let area = geometry::area(&geometry);
        Self {
            name: name.to_string(),
            flowzone: landuse::FLOWZONE_HIGH,
            landuse,
            outlet: UNROUTED.to_string(),
            outlet_id: UNROUTED_ID,
            outlet_coord: (0.0, 0.0),
            is_sink: SinkKind::Routed,
            area,
            elevation: 0.0,
            slope: 0.0,
            params: HydroParams::default(),
            geometry,
        }
    }
}

/// Combine `b` into `a`: `a` keeps its identity, area adds up, elevation and
/// slope are area-weighted, geometry is the union.
///
/// Callers are responsible for checking [`Subcatchment::same_class`] (or their
/// own merge condition) first.
pub fn merge_pair(a: &Subcatchment, b: &Subcatchment) -> Subcatchment {
    let total = a.area + b.area;
    let blend = |va: f64, vb: f64| {
        if total > 0.0 {
            (va * a.area + vb * b.area) / total
        } else {
            0.5 * (va + vb)
        }
    };
    Subcatchment {
        area: total,
        elevation: blend(a.elevation, b.elevation),
        slope: blend(a.slope, b.slope),
        geometry: geometry::union_all([&a.geometry, &b.geometry]),
        ..a.clone()
    }
}

/// Convert every cell of a grid into polygons, skipping unclassified cells.
pub fn from_cells(cells: &[Cell], flowzone_threshold: i32) -> Vec<Subcatchment> {
    cells
        .iter()
        .filter(|c| landuse::is_classified(c.landuse))
        .map(|c| Subcatchment::from_cell(c, flowzone_threshold))
        .collect()
}
