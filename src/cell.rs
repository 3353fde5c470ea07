//! The drainage cell record.
//!
//! A cell is either one raster pixel or, after merge-back, one dissolved
//! subcatchment. Routing state is kept in the `outlet*` fields; the sentinel
//! outlet `"*"` (with id −1) means the cell is not routed anywhere.

use serde::{Deserialize, Serialize};

/// Outlet name of an unrouted cell.
pub const UNROUTED: &str = "*";
/// Outlet id of an unrouted cell.
pub const UNROUTED_ID: i64 = -1;

/// Compass offsets as (row, col) deltas. Slot *i* of every neighbour array
/// refers to `NEIGHBOR_OFFSETS[i]`, and flow-direction code *c* (1..=8) points
/// along `NEIGHBOR_OFFSETS[c - 1]`.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, 1),  // NE
    (-1, 0),  // N
    (-1, -1), // NW
    (0, -1),  // W
    (1, -1),  // SW
    (1, 0),   // S
    (1, 1),   // SE
    (0, 1),   // E
];

pub const NEIGHBOR_NAMES: [&str; 8] = ["NE", "N", "NW", "W", "SW", "S", "SE", "E"];

/// Flow-direction value for "no flow" / no-data.
pub const NO_FLOW: i32 = -1;

/// Offset slot of a flow-direction code, or None for anything outside 1..=8.
pub fn direction_slot(flowdir: i32) -> Option<usize> {
    if (1..=8).contains(&flowdir) {
        Some((flowdir - 1) as usize)
    } else {
        None
    }
}

/// Routing role of a cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SinkKind {
    /// Drains to its outlet
    #[default]
    Routed,
    /// Terminal sink, nothing downstream
    Sink,
    /// Connection imposed from outside, e.g. a roof piped to a junction
    Forced,
}

impl SinkKind {
    pub fn code(self) -> i32 {
        match self {
            SinkKind::Routed => 0,
            SinkKind::Sink => 1,
            SinkKind::Forced => 2,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => SinkKind::Sink,
            2 => SinkKind::Forced,
            _ => SinkKind::Routed,
        }
    }
}

/// SWMM subcatchment, subarea and infiltration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydroParams {
    pub raingage: String,
    /// Percent impervious
    pub imperv: f64,
    pub n_imperv: f64,
    pub n_perv: f64,
    /// Depression storage on the impervious part
    pub s_imperv: f64,
    /// Depression storage on the pervious part
    pub s_perv: f64,
    /// Percent of impervious area without depression storage
    pub pct_zero: f64,
    pub route_to: String,
    pub pct_routed: f64,
    /// Green-Ampt suction head
    pub suction: f64,
    /// Saturated hydraulic conductivity
    pub hyd_con: f64,
    /// Initial moisture deficit
    pub imdmax: f64,
    pub snow_pack: String,
    pub tag: String,
}

impl Default for HydroParams {
    fn default() -> Self {
        Self {
            raingage: "r1".to_string(),
            imperv: 25.0,
            n_imperv: 0.01,
            n_perv: 0.1,
            s_imperv: 0.05,
            s_perv: 0.05,
            pct_zero: 0.0,
            route_to: "OUTLET".to_string(),
            pct_routed: 100.0,
            suction: 3.5,
            hyd_con: 0.5,
            imdmax: 0.25,
            snow_pack: String::new(),
            tag: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub name: String,
    pub center_x: f64,
    pub center_y: f64,
    /// NaN when the DEM has no value here
    pub elevation: f64,
    /// Raw flow-direction code, NO_FLOW when undefined
    pub flowdir: i32,
    pub cell_size: f64,
    /// Fractional slope (not percent)
    pub slope: f64,
    pub area: f64,
    pub flow_width: f64,
    pub landuse: i32,
    pub outlet: String,
    pub outlet_id: i64,
    pub outlet_coord: (f64, f64),
    pub is_sink: SinkKind,
    /// Linear indices of the 8 neighbours (−1 = none), ordered as NEIGHBOR_OFFSETS
    pub neighbor_indices: [i64; 8],
    /// Centre distances to the 8 neighbours (0 = none)
    pub neighbor_distances: [f64; 8],
    pub params: HydroParams,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            name: "empty".to_string(),
            center_x: 0.0,
            center_y: 0.0,
            elevation: 0.0,
            flowdir: NO_FLOW,
            cell_size: 0.0,
            slope: 0.0,
            area: 0.0,
            flow_width: 0.0,
            landuse: 0,
            outlet: UNROUTED.to_string(),
            outlet_id: UNROUTED_ID,
            outlet_coord: (0.0, 0.0),
            is_sink: SinkKind::Routed,
            neighbor_indices: [-1; 8],
            neighbor_distances: [0.0; 8],
            params: HydroParams::default(),
        }
    }
}

impl Cell {
    pub fn has_elevation(&self) -> bool {
        !self.elevation.is_nan()
    }

    pub fn is_routed(&self) -> bool {
        self.outlet != UNROUTED
    }

    /// Point this cell at a downstream target.
    pub fn set_outlet(&mut self, name: &str, id: i64, coord: (f64, f64)) {
        self.outlet = name.to_string();
        self.outlet_id = id;
        self.outlet_coord = coord;
    }

    /// Reset routing to the unrouted sentinel.
    pub fn clear_outlet(&mut self) {
        self.outlet = UNROUTED.to_string();
        self.outlet_id = UNROUTED_ID;
        self.outlet_coord = (0.0, 0.0);
    }

    /// Number of neighbour slots that hold a valid neighbour.
    pub fn neighbor_count(&self) -> usize {
        self.neighbor_indices.iter().filter(|&&i| i >= 0).count()
    }
}
