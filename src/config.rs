//! Pipeline configuration.
//!
//! All tunables live here with their defaults. A JSON file may override any
//! subset of fields; missing fields keep the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::landuse;

/// Which dissolve algorithm to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DissolveStrategy {
    /// Single pass guided by the outlet graph
    FlowGraph,
    /// Tiled iterative neighbour dissolve with global reconciliation
    #[default]
    Tiled,
}

impl std::fmt::Display for DissolveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FlowGraph => write!(f, "flow-graph"),
            Self::Tiled => write!(f, "tiled"),
        }
    }
}

/// Grid construction and routing parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingParams {
    /// Minimum land-use code a downstream cell needs to receive flow
    pub built_area_threshold: i32,

    /// Cells with land use below this code get the low flowzone
    pub flowzone_threshold: i32,

    /// Route cells left unrouted by flow direction to the nearest open junction
    pub junction_fallback: bool,
}

impl Default for RoutingParams {
    fn default() -> Self {
        Self {
            built_area_threshold: landuse::BUILT_AREA,
            flowzone_threshold: 5,
            junction_fallback: false,
        }
    }
}

/// Adaptive dissolve parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DissolveParams {
    pub strategy: DissolveStrategy,

    /// Split the tiled variant into spatial tiles (false = one tile)
    pub use_tiling: bool,

    /// Tile edge length in map units
    pub tile_size: f64,

    /// Distance below which two polygons count as touching
    pub buffer_tolerance: f64,

    /// Consecutive iterations with an unchanged polygon count before a tile stops
    pub convergence_window: usize,

    /// Hard ceiling on iterations per tile
    pub max_iterations: usize,
}

impl Default for DissolveParams {
    fn default() -> Self {
        Self {
            strategy: DissolveStrategy::Tiled,
            use_tiling: true,
            tile_size: 1000.0,
            buffer_tolerance: 1e-3,
            convergence_window: 10,
            max_iterations: 1000,
        }
    }
}

/// Merge-back aggregation parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeBackParams {
    /// Flow width = width_ratio * sqrt(area) (Krebs et al. 2014)
    pub width_ratio: f64,

    /// Intersections at or below this area are ignored
    pub min_intersection_area: f64,

    /// Rewrite outlets that point at absorbed cells
    pub relink_outlets: bool,
}

impl Default for MergeBackParams {
    fn default() -> Self {
        Self {
            width_ratio: 0.7,
            min_intersection_area: 1e-9,
            relink_outlets: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub routing: RoutingParams,
    pub dissolve: DissolveParams,
    pub merge_back: MergeBackParams,
}

impl PipelineConfig {
    /// Load a config file; absent fields fall back to defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| Error::parse(path, e.to_string()))
    }
}
