//! GIS to SWMM conversion library
//!
//! Turns co-registered DEM, flow-direction and land-use rasters into routed
//! drainage cells, optionally dissolves them into coarser subcatchments and
//! merges the result back into cell records ready for a SWMM5 input file.
//!
//! Stages:
//! - [`grid`]: cell grid, neighbours, slopes, routing, parameter assignment
//! - [`dissolve`]: flow-graph or tiled dissolve of cell polygons
//! - [`merge_back`] and [`relink`]: cell records rebuilt from dissolved polygons
//! - [`pipeline`]: file-to-file runs used by the binaries

pub mod cell;
pub mod config;
pub mod context;
pub mod dissolve;
pub mod error;
pub mod export;
pub mod flow_graph;
pub mod geojson;
pub mod geometry;
pub mod grid;
pub mod landuse;
pub mod merge_back;
pub mod pipeline;
pub mod preview;
pub mod raster;
pub mod relink;
pub mod subcatchment;
pub mod synthetic;
pub mod tables;
pub mod tilemap;

pub use error::{Error, Result};
