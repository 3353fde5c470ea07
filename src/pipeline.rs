//! End-to-end runs: rasters to SWMM input, polygon dissolve, and finalisation
//! of a dissolved collection.
//!
//! Each run computes everything it needs, including the optional dissolve,
//! before writing any file, so a fatal error (mismatched rasters, cyclic flow
//! graph, non-converging tile) leaves no partial output behind.

use std::path::{Path, PathBuf};

use crate::cell::Cell;
use crate::config::PipelineConfig;
use crate::context::RunContext;
use crate::dissolve::{dissolve, DissolveOutput};
use crate::error::Result;
use crate::export;
use crate::geojson;
use crate::grid::{Grid, JunctionRouting, RoutingStats};
use crate::merge_back::{merge_back, MergeBackResult};
use crate::preview;
use crate::raster::Raster;
use crate::subcatchment::{self, Subcatchment};
use crate::tables::{self, CatchmentTable, FlowEdge, Junction};

/// Input files for [`run_model`].
#[derive(Clone, Debug, Default)]
pub struct ModelInputs {
    pub dem: PathBuf,
    pub flowdir: PathBuf,
    pub landuse: PathBuf,
    pub catchment_table: Option<PathBuf>,
    pub junctions: Option<PathBuf>,
    pub flow_edges: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct ModelOptions {
    /// Output files are named `{prefix}_subcatchments.wkt`, `{prefix}.inp`, ...
    pub output_prefix: PathBuf,
    pub preview: bool,
    /// Dissolve and merge back after writing the cell-level outputs
    pub dissolve: bool,
}

/// A routed grid with its routing summaries.
pub struct RoutedGrid {
    pub grid: Grid,
    pub routing: RoutingStats,
    pub junction_routing: Option<RoutingStats>,
}

/// Dissolve followed by merge-back.
pub struct Coarsened {
    pub original: Vec<Subcatchment>,
    pub dissolved: DissolveOutput,
    pub merged: MergeBackResult,
}

#[derive(Debug, Default)]
pub struct ModelReport {
    pub cells: usize,
    pub routing: RoutingStats,
    pub junction_routing: Option<RoutingStats>,
    /// Polygon count and merges when the dissolve ran
    pub dissolved: Option<(usize, usize)>,
    pub merged_cells: Option<usize>,
    pub written: Vec<PathBuf>,
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", prefix.display(), suffix))
}

/// Build the grid, route it and assign hydrologic parameters.
///
/// Junction routing runs only when junctions are given: for every classified
/// cell, or just the ones flow direction left unrouted when
/// `junction_fallback` is set.
pub fn route_grid(
    dem: &Raster,
    flowdir: &Raster,
    landuse: &Raster,
    catchments: Option<&CatchmentTable>,
    junctions: Option<&[Junction]>,
    config: &PipelineConfig,
    ctx: &mut RunContext,
) -> Result<RoutedGrid> {
    let mut grid = Grid::new(dem, flowdir, landuse, config.routing.clone())?;
    grid.compute_neighbors_and_slopes();
    let routing = grid.route_by_flowdir();

    let junction_routing = junctions.map(|js| {
        let mode = if config.routing.junction_fallback {
            JunctionRouting::UnroutedOnly
        } else {
            JunctionRouting::All
        };
        grid.route_to_junctions(js, mode, &mut ctx.diagnostics)
    });

    grid.set_catchment_properties(catchments, &mut ctx.diagnostics);
    Ok(RoutedGrid {
        grid,
        routing,
        junction_routing,
    })
}

/// Dissolve cell polygons and rebuild cell records from the result.
pub fn coarsen(
    original: Vec<Subcatchment>,
    edges: Option<&[FlowEdge]>,
    config: &PipelineConfig,
    ctx: &mut RunContext,
) -> Result<Coarsened> {
    let dissolved = dissolve(&original, edges, &config.dissolve, ctx)?;
    let merged = merge_back(&dissolved.polygons, &original, &config.merge_back, ctx);
    Ok(Coarsened {
        original,
        dissolved,
        merged,
    })
}

/// Rasters in, WKT tables, ASCII elevation, `.inp` and optional preview out.
pub fn run_model(
    inputs: &ModelInputs,
    options: &ModelOptions,
    config: &PipelineConfig,
    ctx: &mut RunContext,
) -> Result<ModelReport> {
    log::info!("Building computational grid...");
    let dem = Raster::read_ascii_grid(&inputs.dem)?;
    let flowdir = Raster::read_ascii_grid(&inputs.flowdir)?;
    let landuse = Raster::read_ascii_grid(&inputs.landuse)?;
    let catchments = inputs
        .catchment_table
        .as_ref()
        .map(CatchmentTable::from_csv_path)
        .transpose()?;
    let junctions = inputs.junctions.as_ref().map(tables::load_junctions).transpose()?;
    let edges = inputs.flow_edges.as_ref().map(tables::load_flow_edges).transpose()?;

    let routed = route_grid(
        &dem,
        &flowdir,
        &landuse,
        catchments.as_ref(),
        junctions.as_deref(),
        config,
        ctx,
    )?;
    let cells = routed.grid.cells();

    // The dissolve can fail fatally, so it runs before anything is written
    let coarse = if options.dissolve {
        let polys = subcatchment::from_cells(&cells, config.routing.flowzone_threshold);
        Some(coarsen(polys, edges.as_deref(), config, ctx)?)
    } else {
        None
    };

    log::info!("Writing outputs...");
    let prefix = &options.output_prefix;
    let mut written = Vec::new();
    let path = with_suffix(prefix, "_subcatchments.wkt");
    export::write_subcatchments_wkt(&path, &cells)?;
    written.push(path);
    let path = with_suffix(prefix, "_routing.wkt");
    export::write_flowlines_wkt(&path, &cells)?;
    written.push(path);
    let path = with_suffix(prefix, "_elevation.asc");
    dem.write_ascii_grid(&path, true)?;
    written.push(path);
    let path = with_suffix(prefix, ".inp");
    export::write_swmm_inp(&path, &cells)?;
    written.push(path);
    if options.preview {
        let path = with_suffix(prefix, "_routing.png");
        preview::write_routing_png(&path, &routed.grid)?;
        written.push(path);
        let path = with_suffix(prefix, "_elevation.png");
        preview::write_elevation_png(&path, &dem)?;
        written.push(path);
    }

    let mut report = ModelReport {
        cells: cells.len(),
        routing: routed.routing,
        junction_routing: routed.junction_routing,
        ..ModelReport::default()
    };

    if let Some(coarse) = coarse {
        let path = with_suffix(prefix, "_subcatchments.geojson");
        geojson::write_subcatchments(&path, &coarse.original)?;
        written.push(path);
        let path = with_suffix(prefix, "_dissolved.geojson");
        geojson::write_subcatchments(&path, &coarse.dissolved.polygons)?;
        written.push(path);
        let path = with_suffix(prefix, "_merged.inp");
        export::write_swmm_inp(&path, &coarse.merged.cells)?;
        written.push(path);
        let path = with_suffix(prefix, "_merged_subcatchments.wkt");
        export::write_subcatchments_wkt(&path, &coarse.merged.cells)?;
        written.push(path);

        report.dissolved = Some((coarse.dissolved.polygons.len(), coarse.dissolved.merges));
        report.merged_cells = Some(coarse.merged.cells.len());
    }

    report.written = written;
    Ok(report)
}

/// Dissolve a GeoJSON polygon collection into another GeoJSON file.
pub fn run_dissolve(
    input: &Path,
    output: &Path,
    flow_edges: Option<&Path>,
    config: &PipelineConfig,
    ctx: &mut RunContext,
) -> Result<DissolveOutput> {
    let polys = geojson::read_subcatchments(input, config.routing.flowzone_threshold)?;
    let edges = flow_edges.map(tables::load_flow_edges).transpose()?;
    let out = dissolve(&polys, edges.as_deref(), &config.dissolve, ctx)?;
    geojson::write_subcatchments(output, &out.polygons)?;
    Ok(out)
}

/// Merge a dissolved collection back onto the original cells and write `.inp`.
pub fn finalize_from_dissolved(
    dissolved: &Path,
    original: &Path,
    output_inp: &Path,
    config: &PipelineConfig,
    ctx: &mut RunContext,
) -> Result<Vec<Cell>> {
    let threshold = config.routing.flowzone_threshold;
    let dissolved = geojson::read_subcatchments(dissolved, threshold)?;
    let original = geojson::read_subcatchments(original, threshold)?;
    let merged = merge_back(&dissolved, &original, &config.merge_back, ctx);
    export::write_swmm_inp(output_inp, &merged.cells)?;
    Ok(merged.cells)
}
