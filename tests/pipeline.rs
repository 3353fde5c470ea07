//! End-to-end runs through the public API and the file-based pipeline.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use gis_to_swmm::cell::{SinkKind, UNROUTED};
use gis_to_swmm::config::{DissolveParams, DissolveStrategy, PipelineConfig};
use gis_to_swmm::context::RunContext;
use gis_to_swmm::dissolve::dissolve;
use gis_to_swmm::geojson;
use gis_to_swmm::geometry;
use gis_to_swmm::grid::Grid;
use gis_to_swmm::pipeline::{self, coarsen, route_grid, ModelInputs, ModelOptions};
use gis_to_swmm::raster::Raster;
use gis_to_swmm::subcatchment::{self, Subcatchment};
use gis_to_swmm::synthetic::{self, SyntheticParams};
use gis_to_swmm::Error;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gis_to_swmm_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// D8 codes that make every outer cell of a 3x3 block drain into the centre.
const CONVERGING: [[f64; 3]; 3] = [[7.0, 6.0, 5.0], [8.0, -1.0, 4.0], [1.0, 2.0, 3.0]];

fn converging_rasters(cellsize: f64) -> (Raster, Raster, Raster) {
    let y_max = 3.0 * cellsize;
    let dem = Raster::from_fn(3, 3, cellsize, 0.0, y_max, |r, c| if (r, c) == (1, 1) { 1.0 } else { 2.0 });
    let flowdir = Raster::from_fn(3, 3, cellsize, 0.0, y_max, |r, c| CONVERGING[r][c]);
    let landuse = Raster::from_fn(3, 3, cellsize, 0.0, y_max, |_, _| 30.0);
    (dem, flowdir, landuse)
}

fn square_poly(name: &str, x: f64, y: f64, outlet: &str) -> Subcatchment {
    let mut p = Subcatchment::unrouted(name, 30, geometry::square(x, y, 1.0));
    p.flowzone = 100;
    p.outlet = outlet.to_string();
    p.outlet_id = 0;
    p
}

#[test]
fn test_converging_block_dissolves_to_single_cell() {
    let cellsize = 2.0;
    let (dem, flowdir, landuse) = converging_rasters(cellsize);
    let mut config = PipelineConfig::default();
    config.dissolve.strategy = DissolveStrategy::FlowGraph;
    let mut ctx = RunContext::new();

    let routed = route_grid(&dem, &flowdir, &landuse, None, None, &config, &mut ctx).unwrap();
    assert_eq!(routed.routing.routed, 8);
    assert_eq!(routed.routing.sinks, 1);

    let cells = routed.grid.cells();
    let polys = subcatchment::from_cells(&cells, config.routing.flowzone_threshold);
    let coarse = coarsen(polys, None, &config, &mut ctx).unwrap();

    assert_eq!(coarse.dissolved.polygons.len(), 1);
    assert!((coarse.dissolved.polygons[0].area - 9.0 * cellsize * cellsize).abs() < 1e-9);
    assert_eq!(coarse.merged.cells.len(), 1);
    let cell = &coarse.merged.cells[0];
    assert!((cell.area - 9.0 * cellsize * cellsize).abs() < 1e-9);
    assert!((cell.center_x - 3.0).abs() < 1e-9);
    assert!((cell.center_y - 3.0).abs() < 1e-9);
    // Everything drains inside the merged cell, so it becomes a terminal sink
    assert_eq!(cell.outlet, UNROUTED);
    assert_eq!(cell.is_sink, SinkKind::Sink);
}

#[test]
fn test_touching_polygons_dissolve_through_geojson() {
    let dir = scratch_dir("scenario2");
    let input = dir.join("cells.geojson");
    let output = dir.join("dissolved.geojson");
    let polys = vec![
        square_poly("a", 0.5, 0.5, "j1"),
        square_poly("b", 1.5, 0.5, "j1"),
        square_poly("c", 2.5, 0.5, "j2"),
    ];
    geojson::write_subcatchments(&input, &polys).unwrap();

    let mut ctx = RunContext::new();
    let out = pipeline::run_dissolve(&input, &output, None, &PipelineConfig::default(), &mut ctx).unwrap();
    assert_eq!(out.polygons.len(), 2);

    let back = geojson::read_subcatchments(&output, 5).unwrap();
    assert_eq!(back.len(), 2);
    let j1 = back.iter().find(|p| p.outlet == "j1").unwrap();
    assert_eq!(j1.name, "a");
    assert!((j1.area - 2.0).abs() < 1e-9);
    assert_eq!(j1.flowzone, 100);
    assert!(back.iter().any(|p| p.name == "c" && p.outlet == "j2"));
}

#[test]
fn test_nodata_elevation_cell_is_isolated() {
    let y_max = 3.0;
    let dem = Raster::from_fn(3, 3, 1.0, 0.0, y_max, |r, c| if (r, c) == (1, 1) { f64::NAN } else { 5.0 + c as f64 });
    let flowdir = Raster::from_fn(3, 3, 1.0, 0.0, y_max, |r, c| CONVERGING[r][c]);
    let landuse = Raster::from_fn(3, 3, 1.0, 0.0, y_max, |_, _| 30.0);

    let mut grid = Grid::new(&dem, &flowdir, &landuse, Default::default()).unwrap();
    grid.compute_neighbors_and_slopes();
    grid.route_by_flowdir();

    let centre_index = grid.linear_index(1, 1) as i64;
    for cell in grid.iter() {
        assert!(!cell.neighbor_indices.contains(&centre_index), "{} links to no-data cell", cell.name);
    }
    let centre = grid.cell(1, 1);
    assert_eq!(centre.outlet, UNROUTED);
    assert_eq!(centre.neighbor_count(), 0);
}

fn ascii(values: &[&[f64]], cellsize: f64) -> String {
    let mut text = format!(
        "ncols {}\nnrows {}\nxllcorner 0\nyllcorner 0\ncellsize {}\nNODATA_value -9999\n",
        values[0].len(),
        values.len(),
        cellsize
    );
    for row in values {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&line.join(" "));
        text.push('\n');
    }
    text
}

#[test]
fn test_model_run_writes_all_outputs() {
    let dir = scratch_dir("model");
    fs::write(dir.join("dem.asc"), ascii(&[&[2.0, 2.0, 2.0], &[2.0, 1.0, 2.0], &[2.0, 2.0, 2.0]], 1.0)).unwrap();
    fs::write(
        dir.join("flowdir.asc"),
        ascii(&[&CONVERGING[0], &CONVERGING[1], &CONVERGING[2]], 1.0),
    )
    .unwrap();
    fs::write(dir.join("landuse.asc"), ascii(&[&[30.0; 3], &[30.0; 3], &[30.0; 3]], 1.0)).unwrap();
    fs::write(
        dir.join("catchments.csv"),
        "landuse,imperv,s_imperv,n_imperv,s_perv,n_perv,pct_zero,raingage\n30,85,0.05,0.015,0.1,0.2,10,rg1\n",
    )
    .unwrap();

    let inputs = ModelInputs {
        dem: dir.join("dem.asc"),
        flowdir: dir.join("flowdir.asc"),
        landuse: dir.join("landuse.asc"),
        catchment_table: Some(dir.join("catchments.csv")),
        ..ModelInputs::default()
    };
    let options = ModelOptions {
        output_prefix: dir.join("demo"),
        preview: true,
        dissolve: true,
    };
    let mut config = PipelineConfig::default();
    config.dissolve.strategy = DissolveStrategy::FlowGraph;
    let mut ctx = RunContext::new();
    let report = pipeline::run_model(&inputs, &options, &config, &mut ctx).unwrap();

    assert_eq!(report.cells, 9);
    assert_eq!(report.merged_cells, Some(1));
    for path in &report.written {
        assert!(path.exists(), "missing {}", path.display());
    }
    let inp = fs::read_to_string(dir.join("demo.inp")).unwrap();
    assert!(inp.contains("[SUBCATCHMENTS]"));
    assert!(inp.contains("rg1"));
    let merged = fs::read_to_string(dir.join("demo_merged.inp")).unwrap();
    assert!(merged.lines().any(|l| l.starts_with("sc1 ")));
    let routing = fs::read_to_string(dir.join("demo_routing.wkt")).unwrap();
    assert_eq!(routing.lines().count(), 9);
    assert_eq!(ctx.diagnostics.warning_count(), 0);
}

#[test]
fn test_mismatched_rasters_abort_before_writing() {
    let dir = scratch_dir("mismatch");
    fs::write(dir.join("dem.asc"), ascii(&[&[1.0, 1.0], &[1.0, 1.0]], 1.0)).unwrap();
    fs::write(dir.join("flowdir.asc"), ascii(&[&[1.0, 1.0, 1.0]], 1.0)).unwrap();
    fs::write(dir.join("landuse.asc"), ascii(&[&[30.0, 30.0], &[30.0, 30.0]], 1.0)).unwrap();

    let inputs = ModelInputs {
        dem: dir.join("dem.asc"),
        flowdir: dir.join("flowdir.asc"),
        landuse: dir.join("landuse.asc"),
        ..ModelInputs::default()
    };
    let options = ModelOptions {
        output_prefix: dir.join("demo"),
        ..ModelOptions::default()
    };
    let mut ctx = RunContext::new();
    let result = pipeline::run_model(&inputs, &options, &PipelineConfig::default(), &mut ctx);
    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    assert!(!dir.join("demo.inp").exists());
    assert!(!dir.join("demo_subcatchments.wkt").exists());
}

#[test]
fn test_cyclic_edges_abort_dissolve_without_output() {
    let dir = scratch_dir("cycle");
    let input = dir.join("cells.geojson");
    let output = dir.join("dissolved.geojson");
    let edges = dir.join("edges.csv");
    geojson::write_subcatchments(&input, &[square_poly("a", 0.5, 0.5, "b"), square_poly("b", 1.5, 0.5, "a")])
        .unwrap();
    fs::write(&edges, "from,to\na,b\nb,a\n").unwrap();

    let mut config = PipelineConfig::default();
    config.dissolve.strategy = DissolveStrategy::FlowGraph;
    let mut ctx = RunContext::new();
    let result = pipeline::run_dissolve(&input, &output, Some(&edges), &config, &mut ctx);
    assert!(matches!(result, Err(Error::CyclicFlowGraph { .. })));
    assert!(!output.exists());
}

#[test]
fn test_finalize_from_dissolved_files() {
    let dir = scratch_dir("finalize");
    let original: Vec<Subcatchment> = (0..4)
        .map(|i| {
            let mut p = square_poly(&format!("s0_{}", i), i as f64 + 0.5, 0.5, "j1");
            p.elevation = 10.0 + i as f64;
            p
        })
        .collect();
    let mut ctx = RunContext::new();
    let dissolved = dissolve(&original, None, &DissolveParams::default(), &mut ctx).unwrap();
    geojson::write_subcatchments(dir.join("original.geojson"), &original).unwrap();
    geojson::write_subcatchments(dir.join("dissolved.geojson"), &dissolved.polygons).unwrap();

    let cells = pipeline::finalize_from_dissolved(
        &dir.join("dissolved.geojson"),
        &dir.join("original.geojson"),
        &dir.join("final.inp"),
        &PipelineConfig::default(),
        &mut ctx,
    )
    .unwrap();
    assert_eq!(cells.len(), 1);
    assert!((cells[0].area - 4.0).abs() < 1e-9);
    assert!((cells[0].elevation - 11.5).abs() < 1e-9);
    assert!((cells[0].flow_width - 0.7 * 2.0).abs() < 1e-9);
    assert_eq!(cells[0].outlet, "j1");
    assert!(dir.join("final.inp").exists());
}

#[test]
fn test_tiling_preserves_area_and_groups_on_synthetic_site() {
    let site = synthetic::generate(&SyntheticParams {
        width: 24,
        height: 20,
        seed: 7,
        ..SyntheticParams::default()
    });
    let mut config = PipelineConfig::default();
    config.routing.junction_fallback = true;
    let mut ctx = RunContext::new();
    let routed = route_grid(
        &site.dem,
        &site.flowdir,
        &site.landuse,
        None,
        Some(site.junctions.as_slice()),
        &config,
        &mut ctx,
    )
    .unwrap();
    let polys = subcatchment::from_cells(&routed.grid.cells(), config.routing.flowzone_threshold);
    let input_area: f64 = polys.iter().map(|p| p.area).sum();

    let untiled = dissolve(
        &polys,
        None,
        &DissolveParams {
            use_tiling: false,
            ..DissolveParams::default()
        },
        &mut ctx,
    )
    .unwrap();
    let tiled = dissolve(
        &polys,
        None,
        &DissolveParams {
            tile_size: 8.0,
            ..DissolveParams::default()
        },
        &mut ctx,
    )
    .unwrap();

    let groups = |ps: &[Subcatchment]| -> BTreeSet<(i32, String)> {
        ps.iter().map(|p| (p.landuse, p.outlet.clone())).collect()
    };
    assert!(tiled.tiles > 1);
    assert!((untiled.total_area() - input_area).abs() < 1e-6);
    assert!((tiled.total_area() - input_area).abs() < 1e-6);
    assert_eq!(groups(&tiled.polygons), groups(&untiled.polygons));
    assert_eq!(tiled.polygons.len(), untiled.polygons.len());

    // A second pass finds nothing left to merge
    let again = dissolve(&tiled.polygons, None, &DissolveParams::default(), &mut ctx).unwrap();
    assert_eq!(again.merges, 0);

    // Merged cells keep the class and outlet of the polygon they came from
    let mut mb = config.merge_back.clone();
    mb.relink_outlets = false;
    let merged = gis_to_swmm::merge_back::merge_back(&tiled.polygons, &polys, &mb, &mut ctx);
    assert_eq!(merged.cells.len(), tiled.polygons.len());
    for (cell, poly) in merged.cells.iter().zip(&tiled.polygons) {
        assert_eq!(cell.landuse, poly.landuse);
        assert_eq!(cell.outlet, poly.outlet);
        assert!((cell.area - poly.area).abs() < 1e-6);
    }
}

#[test]
fn test_nodata_elevation_stays_out_of_merged_cells() {
    let dem = Raster::from_fn(2, 1, 1.0, 0.0, 1.0, |_, c| if c == 0 { f64::NAN } else { 5.0 });
    // The right cell points west into the hole
    let flowdir = Raster::from_fn(2, 1, 1.0, 0.0, 1.0, |_, c| if c == 0 { -1.0 } else { 4.0 });
    let landuse = Raster::from_fn(2, 1, 1.0, 0.0, 1.0, |_, _| 30.0);
    let config = PipelineConfig::default();
    let mut ctx = RunContext::new();

    let routed = route_grid(&dem, &flowdir, &landuse, None, None, &config, &mut ctx).unwrap();
    assert_eq!(routed.grid.cell(0, 1).outlet, UNROUTED);
    let polys = subcatchment::from_cells(&routed.grid.cells(), config.routing.flowzone_threshold);
    assert_eq!(polys.len(), 1);

    let coarse = coarsen(polys, None, &config, &mut ctx).unwrap();
    for poly in &coarse.dissolved.polygons {
        assert!(poly.elevation.is_finite(), "{} has elevation {}", poly.name, poly.elevation);
    }
    assert_eq!(coarse.merged.cells.len(), 1);
    let cell = &coarse.merged.cells[0];
    assert!(cell.elevation.is_finite());
    assert!((cell.elevation - 5.0).abs() < 1e-9);
    assert!((cell.area - 1.0).abs() < 1e-9);
}

#[test]
fn test_model_run_with_cyclic_edges_writes_nothing() {
    let dir = scratch_dir("model_cycle");
    fs::write(dir.join("dem.asc"), ascii(&[&[2.0, 1.0]], 1.0)).unwrap();
    fs::write(dir.join("flowdir.asc"), ascii(&[&[-1.0, -1.0]], 1.0)).unwrap();
    fs::write(dir.join("landuse.asc"), ascii(&[&[30.0, 30.0]], 1.0)).unwrap();
    fs::write(dir.join("edges.csv"), "from,to\ns0_0,s0_1\ns0_1,s0_0\n").unwrap();

    let inputs = ModelInputs {
        dem: dir.join("dem.asc"),
        flowdir: dir.join("flowdir.asc"),
        landuse: dir.join("landuse.asc"),
        flow_edges: Some(dir.join("edges.csv")),
        ..ModelInputs::default()
    };
    let options = ModelOptions {
        output_prefix: dir.join("demo"),
        preview: true,
        dissolve: true,
    };
    let mut config = PipelineConfig::default();
    config.dissolve.strategy = DissolveStrategy::FlowGraph;
    let mut ctx = RunContext::new();

    let result = pipeline::run_model(&inputs, &options, &config, &mut ctx);
    assert!(matches!(result, Err(Error::CyclicFlowGraph { .. })));
    for suffix in [".inp", "_subcatchments.wkt", "_routing.wkt", "_elevation.asc", "_routing.png"] {
        let path = dir.join(format!("demo{}", suffix));
        assert!(!path.exists(), "{} was written", path.display());
    }
}
