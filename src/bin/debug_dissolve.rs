//! Debug tool for comparing dissolve strategies on a synthetic site.
//! Runs the flow-graph dissolve and the tiled dissolve (with and without
//! tiling) on the same routed grid and prints counts, areas and timings.

use std::time::Instant;

use clap::Parser;
use gis_to_swmm::config::{DissolveParams, DissolveStrategy, PipelineConfig};
use gis_to_swmm::context::RunContext;
use gis_to_swmm::dissolve::{dissolve, DissolveOutput};
use gis_to_swmm::merge_back::merge_back;
use gis_to_swmm::pipeline::route_grid;
use gis_to_swmm::preview;
use gis_to_swmm::subcatchment::{self, Subcatchment};
use gis_to_swmm::synthetic::{self, SyntheticParams};

#[derive(Parser, Debug)]
#[command(name = "debug_dissolve")]
#[command(about = "Compare dissolve strategies on synthetic terrain")]
struct Args {
    #[arg(short = 'W', long, default_value = "64")]
    width: usize,

    #[arg(short = 'H', long, default_value = "64")]
    height: usize,

    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Tile size for the tiled run
    #[arg(short, long, default_value = "16")]
    tile: f64,

    /// Write the routing preview to this PNG
    #[arg(long)]
    preview: Option<String>,
}

fn total_area(polys: &[Subcatchment]) -> f64 {
    polys.iter().map(|p| p.area).sum()
}

fn run(label: &str, polys: &[Subcatchment], params: DissolveParams) -> anyhow::Result<DissolveOutput> {
    let mut ctx = RunContext::new();
    let start = Instant::now();
    let out = dissolve(polys, None, &params, &mut ctx)?;
    println!(
        "  {:<22} {:>6} polygons  {:>6} merges  {:>3} tiles  {:>4} iters  area {:>10.2}  {:>8.1?}",
        label,
        out.polygons.len(),
        out.merges,
        out.tiles,
        out.iterations,
        out.total_area(),
        start.elapsed()
    );
    Ok(out)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    println!("Generating {}x{} synthetic site (seed {})...", args.width, args.height, args.seed);
    let site = synthetic::generate(&SyntheticParams {
        width: args.width,
        height: args.height,
        seed: args.seed,
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
    )?;
    println!(
        "Routing: {} routed, {} sinks, {} unrouted",
        routed.routing.routed, routed.routing.sinks, routed.routing.unrouted
    );
    if let Some(path) = &args.preview {
        preview::write_routing_png(path, &routed.grid)?;
        println!("Preview written to {}", path);
    }

    let cells = routed.grid.cells();
    let polys = subcatchment::from_cells(&cells, config.routing.flowzone_threshold);
    println!("{} cell polygons, total area {:.2}", polys.len(), total_area(&polys));

    println!("Dissolve runs:");
    let graph = run(
        "flow graph",
        &polys,
        DissolveParams {
            strategy: DissolveStrategy::FlowGraph,
            ..DissolveParams::default()
        },
    )?;
    let untiled = run(
        "tiled (single tile)",
        &polys,
        DissolveParams {
            use_tiling: false,
            ..DissolveParams::default()
        },
    )?;
    let tiled = run(
        &format!("tiled ({} units)", args.tile),
        &polys,
        DissolveParams {
            tile_size: args.tile,
            ..DissolveParams::default()
        },
    )?;

    if untiled.polygons.len() != tiled.polygons.len() {
        println!(
            "WARNING: tiling changed the polygon count ({} vs {})",
            untiled.polygons.len(),
            tiled.polygons.len()
        );
    }

    println!("Merge-back:");
    for (label, out) in [("flow graph", &graph), ("tiled", &tiled)] {
        let mut ctx = RunContext::new();
        let merged = merge_back(&out.polygons, &polys, &config.merge_back, &mut ctx);
        let area: f64 = merged.cells.iter().map(|c| c.area).sum();
        let sinks = merged.cells.iter().filter(|c| !c.is_routed()).count();
        println!(
            "  {:<22} {:>6} cells  area {:>10.2}  {} unrouted",
            label,
            merged.cells.len(),
            area,
            sinks
        );
    }
    Ok(())
}
