use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gis_to_swmm::config::{DissolveStrategy, PipelineConfig};
use gis_to_swmm::context::RunContext;
use gis_to_swmm::pipeline::{self, ModelInputs, ModelOptions};

#[derive(Parser, Debug)]
#[command(name = "gis_to_swmm")]
#[command(about = "Convert raster GIS data into SWMM5 subcatchment models")]
struct Args {
    /// JSON file overriding pipeline defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build and route the cell grid, then write WKT, ASCII and .inp outputs
    Model {
        /// DEM as ESRI ASCII grid
        #[arg(long)]
        dem: PathBuf,

        /// D8 flow-direction raster (codes 1-8, -1 = no flow)
        #[arg(long)]
        flowdir: PathBuf,

        /// Land-use raster
        #[arg(long)]
        landuse: PathBuf,

        /// Output prefix (no extension)
        #[arg(long)]
        output: PathBuf,

        /// Catchment property table (CSV keyed by land-use code)
        #[arg(long)]
        catchments: Option<PathBuf>,

        /// Junction table (CSV: name,x,y,is_open,invert_elev)
        #[arg(long)]
        junctions: Option<PathBuf>,

        /// Route only cells left unrouted by flow direction to junctions
        #[arg(long)]
        junction_fallback: bool,

        /// Flow-edge table (CSV: from,to) for the flow-graph dissolve
        #[arg(long)]
        edges: Option<PathBuf>,

        /// Write PNG previews of routing and elevation
        #[arg(long)]
        preview: bool,

        /// Dissolve and merge back after the cell-level run
        #[arg(long)]
        dissolve: bool,

        /// Dissolve strategy when --dissolve is set
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
    },

    /// Dissolve a GeoJSON polygon collection
    Dissolve {
        /// Input GeoJSON FeatureCollection
        #[arg(long)]
        input: PathBuf,

        /// Output GeoJSON FeatureCollection
        #[arg(long)]
        output: PathBuf,

        /// Tile size in map units
        #[arg(long)]
        tile: Option<f64>,

        /// Disable tiling
        #[arg(long)]
        no_tiling: bool,

        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Flow-edge table (CSV: from,to) for the flow-graph strategy
        #[arg(long)]
        edges: Option<PathBuf>,
    },

    /// Merge a dissolved collection back onto its original cells and write .inp
    Finalize {
        /// Dissolved GeoJSON
        #[arg(long)]
        dissolved: PathBuf,

        /// Original (pre-dissolve) GeoJSON
        #[arg(long)]
        original: PathBuf,

        /// Output .inp file
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    FlowGraph,
    Tiled,
}

impl From<StrategyArg> for DissolveStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::FlowGraph => DissolveStrategy::FlowGraph,
            StrategyArg::Tiled => DissolveStrategy::Tiled,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p)
            .with_context(|| format!("loading config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn report_warnings(ctx: &RunContext) {
    let n = ctx.diagnostics.warning_count();
    if n > 0 {
        println!("{} warning(s):", n);
        for w in ctx.diagnostics.warnings() {
            println!("  - {}", w.message);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;
    let mut ctx = RunContext::new();

    match args.command {
        Command::Model {
            dem,
            flowdir,
            landuse,
            output,
            catchments,
            junctions,
            junction_fallback,
            edges,
            preview,
            dissolve,
            strategy,
        } => {
            if junction_fallback {
                config.routing.junction_fallback = true;
            }
            if let Some(s) = strategy {
                config.dissolve.strategy = s.into();
            }
            let inputs = ModelInputs {
                dem,
                flowdir,
                landuse,
                catchment_table: catchments,
                junctions,
                flow_edges: edges,
            };
            let options = ModelOptions {
                output_prefix: output,
                preview,
                dissolve,
            };
            let report = pipeline::run_model(&inputs, &options, &config, &mut ctx)
                .context("model run failed")?;

            println!("Cells: {}", report.cells);
            println!(
                "Routing: {} routed, {} sinks, {} unrouted",
                report.routing.routed, report.routing.sinks, report.routing.unrouted
            );
            if let Some(j) = report.junction_routing {
                println!("Junction routing: {} routed", j.routed);
            }
            if let (Some((polys, merges)), Some(merged)) = (report.dissolved, report.merged_cells) {
                println!("Dissolve: {} polygons ({} merges), {} merged cells", polys, merges, merged);
            }
            for path in &report.written {
                println!("Wrote {}", path.display());
            }
        }
        Command::Dissolve {
            input,
            output,
            tile,
            no_tiling,
            strategy,
            edges,
        } => {
            if let Some(size) = tile {
                config.dissolve.tile_size = size;
            }
            if no_tiling {
                config.dissolve.use_tiling = false;
            }
            if let Some(s) = strategy {
                config.dissolve.strategy = s.into();
            }
            let out = pipeline::run_dissolve(&input, &output, edges.as_deref(), &config, &mut ctx)
                .with_context(|| format!("dissolving {}", input.display()))?;
            println!(
                "Dissolve ({}): {} polygons, {} merges, {} tiles",
                out.strategy,
                out.polygons.len(),
                out.merges,
                out.tiles
            );
            println!("Wrote {}", output.display());
        }
        Command::Finalize {
            dissolved,
            original,
            output,
        } => {
            let cells = pipeline::finalize_from_dissolved(&dissolved, &original, &output, &config, &mut ctx)
                .context("finalize failed")?;
            println!("Final SWMM input with {} subcatchments saved to {}", cells.len(), output.display());
        }
    }

    report_warnings(&ctx);
    Ok(())
}
