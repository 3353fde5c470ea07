//! Seeded synthetic sites for the debug binary and tests.
//!
//! Produces a co-registered DEM, D8 flow-direction raster and land-use raster
//! plus a handful of junctions. The DEM is a tilted plane with Perlin relief;
//! flow direction is the steepest downhill neighbour; land use is clustered by
//! a second noise field with roofs scattered inside built-up clusters.

use noise::{NoiseFn, Perlin};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::cell::{NEIGHBOR_OFFSETS, NO_FLOW};
use crate::landuse;
use crate::raster::Raster;
use crate::tables::Junction;

#[derive(Clone, Debug)]
pub struct SyntheticParams {
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
    pub seed: u64,
    /// Amplitude of the noise relief in map units
    pub relief: f64,
    /// Elevation drop per cell from west to east
    pub tilt: f64,
    /// Noise value above which land is built up (-1..1)
    pub built_threshold: f64,
    /// Share of built cells turned into roofs
    pub roof_fraction: f64,
    pub junctions: usize,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            resolution: 1.0,
            seed: 42,
            relief: 2.0,
            tilt: 0.05,
            built_threshold: -0.1,
            roof_fraction: 0.2,
            junctions: 4,
        }
    }
}

pub struct SyntheticSite {
    pub dem: Raster,
    pub flowdir: Raster,
    pub landuse: Raster,
    pub junctions: Vec<Junction>,
}

pub fn generate(params: &SyntheticParams) -> SyntheticSite {
    let (w, h, res) = (params.width, params.height, params.resolution);
    let y_max = h as f64 * res;
    let terrain = Perlin::new(params.seed as u32);
    let clusters = Perlin::new((params.seed as u32).wrapping_add(1111));
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

    let dem = Raster::from_fn(w, h, res, 0.0, y_max, |row, col| {
        let (x, y) = (col as f64 / 16.0, row as f64 / 16.0);
        let fbm = terrain.get([x, y, 0.0]) + 0.5 * terrain.get([2.0 * x, 2.0 * y, 1.0]);
        100.0 - params.tilt * col as f64 + params.relief * fbm
    });

    let flowdir = Raster::from_fn(w, h, res, 0.0, y_max, |row, col| d8_code(&dem, row, col));

    let mut landuse = Raster::new(w, h, res, 0.0, y_max);
    for row in 0..h {
        for col in 0..w {
            let n = clusters.get([col as f64 / 12.0, row as f64 / 12.0, 0.5]);
            let code = if n < params.built_threshold {
                landuse::NATURAL_AREA
            } else if rng.gen_bool(params.roof_fraction.clamp(0.0, 1.0)) {
                if rng.gen_bool(0.5) {
                    landuse::ROOF_CONNECTED
                } else {
                    landuse::ROOF_UNCONNECTED
                }
            } else {
                landuse::BUILT_AREA
            };
            landuse.set_value_at(row, col, code as f64);
        }
    }

    let junctions = (0..params.junctions)
        .map(|i| {
            let x = rng.gen_range(0.0..w as f64 * res);
            let y = rng.gen_range(0.0..y_max);
            Junction::new(&format!("j{}", i + 1), x, y, true)
        })
        .collect();

    SyntheticSite {
        dem,
        flowdir,
        landuse,
        junctions,
    }
}

/// Steepest-descent D8 code, `NO_FLOW` for pits.
fn d8_code(dem: &Raster, row: usize, col: usize) -> f64 {
    let z = dem.get_value_at(row, col);
    let mut best: Option<(usize, f64)> = None;
    for (slot, &(dr, dc)) in NEIGHBOR_OFFSETS.iter().enumerate() {
        let (r2, c2) = (row as i64 + dr as i64, col as i64 + dc as i64);
        if r2 < 0 || c2 < 0 || r2 >= dem.height() as i64 || c2 >= dem.width() as i64 {
            continue;
        }
        let dist = ((dr * dr + dc * dc) as f64).sqrt() * dem.resolution;
        let drop = (z - dem.get_value_at(r2 as usize, c2 as usize)) / dist;
        if drop > 0.0 && best.map_or(true, |(_, d)| drop > d) {
            best = Some((slot, drop));
        }
    }
    best.map_or(NO_FLOW as f64, |(slot, _)| (slot + 1) as f64)
}
