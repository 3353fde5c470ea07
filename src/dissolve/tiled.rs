//! Tiled iterative dissolve.
//!
//! # Algorithm
//!
//! 1. Partition the bounding box of all polygons into square tiles. A polygon
//!    belongs to every tile it touches, so border polygons are duplicated.
//! 2. Inside each tile, repeat until the polygon count has been unchanged for
//!    `convergence_window` iterations:
//!    - find touching pairs (bounding-box R-tree, then exact distance check)
//!      that share flowzone, land use and outlet
//!    - collapse each connected group into one polygon under a fresh key
//! 3. Tiles run in parallel; each owns its id allocator and working set.
//! 4. Reconcile globally: pieces from all tiles with the same full key are
//!    dissolved together and their attributes rebuilt from the source
//!    polygons they cover, so tile duplicates never count twice.

use std::collections::{BTreeSet, HashMap, VecDeque};

use geo::{BoundingRect, Intersects, MultiPolygon, Rect};
use petgraph::unionfind::UnionFind;
use rayon::prelude::*;

use super::DissolveOutput;
use crate::config::{DissolveParams, DissolveStrategy};
use crate::context::{IdAllocator, ScopedId};
use crate::error::{Error, Result};
use crate::geometry;
use crate::subcatchment::{DissolveKey, Subcatchment};

/// A spatial tile and the source polygons that touch it.
#[derive(Clone, Debug)]
pub struct Tile {
    pub index: usize,
    pub bounds: Rect<f64>,
    /// Indices into the source polygon slice
    pub members: Vec<usize>,
}

/// Upper bound on the tile grid laid over the polygon extent.
pub const MAX_TILES: usize = 1_000_000;

/// Split the extent of `polys` into `tile_size` squares and assign polygons.
///
/// Empty tiles are dropped. Polygons with empty geometry go to the first tile
/// so they still reach the output.
pub fn partition_tiles(polys: &[Subcatchment], tile_size: f64) -> Result<Vec<Tile>> {
    let Some(bounds) = geometry::total_bounds(polys.iter().map(|p| &p.geometry)) else {
        return Ok(single_tile(polys));
    };
    if tile_size.is_nan() || tile_size <= 0.0 {
        return Ok(single_tile(polys));
    }

    let fx = (bounds.width() / tile_size).ceil().max(1.0);
    let fy = (bounds.height() / tile_size).ceil().max(1.0);
    if !(fx * fy).is_finite() || fx * fy > MAX_TILES as f64 {
        return Err(Error::InvalidConfig {
            field: "dissolve.tile_size".to_string(),
            message: format!(
                "tile size {} splits a {} x {} extent into more than {} tiles",
                tile_size,
                bounds.width(),
                bounds.height(),
                MAX_TILES
            ),
        });
    }

    let origin = bounds.min();
    let (nx, ny) = (fx as usize, fy as usize);
    let slot = |v: f64, lo: f64, n: usize| (((v - lo) / tile_size).floor().max(0.0) as usize).min(n - 1);

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); nx * ny];
    for (i, p) in polys.iter().enumerate() {
        let Some(r) = p.geometry.bounding_rect() else {
            members[0].push(i);
            continue;
        };
        let (x0, x1) = (slot(r.min().x, origin.x, nx), slot(r.max().x, origin.x, nx));
        let (y0, y1) = (slot(r.min().y, origin.y, ny), slot(r.max().y, origin.y, ny));
        for ty in y0..=y1 {
            for tx in x0..=x1 {
                let rect = tile_rect(origin.x, origin.y, tile_size, tx, ty);
                if p.geometry.0.iter().any(|poly| poly.intersects(&rect)) {
                    members[ty * nx + tx].push(i);
                }
            }
        }
    }

    let tiles = members
        .into_iter()
        .enumerate()
        .filter(|(_, m)| !m.is_empty())
        .map(|(index, members)| Tile {
            index,
            bounds: tile_rect(origin.x, origin.y, tile_size, index % nx, index / nx),
            members,
        })
        .collect();
    Ok(tiles)
}

fn tile_rect(x0: f64, y0: f64, size: f64, tx: usize, ty: usize) -> Rect<f64> {
    let (minx, miny) = (x0 + tx as f64 * size, y0 + ty as f64 * size);
    Rect::new((minx, miny), (minx + size, miny + size))
}

fn single_tile(polys: &[Subcatchment]) -> Vec<Tile> {
    if polys.is_empty() {
        return Vec::new();
    }
    let bounds = geometry::total_bounds(polys.iter().map(|p| &p.geometry))
        .unwrap_or_else(|| Rect::new((0.0, 0.0), (0.0, 0.0)));
    vec![Tile {
        index: 0,
        bounds,
        members: (0..polys.len()).collect(),
    }]
}

/// Stops a tile once the polygon count has been flat for `window` iterations.
#[derive(Clone, Debug)]
pub struct ConvergenceTracker {
    window: usize,
    history: VecDeque<usize>,
}

impl ConvergenceTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: VecDeque::with_capacity(window),
        }
    }

    /// Record the count after an iteration; true once the tile has converged.
    pub fn observe(&mut self, count: usize) -> bool {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(count);
        self.history.len() == self.window && self.history.iter().all(|&c| c == count)
    }
}

/// Polygon in a tile's working set.
#[derive(Clone, Debug)]
struct Piece {
    group: ScopedId,
    key: DissolveKey,
    /// Sorted source indices covered by this piece
    members: Vec<usize>,
    geometry: MultiPolygon<f64>,
}

struct TileResult {
    pieces: Vec<Piece>,
    iterations: usize,
}

fn dissolve_tile(tile: &Tile, polys: &[Subcatchment], params: &DissolveParams) -> Result<TileResult> {
    let mut ids = IdAllocator::scoped(tile.index);
    let mut pieces: Vec<Piece> = tile
        .members
        .iter()
        .map(|&i| Piece {
            group: ids.next_id(),
            key: polys[i].dissolve_key(),
            members: vec![i],
            geometry: polys[i].geometry.clone(),
        })
        .collect();

    let mut tracker = ConvergenceTracker::new(params.convergence_window);
    for iteration in 1..=params.max_iterations {
        pieces = dissolve_touching(pieces, params.buffer_tolerance, &mut ids);
        if tracker.observe(pieces.len()) {
            log::debug!(
                "tile {}: {} -> {} polygons after {} iterations",
                tile.index,
                tile.members.len(),
                pieces.len(),
                iteration
            );
            return Ok(TileResult {
                pieces,
                iterations: iteration,
            });
        }
    }
    Err(Error::TileDidNotConverge {
        tile: tile.index,
        iterations: params.max_iterations,
    })
}

/// One iteration: union every connected group of touching same-key pieces.
fn dissolve_touching(pieces: Vec<Piece>, tolerance: f64, ids: &mut IdAllocator) -> Vec<Piece> {
    let n = pieces.len();
    let index = geometry::envelope_index(pieces.iter().map(|p| &p.geometry), tolerance);
    let mut sets = UnionFind::<usize>::new(n);

    for (i, piece) in pieces.iter().enumerate() {
        let Some(env) = geometry::envelope(&piece.geometry, tolerance) else {
            continue;
        };
        for candidate in index.locate_in_envelope_intersecting(&env) {
            let j = candidate.index;
            if j <= i || pieces[j].key != piece.key || sets.equiv(i, j) {
                continue;
            }
            if geometry::within_distance(&piece.geometry, &pieces[j].geometry, tolerance) {
                sets.union(i, j);
            }
        }
    }

    let labels = sets.into_labeling();
    let mut slots: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<Piece>> = Vec::new();
    for (piece, root) in pieces.into_iter().zip(labels) {
        match slots.get(&root) {
            Some(&s) => groups[s].push(piece),
            None => {
                slots.insert(root, groups.len());
                groups.push(vec![piece]);
            }
        }
    }

    groups
        .into_iter()
        .map(|mut group| {
            if group.len() == 1 {
                return group.swap_remove(0);
            }
            let geometry = geometry::union_all(group.iter().map(|p| &p.geometry));
            let members: BTreeSet<usize> = group.iter().flat_map(|p| p.members.iter().copied()).collect();
            let id = ids.next_id();
            log::trace!(
                "group {:?} absorbs {:?}",
                id,
                group.iter().map(|p| p.group).collect::<Vec<_>>()
            );
            Piece {
                group: id,
                key: group.swap_remove(0).key,
                members: members.into_iter().collect(),
                geometry,
            }
        })
        .collect()
}

/// Merge pieces from all tiles by full key and rebuild attributes from sources.
fn reconcile(pieces: Vec<Piece>, polys: &[Subcatchment]) -> Vec<Subcatchment> {
    let mut slots: HashMap<DissolveKey, usize> = HashMap::new();
    let mut groups: Vec<(BTreeSet<usize>, Vec<MultiPolygon<f64>>)> = Vec::new();
    for piece in pieces {
        let slot = *slots.entry(piece.key).or_insert_with(|| {
            groups.push((BTreeSet::new(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].0.extend(piece.members);
        groups[slot].1.push(piece.geometry);
    }

    let mut out: Vec<(usize, Subcatchment)> = groups
        .into_iter()
        .filter_map(|(members, geoms)| {
            let first = *members.iter().next()?;
            let area: f64 = members.iter().map(|&m| polys[m].area).sum();
            let weighted = |f: fn(&Subcatchment) -> f64| {
                if area > 0.0 {
                    members.iter().map(|&m| f(&polys[m]) * polys[m].area).sum::<f64>() / area
                } else {
                    members.iter().map(|&m| f(&polys[m])).sum::<f64>() / members.len() as f64
                }
            };
            let geometry = if geoms.len() == 1 {
                geoms.into_iter().next().unwrap_or_else(|| MultiPolygon(vec![]))
            } else {
                geometry::union_all(geoms.iter())
            };
            let record = Subcatchment {
                area,
                elevation: weighted(|p| p.elevation),
                slope: weighted(|p| p.slope),
                geometry,
                ..polys[first].clone()
            };
            Some((first, record))
        })
        .collect();
    out.sort_by_key(|(first, _)| *first);
    out.into_iter().map(|(_, r)| r).collect()
}

/// Run the tiled dissolve over `polys`.
pub fn dissolve_tiled(polys: &[Subcatchment], params: &DissolveParams) -> Result<DissolveOutput> {
    let tiles = if params.use_tiling {
        partition_tiles(polys, params.tile_size)?
    } else {
        single_tile(polys)
    };
    log::info!(
        "Dissolving {} polygons in {} tile(s) (tile size {}, tolerance {})",
        polys.len(),
        tiles.len(),
        params.tile_size,
        params.buffer_tolerance
    );

    let results = tiles
        .par_iter()
        .map(|tile| dissolve_tile(tile, polys, params))
        .collect::<Result<Vec<_>>>()?;

    let iterations = results.iter().map(|r| r.iterations).max().unwrap_or(0);
    let pieces: Vec<Piece> = results.into_iter().flat_map(|r| r.pieces).collect();
    let polygons = reconcile(pieces, polys);
    let merges = polys.len().saturating_sub(polygons.len());

    Ok(DissolveOutput {
        polygons,
        strategy: DissolveStrategy::Tiled,
        merges,
        tiles: tiles.len(),
        iterations,
    })
}
