//! Drainage grid built from three co-registered rasters.
//!
//! The grid owns one [`Cell`] per pixel and runs the fine-scale steps of the
//! pipeline:
//! - **Initialisation**: elevation, land use and flow-direction code per pixel
//! - **Neighbours**: 8-neighbour indices, centre distances and steepest slope
//! - **Routing**: by flow-direction code (see [`routing`]) or to the nearest open junction
//! - **Parameters**: land-use keyed hydrologic properties (see [`properties`])

pub mod properties;
pub mod routing;

pub use routing::{JunctionRouting, RoutingStats};

use rayon::prelude::*;

use crate::cell::{Cell, NEIGHBOR_OFFSETS, NO_FLOW};
use crate::config::RoutingParams;
use crate::error::{Error, Result};
use crate::landuse;
use crate::raster::Raster;
use crate::tilemap::Tilemap;

pub struct Grid {
    cells: Tilemap<Cell>,
    pub nrows: usize,
    pub ncols: usize,
    pub cellsize: f64,
    pub(crate) params: RoutingParams,
}

/// Deterministic cell name for a pixel.
pub fn cell_name(row: usize, col: usize) -> String {
    format!("s{}_{}", row, col)
}

impl Grid {
    /// Build the grid and initialise one cell per pixel.
    ///
    /// All three rasters must share shape, resolution and origin with the DEM;
    /// anything else is a fatal [`Error::ShapeMismatch`].
    pub fn new(dem: &Raster, flowdir: &Raster, landuse: &Raster, params: RoutingParams) -> Result<Self> {
        for (name, other) in [("flowdir", flowdir), ("landuse", landuse)] {
            if let Some(detail) = dem.alignment_mismatch(other) {
                return Err(Error::ShapeMismatch {
                    name: name.to_string(),
                    detail,
                });
            }
        }

        let (nrows, ncols) = dem.shape();
        let cellsize = dem.resolution;
        let mut grid = Self {
            cells: Tilemap::new(ncols, nrows),
            nrows,
            ncols,
            cellsize,
            params,
        };
        grid.initialize(dem, flowdir, landuse);
        Ok(grid)
    }

    fn initialize(&mut self, dem: &Raster, flowdir: &Raster, landuse: &Raster) {
        for row in 0..self.nrows {
            for col in 0..self.ncols {
                let elevation = dem.get_value_at(row, col);

                // No elevation means no cell: unclassified and never routed
                let land_raw = landuse.get_value_at(row, col);
                let land = if land_raw.is_nan() || elevation.is_nan() {
                    landuse::NONE
                } else {
                    land_raw as i32
                };

                let flow_raw = flowdir.get_value_at(row, col);
                let flow = if flow_raw.is_nan() { NO_FLOW } else { flow_raw as i32 };

                let (x, y) = dem.get_coords(row, col);

                self.cells.set(
                    col,
                    row,
                    Cell {
                        name: cell_name(row, col),
                        center_x: x,
                        center_y: y,
                        elevation,
                        landuse: land,
                        flowdir: flow,
                        cell_size: self.cellsize,
                        area: self.cellsize * self.cellsize,
                        ..Cell::default()
                    },
                );
            }
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.cells.get(col, row)
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> &mut Cell {
        self.cells.get_mut(col, row)
    }

    /// Row-major index used for `neighbor_indices` and `outlet_id`.
    pub fn linear_index(&self, row: usize, col: usize) -> usize {
        row * self.ncols + col
    }

    /// Neighbour position in slot `slot`, if inside the grid.
    pub fn neighbor_position(&self, row: usize, col: usize, slot: usize) -> Option<(usize, usize)> {
        let (dr, dc) = NEIGHBOR_OFFSETS[slot];
        self.cells.offset(col, row, dc, dr).map(|(c, r)| (r, c))
    }

    /// Record neighbour indices, distances and the steepest downhill slope.
    ///
    /// Cells without elevation are skipped and never appear as anyone's
    /// neighbour. Each row is computed independently, so rows run in parallel.
    pub fn compute_neighbors_and_slopes(&mut self) {
        let rows: Vec<Vec<([i64; 8], [f64; 8], f64)>> = (0..self.nrows)
            .into_par_iter()
            .map(|row| {
                (0..self.ncols)
                    .map(|col| self.neighbor_record(row, col))
                    .collect()
            })
            .collect();

        for (row, records) in rows.into_iter().enumerate() {
            for (col, (indices, distances, slope)) in records.into_iter().enumerate() {
                let cell = self.cells.get_mut(col, row);
                cell.neighbor_indices = indices;
                cell.neighbor_distances = distances;
                cell.slope = slope;
            }
        }
    }

    fn neighbor_record(&self, row: usize, col: usize) -> ([i64; 8], [f64; 8], f64) {
        let mut indices = [-1i64; 8];
        let mut distances = [0.0f64; 8];
        let cell = self.cell(row, col);
        if !cell.has_elevation() {
            return (indices, distances, cell.slope);
        }

        let mut steepest = 0.0f64;
        for slot in 0..8 {
            let Some((r2, c2)) = self.neighbor_position(row, col, slot) else {
                continue;
            };
            let neighbor = self.cell(r2, c2);
            if !neighbor.has_elevation() {
                continue;
            }

            let dx = cell.center_x - neighbor.center_x;
            let dy = cell.center_y - neighbor.center_y;
            let dist = dx.hypot(dy);
            let slope = if dist > 0.0 {
                (cell.elevation - neighbor.elevation) / dist
            } else {
                0.0
            };

            indices[slot] = self.linear_index(r2, c2) as i64;
            distances[slot] = dist;
            steepest = steepest.max(slope);
        }
        (indices, distances, steepest)
    }

    pub fn params(&self) -> &RoutingParams {
        &self.params
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> Vec<Cell> {
        self.cells.as_slice().to_vec()
    }

    pub fn into_cells(self) -> Vec<Cell> {
        self.cells.into_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.as_slice().iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a grid from closures over (row, col).
    pub(crate) fn grid_from_fns(
        nrows: usize,
        ncols: usize,
        cellsize: f64,
        elev: impl Fn(usize, usize) -> f64,
        flow: impl Fn(usize, usize) -> f64,
        land: impl Fn(usize, usize) -> f64,
    ) -> Grid {
        let y_max = nrows as f64 * cellsize;
        let dem = Raster::from_fn(ncols, nrows, cellsize, 0.0, y_max, elev);
        let fd = Raster::from_fn(ncols, nrows, cellsize, 0.0, y_max, flow);
        let lu = Raster::from_fn(ncols, nrows, cellsize, 0.0, y_max, land);
        Grid::new(&dem, &fd, &lu, RoutingParams::default()).unwrap()
    }

    #[test]
    fn test_initialize_normalizes_missing_values() {
        let grid = grid_from_fns(
            2,
            2,
            5.0,
            |r, c| (r * 2 + c) as f64,
            |r, _| if r == 0 { f64::NAN } else { 6.0 },
            |_, c| if c == 0 { f64::NAN } else { 30.0 },
        );
        let c00 = grid.cell(0, 0);
        assert_eq!(c00.name, "s0_0");
        assert_eq!(c00.landuse, 0);
        assert_eq!(c00.flowdir, NO_FLOW);
        assert_eq!(c00.area, 25.0);
        let c11 = grid.cell(1, 1);
        assert_eq!(c11.landuse, 30);
        assert_eq!(c11.flowdir, 6);
        assert_eq!((c11.center_x, c11.center_y), (7.5, 2.5));
    }

    #[test]
    fn test_nodata_elevation_drops_landuse() {
        let grid = grid_from_fns(1, 2, 1.0, |_, c| if c == 0 { f64::NAN } else { 5.0 }, |_, _| 4.0, |_, _| 30.0);
        assert_eq!(grid.cell(0, 0).landuse, landuse::NONE);
        assert_eq!(grid.cell(0, 1).landuse, 30);
    }

    #[test]
    fn test_mismatched_rasters_are_fatal() {
        let dem = Raster::new(3, 3, 1.0, 0.0, 3.0);
        let fd = Raster::new(3, 3, 1.0, 0.0, 3.0);
        let lu = Raster::new(4, 3, 1.0, 0.0, 3.0);
        let err = Grid::new(&dem, &fd, &lu, RoutingParams::default()).err().unwrap();
        assert!(matches!(err, Error::ShapeMismatch { ref name, .. } if name == "landuse"));
    }

    #[test]
    fn test_neighbor_distances_are_symmetric() {
        let mut grid = grid_from_fns(4, 5, 2.0, |r, c| (r * 7 + c * 3) as f64, |_, _| 1.0, |_, _| 30.0);
        grid.compute_neighbors_and_slopes();
        for row in 0..grid.nrows {
            for col in 0..grid.ncols {
                let a = grid.cell(row, col);
                for slot in 0..8 {
                    if a.neighbor_indices[slot] < 0 {
                        continue;
                    }
                    let idx = a.neighbor_indices[slot] as usize;
                    let b = grid.cell(idx / grid.ncols, idx % grid.ncols);
                    // The opposite compass slot is four steps around the table
                    let back = (slot + 4) % 8;
                    assert_eq!(b.neighbor_indices[back], grid.linear_index(row, col) as i64);
                    assert!((a.neighbor_distances[slot] - b.neighbor_distances[back]).abs() < 1e-12);
                }
            }
        }
        let corner = grid.cell(0, 0);
        assert_eq!(corner.neighbor_count(), 3);
        assert!((corner.neighbor_distances[6] - 2.0 * 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_nodata_elevation_is_excluded_from_neighbors() {
        let mut grid = grid_from_fns(
            3,
            3,
            1.0,
            |r, c| if (r, c) == (1, 1) { f64::NAN } else { 10.0 - r as f64 },
            |_, _| 6.0,
            |_, _| 30.0,
        );
        grid.compute_neighbors_and_slopes();
        let hole = grid.linear_index(1, 1) as i64;
        for cell in grid.iter() {
            assert!(!cell.neighbor_indices.contains(&hole));
        }
        assert_eq!(grid.cell(1, 1).neighbor_count(), 0);
    }

    #[test]
    fn test_slope_is_steepest_descent() {
        // Elevation drops 1 per row going south
        let mut grid = grid_from_fns(3, 3, 1.0, |r, _| 10.0 - r as f64, |_, _| 6.0, |_, _| 30.0);
        grid.compute_neighbors_and_slopes();
        assert!((grid.cell(1, 1).slope - 1.0).abs() < 1e-12);
        // Bottom row has nothing lower around it
        assert_eq!(grid.cell(2, 1).slope, 0.0);
    }
}
