//! PNG previews of a routed grid.

use std::path::Path;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::cell::SinkKind;
use crate::grid::Grid;
use crate::landuse;
use crate::raster::Raster;

/// Land-use colour, dimmed when the cell is not routed.
fn landuse_color(code: i32) -> [u8; 3] {
    match code {
        landuse::NONE => [0, 0, 0],
        landuse::ROOF_CONNECTED => [200, 60, 50],
        landuse::ROOF_UNCONNECTED => [230, 140, 90],
        landuse::BUILT_AREA => [150, 150, 150],
        landuse::NATURAL_AREA => [80, 160, 70],
        c if c > landuse::BUILT_AREA => [120, 120, 140],
        _ => [200, 200, 120],
    }
}

/// One pixel per cell: land-use colour, sinks in blue, forced connections in
/// magenta, unrouted cells at half brightness.
pub fn routing_image(grid: &Grid) -> RgbImage {
    let mut img: RgbImage = ImageBuffer::new(grid.ncols as u32, grid.nrows as u32);
    for row in 0..grid.nrows {
        for col in 0..grid.ncols {
            let cell = grid.cell(row, col);
            let color = match cell.is_sink {
                SinkKind::Sink => [30, 60, 220],
                SinkKind::Forced => [220, 40, 200],
                SinkKind::Routed if cell.is_routed() => landuse_color(cell.landuse),
                SinkKind::Routed => landuse_color(cell.landuse).map(|c| c / 2),
            };
            img.put_pixel(col as u32, row as u32, Rgb(color));
        }
    }
    img
}

/// Elevation rendered with a spectral colormap; no-data is black.
pub fn elevation_image(dem: &Raster) -> RgbImage {
    let (lo, hi) = dem.value_range().unwrap_or((0.0, 1.0));
    let span = if hi > lo { hi - lo } else { 1.0 };
    let mut img: RgbImage = ImageBuffer::new(dem.width() as u32, dem.height() as u32);
    for row in 0..dem.height() {
        for col in 0..dem.width() {
            let v = dem.get_value_at(row, col);
            let color = if v.is_nan() {
                [0, 0, 0]
            } else {
                spectral_colormap(((v - lo) / span) as f32)
            };
            img.put_pixel(col as u32, row as u32, Rgb(color));
        }
    }
    img
}

/// Spectral colormap: dark blue (low) through yellow to dark red (high).
fn spectral_colormap(t: f32) -> [u8; 3] {
    let colors: [[f32; 3]; 11] = [
        [0.37, 0.31, 0.64],
        [0.20, 0.53, 0.74],
        [0.40, 0.76, 0.65],
        [0.67, 0.87, 0.64],
        [0.90, 0.96, 0.60],
        [1.00, 1.00, 0.75],
        [1.00, 0.88, 0.55],
        [0.99, 0.68, 0.38],
        [0.96, 0.43, 0.26],
        [0.84, 0.24, 0.31],
        [0.62, 0.00, 0.26],
    ];

    let t_scaled = t.clamp(0.0, 1.0) * 10.0;
    let idx = (t_scaled as usize).min(9);
    let frac = t_scaled - idx as f32;
    let (c1, c2) = (colors[idx], colors[idx + 1]);
    [
        ((c1[0] + (c2[0] - c1[0]) * frac) * 255.0) as u8,
        ((c1[1] + (c2[1] - c1[1]) * frac) * 255.0) as u8,
        ((c1[2] + (c2[2] - c1[2]) * frac) * 255.0) as u8,
    ]
}

pub fn write_routing_png<P: AsRef<Path>>(path: P, grid: &Grid) -> crate::Result<()> {
    routing_image(grid).save(path.as_ref())?;
    Ok(())
}

pub fn write_elevation_png<P: AsRef<Path>>(path: P, dem: &Raster) -> crate::Result<()> {
    elevation_image(dem).save(path.as_ref())?;
    Ok(())
}
