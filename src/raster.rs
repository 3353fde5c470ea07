//! Single-band raster surfaces and the ESRI ASCII grid adapter.
//!
//! Values are stored as `f64` with no-data mapped to NaN on load, so callers only
//! ever test `is_nan()`. Coordinates follow the usual north-up convention: row 0
//! is the northern edge and pixel centres sit half a cell in from the corners.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Error, Result};
use crate::tilemap::Tilemap;

/// NODATA value written to ASCII grids.
pub const ASCII_NODATA: f64 = -9999.0;

#[derive(Clone, Debug)]
pub struct Raster {
    values: Tilemap<f64>,
    /// West edge of the grid
    pub x_min: f64,
    /// North edge of the grid
    pub y_max: f64,
    /// Square pixel size in map units
    pub resolution: f64,
}

impl Raster {
    /// Raster filled with no-data.
    pub fn new(width: usize, height: usize, resolution: f64, x_min: f64, y_max: f64) -> Self {
        Self {
            values: Tilemap::new_with(width, height, f64::NAN),
            x_min,
            y_max,
            resolution,
        }
    }

    /// Raster whose value at `(row, col)` is `f(row, col)`.
    pub fn from_fn(
        width: usize,
        height: usize,
        resolution: f64,
        x_min: f64,
        y_max: f64,
        f: impl Fn(usize, usize) -> f64,
    ) -> Self {
        let mut raster = Self::new(width, height, resolution, x_min, y_max);
        for row in 0..height {
            for col in 0..width {
                raster.values.set(col, row, f(row, col));
            }
        }
        raster
    }

    pub fn width(&self) -> usize {
        self.values.width
    }

    pub fn height(&self) -> usize {
        self.values.height
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    /// Value at a pixel; NaN for no-data or out-of-bounds positions.
    pub fn get_value_at(&self, row: usize, col: usize) -> f64 {
        if row < self.height() && col < self.width() {
            *self.values.get(col, row)
        } else {
            f64::NAN
        }
    }

    pub fn set_value_at(&mut self, row: usize, col: usize, value: f64) {
        self.values.set(col, row, value);
    }

    /// Map coordinates of a pixel centre.
    pub fn get_coords(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.x_min + (col as f64 + 0.5) * self.resolution;
        let y = self.y_max - (row as f64 + 0.5) * self.resolution;
        (x, y)
    }

    /// South edge of the grid.
    pub fn y_min(&self) -> f64 {
        self.y_max - self.height() as f64 * self.resolution
    }

    /// Describe how `other` differs from this raster's geometry, if it does.
    pub fn alignment_mismatch(&self, other: &Raster) -> Option<String> {
        if self.shape() != other.shape() {
            return Some(format!(
                "shape {}x{} (rows x cols), expected {}x{}",
                other.height(),
                other.width(),
                self.height(),
                self.width()
            ));
        }
        let tol = 1e-9 * self.resolution.abs().max(1.0);
        if (self.resolution - other.resolution).abs() > tol {
            return Some(format!(
                "resolution {}, expected {}",
                other.resolution, self.resolution
            ));
        }
        if (self.x_min - other.x_min).abs() > tol || (self.y_max - other.y_max).abs() > tol {
            return Some(format!(
                "origin ({}, {}), expected ({}, {})",
                other.x_min, other.y_max, self.x_min, self.y_max
            ));
        }
        None
    }

    /// Smallest and largest defined value, or None when everything is no-data.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for (_, _, &v) in self.values.iter() {
            if v.is_nan() {
                continue;
            }
            range = Some(match range {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        range
    }

    /// Read an ESRI ASCII grid (`.asc`).
    pub fn read_ascii_grid<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse_ascii_grid(&text, path)
    }

    /// Parse ASCII grid text. `origin` is only used for error messages.
    pub fn parse_ascii_grid(text: &str, origin: &Path) -> Result<Self> {
        let mut ncols: Option<usize> = None;
        let mut nrows: Option<usize> = None;
        let mut x_ll: Option<(f64, bool)> = None;
        let mut y_ll: Option<(f64, bool)> = None;
        let mut cellsize: Option<f64> = None;
        let mut nodata: Option<f64> = None;

        let mut tokens = text.split_whitespace().peekable();

        // Header: keyword/value pairs until the first numeric token
        while let Some(&tok) = tokens.peek() {
            if tok.parse::<f64>().is_ok() {
                break;
            }
            let key = tok.to_ascii_lowercase();
            tokens.next();
            let value = tokens
                .next()
                .ok_or_else(|| Error::parse(origin, format!("missing value for '{}'", key)))?;
            let number = |v: &str| {
                v.parse::<f64>()
                    .map_err(|_| Error::parse(origin, format!("bad number '{}' for '{}'", v, key)))
            };
            match key.as_str() {
                "ncols" => ncols = Some(number(value)? as usize),
                "nrows" => nrows = Some(number(value)? as usize),
                "xllcorner" => x_ll = Some((number(value)?, false)),
                "xllcenter" => x_ll = Some((number(value)?, true)),
                "yllcorner" => y_ll = Some((number(value)?, false)),
                "yllcenter" => y_ll = Some((number(value)?, true)),
                "cellsize" => cellsize = Some(number(value)?),
                "nodata_value" => nodata = Some(number(value)?),
                other => {
                    return Err(Error::parse(origin, format!("unknown header key '{}'", other)))
                }
            }
        }

        let missing = |k: &str| Error::parse(origin, format!("header is missing '{}'", k));
        let ncols = ncols.ok_or_else(|| missing("ncols"))?;
        let nrows = nrows.ok_or_else(|| missing("nrows"))?;
        let cellsize = cellsize.ok_or_else(|| missing("cellsize"))?;
        let (x_ll, x_is_center) = x_ll.ok_or_else(|| missing("xllcorner"))?;
        let (y_ll, y_is_center) = y_ll.ok_or_else(|| missing("yllcorner"))?;

        let x_min = if x_is_center { x_ll - cellsize / 2.0 } else { x_ll };
        let y_min = if y_is_center { y_ll - cellsize / 2.0 } else { y_ll };
        let y_max = y_min + nrows as f64 * cellsize;

        let mut values = Vec::with_capacity(ncols * nrows);
        for tok in tokens {
            let v: f64 = tok
                .parse()
                .map_err(|_| Error::parse(origin, format!("bad cell value '{}'", tok)))?;
            let is_nodata = nodata.map_or(false, |nd| v == nd);
            values.push(if is_nodata { f64::NAN } else { v });
        }
        if values.len() != ncols * nrows {
            return Err(Error::parse(
                origin,
                format!("expected {} cell values, found {}", ncols * nrows, values.len()),
            ));
        }

        let values = Tilemap::from_vec(ncols, nrows, values)
            .ok_or_else(|| Error::parse(origin, "cell count does not match header"))?;
        Ok(Self {
            values,
            x_min,
            y_max,
            resolution: cellsize,
        })
    }

    /// Render as ESRI ASCII grid text. Values are truncated to integers when
    /// `integer` is set.
    pub fn to_ascii_grid(&self, integer: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "ncols         {}", self.width());
        let _ = writeln!(out, "nrows         {}", self.height());
        let _ = writeln!(out, "xllcorner     {}", self.x_min);
        let _ = writeln!(out, "yllcorner     {}", self.y_min());
        let _ = writeln!(out, "cellsize      {}", self.resolution);
        let _ = writeln!(out, "NODATA_value  {}", ASCII_NODATA);
        for row in 0..self.height() {
            let line: Vec<String> = (0..self.width())
                .map(|col| {
                    let v = self.get_value_at(row, col);
                    if v.is_nan() {
                        format!("{}", ASCII_NODATA)
                    } else if integer {
                        format!("{}", v as i64)
                    } else {
                        format!("{}", v)
                    }
                })
                .collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }

    pub fn write_ascii_grid<P: AsRef<Path>>(&self, path: P, integer: bool) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_ascii_grid(integer)).map_err(|e| Error::io(path, e))
    }
}
