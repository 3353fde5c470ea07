//! Text writers for the final cell list.
//!
//! - Subcatchment polygons and flow lines as `;`-separated WKT tables
//! - A SWMM5 input file with subcatchment, subarea, infiltration and polygon
//!   sections
//!
//! Cells carry no outline, so both the WKT table and the `[Polygons]` section
//! draw a square of side `cell_size` around the cell centre. For merged cells
//! that is `sqrt(area)` around the centroid, not the dissolved shape; the
//! dissolved GeoJSON keeps the real outline.
//!
//! Each writer has a pure `*_text` form used by the tests and a `write_*` form
//! that puts the text on disk.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use crate::cell::{Cell, UNROUTED_ID};
use crate::error::{Error, Result};

fn write_text(path: &Path, text: String) -> Result<()> {
    std::fs::write(path, text).map_err(|e| Error::io(path, e))
}

/// Corners of the square drawn for a cell, closed ring, counter-clockwise
/// from the south-west.
fn square_ring(cell: &Cell) -> [(f64, f64); 5] {
    let (x, y, s) = (cell.center_x, cell.center_y, 0.5 * cell.cell_size);
    [(x - s, y - s), (x - s, y + s), (x + s, y + s), (x + s, y - s), (x - s, y - s)]
}

// =============================================================================
// WKT tables
// =============================================================================

pub fn subcatchments_wkt_text(cells: &[Cell]) -> String {
    let mut out = String::from("id;wkt;name;outlet;area_m2;slope_pct;elevation;landuse\n");
    for (i, cell) in cells.iter().enumerate() {
        let ring: Vec<String> = square_ring(cell)
            .iter()
            .map(|(x, y)| format!("{} {}", x, y))
            .collect();
        let _ = writeln!(
            out,
            "{};POLYGON(({}));{};{};{};{:.2};{};{}",
            i + 1,
            ring.join(","),
            cell.name,
            cell.outlet,
            cell.area,
            cell.slope * 100.0,
            cell.elevation,
            cell.landuse
        );
    }
    out
}

/// One line per routed cell, from its centre to its outlet.
pub fn flowlines_wkt_text(cells: &[Cell]) -> String {
    let mut out = String::from("id;wkt;from;to\n");
    for (i, cell) in cells.iter().enumerate() {
        if cell.outlet_id == UNROUTED_ID || !cell.is_routed() {
            continue;
        }
        let _ = writeln!(
            out,
            "{};LINESTRING({} {}, {} {});{};{}",
            i + 1,
            cell.center_x,
            cell.center_y,
            cell.outlet_coord.0,
            cell.outlet_coord.1,
            cell.name,
            cell.outlet
        );
    }
    out
}

pub fn write_subcatchments_wkt<P: AsRef<Path>>(path: P, cells: &[Cell]) -> Result<()> {
    write_text(path.as_ref(), subcatchments_wkt_text(cells))
}

pub fn write_flowlines_wkt<P: AsRef<Path>>(path: P, cells: &[Cell]) -> Result<()> {
    write_text(path.as_ref(), flowlines_wkt_text(cells))
}

// =============================================================================
// SWMM5 input file
// =============================================================================

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

/// Render a SWMM5 `.inp` file. `created` goes into the title block.
pub fn swmm_inp_text(cells: &[Cell], created: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[TITLE]\n;; Created by gis_to_swmm {}\n", created);

    out.push_str("[OPTIONS]\n");
    out.push_str("FLOW_UNITS           CMS\n");
    out.push_str("INFILTRATION         GREEN_AMPT\n");
    out.push_str("FLOW_ROUTING         DYNWAVE\n\n");

    let gages: BTreeSet<&str> = cells.iter().map(|c| c.params.raingage.as_str()).collect();
    out.push_str("[RAINGAGES]\n");
    out.push_str(";;Name           Format    Interval SCF      Source\n");
    for gage in gages {
        let _ = writeln!(out, "{:<16} INTENSITY 1:00     1.0      TIMESERIES ts_{}", gage, gage);
    }
    out.push('\n');

    out.push_str("[SUBCATCHMENTS]\n");
    out.push_str(";;Name           Raingage         Outlet           Area     %Imperv  Width    %Slope   CurbLen  SnowPack\n");
    for c in cells {
        let _ = writeln!(
            out,
            "{:<16} {:<16} {:<16} {:<8.4} {:<8} {:<8.2} {:<8.2} {:<8.2} {}",
            c.name,
            c.params.raingage,
            c.outlet,
            c.area / 10_000.0,
            c.params.imperv,
            c.flow_width,
            c.slope * 100.0,
            c.cell_size,
            or_dash(&c.params.snow_pack)
        );
    }
    out.push('\n');

    out.push_str("[SUBAREAS]\n");
    out.push_str(";;Subcatchment   N-Imperv   N-Perv     S-Imperv   S-Perv     PctZero    RouteTo    PctRouted\n");
    for c in cells {
        let p = &c.params;
        let _ = writeln!(
            out,
            "{:<16} {:<10} {:<10} {:<10} {:<10} {:<10} {:<10} {}",
            c.name, p.n_imperv, p.n_perv, p.s_imperv, p.s_perv, p.pct_zero, p.route_to, p.pct_routed
        );
    }
    out.push('\n');

    out.push_str("[INFILTRATION]\n");
    out.push_str(";;Subcatchment   Suction    Ksat       IMD\n");
    for c in cells {
        let p = &c.params;
        let _ = writeln!(out, "{:<16} {:<10} {:<10} {}", c.name, p.suction, p.hyd_con, p.imdmax);
    }
    out.push('\n');

    let tagged: Vec<&Cell> = cells.iter().filter(|c| !c.params.tag.is_empty()).collect();
    if !tagged.is_empty() {
        out.push_str("[TAGS]\n");
        for c in tagged {
            let _ = writeln!(out, "Subcatch  {:<16} {}", c.name, c.params.tag);
        }
        out.push('\n');
    }

    out.push_str("[Polygons]\n");
    out.push_str(";;Subcatchment   X-Coord            Y-Coord\n");
    for c in cells {
        for (x, y) in &square_ring(c)[..4] {
            let _ = writeln!(out, "{:<16} {:<18.3} {:.3}", c.name, x, y);
        }
    }
    out
}

/// Write a SWMM5 `.inp` file stamped with the current local time.
pub fn write_swmm_inp<P: AsRef<Path>>(path: P, cells: &[Cell]) -> Result<()> {
    let created = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    write_text(path.as_ref(), swmm_inp_text(cells, &created))
}
