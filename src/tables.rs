//! Typed input tables: junctions, flow edges and catchment properties.
//!
//! Rows are deserialised by column name and validated on load, so the rest of
//! the crate never touches positional columns.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::cell::HydroParams;
use crate::error::{Error, Result};

/// A network node that cells may drain into.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Junction {
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub is_open: bool,
    #[serde(default)]
    pub invert_elev: f64,
}

impl Junction {
    pub fn new(name: &str, x: f64, y: f64, is_open: bool) -> Self {
        Self {
            name: name.to_string(),
            x,
            y,
            is_open,
            invert_elev: 0.0,
        }
    }
}

/// One drainage relation: `from` drains into `to`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FlowEdge {
    pub from: String,
    pub to: String,
}

impl FlowEdge {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Hydrologic parameters for one land-use class.
///
/// The trailing columns are optional; a table that omits them gets the fixed
/// defaults below.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CatchmentProperties {
    /// Land-use code, matched as a string against the cell's class
    pub landuse: String,
    pub imperv: f64,
    pub s_imperv: f64,
    pub n_imperv: f64,
    pub s_perv: f64,
    pub n_perv: f64,
    pub pct_zero: f64,
    pub raingage: String,
    #[serde(default = "default_hyd_con")]
    pub hyd_con: f64,
    #[serde(default = "default_imdmax")]
    pub imdmax: f64,
    #[serde(default = "default_suction")]
    pub suction: f64,
    #[serde(default)]
    pub snow_pack: String,
    #[serde(default)]
    pub tag: String,
}

fn default_true() -> bool {
    true
}

fn default_hyd_con() -> f64 {
    0.5
}

fn default_imdmax() -> f64 {
    0.25
}

fn default_suction() -> f64 {
    3.5
}

/// Accepts true/false, yes/no and 1/0.
fn flexible_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "open" => Ok(true),
        "0" | "false" | "no" | "n" | "closed" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!("not a boolean: '{}'", other))),
    }
}

impl CatchmentProperties {
    /// Copy this class's parameters onto a cell's parameter block.
    pub fn apply(&self, params: &mut HydroParams) {
        params.imperv = self.imperv;
        params.s_imperv = self.s_imperv;
        params.n_imperv = self.n_imperv;
        params.s_perv = self.s_perv;
        params.n_perv = self.n_perv;
        params.pct_zero = self.pct_zero;
        params.raingage = self.raingage.clone();
        params.hyd_con = self.hyd_con;
        params.imdmax = self.imdmax;
        params.suction = self.suction;
        params.snow_pack = self.snow_pack.clone();
        params.tag = self.tag.clone();
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.landuse.trim().is_empty() {
            return Err("empty landuse key".to_string());
        }
        if !(0.0..=100.0).contains(&self.imperv) {
            return Err(format!("imperv {} outside 0..=100", self.imperv));
        }
        for (label, v) in [
            ("n_imperv", self.n_imperv),
            ("n_perv", self.n_perv),
            ("s_imperv", self.s_imperv),
            ("s_perv", self.s_perv),
        ] {
            if v < 0.0 || v.is_nan() {
                return Err(format!("{} must be non-negative, got {}", label, v));
            }
        }
        Ok(())
    }
}

/// Land-use keyed lookup of catchment properties.
#[derive(Clone, Debug, Default)]
pub struct CatchmentTable {
    rows: Vec<CatchmentProperties>,
    index: HashMap<String, usize>,
}

impl CatchmentTable {
    /// Build from rows; the first row for a key wins.
    pub fn from_rows(rows: Vec<CatchmentProperties>) -> Self {
        let mut index = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            index.entry(row.landuse.trim().to_string()).or_insert(i);
        }
        Self { rows, index }
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        Self::from_reader(file, path)
    }

    pub fn from_reader<R: Read>(reader: R, origin: &Path) -> Result<Self> {
        let rows: Vec<CatchmentProperties> = read_rows(reader)?;
        for (i, row) in rows.iter().enumerate() {
            row.validate().map_err(|message| Error::InvalidTable {
                path: origin.to_path_buf(),
                row: i + 1,
                message,
            })?;
        }
        Ok(Self::from_rows(rows))
    }

    /// Exact string match on the land-use key.
    pub fn lookup(&self, landuse_key: &str) -> Option<&CatchmentProperties> {
        self.index.get(landuse_key).map(|&i| &self.rows[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn read_rows<R: Read, T: for<'de> Deserialize<'de>>(reader: R) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Load a junction table (`name,x,y[,is_open][,invert_elev]`).
pub fn load_junctions<P: AsRef<Path>>(path: P) -> Result<Vec<Junction>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    junctions_from_reader(file, path)
}

pub fn junctions_from_reader<R: Read>(reader: R, origin: &Path) -> Result<Vec<Junction>> {
    let junctions: Vec<Junction> = read_rows(reader)?;
    for (i, j) in junctions.iter().enumerate() {
        if j.name.is_empty() || !j.x.is_finite() || !j.y.is_finite() {
            return Err(Error::InvalidTable {
                path: origin.to_path_buf(),
                row: i + 1,
                message: format!("junction '{}' needs a name and finite coordinates", j.name),
            });
        }
    }
    Ok(junctions)
}

/// Load a flow-edge table (`from,to`).
pub fn load_flow_edges<P: AsRef<Path>>(path: P) -> Result<Vec<FlowEdge>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    flow_edges_from_reader(file)
}

pub fn flow_edges_from_reader<R: Read>(reader: R) -> Result<Vec<FlowEdge>> {
    read_rows(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catchment_table_optional_columns_default() {
        let csv_text = "landuse,imperv,s_imperv,n_imperv,s_perv,n_perv,pct_zero,raingage\n30,80,1.5,0.012,5,0.15,10,rg1\n60,5,1.5,0.012,6,0.3,0,rg1\n";
        let table = CatchmentTable::from_reader(csv_text.as_bytes(), Path::new("props.csv")).unwrap();
        assert_eq!(table.len(), 2);
        let built = table.lookup("30").unwrap();
        assert_eq!(built.imperv, 80.0);
        assert_eq!(built.hyd_con, 0.5);
        assert_eq!(built.imdmax, 0.25);
        assert_eq!(built.suction, 3.5);
        assert_eq!(built.snow_pack, "");
        assert!(table.lookup("10").is_none());
    }

    #[test]
    fn test_catchment_table_full_columns() {
        let csv_text = "landuse,imperv,s_imperv,n_imperv,s_perv,n_perv,pct_zero,raingage,hyd_con,imdmax,suction,snow_pack,tag\n10,100,1,0.011,0,0.1,25,rg2,0.1,0.3,2.0,sp1,roof\n";
        let table = CatchmentTable::from_reader(csv_text.as_bytes(), Path::new("props.csv")).unwrap();
        let roof = table.lookup("10").unwrap();
        assert_eq!(roof.hyd_con, 0.1);
        assert_eq!(roof.snow_pack, "sp1");
        assert_eq!(roof.tag, "roof");
    }

    #[test]
    fn test_catchment_table_rejects_bad_imperv() {
        let csv_text = "landuse,imperv,s_imperv,n_imperv,s_perv,n_perv,pct_zero,raingage\n30,180,1.5,0.012,5,0.15,10,rg1\n";
        let err = CatchmentTable::from_reader(csv_text.as_bytes(), Path::new("bad.csv")).unwrap_err();
        assert!(matches!(err, Error::InvalidTable { row: 1, .. }));
    }

    #[test]
    fn test_junctions_parse_flexible_bool() {
        let csv_text = "name,x,y,is_open,invert_elev\nj1,0,0,1,10.5\nj2,5,5,0,9\n";
        let js = junctions_from_reader(csv_text.as_bytes(), Path::new("j.csv")).unwrap();
        assert!(js[0].is_open);
        assert!(!js[1].is_open);
        assert_eq!(js[0].invert_elev, 10.5);
    }

    #[test]
    fn test_junction_open_defaults_true() {
        let csv_text = "name,x,y\nj1,1,2\n";
        let js = junctions_from_reader(csv_text.as_bytes(), Path::new("j.csv")).unwrap();
        assert!(js[0].is_open);
    }

    #[test]
    fn test_flow_edges() {
        let edges = flow_edges_from_reader("from,to\ns0_0,s0_1\ns0_1,j1\n".as_bytes()).unwrap();
        assert_eq!(edges, vec![FlowEdge::new("s0_0", "s0_1"), FlowEdge::new("s0_1", "j1")]);
    }
}
