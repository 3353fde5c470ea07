//! GeoJSON `FeatureCollection` adapter for subcatchment polygons.
//!
//! Only Polygon and MultiPolygon geometries are supported. Feature properties
//! carry the subcatchment attributes plus the hydrologic parameters:
//!
//! | property | field | default |
//! |---|---|---|
//! | `name` | name | `f{index}` |
//! | `landuse` | landuse | 0 |
//! | `flowzone` | flowzone | derived from land use |
//! | `outlet` | outlet | `"*"` |
//! | `outlet_id` | outlet_id | −1 |
//! | `outlet_x`, `outlet_y` | outlet_coord | 0 |
//! | `is_sink` | is_sink code | 0 |
//! | `area_m2` | area | geometry area |
//! | `elevation` | elevation | 0 |
//! | `slope_pct` | slope × 100 | 0 |

use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};

use crate::cell::{HydroParams, SinkKind, UNROUTED, UNROUTED_ID};
use crate::error::{Error, Result};
use crate::geometry;
use crate::landuse;
use crate::subcatchment::Subcatchment;

/// Read a polygon collection from a GeoJSON file.
pub fn read_subcatchments<P: AsRef<Path>>(path: P, flowzone_threshold: i32) -> Result<Vec<Subcatchment>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_subcatchments(&text, path, flowzone_threshold)
}

/// Parse GeoJSON text. `origin` is only used for error messages.
pub fn parse_subcatchments(text: &str, origin: &Path, flowzone_threshold: i32) -> Result<Vec<Subcatchment>> {
    let root: Value = serde_json::from_str(text).map_err(|e| Error::parse(origin, e.to_string()))?;
    if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(Error::parse(origin, "expected a FeatureCollection"));
    }
    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::parse(origin, "FeatureCollection has no 'features' array"))?;

    features
        .iter()
        .enumerate()
        .map(|(i, f)| {
            parse_feature(f, i, flowzone_threshold)
                .map_err(|msg| Error::parse(origin, format!("feature {}: {}", i, msg)))
        })
        .collect()
}

fn parse_feature(feature: &Value, index: usize, flowzone_threshold: i32) -> std::result::Result<Subcatchment, String> {
    let geometry = feature
        .get("geometry")
        .ok_or_else(|| "missing geometry".to_string())
        .and_then(parse_geometry)?;
    let empty = Map::new();
    let props = feature
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let text = |key: &str| props.get(key).and_then(Value::as_str).map(str::to_string);
    let number = |key: &str| props.get(key).and_then(Value::as_f64);
    let integer = |key: &str| props.get(key).and_then(Value::as_i64);

    let landuse = integer("landuse").unwrap_or(landuse::NONE as i64) as i32;
    let params: HydroParams =
        serde_json::from_value(Value::Object(props.clone())).map_err(|e| format!("bad parameters: {}", e))?;

    Ok(Subcatchment {
        name: text("name").unwrap_or_else(|| format!("f{}", index)),
        flowzone: integer("flowzone")
            .map(|z| z as i32)
            .unwrap_or_else(|| landuse::flowzone(landuse, flowzone_threshold)),
        landuse,
        outlet: text("outlet").unwrap_or_else(|| UNROUTED.to_string()),
        outlet_id: integer("outlet_id").unwrap_or(UNROUTED_ID),
        outlet_coord: (number("outlet_x").unwrap_or(0.0), number("outlet_y").unwrap_or(0.0)),
        is_sink: SinkKind::from_code(integer("is_sink").unwrap_or(0)),
        area: number("area_m2").unwrap_or_else(|| geometry::area(&geometry)),
        elevation: number("elevation").unwrap_or(0.0),
        slope: number("slope_pct").unwrap_or(0.0) / 100.0,
        params,
        geometry,
    })
}

fn parse_geometry(value: &Value) -> std::result::Result<MultiPolygon<f64>, String> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    let coords = value
        .get("coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| "geometry has no coordinates".to_string())?;
    match kind {
        "Polygon" => Ok(MultiPolygon(vec![parse_polygon(coords)?])),
        "MultiPolygon" => coords
            .iter()
            .map(|p| p.as_array().ok_or_else(|| "bad polygon".to_string()).and_then(|p| parse_polygon(p)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(MultiPolygon),
        other => Err(format!("unsupported geometry type '{}'", other)),
    }
}

fn parse_polygon(rings: &[Value]) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings.next().ok_or_else(|| "polygon without rings".to_string())??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(ring: &Value) -> std::result::Result<LineString<f64>, String> {
    let points = ring.as_array().ok_or_else(|| "ring is not an array".to_string())?;
    points
        .iter()
        .map(|p| match p.as_array().map(Vec::as_slice) {
            Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err("non-numeric coordinate".to_string()),
            },
            _ => Err("position needs two numbers".to_string()),
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(LineString::from)
}

fn ring_to_json(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_to_json(poly: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_to_json(poly.exterior())];
    rings.extend(poly.interiors().iter().map(ring_to_json));
    Value::Array(rings)
}

fn feature(poly: &Subcatchment) -> Result<Value> {
    let mut props = match serde_json::to_value(&poly.params)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    props.insert("name".into(), json!(poly.name));
    props.insert("flowzone".into(), json!(poly.flowzone));
    props.insert("landuse".into(), json!(poly.landuse));
    props.insert("outlet".into(), json!(poly.outlet));
    props.insert("outlet_id".into(), json!(poly.outlet_id));
    props.insert("outlet_x".into(), json!(poly.outlet_coord.0));
    props.insert("outlet_y".into(), json!(poly.outlet_coord.1));
    props.insert("is_sink".into(), json!(poly.is_sink.code()));
    props.insert("area_m2".into(), json!(poly.area));
    props.insert("elevation".into(), json!(poly.elevation));
    props.insert("slope_pct".into(), json!(poly.slope * 100.0));

    let geometry = match poly.geometry.0.as_slice() {
        [single] => json!({ "type": "Polygon", "coordinates": polygon_to_json(single) }),
        parts => json!({
            "type": "MultiPolygon",
            "coordinates": parts.iter().map(polygon_to_json).collect::<Vec<_>>(),
        }),
    };
    Ok(json!({ "type": "Feature", "properties": props, "geometry": geometry }))
}

/// Render polygons as a GeoJSON `FeatureCollection`.
pub fn to_geojson(polys: &[Subcatchment]) -> Result<String> {
    let features = polys.iter().map(feature).collect::<Result<Vec<_>>>()?;
    let collection = json!({ "type": "FeatureCollection", "features": features });
    Ok(serde_json::to_string_pretty(&collection)?)
}

pub fn write_subcatchments<P: AsRef<Path>>(path: P, polys: &[Subcatchment]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_geojson(polys)?).map_err(|e| Error::io(path, e))
}
