//! Land-use class codes and the flowzone grouping derived from them.

/// Roof draining directly into the sewer network
pub const ROOF_CONNECTED: i32 = 10;
/// Roof draining onto surrounding surfaces
pub const ROOF_UNCONNECTED: i32 = 20;
/// Lowest code counted as built-up (sealed) area
pub const BUILT_AREA: i32 = 30;
pub const NATURAL_AREA: i32 = 60;
/// Unclassified / no-data
pub const NONE: i32 = 0;

pub const FLOWZONE_LOW: i32 = 100;
pub const FLOWZONE_HIGH: i32 = 200;

/// Flowzone of a land-use code.
pub fn flowzone(landuse: i32, threshold: i32) -> i32 {
    if landuse < threshold {
        FLOWZONE_LOW
    } else {
        FLOWZONE_HIGH
    }
}

pub fn is_classified(landuse: i32) -> bool {
    landuse != NONE
}

/// Human-readable label used by the preview legend and log output.
pub fn label(landuse: i32) -> &'static str {
    match landuse {
        NONE => "unclassified",
        ROOF_CONNECTED => "roof (connected)",
        ROOF_UNCONNECTED => "roof (unconnected)",
        BUILT_AREA => "built area",
        NATURAL_AREA => "natural area",
        c if c > BUILT_AREA => "built (other)",
        _ => "other",
    }
}
