//! Error type shared by the grid, dissolve and merge-back stages.
//!
//! Only structural problems are errors: mismatched rasters, cyclic flow graphs,
//! tiles that never settle and unreadable inputs. Per-cell and per-polygon
//! problems are recovered locally and reported through [`crate::context::Diagnostics`].

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rasters handed to the grid do not share shape, resolution or origin.
    #[error("raster '{name}' does not match the DEM: {detail}")]
    ShapeMismatch { name: String, detail: String },

    /// The flow graph has a cycle, so no topological order exists.
    #[error("flow graph contains a cycle through '{node}'")]
    CyclicFlowGraph { node: String },

    /// A dissolve tile kept changing past the iteration ceiling.
    #[error("dissolve tile {tile} did not converge within {iterations} iterations")]
    TileDidNotConverge { tile: usize, iterations: usize },

    /// A configuration value is outside the range the pipeline can run with.
    #[error("invalid config value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// A text input (ASCII grid, GeoJSON, config) is malformed.
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// A table row failed validation after deserialisation.
    #[error("invalid row {row} in {}: {message}", path.display())]
    InvalidTable {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}
