//! Weather map rendering: a Web Mercator base map with per-location
//! temperature badges, a title bar and a color legend.

use thiserror::Error;

pub mod basemap;
pub mod download;
pub mod gradient;
pub mod label;
pub mod model;
pub mod projection;
pub mod render;
pub mod weather;

#[derive(Error, Debug)]
pub enum MapError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid gradient: {0}")]
    InvalidGradient(String),

    #[error("Failed to parse data: {0}")]
    ParseError(String),

    #[error("Mosaic needs {tiles} tiles, limit is {limit}")]
    MosaicTooLarge { tiles: usize, limit: usize },

    #[error("Base map unavailable: {0}")]
    BaseMapUnavailable(String),
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        MapError::ParseError(err.to_string())
    }
}

pub type StatusOr<T> = Result<T, MapError>;
