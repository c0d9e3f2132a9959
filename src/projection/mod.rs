use std::f64::consts::PI;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{MapError, StatusOr};

/// WGS84 equatorial radius used by Web Mercator, in meters
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitudes are clamped to this magnitude before the Mercator conversion
pub const MAX_LATITUDE: f64 = 89.9;

/// Edge length of a slippy-map tile in pixels
pub const TILE_SIZE: u32 = 256;

/// Geographic rectangle in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Create a bounding box, rejecting empty or inverted ranges
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> StatusOr<Self> {
        let all_finite = [lat_min, lat_max, lon_min, lon_max].iter().all(|v| v.is_finite());
        if !all_finite {
            return Err(MapError::InvalidBbox("coordinates must be finite".to_string()));
        }
        if lat_min >= lat_max {
            return Err(MapError::InvalidBbox(format!(
                "lat_min ({}) must be below lat_max ({})", lat_min, lat_max)));
        }
        if lon_min >= lon_max {
            return Err(MapError::InvalidBbox(format!(
                "lon_min ({}) must be below lon_max ({})", lon_min, lon_max)));
        }
        if lat_min < -90.0 || lat_max > 90.0 || lon_min < -180.0 || lon_max > 180.0 {
            return Err(MapError::InvalidBbox(format!(
                "{},{},{},{} is outside the valid coordinate range", lon_min, lat_min, lon_max, lat_max)));
        }

        Ok(Self { lat_min, lat_max, lon_min, lon_max })
    }

    /// The Balearic Islands, the default map region
    pub fn balearic_islands() -> Self {
        Self { lat_min: 38.5, lat_max: 40.2, lon_min: 1.0, lon_max: 4.5 }
    }

    /// Whether the point lies inside the box (edges included)
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }

    /// Format as "lon_min,lat_min,lon_max,lat_max", the order static map services expect
    pub fn to_query_string(&self) -> String {
        format!("{},{},{},{}", self.lon_min, self.lat_min, self.lon_max, self.lat_max)
    }
}

impl FromStr for BoundingBox {
    type Err = MapError;

    /// Parse "lon_min,lat_min,lon_max,lat_max"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(MapError::InvalidBbox(format!(
                "expected lon_min,lat_min,lon_max,lat_max, got '{}'", s)));
        }

        let mut values = [0.0f64; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| MapError::InvalidBbox(format!("'{}' is not a number", part)))?;
        }

        let [lon_min, lat_min, lon_max, lat_max] = values;
        Self::new(lat_min, lat_max, lon_min, lon_max)
    }
}

/// Longitude in degrees to Mercator easting in meters
pub fn lon_to_x(lon: f64) -> f64 {
    lon.to_radians() * EARTH_RADIUS
}

/// Latitude in degrees to Mercator northing in meters.
/// The latitude is clamped to +/-89.9 so the poles stay finite.
pub fn lat_to_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln()
}

/// Fractional slippy-map tile coordinates of a point at the given zoom
pub fn lonlat_to_tile(lon: f64, lat: f64, zoom: u32) -> (f64, f64) {
    let lat_rad = lat.to_radians();
    let n = 2f64.powi(zoom as i32);
    let x_tile = (lon + 180.0) / 360.0 * n;
    let y_tile = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    (x_tile, y_tile)
}

/// Global pixel coordinates of a point at the given zoom (tile coordinates times tile size)
pub fn lonlat_to_world_pixel(lon: f64, lat: f64, zoom: u32) -> (f64, f64) {
    let (x_tile, y_tile) = lonlat_to_tile(lon, lat, zoom);
    (x_tile * TILE_SIZE as f64, y_tile * TILE_SIZE as f64)
}

/// Affine mapping from Mercator meters to the pixels of one rendered raster.
///
/// Built once per render pass from the requested bounding box and output
/// size; every point drawn on that raster goes through the same instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterTransform {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub width: u32,
    pub height: u32,
}

impl RasterTransform {
    pub fn from_bbox(bbox: &BoundingBox, width: u32, height: u32) -> Self {
        Self {
            min_x: lon_to_x(bbox.lon_min),
            max_x: lon_to_x(bbox.lon_max),
            min_y: lat_to_y(bbox.lat_min),
            max_y: lat_to_y(bbox.lat_max),
            width,
            height,
        }
    }

    /// Fractional pixel position of a point. Points outside the bounding box
    /// extrapolate linearly and may land outside the canvas.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = (lon_to_x(lon) - self.min_x) / (self.max_x - self.min_x) * self.width as f64;
        // Pixel rows grow downward while northing grows upward
        let y = (self.max_y - lat_to_y(lat)) / (self.max_y - self.min_y) * self.height as f64;
        (x, y)
    }

    /// Integer pixel containing the projected point
    pub fn project_pixel(&self, lon: f64, lat: f64) -> (i32, i32) {
        let (x, y) = self.project(lon, lat);
        (x.floor() as i32, y.floor() as i32)
    }

    /// Whether an integer pixel falls on the canvas
    pub fn contains_pixel(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }
}

/// Project a point with the transform of the current render pass
pub fn project(lon: f64, lat: f64, transform: &RasterTransform) -> (f64, f64) {
    transform.project(lon, lat)
}
