//! Base-map acquisition: one static-image request, or a tile mosaic when
//! the static service is unavailable.
//!
//! Whichever path produces the raster, the returned [`RasterTransform`] is
//! built from the requested bounding box and output size, so markers land
//! on the same pixels regardless of the path taken.

use std::thread;
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use log::{debug, info, warn};

use crate::projection::{lonlat_to_world_pixel, BoundingBox, RasterTransform, TILE_SIZE};
use crate::{MapError, StatusOr};

/// Zoom level of the tile fallback
pub const DEFAULT_ZOOM: u32 = 8;

/// Highest zoom level accepted for the tile fallback
pub const MAX_ZOOM: u32 = 19;

/// Upper bound on tiles fetched for one mosaic
pub const MAX_MOSAIC_TILES: usize = 64;

const PLACEHOLDER_FILL: Rgb<u8> = Rgb([230, 230, 230]);
const PLACEHOLDER_LINE: Rgb<u8> = Rgb([200, 200, 200]);
const CANVAS_FILL: Rgb<u8> = Rgb([255, 255, 255]);

/// Remote source of base-map imagery
pub trait MapProvider {
    /// One image covering the bounding box at the requested size
    fn fetch_static(&self, bbox: &BoundingBox, width: u32, height: u32) -> StatusOr<RgbImage>;

    /// One 256x256 slippy-map tile
    fn fetch_tile(&self, tile: TileCoord) -> StatusOr<RgbImage>;
}

/// Slippy-map tile index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(zoom: u32, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// "{zoom}/{x}/{y}", as used in tile URLs
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Inclusive rectangle of tile indices at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u32,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl TileRange {
    /// Smallest range containing the tiles of all four bbox corners
    pub fn covering(bbox: &BoundingBox, zoom: u32) -> Self {
        let (px_min_x, px_max_y) = lonlat_to_world_pixel(bbox.lon_min, bbox.lat_min, zoom);
        let (px_max_x, px_min_y) = lonlat_to_world_pixel(bbox.lon_max, bbox.lat_max, zoom);

        let last = (1u32 << zoom) - 1;
        let to_index = |px: f64| -> u32 {
            let index = (px / TILE_SIZE as f64).floor();
            index.clamp(0.0, last as f64) as u32
        };

        Self {
            zoom,
            x_min: to_index(px_min_x),
            x_max: to_index(px_max_x),
            y_min: to_index(px_min_y),
            y_max: to_index(px_max_y),
        }
    }

    pub fn columns(&self) -> u32 {
        self.x_max - self.x_min + 1
    }

    pub fn rows(&self) -> u32 {
        self.y_max - self.y_min + 1
    }

    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tiles in row-major order (top row first, west to east)
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> {
        let Self { zoom, x_min, x_max, y_min, y_max } = *self;
        (y_min..=y_max).flat_map(move |y| (x_min..=x_max).map(move |x| TileCoord::new(zoom, x, y)))
    }

    /// Top-left pixel of the tile within the mosaic canvas
    pub fn offset_of(&self, tile: TileCoord) -> (u32, u32) {
        ((tile.x - self.x_min) * TILE_SIZE, (tile.y - self.y_min) * TILE_SIZE)
    }
}

/// Sub-window of the mosaic canvas covering exactly the bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Geometry of a tile mosaic for one bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MosaicPlan {
    pub range: TileRange,
    pub window: CropWindow,
}

impl MosaicPlan {
    pub fn new(bbox: &BoundingBox, zoom: u32) -> Self {
        let range = TileRange::covering(bbox, zoom);
        let (px_min_x, px_max_y) = lonlat_to_world_pixel(bbox.lon_min, bbox.lat_min, zoom);
        let (px_max_x, px_min_y) = lonlat_to_world_pixel(bbox.lon_max, bbox.lat_max, zoom);

        let (canvas_width, canvas_height) = (range.columns() * TILE_SIZE, range.rows() * TILE_SIZE);
        let origin_x = (range.x_min * TILE_SIZE) as f64;
        let origin_y = (range.y_min * TILE_SIZE) as f64;

        // Bbox edges rarely fall on tile boundaries; round them to the nearest canvas pixel
        let edge = |px: f64, origin: f64, limit: u32| -> u32 {
            (px - origin).round().clamp(0.0, limit as f64) as u32
        };
        let left = edge(px_min_x, origin_x, canvas_width - 1);
        let top = edge(px_min_y, origin_y, canvas_height - 1);
        let right = edge(px_max_x, origin_x, canvas_width);
        let bottom = edge(px_max_y, origin_y, canvas_height);

        let window = CropWindow {
            left,
            top,
            width: right.saturating_sub(left).max(1),
            height: bottom.saturating_sub(top).max(1),
        };

        Self { range, window }
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.range.columns() * TILE_SIZE, self.range.rows() * TILE_SIZE)
    }

    /// Output pixel where the mosaic path actually draws a point once the
    /// canvas has been cropped and resampled to `width` x `height`
    pub fn output_position(&self, lon: f64, lat: f64, width: u32, height: u32) -> (f64, f64) {
        let (px, py) = lonlat_to_world_pixel(lon, lat, self.range.zoom);
        let crop_x = px - (self.range.x_min * TILE_SIZE + self.window.left) as f64;
        let crop_y = py - (self.range.y_min * TILE_SIZE + self.window.top) as f64;
        (
            crop_x * width as f64 / self.window.width as f64,
            crop_y * height as f64 / self.window.height as f64,
        )
    }
}

/// How the base map was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseMapSource {
    Static,
    TileMosaic { tiles: usize, failed: usize },
}

/// Base-map raster plus the transform used to place points on it
#[derive(Debug, Clone)]
pub struct BaseMap {
    pub image: RgbImage,
    pub transform: RasterTransform,
    pub source: BaseMapSource,
}

/// Obtains the base map for a render pass
pub struct BaseMapAcquirer<'a, P: MapProvider + ?Sized> {
    provider: &'a P,
    zoom: u32,
    tile_delay: Duration,
}

impl<'a, P: MapProvider + ?Sized> BaseMapAcquirer<'a, P> {
    pub fn new(provider: &'a P, zoom: u32, tile_delay: Duration) -> Self {
        Self { provider, zoom, tile_delay }
    }

    /// Try the static image first and fall back to the tile mosaic.
    /// Only a failure of both paths is returned as an error.
    pub fn acquire(&self, bbox: &BoundingBox, width: u32, height: u32) -> StatusOr<BaseMap> {
        if width == 0 || height == 0 {
            return Err(MapError::BaseMapUnavailable(format!(
                "output size {}x{} is empty", width, height)));
        }

        match self.acquire_static(bbox, width, height) {
            Ok(base_map) => Ok(base_map),
            Err(err) => {
                warn!("Static base map failed: {}. Falling back to tiles", err);
                self.acquire_mosaic(bbox, width, height)
            }
        }
    }

    pub fn acquire_static(&self, bbox: &BoundingBox, width: u32, height: u32) -> StatusOr<BaseMap> {
        let mut image = self.provider.fetch_static(bbox, width, height)?;
        if image.dimensions() != (width, height) {
            debug!("Static map came back {:?}, resizing to {}x{}", image.dimensions(), width, height);
            image = imageops::resize(&image, width, height, FilterType::Lanczos3);
        }

        info!("Using static base map");
        Ok(BaseMap {
            image,
            transform: RasterTransform::from_bbox(bbox, width, height),
            source: BaseMapSource::Static,
        })
    }

    /// Download, paste, crop and resample the tiles covering the bounding box
    pub fn acquire_mosaic(&self, bbox: &BoundingBox, width: u32, height: u32) -> StatusOr<BaseMap> {
        if self.zoom > MAX_ZOOM {
            return Err(MapError::BaseMapUnavailable(format!(
                "zoom {} is above the maximum of {}", self.zoom, MAX_ZOOM)));
        }

        let plan = MosaicPlan::new(bbox, self.zoom);
        let total = plan.range.len();
        if total > MAX_MOSAIC_TILES {
            return Err(MapError::MosaicTooLarge { tiles: total, limit: MAX_MOSAIC_TILES });
        }
        info!("Building mosaic from {} tiles ({}x{}) at zoom {}",
            total, plan.range.columns(), plan.range.rows(), self.zoom);

        let (canvas_width, canvas_height) = plan.canvas_size();
        let mut canvas = RgbImage::from_pixel(canvas_width, canvas_height, CANVAS_FILL);
        let mut failed = 0;

        for (i, tile) in plan.range.iter().enumerate() {
            if i > 0 && !self.tile_delay.is_zero() {
                thread::sleep(self.tile_delay);
            }

            let tile_image = match self.provider.fetch_tile(tile) {
                Ok(image) if image.dimensions() == (TILE_SIZE, TILE_SIZE) => image,
                Ok(image) => imageops::resize(&image, TILE_SIZE, TILE_SIZE, FilterType::Triangle),
                Err(err) => {
                    warn!("Tile {} failed: {}", tile.key(), err);
                    failed += 1;
                    placeholder_tile()
                }
            };

            let (dx, dy) = plan.range.offset_of(tile);
            imageops::replace(&mut canvas, &tile_image, dx as i64, dy as i64);
        }

        if failed == total {
            return Err(MapError::BaseMapUnavailable(format!("all {} tiles failed", total)));
        }

        let window = plan.window;
        let cropped = imageops::crop_imm(&canvas, window.left, window.top, window.width, window.height)
            .to_image();
        let image = imageops::resize(&cropped, width, height, FilterType::Lanczos3);

        Ok(BaseMap {
            image,
            transform: RasterTransform::from_bbox(bbox, width, height),
            source: BaseMapSource::TileMosaic { tiles: total, failed },
        })
    }
}

/// Light-gray tile crossed by two diagonals, standing in for a failed download
pub fn placeholder_tile() -> RgbImage {
    let mut tile = RgbImage::from_pixel(TILE_SIZE, TILE_SIZE, PLACEHOLDER_FILL);
    let size = TILE_SIZE as f32;
    draw_line_segment_mut(&mut tile, (0.0, 0.0), (size, size), PLACEHOLDER_LINE);
    draw_line_segment_mut(&mut tile, (0.0, size), (size, 0.0), PLACEHOLDER_LINE);
    tile
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::f64::consts::PI;
    use std::time::Instant;

    /// Provider whose static endpoint can be switched off and whose tiles are
    /// solid colors derived from their index
    struct FakeProvider {
        static_ok: bool,
        failing_tiles: HashSet<(u32, u32)>,
        static_calls: Cell<usize>,
        tile_calls: RefCell<Vec<TileCoord>>,
        tile_times: RefCell<Vec<Instant>>,
    }

    impl FakeProvider {
        fn new(static_ok: bool) -> Self {
            Self {
                static_ok,
                failing_tiles: HashSet::new(),
                static_calls: Cell::new(0),
                tile_calls: RefCell::new(Vec::new()),
                tile_times: RefCell::new(Vec::new()),
            }
        }
    }

    fn tile_color(x: u32, y: u32) -> Rgb<u8> {
        Rgb([(x % 256) as u8, (y % 256) as u8, 77])
    }

    impl MapProvider for FakeProvider {
        fn fetch_static(&self, _bbox: &BoundingBox, width: u32, height: u32) -> StatusOr<RgbImage> {
            self.static_calls.set(self.static_calls.get() + 1);
            if self.static_ok {
                Ok(RgbImage::from_pixel(width, height, Rgb([10, 20, 30])))
            } else {
                Err(MapError::HttpStatus { status: 503, url: "static".to_string() })
            }
        }

        fn fetch_tile(&self, tile: TileCoord) -> StatusOr<RgbImage> {
            self.tile_calls.borrow_mut().push(tile);
            self.tile_times.borrow_mut().push(Instant::now());
            if self.failing_tiles.contains(&(tile.x, tile.y)) {
                return Err(MapError::HttpStatus { status: 404, url: tile.key() });
            }
            Ok(RgbImage::from_pixel(TILE_SIZE, TILE_SIZE, tile_color(tile.x, tile.y)))
        }
    }

    /// Inverse of the tile formula for fractional tile coordinates
    fn tile_point_lonlat(x: f64, y: f64, zoom: u32) -> (f64, f64) {
        let n = 2f64.powi(zoom as i32);
        let lon = x / n * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
        (lon, lat)
    }

    #[test]
    fn test_tile_range_for_balearic_islands() {
        let range = TileRange::covering(&BoundingBox::balearic_islands(), 8);
        assert_eq!((range.x_min, range.x_max), (128, 131));
        assert_eq!((range.y_min, range.y_max), (96, 98));
        assert_eq!(range.len(), 12);
    }

    #[test]
    fn test_tile_range_single_tile() {
        let bbox = BoundingBox::new(39.4, 39.5, 2.5, 2.6).unwrap();
        let range = TileRange::covering(&bbox, 8);
        assert_eq!(range.len(), 1);
        assert_eq!(range.iter().next(), Some(TileCoord::new(8, 129, 97)));
    }

    #[test]
    fn test_tile_range_is_row_major() {
        let range = TileRange { zoom: 3, x_min: 1, x_max: 2, y_min: 4, y_max: 5 };
        let order: Vec<(u32, u32)> = range.iter().map(|t| (t.x, t.y)).collect();
        assert_eq!(order, vec![(1, 4), (2, 4), (1, 5), (2, 5)]);
    }

    #[test]
    fn test_static_path_used_when_available() {
        let provider = FakeProvider::new(true);
        let acquirer = BaseMapAcquirer::new(&provider, 8, Duration::ZERO);
        let bbox = BoundingBox::balearic_islands();

        let base_map = acquirer.acquire(&bbox, 1200, 800).unwrap();
        assert_eq!(base_map.source, BaseMapSource::Static);
        assert_eq!(base_map.image.dimensions(), (1200, 800));
        assert_eq!(base_map.transform, RasterTransform::from_bbox(&bbox, 1200, 800));
        assert!(provider.tile_calls.borrow().is_empty(), "No tiles should be fetched");
    }

    #[test]
    fn test_static_failure_falls_back_to_mosaic_once() {
        let provider = FakeProvider::new(false);
        let acquirer = BaseMapAcquirer::new(&provider, 8, Duration::ZERO);
        let bbox = BoundingBox::balearic_islands();

        let base_map = acquirer.acquire(&bbox, 1200, 800).unwrap();
        assert_eq!(provider.static_calls.get(), 1);
        assert_eq!(base_map.source, BaseMapSource::TileMosaic { tiles: 12, failed: 0 });
        assert_eq!(base_map.image.dimensions(), (1200, 800));

        // Every tile of the covering range, each exactly once
        let calls = provider.tile_calls.borrow();
        let expected: Vec<TileCoord> = TileRange::covering(&bbox, 8).iter().collect();
        assert_eq!(*calls, expected);

        // The transform does not depend on the path taken
        assert_eq!(base_map.transform, RasterTransform::from_bbox(&bbox, 1200, 800));
    }

    #[test]
    fn test_tile_fetches_are_spaced_by_delay() {
        let delay = Duration::from_millis(50);
        let provider = FakeProvider::new(false);
        let acquirer = BaseMapAcquirer::new(&provider, 8, delay);

        let start = Instant::now();
        acquirer.acquire(&BoundingBox::balearic_islands(), 1200, 800).unwrap();

        let times = provider.tile_times.borrow();
        assert_eq!(times.len(), 12);
        assert!(times[0] - start < delay, "No pause before the first tile");
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= delay, "Tiles fetched {:?} apart", pair[1] - pair[0]);
        }
    }

    #[test]
    fn test_failed_tiles_become_placeholders() {
        let mut provider = FakeProvider::new(false);
        provider.failing_tiles.insert((129, 97));
        let acquirer = BaseMapAcquirer::new(&provider, 8, Duration::ZERO);
        let bbox = BoundingBox::balearic_islands();

        let base_map = acquirer.acquire(&bbox, 1200, 800).unwrap();
        assert_eq!(base_map.source, BaseMapSource::TileMosaic { tiles: 12, failed: 1 });

        // Upper middle of the tile, clear of the placeholder's diagonals
        let (lon, lat) = tile_point_lonlat(129.5, 97.2, 8);
        let (x, y) = base_map.transform.project_pixel(lon, lat);
        let pixel = base_map.image.get_pixel(x as u32, y as u32);
        assert!(pixel[0].abs_diff(230) <= 1 && pixel[2].abs_diff(230) <= 1,
            "Expected placeholder gray, got {:?}", pixel);
    }

    #[test]
    fn test_all_tiles_failing_is_fatal() {
        let mut provider = FakeProvider::new(false);
        let range = TileRange::covering(&BoundingBox::balearic_islands(), 8);
        for tile in range.iter() {
            provider.failing_tiles.insert((tile.x, tile.y));
        }
        let acquirer = BaseMapAcquirer::new(&provider, 8, Duration::ZERO);

        let result = acquirer.acquire(&BoundingBox::balearic_islands(), 1200, 800);
        assert!(matches!(result, Err(MapError::BaseMapUnavailable(_))));
    }

    #[test]
    fn test_oversized_mosaic_is_refused() {
        let provider = FakeProvider::new(false);
        let acquirer = BaseMapAcquirer::new(&provider, 14, Duration::ZERO);

        let result = acquirer.acquire(&BoundingBox::balearic_islands(), 1200, 800);
        assert!(matches!(result, Err(MapError::MosaicTooLarge { .. })));
        assert!(provider.tile_calls.borrow().is_empty());
    }

    #[test]
    fn test_mosaic_pixels_match_projection() {
        let provider = FakeProvider::new(false);
        let acquirer = BaseMapAcquirer::new(&provider, 8, Duration::ZERO);
        let base_map = acquirer.acquire(&BoundingBox::balearic_islands(), 1200, 800).unwrap();

        // Points well clear of any seam, so the resampled color is the tile's own
        let samples = [(129, 97, 0.5, 0.5), (130, 97, 0.5, 0.5), (128, 97, 0.9, 0.5),
            (131, 97, 0.1, 0.5), (129, 98, 0.5, 0.1), (130, 96, 0.5, 0.8)];
        for &(x, y, fx, fy) in &samples {
            let (lon, lat) = tile_point_lonlat(x as f64 + fx, y as f64 + fy, 8);
            let (px, py) = base_map.transform.project_pixel(lon, lat);
            assert!(base_map.transform.contains_pixel(px, py));
            let pixel = *base_map.image.get_pixel(px as u32, py as u32);
            let expected = tile_color(x, y);
            for channel in 0..3 {
                assert!(pixel[channel].abs_diff(expected[channel]) <= 1,
                    "tile ({}, {}) expected {:?} got {:?}", x, y, expected, pixel);
            }
        }
    }

    #[test]
    fn test_path_independence() {
        let bbox = BoundingBox::balearic_islands();
        let (width, height) = (1200, 800);
        let plan = MosaicPlan::new(&bbox, 8);
        let transform = RasterTransform::from_bbox(&bbox, width, height);

        // Half a source pixel at each crop edge, scaled up to output pixels
        let tolerance_x = 1.5 * width as f64 / plan.window.width as f64;
        let tolerance_y = 1.5 * height as f64 / plan.window.height as f64;

        for i in 0..=10 {
            for j in 0..=10 {
                let lon = bbox.lon_min + (bbox.lon_max - bbox.lon_min) * i as f64 / 10.0;
                let lat = bbox.lat_min + (bbox.lat_max - bbox.lat_min) * j as f64 / 10.0;
                let (sx, sy) = transform.project(lon, lat);
                let (mx, my) = plan.output_position(lon, lat, width, height);
                assert!((sx - mx).abs() <= tolerance_x, "x differs at ({}, {}): {} vs {}", lon, lat, sx, mx);
                assert!((sy - my).abs() <= tolerance_y, "y differs at ({}, {}): {} vs {}", lon, lat, sy, my);
            }
        }
    }

    #[test]
    fn test_crop_window_inside_canvas() {
        let plan = MosaicPlan::new(&BoundingBox::balearic_islands(), 8);
        let (canvas_width, canvas_height) = plan.canvas_size();
        assert_eq!((canvas_width, canvas_height), (1024, 768));
        assert_eq!(plan.window.left, 182); // 0.7111 * 256
        assert_eq!(plan.window.top, 187); // 0.7303 * 256
        assert!(plan.window.left + plan.window.width <= canvas_width);
        assert!(plan.window.top + plan.window.height <= canvas_height);
    }

    #[test]
    fn test_placeholder_tile() {
        let tile = placeholder_tile();
        assert_eq!(tile.dimensions(), (TILE_SIZE, TILE_SIZE));
        assert_eq!(*tile.get_pixel(0, 0), PLACEHOLDER_LINE);
        assert_eq!(*tile.get_pixel(10, 200), PLACEHOLDER_FILL);
    }
}
