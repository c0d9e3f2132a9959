use std::time::Duration;

use image::RgbImage;
use log::{debug, info};
use reqwest::blocking::Client;

use crate::basemap::{MapProvider, TileCoord};
use crate::projection::BoundingBox;
use crate::{MapError, StatusOr};

/// Settings shared by every remote call of a run
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Identifying client agent, required by the tile provider's usage policy
    pub user_agent: String,
    /// Static map endpoint taking bbox, size and maptype parameters
    pub static_url: String,
    /// Map style requested from the static endpoint
    pub static_style: String,
    /// Tile URL with {z}, {x} and {y} placeholders
    pub tile_url: String,
    /// Forecast endpoint of the weather service
    pub weather_url: String,
    /// Timezone the weather service reports daily values in
    pub timezone: String,
    pub static_timeout: Duration,
    pub tile_timeout: Duration,
    pub weather_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            user_agent: "MeteoDeLesIlles/1.0 (contacto: soporte@meteodelesilles.local)".to_string(),
            static_url: "https://staticmap.openstreetmap.de/staticmap.php".to_string(),
            static_style: "mapnik".to_string(),
            tile_url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            weather_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timezone: "Europe/Madrid".to_string(),
            static_timeout: Duration::from_secs(25),
            tile_timeout: Duration::from_secs(15),
            weather_timeout: Duration::from_secs(15),
        }
    }
}

impl ProviderConfig {
    /// Expand the tile URL template for one tile
    pub fn tile_url_for(&self, tile: TileCoord) -> String {
        self.tile_url
            .replace("{z}", &tile.zoom.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }
}

/// Blocking HTTP client for the base-map and weather services
pub struct Downloader {
    client: Client,
    config: ProviderConfig,
}

impl Downloader {
    /// Create a downloader; the user agent is sent with every request
    pub fn new(config: ProviderConfig) -> StatusOr<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// GET a URL and return the body, failing on transport errors and non-success statuses
    pub fn get_bytes(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> StatusOr<Vec<u8>> {
        debug!("GET {} {:?}", url, query);
        let response = self.client.get(url)
            .query(query)
            .timeout(timeout)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(MapError::HttpStatus { status: status.as_u16(), url: url.to_string() });
        }

        let data = response.bytes()?;
        Ok(data.to_vec())
    }
}

impl MapProvider for Downloader {
    fn fetch_static(&self, bbox: &BoundingBox, width: u32, height: u32) -> StatusOr<RgbImage> {
        info!("Requesting static base map from {}", self.config.static_url);
        let query = [
            ("bbox", bbox.to_query_string()),
            ("size", format!("{}x{}", width, height)),
            ("maptype", self.config.static_style.clone()),
        ];
        let data = self.get_bytes(&self.config.static_url, &query, self.config.static_timeout)?;
        Ok(image::load_from_memory(&data)?.to_rgb8())
    }

    fn fetch_tile(&self, tile: TileCoord) -> StatusOr<RgbImage> {
        let url = self.config.tile_url_for(tile);
        let data = self.get_bytes(&url, &[], self.config.tile_timeout)?;
        Ok(image::load_from_memory(&data)?.to_rgb8())
    }
}
