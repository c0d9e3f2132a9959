//! One render pass: base map, title bar, location badges and legend.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
};
use imageproc::rect::Rect;
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::basemap::{BaseMapAcquirer, BaseMapSource, MapProvider, DEFAULT_ZOOM};
use crate::gradient::Gradient;
use crate::label::{BadgeStyle, LabelPlacer, Placement};
use crate::model::{balearic_locations, balearic_principal_locations, Location};
use crate::projection::BoundingBox;
use crate::weather::{ObservationQuery, WeatherSource};
use crate::{MapError, StatusOr};

pub mod legend;
pub mod text;

use legend::{draw_legend, LegendLayout};
use text::TextPainter;

const TITLE_BAR_HEIGHT: i32 = 50;
const TITLE_COLOR: Rgb<u8> = Rgb([13, 71, 161]);
const TIMESTAMP_COLOR: Rgb<u8> = Rgb([38, 50, 56]);
const TITLE_SIZE: f32 = 28.0;
const TIMESTAMP_SIZE: f32 = 16.0;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const SHADOW: Rgb<u8> = Rgb([120, 120, 120]);
const BORDER: Rgb<u8> = Rgb([40, 40, 40]);

/// Locations projecting further than this many canvas sizes outside the
/// canvas are skipped
const GUARD_BAND: f64 = 1.0;

/// Label text for a temperature, or the no-data label
pub fn format_temperature(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}°C", v),
        None => "Sin datos".to_string(),
    }
}

/// Everything that distinguishes one map product from another
#[derive(Debug, Clone)]
pub struct MapSpec {
    pub title: String,
    pub timestamp: String,
    pub query: ObservationQuery,
    pub badge: BadgeStyle,
    pub locations: Vec<Location>,
    pub format_label: fn(Option<f64>) -> String,
    /// Distance of the timestamp from the right edge
    pub timestamp_inset: i32,
    /// Shift of the legend caption left of the strip center
    pub caption_offset: i32,
}

impl MapSpec {
    /// Current temperatures for every built-in location
    pub fn current<Tz: TimeZone>(now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            title: "Meteo de les Illes - Mapa actual".to_string(),
            timestamp: now.format("%d/%m/%Y %H:%M").to_string(),
            query: ObservationQuery::Current,
            badge: BadgeStyle::standard(),
            locations: balearic_locations(),
            format_label: format_temperature,
            timestamp_inset: 240,
            caption_offset: 40,
        }
    }

    /// Today's minimum or maximum for the principal towns
    pub fn daily<Tz: TimeZone>(query: ObservationQuery, now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let kind = match query {
            ObservationQuery::DailyMin => "mínimas",
            _ => "máximas",
        };
        Self {
            title: format!("Meteo de les Illes - Temperaturas {}", kind),
            timestamp: now.format("%d/%m/%Y").to_string(),
            query,
            badge: BadgeStyle::compact(),
            locations: balearic_principal_locations(),
            format_label: format_temperature,
            timestamp_inset: 220,
            caption_offset: 50,
        }
    }

    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = locations;
        self
    }
}

/// Canvas and base-map settings shared by every map of a run
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub zoom: u32,
    pub tile_delay: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            bbox: BoundingBox::balearic_islands(),
            width: 1200,
            height: 800,
            zoom: DEFAULT_ZOOM,
            tile_delay: Duration::from_millis(200),
        }
    }
}

/// Summary of a finished render pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderReport {
    pub source: BaseMapSource,
    /// Names of locations whose badge was drawn, in drawing order
    pub accepted: Vec<String>,
    /// Names of locations dropped because their badge overlapped
    pub rejected: Vec<String>,
    /// Names of locations skipped for projecting far off the canvas
    pub off_canvas: Vec<String>,
    /// Locations rendered without a value
    pub missing: usize,
}

pub struct Renderer<'a> {
    provider: &'a dyn MapProvider,
    weather: &'a dyn WeatherSource,
    painter: &'a TextPainter,
    gradient: &'a Gradient,
    legend: LegendLayout,
    settings: RenderSettings,
}

impl<'a> Renderer<'a> {
    pub fn new(
        provider: &'a dyn MapProvider,
        weather: &'a dyn WeatherSource,
        painter: &'a TextPainter,
        gradient: &'a Gradient,
        settings: RenderSettings,
    ) -> Self {
        Self {
            provider,
            weather,
            painter,
            gradient,
            legend: LegendLayout::temperature(),
            settings,
        }
    }

    pub fn with_legend(mut self, legend: LegendLayout) -> Self {
        self.legend = legend;
        self
    }

    /// Render one map. Fails only when no base map can be obtained.
    pub fn render(&self, spec: &MapSpec) -> StatusOr<(RgbImage, RenderReport)> {
        let settings = &self.settings;
        let acquirer = BaseMapAcquirer::new(self.provider, settings.zoom, settings.tile_delay);
        let base_map = acquirer.acquire(&settings.bbox, settings.width, settings.height)?;
        let transform = base_map.transform;
        let mut image = base_map.image;

        let (title, timestamp) = (&spec.title, &spec.timestamp);
        draw_title_bar(&mut image, title, timestamp, spec.timestamp_inset, self.painter);

        info!("Adding {} locations", spec.locations.len());
        let mut placer = LabelPlacer::new(settings.width, spec.badge);
        let measure = self.painter.measure_at(spec.badge.font_size);
        let mut report = RenderReport {
            source: base_map.source,
            accepted: Vec::new(),
            rejected: Vec::new(),
            off_canvas: Vec::new(),
            missing: 0,
        };

        for location in &spec.locations {
            let (px, py) = transform.project(location.lon, location.lat);
            if !within_guard_band(px, py, settings.width, settings.height) {
                warn!(
                    "Skipping {}: projects far off the canvas at ({:.0}, {:.0})",
                    location.name, px, py
                );
                report.off_canvas.push(location.name.clone());
                continue;
            }
            let (x, y) = transform.project_pixel(location.lon, location.lat);
            if !transform.contains_pixel(x, y) {
                debug!("{} projects off the canvas at ({}, {})", location.name, x, y);
            }

            let value = self.weather.observe(location, spec.query).value();
            if value.is_none() {
                report.missing += 1;
            }
            let color = self.gradient.value_to_color(value);
            let label = (spec.format_label)(value);
            let label = self.painter.prepare(&label);

            match placer.try_place(x, y, &label, &measure) {
                Some(placement) => {
                    draw_badge(&mut image, &placement, &label, color, &spec.badge, self.painter);
                    report.accepted.push(location.name.clone());
                }
                None => {
                    debug!("Skipping {}: badge overlaps an earlier one", location.name);
                    report.rejected.push(location.name.clone());
                }
            }
        }
        info!(
            "Placed {} badges, skipped {} overlapping",
            report.accepted.len(),
            report.rejected.len()
        );

        let legend = LegendLayout { caption_offset: spec.caption_offset, ..self.legend.clone() };
        draw_legend(&mut image, self.gradient, &legend, self.painter);
        Ok((image, report))
    }
}

fn within_guard_band(x: f64, y: f64, width: u32, height: u32) -> bool {
    let (width, height) = (width as f64, height as f64);
    x.is_finite()
        && y.is_finite()
        && x >= -GUARD_BAND * width
        && x <= (1.0 + GUARD_BAND) * width
        && y >= -GUARD_BAND * height
        && y <= (1.0 + GUARD_BAND) * height
}

/// Rectangle from inclusive corner pixels; None when empty
pub(crate) fn inclusive_rect(left: i32, top: i32, right: i32, bottom: i32) -> Option<Rect> {
    if right < left || bottom < top {
        return None;
    }
    Some(Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32))
}

/// White band across the top with the title and timestamp
pub fn draw_title_bar(
    image: &mut RgbImage,
    title: &str,
    timestamp: &str,
    timestamp_inset: i32,
    painter: &TextPainter,
) {
    let width = image.width() as i32;
    if let Some(bar) = inclusive_rect(0, 0, width, TITLE_BAR_HEIGHT) {
        draw_filled_rect_mut(image, bar, WHITE);
    }
    painter.draw(image, title, 20, 12, TITLE_SIZE, TITLE_COLOR);
    painter.draw(image, timestamp, width - timestamp_inset, 16, TIMESTAMP_SIZE, TIMESTAMP_COLOR);
}

/// Marker dot at the anchor and a shadowed, bordered badge with the label
pub fn draw_badge(
    image: &mut RgbImage,
    placement: &Placement,
    label: &str,
    color: Rgb<u8>,
    style: &BadgeStyle,
    painter: &TextPainter,
) {
    draw_filled_circle_mut(image, placement.anchor, style.marker_radius, color);
    draw_hollow_circle_mut(image, placement.anchor, style.marker_radius, WHITE);

    let badge = placement.badge;
    let shadow = style.shadow_offset;
    if let Some(rect) = inclusive_rect(
        badge.left + shadow,
        badge.top + shadow,
        badge.right + shadow,
        badge.bottom + shadow,
    ) {
        draw_filled_rect_mut(image, rect, SHADOW);
    }
    if let Some(rect) = inclusive_rect(badge.left, badge.top, badge.right, badge.bottom) {
        draw_filled_rect_mut(image, rect, color);
    }
    // Border grows inward
    for inset in 0..style.border_width {
        if let Some(rect) = inclusive_rect(
            badge.left + inset,
            badge.top + inset,
            badge.right - inset,
            badge.bottom - inset,
        ) {
            draw_hollow_rect_mut(image, rect, BORDER);
        }
    }

    painter.draw(
        image,
        label,
        badge.left + style.text_inset,
        badge.top + style.vertical_padding,
        style.font_size,
        BLACK,
    );
}

/// Write the image as PNG. The file appears only once fully written.
pub fn save_png<P: AsRef<Path>>(image: &RgbImage, path: P) -> StatusOr<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        PngEncoder::new(&mut writer).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgb8,
        )?;
        writer.flush()?;
    }
    file.persist(path).map_err(|err| MapError::IoError(err.error))?;

    info!("Map saved to {}", path.display());
    Ok(())
}
