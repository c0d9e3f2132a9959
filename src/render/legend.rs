use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use log::warn;

use super::text::TextPainter;
use super::inclusive_rect;
use crate::gradient::Gradient;

const PANEL_FILL: Rgb<u8> = Rgb([255, 255, 255]);
const PANEL_OUTLINE: Rgb<u8> = Rgb([180, 180, 180]);
const INK: Rgb<u8> = Rgb([40, 40, 40]);

/// Geometry and calibration of the color legend along the bottom edge
#[derive(Debug, Clone, PartialEq)]
pub struct LegendLayout {
    pub height: i32,
    pub bottom_margin: i32,
    pub side_margin: i32,
    /// Panel padding around the strip
    pub padding: i32,
    pub strip_height: i32,
    pub tick_length: i32,
    pub segments: u32,
    pub min_value: f64,
    pub max_value: f64,
    pub ticks: Vec<f64>,
    pub caption: String,
    /// Shift of the caption left of the strip center
    pub caption_offset: i32,
    pub label_size: f32,
}

impl LegendLayout {
    /// Fixed temperature scale, -10 to 50 degrees
    pub fn temperature() -> Self {
        Self {
            height: 55,
            bottom_margin: 12,
            side_margin: 110,
            padding: 10,
            strip_height: 20,
            tick_length: 4,
            segments: 30,
            min_value: -10.0,
            max_value: 50.0,
            ticks: vec![
                -10.0, -7.0, -5.0, -3.0, 0.0, 3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0, 24.0,
                27.0, 30.0, 33.0, 36.0, 39.0, 42.0, 45.0, 47.0, 50.0,
            ],
            caption: "Temp. °C".to_string(),
            caption_offset: 40,
            label_size: 14.0,
        }
    }

    /// Scale spanning a custom gradient, with a tick at every stop
    pub fn from_gradient(gradient: &Gradient) -> Self {
        let (min_value, max_value) = gradient.domain();
        Self {
            min_value,
            max_value,
            ticks: gradient.stops().iter().map(|s| s.value).collect(),
            ..Self::temperature()
        }
    }

    /// Horizontal pixel of a value on the strip
    pub fn value_x(&self, value: f64, left: i32, right: i32) -> i32 {
        let span = self.max_value - self.min_value;
        if span <= 0.0 {
            return left;
        }
        left + ((value - self.min_value) / span * (right - left) as f64) as i32
    }
}

impl Default for LegendLayout {
    fn default() -> Self {
        Self::temperature()
    }
}

/// Draw the legend panel. Returns false when the canvas is too small for it.
pub fn draw_legend(
    image: &mut RgbImage,
    gradient: &Gradient,
    layout: &LegendLayout,
    painter: &TextPainter,
) -> bool {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let top = height - layout.height - layout.bottom_margin;
    let left = layout.side_margin;
    let right = width - layout.side_margin;

    if right - left < layout.segments as i32 || top - layout.padding < 0 || layout.segments == 0 {
        warn!("Canvas {}x{} is too small for the legend, skipping it", width, height);
        return false;
    }

    let panel_bottom = height - layout.bottom_margin + layout.padding;
    let panel = inclusive_rect(
        left - layout.padding,
        top - layout.padding,
        right + layout.padding,
        panel_bottom,
    );
    if let Some(panel) = panel {
        draw_filled_rect_mut(image, panel, PANEL_FILL);
        draw_hollow_rect_mut(image, panel, PANEL_OUTLINE);
    }

    // Each segment shows the gradient at its midpoint value
    let segments = layout.segments as f64;
    let span = layout.max_value - layout.min_value;
    let segment_width = (right - left) / layout.segments as i32;
    for i in 0..layout.segments {
        let t0 = layout.min_value + span * (i as f64 / segments);
        let t1 = layout.min_value + span * ((i + 1) as f64 / segments);
        let color = gradient.value_to_color(Some((t0 + t1) / 2.0));

        let x0 = left + i as i32 * segment_width;
        let x1 = left + (i as i32 + 1) * segment_width;
        if let Some(rect) = inclusive_rect(x0, top, x1, top + layout.strip_height) {
            draw_filled_rect_mut(image, rect, color);
        }
    }

    let strip_bottom = (top + layout.strip_height) as f32;
    for &tick in &layout.ticks {
        let x = layout.value_x(tick, left, right);
        draw_line_segment_mut(
            image,
            (x as f32, strip_bottom),
            (x as f32, strip_bottom + layout.tick_length as f32),
            INK,
        );
        let label_y = top + layout.strip_height + 6;
        painter.draw(image, &tick.to_string(), x - 8, label_y, layout.label_size, INK);
    }

    let caption_x = (left + right) / 2 - layout.caption_offset;
    painter.draw(image, &layout.caption, caption_x, top - 18, layout.label_size, INK);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::ColorStop;

    #[test]
    fn test_value_x() {
        let layout = LegendLayout::temperature();
        assert_eq!(layout.value_x(-10.0, 110, 1090), 110);
        assert_eq!(layout.value_x(50.0, 110, 1090), 1090);
        assert_eq!(layout.value_x(20.0, 110, 1090), 600);
    }

    #[test]
    fn test_legend_segments_use_gradient_colors() {
        let gradient = Gradient::temperature();
        let layout = LegendLayout::temperature();
        let mut image = RgbImage::from_pixel(1200, 800, Rgb([0, 0, 0]));
        assert!(draw_legend(&mut image, &gradient, &layout, &TextPainter::estimate_only()));

        // Strip spans 110..1090 at rows 733..753, 32 px per segment
        let top = 800 - 55 - 12;
        for i in 0..30 {
            let x = 110 + i * 32 + 16;
            let t0 = -10.0 + 60.0 * (i as f64 / 30.0);
            let t1 = -10.0 + 60.0 * ((i + 1) as f64 / 30.0);
            let mid_value = (t0 + t1) / 2.0;
            assert_eq!(
                *image.get_pixel(x as u32, (top + 10) as u32),
                gradient.value_to_color(Some(mid_value)),
                "segment {}", i);
        }

        // Panel background above the strip
        assert_eq!(*image.get_pixel(600, (top - 5) as u32), PANEL_FILL);
        // Tick mark below the strip at 21 degrees
        assert_eq!(layout.value_x(21.0, 110, 1090), 616);
        assert_eq!(*image.get_pixel(616, (top + 22) as u32), INK);
    }

    #[test]
    fn test_small_canvas_skips_legend() {
        let mut image = RgbImage::from_pixel(200, 60, Rgb([0, 0, 0]));
        let drawn = draw_legend(&mut image, &Gradient::temperature(), &LegendLayout::temperature(),
            &TextPainter::estimate_only());
        assert!(!drawn);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])), "Nothing should be drawn");
    }

    #[test]
    fn test_layout_from_gradient() {
        let stops = vec![ColorStop::new(0.0, 0, 0, 255), ColorStop::new(40.0, 255, 0, 0)];
        let gradient = Gradient::new(stops).unwrap();
        let layout = LegendLayout::from_gradient(&gradient);
        assert_eq!((layout.min_value, layout.max_value), (0.0, 40.0));
        assert_eq!(layout.ticks, vec![0.0, 40.0]);
        assert_eq!(layout.segments, 30);
    }
}
