//! Piecewise-linear value to color mapping.

use std::fs;
use std::path::Path;

use image::Rgb;
use serde::Deserialize;

use crate::{MapError, StatusOr};

/// Color used for locations without an observation
pub const NO_DATA_COLOR: Rgb<u8> = Rgb([200, 200, 200]);

/// A calibration point of the gradient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub value: f64,
    pub color: Rgb<u8>,
}

impl ColorStop {
    pub const fn new(value: f64, r: u8, g: u8, b: u8) -> Self {
        Self { value, color: Rgb([r, g, b]) }
    }
}

/// Temperature palette in degrees Celsius: purple through blue, green,
/// yellow, orange and red to fuchsia
const TEMPERATURE_STOPS: [ColorStop; 20] = [
    ColorStop::new(-10.0, 132, 0, 168),
    ColorStop::new(-5.0, 44, 0, 184),
    ColorStop::new(0.0, 0, 90, 200),
    ColorStop::new(3.0, 0, 150, 200),
    ColorStop::new(6.0, 0, 180, 170),
    ColorStop::new(9.0, 0, 200, 120),
    ColorStop::new(12.0, 80, 200, 60),
    ColorStop::new(15.0, 150, 200, 0),
    ColorStop::new(18.0, 200, 180, 0),
    ColorStop::new(21.0, 230, 150, 0),
    ColorStop::new(24.0, 240, 120, 0),
    ColorStop::new(27.0, 240, 90, 0),
    ColorStop::new(30.0, 240, 60, 0),
    ColorStop::new(33.0, 230, 30, 0),
    ColorStop::new(36.0, 220, 0, 0),
    ColorStop::new(39.0, 220, 0, 40),
    ColorStop::new(42.0, 230, 0, 100),
    ColorStop::new(45.0, 240, 0, 150),
    ColorStop::new(47.0, 250, 0, 180),
    ColorStop::new(50.0, 255, 0, 220),
];

/// Ordered, immutable set of color stops
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    stops: Vec<ColorStop>,
}

impl Gradient {
    /// Build a gradient. Stops must be finite and strictly increasing.
    pub fn new(stops: Vec<ColorStop>) -> StatusOr<Self> {
        if stops.is_empty() {
            return Err(MapError::InvalidGradient("at least one stop is required".to_string()));
        }
        if let Some(stop) = stops.iter().find(|s| !s.value.is_finite()) {
            return Err(MapError::InvalidGradient(format!("stop value {} is not finite", stop.value)));
        }
        for pair in stops.windows(2) {
            if pair[1].value <= pair[0].value {
                return Err(MapError::InvalidGradient(format!(
                    "stops must increase strictly, found {} after {}", pair[1].value, pair[0].value)));
            }
        }

        Ok(Self { stops })
    }

    /// The built-in temperature palette, -10 to 50 degrees Celsius
    pub fn temperature() -> Self {
        Self { stops: TEMPERATURE_STOPS.to_vec() }
    }

    /// Load stops from a JSON array of `{"value": 12.0, "color": "#50c83c"}`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> StatusOr<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> StatusOr<Self> {
        #[derive(Deserialize)]
        struct StopEntry {
            value: f64,
            color: String,
        }

        let entries: Vec<StopEntry> = serde_json::from_str(text)?;
        let stops = entries
            .into_iter()
            .map(|entry| Ok(ColorStop { value: entry.value, color: parse_hex_color(&entry.color)? }))
            .collect::<StatusOr<Vec<_>>>()?;
        Self::new(stops)
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Lowest and highest stop values; inputs are clamped to this range
    pub fn domain(&self) -> (f64, f64) {
        (self.stops[0].value, self.stops[self.stops.len() - 1].value)
    }

    /// Map a value to a color. Absent values get the neutral gray.
    pub fn value_to_color(&self, value: Option<f64>) -> Rgb<u8> {
        let Some(value) = value else {
            return NO_DATA_COLOR;
        };

        let (low, high) = self.domain();
        let value = value.clamp(low, high);

        // First bracketing pair wins, so shared boundaries are unambiguous
        for pair in self.stops.windows(2) {
            let (t0, t1) = (pair[0].value, pair[1].value);
            if t0 <= value && value <= t1 {
                let f = if t1 == t0 { 0.0 } else { (value - t0) / (t1 - t0) };
                return interpolate(pair[0].color, pair[1].color, f);
            }
        }

        self.stops[self.stops.len() - 1].color
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self::temperature()
    }
}

/// Blend two colors channel by channel, rounding to the nearest integer
fn interpolate(c0: Rgb<u8>, c1: Rgb<u8>, f: f64) -> Rgb<u8> {
    let channel = |a: u8, b: u8| -> u8 {
        let v = a as f64 + f * (b as f64 - a as f64);
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgb([
        channel(c0[0], c1[0]),
        channel(c0[1], c1[1]),
        channel(c0[2], c1[2]),
    ])
}

/// Parse "#rrggbb" (the leading '#' is optional)
pub fn parse_hex_color(text: &str) -> StatusOr<Rgb<u8>> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(MapError::InvalidGradient(format!("'{}' is not a #rrggbb color", text)));
    }

    let mut rgb = [0u8; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        *channel = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| MapError::InvalidGradient(format!("'{}' is not a #rrggbb color", text)))?;
    }
    Ok(Rgb(rgb))
}
