use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use log::{info, warn};
use rusttype::{Font, Scale};

use crate::label::TextMeasure;
use crate::{MapError, StatusOr};

/// Fonts tried, in order, when no font path is given
const SYSTEM_FONTS: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Advance of one character at 16 px when no font is loaded
const ESTIMATED_CHAR_WIDTH: f32 = 9.0;

/// A loaded TrueType font
pub struct Typeface {
    font: Font<'static>,
}

impl Typeface {
    pub fn load<P: AsRef<Path>>(path: P) -> StatusOr<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let font = Font::try_from_vec(data).ok_or_else(|| {
            MapError::ParseError(format!("{} is not a TrueType font", path.display()))
        })?;
        Ok(Self { font })
    }

    /// Load the given font, or the first system font found when none is given
    pub fn discover(explicit: Option<&Path>) -> Option<Self> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };

        for path in candidates {
            if explicit.is_none() && !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(typeface) => {
                    info!("Using font {}", path.display());
                    return Some(typeface);
                }
                Err(err) => warn!("Could not load font {}: {}", path.display(), err),
            }
        }

        warn!("No usable font found, labels will be sized by estimate and not drawn");
        None
    }

    pub fn text_width(&self, text: &str, size: f32) -> i32 {
        text_size(Scale::uniform(size), &self.font, text).0
    }
}

/// Draws and measures text, optionally folding it to plain ASCII
pub struct TextPainter {
    typeface: Option<Typeface>,
    ascii_only: bool,
}

impl TextPainter {
    pub fn new(typeface: Option<Typeface>, ascii_only: bool) -> Self {
        Self { typeface, ascii_only }
    }

    /// Painter without a font: measures by estimate, draws nothing
    pub fn estimate_only() -> Self {
        Self::new(None, false)
    }

    pub fn has_font(&self) -> bool {
        self.typeface.is_some()
    }

    /// The text as it will be drawn
    pub fn prepare<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.ascii_only {
            Cow::Owned(sanitize_label(text))
        } else {
            Cow::Borrowed(text)
        }
    }

    pub fn text_width(&self, text: &str, size: f32) -> i32 {
        match &self.typeface {
            Some(typeface) => typeface.text_width(text, size),
            None => {
                let per_char = (ESTIMATED_CHAR_WIDTH * size / 16.0).round() as i32;
                text.chars().count() as i32 * per_char
            }
        }
    }

    pub fn draw(
        &self,
        image: &mut RgbImage,
        text: &str,
        x: i32,
        y: i32,
        size: f32,
        color: Rgb<u8>,
    ) {
        if let Some(typeface) = &self.typeface {
            let text = self.prepare(text);
            draw_text_mut(image, color, x, y, Scale::uniform(size), &typeface.font, &text);
        }
    }

    /// Measurer for badge texts at a fixed size
    pub fn measure_at(&self, size: f32) -> SizedMeasure<'_> {
        SizedMeasure { painter: self, size }
    }
}

pub struct SizedMeasure<'a> {
    painter: &'a TextPainter,
    size: f32,
}

impl TextMeasure for SizedMeasure<'_> {
    fn text_width(&self, text: &str) -> i32 {
        self.painter.text_width(text, self.size)
    }
}

/// Fold accented Latin letters to ASCII and spell degrees as " C",
/// for fonts without Latin-1 coverage. Covers every Latin-1 Supplement and
/// Latin Extended-A letter that decomposes to an ASCII base plus accents;
/// letters without such a decomposition (ß, Æ, Ø, Ł) pass through.
pub fn sanitize_label(text: &str) -> String {
    let text = text.replace("°C", " C").replace("ºC", " C");
    text.chars()
        .filter(|c| *c != '°' && *c != 'º')
        .map(fold_diacritic)
        .collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'Ç' | 'Ć' | 'Ĉ' | 'Ċ' | 'Č' => 'C',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'Ď' => 'D',
        'ď' => 'd',
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => 'E',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'Ĝ' | 'Ğ' | 'Ġ' | 'Ģ' => 'G',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'Ĥ' => 'H',
        'ĥ' => 'h',
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ĩ' | 'Ī' | 'Ĭ' | 'Į' | 'İ' => 'I',
        'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' => 'i',
        'Ĵ' => 'J',
        'ĵ' => 'j',
        'Ķ' => 'K',
        'ķ' => 'k',
        'Ĺ' | 'Ļ' | 'Ľ' => 'L',
        'ĺ' | 'ļ' | 'ľ' => 'l',
        'Ñ' | 'Ń' | 'Ņ' | 'Ň' => 'N',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ō' | 'Ŏ' | 'Ő' => 'O',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ō' | 'ŏ' | 'ő' => 'o',
        'Ŕ' | 'Ŗ' | 'Ř' => 'R',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'Ś' | 'Ŝ' | 'Ş' | 'Š' => 'S',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'Ţ' | 'Ť' => 'T',
        'ţ' | 'ť' => 't',
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ũ' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => 'U',
        'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'Ŵ' => 'W',
        'ŵ' => 'w',
        'Ý' | 'Ŷ' | 'Ÿ' => 'Y',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'Ź' | 'Ż' | 'Ž' => 'Z',
        'ź' | 'ż' | 'ž' => 'z',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("Calvià"), "Calvia");
        assert_eq!(sanitize_label("Santa Eulària"), "Santa Eularia");
        assert_eq!(sanitize_label("Temperaturas mínimas"), "Temperaturas minimas");
        assert_eq!(sanitize_label("21.5°C"), "21.5 C");
        assert_eq!(sanitize_label("21.5ºC"), "21.5 C");
        assert_eq!(sanitize_label("Temp. °C"), "Temp.  C");
        assert_eq!(sanitize_label("Maó 3°"), "Mao 3");
    }

    #[test]
    fn test_sanitize_label_beyond_catalan_and_spanish() {
        assert_eq!(sanitize_label("Ýdre Ÿvoir"), "Ydre Yvoir");
        assert_eq!(sanitize_label("ýÿśő"), "yyso");
        assert_eq!(sanitize_label("Łódź"), "Łodz", "Ł has no decomposition and is kept");
        assert_eq!(sanitize_label("Straße"), "Straße");
        assert!(sanitize_label("Čeština Dvořák Ñuñoa Gdańsk").is_ascii());
    }

    #[test]
    fn test_estimate_without_font() {
        let painter = TextPainter::estimate_only();
        assert!(!painter.has_font());
        assert_eq!(painter.text_width("21.5°C", 16.0), 54);
        assert_eq!(painter.measure_at(16.0).text_width("Sin datos"), 81);
        assert_eq!(painter.text_width("", 16.0), 0);
    }

    #[test]
    fn test_prepare_respects_ascii_mode() {
        let plain = TextPainter::new(None, false);
        assert_eq!(plain.prepare("Sóller"), "Sóller");
        let ascii = TextPainter::new(None, true);
        assert_eq!(ascii.prepare("Sóller"), "Soller");
    }

    #[test]
    fn test_drawing_without_font_is_a_no_op() {
        let painter = TextPainter::estimate_only();
        let mut image = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        painter.draw(&mut image, "12.0°C", 2, 2, 16.0, Rgb([0, 0, 0]));
        assert!(image.pixels().all(|p| *p == Rgb([255, 255, 255])));
    }

    #[test]
    fn test_missing_font_file() {
        assert!(Typeface::load("/nonexistent/font.ttf").is_err());
        assert!(Typeface::discover(Some(Path::new("/nonexistent/font.ttf"))).is_none());
    }
}
