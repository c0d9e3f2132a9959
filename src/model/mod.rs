use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{MapError, StatusOr};

/// A named place to annotate on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self { name: name.to_string(), lat, lon }
    }

    /// Reject coordinates that cannot be projected
    pub fn validate(&self) -> StatusOr<()> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(MapError::ParseError(format!("{}: coordinates must be finite", self.name)));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(MapError::ParseError(format!(
                "{}: ({}, {}) is outside the valid coordinate range", self.name, self.lat, self.lon)));
        }
        Ok(())
    }
}

/// Load a JSON array of `{"name": .., "lat": .., "lon": ..}` entries.
/// Order is preserved: earlier entries win crowded label spots.
pub fn load_locations<P: AsRef<Path>>(path: P) -> StatusOr<Vec<Location>> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_locations(&text)
}

pub fn parse_locations(text: &str) -> StatusOr<Vec<Location>> {
    let locations: Vec<Location> = serde_json::from_str(text)?;
    for location in &locations {
        location.validate()?;
    }
    Ok(locations)
}

/// Balearic towns for the current-conditions map, main towns of each island
/// first so they survive when labels crowd
pub fn balearic_locations() -> Vec<Location> {
    vec![
        // Mallorca
        Location::new("Palma", 39.569, 2.650),
        Location::new("Calvià", 39.563, 2.506),
        Location::new("Sóller", 39.766, 2.715),
        Location::new("Inca", 39.721, 2.910),
        Location::new("Alcúdia", 39.853, 3.121),
        Location::new("Pollença", 39.877, 3.016),
        Location::new("Manacor", 39.570, 3.209),
        Location::new("Felanitx", 39.469, 3.147),
        // Mallorca, shown when there is room
        Location::new("Llucmajor", 39.490, 2.883),
        Location::new("Marratxí", 39.626, 2.708),
        Location::new("Sa Pobla", 39.769, 3.022),
        Location::new("Binissalem", 39.688, 2.842),
        Location::new("Campos", 39.433, 3.018),
        Location::new("Santanyí", 39.355, 3.128),
        Location::new("Capdepera", 39.702, 3.435),
        Location::new("Artà", 39.693, 3.350),
        Location::new("Muro", 39.736, 3.057),
        Location::new("Sineu", 39.642, 3.010),
        Location::new("Porreres", 39.517, 3.021),
        // Menorca
        Location::new("Maó", 39.889, 4.262),
        Location::new("Ciutadella", 40.001, 3.839),
        Location::new("Es Mercadal", 39.994, 4.093),
        Location::new("Alaior", 39.933, 4.140),
        Location::new("Es Castell", 39.877, 4.294),
        // Ibiza and Formentera
        Location::new("Eivissa", 38.907, 1.420),
        Location::new("Sant Antoni", 38.980, 1.303),
        Location::new("Santa Eulària", 38.984, 1.535),
        Location::new("La Savina", 38.727, 1.408),
        Location::new("Sant Josep", 38.921, 1.295),
        Location::new("Sant Joan", 39.078, 1.512),
        Location::new("Sant Francesc", 38.710, 1.413),
    ]
}

/// Principal towns only, used by the daily minimum/maximum maps
pub fn balearic_principal_locations() -> Vec<Location> {
    const PRINCIPAL: [&str; 17] = [
        "Palma", "Calvià", "Sóller", "Inca", "Alcúdia", "Pollença", "Manacor", "Felanitx",
        "Llucmajor", "Santanyí", "Maó", "Ciutadella", "Es Mercadal", "Eivissa", "Sant Antoni",
        "Santa Eulària", "La Savina",
    ];

    let all = balearic_locations();
    PRINCIPAL
        .iter()
        .filter_map(|name| all.iter().find(|l| l.name == *name).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::BoundingBox;

    #[test]
    fn test_builtin_locations_inside_region() {
        let bbox = BoundingBox::balearic_islands();
        let locations = balearic_locations();
        assert_eq!(locations.len(), 31);
        for location in &locations {
            assert!(location.validate().is_ok());
            assert!(bbox.contains(location.lon, location.lat), "{} is outside the region", location.name);
        }
    }

    #[test]
    fn test_principal_subset_keeps_order() {
        let principal = balearic_principal_locations();
        assert_eq!(principal.len(), 17);
        assert_eq!(principal[0].name, "Palma");
        assert_eq!(principal[9].name, "Santanyí");
        assert_eq!(principal[16].name, "La Savina");
    }

    #[test]
    fn test_parse_locations() {
        let locations = parse_locations(r#"[{"name": "Palma", "lat": 39.569, "lon": 2.65},
            {"name": "Maó", "lat": 39.889, "lon": 4.262}]"#).unwrap();
        assert_eq!(locations, vec![Location::new("Palma", 39.569, 2.65), Location::new("Maó", 39.889, 4.262)]);
    }

    #[test]
    fn test_parse_locations_rejects_bad_entries() {
        assert!(parse_locations(r#"[{"name": "Nowhere", "lat": 95.0, "lon": 2.0}]"#).is_err());
        assert!(parse_locations(r#"[{"name": "Palma", "lat": 39.5}]"#).is_err(), "Missing longitude");
        assert!(parse_locations("{}").is_err());
    }
}
