//! Per-location temperature lookups against an Open-Meteo style forecast API.

use log::{debug, warn};
use serde::Deserialize;

use crate::download::Downloader;
use crate::model::Location;

/// Which temperature a map shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationQuery {
    /// Instantaneous temperature, rounded to one decimal
    Current,
    /// Today's minimum
    DailyMin,
    /// Today's maximum
    DailyMax,
}

impl ObservationQuery {
    /// Query parameters naming the requested field set
    pub fn params(&self) -> (&'static str, &'static str) {
        match self {
            ObservationQuery::Current => ("current", "temperature_2m"),
            ObservationQuery::DailyMin => ("daily", "temperature_2m_min"),
            ObservationQuery::DailyMax => ("daily", "temperature_2m_max"),
        }
    }
}

/// Outcome of one lookup. `NoData` is a valid answer; `Failed` is a fetch error.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Value(f64),
    NoData,
    Failed(String),
}

impl Observation {
    /// The value to render; both no-data and failures render as absent
    pub fn value(&self) -> Option<f64> {
        match self {
            Observation::Value(v) => Some(*v),
            Observation::NoData | Observation::Failed(_) => None,
        }
    }
}

/// Source of per-location observations
pub trait WeatherSource {
    fn observe(&self, location: &Location, query: ObservationQuery) -> Observation;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    current: Option<CurrentBlock>,
    #[serde(default)]
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    #[serde(default)]
    temperature_2m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
}

/// Extract the requested value from a forecast response body.
/// Bodies that are not JSON are failures; JSON of any unexpected shape is "no data".
pub fn parse_observation(body: &[u8], query: ObservationQuery) -> Observation {
    let json: serde_json::Value = match serde_json::from_slice(body) {
        Ok(json) => json,
        Err(err) => return Observation::Failed(format!("invalid JSON: {}", err)),
    };
    let Ok(response) = serde_json::from_value::<ForecastResponse>(json) else {
        return Observation::NoData;
    };

    let value = match query {
        ObservationQuery::Current => response
            .current
            .and_then(|c| c.temperature_2m)
            .map(|t| (t * 10.0).round() / 10.0),
        ObservationQuery::DailyMin => response
            .daily
            .and_then(|d| d.temperature_2m_min.first().copied().flatten()),
        ObservationQuery::DailyMax => response
            .daily
            .and_then(|d| d.temperature_2m_max.first().copied().flatten()),
    };

    match value {
        Some(v) if v.is_finite() => Observation::Value(v),
        _ => Observation::NoData,
    }
}

impl WeatherSource for Downloader {
    fn observe(&self, location: &Location, query: ObservationQuery) -> Observation {
        let config = self.config();
        let (block, field) = query.params();
        let params = [
            ("latitude", location.lat.to_string()),
            ("longitude", location.lon.to_string()),
            (block, field.to_string()),
            ("timezone", config.timezone.clone()),
        ];

        let observation = match self.get_bytes(&config.weather_url, &params, config.weather_timeout) {
            Ok(body) => parse_observation(&body, query),
            Err(err) => Observation::Failed(err.to_string()),
        };

        match &observation {
            Observation::Failed(reason) => warn!("Weather lookup for {} failed: {}", location.name, reason),
            Observation::NoData => debug!("No {:?} data for {}", query, location.name),
            Observation::Value(v) => debug!("{}: {}", location.name, v),
        }
        observation
    }
}
