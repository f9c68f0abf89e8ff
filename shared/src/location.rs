use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::COORDINATE_DECIMALS;

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/";
const MAPS_EMBED_URL: &str = "https://www.google.com/maps/embed/v1/place";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LocationError {
    #[error("invalid coordinate: lat={0}, lon={1}")]
    InvalidCoordinate(f64, f64),
}

// --- Coordinate: validated, NaN-safe ---

/// Deserialization goes through [`Coordinate::new`], so a shell cannot smuggle
/// NaN or out-of-range values in.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(try_from = "LatLon")]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

impl TryFrom<LatLon> for Coordinate {
    type Error = LocationError;

    fn try_from(raw: LatLon) -> Result<Self, Self::Error> {
        Self::new(raw.lat, raw.lon)
    }
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, LocationError> {
        if !lat.is_finite()
            || !lon.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lon)
        {
            return Err(LocationError::InvalidCoordinate(lat, lon));
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// "lat, lon" with six decimals, as shown to the responder.
    pub fn display(&self) -> String {
        format!(
            "{:.prec$}, {:.prec$}",
            self.lat,
            self.lon,
            prec = COORDINATE_DECIMALS
        )
    }

    fn query(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lon.to_bits() == other.lon.to_bits()
    }
}

impl Eq for Coordinate {}

/// Last known position of the person reporting, plus the street address once
/// the geocoder has answered for exactly that position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub coordinate: Coordinate,
    pub address: Option<String>,
}

impl Location {
    #[must_use]
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            address: None,
        }
    }

    /// Returns false when the address belongs to a position we have since
    /// moved away from.
    pub fn resolve_address(&mut self, at: Coordinate, address: Option<String>) -> bool {
        if at != self.coordinate {
            return false;
        }
        self.address = address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLinks {
    pub search_url: String,
    /// Only available with a maps API key.
    pub embed_url: Option<String>,
}

impl MapLinks {
    #[must_use]
    pub fn for_coordinate(coordinate: &Coordinate, maps_api_key: Option<&str>) -> Self {
        let query = coordinate.query();
        let search_url = Url::parse_with_params(MAPS_SEARCH_URL, &[("api", "1"), ("query", query.as_str())])
            .map(String::from)
            .unwrap_or_else(|_| format!("{MAPS_SEARCH_URL}?api=1&query={query}"));

        let embed_url = maps_api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .and_then(|key| {
                Url::parse_with_params(MAPS_EMBED_URL, &[("key", key), ("q", query.as_str())])
                    .ok()
                    .map(String::from)
            });

        Self {
            search_url,
            embed_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(51.5, -0.12).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_deserialization_is_validated() {
        let c: Coordinate = serde_json::from_str(r#"{"lat": 48.85, "lon": 2.35}"#).unwrap();
        assert_eq!(c, Coordinate::new(48.85, 2.35).unwrap());

        assert!(serde_json::from_str::<Coordinate>(r#"{"lat": 48.85, "lon": 200.0}"#).is_err());
        assert!(serde_json::from_str::<Coordinate>(r#"{"lat": -90.5, "lon": 0.0}"#).is_err());
        assert!(serde_json::from_str::<Coordinate>(r#"{"lat": null, "lon": 0.0}"#).is_err());
    }

    #[test]
    fn test_display_six_decimals() {
        let c = Coordinate::new(37.774_929, -122.419_416_8).unwrap();
        assert_eq!(c.display(), "37.774929, -122.419417");
        assert_eq!(Coordinate::new(0.0, 0.0).unwrap().display(), "0.000000, 0.000000");
    }

    #[test]
    fn test_map_links_without_key() {
        let c = Coordinate::new(48.85, 2.35).unwrap();
        let links = MapLinks::for_coordinate(&c, None);
        assert_eq!(
            links.search_url,
            "https://www.google.com/maps/search/?api=1&query=48.85%2C2.35"
        );
        assert!(links.embed_url.is_none());
        assert!(MapLinks::for_coordinate(&c, Some("  ")).embed_url.is_none());
    }

    #[test]
    fn test_map_links_with_key() {
        let c = Coordinate::new(48.85, 2.35).unwrap();
        let links = MapLinks::for_coordinate(&c, Some("abc"));
        let embed = links.embed_url.unwrap();
        assert!(embed.starts_with("https://www.google.com/maps/embed/v1/place?"));
        assert!(embed.contains("key=abc"));
        assert!(embed.contains("q=48.85%2C2.35"));
    }

    #[test]
    fn test_address_for_stale_position_is_dropped() {
        let here = Coordinate::new(1.0, 1.0).unwrap();
        let there = Coordinate::new(2.0, 2.0).unwrap();
        let mut location = Location::new(there);

        assert!(!location.resolve_address(here, Some("Old Street".into())));
        assert!(location.address.is_none());

        assert!(location.resolve_address(there, Some(" 1 New Street ".into())));
        assert_eq!(location.address.as_deref(), Some("1 New Street"));
    }
}
