//! Coordinates and place-name resolution (Open-Meteo geocoding).

use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RelayError;

/// A validated latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Rejects non-finite values and anything outside [-90,90] x [-180,180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, RelayError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(RelayError::bad_input(format!(
                "Latitude {latitude} is out of range [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(RelayError::bad_input(format!(
                "Longitude {longitude} is out of range [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Option<Vec<GeocodingHit>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingHit {
    latitude: f64,
    longitude: f64,
}

/// Place name -> first-match coordinate. No caching.
#[derive(Clone)]
pub struct LocationResolver {
    http: Client,
    url: String,
}

impl LocationResolver {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub async fn resolve(&self, name: &str) -> Result<Coordinate, RelayError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RelayError::bad_input("Location must not be empty"));
        }
        let not_found = || RelayError::LocationNotFound {
            name: name.to_string(),
        };

        let resp = self
            .http
            .get(&self.url)
            .query(&[("name", name), ("count", "1")])
            .send()
            .await
            .map_err(|e| {
                warn!(location = name, error = %e, "geocoding request failed");
                not_found()
            })?;

        if !resp.status().is_success() {
            warn!(location = name, status = %resp.status(), "geocoding returned non-2xx");
            return Err(not_found());
        }

        let body: GeocodingResponse = resp.json().await.map_err(|e| {
            warn!(location = name, error = %e, "geocoding response did not parse");
            not_found()
        })?;

        let hit = body
            .results
            .and_then(|r| r.into_iter().next())
            .ok_or_else(not_found)?;

        // A provider hit outside the valid range is as good as no hit.
        let coord = Coordinate::new(hit.latitude, hit.longitude).map_err(|_| not_found())?;
        debug!(location = name, %coord, "resolved location");
        Ok(coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn coordinate_range_is_enforced() {
        assert!(Coordinate::new(14.5995, 120.9842).is_ok());
        assert!(Coordinate::new(-90.0, 180.0).is_ok());
        assert!(matches!(
            Coordinate::new(1000.0, 0.0),
            Err(RelayError::BadInput(_))
        ));
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[tokio::test]
    async fn resolves_first_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("name", "Manila"))
            .and(query_param("count", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"name": "Manila", "latitude": 14.5995, "longitude": 120.9842},
                    {"name": "Manila, Utah", "latitude": 40.98, "longitude": -109.72}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = LocationResolver::new(Client::new(), server.uri());
        let c = resolver.resolve("Manila").await.unwrap();
        assert!((c.latitude() - 14.5995).abs() < 1e-9);
        assert!((c.longitude() - 120.9842).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_results_are_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"generationtime_ms": 0.3})),
            )
            .mount(&server)
            .await;

        let resolver = LocationResolver::new(Client::new(), server.uri());
        let err = resolver.resolve("Nowhereville").await.unwrap_err();
        assert!(matches!(err, RelayError::LocationNotFound { .. }));
    }

    #[tokio::test]
    async fn unreachable_geocoder_is_not_found() {
        // Port 9 (discard) is expected to refuse connections.
        let resolver = LocationResolver::new(Client::new(), "http://127.0.0.1:9/v1/search");
        let err = resolver.resolve("Manila").await.unwrap_err();
        assert!(matches!(err, RelayError::LocationNotFound { .. }));
    }

    #[tokio::test]
    async fn blank_name_is_bad_input_without_a_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let resolver = LocationResolver::new(Client::new(), server.uri());
        assert!(matches!(
            resolver.resolve("   ").await,
            Err(RelayError::BadInput(_))
        ));
    }
}
