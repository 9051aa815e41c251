use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::GeocodeError;
use crate::types::Coordinate;

/// Human-readable place for a coordinate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub neighborhood: Option<String>,
    pub city: Option<String>,
}

impl Place {
    /// `"Neighborhood, City"`, or whichever part is known.
    pub fn place_line(&self) -> Option<String> {
        let parts: Vec<&str> = [self.neighborhood.as_deref(), self.city.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Asynchronous, fallible coordinate-to-place lookup.
///
/// The returned future is `'static` so the session owner can spawn it and
/// keep processing samples while it runs.
pub trait ReverseGeocoder: Send + Sync {
    fn reverse(&self, coordinate: Coordinate) -> BoxFuture<'static, Result<Place, GeocodeError>>;
}

/// A lookup the session owner should run. Results are matched back by
/// `generation`; a result for an older session is dropped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaceLookup {
    pub generation: u64,
    pub coordinate: Coordinate,
    pub requested_at: f64,
}

/// Rate limiter for place-line refreshes.
///
/// One lookup in flight, one attempt per interval, and only after the
/// runner has moved far enough from the last place that resolved.
#[derive(Clone, Debug, Default)]
pub struct PlaceLineRefresher {
    last_attempt_at: Option<f64>,
    last_resolved_at: Option<Coordinate>,
    in_flight: Option<PlaceLookup>,
    place_line: Option<String>,
}

/// An in-flight lookup older than this is considered lost.
const LOOKUP_TIMEOUT_SECS: f64 = 30.0;

impl PlaceLineRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Request a lookup for `coordinate` if the rate limit allows one.
    pub fn poll(
        &mut self,
        generation: u64,
        coordinate: Coordinate,
        now: f64,
        config: &TrackerConfig,
    ) -> Option<PlaceLookup> {
        if let Some(pending) = self.in_flight {
            if now - pending.requested_at < LOOKUP_TIMEOUT_SECS {
                return None;
            }
            log::debug!("Place lookup from {:.0} timed out", pending.requested_at);
            self.in_flight = None;
        }

        if let Some(last) = self.last_attempt_at {
            if now - last < config.geocode_min_interval_secs {
                return None;
            }
        }
        if let Some(resolved) = self.last_resolved_at {
            if resolved.distance_to(&coordinate) < config.geocode_min_distance_m {
                return None;
            }
        }

        let lookup = PlaceLookup {
            generation,
            coordinate,
            requested_at: now,
        };
        self.last_attempt_at = Some(now);
        self.in_flight = Some(lookup);
        Some(lookup)
    }

    /// Apply a finished lookup. Returns true when the place line changed.
    pub fn complete(&mut self, lookup: &PlaceLookup, result: Result<Place, GeocodeError>) -> bool {
        if self.in_flight.as_ref() == Some(lookup) {
            self.in_flight = None;
        }
        match result {
            Ok(place) => {
                self.last_resolved_at = Some(lookup.coordinate);
                match place.place_line() {
                    Some(line) if self.place_line.as_deref() != Some(line.as_str()) => {
                        self.place_line = Some(line);
                        true
                    }
                    _ => false,
                }
            }
            Err(e) => {
                log::debug!("Place lookup failed: {}", e);
                false
            }
        }
    }

    pub fn place_line(&self) -> Option<&str> {
        self.place_line.as_deref()
    }
}

// ─── Nominatim ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NominatimResponse {
    error: Option<String>,
    address: Option<NominatimAddress>,
}

#[derive(Deserialize)]
struct NominatimAddress {
    neighbourhood: Option<String>,
    suburb: Option<String>,
    quarter: Option<String>,
    city_district: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
}

/// Parse a Nominatim `reverse?format=jsonv2` body.
pub fn parse_nominatim(body: &str) -> Result<Place, GeocodeError> {
    let response: NominatimResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::ParseError(e.to_string()))?;
    if response.error.is_some() {
        return Err(GeocodeError::NoResult);
    }
    let address = response.address.ok_or(GeocodeError::NoResult)?;

    let place = Place {
        neighborhood: address
            .neighbourhood
            .or(address.suburb)
            .or(address.quarter)
            .or(address.city_district),
        city: address.city.or(address.town).or(address.village),
    };
    if place.place_line().is_none() {
        return Err(GeocodeError::NoResult);
    }
    Ok(place)
}

/// Reverse geocoder backed by an OSM Nominatim-compatible endpoint.
///
/// Rate limiting is left to [`PlaceLineRefresher`]; this client makes one
/// request per call and reports failures without retrying.
#[derive(Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new() -> Self {
        Self::with_base_url("https://nominatim.openstreetmap.org/reverse")
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("run_tracker_rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        NominatimGeocoder {
            client,
            base_url: base_url.to_string(),
        }
    }

    async fn lookup(
        client: reqwest::Client,
        base_url: String,
        coordinate: Coordinate,
    ) -> Result<Place, GeocodeError> {
        let response = client
            .get(&base_url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coordinate.latitude.to_string()),
                ("lon", coordinate.longitude.to_string()),
                ("zoom", "16".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::NetworkTimeout
                } else {
                    GeocodeError::Unknown(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            log::warn!("Rate limited by geocoding service");
            return Err(GeocodeError::RateLimited);
        } else if !status.is_success() {
            return Err(GeocodeError::HttpError(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::Unknown(format!("Failed to read response: {}", e)))?;
        parse_nominatim(&body)
    }
}

impl Default for NominatimGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    fn reverse(&self, coordinate: Coordinate) -> BoxFuture<'static, Result<Place, GeocodeError>> {
        Self::lookup(self.client.clone(), self.base_url.clone(), coordinate).boxed()
    }
}
