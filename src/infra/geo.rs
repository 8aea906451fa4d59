use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::post::Coordinates;

/// Reverse geocoding: coordinates to a "City, Country" label.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, coords: Coordinates) -> Result<Option<String>>;
}

/// Used when no geocoding endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn reverse(&self, _coords: Coordinates) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Clone)]
pub struct HttpGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReverseGeocodeResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    locality: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
}

impl HttpGeocoder {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn reverse(&self, coords: Coordinates) -> Result<Option<String>> {
        if !(-90.0..=90.0).contains(&coords.latitude) || !(-180.0..=180.0).contains(&coords.longitude)
        {
            return Err(anyhow!("coordinates out of range"));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("localityLanguage", "pt".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: ReverseGeocodeResponse = response.json().await?;
        Ok(format_location(body))
    }
}

fn format_location(body: ReverseGeocodeResponse) -> Option<String> {
    let place = body
        .city
        .filter(|city| !city.trim().is_empty())
        .or(body.locality)
        .filter(|place| !place.trim().is_empty());
    let country = body.country_name.filter(|c| !c.trim().is_empty());

    match (place, country) {
        (Some(place), Some(country)) => Some(format!("{}, {}", place.trim(), country.trim())),
        (Some(place), None) => Some(place.trim().to_string()),
        (None, Some(country)) => Some(country.trim().to_string()),
        (None, None) => None,
    }
}
