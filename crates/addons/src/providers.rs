//! HTTP adapters for the third-party data behind the concrete addons, and
//! normalization of their payloads into [`GeoRecord`]s.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use overlay::{AreaQuery, BoxFuture, GeoProvider, GeoRecord, ProviderError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSearchResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedEvents>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedEvents {
    #[serde(default)]
    pub events: Vec<EventPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub dates: Option<EventDates>,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedVenues>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventDates {
    #[serde(default)]
    pub start: Option<EventStart>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStart {
    #[serde(default)]
    pub local_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedVenues {
    #[serde(default)]
    pub venues: Vec<Venue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Venue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<VenueLocation>,
}

/// Venue coordinates arrive as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueLocation {
    pub latitude: String,
    pub longitude: String,
}

/// Keeps events whose first venue has parseable, in-range coordinates.
pub fn normalize_events(response: EventSearchResponse) -> Vec<GeoRecord> {
    let events = response.embedded.map(|e| e.events).unwrap_or_default();
    events
        .into_iter()
        .filter_map(|event| {
            let venue = event.embedded.as_ref()?.venues.first()?;
            let location = venue.location.as_ref()?;
            let latitude = location.latitude.trim().parse::<f64>().ok()?;
            let longitude = location.longitude.trim().parse::<f64>().ok()?;

            let starts_on = event
                .dates
                .as_ref()
                .and_then(|d| d.start.as_ref())
                .and_then(|s| s.local_date.as_deref())
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
            let mut record = GeoRecord::new(event.id.clone(), event.name.clone(), latitude, longitude);
            record.starts_on = starts_on;
            record.description = venue.name.clone();
            record.has_valid_coordinates().then_some(record)
        })
        .collect()
}

/// Event search over `GET {endpoint}?latitude=..&longitude=..&radius=..`.
#[derive(Debug, Clone)]
pub struct EventSearchClient {
    client: reqwest::Client,
    endpoint: String,
}

impl EventSearchClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl GeoProvider for EventSearchClient {
    fn name(&self) -> &str {
        "event-search"
    }

    fn fetch(&self, query: AreaQuery) -> BoxFuture<'_, Result<Vec<GeoRecord>, ProviderError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("latitude", query.latitude.to_string()),
                    ("longitude", query.longitude.to_string()),
                    ("radius", query.radius.to_string()),
                ])
                .send()
                .await
                .map_err(|e| ProviderError::with_source("event search request failed", e))?;
            let body: EventSearchResponse = read_json(response).await?;
            Ok(normalize_events(body))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessSearchRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusinessPayload {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub coordinates: Option<BusinessCoordinates>,
    #[serde(default)]
    pub categories: Vec<BusinessCategory>,
    #[serde(default)]
    pub location: Option<BusinessLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusinessCoordinates {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusinessCategory {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusinessLocation {
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

pub fn normalize_businesses(payload: Vec<BusinessPayload>) -> Vec<GeoRecord> {
    payload
        .into_iter()
        .filter_map(|business| {
            let coordinates = business.coordinates.as_ref()?;
            let record = GeoRecord::new(
                business.id.clone(),
                business.name.clone(),
                coordinates.latitude?,
                coordinates.longitude?,
            );
            let category = business
                .categories
                .first()
                .map(|c| c.title.as_str())
                .unwrap_or("N/A");
            let address = business
                .location
                .as_ref()
                .map(|l| {
                    format!(
                        "{}, {}",
                        l.address1.as_deref().unwrap_or("N/A"),
                        l.city.as_deref().unwrap_or("")
                    )
                })
                .unwrap_or_else(|| "N/A".to_string());
            let rating = business
                .rating
                .map(|r| r.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            let record = record.with_description(format!(
                "Rating: {rating}; Category: {category}; Address: {address}"
            ));
            record.has_valid_coordinates().then_some(record)
        })
        .collect()
}

/// Business search over `POST {endpoint}` with a JSON body.
#[derive(Debug, Clone)]
pub struct BusinessSearchClient {
    client: reqwest::Client,
    endpoint: String,
}

impl BusinessSearchClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl GeoProvider for BusinessSearchClient {
    fn name(&self) -> &str {
        "business-search"
    }

    fn fetch(&self, query: AreaQuery) -> BoxFuture<'_, Result<Vec<GeoRecord>, ProviderError>> {
        Box::pin(async move {
            let body = BusinessSearchRequest {
                latitude: query.latitude,
                longitude: query.longitude,
                radius: query.radius,
            };
            let response = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::with_source("business search request failed", e))?;
            let payload: Vec<BusinessPayload> = read_json(response).await?;
            Ok(normalize_businesses(payload))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AdvisoryFeed {
    #[serde(default)]
    pub metadata: Option<AdvisoryMetadata>,
    #[serde(default)]
    pub data: BTreeMap<String, CountryAdvisory>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AdvisoryMetadata {
    #[serde(default)]
    pub generated: Option<AdvisoryGenerated>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AdvisoryGenerated {
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CountryAdvisory {
    #[serde(rename = "advisory-state", default)]
    pub advisory_state: Option<u8>,
    #[serde(rename = "country-eng", default)]
    pub country_eng: Option<String>,
}

impl AdvisoryFeed {
    pub fn generated_date(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.generated.as_ref())
            .and_then(|g| g.date.as_deref())
            .filter(|d| !d.is_empty())
    }

    pub fn level(&self, country_code: &str) -> Option<u8> {
        self.data.get(country_code).and_then(|c| c.advisory_state)
    }
}

pub trait AdvisorySource: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<AdvisoryFeed, ProviderError>>;
}

#[derive(Debug, Clone)]
pub struct HttpAdvisorySource {
    client: reqwest::Client,
}

impl HttpAdvisorySource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl AdvisorySource for HttpAdvisorySource {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<AdvisoryFeed, ProviderError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ProviderError::with_source("advisory feed request failed", e))?;
            read_json(response).await
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::new(format!(
            "provider answered {status} for {}",
            response.url()
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ProviderError::with_source("malformed provider payload", e))
}
