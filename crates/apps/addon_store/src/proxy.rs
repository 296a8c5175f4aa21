use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::store::api_error;
use crate::AppState;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Upstream endpoints and credentials the proxy routes forward to.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub events_url: String,
    pub events_key: String,
    pub places_url: String,
    pub places_key: String,
    pub advisory_url: String,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub radius: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlacesRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius: Option<f64>,
    pub term: Option<String>,
}

async fn upstream_json(
    request: reqwest::RequestBuilder,
    what: &str,
) -> Result<Value, (StatusCode, Json<Value>)> {
    let resp = request.send().await.map_err(|e| {
        warn!("{what} upstream request failed: {e}");
        api_error(StatusCode::BAD_GATEWAY, format!("Failed to fetch {what}"))
    })?;

    let status = resp.status();
    if !status.is_success() {
        warn!("{what} upstream answered {status}");
        return Err(api_error(
            StatusCode::BAD_GATEWAY,
            format!("Upstream HTTP {}", status.as_u16()),
        ));
    }

    resp.json::<Value>().await.map_err(|e| {
        warn!("{what} upstream sent malformed JSON: {e}");
        api_error(StatusCode::BAD_GATEWAY, format!("Malformed {what} response"))
    })
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub async fn search_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult {
    let (Some(latitude), Some(longitude)) = (
        present(query.latitude.as_deref()),
        present(query.longitude.as_deref()),
    ) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing required query parameters",
        ));
    };

    let cfg = &state.upstream;
    let radius = present(query.radius.as_deref()).unwrap_or("50");
    let size = present(query.size.as_deref()).unwrap_or("100");
    let latlong = format!("{latitude},{longitude}");
    info!("events search at {latlong} radius {radius}");

    let request = state.http.get(&cfg.events_url).query(&[
        ("apikey", cfg.events_key.as_str()),
        ("latlong", latlong.as_str()),
        ("radius", radius),
        ("size", size),
    ]);
    upstream_json(request, "events").await.map(Json)
}

/// Forwards a business search and answers with the bare `businesses` array.
pub async fn search_places(
    State(state): State<AppState>,
    Json(req): Json<PlacesRequest>,
) -> ApiResult {
    let (Some(latitude), Some(longitude)) = (req.latitude, req.longitude) else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Latitude and Longitude are required.",
        ));
    };

    let cfg = &state.upstream;
    // Business search only accepts whole metres.
    let radius = req.radius.unwrap_or(1000.0).round().max(1.0) as u32;
    let term = req.term.as_deref().unwrap_or("restaurants");
    info!("places search at {latitude},{longitude} radius {radius}m");

    let request = state
        .http
        .get(&cfg.places_url)
        .bearer_auth(&cfg.places_key)
        .query(&[
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("radius", radius.to_string()),
            ("term", term.to_string()),
            ("limit", "50".to_string()),
        ]);
    let mut body = upstream_json(request, "places").await?;
    let businesses = body
        .get_mut("businesses")
        .map(Value::take)
        .unwrap_or_else(|| Value::Array(Vec::new()));
    Ok(Json(businesses))
}

/// Serves the advisory feed, fetching it upstream on first use only.
pub async fn travel_advisory(State(state): State<AppState>) -> ApiResult {
    let feed = state
        .advisory
        .get_or_try_init(|| async {
            info!("fetching travel advisory feed");
            upstream_json(state.http.get(&state.upstream.advisory_url), "travel advisory").await
        })
        .await
        .map_err(|_| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch travel advisory data.",
            )
        })?;
    Ok(Json(feed.clone()))
}
