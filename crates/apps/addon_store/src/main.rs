use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod proxy;
mod store;

use proxy::UpstreamConfig;
use store::AddonStore;

const DEFAULT_EVENTS_UPSTREAM: &str = "https://app.ticketmaster.com/discovery/v2/events.json";
const DEFAULT_PLACES_UPSTREAM: &str = "https://api.yelp.com/v3/businesses/search";
const DEFAULT_ADVISORY_UPSTREAM: &str =
    "https://data.international.gc.ca/travel-voyage/index-alpha-eng.json";

#[derive(Clone)]
struct AppState {
    addons: Arc<AddonStore>,
    upstream: Arc<UpstreamConfig>,
    advisory: Arc<OnceCell<Value>>,
    http: reqwest::Client,
}

impl AppState {
    fn new(addons: AddonStore, upstream: UpstreamConfig, http: reqwest::Client) -> Self {
        Self {
            addons: Arc::new(addons),
            upstream: Arc::new(upstream),
            advisory: Arc::new(OnceCell::new()),
            http,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr = listen_addr(env::var("ADDON_STORE_ADDR").ok())?;
    let store_path = PathBuf::from(env_var_string("ADDON_STORE_PATH", "data/addons.json"));

    let upstream = UpstreamConfig {
        events_url: env_var_string("EVENTS_UPSTREAM_URL", DEFAULT_EVENTS_UPSTREAM),
        events_key: env_var_string("EVENTS_API_KEY", ""),
        places_url: env_var_string("PLACES_UPSTREAM_URL", DEFAULT_PLACES_UPSTREAM),
        places_key: env_var_string("PLACES_API_KEY", ""),
        advisory_url: env_var_string("ADVISORY_UPSTREAM_URL", DEFAULT_ADVISORY_UPSTREAM),
    };

    let seed = addons::default_catalogue(&format!("http://{addr}/api"));
    let state = AppState::new(
        AddonStore::new(store_path.clone(), seed),
        upstream,
        reqwest::Client::new(),
    );

    info!("addon store backed by {}", store_path.display());
    info!("addon store listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn listen_addr(raw: Option<String>) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    let raw = raw.unwrap_or_else(|| "127.0.0.1:5001".to_string());
    raw.parse()
        .map_err(|e| format!("invalid ADDON_STORE_ADDR {raw:?}: {e}").into())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/addons",
            get(store::list_addons).post(store::update_addon),
        )
        .route("/api/events", get(proxy::search_events))
        .route("/api/places", axum::routing::post(proxy::search_places))
        .route("/api/canadaTravelAdvisory", get(proxy::travel_advisory))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

fn env_var_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
