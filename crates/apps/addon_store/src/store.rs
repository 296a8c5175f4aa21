use addons::{AddonUpdate, ServerAddonRecord};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::info;

use crate::AppState;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

/// Addon records persisted as one JSON array.
///
/// A missing file reads as the seed catalogue; the first update writes it out.
pub struct AddonStore {
    path: PathBuf,
    seed: Vec<ServerAddonRecord>,
    lock: Mutex<()>,
}

impl AddonStore {
    pub fn new(path: PathBuf, seed: Vec<ServerAddonRecord>) -> Self {
        Self {
            path,
            seed,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn load_unlocked(&self) -> Result<Vec<ServerAddonRecord>, String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => serde_json::from_str(&s).map_err(|e| e.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(self.seed.clone()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn save_unlocked(&self, records: &[ServerAddonRecord]) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(records).map_err(|e| e.to_string())?;
        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| e.to_string())?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<ServerAddonRecord>, String> {
        let _g = self.lock.lock().await;
        self.load_unlocked().await
    }

    /// Applies the flags and returns the whole list, or `None` for an unknown id.
    pub async fn update(
        &self,
        update: &AddonUpdate,
    ) -> Result<Option<Vec<ServerAddonRecord>>, String> {
        let _g = self.lock.lock().await;
        let mut records = self.load_unlocked().await?;
        let Some(record) = records.iter_mut().find(|r| r.id == update.id) else {
            return Ok(None);
        };
        record.installed = update.installed;
        record.active = update.active;
        self.save_unlocked(&records).await?;
        Ok(Some(records))
    }
}

pub async fn list_addons(
    State(state): State<AppState>,
) -> Result<Json<Vec<ServerAddonRecord>>, (StatusCode, Json<Value>)> {
    let records = state.addons.list().await.map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read addon store: {e}"),
        )
    })?;
    Ok(Json(records))
}

pub async fn update_addon(
    State(state): State<AppState>,
    Json(update): Json<AddonUpdate>,
) -> Result<Json<Vec<ServerAddonRecord>>, (StatusCode, Json<Value>)> {
    if update.id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Addon id is required"));
    }

    let records = state
        .addons
        .update(&update)
        .await
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to write addon store: {e}"),
            )
        })?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No addon found"))?;

    info!(
        "addon {} set installed={} active={}",
        update.id, update.installed, update.active
    );
    Ok(Json(records))
}
