//! Desired-state store clients.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use overlay::BoxFuture;
use parking_lot::Mutex;

use crate::record::ServerAddonRecord;

#[derive(Debug)]
pub struct StoreError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// External source of truth for which addons should be installed and active.
pub trait DesiredStateStore: Send + Sync {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<ServerAddonRecord>, StoreError>>;

    /// Submits `record`'s flags and returns the store's full, authoritative
    /// list afterwards.
    fn submit(
        &self,
        record: ServerAddonRecord,
    ) -> BoxFuture<'_, Result<Vec<ServerAddonRecord>, StoreError>>;
}

/// Store reached over HTTP: `GET url` lists, `POST url` updates.
#[derive(Debug, Clone)]
pub struct HttpDesiredStateStore {
    client: reqwest::Client,
    url: String,
}

impl HttpDesiredStateStore {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

async fn read_list(
    response: Result<reqwest::Response, reqwest::Error>,
    url: &str,
) -> Result<Vec<ServerAddonRecord>, StoreError> {
    let response = response.map_err(|e| StoreError::with_source(format!("request to {url} failed"), e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(StoreError::new(format!("store at {url} answered {status}")));
    }
    response
        .json::<Vec<ServerAddonRecord>>()
        .await
        .map_err(|e| StoreError::with_source("malformed addon list", e))
}

impl DesiredStateStore for HttpDesiredStateStore {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<ServerAddonRecord>, StoreError>> {
        Box::pin(async move {
            let response = self.client.get(&self.url).send().await;
            read_list(response, &self.url).await
        })
    }

    fn submit(
        &self,
        record: ServerAddonRecord,
    ) -> BoxFuture<'_, Result<Vec<ServerAddonRecord>, StoreError>> {
        Box::pin(async move {
            let response = self.client.post(&self.url).json(&record).send().await;
            read_list(response, &self.url).await
        })
    }
}

/// In-process store that applies updates the way the HTTP service does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ServerAddonRecord>>,
    offline: AtomicBool,
    fetches: AtomicUsize,
    submits: AtomicUsize,
}

impl MemoryStore {
    pub fn new(records: Vec<ServerAddonRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// While offline every call fails like a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ServerAddonRecord> {
        self.records.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::new("store unreachable"))
        } else {
            Ok(())
        }
    }
}

impl DesiredStateStore for MemoryStore {
    fn fetch_all(&self) -> BoxFuture<'_, Result<Vec<ServerAddonRecord>, StoreError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let result = self.check_online().map(|()| self.records());
        Box::pin(async move { result })
    }

    fn submit(
        &self,
        record: ServerAddonRecord,
    ) -> BoxFuture<'_, Result<Vec<ServerAddonRecord>, StoreError>> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let result = self.check_online().and_then(|()| {
            let mut records = self.records.lock();
            let stored = records
                .iter_mut()
                .find(|r| r.id == record.id)
                .ok_or_else(|| StoreError::new(format!("unknown addon {}", record.id)))?;
            stored.installed = record.installed;
            stored.active = record.active;
            Ok(records.clone())
        });
        Box::pin(async move { result })
    }
}
