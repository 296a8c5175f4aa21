//! Remote geo-data provider abstraction.
//!
//! Each overlay profile is backed by one provider. Providers speak their own
//! wire format and hand back normalized [`GeoRecord`]s.

use std::future::Future;
use std::pin::Pin;

use crate::record::GeoRecord;

/// Boxed, sendable future so providers stay dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Search request derived from a viewport sample.
///
/// `radius` is in the profile's unit (kilometers for events, meters for
/// places).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AreaQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: u32,
}

#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl ProviderError {
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

pub trait GeoProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Fetches every record within `query`. Records may come back with
    /// unusable coordinates; callers filter them.
    fn fetch(&self, query: AreaQuery) -> BoxFuture<'_, Result<Vec<GeoRecord>, ProviderError>>;
}
