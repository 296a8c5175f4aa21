use std::time::Duration;

#[derive(Debug)]
pub struct ConfigError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl ConfigError {
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

/// Where the host finds its store and providers, plus overlay timing.
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    pub addon_store_url: String,
    pub events_api_url: String,
    pub places_api_url: String,
    pub advisory_api_url: String,
    pub cache_ttl: Duration,
    pub debounce: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            addon_store_url: "http://127.0.0.1:5001/api/addons".to_string(),
            events_api_url: "http://127.0.0.1:5001/api/events".to_string(),
            places_api_url: "http://127.0.0.1:5001/api/places".to_string(),
            advisory_api_url: "http://127.0.0.1:5001/api/canadaTravelAdvisory".to_string(),
            cache_ttl: Duration::from_secs(300),
            debounce: Duration::from_millis(500),
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            addon_store_url: url_var(&lookup, "ADDON_STORE_URL", defaults.addon_store_url)?,
            events_api_url: url_var(&lookup, "EVENTS_API_URL", defaults.events_api_url)?,
            places_api_url: url_var(&lookup, "PLACES_API_URL", defaults.places_api_url)?,
            advisory_api_url: url_var(&lookup, "ADVISORY_API_URL", defaults.advisory_api_url)?,
            cache_ttl: Duration::from_secs(env_var_u64(&lookup, "OVERLAY_CACHE_TTL_SECS", 300)?),
            debounce: Duration::from_millis(env_var_u64(&lookup, "OVERLAY_DEBOUNCE_MS", 500)?),
        })
    }

    /// Base the store's own catalogue URLs hang off (`…/api`).
    pub fn api_base(&self) -> &str {
        self.addon_store_url
            .trim_end_matches('/')
            .trim_end_matches("/addons")
    }
}

fn env_var_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| ConfigError::with_source(format!("invalid {key}: {v:?}"), e)),
    }
}

fn url_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: String,
) -> Result<String, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(v) if v.starts_with("http://") || v.starts_with("https://") => Ok(v),
        Some(v) => Err(ConfigError::new(format!("{key} must be an http(s) URL, got {v:?}"))),
    }
}
