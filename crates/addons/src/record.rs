use serde::{Deserialize, Serialize};

/// Desired state for one addon, as held by the remote store.
///
/// The reconciler never edits these; it submits updates and adopts whatever
/// list the store answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAddonRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub active: bool,
    pub installed: bool,
    #[serde(default)]
    pub api_location: String,
}

impl ServerAddonRecord {
    /// Same record with neither flag set; used as the "before" side when a
    /// record first appears.
    pub fn blank(&self) -> Self {
        Self {
            active: false,
            installed: false,
            ..self.clone()
        }
    }

    pub fn with_flags(&self, installed: bool, active: bool) -> Self {
        Self {
            installed,
            active,
            ..self.clone()
        }
    }

    pub fn same_flags(&self, other: &Self) -> bool {
        self.installed == other.installed && self.active == other.active
    }

    /// Options pushed into the addon before any transition runs.
    pub fn options(&self) -> AddonOptions {
        AddonOptions {
            api_location: (!self.api_location.is_empty()).then(|| self.api_location.clone()),
            ..AddonOptions::default()
        }
    }

    pub fn update(&self) -> AddonUpdate {
        AddonUpdate {
            id: self.id.clone(),
            active: self.active,
            installed: self.installed,
        }
    }
}

/// Body accepted by the store's update endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonUpdate {
    pub id: String,
    pub active: bool,
    pub installed: bool,
}

/// Runtime options an addon accepts. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddonOptions {
    pub api_location: Option<String>,
    pub api_endpoint: Option<String>,
    pub cache_expiry_ms: Option<u64>,
}

impl AddonOptions {
    /// Explicit endpoint first, then the record's api location when it is an
    /// http(s) URL.
    pub fn http_endpoint(&self) -> Option<&str> {
        self.api_endpoint
            .as_deref()
            .or(self.api_location.as_deref())
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
    }
}

pub const ADVISORY_ADDON_ID: &str = "canadaTravelAdvisory";
pub const EVENTS_ADDON_ID: &str = "Ticketmaster";
pub const PLACES_ADDON_ID: &str = "YELP_PLACES";

/// Catalogue a fresh store starts from.
pub fn default_catalogue(api_base: &str) -> Vec<ServerAddonRecord> {
    let api_base = api_base.trim_end_matches('/');
    let record = |id: &str, name: &str, desc: &str, installed: bool, active: bool, api: String| {
        ServerAddonRecord {
            id: id.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            active,
            installed,
            api_location: api,
        }
    };
    vec![
        record(
            ADVISORY_ADDON_ID,
            "Canada Travel Advisory",
            "Latest travel advisories for Canada",
            true,
            true,
            format!("{api_base}/canadaTravelAdvisory"),
        ),
        record(
            EVENTS_ADDON_ID,
            "Ticketmaster",
            "Ticketmaster Events",
            true,
            true,
            format!("{api_base}/events"),
        ),
        record(
            PLACES_ADDON_ID,
            "Yelp Places",
            "Nearby food and business listings from Yelp",
            false,
            false,
            format!("{api_base}/places"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{AddonOptions, ServerAddonRecord, default_catalogue};

    #[test]
    fn record_wire_format_is_camel_case() {
        let json = r#"{"id":"Ticketmaster","name":"Ticketmaster","desc":"Events",
            "active":true,"installed":false,"apiLocation":"http://x/api/events"}"#;
        let record: ServerAddonRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.api_location, "http://x/api/events");
        assert!(record.active && !record.installed);

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["apiLocation"], "http://x/api/events");
    }

    #[test]
    fn options_ignore_unknown_keys() {
        let options: AddonOptions =
            serde_json::from_str(r#"{"cacheExpiryMs":1000,"colour":"red"}"#).unwrap();
        assert_eq!(options.cache_expiry_ms, Some(1000));
        assert_eq!(options.http_endpoint(), None);
    }

    #[test]
    fn http_endpoint_prefers_explicit_endpoint() {
        let options = AddonOptions {
            api_location: Some("http://store/api/events".into()),
            api_endpoint: Some("https://proxy/events".into()),
            cache_expiry_ms: None,
        };
        assert_eq!(options.http_endpoint(), Some("https://proxy/events"));

        let bare = AddonOptions {
            api_location: Some("yelp".into()),
            ..AddonOptions::default()
        };
        assert_eq!(bare.http_endpoint(), None);
    }

    #[test]
    fn catalogue_ids_are_unique() {
        let records = default_catalogue("http://127.0.0.1:5001/api/");
        let mut ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), records.len());
        assert_eq!(
            records[1].api_location,
            "http://127.0.0.1:5001/api/events"
        );
    }
}
