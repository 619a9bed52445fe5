//! Configuration for the viewer client

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::Result;

/// Default application path segment when the page URL carries none
pub const DEFAULT_APP_NAME: &str = "webrtc";

/// Aux-channel buffered-bytes high-water mark
pub const AUX_HIGH_WATER: usize = 1024 * 1024;

/// Aux-channel buffered-bytes low-water mark, the drain target
pub const AUX_LOW_WATER: usize = 256 * 1024;

/// Main configuration for a viewer session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Page URL the session was loaded from; derives the signaling
    /// endpoint, the TURN endpoint and the storage namespace
    pub base_url: Url,

    /// Application path segment under the base URL
    pub app_name: String,

    /// Backing file for persisted preferences (in-memory when None)
    pub preferences_path: Option<PathBuf>,

    /// ICE servers and relay policy; usually filled from the TURN endpoint
    pub ice: IceSettings,

    /// Signaling reconnect backoff
    pub backoff: BackoffOptions,

    /// Maximum file-chunk payload per aux frame
    pub upload_chunk_size: usize,

    /// Resize debounce quiet period in milliseconds
    pub resize_quiet_ms: u64,

    /// Stats sampling interval in milliseconds
    pub stats_interval_ms: u64,

    /// Every how many stats ticks the `_f`/`_l` client report goes out
    pub client_report_every_ticks: u32,

    /// Receive-buffer latency governor interval in milliseconds
    pub latency_governor_interval_ms: u64,

    /// Delay before honouring a server `reload` action, in milliseconds
    pub reload_delay_ms: u64,
}

impl ClientConfig {
    /// Config with defaults for everything derivable from the page URL.
    pub fn new(base_url: Url) -> Self {
        let app_name = base_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_APP_NAME)
            .to_string();
        Self {
            base_url,
            app_name,
            preferences_path: None,
            ice: IceSettings::default(),
            backoff: BackoffOptions::default(),
            upload_chunk_size: deskstream_core::protocol::MAX_CHUNK_PAYLOAD,
            resize_quiet_ms: 500,
            stats_interval_ms: 1_000,
            client_report_every_ticks: 5,
            latency_governor_interval_ms: 15,
            reload_delay_ms: 700,
        }
    }

    /// Websocket signaling endpoint:
    /// `ws(s)://<host><path>/<app>/signaling/`, scheme matching the page
    /// origin.
    pub fn signaling_url(&self) -> Result<Url> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unsupported base url scheme {other:?}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::InvalidConfig("cannot derive websocket scheme".into()))?;
        let path = format!(
            "{}/{}/signaling/",
            url.path().trim_end_matches('/'),
            self.app_name
        );
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    /// TURN configuration endpoint, sibling of the page URL.
    pub fn turn_url(&self) -> Result<Url> {
        self.base_url
            .join("./turn")
            .map_err(|e| Error::InvalidConfig(format!("cannot derive turn url: {e}")))
    }

    /// Storage namespace slug for the preference store.
    pub fn storage_prefix(&self) -> String {
        deskstream_core::settings::storage_slug(self.base_url.as_str())
    }

    /// Validate configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk size exceeds the frame payload cap,
    /// an interval is zero, or the backoff is not monotone.
    pub fn validate(&self) -> Result<()> {
        if self.upload_chunk_size == 0
            || self.upload_chunk_size > deskstream_core::protocol::MAX_CHUNK_PAYLOAD
        {
            return Err(Error::InvalidConfig(format!(
                "upload_chunk_size must be in 1..={}, got {}",
                deskstream_core::protocol::MAX_CHUNK_PAYLOAD,
                self.upload_chunk_size
            )));
        }
        if self.stats_interval_ms == 0 || self.latency_governor_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "stats and governor intervals must be non-zero".into(),
            ));
        }
        if self.backoff.initial_ms == 0 || self.backoff.max_ms < self.backoff.initial_ms {
            return Err(Error::InvalidConfig(format!(
                "backoff range {}..{} is not monotone",
                self.backoff.initial_ms, self.backoff.max_ms
            )));
        }
        self.signaling_url()?;
        Ok(())
    }
}

/// ICE servers plus transport policy
#[derive(Debug, Clone, Default)]
pub struct IceSettings {
    /// Entry `[0]` is the STUN server, entry `[1]` (if present) the TURN
    /// server, matching the TURN endpoint contract
    pub servers: Vec<IceServerConfig>,
    /// Restrict candidates to relayed ones
    pub force_relay: bool,
}

/// One ICE server entry as served by the `./turn` endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IceServerConfig {
    /// Single URL or list of URLs; both wire forms are accepted
    #[serde(deserialize_with = "string_or_seq")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Signaling reconnect backoff parameters
#[derive(Debug, Clone, Copy)]
pub struct BackoffOptions {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl BackoffOptions {
    /// Next delay after `current`, capped at the ceiling.
    pub fn next_delay_ms(&self, current: u64) -> u64 {
        ((current as f64 * self.multiplier) as u64).min(self.max_ms)
    }
}

/// Body of the `./turn` endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TurnEndpointResponse {
    #[serde(rename = "iceServers", default)]
    pub ice_servers: Vec<IceServerConfig>,
}

/// Fetch the ICE server list from the `./turn` endpoint.
///
/// `force_relay` is carried into the returned settings unchanged; it maps
/// to the peer connection's transport policy, not to the endpoint.
pub async fn fetch_turn_config(config: &ClientConfig, force_relay: bool) -> Result<IceSettings> {
    let url = config.turn_url()?;
    let response = reqwest::get(url.clone())
        .await
        .map_err(|e| Error::TurnFetch(format!("GET {url}: {e}")))?
        .error_for_status()
        .map_err(|e| Error::TurnFetch(e.to_string()))?;
    let body: TurnEndpointResponse = response
        .json()
        .await
        .map_err(|e| Error::TurnFetch(format!("decode {url}: {e}")))?;
    Ok(IceSettings {
        servers: body.ice_servers,
        force_relay,
    })
}

// The endpoint serves `urls` either as a bare string or as an array.
fn string_or_seq<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(url: &str) -> ClientConfig {
        ClientConfig::new(url.parse().unwrap())
    }

    #[test]
    fn test_app_name_from_path() {
        assert_eq!(config("https://host/webrtc").app_name, "webrtc");
        assert_eq!(config("https://host/desk/main").app_name, "main");
        assert_eq!(config("https://host/").app_name, DEFAULT_APP_NAME);
    }

    #[test]
    fn test_signaling_url_matches_origin_scheme() {
        let url = config("https://host:8443/webrtc").signaling_url().unwrap();
        assert_eq!(url.as_str(), "wss://host:8443/webrtc/webrtc/signaling/");

        let url = config("http://host:8081/").signaling_url().unwrap();
        assert_eq!(url.as_str(), "ws://host:8081/webrtc/signaling/");
    }

    #[test]
    fn test_turn_url_is_sibling() {
        let url = config("https://host/webrtc").turn_url().unwrap();
        assert_eq!(url.as_str(), "https://host/turn");
    }

    #[test]
    fn test_ice_server_urls_string_or_array() {
        let one: IceServerConfig =
            serde_json::from_value(json!({"urls": "stun:stun.example:19302"})).unwrap();
        assert_eq!(one.urls, vec!["stun:stun.example:19302"]);

        let many: IceServerConfig = serde_json::from_value(json!({
            "urls": ["turn:relay.example:3478?transport=udp"],
            "username": "user",
            "credential": "pass"
        }))
        .unwrap();
        assert_eq!(many.urls.len(), 1);
        assert_eq!(many.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_turn_endpoint_response_shape() {
        let body: TurnEndpointResponse = serde_json::from_value(json!({
            "iceServers": [
                {"urls": "stun:stun.example:19302"},
                {"urls": ["turn:relay.example:3478"], "username": "u", "credential": "c"}
            ]
        }))
        .unwrap();
        assert_eq!(body.ice_servers.len(), 2);
    }

    #[test]
    fn test_validate_rejects_oversized_chunk() {
        let mut cfg = config("https://host/webrtc");
        assert!(cfg.validate().is_ok());
        cfg.upload_chunk_size = 64 * 1024;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_backoff_caps_at_ceiling() {
        let backoff = BackoffOptions::default();
        let mut delay = backoff.initial_ms;
        for _ in 0..10 {
            delay = backoff.next_delay_ms(delay);
        }
        assert_eq!(delay, backoff.max_ms);
    }
}
