use crate::relay::{Relay, RelayConfig};
use crate::sdp::SdpPolicy;
use anyhow::bail;
use parley_protocol::IceServer;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub relay: RelayConfig,
}

impl Config {
    /// Load from environment variables, reading `.env` first if present
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_address = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let mut ice_servers: Vec<IceServer> = lookup("STUN_SERVERS")
            .map(|s| split_list(&s))
            .unwrap_or_else(|| vec!["stun:stun.l.google.com:19302".to_string()])
            .into_iter()
            .map(IceServer::stun)
            .collect();

        match (
            lookup("TURN_URL"),
            lookup("TURN_USERNAME"),
            lookup("TURN_CREDENTIAL"),
        ) {
            (Some(url), Some(username), Some(credential)) => {
                ice_servers.push(IceServer::turn(url, username, credential));
            }
            (None, None, None) => {}
            _ => bail!("TURN_URL, TURN_USERNAME and TURN_CREDENTIAL must be set together"),
        }

        let mut sdp_policy = SdpPolicy::default();
        if let Some(media) = lookup("SDP_ALLOWED_MEDIA") {
            sdp_policy.allowed_media = split_list(&media);
        }
        if let Some(extensions) = lookup("SDP_DENIED_EXTENSIONS") {
            sdp_policy.denied_extensions = split_list(&extensions);
        }
        if let Some(value) = lookup("SDP_STRIP_SESSION_EXTMAPS") {
            sdp_policy.strip_session_extmaps = parse_bool(&value).ok_or_else(|| {
                anyhow::anyhow!(
                    "SDP_STRIP_SESSION_EXTMAPS must be true or false, got '{}'",
                    value
                )
            })?;
        }
        if sdp_policy.denied_extensions.is_empty() {
            tracing::warn!("SDP_DENIED_EXTENSIONS is empty, offers will not be stripped");
        }

        let error_replies = match lookup("RELAY_ERROR_REPLIES") {
            None => false,
            Some(value) => parse_bool(&value).ok_or_else(|| {
                anyhow::anyhow!("RELAY_ERROR_REPLIES must be true or false, got '{}'", value)
            })?,
        };

        Ok(Config {
            bind_address,
            relay: RelayConfig {
                ice_servers,
                sdp_policy,
                error_replies,
            },
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let relay = Arc::new(Relay::new(config.relay.clone()));
        Self { config, relay }
    }

    pub fn with_relay(config: Config, relay: Arc<Relay>) -> Self {
        Self { config, relay }
    }
}
