//! Signaling relay core
//!
//! Owns the connection registry and decides what happens to every frame a
//! peer sends. Transport concerns (sockets, writer tasks, closing) live in
//! `ws::handler`; this module only sees ids, text and outbound channels.

mod routing;

pub use routing::Disposition;

use crate::error::{RegistryError, Result};
use crate::ids::{IdGenerator, RandomIdGenerator};
use crate::sdp::{SdpPolicy, SdpSanitizer};
use crate::ws::connections::{ConnectionHandle, ConnectionRegistry};
use parley_protocol::{ClientId, Envelope, IceServer};
use tokio::sync::mpsc;

/// Everything the relay needs to know about its deployment
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Sent to every client right after `hello`
    pub ice_servers: Vec<IceServer>,
    pub sdp_policy: SdpPolicy,
    /// Reply with `{type:"error"}` on routing misses and duplicate ids
    /// instead of dropping silently
    pub error_replies: bool,
}

pub struct Relay {
    registry: ConnectionRegistry,
    sanitizer: SdpSanitizer,
    generator: Box<dyn IdGenerator>,
    ice_servers: Vec<IceServer>,
    error_replies: bool,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self::with_generator(config, RandomIdGenerator)
    }

    pub fn with_generator(config: RelayConfig, generator: impl IdGenerator + 'static) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            sanitizer: SdpSanitizer::new(config.sdp_policy),
            generator: Box::new(generator),
            ice_servers: config.ice_servers,
            error_replies: config.error_replies,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Assign an id to a new connection and queue `hello` + `iceServers`.
    ///
    /// On `DuplicateId` nothing is queued (unless error replies are on) and
    /// the caller must drop the transport.
    pub async fn register(&self, sender: mpsc::UnboundedSender<String>) -> Result<ClientId> {
        let id = self.generator.next_id();
        let handle = ConnectionHandle::new(id.clone(), sender);
        let greeting = self.greeting(&id);

        match self.registry.insert(handle.clone(), &greeting).await {
            Ok(()) => {
                tracing::info!("Client {} connected", id);
                Ok(id)
            }
            Err(RegistryError::DuplicateId(id)) => {
                tracing::warn!("Generated id {} is already in use, dropping connection", id);
                if self.error_replies {
                    if let Some(frame) = encode(&Envelope::error("duplicate-id")) {
                        let _ = handle.send(frame);
                    }
                }
                Err(RegistryError::DuplicateId(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Drop a connection from the registry. Peers it was signaling with are
    /// not told.
    pub async fn unregister(&self, id: &ClientId) {
        if self.registry.remove(id).await {
            tracing::info!("Client {} disconnected", id);
        }
    }

    fn greeting(&self, id: &ClientId) -> Vec<String> {
        [
            Envelope::hello(id.clone()),
            Envelope::ice_servers(&self.ice_servers),
        ]
        .iter()
        .filter_map(encode)
        .collect()
    }
}

fn encode(envelope: &Envelope) -> Option<String> {
    match envelope.to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to serialize {} envelope: {}", envelope.type_name(), e);
            None
        }
    }
}
