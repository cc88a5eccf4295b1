//! Parley signaling relay
//!
//! Hands every WebSocket client an id, then forwards JSON envelopes between
//! any two ids. Offers are checked on the way through: only audio and video
//! sections are allowed, and `a=extmap` lines for denied RTP header
//! extensions are removed before the offer reaches the other peer.

pub mod api;
pub mod error;
pub mod ids;
pub mod relay;
pub mod sdp;
pub mod state;
pub mod ws;

use std::sync::Arc;

/// Create the application router
pub fn create_app(config: state::Config) -> axum::Router {
    api::create_router(state::AppState::new(config))
}

/// Create the router around an existing relay, e.g. one with a custom id generator
pub fn create_app_with_relay(config: state::Config, relay: Arc<relay::Relay>) -> axum::Router {
    api::create_router(state::AppState::with_relay(config, relay))
}
