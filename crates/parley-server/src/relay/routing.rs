use super::{Relay, encode};
use crate::error::RegistryError;
use crate::sdp::Violation;
use parley_protocol::{ClientId, Envelope};
use serde_json::json;

/// What the connection task should do after a frame was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    /// Drop the sender's transport immediately, without a close handshake
    Terminate,
}

impl Relay {
    /// Route one text frame received from `from`.
    ///
    /// Unparseable frames and routing misses are dropped. An offer that
    /// fails sanitizing terminates the sender and is never forwarded.
    pub async fn handle_message(&self, from: &ClientId, text: &str) -> Disposition {
        let mut envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Discarding frame from {}: {}", from, e);
                return Disposition::Continue;
            }
        };

        let destination = match envelope.destination() {
            Ok(destination) => destination.clone(),
            Err(e) => {
                tracing::debug!("Dropping {} from {}: {}", envelope.type_name(), from, e);
                self.reply_error(from, "missing-destination", None).await;
                return Disposition::Continue;
            }
        };

        if envelope.is_offer() {
            if let Err(violation) = self.sanitize_offer(&mut envelope) {
                tracing::warn!(
                    "Rejected offer from {} to {}: {}; terminating sender",
                    from,
                    destination,
                    violation
                );
                return Disposition::Terminate;
            }
        }

        // Inbound `id` is the destination, outbound it is the origin
        envelope.id = Some(from.clone());

        let Some(frame) = encode(&envelope) else {
            return Disposition::Continue;
        };

        match self.registry.send_to(&destination, frame).await {
            Ok(()) => {
                tracing::debug!(
                    "Forwarded {} from {} to {}",
                    envelope.type_name(),
                    from,
                    destination
                );
            }
            Err(RegistryError::NotFound(_)) => {
                tracing::debug!(
                    "Dropping {} from {}: no client {}",
                    envelope.type_name(),
                    from,
                    destination
                );
                self.reply_error(from, "unknown-destination", Some(&destination))
                    .await;
            }
            Err(e) => {
                tracing::warn!("Failed to forward {} from {}: {}", envelope.type_name(), from, e);
            }
        }

        Disposition::Continue
    }

    fn sanitize_offer(&self, envelope: &mut Envelope) -> Result<(), Violation> {
        let cleaned = {
            let sdp = envelope.sdp().map_err(|_| Violation::MissingSdp)?;
            let sanitized = self.sanitizer.sanitize(sdp)?;
            if !sanitized.is_modified() {
                return Ok(());
            }

            tracing::info!(
                "Stripped {} header extension(s) from offer: {}",
                sanitized.stripped.len(),
                sanitized.stripped.join(", ")
            );
            sanitized.sdp.into_owned()
        };

        envelope.set_sdp(cleaned);
        Ok(())
    }

    async fn reply_error(&self, to: &ClientId, reason: &str, about: Option<&ClientId>) {
        if !self.error_replies {
            return;
        }

        let mut reply = Envelope::error(reason);
        if let Some(about) = about {
            reply = reply.with_field("to", json!(about));
        }

        let Some(frame) = encode(&reply) else {
            return;
        };
        if let Err(e) = self.registry.send_to(to, frame).await {
            tracing::debug!("Could not deliver error reply to {}: {}", to, e);
        }
    }
}
