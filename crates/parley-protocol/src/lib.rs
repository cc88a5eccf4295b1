//! Parley wire protocol
//!
//! Every frame on the signaling socket is a UTF-8 JSON object carrying a
//! `type` and an `id`. Client to server, `id` names the destination peer;
//! server to client, it names the origin. All other fields belong to the
//! peers and are carried through untouched.

pub mod messages;
pub mod types;

pub use messages::{Envelope, EnvelopeError, MessageType};
pub use types::{ClientId, IceServer};
