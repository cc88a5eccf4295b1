//! Connection identifier generation

use parley_protocol::ClientId;
use uuid::Uuid;

/// Source of candidate connection ids.
///
/// Ids only need to be unlikely to collide; the registry still rejects
/// one that is already taken.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ClientId;
}

/// Random v4 UUIDs rendered as 32 hex characters
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> ClientId {
        ClientId::from(Uuid::new_v4())
    }
}
