use parley_protocol::ClientId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection id already registered: {0}")]
    DuplicateId(ClientId),

    #[error("no connection registered for id {0}")]
    NotFound(ClientId),

    #[error("connection {0} is no longer accepting messages")]
    Disconnected(ClientId),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
