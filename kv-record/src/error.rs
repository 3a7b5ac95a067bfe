#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Incomplete key: {0}")]
    IncompleteKey(String),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),
    #[error("Prost error: {0}")]
    DeserializationError(#[from] prost::DecodeError),
    #[error("Not found")]
    NotFound,
}
