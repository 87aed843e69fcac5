use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum JournalError {
    #[error("parcel not found: {0}")]
    NotFound(String),

    #[error("parcel already confirmed: {0}")]
    AlreadyConfirmed(String),

    #[error("journal backend error: {0}")]
    Backend(String),

    #[error("journal serialization error: {0}")]
    Serialization(String),
}
