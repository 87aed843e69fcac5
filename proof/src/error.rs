use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("proof decoding failed: {0}")]
    Decode(String),

    #[error("proof encoding failed: {0}")]
    Encode(String),

    #[error("proof not found: {0}")]
    NotFound(String),

    #[error("transition proof is missing its confirmation stamp")]
    UnstampedProof,

    #[error("transition proof already stamped with a different confirmation")]
    StampConflict,

    #[error("confirmation does not match the proof's anchor transaction")]
    AnchorMismatch,

    #[error("block header verification failed: {0}")]
    HeaderVerification(String),

    #[error("proof archive error: {0}")]
    Archive(String),
}
