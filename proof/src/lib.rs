//! Provenance proofs for off-chain-committed assets.
//!
//! A proof file is the ordered, append-only sequence of transition proofs
//! for a single `(asset id, script key)` pair. The last proof in a file
//! always references the most recent anchor transaction and the block that
//! confirmed it. Files are persisted by an external proof archive and are
//! addressed by locator.

pub mod archive;
pub mod error;
pub mod file;
pub mod locator;

pub use archive::{HeaderVerifier, ProofArchive};
pub use error::ProofError;
pub use file::{ProofFile, TransitionProof};
pub use locator::{AnnotatedProof, Blob, Locator};
