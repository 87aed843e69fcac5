//! Proof archive collaborator contract.
//!
//! The archive persists proof files addressed by locator. Every backend
//! (database, filesystem, in-memory for testing) implements this trait; the
//! engine depends only on the contract.

use crate::error::ProofError;
use crate::locator::{AnnotatedProof, Blob, Locator};
use async_trait::async_trait;
use freight_types::BlockHash;

/// Verifies that a confirming block header actually exists on chain before
/// a proof referencing it is imported. Implementations are usually backed
/// by the chain bridge.
#[async_trait]
pub trait HeaderVerifier: Send + Sync {
    async fn verify_header(&self, hash: BlockHash, height: u32) -> Result<(), ProofError>;
}

/// Durable storage for proof files.
///
/// `import_proofs` must be idempotent: re-importing a proof file with
/// identical content is a success. The engine relies on this to make
/// crash-resumption safe.
#[async_trait]
pub trait ProofArchive: Send + Sync {
    /// Fetch the encoded proof file addressed by `locator`.
    async fn fetch_proof(&self, locator: &Locator) -> Result<Blob, ProofError>;

    /// Import a batch of annotated proofs, verifying each proof's
    /// confirming block header via `verifier` first.
    async fn import_proofs(
        &self,
        verifier: &dyn HeaderVerifier,
        proofs: &[AnnotatedProof],
    ) -> Result<(), ProofError>;
}
