//! In-memory proof archive.

use async_trait::async_trait;
use freight_proof::{
    AnnotatedProof, Blob, HeaderVerifier, Locator, ProofArchive, ProofError, ProofFile,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// A [`ProofArchive`] backed by a map, keyed by locator hash. Imports are
/// idempotent (re-imports overwrite with identical content) and every
/// import is logged for inspection.
pub struct MemoryProofArchive {
    proofs: Mutex<HashMap<[u8; 32], Blob>>,
    imports: Mutex<Vec<Locator>>,
}

impl MemoryProofArchive {
    pub fn new() -> Self {
        Self {
            proofs: Mutex::new(HashMap::new()),
            imports: Mutex::new(Vec::new()),
        }
    }

    /// Seed the archive with an existing proof file.
    pub fn insert_file(&self, locator: Locator, file: &ProofFile) -> Result<(), ProofError> {
        let blob = file.encode()?;
        self.proofs
            .lock()
            .expect("proofs lock")
            .insert(locator.hash(), blob);
        Ok(())
    }

    /// The decoded proof file currently stored for a locator.
    pub fn file(&self, locator: &Locator) -> Option<ProofFile> {
        let blob = self
            .proofs
            .lock()
            .expect("proofs lock")
            .get(&locator.hash())
            .cloned()?;
        ProofFile::decode(&blob).ok()
    }

    /// How many times this locator has been imported.
    pub fn import_count_for(&self, locator: &Locator) -> usize {
        self.imports
            .lock()
            .expect("imports lock")
            .iter()
            .filter(|l| **l == *locator)
            .count()
    }

    pub fn total_imports(&self) -> usize {
        self.imports.lock().expect("imports lock").len()
    }
}

impl Default for MemoryProofArchive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProofArchive for MemoryProofArchive {
    async fn fetch_proof(&self, locator: &Locator) -> Result<Blob, ProofError> {
        self.proofs
            .lock()
            .expect("proofs lock")
            .get(&locator.hash())
            .cloned()
            .ok_or_else(|| ProofError::NotFound(locator.to_string()))
    }

    async fn import_proofs(
        &self,
        verifier: &dyn HeaderVerifier,
        proofs: &[AnnotatedProof],
    ) -> Result<(), ProofError> {
        for annotated in proofs {
            let file = ProofFile::decode(&annotated.blob)?;
            if let Some(last) = file.last_proof() {
                verifier
                    .verify_header(last.block_hash, last.block_height)
                    .await?;
            }

            self.proofs
                .lock()
                .expect("proofs lock")
                .insert(annotated.locator.hash(), annotated.blob.clone());
            self.imports
                .lock()
                .expect("imports lock")
                .push(annotated.locator);
        }
        Ok(())
    }
}
