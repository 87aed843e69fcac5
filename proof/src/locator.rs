//! Addressing for archived proof files.

use freight_types::{AssetId, SerializedKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// An encoded proof file or transition proof.
pub type Blob = Vec<u8>;

/// Addresses one proof file in the archive by the `(asset id, script key)`
/// pair whose history it records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub asset_id: AssetId,
    pub script_key: SerializedKey,
}

impl Locator {
    pub fn new(asset_id: AssetId, script_key: SerializedKey) -> Self {
        Self {
            asset_id,
            script_key,
        }
    }

    /// A stable 32-byte digest of the locator, used as a map key when
    /// persisting proof file sets.
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.asset_id.as_bytes());
        hasher.update(self.script_key.as_bytes());
        hasher.finalize().into()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset_id, self.script_key)
    }
}

/// A locator together with the encoded proof file it addresses. This is the
/// unit of import into the proof archive and of delivery via the courier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedProof {
    pub locator: Locator,
    pub blob: Blob,
}

impl AnnotatedProof {
    pub fn new(locator: Locator, blob: Blob) -> Self {
        Self { locator, blob }
    }
}
