//! Nullable collaborators for deterministic testing.
//!
//! Every external dependency of the engine (chain, wallets, keyring,
//! archive, courier, journal) has a test-friendly implementation here
//! that:
//! - returns deterministic, scriptable values
//! - can be controlled and inspected programmatically
//! - never touches the filesystem or network
//!
//! Usage: swap real collaborators for nullables in tests. A shared
//! [`CallSequence`] records cross-collaborator call ordering, which the
//! test suite uses to assert e.g. that journaling completes before
//! broadcast.

pub mod archive;
pub mod chain;
pub mod courier;
pub mod journal;
pub mod sequence;
pub mod wallet;

pub use archive::MemoryProofArchive;
pub use chain::NullChainBridge;
pub use courier::NullCourier;
pub use journal::MemoryJournal;
pub use sequence::CallSequence;
pub use wallet::{
    NullAssetWallet, NullCoinSelector, NullKeyRing, NullSigner, NullTxValidator,
    NullWalletAnchor, PassiveSpec,
};
