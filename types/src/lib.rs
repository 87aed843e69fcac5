//! Fundamental types for the freight asset transfer engine.
//!
//! This crate defines the value types shared across every other crate in the
//! workspace: asset and transaction identifiers, script keys, outpoints,
//! anchor transactions, confirmation events, and timestamps.

pub mod ids;
pub mod keys;
pub mod time;
pub mod tx;

pub use ids::{AssetId, BlockHash, Txid};
pub use keys::{DeclaredKey, PublicKey, ScriptKey, SerializedKey};
pub use time::Timestamp;
pub use tx::{Block, OutPoint, Transaction, TxConfirmation, TxIn, TxOut};
