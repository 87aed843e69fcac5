//! Porter configuration: collaborator handles and tunable settings.

use crate::chain::ChainBridge;
use crate::courier::ProofCourier;
use crate::error::PorterError;
use crate::wallet::{AssetWallet, CoinSelector, KeyRing, Signer, TxValidator, WalletAnchor};
use freight_journal::ExportLog;
use freight_proof::ProofArchive;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Tunable engine settings.
///
/// Can be loaded from a TOML file via [`PorterSettings::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PorterSettings {
    /// Deadline for lightweight chain RPCs (fee estimation, height).
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// Confirmation target passed to fee estimation.
    #[serde(default = "default_fee_conf_target")]
    pub fee_conf_target: u32,

    /// Maximum concurrent courier deliveries per parcel.
    #[serde(default = "default_courier_fanout")]
    pub courier_fanout: usize,

    /// Capacity of the shipment intake channel.
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_fee_conf_target() -> u32 {
    6
}

fn default_courier_fanout() -> usize {
    4
}

fn default_intake_capacity() -> usize {
    16
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PorterSettings {
    fn default() -> Self {
        Self {
            rpc_timeout_secs: default_rpc_timeout_secs(),
            fee_conf_target: default_fee_conf_target(),
            courier_fanout: default_courier_fanout(),
            intake_capacity: default_intake_capacity(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

impl PorterSettings {
    /// Load settings from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, PorterError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PorterError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse settings from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, PorterError> {
        toml::from_str(s).map_err(|e| PorterError::Config(e.to_string()))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// The main config for the porter: every external collaborator the state
/// machine calls into, plus the process-wide error channel.
///
/// All collaborators must be safe for concurrent calls from multiple
/// driver tasks.
pub struct PorterConfig {
    /// Selects input coins (assets) for a transfer.
    pub coin_selector: Arc<dyn CoinSelector>,

    /// Signs virtual transactions at the asset layer.
    pub signer: Arc<dyn Signer>,

    /// Validates each virtual transaction the engine creates.
    pub tx_validator: Arc<dyn TxValidator>,

    /// Durable log of pending and confirmed parcels.
    pub export_log: Arc<dyn ExportLog>,

    /// Bridge to the chain the engine operates on.
    pub chain_bridge: Arc<dyn ChainBridge>,

    /// Funds and signs the on-chain anchor transaction.
    pub wallet: Arc<dyn WalletAnchor>,

    /// Key ownership oracle used to classify outputs as local.
    pub key_ring: Arc<dyn KeyRing>,

    /// The asset-level wallet funding and signing virtual transactions.
    pub asset_wallet: Arc<dyn AssetWallet>,

    /// Persists proof files for sender and receivers.
    pub proof_archive: Arc<dyn ProofArchive>,

    /// Optional asynchronous transport for receiver proofs.
    pub proof_courier: Option<Arc<dyn ProofCourier>>,

    /// Process-wide error channel for critical engine errors.
    pub err_tx: mpsc::UnboundedSender<PorterError>,

    pub settings: PorterSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_apply_to_empty_toml() {
        let settings = PorterSettings::from_toml_str("").unwrap();
        assert_eq!(settings.rpc_timeout_secs, 30);
        assert_eq!(settings.fee_conf_target, 6);
        assert_eq!(settings.courier_fanout, 4);
        assert_eq!(settings.log_format, "human");
    }

    #[test]
    fn settings_overrides_parse() {
        let settings = PorterSettings::from_toml_str(
            "rpc_timeout_secs = 5\ncourier_fanout = 2\nlog_level = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(settings.rpc_timeout(), Duration::from_secs(5));
        assert_eq!(settings.courier_fanout, 2);
        assert_eq!(settings.log_level, "debug");
    }
}
