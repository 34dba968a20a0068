//! Protocol-level parameters for the mint engine.
//!
//! This is the single configuration surface for every fee, ticker, size
//! and TTL policy the engine applies. Nothing else in the workspace may
//! hard-code a fee or protocol default.

use bitcoin::Network;
use serde::{Deserialize, Serialize};

/// Default maximum tokens per collection.
pub const DEFAULT_MAX_TOKENS_PER_COLLECTION: u64 = 1000;

/// Default reservation TTL in milliseconds (15 minutes).
pub const DEFAULT_RESERVATION_TTL_MS: u64 = 15 * 60 * 1000;

/// Default grace period past expiry before the sweeper reaps a stalled
/// `confirming` reservation (1 hour).
pub const DEFAULT_CONFIRMING_GRACE_MS: u64 = 60 * 60 * 1000;

/// Default minimum fee (sats) the reveal transaction must pay for the
/// indexer to recognize the inscription. Paying less produces a
/// transaction the ledger accepts but the indexer silently ignores.
pub const DEFAULT_MIN_INSCRIPTION_FEE_SATS: u64 = 100_000;

/// Default fee rate in sats per virtual byte.
pub const DEFAULT_FEE_RATE_SAT_PER_VB: u64 = 50;

/// Default payload size ceiling in bytes.
///
/// The redeem script embedding the payload must stay within the ledger's
/// 520-byte P2SH redeem-script limit, so this is deliberately well below
/// that.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 400;

/// Default protocol tag carried in every inscription payload.
pub const DEFAULT_PROTOCOL_TAG: &str = "crt-721";

/// Default minimum confirmations for a UTXO to be spendable by the engine.
pub const DEFAULT_MIN_UTXO_CONFIRMATIONS: u64 = 1;

/// Parameters governing allocation, expiry and transaction construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintParams {
    /// Size of each collection's contiguous identifier range.
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_collection: u64,

    /// Fixed TTL applied to every reservation at creation.
    #[serde(default = "default_reservation_ttl_ms")]
    pub reservation_ttl_ms: u64,

    /// How long past expiry a `confirming` reservation is left alone
    /// before the sweeper treats it as stalled.
    #[serde(default = "default_confirming_grace_ms")]
    pub confirming_grace_ms: u64,

    /// Minimum fee the reveal transaction must pay.
    #[serde(default = "default_min_inscription_fee")]
    pub min_inscription_fee_sats: u64,

    /// Fee rate for commit/reveal construction.
    #[serde(default = "default_fee_rate")]
    pub fee_rate_sat_per_vb: u64,

    /// Inscription payload size ceiling, enforced at reservation creation.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Protocol tag for the payload wire format.
    #[serde(default = "default_protocol_tag")]
    pub protocol_tag: String,

    /// Ledger network addresses are derived for.
    pub network: Network,

    /// UTXOs with fewer confirmations than this are not selected.
    #[serde(default = "default_min_utxo_confirmations")]
    pub min_utxo_confirmations: u64,
}

impl MintParams {
    /// Reasonable defaults on the given network.
    pub fn with_defaults(network: Network) -> Self {
        Self {
            max_tokens_per_collection: DEFAULT_MAX_TOKENS_PER_COLLECTION,
            reservation_ttl_ms: DEFAULT_RESERVATION_TTL_MS,
            confirming_grace_ms: DEFAULT_CONFIRMING_GRACE_MS,
            min_inscription_fee_sats: DEFAULT_MIN_INSCRIPTION_FEE_SATS,
            fee_rate_sat_per_vb: DEFAULT_FEE_RATE_SAT_PER_VB,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            protocol_tag: DEFAULT_PROTOCOL_TAG.to_owned(),
            network,
            min_utxo_confirmations: DEFAULT_MIN_UTXO_CONFIRMATIONS,
        }
    }

    /// First token identifier of the collection with the given index.
    pub fn first_token_id(&self, collection_index: u64) -> u64 {
        collection_index * self.max_tokens_per_collection + 1
    }
}

fn default_max_tokens() -> u64 {
    DEFAULT_MAX_TOKENS_PER_COLLECTION
}

fn default_reservation_ttl_ms() -> u64 {
    DEFAULT_RESERVATION_TTL_MS
}

fn default_confirming_grace_ms() -> u64 {
    DEFAULT_CONFIRMING_GRACE_MS
}

fn default_min_inscription_fee() -> u64 {
    DEFAULT_MIN_INSCRIPTION_FEE_SATS
}

fn default_fee_rate() -> u64 {
    DEFAULT_FEE_RATE_SAT_PER_VB
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

fn default_protocol_tag() -> String {
    DEFAULT_PROTOCOL_TAG.to_owned()
}

fn default_min_utxo_confirmations() -> u64 {
    DEFAULT_MIN_UTXO_CONFIRMATIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ranges_contiguous() {
        let params = MintParams::with_defaults(Network::Regtest);
        assert_eq!(params.first_token_id(0), 1);
        assert_eq!(params.first_token_id(1), 1001);
        // Last id of collection 0 abuts first id of collection 1.
        let last_of_zero = params.first_token_id(0) + params.max_tokens_per_collection - 1;
        assert_eq!(last_of_zero + 1, params.first_token_id(1));
    }
}
