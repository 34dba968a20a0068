//! Inscription payload wire format.
//!
//! The payload is serialized exactly once, at reservation creation, and the
//! resulting bytes are persisted with the reservation. The deposit address
//! is derived from those literal bytes, so they must never be regenerated
//! from structured fields later: any field-order or whitespace drift would
//! silently change the derived address and strand the committed funds.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::ids::TokenId;

/// The operation tag carried by every mint inscription.
pub const MINT_OPERATION: &str = "mint";

/// Structured form of the inscription record.
///
/// Field order here *is* the wire order; `to_canonical_bytes` emits compact
/// JSON with fields in declaration order and no whitespace.
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct MintPayload {
    /// Protocol tag, e.g. `crt-721`.
    #[serde(rename = "p")]
    pub protocol: String,

    /// Operation, always [`MINT_OPERATION`] for this engine.
    #[serde(rename = "op")]
    pub operation: String,

    /// Collection ticker as known to the indexer.
    #[serde(rename = "tick")]
    pub ticker: String,

    /// Allocated token identifier.
    #[serde(rename = "id")]
    pub token_id: TokenId,

    /// Recipient wallet address.
    #[serde(rename = "to")]
    pub recipient: String,
}

impl MintPayload {
    pub fn new_mint(
        protocol: impl Into<String>,
        ticker: impl Into<String>,
        token_id: TokenId,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            operation: MINT_OPERATION.to_owned(),
            ticker: ticker.into(),
            token_id,
            recipient: recipient.into(),
        }
    }

    /// Serializes to the canonical wire bytes.
    ///
    /// This is the only encoder for the payload; callers persist the result
    /// and treat it as opaque from then on.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        // Compact JSON of a struct is deterministic: declaration field
        // order, no whitespace.
        serde_json::to_vec(self).expect("payload: infallible serialization")
    }

    /// Parses payload bytes back into structured form, for display and
    /// validation only. Round-tripping through this must not be used to
    /// re-derive addresses.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
