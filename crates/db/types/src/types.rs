//! Durable entry types for the mint store.

use borsh::{BorshDeserialize, BorshSerialize};
use mintio_primitives::{CertificateId, ClaimantId, CollectionId, ReservationId, TokenId};
use serde::Serialize;

/// Lifecycle status of a reservation.
///
/// ```text
/// Reserved → Signing → Confirming → Minted
///     │         │           │
///     │         │           └──→ Cancelled
///     ├─────────┼──────────────→ Cancelled
///     └─────────┴──────────────→ Expired
/// ```
///
/// `Minted`, `Cancelled` and `Expired` are terminal; no transition leaves
/// them. `Confirming` is exempt from lazy expiry on read but the sweeper
/// may still reap it once it has clearly stalled.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize,
)]
pub enum ReservationStatus {
    /// Identifier allocated, deposit address derived, waiting for the
    /// claimant to fund the commit.
    Reserved,

    /// Commit-reveal construction has started. Advisory.
    Signing,

    /// Reveal broadcast, waiting on indexer verification.
    Confirming,

    /// Indexer recognized the mint. Terminal success.
    Minted,

    /// Cancelled by the caller; identifier recycled. Terminal.
    Cancelled,

    /// TTL passed without finalization; identifier recycled. Terminal.
    Expired,
}

impl ReservationStatus {
    /// Whether the status is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Minted | Self::Cancelled | Self::Expired)
    }

    /// Whether the reservation still holds its identifier exclusively.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// The central reservation row.
///
/// Owned exclusively by the store; engine components receive snapshots and
/// request transitions. `payload_bytes` is the literal inscription payload
/// serialized at creation, and together with `signer_pubkey` it is
/// sufficient to deterministically rebuild the locking script (and thereby
/// `deposit_address`) after a process restart.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct ReservationEntry {
    pub id: ReservationId,
    pub collection_id: CollectionId,
    pub claimant: ClaimantId,
    pub token_id: TokenId,

    /// Exact inscription payload bytes. Never regenerated.
    pub payload_bytes: Vec<u8>,

    /// Compressed public key the locking script was built with.
    pub signer_pubkey: Vec<u8>,

    /// Deposit address derived from the locking script at creation.
    pub deposit_address: String,

    pub status: ReservationStatus,

    /// Owning business record flipped on finalization, if any.
    pub certificate_id: Option<CertificateId>,

    pub created_at_ms: u64,
    pub expires_at_ms: u64,

    /// Reveal txid recorded when the reveal is broadcast.
    pub reveal_txid: Option<String>,

    /// Finalization tx hash, set when `Minted`.
    pub finalized_txid: Option<String>,
    pub finalized_at_ms: Option<u64>,
}

impl ReservationEntry {
    /// Whether the TTL has passed at `now_ms`.
    pub fn is_past_expiry(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms
    }
}

/// Per-collection counter row. Never deleted; mutated only under the
/// store's counter transaction.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct CollectionEntry {
    pub id: CollectionId,

    /// Position of this collection's identifier range in the global space.
    pub collection_index: u64,

    /// Ticker the indexer knows the collection by.
    pub ticker: String,

    /// Next unclaimed offset, `0 ..= max_tokens_per_collection`.
    pub next_offset: u64,

    pub total_minted: u64,
}

impl CollectionEntry {
    pub fn new(id: CollectionId, collection_index: u64, ticker: impl Into<String>) -> Self {
        Self {
            id,
            collection_index,
            ticker: ticker.into(),
            next_offset: 0,
            total_minted: 0,
        }
    }
}

/// Business record a reservation finalizes into.
#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub struct CertificateEntry {
    pub id: CertificateId,
    pub status: CertificateStatus,
}

#[derive(Clone, Debug, PartialEq, BorshSerialize, BorshDeserialize)]
pub enum CertificateStatus {
    /// Issued but not inscribed.
    Pending,

    /// Inscribed on the ledger with the given reveal txid.
    Minted { txid: String },
}

/// Result of attempting to insert a fresh reservation.
#[derive(Clone, Debug, PartialEq)]
pub enum InsertOutcome {
    /// The new row was inserted.
    Inserted(ReservationEntry),

    /// An active, unexpired reservation already exists for this
    /// (claimant, collection) pair; the existing row is returned and the
    /// caller must recycle the identifier it allocated for the new row.
    ActiveExists(ReservationEntry),
}

/// Result of an advisory status transition (`Signing`/`Confirming`).
#[derive(Clone, Debug, PartialEq)]
pub enum TransitionOutcome {
    Updated(ReservationEntry),

    /// The row was not in a state the transition applies to.
    InvalidState(ReservationStatus),
}

/// Result of a confirm attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfirmOutcome {
    /// Transitioned to `Minted`; certificate flipped in the same unit.
    Confirmed(ReservationEntry),

    /// Already `Minted`; the stored finalization hash is returned and no
    /// state was mutated.
    AlreadyMinted(String),

    /// The TTL had passed; the row was transitioned to `Expired` and the
    /// identifier recycled in the same unit.
    ExpiredNow,

    /// The row was already in a terminal failure state.
    Terminal(ReservationStatus),
}

/// Result of a cancel attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum CancelOutcome {
    /// Transitioned to `Cancelled` and the identifier recycled in the
    /// same unit.
    Cancelled(TokenId),

    /// The row was already terminal; nothing was mutated.
    AlreadyTerminal(ReservationStatus),
}

/// Result of a sweeper expire attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum ExpireOutcome {
    /// Transitioned to `Expired` and the identifier recycled.
    Expired(TokenId),

    /// A racing transition committed first; the committed status is
    /// returned and nothing was mutated.
    LostRace(ReservationStatus),

    /// The row is not yet reapable (TTL not passed, or `Confirming`
    /// within its grace period).
    NotReapable,
}
