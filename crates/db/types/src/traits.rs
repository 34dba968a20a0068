//! Trait definition for the mint durable store.
//!
//! Every compound atomic unit of the reservation lifecycle is a single
//! trait method: status transitions, identifier recycling and business
//! record updates that must be atomic together are never composed out of
//! separate calls by callers. Implementations execute each method as one
//! transaction against the underlying store, so all invariants hold under
//! concurrent access to the persisted rows.

use mintio_primitives::{CertificateId, ClaimantId, CollectionId, ReservationId, TokenId};

use crate::{
    types::{
        CancelOutcome, CertificateEntry, CollectionEntry, ConfirmOutcome, ExpireOutcome,
        InsertOutcome, ReservationEntry, TransitionOutcome,
    },
    DbResult,
};

pub trait MintDatabase: Send + Sync + 'static {
    /// Registers a collection counter row. Idempotent: re-registering an
    /// existing collection keeps its counter state untouched.
    fn register_collection(&self, entry: CollectionEntry) -> DbResult<()>;

    /// Gets a collection counter row.
    fn get_collection(&self, cid: &CollectionId) -> DbResult<Option<CollectionEntry>>;

    /// Atomically claims the next counter offset for the collection.
    ///
    /// Returns the claimed offset, or `None` when `next_offset` has
    /// reached `max_tokens`. The read-modify-write is a single locked
    /// unit: two concurrent callers never claim the same offset.
    fn try_advance_counter(&self, cid: &CollectionId, max_tokens: u64) -> DbResult<Option<u64>>;

    /// Atomically pops one identifier from the collection's recycle pool,
    /// if any. Two concurrent callers never pop the same identifier.
    fn pop_recycled_token(&self, cid: &CollectionId) -> DbResult<Option<TokenId>>;

    /// Returns an identifier to the recycle pool. Idempotent: re-adding an
    /// identifier already pooled is a no-op.
    fn push_recycled_token(&self, cid: &CollectionId, token: TokenId) -> DbResult<()>;

    /// Current contents of the recycle pool, for inspection.
    fn recycled_tokens(&self, cid: &CollectionId) -> DbResult<Vec<TokenId>>;

    /// Inserts a `Reserved` row, unless an active unexpired reservation
    /// already exists for the same (claimant, collection) pair, in which
    /// case the existing row is returned instead and nothing is written.
    fn insert_reservation(&self, entry: ReservationEntry, now_ms: u64)
        -> DbResult<InsertOutcome>;

    /// Fetches a reservation snapshot.
    fn get_reservation(&self, id: ReservationId) -> DbResult<Option<ReservationEntry>>;

    /// Fetches the active unexpired reservation for a (claimant,
    /// collection) pair, if any.
    fn get_active_reservation(
        &self,
        claimant: &ClaimantId,
        cid: &CollectionId,
        now_ms: u64,
    ) -> DbResult<Option<ReservationEntry>>;

    /// `Reserved → Signing`. Advisory; idempotent when already `Signing`.
    fn mark_signing(&self, id: ReservationId) -> DbResult<TransitionOutcome>;

    /// `Signing → Confirming`, recording the broadcast reveal txid.
    fn mark_confirming(&self, id: ReservationId, reveal_txid: &str)
        -> DbResult<TransitionOutcome>;

    /// Finalizes a reservation per the lifecycle rules:
    ///
    /// - already `Minted`: returns the stored hash, mutates nothing;
    /// - `Cancelled`/`Expired`: returns the terminal status;
    /// - past expiry and not `Confirming`: transitions to `Expired` and
    ///   recycles the identifier, in one unit;
    /// - otherwise sets `Minted`, stores the hash and timestamp, and flips
    ///   the owning certificate, all in one unit.
    fn confirm_reservation(
        &self,
        id: ReservationId,
        txid: &str,
        now_ms: u64,
    ) -> DbResult<ConfirmOutcome>;

    /// Cancels a reservation and recycles its identifier in one unit.
    /// No-op failure when already terminal.
    fn cancel_reservation(&self, id: ReservationId, now_ms: u64) -> DbResult<CancelOutcome>;

    /// Sweeper transition: expires the row and recycles the identifier in
    /// one unit, iff the row is still reapable when the transaction runs.
    /// `Confirming` rows are reapable only past `expires_at +
    /// confirming_grace_ms`.
    fn expire_reservation(
        &self,
        id: ReservationId,
        now_ms: u64,
        confirming_grace_ms: u64,
    ) -> DbResult<ExpireOutcome>;

    /// Scans for reservations the sweeper should attempt to expire at
    /// `now_ms`. The returned ids are candidates; the actual expiry is the
    /// compare-and-swap in [`expire_reservation`](Self::expire_reservation).
    fn get_expired_candidates(
        &self,
        now_ms: u64,
        confirming_grace_ms: u64,
    ) -> DbResult<Vec<ReservationId>>;

    /// Stores a certificate business record.
    fn put_certificate(&self, entry: CertificateEntry) -> DbResult<()>;

    /// Fetches a certificate business record.
    fn get_certificate(&self, id: &CertificateId) -> DbResult<Option<CertificateEntry>>;
}
