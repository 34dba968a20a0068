use mintio_db_types::{
    traits::MintDatabase,
    types::{
        CancelOutcome, CertificateEntry, CertificateStatus, CollectionEntry, ConfirmOutcome,
        ExpireOutcome, InsertOutcome, ReservationEntry, ReservationStatus, TransitionOutcome,
    },
    DbError, DbResult,
};
use mintio_primitives::{CertificateId, ClaimantId, CollectionId, ReservationId, TokenId};
use sled::{transaction::TransactionalTree, Transactional, Tree};

use crate::codec::{abort, dec, enc, tdec, tenc, TxResult};

const COLLECTIONS_TREE: &str = "collections";
const POOL_TREE: &str = "pool";
const RESERVATIONS_TREE: &str = "reservations";
const ACTIVE_TREE: &str = "active";
const CERTIFICATES_TREE: &str = "certificates";

/// Sled-backed mint store.
pub struct MintStoreSled {
    // Held so the underlying store stays open for the trees' lifetime.
    _db: sled::Db,
    collections: Tree,
    pool: Tree,
    reservations: Tree,
    active: Tree,
    certificates: Tree,
}

impl std::fmt::Debug for MintStoreSled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MintStoreSled").finish_non_exhaustive()
    }
}

impl MintStoreSled {
    pub fn new(db: sled::Db) -> DbResult<Self> {
        Ok(Self {
            collections: db.open_tree(COLLECTIONS_TREE)?,
            pool: db.open_tree(POOL_TREE)?,
            reservations: db.open_tree(RESERVATIONS_TREE)?,
            active: db.open_tree(ACTIVE_TREE)?,
            certificates: db.open_tree(CERTIFICATES_TREE)?,
            _db: db,
        })
    }

    /// Opens (or creates) the store at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> DbResult<Self> {
        Self::new(sled::open(path)?)
    }
}

/// Key in the active-reservation index for a (claimant, collection) pair.
fn active_key(claimant: &ClaimantId, cid: &CollectionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(claimant.as_str().len() + 1 + cid.as_str().len());
    key.extend_from_slice(claimant.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(cid.as_str().as_bytes());
    key
}

/// Whether the sweeper may reap this row at `now_ms`.
///
/// `Confirming` rows get a grace period past expiry since a legitimate
/// reveal may take longer than the nominal TTL.
fn is_reapable(entry: &ReservationEntry, now_ms: u64, confirming_grace_ms: u64) -> bool {
    match entry.status {
        ReservationStatus::Reserved | ReservationStatus::Signing => {
            entry.is_past_expiry(now_ms)
        }
        ReservationStatus::Confirming => {
            now_ms > entry.expires_at_ms.saturating_add(confirming_grace_ms)
        }
        _ => false,
    }
}

/// Inserts `token` into the pooled multiset, keeping it sorted. No-op if
/// already present.
fn pool_insert(tokens: &mut Vec<TokenId>, token: TokenId) {
    if let Err(pos) = tokens.binary_search(&token) {
        tokens.insert(pos, token);
    }
}

/// Reads the pool vector for a collection inside a transaction.
fn tx_read_pool(pool: &TransactionalTree, cid: &CollectionId) -> TxResult<Vec<TokenId>> {
    match pool.get(cid.as_str().as_bytes())? {
        Some(raw) => tdec(&raw),
        None => Ok(Vec::new()),
    }
}

/// Reads a reservation row inside a transaction, aborting if absent.
fn tx_read_reservation(
    reservations: &TransactionalTree,
    id: ReservationId,
) -> TxResult<ReservationEntry> {
    match reservations.get(id.as_bytes())? {
        Some(raw) => tdec(&raw),
        None => abort(DbError::NonExistentEntry),
    }
}

/// Removes the active-index entry for the row's pair, but only if it still
/// points at this row (a newer reservation may have replaced it).
fn tx_release_active(active: &TransactionalTree, entry: &ReservationEntry) -> TxResult<()> {
    let akey = active_key(&entry.claimant, &entry.collection_id);
    if let Some(raw) = active.get(akey.as_slice())? {
        if raw.as_ref() == entry.id.as_bytes() {
            active.remove(akey.as_slice())?;
        }
    }
    Ok(())
}

impl MintDatabase for MintStoreSled {
    fn register_collection(&self, entry: CollectionEntry) -> DbResult<()> {
        let res = self.collections.transaction(|col| {
            let key = entry.id.as_str().as_bytes();
            // Idempotent: an existing counter row is never reset.
            if col.get(key)?.is_none() {
                col.insert(key, tenc(&entry)?)?;
            }
            Ok(())
        });
        Ok(res?)
    }

    fn get_collection(&self, cid: &CollectionId) -> DbResult<Option<CollectionEntry>> {
        self.collections
            .get(cid.as_str().as_bytes())?
            .map(|raw| dec(&raw))
            .transpose()
    }

    fn try_advance_counter(&self, cid: &CollectionId, max_tokens: u64) -> DbResult<Option<u64>> {
        let res = self.collections.transaction(|col| {
            let key = cid.as_str().as_bytes();
            let mut entry: CollectionEntry = match col.get(key)? {
                Some(raw) => tdec(&raw)?,
                None => return abort(DbError::MissingCollection(cid.clone())),
            };

            if entry.next_offset >= max_tokens {
                return Ok(None);
            }

            let claimed = entry.next_offset;
            entry.next_offset += 1;
            col.insert(key, tenc(&entry)?)?;
            Ok(Some(claimed))
        });
        Ok(res?)
    }

    fn pop_recycled_token(&self, cid: &CollectionId) -> DbResult<Option<TokenId>> {
        let res = self.pool.transaction(|pool| {
            let mut tokens = tx_read_pool(pool, cid)?;
            if tokens.is_empty() {
                return Ok(None);
            }
            // Lowest identifier first, so reuse is deterministic.
            let token = tokens.remove(0);
            pool.insert(cid.as_str().as_bytes(), tenc(&tokens)?)?;
            Ok(Some(token))
        });
        Ok(res?)
    }

    fn push_recycled_token(&self, cid: &CollectionId, token: TokenId) -> DbResult<()> {
        let res = self.pool.transaction(|pool| {
            let mut tokens = tx_read_pool(pool, cid)?;
            pool_insert(&mut tokens, token);
            pool.insert(cid.as_str().as_bytes(), tenc(&tokens)?)?;
            Ok(())
        });
        Ok(res?)
    }

    fn recycled_tokens(&self, cid: &CollectionId) -> DbResult<Vec<TokenId>> {
        match self.pool.get(cid.as_str().as_bytes())? {
            Some(raw) => dec(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn insert_reservation(
        &self,
        entry: ReservationEntry,
        now_ms: u64,
    ) -> DbResult<InsertOutcome> {
        let res = [&self.reservations, &self.active].transaction(|trees| {
            let (reservations, active) = (&trees[0], &trees[1]);
            let akey = active_key(&entry.claimant, &entry.collection_id);

            // Idempotent create: an unexpired active row for the pair wins
            // over the fresh insert.
            if let Some(raw_rid) = active.get(akey.as_slice())? {
                if let Some(raw) = reservations.get(raw_rid.as_ref())? {
                    let existing: ReservationEntry = tdec(&raw)?;
                    let still_active = existing.status.is_active()
                        && (existing.status == ReservationStatus::Confirming
                            || !existing.is_past_expiry(now_ms));
                    if still_active {
                        return Ok(InsertOutcome::ActiveExists(existing));
                    }
                }
            }

            reservations.insert(entry.id.as_bytes().as_slice(), tenc(&entry)?)?;
            active.insert(akey.as_slice(), entry.id.as_bytes().as_slice())?;
            Ok(InsertOutcome::Inserted(entry.clone()))
        });
        Ok(res?)
    }

    fn get_reservation(&self, id: ReservationId) -> DbResult<Option<ReservationEntry>> {
        self.reservations
            .get(id.as_bytes())?
            .map(|raw| dec(&raw))
            .transpose()
    }

    fn get_active_reservation(
        &self,
        claimant: &ClaimantId,
        cid: &CollectionId,
        now_ms: u64,
    ) -> DbResult<Option<ReservationEntry>> {
        let Some(raw_rid) = self.active.get(active_key(claimant, cid))? else {
            return Ok(None);
        };
        let Some(raw) = self.reservations.get(raw_rid)? else {
            return Ok(None);
        };
        let entry: ReservationEntry = dec(&raw)?;
        let still_active = entry.status.is_active()
            && (entry.status == ReservationStatus::Confirming || !entry.is_past_expiry(now_ms));
        Ok(still_active.then_some(entry))
    }

    fn mark_signing(&self, id: ReservationId) -> DbResult<TransitionOutcome> {
        let res = self.reservations.transaction(|reservations| {
            let mut entry = tx_read_reservation(reservations, id)?;
            match entry.status {
                ReservationStatus::Reserved => {
                    entry.status = ReservationStatus::Signing;
                    reservations.insert(id.as_bytes().as_slice(), tenc(&entry)?)?;
                    Ok(TransitionOutcome::Updated(entry))
                }
                // Idempotent retry.
                ReservationStatus::Signing => Ok(TransitionOutcome::Updated(entry)),
                other => Ok(TransitionOutcome::InvalidState(other)),
            }
        });
        Ok(res?)
    }

    fn mark_confirming(
        &self,
        id: ReservationId,
        reveal_txid: &str,
    ) -> DbResult<TransitionOutcome> {
        let res = self.reservations.transaction(|reservations| {
            let mut entry = tx_read_reservation(reservations, id)?;
            match entry.status {
                ReservationStatus::Signing => {
                    entry.status = ReservationStatus::Confirming;
                    entry.reveal_txid = Some(reveal_txid.to_owned());
                    reservations.insert(id.as_bytes().as_slice(), tenc(&entry)?)?;
                    Ok(TransitionOutcome::Updated(entry))
                }
                // Idempotent when the same reveal is re-reported.
                ReservationStatus::Confirming
                    if entry.reveal_txid.as_deref() == Some(reveal_txid) =>
                {
                    Ok(TransitionOutcome::Updated(entry))
                }
                other => Ok(TransitionOutcome::InvalidState(other)),
            }
        });
        Ok(res?)
    }

    fn confirm_reservation(
        &self,
        id: ReservationId,
        txid: &str,
        now_ms: u64,
    ) -> DbResult<ConfirmOutcome> {
        let trees = [
            &self.reservations,
            &self.active,
            &self.pool,
            &self.collections,
            &self.certificates,
        ];
        let res = trees.transaction(|trees| {
            let (reservations, active, pool, collections, certificates) =
                (&trees[0], &trees[1], &trees[2], &trees[3], &trees[4]);

            let mut entry = tx_read_reservation(reservations, id)?;

            match entry.status {
                ReservationStatus::Minted => {
                    // Do not re-verify; report the stored hash.
                    let stored = entry.finalized_txid.clone().unwrap_or_default();
                    return Ok(ConfirmOutcome::AlreadyMinted(stored));
                }
                ReservationStatus::Cancelled | ReservationStatus::Expired => {
                    return Ok(ConfirmOutcome::Terminal(entry.status));
                }
                _ => {}
            }

            // Lazy expiry: a confirm attempt on a stale row expires it,
            // recycling the identifier in the same unit. `Confirming` rows
            // are exempt; the reveal may legitimately outlive the TTL.
            if entry.is_past_expiry(now_ms) && entry.status != ReservationStatus::Confirming {
                entry.status = ReservationStatus::Expired;
                reservations.insert(id.as_bytes().as_slice(), tenc(&entry)?)?;
                let mut tokens = tx_read_pool(pool, &entry.collection_id)?;
                pool_insert(&mut tokens, entry.token_id);
                pool.insert(entry.collection_id.as_str().as_bytes(), tenc(&tokens)?)?;
                tx_release_active(active, &entry)?;
                return Ok(ConfirmOutcome::ExpiredNow);
            }

            entry.status = ReservationStatus::Minted;
            entry.finalized_txid = Some(txid.to_owned());
            entry.finalized_at_ms = Some(now_ms);
            reservations.insert(id.as_bytes().as_slice(), tenc(&entry)?)?;
            tx_release_active(active, &entry)?;

            // Counter bookkeeping.
            let ckey = entry.collection_id.as_str().as_bytes();
            let mut collection: CollectionEntry = match collections.get(ckey)? {
                Some(raw) => tdec(&raw)?,
                None => return abort(DbError::MissingCollection(entry.collection_id.clone())),
            };
            collection.total_minted += 1;
            collections.insert(ckey, tenc(&collection)?)?;

            // The owning business record flips in the same atomic unit; a
            // minted reservation with a pending certificate must never be
            // observable.
            if let Some(cert_id) = &entry.certificate_id {
                let cert = CertificateEntry {
                    id: cert_id.clone(),
                    status: CertificateStatus::Minted {
                        txid: txid.to_owned(),
                    },
                };
                certificates.insert(cert_id.0.as_bytes(), tenc(&cert)?)?;
            }

            Ok(ConfirmOutcome::Confirmed(entry))
        });
        Ok(res?)
    }

    fn cancel_reservation(&self, id: ReservationId, _now_ms: u64) -> DbResult<CancelOutcome> {
        let res = [&self.reservations, &self.active, &self.pool].transaction(|trees| {
            let (reservations, active, pool) = (&trees[0], &trees[1], &trees[2]);

            let mut entry = tx_read_reservation(reservations, id)?;
            if entry.status.is_terminal() {
                return Ok(CancelOutcome::AlreadyTerminal(entry.status));
            }

            entry.status = ReservationStatus::Cancelled;
            reservations.insert(id.as_bytes().as_slice(), tenc(&entry)?)?;

            let mut tokens = tx_read_pool(pool, &entry.collection_id)?;
            pool_insert(&mut tokens, entry.token_id);
            pool.insert(entry.collection_id.as_str().as_bytes(), tenc(&tokens)?)?;

            tx_release_active(active, &entry)?;
            Ok(CancelOutcome::Cancelled(entry.token_id))
        });
        Ok(res?)
    }

    fn expire_reservation(
        &self,
        id: ReservationId,
        now_ms: u64,
        confirming_grace_ms: u64,
    ) -> DbResult<ExpireOutcome> {
        let res = [&self.reservations, &self.active, &self.pool].transaction(|trees| {
            let (reservations, active, pool) = (&trees[0], &trees[1], &trees[2]);

            let mut entry = tx_read_reservation(reservations, id)?;
            if entry.status.is_terminal() {
                // Cancel/confirm committed first; nothing to do.
                return Ok(ExpireOutcome::LostRace(entry.status));
            }
            if !is_reapable(&entry, now_ms, confirming_grace_ms) {
                return Ok(ExpireOutcome::NotReapable);
            }

            entry.status = ReservationStatus::Expired;
            reservations.insert(id.as_bytes().as_slice(), tenc(&entry)?)?;

            let mut tokens = tx_read_pool(pool, &entry.collection_id)?;
            pool_insert(&mut tokens, entry.token_id);
            pool.insert(entry.collection_id.as_str().as_bytes(), tenc(&tokens)?)?;

            tx_release_active(active, &entry)?;
            Ok(ExpireOutcome::Expired(entry.token_id))
        });
        Ok(res?)
    }

    fn get_expired_candidates(
        &self,
        now_ms: u64,
        confirming_grace_ms: u64,
    ) -> DbResult<Vec<ReservationId>> {
        let mut out = Vec::new();
        for kv in self.reservations.iter() {
            let (_, raw) = kv?;
            let entry: ReservationEntry = dec(&raw)?;
            if is_reapable(&entry, now_ms, confirming_grace_ms) {
                out.push(entry.id);
            }
        }
        Ok(out)
    }

    fn put_certificate(&self, entry: CertificateEntry) -> DbResult<()> {
        self.certificates
            .insert(entry.id.0.as_bytes(), enc(&entry)?)?;
        Ok(())
    }

    fn get_certificate(&self, id: &CertificateId) -> DbResult<Option<CertificateEntry>> {
        self.certificates
            .get(id.0.as_bytes())?
            .map(|raw| dec(&raw))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use mintio_db_types::types::CertificateStatus;
    use mintio_primitives::CertificateId;

    use super::*;
    use crate::test_utils::{get_test_store, make_reservation, register_test_collection};

    const TTL: u64 = 1000;
    const GRACE: u64 = 5000;

    #[test]
    fn test_counter_advance_and_sold_out() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);

        assert_eq!(store.try_advance_counter(&cid, 3).unwrap(), Some(0));
        assert_eq!(store.try_advance_counter(&cid, 3).unwrap(), Some(1));
        assert_eq!(store.try_advance_counter(&cid, 3).unwrap(), Some(2));
        assert_eq!(store.try_advance_counter(&cid, 3).unwrap(), None);

        // Re-registering must not reset the counter.
        register_test_collection(&store, "certs", 0);
        assert_eq!(store.try_advance_counter(&cid, 3).unwrap(), None);
    }

    #[test]
    fn test_counter_missing_collection() {
        let store = get_test_store();
        let cid = CollectionId::from("ghost");
        let err = store.try_advance_counter(&cid, 10).unwrap_err();
        assert!(matches!(err, DbError::MissingCollection(_)));
    }

    #[test]
    fn test_pool_push_pop_idempotent() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);

        store.push_recycled_token(&cid, TokenId(7)).unwrap();
        store.push_recycled_token(&cid, TokenId(3)).unwrap();
        // Re-adding an identifier already pooled is a no-op.
        store.push_recycled_token(&cid, TokenId(7)).unwrap();
        assert_eq!(
            store.recycled_tokens(&cid).unwrap(),
            vec![TokenId(3), TokenId(7)]
        );

        assert_eq!(store.pop_recycled_token(&cid).unwrap(), Some(TokenId(3)));
        assert_eq!(store.pop_recycled_token(&cid).unwrap(), Some(TokenId(7)));
        assert_eq!(store.pop_recycled_token(&cid).unwrap(), None);
    }

    #[test]
    fn test_insert_is_idempotent_per_pair() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);

        let first = make_reservation("alice", &cid, 1, 0, TTL);
        let outcome = store.insert_reservation(first.clone(), 0).unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(first.clone()));

        // Same pair, new row: existing active row wins.
        let second = make_reservation("alice", &cid, 2, 10, TTL);
        let outcome = store.insert_reservation(second, 10).unwrap();
        assert_eq!(outcome, InsertOutcome::ActiveExists(first.clone()));

        // Different claimant proceeds independently.
        let other = make_reservation("bob", &cid, 2, 10, TTL);
        let outcome = store.insert_reservation(other.clone(), 10).unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(other));

        // After the first expires, a fresh insert goes through.
        let third = make_reservation("alice", &cid, 3, TTL + 1, TTL);
        let outcome = store.insert_reservation(third.clone(), TTL + 1).unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(third));
    }

    #[test]
    fn test_mark_signing_and_confirming() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);
        let entry = make_reservation("alice", &cid, 1, 0, TTL);
        store.insert_reservation(entry.clone(), 0).unwrap();

        let out = store.mark_signing(entry.id).unwrap();
        assert!(matches!(out, TransitionOutcome::Updated(ref e) if e.status == ReservationStatus::Signing));
        // Idempotent.
        let out = store.mark_signing(entry.id).unwrap();
        assert!(matches!(out, TransitionOutcome::Updated(_)));

        let out = store.mark_confirming(entry.id, "beef").unwrap();
        assert!(matches!(out, TransitionOutcome::Updated(ref e) if e.reveal_txid.as_deref() == Some("beef")));
        // Same reveal re-reported is fine; a different one is not.
        let out = store.mark_confirming(entry.id, "beef").unwrap();
        assert!(matches!(out, TransitionOutcome::Updated(_)));
        let out = store.mark_confirming(entry.id, "dead").unwrap();
        assert_eq!(
            out,
            TransitionOutcome::InvalidState(ReservationStatus::Confirming)
        );

        // Signing after confirming is invalid.
        let out = store.mark_signing(entry.id).unwrap();
        assert_eq!(
            out,
            TransitionOutcome::InvalidState(ReservationStatus::Confirming)
        );
    }

    #[test]
    fn test_confirm_flips_certificate_atomically() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);

        let mut entry = make_reservation("alice", &cid, 1, 0, TTL);
        entry.certificate_id = Some(CertificateId::from("cert-9"));
        store.insert_reservation(entry.clone(), 0).unwrap();

        let out = store.confirm_reservation(entry.id, "beef", 100).unwrap();
        let ConfirmOutcome::Confirmed(updated) = out else {
            panic!("expected Confirmed, got {out:?}");
        };
        assert_eq!(updated.status, ReservationStatus::Minted);
        assert_eq!(updated.finalized_txid.as_deref(), Some("beef"));
        assert_eq!(updated.finalized_at_ms, Some(100));

        let cert = store
            .get_certificate(&CertificateId::from("cert-9"))
            .unwrap()
            .expect("certificate written");
        assert_eq!(
            cert.status,
            CertificateStatus::Minted {
                txid: "beef".to_owned()
            }
        );

        let collection = store.get_collection(&cid).unwrap().unwrap();
        assert_eq!(collection.total_minted, 1);

        // The pair is no longer active.
        assert!(store
            .get_active_reservation(&ClaimantId::from("alice"), &cid, 100)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_confirm_idempotent() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);
        let entry = make_reservation("alice", &cid, 1, 0, TTL);
        store.insert_reservation(entry.clone(), 0).unwrap();

        store.confirm_reservation(entry.id, "beef", 100).unwrap();
        let out = store.confirm_reservation(entry.id, "beef", 200).unwrap();
        assert_eq!(out, ConfirmOutcome::AlreadyMinted("beef".to_owned()));

        // State mutated only once.
        let collection = store.get_collection(&cid).unwrap().unwrap();
        assert_eq!(collection.total_minted, 1);
        let stored = store.get_reservation(entry.id).unwrap().unwrap();
        assert_eq!(stored.finalized_at_ms, Some(100));
    }

    #[test]
    fn test_confirm_lazy_expiry_recycles() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);
        let entry = make_reservation("alice", &cid, 4, 0, TTL);
        store.insert_reservation(entry.clone(), 0).unwrap();

        let out = store
            .confirm_reservation(entry.id, "beef", TTL + 1)
            .unwrap();
        assert_eq!(out, ConfirmOutcome::ExpiredNow);

        let stored = store.get_reservation(entry.id).unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Expired);
        assert_eq!(store.recycled_tokens(&cid).unwrap(), vec![TokenId(4)]);
    }

    #[test]
    fn test_confirming_exempt_from_lazy_expiry() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);
        let entry = make_reservation("alice", &cid, 1, 0, TTL);
        store.insert_reservation(entry.clone(), 0).unwrap();
        store.mark_signing(entry.id).unwrap();
        store.mark_confirming(entry.id, "beef").unwrap();

        // Past the TTL, but the reveal was already broadcast.
        let out = store
            .confirm_reservation(entry.id, "beef", TTL + 500)
            .unwrap();
        assert!(matches!(out, ConfirmOutcome::Confirmed(_)));
    }

    #[test]
    fn test_cancel_recycles_and_is_final() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);
        let entry = make_reservation("alice", &cid, 5, 0, TTL);
        store.insert_reservation(entry.clone(), 0).unwrap();

        let out = store.cancel_reservation(entry.id, 10).unwrap();
        assert_eq!(out, CancelOutcome::Cancelled(TokenId(5)));
        // Identifier immediately allocable.
        assert_eq!(store.recycled_tokens(&cid).unwrap(), vec![TokenId(5)]);

        // Cancel again: no-op failure.
        let out = store.cancel_reservation(entry.id, 20).unwrap();
        assert_eq!(
            out,
            CancelOutcome::AlreadyTerminal(ReservationStatus::Cancelled)
        );
        // Not pooled twice.
        assert_eq!(store.recycled_tokens(&cid).unwrap(), vec![TokenId(5)]);

        // Confirm after cancel: terminal error for the caller.
        let out = store.confirm_reservation(entry.id, "beef", 30).unwrap();
        assert_eq!(out, ConfirmOutcome::Terminal(ReservationStatus::Cancelled));
    }

    #[test]
    fn test_cancel_after_mint_is_noop() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);
        let entry = make_reservation("alice", &cid, 1, 0, TTL);
        store.insert_reservation(entry.clone(), 0).unwrap();
        store.confirm_reservation(entry.id, "beef", 10).unwrap();

        let out = store.cancel_reservation(entry.id, 20).unwrap();
        assert_eq!(
            out,
            CancelOutcome::AlreadyTerminal(ReservationStatus::Minted)
        );
        assert!(store.recycled_tokens(&cid).unwrap().is_empty());
    }

    #[test]
    fn test_expire_cas_semantics() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);

        // Not yet reapable.
        let fresh = make_reservation("alice", &cid, 1, 0, TTL);
        store.insert_reservation(fresh.clone(), 0).unwrap();
        assert_eq!(
            store.expire_reservation(fresh.id, TTL / 2, GRACE).unwrap(),
            ExpireOutcome::NotReapable
        );

        // Reapable once past expiry.
        assert_eq!(
            store.expire_reservation(fresh.id, TTL + 1, GRACE).unwrap(),
            ExpireOutcome::Expired(TokenId(1))
        );
        assert_eq!(store.recycled_tokens(&cid).unwrap(), vec![TokenId(1)]);

        // A racing confirm that committed first makes the sweep lose
        // gracefully.
        let other = make_reservation("bob", &cid, 2, 0, TTL);
        store.insert_reservation(other.clone(), 0).unwrap();
        store.confirm_reservation(other.id, "beef", 10).unwrap();
        assert_eq!(
            store.expire_reservation(other.id, TTL + 1, GRACE).unwrap(),
            ExpireOutcome::LostRace(ReservationStatus::Minted)
        );
    }

    #[test]
    fn test_confirming_reaped_only_past_grace() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);
        let entry = make_reservation("alice", &cid, 1, 0, TTL);
        store.insert_reservation(entry.clone(), 0).unwrap();
        store.mark_signing(entry.id).unwrap();
        store.mark_confirming(entry.id, "beef").unwrap();

        // Within the stall grace period: left alone.
        assert_eq!(
            store
                .expire_reservation(entry.id, TTL + GRACE, GRACE)
                .unwrap(),
            ExpireOutcome::NotReapable
        );
        // Clearly stalled: reaped.
        assert_eq!(
            store
                .expire_reservation(entry.id, TTL + GRACE + 1, GRACE)
                .unwrap(),
            ExpireOutcome::Expired(TokenId(1))
        );
    }

    #[test]
    fn test_expired_candidates_scan() {
        let store = get_test_store();
        let cid = register_test_collection(&store, "certs", 0);

        let stale = make_reservation("alice", &cid, 1, 0, TTL);
        store.insert_reservation(stale.clone(), 0).unwrap();
        let fresh = make_reservation("bob", &cid, 2, TTL, TTL);
        store.insert_reservation(fresh.clone(), TTL).unwrap();

        let candidates = store.get_expired_candidates(TTL + 1, GRACE).unwrap();
        assert_eq!(candidates, vec![stale.id]);
    }
}
