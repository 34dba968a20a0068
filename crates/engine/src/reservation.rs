//! Reservation lifecycle management.
//!
//! Creation is idempotent per (claimant, collection): while an unexpired
//! reservation exists for the pair, repeated calls return that same row.
//! Everything the executor later needs to rebuild the locking script is
//! persisted here, at creation, in primitive form.

use std::sync::Arc;

use mintio_db_types::{
    traits::MintDatabase,
    types::{
        CancelOutcome, CertificateEntry, CertificateStatus, ConfirmOutcome, InsertOutcome,
        ReservationEntry, ReservationStatus, TransitionOutcome,
    },
};
use mintio_params::MintParams;
use mintio_primitives::{
    CertificateId, ClaimantId, CollectionId, MintPayload, ReservationId, TokenId,
};
use tracing::*;

use crate::{
    allocator::TokenAllocator,
    errors::{MintError, MintResult},
    now_ms,
    script::build_inscription_script,
};

pub struct ReservationManager<D> {
    db: Arc<D>,
    allocator: TokenAllocator<D>,
    params: Arc<MintParams>,
}

impl<D: MintDatabase> ReservationManager<D> {
    pub fn new(db: Arc<D>, params: Arc<MintParams>) -> Self {
        let allocator = TokenAllocator::new(db.clone(), params.clone());
        Self {
            db,
            allocator,
            params,
        }
    }

    pub fn allocator(&self) -> &TokenAllocator<D> {
        &self.allocator
    }

    /// Creates (or returns the existing) reservation for the pair.
    ///
    /// Allocates an identifier, serializes the canonical payload, derives
    /// the deposit address and persists the row. If a racing create wins
    /// the insert, the identifier allocated here is recycled and the
    /// winner's row is returned.
    pub fn create(
        &self,
        claimant: ClaimantId,
        cid: &CollectionId,
        signer_pubkey: &[u8],
        certificate_id: Option<CertificateId>,
    ) -> MintResult<ReservationEntry> {
        let now = now_ms();
        if let Some(existing) = self.db.get_active_reservation(&claimant, cid, now)? {
            debug!(id = %existing.id, %claimant, %cid, "returning existing reservation");
            return Ok(existing);
        }

        let collection = self
            .db
            .get_collection(cid)?
            .ok_or_else(|| MintError::UnknownCollection(cid.clone()))?;

        let token_id = self.allocator.allocate(cid)?;
        // Past this point the identifier is ours; every failure path must
        // recycle it or it leaks until an operator notices.
        match self.build_and_insert(
            claimant,
            cid,
            &collection.ticker,
            token_id,
            signer_pubkey,
            certificate_id,
            now,
        ) {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.allocator.recycle(cid, token_id)?;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_and_insert(
        &self,
        claimant: ClaimantId,
        cid: &CollectionId,
        ticker: &str,
        token_id: TokenId,
        signer_pubkey: &[u8],
        certificate_id: Option<CertificateId>,
        now: u64,
    ) -> MintResult<ReservationEntry> {
        let payload = MintPayload::new_mint(
            self.params.protocol_tag.clone(),
            ticker,
            token_id,
            claimant.as_str(),
        );
        let payload_bytes = payload.to_canonical_bytes();
        if payload_bytes.len() > self.params.max_payload_size {
            return Err(MintError::PayloadTooLarge {
                size: payload_bytes.len(),
                max: self.params.max_payload_size,
            });
        }

        let script =
            build_inscription_script(signer_pubkey, &payload_bytes, self.params.network)?;

        if let Some(cert) = &certificate_id {
            // A certificate that already reached Minted stays minted; a
            // reused id must not reset the stored txid to Pending.
            let minted = matches!(
                self.db.get_certificate(cert)?,
                Some(CertificateEntry {
                    status: CertificateStatus::Minted { .. },
                    ..
                })
            );
            if !minted {
                self.db.put_certificate(CertificateEntry {
                    id: cert.clone(),
                    status: CertificateStatus::Pending,
                })?;
            }
        }

        let entry = ReservationEntry {
            id: ReservationId::random(),
            collection_id: cid.clone(),
            claimant,
            token_id,
            payload_bytes,
            signer_pubkey: signer_pubkey.to_vec(),
            deposit_address: script.address.to_string(),
            status: ReservationStatus::Reserved,
            certificate_id,
            created_at_ms: now,
            expires_at_ms: now + self.params.reservation_ttl_ms,
            reveal_txid: None,
            finalized_txid: None,
            finalized_at_ms: None,
        };

        match self.db.insert_reservation(entry, now)? {
            InsertOutcome::Inserted(entry) => {
                info!(id = %entry.id, token = %entry.token_id, %cid,
                      deposit = %entry.deposit_address, "reservation created");
                Ok(entry)
            }
            InsertOutcome::ActiveExists(existing) => {
                // Lost the create race; hand our identifier back.
                self.allocator.recycle(cid, token_id)?;
                debug!(id = %existing.id, %cid, "create raced, returning winner");
                Ok(existing)
            }
        }
    }

    /// Advisory `Reserved → Signing` transition.
    pub fn mark_signing(&self, id: ReservationId) -> MintResult<ReservationEntry> {
        match self.db.mark_signing(id)? {
            TransitionOutcome::Updated(entry) => Ok(entry),
            TransitionOutcome::InvalidState(status) if status.is_terminal() => {
                Err(MintError::AlreadyTerminal { id, status })
            }
            TransitionOutcome::InvalidState(status) => {
                Err(MintError::InvalidTransition { id, status })
            }
        }
    }

    /// `Signing → Confirming`, recording the broadcast reveal txid.
    pub fn mark_confirming(&self, id: ReservationId, reveal_txid: &str) -> MintResult<ReservationEntry> {
        match self.db.mark_confirming(id, reveal_txid)? {
            TransitionOutcome::Updated(entry) => Ok(entry),
            TransitionOutcome::InvalidState(status) if status.is_terminal() => {
                Err(MintError::AlreadyTerminal { id, status })
            }
            TransitionOutcome::InvalidState(status) => {
                Err(MintError::InvalidTransition { id, status })
            }
        }
    }

    /// Finalizes the reservation with the given transaction hash.
    ///
    /// Idempotent: confirming an already-minted reservation returns the
    /// stored hash. An expired reservation fails with
    /// [`MintError::Expired`] and is lazily reaped in the same call.
    pub fn confirm(&self, id: ReservationId, txid: &str) -> MintResult<String> {
        match self.db.confirm_reservation(id, txid, now_ms())? {
            ConfirmOutcome::Confirmed(entry) => {
                info!(%id, token = %entry.token_id, %txid, "reservation minted");
                Ok(txid.to_owned())
            }
            ConfirmOutcome::AlreadyMinted(stored) => Ok(stored),
            ConfirmOutcome::ExpiredNow => {
                warn!(%id, "confirm arrived past expiry, identifier recycled");
                Err(MintError::Expired(id))
            }
            ConfirmOutcome::Terminal(status) => Err(MintError::AlreadyTerminal { id, status }),
        }
    }

    /// Cancels the reservation, recycling its identifier. Fails when the
    /// row is already terminal.
    pub fn cancel(&self, id: ReservationId) -> MintResult<TokenId> {
        match self.db.cancel_reservation(id, now_ms())? {
            CancelOutcome::Cancelled(token) => {
                info!(%id, %token, "reservation cancelled");
                Ok(token)
            }
            CancelOutcome::AlreadyTerminal(status) => {
                Err(MintError::AlreadyTerminal { id, status })
            }
        }
    }

    /// Snapshot fetch.
    pub fn get(&self, id: ReservationId) -> MintResult<ReservationEntry> {
        self.db.get_reservation(id)?.ok_or(MintError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Network;
    use mintio_db_store_sled::{
        test_utils::{get_test_store, register_test_collection},
        MintStoreSled,
    };
    use secp256k1::{Secp256k1, SecretKey};

    use super::*;

    fn signer_pubkey() -> Vec<u8> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[0x21; 32]).unwrap();
        secp256k1::PublicKey::from_secret_key(&secp, &sk)
            .serialize()
            .to_vec()
    }

    fn manager() -> (ReservationManager<MintStoreSled>, CollectionId) {
        let store = Arc::new(get_test_store());
        let cid = register_test_collection(&store, "cert", 0);
        let params = MintParams::with_defaults(Network::Regtest);
        (ReservationManager::new(store, Arc::new(params)), cid)
    }

    #[test]
    fn test_create_persists_primitives() {
        let (mgr, cid) = manager();
        let entry = mgr
            .create("addr1claimant".into(), &cid, &signer_pubkey(), None)
            .unwrap();

        assert_eq!(entry.status, ReservationStatus::Reserved);
        assert_eq!(entry.token_id, TokenId(1));
        // The persisted payload is the canonical wire form.
        let parsed = MintPayload::from_bytes(&entry.payload_bytes).unwrap();
        assert_eq!(parsed.ticker, "cert");
        assert_eq!(parsed.recipient, "addr1claimant");
        // The persisted primitives rebuild to the persisted address.
        let script = build_inscription_script(
            &entry.signer_pubkey,
            &entry.payload_bytes,
            Network::Regtest,
        )
        .unwrap();
        assert_eq!(script.address.to_string(), entry.deposit_address);
    }

    #[test]
    fn test_create_idempotent_per_pair() {
        let (mgr, cid) = manager();
        let a = mgr
            .create("addr1x".into(), &cid, &signer_pubkey(), None)
            .unwrap();
        let b = mgr
            .create("addr1x".into(), &cid, &signer_pubkey(), None)
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.token_id, b.token_id);

        // A different claimant gets a fresh identifier.
        let c = mgr
            .create("addr1y".into(), &cid, &signer_pubkey(), None)
            .unwrap();
        assert_ne!(c.token_id, a.token_id);
    }

    #[test]
    fn test_cancel_recycles_for_next_claimant() {
        let (mgr, cid) = manager();
        let a = mgr
            .create("addr1x".into(), &cid, &signer_pubkey(), None)
            .unwrap();
        let freed = mgr.cancel(a.id).unwrap();
        assert_eq!(freed, a.token_id);

        let b = mgr
            .create("addr1y".into(), &cid, &signer_pubkey(), None)
            .unwrap();
        assert_eq!(b.token_id, a.token_id);
    }

    #[test]
    fn test_cancel_after_mint_fails() {
        let (mgr, cid) = manager();
        let a = mgr
            .create("addr1x".into(), &cid, &signer_pubkey(), None)
            .unwrap();
        mgr.mark_signing(a.id).unwrap();
        mgr.mark_confirming(a.id, "feed").unwrap();
        mgr.confirm(a.id, "feed").unwrap();

        assert!(matches!(
            mgr.cancel(a.id),
            Err(MintError::AlreadyTerminal {
                status: ReservationStatus::Minted,
                ..
            })
        ));
    }

    #[test]
    fn test_confirm_idempotent() {
        let (mgr, cid) = manager();
        let a = mgr
            .create("addr1x".into(), &cid, &signer_pubkey(), None)
            .unwrap();
        mgr.mark_signing(a.id).unwrap();
        mgr.mark_confirming(a.id, "feed").unwrap();
        assert_eq!(mgr.confirm(a.id, "feed").unwrap(), "feed");
        // Replay returns the stored hash even with a different argument.
        assert_eq!(mgr.confirm(a.id, "beef").unwrap(), "feed");
    }

    #[test]
    fn test_certificate_flips_on_confirm() {
        let (mgr, cid) = manager();
        let cert = CertificateId::from("diploma-7");
        let a = mgr
            .create("addr1x".into(), &cid, &signer_pubkey(), Some(cert.clone()))
            .unwrap();

        let pending = mgr.db.get_certificate(&cert).unwrap().unwrap();
        assert_eq!(pending.status, CertificateStatus::Pending);

        mgr.mark_signing(a.id).unwrap();
        mgr.mark_confirming(a.id, "feed").unwrap();
        mgr.confirm(a.id, "feed").unwrap();

        let minted = mgr.db.get_certificate(&cert).unwrap().unwrap();
        assert_eq!(
            minted.status,
            CertificateStatus::Minted {
                txid: "feed".to_owned()
            }
        );
    }

    #[test]
    fn test_reused_certificate_id_keeps_minted_record() {
        let (mgr, cid) = manager();
        let cert = CertificateId::from("diploma-7");
        let a = mgr
            .create("addr1x".into(), &cid, &signer_pubkey(), Some(cert.clone()))
            .unwrap();
        mgr.mark_signing(a.id).unwrap();
        mgr.mark_confirming(a.id, "feed").unwrap();
        mgr.confirm(a.id, "feed").unwrap();

        // A later reservation reusing the certificate id leaves the
        // minted record alone.
        mgr.create("addr1y".into(), &cid, &signer_pubkey(), Some(cert.clone()))
            .unwrap();
        let kept = mgr.db.get_certificate(&cert).unwrap().unwrap();
        assert_eq!(
            kept.status,
            CertificateStatus::Minted {
                txid: "feed".to_owned()
            }
        );
    }

    #[test]
    fn test_payload_ceiling_recycles_identifier() {
        let store = Arc::new(get_test_store());
        let cid = register_test_collection(&store, "cert", 0);
        let mut params = MintParams::with_defaults(Network::Regtest);
        params.max_payload_size = 10;
        let mgr = ReservationManager::new(store, Arc::new(params));

        let err = mgr
            .create("addr1x".into(), &cid, &signer_pubkey(), None)
            .unwrap_err();
        assert!(matches!(err, MintError::PayloadTooLarge { .. }));

        // The identifier allocated for the failed create went back to the
        // pool.
        assert_eq!(mgr.db.recycled_tokens(&cid).unwrap(), vec![TokenId(1)]);
    }
}
