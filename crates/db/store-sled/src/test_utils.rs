//! Helpers for tests exercising the sled store.

use mintio_db_types::types::{CollectionEntry, ReservationEntry, ReservationStatus};
use mintio_primitives::{ClaimantId, CollectionId, ReservationId, TokenId};

use crate::MintStoreSled;

/// Returns a fresh store backed by a temporary sled db.
pub fn get_test_store() -> MintStoreSled {
    let db = sled::Config::new()
        .temporary(true)
        .open()
        .expect("open temporary sled db");
    MintStoreSled::new(db).expect("open store trees")
}

/// A `Reserved` entry with placeholder script material.
pub fn make_reservation(
    claimant: &str,
    cid: &CollectionId,
    token: u64,
    created_at_ms: u64,
    ttl_ms: u64,
) -> ReservationEntry {
    ReservationEntry {
        id: ReservationId::random(),
        collection_id: cid.clone(),
        claimant: ClaimantId::from(claimant),
        token_id: TokenId(token),
        payload_bytes: br#"{"p":"crt-721","op":"mint","tick":"cert","id":1,"to":"x"}"#.to_vec(),
        signer_pubkey: vec![2u8; 33],
        deposit_address: "2N7test00000000000000000000000000".to_owned(),
        status: ReservationStatus::Reserved,
        certificate_id: None,
        created_at_ms,
        expires_at_ms: created_at_ms + ttl_ms,
        reveal_txid: None,
        finalized_txid: None,
        finalized_at_ms: None,
    }
}

/// Registers a collection with the given index and returns its id.
pub fn register_test_collection(
    store: &MintStoreSled,
    name: &str,
    index: u64,
) -> CollectionId {
    use mintio_db_types::traits::MintDatabase;

    let cid = CollectionId::from(name);
    store
        .register_collection(CollectionEntry::new(cid.clone(), index, name))
        .expect("register collection");
    cid
}
