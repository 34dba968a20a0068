//! Error taxonomy for the mint engine.
//!
//! Callers are expected to branch on these variants: some are permanent
//! (`SoldOut`, `LedgerRejected`), some are retryable against the same
//! reservation (`InsufficientFunds`, `DepositTimeout`), and some demand an
//! operator (`ScriptMismatch`). The distinction is part of the API, not an
//! implementation detail.

use mintio_db_types::{types::ReservationStatus, DbError};
use mintio_primitives::{CollectionId, ReservationId};
use thiserror::Error;

pub type MintResult<T> = Result<T, MintError>;

#[derive(Debug, Error)]
pub enum MintError {
    /// The collection's identifier range is exhausted and the recycle pool
    /// is empty. Permanent for this collection.
    #[error("collection sold out")]
    SoldOut,

    /// The reservation's TTL passed before it could be finalized. The
    /// identifier has been returned to the pool; the claimant must reserve
    /// again.
    #[error("reservation {0} expired")]
    Expired(ReservationId),

    /// No reservation row with this id.
    #[error("reservation {0} not found")]
    NotFound(ReservationId),

    /// The reservation is already in a terminal state.
    #[error("reservation {id} already terminal ({status:?})")]
    AlreadyTerminal {
        id: ReservationId,
        status: ReservationStatus,
    },

    /// A requested transition does not apply to the row's current state.
    #[error("reservation {id} is {status:?}, transition does not apply")]
    InvalidTransition {
        id: ReservationId,
        status: ReservationStatus,
    },

    #[error("collection {0} is not registered")]
    UnknownCollection(CollectionId),

    /// The serialized payload exceeds the configured ceiling. Raised at
    /// reservation creation, before anything is persisted.
    #[error("payload is {size} bytes, ceiling is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Spendable funds at the signer wallet do not cover the target plus
    /// fees. Retryable once the wallet is topped up.
    #[error("insufficient funds: needed {needed} sats, have {have} sats")]
    InsufficientFunds { needed: u64, have: u64 },

    /// The locking script rebuilt from persisted primitives derives a
    /// different deposit address than the one recorded at creation.
    /// Committed funds may be stranded; never auto-retried.
    #[error(
        "rebuilt script derives {derived}, persisted deposit address is {persisted}; \
         manual reconciliation required"
    )]
    ScriptMismatch { derived: String, persisted: String },

    /// The commit was never observed funding the deposit address within
    /// the wait deadline. Retryable.
    #[error("no deposit observed at {address} within {timeout_ms}ms")]
    DepositTimeout { address: String, timeout_ms: u64 },

    /// The reveal was accepted by the ledger but the indexer did not
    /// recognize the inscription within the verification deadline. The
    /// reservation stays `Confirming`; resolution is asynchronous.
    #[error("reveal {txid} broadcast but not verified by the indexer in time")]
    BroadcastUnverified { txid: String },

    /// The ledger rejected a submitted transaction outright.
    #[error("ledger rejected transaction: {0}")]
    LedgerRejected(String),

    /// Key material inconsistent with the persisted reservation.
    #[error("signer key mismatch: {0}")]
    BadKey(String),

    /// Locking script construction failed.
    #[error("script: {0}")]
    Script(String),

    #[error("db: {0}")]
    Db(#[from] DbError),

    /// Transport-level ledger client failure after retries.
    #[error("ledger client: {0}")]
    Client(String),
}

impl MintError {
    /// Whether retrying the same operation on the same reservation can
    /// possibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::DepositTimeout { .. }
                | Self::BroadcastUnverified { .. }
                | Self::Client(_)
        )
    }
}
