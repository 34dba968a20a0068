//! The engine service object wiring the pieces together.
//!
//! `MintEngine` owns the store handle, the reservation manager, the
//! commit/reveal executor and the indexer poller, and exposes the
//! operation surface callers use: register, reserve, execute, cancel.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use mintio_config::Config;
use mintio_db_types::{
    traits::MintDatabase,
    types::{ReservationEntry, ReservationStatus},
};
use mintio_params::MintParams;
use mintio_primitives::{CertificateId, ClaimantId, CollectionId, ReservationId, TokenId};
use tokio::{sync::watch, task::JoinHandle};
use tracing::*;

use crate::{
    client::LedgerClient,
    errors::{MintError, MintResult},
    executor::{CommitRevealExecutor, ExecutorConfig, MintSigner},
    indexer::{IndexerApi, IndexerPoller, VerifyOutcome},
    now_ms,
    reservation::ReservationManager,
    sweeper::{reservation_sweeper_task, SweeperContext},
};

pub struct MintEngine<D, C, I> {
    db: Arc<D>,
    reservations: ReservationManager<D>,
    executor: CommitRevealExecutor<C>,
    poller: IndexerPoller<I>,
    params: Arc<MintParams>,
}

impl<D, C, I> MintEngine<D, C, I>
where
    D: MintDatabase,
    C: LedgerClient,
    I: IndexerApi,
{
    pub fn new(
        db: Arc<D>,
        executor: CommitRevealExecutor<C>,
        poller: IndexerPoller<I>,
        params: Arc<MintParams>,
    ) -> Self {
        let reservations = ReservationManager::new(db.clone(), params.clone());
        Self {
            db,
            reservations,
            executor,
            poller,
            params,
        }
    }

    /// Assembles an engine from the operational config.
    pub fn from_config(
        db: Arc<D>,
        client: Arc<C>,
        indexer: Arc<I>,
        signer: MintSigner,
        config: &Config,
    ) -> Self {
        let params = Arc::new(config.params.clone());
        let executor = CommitRevealExecutor::new(
            client,
            signer,
            params.clone(),
            ExecutorConfig {
                deposit_poll_ms: config.engine.deposit_poll_ms,
                deposit_timeout_ms: config.engine.deposit_timeout_ms,
                submit_retry_count: config.ledger.submit_retry_count,
            },
        );
        let poller = IndexerPoller::new(
            indexer,
            Duration::from_millis(config.indexer.poll_interval_ms),
            Duration::from_millis(config.indexer.max_backoff_ms),
            Duration::from_millis(config.indexer.verify_timeout_ms),
        );
        Self::new(db, executor, poller, params)
    }

    /// Registers (idempotently) a collection under the given index.
    pub fn register_collection(
        &self,
        cid: CollectionId,
        collection_index: u64,
        ticker: impl Into<String>,
    ) -> MintResult<()> {
        use mintio_db_types::types::CollectionEntry;
        self.db
            .register_collection(CollectionEntry::new(cid, collection_index, ticker))?;
        Ok(())
    }

    /// Reserves a token for the claimant, idempotently per (claimant,
    /// collection). The locking script is built with the engine's signer
    /// key.
    pub fn reserve(
        &self,
        claimant: ClaimantId,
        cid: &CollectionId,
        certificate_id: Option<CertificateId>,
    ) -> MintResult<ReservationEntry> {
        self.reservations.create(
            claimant,
            cid,
            &self.executor.signer().pubkey_bytes(),
            certificate_id,
        )
    }

    pub fn reservation(&self, id: ReservationId) -> MintResult<ReservationEntry> {
        self.reservations.get(id)
    }

    /// Cancels a reservation, returning the recycled identifier.
    pub fn cancel(&self, id: ReservationId) -> MintResult<TokenId> {
        self.reservations.cancel(id)
    }

    /// Drives a reservation through commit, reveal and indexer
    /// verification, finalizing it on success.
    ///
    /// Resumable: called again after a crash it picks up from the
    /// persisted status — a `Signing` row rebuilds its script from
    /// primitives and retries the transactions, a `Confirming` row with a
    /// recorded reveal skips straight to verification.
    pub async fn execute_mint(&self, id: ReservationId) -> MintResult<String> {
        let entry = self.reservations.get(id)?;
        if entry.status.is_terminal() {
            return Err(MintError::AlreadyTerminal {
                id,
                status: entry.status,
            });
        }
        if entry.status != ReservationStatus::Confirming && entry.is_past_expiry(now_ms()) {
            return Err(MintError::Expired(id));
        }

        let (entry, reveal_txid) = match (entry.status, entry.reveal_txid.clone()) {
            // Reveal already broadcast; only verification is owed.
            (ReservationStatus::Confirming, Some(txid)) => (entry, txid),
            _ => {
                let entry = match entry.status {
                    ReservationStatus::Reserved => self.reservations.mark_signing(id)?,
                    // Resuming after a mid-flight failure.
                    _ => entry,
                };
                // An earlier attempt may already have funded the deposit
                // address before failing; re-paying it strands the first
                // deposit.
                match self.executor.find_funded_deposit(&entry).await? {
                    Some(deposit) => {
                        info!(%id, outpoint = %deposit.outpoint,
                              "deposit already funded, skipping commit");
                    }
                    None => {
                        let commit_txid = self.executor.commit(&entry).await?;
                        debug!(%id, %commit_txid, "commit accepted");
                    }
                }
                let reveal_txid = self.executor.reveal(&entry).await?.to_string();
                let entry = self.reservations.mark_confirming(id, &reveal_txid)?;
                (entry, reveal_txid)
            }
        };

        let collection = self
            .db
            .get_collection(&entry.collection_id)?
            .ok_or_else(|| MintError::UnknownCollection(entry.collection_id.clone()))?;

        match self
            .poller
            .verify_token(&collection.ticker, entry.token_id.0)
            .await
        {
            VerifyOutcome::Confirmed => self.reservations.confirm(id, &reveal_txid),
            VerifyOutcome::Unverified => {
                // Stays Confirming; a later call retries verification.
                Err(MintError::BroadcastUnverified { txid: reveal_txid })
            }
        }
    }

    /// Spawns the background sweeper.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = SweeperContext {
            db: self.db.clone(),
            params: self.params.clone(),
            sweep_interval: interval,
        };
        let handle = tokio::spawn(reservation_sweeper_task(ctx, shutdown_rx));
        SweeperHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<Result<()>>,
}

impl SweeperHandle {
    /// Signals shutdown and waits for the task to exit.
    pub async fn shutdown(self) -> Result<()> {
        // Send failing means the task already exited; join below reports
        // how.
        let _ = self.shutdown_tx.send(true);
        self.handle.await?
    }
}
