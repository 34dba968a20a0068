//! Commit/reveal execution.
//!
//! The executor owns the signer wallet, the in-flight UTXO leases and the
//! per-reservation script cache. It never touches the store: it takes
//! reservation snapshots in and hands txids back, and the caller drives
//! the status transitions.

mod builder;
mod leases;

use std::{collections::HashMap, sync::Arc, time::Duration};

use bitcoin::{Address, Amount, Network, ScriptBuf, Transaction, Txid};
use mintio_db_types::types::ReservationEntry;
use mintio_params::MintParams;
use mintio_primitives::ReservationId;
use parking_lot::Mutex;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use tracing::*;

pub use leases::{UtxoLease, UtxoLeaseSet};

use crate::{
    client::{ClientError, LedgerClient, Utxo},
    errors::{MintError, MintResult},
    script::{build_inscription_script, InscriptionScript},
};

/// Attempts at leasing a freshly selected input set before giving up.
/// Only contended when another in-process build grabs the same coins
/// between selection and lease.
const LEASE_ATTEMPTS: usize = 8;

/// The engine's signing wallet: one key, P2WPKH funding address.
pub struct MintSigner {
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    public_key: PublicKey,
    funding_address: Address,
}

impl MintSigner {
    pub fn new(secret_key: SecretKey, network: Network) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        let funding_address =
            Address::p2wpkh(&bitcoin::CompressedPublicKey(public_key), network);
        Self {
            secp,
            secret_key,
            public_key,
            funding_address,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Compressed pubkey bytes, the form persisted with reservations.
    pub fn pubkey_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    pub fn funding_address(&self) -> &Address {
        &self.funding_address
    }

    fn change_spk(&self) -> ScriptBuf {
        self.funding_address.script_pubkey()
    }
}

/// Timing and retry knobs for execution.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub deposit_poll_ms: u64,
    pub deposit_timeout_ms: u64,
    pub submit_retry_count: u16,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            deposit_poll_ms: 2_000,
            deposit_timeout_ms: 120_000,
            submit_retry_count: 3,
        }
    }
}

pub struct CommitRevealExecutor<C> {
    client: Arc<C>,
    signer: MintSigner,
    params: Arc<MintParams>,
    cfg: ExecutorConfig,
    leases: UtxoLeaseSet,

    /// Rebuilt locking scripts by reservation, so a retry after a partial
    /// failure does not re-derive.
    script_cache: Mutex<HashMap<ReservationId, InscriptionScript>>,
}

impl<C: LedgerClient> CommitRevealExecutor<C> {
    pub fn new(
        client: Arc<C>,
        signer: MintSigner,
        params: Arc<MintParams>,
        cfg: ExecutorConfig,
    ) -> Self {
        Self {
            client,
            signer,
            params,
            cfg,
            leases: UtxoLeaseSet::new(),
            script_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn signer(&self) -> &MintSigner {
        &self.signer
    }

    /// The locking script for a reservation, rebuilt from the persisted
    /// primitives.
    ///
    /// The derived address must equal the persisted one; a mismatch means
    /// the committed funds may sit at an address we cannot reproduce the
    /// script for, so it is surfaced as [`MintError::ScriptMismatch`] and
    /// never retried.
    pub fn locking_script(&self, entry: &ReservationEntry) -> MintResult<InscriptionScript> {
        if let Some(script) = self.script_cache.lock().get(&entry.id) {
            return Ok(script.clone());
        }
        let script = build_inscription_script(
            &entry.signer_pubkey,
            &entry.payload_bytes,
            self.params.network,
        )?;
        let derived = script.address.to_string();
        if derived != entry.deposit_address {
            error!(id = %entry.id, %derived, persisted = %entry.deposit_address,
                   "rebuilt script does not reproduce the deposit address");
            return Err(MintError::ScriptMismatch {
                derived,
                persisted: entry.deposit_address.clone(),
            });
        }
        self.script_cache.lock().insert(entry.id, script.clone());
        Ok(script)
    }

    /// Value the commit must lock so the reveal can pay its minimum fee.
    pub fn required_commit_value(&self, entry: &ReservationEntry) -> MintResult<Amount> {
        let script = self.locking_script(entry)?;
        builder::required_commit_value(
            &script.redeem_script,
            &self.signer.change_spk(),
            self.params.fee_rate_sat_per_vb,
            Amount::from_sat(self.params.min_inscription_fee_sats),
        )
    }

    /// Any output already sitting at the reservation's deposit address
    /// that covers the required commit value.
    ///
    /// A prior run may have broadcast the commit and died before the
    /// reveal; paying again would strand the first deposit, since the
    /// reveal only ever spends one deposit output.
    pub async fn find_funded_deposit(
        &self,
        entry: &ReservationEntry,
    ) -> MintResult<Option<Utxo>> {
        let script = self.locking_script(entry)?;
        let needed = self.required_commit_value(entry)?;
        let utxos = self
            .client
            .get_utxos(&script.address)
            .await
            .map_err(|e| MintError::Client(e.to_string()))?;
        Ok(utxos
            .into_iter()
            .filter(|u| u.amount >= needed)
            .max_by_key(|u| u.amount))
    }

    /// Builds, signs and broadcasts the commit transaction funding the
    /// reservation's deposit address from the signer wallet.
    pub async fn commit(&self, entry: &ReservationEntry) -> MintResult<Txid> {
        let script = self.locking_script(entry)?;
        let deposit_value = self.required_commit_value(entry)?;
        let available = self.wallet_utxos().await?;

        let (built, lease) = {
            let mut attempt = 0;
            loop {
                attempt += 1;
                let built = builder::build_commit_tx(
                    &available,
                    script.address.script_pubkey(),
                    deposit_value,
                    self.signer.change_spk(),
                    self.params.fee_rate_sat_per_vb,
                    self.params.min_utxo_confirmations,
                    &self.leases,
                )?;
                let outpoints: Vec<_> =
                    built.selected.iter().map(|u| u.outpoint).collect();
                if let Some(lease) = self.leases.try_lease(&outpoints) {
                    break (built, lease);
                }
                if attempt >= LEASE_ATTEMPTS {
                    return Err(MintError::Client("utxo lease contention".to_owned()));
                }
            }
        };

        let mut tx = built.tx;
        builder::sign_p2wpkh_inputs(
            &self.signer.secp,
            &mut tx,
            &built.selected,
            0,
            &self.signer.secret_key,
            &self.signer.public_key,
        )?;

        let txid = self.submit_with_retry(&tx).await?;
        info!(id = %entry.id, %txid, value = %deposit_value, "commit broadcast");
        lease.keep();
        Ok(txid)
    }

    /// Builds, signs and broadcasts the reveal spending the deposit
    /// output, waiting for the commit to land first.
    pub async fn reveal(&self, entry: &ReservationEntry) -> MintResult<Txid> {
        if entry.signer_pubkey != self.signer.pubkey_bytes() {
            return Err(MintError::BadKey(format!(
                "reservation {} was created with a different signer key",
                entry.id
            )));
        }
        let script = self.locking_script(entry)?;
        let deposit = self.wait_for_deposit(&script.address).await?;
        let wallet = self.wallet_utxos().await?;

        let (built, lease) = {
            let mut attempt = 0;
            loop {
                attempt += 1;
                let built = builder::build_reveal_tx(
                    &deposit,
                    &wallet,
                    &script.redeem_script,
                    self.signer.change_spk(),
                    self.params.fee_rate_sat_per_vb,
                    Amount::from_sat(self.params.min_inscription_fee_sats),
                    self.params.min_utxo_confirmations,
                    &self.leases,
                )?;
                let mut outpoints = vec![deposit.outpoint];
                outpoints.extend(built.extras.iter().map(|u| u.outpoint));
                if let Some(lease) = self.leases.try_lease(&outpoints) {
                    break (built, lease);
                }
                if attempt >= LEASE_ATTEMPTS {
                    return Err(MintError::Client("utxo lease contention".to_owned()));
                }
            }
        };

        let mut tx = built.tx;
        builder::sign_reveal_input(
            &self.signer.secp,
            &mut tx,
            &script.redeem_script,
            &self.signer.secret_key,
        )?;
        builder::sign_p2wpkh_inputs(
            &self.signer.secp,
            &mut tx,
            &built.extras,
            1,
            &self.signer.secret_key,
            &self.signer.public_key,
        )?;

        let txid = self.submit_with_retry(&tx).await?;
        info!(id = %entry.id, %txid, "reveal broadcast");
        lease.keep();
        Ok(txid)
    }

    /// Polls the deposit address until the commit output shows up
    /// (mempool counts) or the wait deadline passes.
    async fn wait_for_deposit(&self, address: &Address) -> MintResult<Utxo> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.cfg.deposit_timeout_ms);
        loop {
            match self.client.get_utxos(address).await {
                Ok(utxos) => {
                    if let Some(deposit) = utxos.into_iter().max_by_key(|u| u.amount) {
                        debug!(%address, outpoint = %deposit.outpoint, "deposit observed");
                        return Ok(deposit);
                    }
                }
                // Transient node trouble does not abort the wait.
                Err(e) => warn!(%address, err = %e, "deposit poll failed"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MintError::DepositTimeout {
                    address: address.to_string(),
                    timeout_ms: self.cfg.deposit_timeout_ms,
                });
            }
            tokio::time::sleep(Duration::from_millis(self.cfg.deposit_poll_ms)).await;
        }
    }

    async fn wallet_utxos(&self) -> MintResult<Vec<Utxo>> {
        self.client
            .get_utxos(self.signer.funding_address())
            .await
            .map_err(|e| MintError::Client(e.to_string()))
    }

    /// Broadcasts with bounded retries on transport failures. A node
    /// rejection is final.
    async fn submit_with_retry(&self, tx: &Transaction) -> MintResult<Txid> {
        let mut attempt: u16 = 0;
        loop {
            attempt += 1;
            match self.client.send_raw_transaction(tx).await {
                Ok(txid) => return Ok(txid),
                Err(ClientError::Rejected(msg)) => {
                    error!(%msg, "ledger rejected transaction");
                    return Err(MintError::LedgerRejected(msg));
                }
                Err(ClientError::Network(msg)) => {
                    if attempt > self.cfg.submit_retry_count {
                        return Err(MintError::Client(msg));
                    }
                    warn!(%attempt, %msg, "broadcast failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mintio_db_types::types::ReservationStatus;
    use mintio_primitives::{ClaimantId, CollectionId, TokenId};

    use super::*;
    use crate::test_utils::{test_signer, MockLedger};

    fn executor() -> (CommitRevealExecutor<MockLedger>, Arc<MockLedger>) {
        let ledger = MockLedger::new(Network::Regtest);
        let exec = CommitRevealExecutor::new(
            ledger.clone(),
            test_signer(Network::Regtest),
            Arc::new(mintio_params::MintParams::with_defaults(Network::Regtest)),
            ExecutorConfig::default(),
        );
        (exec, ledger)
    }

    fn signing_entry(signer: &MintSigner, payload: &[u8]) -> ReservationEntry {
        let script =
            build_inscription_script(&signer.pubkey_bytes(), payload, Network::Regtest).unwrap();
        ReservationEntry {
            id: ReservationId::random(),
            collection_id: CollectionId::from("diplomas"),
            claimant: ClaimantId::from("addr1x"),
            token_id: TokenId(1),
            payload_bytes: payload.to_vec(),
            signer_pubkey: signer.pubkey_bytes(),
            deposit_address: script.address.to_string(),
            status: ReservationStatus::Signing,
            certificate_id: None,
            created_at_ms: 0,
            expires_at_ms: u64::MAX,
            reveal_txid: None,
            finalized_txid: None,
            finalized_at_ms: None,
        }
    }

    #[tokio::test]
    async fn test_rebuilt_script_mismatch_aborts_without_broadcast() {
        let (exec, ledger) = executor();
        let mut entry = signing_entry(exec.signer(), br#"{"op":"mint","id":1}"#);
        // One flipped payload byte and the rebuilt script no longer locks
        // the persisted deposit address.
        entry.payload_bytes[2] ^= 0x01;

        let err = exec.reveal(&entry).await.unwrap_err();
        assert!(matches!(err, MintError::ScriptMismatch { .. }));
        assert!(!err.is_retryable());
        assert_eq!(ledger.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn test_rebuilt_script_matching_address_is_accepted() {
        let (exec, _ledger) = executor();
        let entry = signing_entry(exec.signer(), br#"{"op":"mint","id":1}"#);
        let script = exec.locking_script(&entry).unwrap();
        assert_eq!(script.address.to_string(), entry.deposit_address);
    }
}
