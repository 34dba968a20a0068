//! In-memory ledger and indexer doubles for tests.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use bitcoin::{hashes::Hash, Address, Amount, Network, OutPoint, Transaction, Txid};
use parking_lot::Mutex;
use secp256k1::SecretKey;

use crate::{
    client::{ClientError, LedgerClient, Utxo},
    executor::MintSigner,
    indexer::{CollectionRecord, IndexerApi, IndexerError, TokenRecord},
};

/// Deterministic signer for tests.
pub fn test_signer(network: Network) -> MintSigner {
    let sk = SecretKey::from_slice(&[0x42; 32]).expect("valid test key");
    MintSigner::new(sk, network)
}

/// A toy ledger: a UTXO set keyed by script pubkey, broadcast applies
/// transactions to it immediately with one confirmation.
pub struct MockLedger {
    network: Network,
    utxos: Mutex<Vec<Utxo>>,
    broadcast: Mutex<Vec<Transaction>>,
    reject_next: Mutex<Option<String>>,
    network_failures: AtomicU32,
    funding_counter: AtomicU64,
}

impl MockLedger {
    pub fn new(network: Network) -> Arc<Self> {
        Arc::new(Self {
            network,
            utxos: Mutex::new(Vec::new()),
            broadcast: Mutex::new(Vec::new()),
            reject_next: Mutex::new(None),
            network_failures: AtomicU32::new(0),
            funding_counter: AtomicU64::new(0),
        })
    }

    /// Seeds a confirmed output at `address`.
    pub fn fund(&self, address: &Address, sats: u64) {
        let n = self.funding_counter.fetch_add(1, Ordering::SeqCst);
        let mut txid_bytes = [0xabu8; 32];
        txid_bytes[..8].copy_from_slice(&n.to_le_bytes());
        self.utxos.lock().push(Utxo {
            outpoint: OutPoint {
                txid: Txid::from_byte_array(txid_bytes),
                vout: 0,
            },
            address: address.to_string(),
            amount: Amount::from_sat(sats),
            script_pubkey: address.script_pubkey(),
            confirmations: 6,
        });
    }

    /// Makes the next broadcast fail as a node rejection.
    pub fn reject_next(&self, msg: impl Into<String>) {
        *self.reject_next.lock() = Some(msg.into());
    }

    /// Makes the next `n` broadcasts fail at the transport level.
    pub fn fail_broadcasts(&self, n: u32) {
        self.network_failures.store(n, Ordering::SeqCst);
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcast.lock().len()
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcast.lock().clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ClientError> {
        let spk = address.script_pubkey();
        Ok(self
            .utxos
            .lock()
            .iter()
            .filter(|u| u.script_pubkey == spk)
            .cloned()
            .collect())
    }

    async fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, ClientError> {
        if let Some(msg) = self.reject_next.lock().take() {
            return Err(ClientError::Rejected(msg));
        }
        if self.network_failures.load(Ordering::SeqCst) > 0 {
            self.network_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::Network("connection reset".to_owned()));
        }

        let txid = tx.compute_txid();
        let mut utxos = self.utxos.lock();
        for input in &tx.input {
            let Some(pos) = utxos
                .iter()
                .position(|u| u.outpoint == input.previous_output)
            else {
                return Err(ClientError::Rejected(format!(
                    "bad-txns-inputs-missingorspent: {}",
                    input.previous_output
                )));
            };
            utxos.remove(pos);
        }
        for (vout, output) in tx.output.iter().enumerate() {
            let address = Address::from_script(&output.script_pubkey, self.network)
                .map(|a| a.to_string())
                .unwrap_or_default();
            utxos.push(Utxo {
                outpoint: OutPoint {
                    txid,
                    vout: vout as u32,
                },
                address,
                amount: output.value,
                script_pubkey: output.script_pubkey.clone(),
                confirmations: 1,
            });
        }
        self.broadcast.lock().push(tx.clone());
        Ok(txid)
    }
}

/// An indexer double. In auto mode every queried token exists; otherwise
/// only tokens marked via [`MockIndexer::set_minted`].
pub struct MockIndexer {
    minted: Mutex<HashSet<(String, u64)>>,
    auto_confirm: bool,
}

impl MockIndexer {
    pub fn auto() -> Arc<Self> {
        Arc::new(Self {
            minted: Mutex::new(HashSet::new()),
            auto_confirm: true,
        })
    }

    pub fn manual() -> Arc<Self> {
        Arc::new(Self {
            minted: Mutex::new(HashSet::new()),
            auto_confirm: false,
        })
    }

    pub fn set_minted(&self, ticker: &str, id: u64) {
        self.minted.lock().insert((ticker.to_owned(), id));
    }
}

#[async_trait]
impl IndexerApi for MockIndexer {
    async fn get_collection(
        &self,
        ticker: &str,
    ) -> Result<Option<CollectionRecord>, IndexerError> {
        Ok(Some(CollectionRecord {
            ticker: ticker.to_owned(),
            supply: None,
        }))
    }

    async fn get_token(
        &self,
        ticker: &str,
        id: u64,
    ) -> Result<Option<TokenRecord>, IndexerError> {
        let known =
            self.auto_confirm || self.minted.lock().contains(&(ticker.to_owned(), id));
        Ok(known.then(|| TokenRecord { id, owner: None }))
    }
}
