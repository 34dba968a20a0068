//! Ledger node client abstraction.
//!
//! The engine only ever sees the normalized [`Utxo`] shape below, whatever
//! the node RPC returns. Transport concerns (auth, JSON-RPC framing) live
//! behind the trait; the engine layers its own submission retry policy on
//! top of it.

use async_trait::async_trait;
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, Transaction, Txid};
use thiserror::Error;

/// Transport-level client failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection or protocol failure. Worth retrying.
    #[error("network: {0}")]
    Network(String),

    /// The node parsed the request and said no. Not worth retrying.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// A spendable output in the engine's single normalized shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,

    /// Owning address in its string form.
    pub address: String,

    pub amount: Amount,

    /// Locking script of the output, needed for sighash computation.
    pub script_pubkey: ScriptBuf,

    /// Confirmation count; 0 for mempool outputs.
    pub confirmations: u64,
}

impl Utxo {
    /// Whether the output meets the confirmation floor for spending.
    pub fn is_mature(&self, min_confirmations: u64) -> bool {
        self.confirmations >= min_confirmations
    }
}

/// The two node operations the engine needs.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Unspent outputs currently held by `address`, including unconfirmed
    /// ones (the deposit wait polls for a mempool commit output).
    async fn get_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ClientError>;

    /// Broadcasts a fully signed transaction.
    async fn send_raw_transaction(&self, tx: &Transaction) -> Result<Txid, ClientError>;
}
