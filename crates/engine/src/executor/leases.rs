//! In-flight UTXO leasing.
//!
//! The node keeps reporting an output as unspent until a transaction
//! spending it confirms, so two concurrent commit builds would happily
//! select the same coin. The lease set is the process-local source of
//! truth for "already promised to an in-flight transaction".

use std::collections::HashSet;

use bitcoin::OutPoint;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared set of leased outpoints.
#[derive(Clone, Default)]
pub struct UtxoLeaseSet {
    inner: Arc<Mutex<HashSet<OutPoint>>>,
}

impl UtxoLeaseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leases all of `outpoints` or none of them.
    ///
    /// Returns `None` if any outpoint is already leased; in that case
    /// nothing was taken and the caller should re-select.
    pub fn try_lease(&self, outpoints: &[OutPoint]) -> Option<UtxoLease> {
        let mut held = self.inner.lock();
        if outpoints.iter().any(|op| held.contains(op)) {
            return None;
        }
        held.extend(outpoints.iter().copied());
        Some(UtxoLease {
            set: self.clone(),
            outpoints: outpoints.to_vec(),
        })
    }

    pub fn is_leased(&self, outpoint: &OutPoint) -> bool {
        self.inner.lock().contains(outpoint)
    }

    fn release(&self, outpoints: &[OutPoint]) {
        let mut held = self.inner.lock();
        for op in outpoints {
            held.remove(op);
        }
    }
}

/// RAII lease over a set of outpoints. Dropping releases them, so an
/// abandoned build frees its coins without any bookkeeping at the call
/// sites.
pub struct UtxoLease {
    set: UtxoLeaseSet,
    outpoints: Vec<OutPoint>,
}

impl UtxoLease {
    pub fn outpoints(&self) -> &[OutPoint] {
        &self.outpoints
    }

    /// Retains the lease permanently. Called after broadcast: the
    /// outpoints are spent and must never be offered to selection again,
    /// even while the node still reports them unspent.
    pub fn keep(self) {
        std::mem::forget(self);
    }
}

impl Drop for UtxoLease {
    fn drop(&mut self) {
        self.set.release(&self.outpoints);
    }
}
