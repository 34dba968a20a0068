//! Token identifier allocation.
//!
//! Identifiers come from two sources, always in this order: the
//! collection's recycle pool (lowest id first), then the monotonic
//! counter. Both store operations are atomic, so concurrent allocators
//! never hand out the same identifier.

use std::sync::Arc;

use mintio_db_types::traits::MintDatabase;
use mintio_params::MintParams;
use mintio_primitives::{CollectionId, TokenId};
use tracing::*;

use crate::errors::{MintError, MintResult};

pub struct TokenAllocator<D> {
    db: Arc<D>,
    params: Arc<MintParams>,
}

impl<D: MintDatabase> TokenAllocator<D> {
    pub fn new(db: Arc<D>, params: Arc<MintParams>) -> Self {
        Self { db, params }
    }

    /// Claims the next identifier for the collection.
    ///
    /// Pool first, counter second. Errors with [`MintError::SoldOut`] when
    /// the counter is exhausted and the pool is empty.
    pub fn allocate(&self, cid: &CollectionId) -> MintResult<TokenId> {
        if let Some(token) = self.db.pop_recycled_token(cid)? {
            debug!(%cid, %token, "allocated from recycle pool");
            return Ok(token);
        }

        let collection = self
            .db
            .get_collection(cid)?
            .ok_or_else(|| MintError::UnknownCollection(cid.clone()))?;

        let max = self.params.max_tokens_per_collection;
        match self.db.try_advance_counter(cid, max)? {
            Some(offset) => {
                let token = TokenId(self.params.first_token_id(collection.collection_index) + offset);
                debug!(%cid, %token, "allocated from counter");
                Ok(token)
            }
            None => Err(MintError::SoldOut),
        }
    }

    /// Returns an identifier to the pool for a later claimant. Idempotent.
    pub fn recycle(&self, cid: &CollectionId, token: TokenId) -> MintResult<()> {
        self.db.push_recycled_token(cid, token)?;
        debug!(%cid, %token, "recycled identifier");
        Ok(())
    }
}
