//! Borsh codec helpers, including variants usable inside sled
//! transactions where errors must be conflictable.

use borsh::{BorshDeserialize, BorshSerialize};
use mintio_db_types::{DbError, DbResult};
use sled::transaction::ConflictableTransactionError;

pub(crate) type TxError = ConflictableTransactionError<DbError>;
pub(crate) type TxResult<T> = Result<T, TxError>;

pub(crate) fn enc<T: BorshSerialize>(value: &T) -> DbResult<Vec<u8>> {
    borsh::to_vec(value).map_err(|e| DbError::CodecError(e.to_string()))
}

pub(crate) fn dec<T: BorshDeserialize>(bytes: &[u8]) -> DbResult<T> {
    T::try_from_slice(bytes).map_err(|e| DbError::CodecError(e.to_string()))
}

/// Aborts the enclosing transaction with a [`DbError`].
pub(crate) fn abort<T>(err: DbError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

pub(crate) fn tenc<T: BorshSerialize>(value: &T) -> TxResult<Vec<u8>> {
    enc(value).map_err(ConflictableTransactionError::Abort)
}

pub(crate) fn tdec<T: BorshDeserialize>(bytes: &[u8]) -> TxResult<T> {
    dec(bytes).map_err(ConflictableTransactionError::Abort)
}
