use mintio_primitives::CollectionId;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DbError {
    #[error("entry does not exist")]
    NonExistentEntry,

    #[error("collection {0} is not registered")]
    MissingCollection(CollectionId),

    #[error("IO Error: {0}")]
    IoError(String),

    #[error("codec error {0}")]
    CodecError(String),
}

impl From<sled::Error> for DbError {
    fn from(value: sled::Error) -> Self {
        Self::IoError(format!("sled error: {value}"))
    }
}

impl From<sled::transaction::TransactionError<DbError>> for DbError {
    fn from(value: sled::transaction::TransactionError<DbError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => e.into(),
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        Self::CodecError(value.to_string())
    }
}
