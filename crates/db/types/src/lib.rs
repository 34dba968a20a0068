//! Entry types, trait definitions and errors for the mint durable store.

pub mod errors;
pub mod traits;
pub mod types;

pub use errors::DbError;

pub type DbResult<T> = Result<T, DbError>;
