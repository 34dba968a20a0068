//! Sled-backed implementation of the mint durable store.
//!
//! Every compound lifecycle transition runs as one sled transaction over
//! the trees it touches, so a crash or a racing caller can never observe a
//! status change without its paired recycle/certificate update.

mod codec;
mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use store::MintStoreSled;
