//! Mint-reservation and commit-reveal transaction engine.
//!
//! Allocates unique token identifiers, reserves them exclusively for one
//! claimant, constructs and submits the commit/reveal transaction pair
//! that inscribes issuance data into the ledger, and reconciles the
//! outcome against the external indexer. Ledger acceptance of the reveal
//! is *not* sufficient: only the indexer's recognition of the inscription
//! finalizes a reservation.

pub mod allocator;
pub mod client;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod indexer;
pub mod reservation;
pub mod script;
pub mod sweeper;

pub mod test_utils;

pub use engine::MintEngine;
pub use errors::{MintError, MintResult};

/// Milliseconds since the UNIX epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}
