//! Basic types shared across the mint engine: identifiers and the
//! inscription payload wire format.

pub mod ids;
pub mod payload;

pub use ids::{CertificateId, ClaimantId, CollectionId, ReservationId, TokenId};
pub use payload::MintPayload;
