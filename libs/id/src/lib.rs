//! # cohort-id
//!
//! Typed identifiers for the placement engine.
//!
//! ## Design Principles
//!
//! - IDs are issued by the backend; the engine never mints them
//! - IDs are opaque: any non-empty token without whitespace is accepted
//! - IDs are typed so a candidate id cannot be passed where a resource id
//!   is expected
//!
//! Examples of accepted IDs:
//! - `65a1f0c2e4b0a93d2c1e7f10` (database object id)
//! - `station-north-3`
//! - `cand_0042`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

#[doc(hidden)]
pub use error::validate as __validate;

/// Upper bound on the length of an accepted id, in bytes.
pub const MAX_ID_LEN: usize = 128;
