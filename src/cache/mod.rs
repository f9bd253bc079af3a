//! Cache - Client-side projection kept consistent with the registry.
//!
//! The cache applies each mutation optimistically, issues it to the
//! registry, and then either reconciles the local projection against the
//! confirmed record or rolls the optimistic delta back. The projection
//! never retains an optimistic state for a mutation known to have failed.
//!
//! ## Example
//!
//! ```ignore
//! use motorpool::{Mutation, MutationOutcome, Synchronizer};
//!
//! let mut sync = Synchronizer::new();
//! let ticket = sync.begin(Mutation::AddPerson {
//!     first_name: "Ada".into(),
//!     last_name: "Lovelace".into(),
//! })?;
//!
//! let confirmed = registry.add_person("Ada", "Lovelace")?;
//! sync.commit(ticket, MutationOutcome::Person(confirmed))?;
//! ```

mod mutation;
mod projection;
mod synchronizer;

use std::fmt;

/// Error type for cache operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A mutation targeting this entity is still unresolved.
    PendingMutation { key: String },
    /// The ticket does not match any pending mutation.
    UnknownTicket,
    /// The confirmed outcome kind does not match the pending mutation.
    OutcomeMismatch { key: String },
    /// Undo-record encode/decode failure.
    Codec(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::PendingMutation { key } => {
                write!(f, "a mutation targeting {} is still unresolved", key)
            }
            CacheError::UnknownTicket => write!(f, "ticket matches no pending mutation"),
            CacheError::OutcomeMismatch { key } => {
                write!(f, "confirmed outcome kind does not match pending mutation {}", key)
            }
            CacheError::Codec(msg) => write!(f, "undo record codec error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

pub use mutation::{Mutation, MutationOutcome};
pub use projection::Projection;
pub use synchronizer::{Synchronizer, Ticket};
