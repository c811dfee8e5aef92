//! Error types for protocol operations.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Protocol operation errors.
///
/// `NeedMoreData` is deliberately absent: a parser that cannot make progress
/// simply returns no events and retries on the next feed.
#[derive(Debug, Error)]
pub enum Error {
    /// A trigger was fired in a state that does not permit it, directly or
    /// through any parent state.
    #[error("no transition permits trigger {trigger} in state {state}")]
    UndefinedTrigger {
        /// The state the machine was in when the trigger fired.
        state: String,
        /// The trigger that had no matching transition.
        trigger: String,
    },

    /// More than one transition qualified for a single trigger.
    #[error("multiple transitions permit trigger {trigger} in state {state}")]
    AmbiguousTransition {
        /// The state in which the ambiguity was found.
        state: String,
        /// The trigger that matched more than one transition.
        trigger: String,
    },

    /// The peer sent bytes that violate the wire format. The owning
    /// connection is expected to be torn down.
    #[error("malformed input: {0}")]
    Malformed(String),
}
