//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

use crate::generator::GenerationError;

/// Top-level domain error type.
///
/// Variants fall into the taxonomy the engine cares about: validation
/// errors report synchronously with no state change, concurrency errors
/// invite the caller to retry the whole decision, generation errors
/// surface after the retry policy is exhausted, and consistency errors
/// mark invariant violations that abort the operation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A game was not found.
    #[error("game not found: {0}")]
    GameNotFound(Uuid),

    /// A branch was not found (by id or by name).
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// A round was not found.
    #[error("round not found: {0}")]
    RoundNotFound(Uuid),

    /// A tag was not found.
    #[error("tag not found: {0}")]
    TagNotFound(String),

    /// A custom proposal was not found in the open decision.
    #[error("proposal not found: {0}")]
    ProposalNotFound(Uuid),

    /// A branch or tag name collides with an existing one in the game.
    #[error("name already in use: {0}")]
    NameTaken(String),

    /// The name is reserved (e.g. `head`) and cannot be used.
    #[error("'{0}' is a reserved name")]
    ReservedName(String),

    /// A round reference points outside the game it was used in.
    #[error("round {round_id} does not belong to game {game_id}")]
    InvalidRoundReference {
        /// The game the operation targeted.
        game_id: Uuid,
        /// The offending round reference.
        round_id: Uuid,
    },

    /// The branch is the game's head branch and cannot be deleted.
    #[error("branch '{0}' is the active head branch")]
    BranchInUse(String),

    /// The game is frozen: another turn advancement is in flight.
    #[error("game {0} is frozen; another operation is in progress")]
    GameFrozen(Uuid),

    /// The branch tip moved between snapshot and commit.
    #[error("tip of branch {branch_id} changed during advancement: expected {expected}, found {found}")]
    ConcurrentAdvancement {
        /// The branch that raced.
        branch_id: Uuid,
        /// The tip observed at the start of the operation.
        expected: Uuid,
        /// The tip found at commit time.
        found: Uuid,
    },

    /// The current tip is the root round; there is nothing to roll back.
    #[error("already at the root round; nothing to roll back")]
    AtRoot,

    /// The reset target is not on the path from root to the current tip.
    #[error("round {0} is not an ancestor of the current tip")]
    NotAnAncestor(Uuid),

    /// The tally was empty: nobody voted for an eligible option.
    #[error("no votes cast; advancement blocked")]
    NoVotes,

    /// No decision is open for the game.
    #[error("no open decision for game {0}")]
    NoOpenDecision(Uuid),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The generation capability failed (after retries, or fatally).
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// A tree invariant was violated (cycle, second root, cross-game link).
    #[error("tree consistency violation: {0}")]
    Consistency(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
