//! The tree store port.
//!
//! The story state is a version-controlled tree: rounds are immutable
//! nodes, branches are movable pointers to tip rounds, and tags pin
//! rounds permanently. Everything mutable is a pointer; round content
//! is never rewritten once committed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::generator::TokenUsage;

/// A game: the root aggregate of one story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    /// Unique identifier.
    pub game_id: Uuid,
    /// The user who started the game.
    pub host_user_id: String,
    /// The system prompt establishing setting and tone.
    pub system_prompt: String,
    /// The currently checked-out branch, if the game has advanced past creation.
    pub head_branch_id: Option<Uuid>,
    /// Set while a turn advancement is in flight.
    pub is_frozen: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One immutable story turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRecord {
    /// Unique identifier.
    pub round_id: Uuid,
    /// Owning game.
    pub game_id: Uuid,
    /// Parent round; `None` only for the root round.
    pub parent_id: Option<Uuid>,
    /// The decided player input that produced this turn.
    pub player_input: String,
    /// The generated narrative.
    pub narrative: String,
    /// Token usage reported for the generation, when available.
    pub usage: Option<TokenUsage>,
    /// The model that generated the narrative, when known.
    pub model_name: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl RoundRecord {
    /// Returns true if this is the root round of its game.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A named, movable pointer to a tip round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    /// Unique identifier.
    pub branch_id: Uuid,
    /// Owning game.
    pub game_id: Uuid,
    /// Branch name, unique within the game.
    pub name: String,
    /// The round this branch currently points at.
    pub tip_round_id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A named, immovable pointer to a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    /// Unique identifier.
    pub tag_id: Uuid,
    /// Owning game.
    pub game_id: Uuid,
    /// Tag name, unique within the game.
    pub name: String,
    /// The round this tag pins.
    pub round_id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Persistence port for the story tree.
///
/// Implementations must make `try_freeze`, `commit_round`, and `move_tip`
/// atomic: they are the compare-and-swap primitives the advancement
/// protocol is built on.
#[async_trait]
pub trait TreeStore: Send + Sync {
    // Games ----------------------------------------------------------------

    /// Persists a new game.
    async fn create_game(&self, game: &GameRecord) -> Result<(), DomainError>;

    /// Fetches a game by id.
    async fn game(&self, game_id: Uuid) -> Result<GameRecord, DomainError>;

    /// Lists all games, newest first.
    async fn list_games(&self) -> Result<Vec<GameRecord>, DomainError>;

    /// Deletes a game and everything under it (rounds, branches, tags).
    async fn delete_game(&self, game_id: Uuid) -> Result<(), DomainError>;

    /// Points the game's head at a branch.
    async fn set_head_branch(&self, game_id: Uuid, branch_id: Uuid) -> Result<(), DomainError>;

    /// Atomically sets the freeze flag if it is clear.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::GameFrozen`] if the flag was already set.
    async fn try_freeze(&self, game_id: Uuid) -> Result<(), DomainError>;

    /// Clears the freeze flag unconditionally.
    async fn unfreeze(&self, game_id: Uuid) -> Result<(), DomainError>;

    // Rounds ---------------------------------------------------------------

    /// Inserts the root round of a game.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Consistency`] if the game already has a root.
    async fn insert_root_round(&self, round: &RoundRecord) -> Result<(), DomainError>;

    /// Atomically appends a round and advances the branch tip, if and only
    /// if the tip still equals `expected_tip`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ConcurrentAdvancement`] when the tip moved,
    /// leaving the store unchanged.
    async fn commit_round(
        &self,
        branch_id: Uuid,
        expected_tip: Uuid,
        round: &RoundRecord,
    ) -> Result<(), DomainError>;

    /// Atomically moves a branch tip to an existing round, if and only if
    /// the tip still equals `expected_tip`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ConcurrentAdvancement`] when the tip moved.
    async fn move_tip(
        &self,
        branch_id: Uuid,
        expected_tip: Uuid,
        new_tip: Uuid,
    ) -> Result<(), DomainError>;

    /// Fetches a round by id.
    async fn round(&self, round_id: Uuid) -> Result<RoundRecord, DomainError>;

    /// Returns the path from the root round down to `round_id`, inclusive,
    /// in root-first order.
    async fn ancestor_path(&self, round_id: Uuid) -> Result<Vec<RoundRecord>, DomainError>;

    // Branches -------------------------------------------------------------

    /// Persists a new branch.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NameTaken`] if the name is already used in
    /// the game, or [`DomainError::InvalidRoundReference`] if the tip round
    /// does not belong to it.
    async fn create_branch(&self, branch: &BranchRecord) -> Result<(), DomainError>;

    /// Fetches a branch by id.
    async fn branch(&self, branch_id: Uuid) -> Result<BranchRecord, DomainError>;

    /// Fetches a branch by name within a game.
    async fn branch_by_name(&self, game_id: Uuid, name: &str) -> Result<BranchRecord, DomainError>;

    /// Lists a game's branches, oldest first.
    async fn list_branches(&self, game_id: Uuid) -> Result<Vec<BranchRecord>, DomainError>;

    /// Renames a branch.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NameTaken`] if the new name collides.
    async fn rename_branch(&self, branch_id: Uuid, new_name: &str) -> Result<(), DomainError>;

    /// Deletes a branch. Rounds it pointed at are retained.
    async fn delete_branch(&self, branch_id: Uuid) -> Result<(), DomainError>;

    // Tags -----------------------------------------------------------------

    /// Persists a new tag.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NameTaken`] if the name is already used in
    /// the game, or [`DomainError::InvalidRoundReference`] if the tagged
    /// round does not belong to it.
    async fn create_tag(&self, tag: &TagRecord) -> Result<(), DomainError>;

    /// Fetches a tag by name within a game.
    async fn tag_by_name(&self, game_id: Uuid, name: &str) -> Result<TagRecord, DomainError>;

    /// Lists a game's tags, oldest first.
    async fn list_tags(&self, game_id: Uuid) -> Result<Vec<TagRecord>, DomainError>;

    /// Deletes a tag. The round it pinned is retained.
    async fn delete_tag(&self, tag_id: Uuid) -> Result<(), DomainError>;
}
