//! The narrative engine service.
//!
//! Every state machine transition of a game runs through here:
//! `Idle → Voting` via the ballot methods, `Voting → Advancing → Idle`
//! via `confirm`, with rollback/reset as freeze-guarded pointer moves.

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};
use uuid::Uuid;

use taleweave_core::clock::Clock;
use taleweave_core::error::DomainError;
use taleweave_core::generator::{Generation, GenerationError, Generator, Turn};
use taleweave_core::store::{BranchRecord, GameRecord, RoundRecord, TagRecord, TreeStore};
use taleweave_voting::{PresetOption, VoteBoard};

use crate::context::build_context;
use crate::freeze::FreezeGuard;
use crate::retry::RetryPolicy;

/// Player input recorded on every root round.
pub const OPENING_INPUT: &str = "begin";

/// Name of the branch created with every game.
pub const DEFAULT_BRANCH: &str = "main";

/// Default number of rounds shown by history queries.
pub const HISTORY_MAX_LIMIT: usize = 10;

/// A read-only snapshot of one game's position.
#[derive(Debug, Clone)]
pub struct GameStatus {
    /// The game record.
    pub game: GameRecord,
    /// The checked-out branch, if any.
    pub head_branch: Option<BranchRecord>,
    /// The round the head branch points at.
    pub tip: Option<RoundRecord>,
    /// Depth of the tip (length of its ancestor path).
    pub depth: usize,
    /// True when ballots or proposals are pending.
    pub has_open_decision: bool,
}

/// Orchestrates voting, generation, and the tree store.
pub struct NarrativeEngine {
    store: Arc<dyn TreeStore>,
    generator: Arc<dyn Generator>,
    clock: Arc<dyn Clock>,
    votes: VoteBoard,
    retry: RetryPolicy,
    max_history: Option<usize>,
}

impl NarrativeEngine {
    /// Creates an engine with the default retry policy and no history cap.
    #[must_use]
    pub fn new(
        store: Arc<dyn TreeStore>,
        generator: Arc<dyn Generator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            generator,
            clock,
            votes: VoteBoard::new(),
            retry: RetryPolicy::default(),
            max_history: None,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Caps the number of turns fed to the generator.
    #[must_use]
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = Some(max_history);
        self
    }

    // --- Game lifecycle ---------------------------------------------------

    /// Starts a game: generates the opening narrative, inserts the root
    /// round, creates the `main` branch, and checks it out.
    ///
    /// # Errors
    ///
    /// On generation failure the partially-created game is removed and
    /// the generation error is returned.
    pub async fn start_game(
        &self,
        host_user_id: &str,
        system_prompt: &str,
    ) -> Result<GameRecord, DomainError> {
        if system_prompt.trim().is_empty() {
            return Err(DomainError::Validation(
                "system prompt must not be empty".to_owned(),
            ));
        }
        let game = GameRecord {
            game_id: Uuid::new_v4(),
            host_user_id: host_user_id.to_owned(),
            system_prompt: system_prompt.to_owned(),
            head_branch_id: None,
            is_frozen: false,
            created_at: self.clock.now(),
        };
        self.store.create_game(&game).await?;
        match self.bootstrap(&game).await {
            Ok(started) => {
                info!(game_id = %game.game_id, "game started");
                Ok(started)
            }
            Err(err) => {
                if let Err(cleanup_err) = self.store.delete_game(game.game_id).await {
                    warn!(
                        game_id = %game.game_id,
                        error = %cleanup_err,
                        "failed to remove partially created game"
                    );
                }
                Err(err)
            }
        }
    }

    async fn bootstrap(&self, game: &GameRecord) -> Result<GameRecord, DomainError> {
        let generation = self
            .generate_with_retry(&game.system_prompt, &[], OPENING_INPUT)
            .await?;
        let root = RoundRecord {
            round_id: Uuid::new_v4(),
            game_id: game.game_id,
            parent_id: None,
            player_input: OPENING_INPUT.to_owned(),
            narrative: generation.narrative,
            usage: generation.usage,
            model_name: generation.model_name,
            created_at: self.clock.now(),
        };
        self.store.insert_root_round(&root).await?;
        let branch = BranchRecord {
            branch_id: Uuid::new_v4(),
            game_id: game.game_id,
            name: DEFAULT_BRANCH.to_owned(),
            tip_round_id: root.round_id,
            created_at: self.clock.now(),
        };
        self.store.create_branch(&branch).await?;
        self.store
            .set_head_branch(game.game_id, branch.branch_id)
            .await?;
        self.store.game(game.game_id).await
    }

    /// Fetches a game.
    pub async fn game(&self, game_id: Uuid) -> Result<GameRecord, DomainError> {
        self.store.game(game_id).await
    }

    /// Lists all games, newest first.
    pub async fn list_games(&self) -> Result<Vec<GameRecord>, DomainError> {
        self.store.list_games().await
    }

    /// Administrative delete: removes the game, its tree, and any open
    /// decision.
    pub async fn delete_game(&self, game_id: Uuid) -> Result<(), DomainError> {
        self.store.delete_game(game_id).await?;
        self.votes.clear(game_id);
        Ok(())
    }

    /// Builds the status snapshot used by history displays.
    pub async fn game_status(&self, game_id: Uuid) -> Result<GameStatus, DomainError> {
        let game = self.store.game(game_id).await?;
        let head_branch = match game.head_branch_id {
            Some(branch_id) => Some(self.store.branch(branch_id).await?),
            None => None,
        };
        let tip = match &head_branch {
            Some(branch) => Some(self.store.round(branch.tip_round_id).await?),
            None => None,
        };
        let depth = match &tip {
            Some(round) => self.store.ancestor_path(round.round_id).await?.len(),
            None => 0,
        };
        Ok(GameStatus {
            has_open_decision: self.votes.has_open_decision(game_id),
            game,
            head_branch,
            tip,
            depth,
        })
    }

    // --- Voting -----------------------------------------------------------

    /// Records a ballot for a preset option.
    pub async fn cast_vote(
        &self,
        game_id: Uuid,
        voter: &str,
        option: PresetOption,
    ) -> Result<(), DomainError> {
        self.store.game(game_id).await?;
        self.votes.cast_vote(game_id, voter, option);
        Ok(())
    }

    /// Registers a free-text proposal.
    pub async fn submit_proposal(
        &self,
        game_id: Uuid,
        proposer: &str,
        text: String,
    ) -> Result<Uuid, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::Validation(
                "proposal text must not be empty".to_owned(),
            ));
        }
        self.store.game(game_id).await?;
        Ok(self.votes.submit_proposal(game_id, proposer, text))
    }

    /// Approves a proposal.
    pub async fn approve_proposal(
        &self,
        game_id: Uuid,
        proposal_id: Uuid,
        voter: &str,
    ) -> Result<(), DomainError> {
        self.store.game(game_id).await?;
        self.votes.approve_proposal(game_id, proposal_id, voter)
    }

    /// Rejects a proposal.
    pub async fn reject_proposal(
        &self,
        game_id: Uuid,
        proposal_id: Uuid,
        voter: &str,
    ) -> Result<(), DomainError> {
        self.store.game(game_id).await?;
        self.votes.reject_proposal(game_id, proposal_id, voter)
    }

    /// Withdraws a proposal.
    pub async fn withdraw_proposal(
        &self,
        game_id: Uuid,
        proposal_id: Uuid,
    ) -> Result<(), DomainError> {
        self.store.game(game_id).await?;
        self.votes.withdraw_proposal(game_id, proposal_id)
    }

    /// Discards the open decision without touching the tree.
    pub async fn reject(&self, game_id: Uuid) -> Result<(), DomainError> {
        self.store.game(game_id).await?;
        if !self.votes.clear(game_id) {
            return Err(DomainError::NoOpenDecision(game_id));
        }
        Ok(())
    }

    // --- Turn advancement -------------------------------------------------

    /// Advances the head branch by one round.
    ///
    /// Freezes the game, tallies the decision, resolves the ancestor
    /// path for context, generates with bounded retries, then commits
    /// with an optimistic tip check. The decision is cleared only after
    /// a successful commit; every failure leaves it intact.
    pub async fn confirm(&self, game_id: Uuid) -> Result<RoundRecord, DomainError> {
        let game = self.store.game(game_id).await?;
        let branch = self.head_branch(&game).await?;
        FreezeGuard::run(self.store.as_ref(), game_id, async {
            // Snapshot the tip under the flag; the CAS at commit time
            // re-validates it.
            let expected_tip = self.store.branch(branch.branch_id).await?.tip_round_id;
            let outcome = self.votes.tally(game_id)?;
            let path = self.store.ancestor_path(expected_tip).await?;
            let turns = build_context(&path, self.max_history);
            let generation = self
                .generate_with_retry(&game.system_prompt, &turns, &outcome.input)
                .await?;
            let round = RoundRecord {
                round_id: Uuid::new_v4(),
                game_id,
                parent_id: Some(expected_tip),
                player_input: outcome.input.clone(),
                narrative: generation.narrative,
                usage: generation.usage,
                model_name: generation.model_name,
                created_at: self.clock.now(),
            };
            self.store
                .commit_round(branch.branch_id, expected_tip, &round)
                .await?;
            self.votes.clear(game_id);
            info!(%game_id, round_id = %round.round_id, score = outcome.score, "turn advanced");
            Ok(round)
        })
        .await
    }

    /// Moves the head branch tip to its parent. Discards any open
    /// decision, which referred to the abandoned tip.
    pub async fn rollback_one(&self, game_id: Uuid) -> Result<RoundRecord, DomainError> {
        let game = self.store.game(game_id).await?;
        let branch = self.head_branch(&game).await?;
        FreezeGuard::run(self.store.as_ref(), game_id, async {
            let tip_id = self.store.branch(branch.branch_id).await?.tip_round_id;
            let tip = self.store.round(tip_id).await?;
            let parent_id = tip.parent_id.ok_or(DomainError::AtRoot)?;
            self.store
                .move_tip(branch.branch_id, tip_id, parent_id)
                .await?;
            self.votes.clear(game_id);
            self.store.round(parent_id).await
        })
        .await
    }

    /// Moves the head branch tip back to an ancestor round. Discards
    /// any open decision.
    pub async fn reset_to(
        &self,
        game_id: Uuid,
        round_id: Uuid,
    ) -> Result<RoundRecord, DomainError> {
        let game = self.store.game(game_id).await?;
        let branch = self.head_branch(&game).await?;
        FreezeGuard::run(self.store.as_ref(), game_id, async {
            let tip_id = self.store.branch(branch.branch_id).await?.tip_round_id;
            let path = self.store.ancestor_path(tip_id).await?;
            if !path.iter().any(|r| r.round_id == round_id) {
                return Err(DomainError::NotAnAncestor(round_id));
            }
            self.store
                .move_tip(branch.branch_id, tip_id, round_id)
                .await?;
            self.votes.clear(game_id);
            self.store.round(round_id).await
        })
        .await
    }

    /// Administrative escape hatch for a flag left set by a crash.
    /// Never touches tree content.
    pub async fn force_unfreeze(&self, game_id: Uuid) -> Result<(), DomainError> {
        warn!(%game_id, "freeze flag cleared administratively");
        self.store.unfreeze(game_id).await
    }

    // --- Branches ---------------------------------------------------------

    /// Creates a branch at `base`, defaulting to the head branch tip.
    pub async fn create_branch(
        &self,
        game_id: Uuid,
        name: &str,
        base: Option<Uuid>,
    ) -> Result<BranchRecord, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "branch name must not be empty".to_owned(),
            ));
        }
        let game = self.store.game(game_id).await?;
        let tip_round_id = match base {
            Some(round_id) => round_id,
            None => self.head_branch(&game).await?.tip_round_id,
        };
        let branch = BranchRecord {
            branch_id: Uuid::new_v4(),
            game_id,
            name: name.to_owned(),
            tip_round_id,
            created_at: self.clock.now(),
        };
        self.store.create_branch(&branch).await?;
        Ok(branch)
    }

    /// Renames a branch.
    pub async fn rename_branch(
        &self,
        game_id: Uuid,
        name: &str,
        new_name: &str,
    ) -> Result<(), DomainError> {
        if new_name.trim().is_empty() {
            return Err(DomainError::Validation(
                "branch name must not be empty".to_owned(),
            ));
        }
        let branch = self.store.branch_by_name(game_id, name).await?;
        self.store.rename_branch(branch.branch_id, new_name).await
    }

    /// Deletes a branch. The head branch is refused (`BranchInUse`).
    pub async fn delete_branch(&self, game_id: Uuid, name: &str) -> Result<(), DomainError> {
        let branch = self.store.branch_by_name(game_id, name).await?;
        self.store.delete_branch(branch.branch_id).await
    }

    /// Checks out a branch: subsequent turns advance it.
    pub async fn switch_branch(
        &self,
        game_id: Uuid,
        name: &str,
    ) -> Result<BranchRecord, DomainError> {
        let branch = self.store.branch_by_name(game_id, name).await?;
        self.store.set_head_branch(game_id, branch.branch_id).await?;
        Ok(branch)
    }

    /// Lists a game's branches.
    pub async fn list_branches(&self, game_id: Uuid) -> Result<Vec<BranchRecord>, DomainError> {
        self.store.game(game_id).await?;
        self.store.list_branches(game_id).await
    }

    // --- Tags -------------------------------------------------------------

    /// Pins a round under a name, defaulting to the head branch tip.
    pub async fn create_tag(
        &self,
        game_id: Uuid,
        name: &str,
        target: Option<Uuid>,
    ) -> Result<TagRecord, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::Validation(
                "tag name must not be empty".to_owned(),
            ));
        }
        let game = self.store.game(game_id).await?;
        let round_id = match target {
            Some(round_id) => round_id,
            None => self.head_branch(&game).await?.tip_round_id,
        };
        let tag = TagRecord {
            tag_id: Uuid::new_v4(),
            game_id,
            name: name.to_owned(),
            round_id,
            created_at: self.clock.now(),
        };
        self.store.create_tag(&tag).await?;
        Ok(tag)
    }

    /// Deletes a tag by name. The pinned round is retained.
    pub async fn delete_tag(&self, game_id: Uuid, name: &str) -> Result<(), DomainError> {
        let tag = self.store.tag_by_name(game_id, name).await?;
        self.store.delete_tag(tag.tag_id).await
    }

    /// Lists a game's tags.
    pub async fn list_tags(&self, game_id: Uuid) -> Result<Vec<TagRecord>, DomainError> {
        self.store.game(game_id).await?;
        self.store.list_tags(game_id).await
    }

    // --- History ----------------------------------------------------------

    /// The most recent `limit` rounds on the path to `round_id`,
    /// root-first.
    pub async fn round_history(
        &self,
        round_id: Uuid,
        limit: usize,
    ) -> Result<Vec<RoundRecord>, DomainError> {
        let path = self.store.ancestor_path(round_id).await?;
        let start = path.len().saturating_sub(limit);
        Ok(path[start..].to_vec())
    }

    /// History of a branch, ending at its tip.
    pub async fn branch_history(
        &self,
        branch_id: Uuid,
        limit: usize,
    ) -> Result<Vec<RoundRecord>, DomainError> {
        let branch = self.store.branch(branch_id).await?;
        self.round_history(branch.tip_round_id, limit).await
    }

    /// History ending at a tagged round.
    pub async fn tag_history(
        &self,
        game_id: Uuid,
        name: &str,
        limit: usize,
    ) -> Result<Vec<RoundRecord>, DomainError> {
        let tag = self.store.tag_by_name(game_id, name).await?;
        self.round_history(tag.round_id, limit).await
    }

    // --- Internals --------------------------------------------------------

    async fn head_branch(&self, game: &GameRecord) -> Result<BranchRecord, DomainError> {
        let branch_id = game.head_branch_id.ok_or_else(|| {
            DomainError::Validation("game has no head branch".to_owned())
        })?;
        self.store.branch(branch_id).await
    }

    async fn generate_with_retry(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        next_input: &str,
    ) -> Result<Generation, DomainError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = match timeout(
                self.retry.attempt_timeout,
                self.generator.generate(system_prompt, turns, next_input),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout),
            };
            match result {
                Ok(generation) => {
                    if generation.narrative.trim().is_empty() {
                        return Err(GenerationError::EmptyCompletion.into());
                    }
                    return Ok(generation);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(attempt, error = %err, ?delay, "generation attempt failed; backing off");
                    sleep(delay).await;
                }
                Err(err) if err.is_retryable() => {
                    return Err(GenerationError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    }
                    .into());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
