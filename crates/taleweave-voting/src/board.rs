//! Per-game decision registry.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use taleweave_core::error::DomainError;

use crate::decision::{Decision, Outcome, PresetOption};

/// Holds the open decision for every game.
///
/// A decision opens implicitly on the first ballot or proposal and is
/// dropped by [`VoteBoard::clear`] when the game advances, rejects the
/// round, or is deleted. All mutations are synchronous under one mutex;
/// nothing here awaits.
#[derive(Debug, Default)]
pub struct VoteBoard {
    decisions: Mutex<HashMap<Uuid, Decision>>,
}

impl VoteBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a ballot, opening the game's decision if needed.
    pub fn cast_vote(&self, game_id: Uuid, voter: &str, option: PresetOption) {
        self.lock().entry(game_id).or_default().cast_vote(voter, option);
    }

    /// Registers a proposal, opening the game's decision if needed.
    pub fn submit_proposal(&self, game_id: Uuid, proposer: &str, text: String) -> Uuid {
        self.lock()
            .entry(game_id)
            .or_default()
            .submit_proposal(proposer, text)
    }

    /// Records an approval on an open proposal.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoOpenDecision`] when the game has no
    /// decision, or [`DomainError::ProposalNotFound`] for an unknown id.
    pub fn approve_proposal(
        &self,
        game_id: Uuid,
        proposal_id: Uuid,
        voter: &str,
    ) -> Result<(), DomainError> {
        let mut decisions = self.lock();
        let decision = decisions
            .get_mut(&game_id)
            .ok_or(DomainError::NoOpenDecision(game_id))?;
        decision.approve(proposal_id, voter)
    }

    /// Records a rejection on an open proposal.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoOpenDecision`] when the game has no
    /// decision, or [`DomainError::ProposalNotFound`] for an unknown id.
    pub fn reject_proposal(
        &self,
        game_id: Uuid,
        proposal_id: Uuid,
        voter: &str,
    ) -> Result<(), DomainError> {
        let mut decisions = self.lock();
        let decision = decisions
            .get_mut(&game_id)
            .ok_or(DomainError::NoOpenDecision(game_id))?;
        decision.reject_proposal(proposal_id, voter)
    }

    /// Removes a proposal from an open decision.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoOpenDecision`] when the game has no
    /// decision, or [`DomainError::ProposalNotFound`] for an unknown id.
    pub fn withdraw_proposal(&self, game_id: Uuid, proposal_id: Uuid) -> Result<(), DomainError> {
        let mut decisions = self.lock();
        let decision = decisions
            .get_mut(&game_id)
            .ok_or(DomainError::NoOpenDecision(game_id))?;
        decision.withdraw_proposal(proposal_id)?;
        Ok(())
    }

    /// Tallies the game's open decision without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoVotes`] when no decision is open or no
    /// eligible option has a positive score.
    pub fn tally(&self, game_id: Uuid) -> Result<Outcome, DomainError> {
        self.lock()
            .get(&game_id)
            .ok_or(DomainError::NoVotes)?
            .tally()
    }

    /// True when the game has an open decision with any content.
    #[must_use]
    pub fn has_open_decision(&self, game_id: Uuid) -> bool {
        self.lock().get(&game_id).is_some_and(|d| !d.is_empty())
    }

    /// Drops the game's decision. Returns true if one was open.
    pub fn clear(&self, game_id: Uuid) -> bool {
        self.lock().remove(&game_id).is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Decision>> {
        self.decisions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
