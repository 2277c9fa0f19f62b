//! A single game's open decision: ballots, proposals, and the tally.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use taleweave_core::error::DomainError;

/// The fixed alphabet of preset options offered every round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PresetOption {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl PresetOption {
    /// All presets in tie-break order.
    pub const ALL: [Self; 7] = [
        Self::A,
        Self::B,
        Self::C,
        Self::D,
        Self::E,
        Self::F,
        Self::G,
    ];

    /// The option's letter label.
    #[must_use]
    pub fn label(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
            Self::E => 'E',
            Self::F => 'F',
            Self::G => 'G',
        }
    }

    /// Parses a letter label, case-insensitively.
    #[must_use]
    pub fn from_label(label: char) -> Option<Self> {
        match label.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            'E' => Some(Self::E),
            'F' => Some(Self::F),
            'G' => Some(Self::G),
            _ => None,
        }
    }
}

/// A free-text proposal with its approve/reject sub-election.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Unique identifier.
    pub proposal_id: Uuid,
    /// The voter who raised it.
    pub proposer: String,
    /// The proposed player input.
    pub text: String,
    approvals: HashSet<String>,
    rejections: HashSet<String>,
}

impl Proposal {
    /// Net margin: approvals minus rejections.
    #[allow(clippy::cast_possible_wrap)]
    #[must_use]
    pub fn score(&self) -> i64 {
        self.approvals.len() as i64 - self.rejections.len() as i64
    }

    /// A proposal is eligible only when approvals strictly outnumber
    /// rejections.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.score() > 0
    }
}

/// Where a winning input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    /// A preset option won.
    Preset(PresetOption),
    /// A custom proposal won.
    Proposal(Uuid),
}

/// The result of a tally: the decided input and its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The decided player input (preset label or proposal text).
    pub input: String,
    /// The winning score (ballot count or net margin).
    pub score: i64,
    /// The option that won.
    pub source: OutcomeSource,
}

/// The open decision for one game.
///
/// At most one decision is open per game; it holds one ballot per voter
/// plus the registered proposals, in submission order.
#[derive(Debug, Clone, Default)]
pub struct Decision {
    ballots: HashMap<String, PresetOption>,
    proposals: Vec<Proposal>,
}

impl Decision {
    /// Records a voter's ballot. Re-voting the same option is a no-op;
    /// a different option moves the ballot.
    pub fn cast_vote(&mut self, voter: &str, option: PresetOption) {
        self.ballots.insert(voter.to_owned(), option);
    }

    /// Registers a free-text proposal and returns its id.
    pub fn submit_proposal(&mut self, proposer: &str, text: String) -> Uuid {
        let proposal_id = Uuid::new_v4();
        self.proposals.push(Proposal {
            proposal_id,
            proposer: proposer.to_owned(),
            text,
            approvals: HashSet::new(),
            rejections: HashSet::new(),
        });
        proposal_id
    }

    /// Records an approval. Idempotent; clears any prior rejection by
    /// the same voter.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ProposalNotFound`] for an unknown id.
    pub fn approve(&mut self, proposal_id: Uuid, voter: &str) -> Result<(), DomainError> {
        let proposal = self.proposal_mut(proposal_id)?;
        proposal.rejections.remove(voter);
        proposal.approvals.insert(voter.to_owned());
        Ok(())
    }

    /// Records a rejection. Idempotent; clears any prior approval by
    /// the same voter.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ProposalNotFound`] for an unknown id.
    pub fn reject_proposal(&mut self, proposal_id: Uuid, voter: &str) -> Result<(), DomainError> {
        let proposal = self.proposal_mut(proposal_id)?;
        proposal.approvals.remove(voter);
        proposal.rejections.insert(voter.to_owned());
        Ok(())
    }

    /// Removes a proposal. Later proposals keep their submission order.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ProposalNotFound`] for an unknown id.
    pub fn withdraw_proposal(&mut self, proposal_id: Uuid) -> Result<Proposal, DomainError> {
        let index = self
            .proposals
            .iter()
            .position(|p| p.proposal_id == proposal_id)
            .ok_or(DomainError::ProposalNotFound(proposal_id))?;
        Ok(self.proposals.remove(index))
    }

    /// The registered proposals in submission order.
    #[must_use]
    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    /// Ballot count for one preset option.
    #[allow(clippy::cast_possible_wrap)]
    #[must_use]
    pub fn preset_count(&self, option: PresetOption) -> i64 {
        self.ballots.values().filter(|o| **o == option).count() as i64
    }

    /// True when no ballot has been cast and no proposal registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty() && self.proposals.is_empty()
    }

    /// Tallies the decision.
    ///
    /// Presets score their ballot count; proposals score their net
    /// margin and compete only when eligible. The strictly-highest
    /// score wins; ties break to the earliest-registered option
    /// (presets in `A..G` order, then proposals in submission order).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NoVotes`] when no eligible option has a
    /// positive score.
    pub fn tally(&self) -> Result<Outcome, DomainError> {
        let mut winner: Option<Outcome> = None;

        for option in PresetOption::ALL {
            let score = self.preset_count(option);
            if score > 0 && winner.as_ref().is_none_or(|w| score > w.score) {
                winner = Some(Outcome {
                    input: option.label().to_string(),
                    score,
                    source: OutcomeSource::Preset(option),
                });
            }
        }

        for proposal in &self.proposals {
            let score = proposal.score();
            if proposal.is_eligible() && winner.as_ref().is_none_or(|w| score > w.score) {
                winner = Some(Outcome {
                    input: proposal.text.clone(),
                    score,
                    source: OutcomeSource::Proposal(proposal.proposal_id),
                });
            }
        }

        winner.ok_or(DomainError::NoVotes)
    }

    fn proposal_mut(&mut self, proposal_id: Uuid) -> Result<&mut Proposal, DomainError> {
        self.proposals
            .iter_mut()
            .find(|p| p.proposal_id == proposal_id)
            .ok_or(DomainError::ProposalNotFound(proposal_id))
    }
}
