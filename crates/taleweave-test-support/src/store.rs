//! In-memory `TreeStore` — mirrors the SQLite implementation's
//! semantics so engine tests run without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use taleweave_core::error::DomainError;
use taleweave_core::store::{BranchRecord, GameRecord, RoundRecord, TagRecord, TreeStore};

const RESERVED_NAME: &str = "head";

#[derive(Debug, Default)]
struct State {
    games: HashMap<Uuid, GameRecord>,
    rounds: HashMap<Uuid, RoundRecord>,
    branches: HashMap<Uuid, BranchRecord>,
    tags: HashMap<Uuid, TagRecord>,
}

/// An in-memory tree store with the same invariants as the SQLite one.
#[derive(Debug, Default)]
pub struct MemoryTreeStore {
    state: Mutex<State>,
}

impl MemoryTreeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

fn reject_reserved(name: &str) -> Result<(), DomainError> {
    if name.eq_ignore_ascii_case(RESERVED_NAME) {
        return Err(DomainError::ReservedName(name.to_owned()));
    }
    Ok(())
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn create_game(&self, game: &GameRecord) -> Result<(), DomainError> {
        self.lock().games.insert(game.game_id, game.clone());
        Ok(())
    }

    async fn game(&self, game_id: Uuid) -> Result<GameRecord, DomainError> {
        self.lock()
            .games
            .get(&game_id)
            .cloned()
            .ok_or(DomainError::GameNotFound(game_id))
    }

    async fn list_games(&self) -> Result<Vec<GameRecord>, DomainError> {
        let mut games: Vec<GameRecord> = self.lock().games.values().cloned().collect();
        games.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(games)
    }

    async fn delete_game(&self, game_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.lock();
        if state.games.remove(&game_id).is_none() {
            return Err(DomainError::GameNotFound(game_id));
        }
        state.rounds.retain(|_, r| r.game_id != game_id);
        state.branches.retain(|_, b| b.game_id != game_id);
        state.tags.retain(|_, t| t.game_id != game_id);
        Ok(())
    }

    async fn set_head_branch(&self, game_id: Uuid, branch_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.lock();
        let branch_game = state
            .branches
            .get(&branch_id)
            .map(|b| b.game_id)
            .ok_or_else(|| DomainError::BranchNotFound(branch_id.to_string()))?;
        if branch_game != game_id {
            return Err(DomainError::Consistency(format!(
                "branch {branch_id} belongs to game {branch_game}, not {game_id}"
            )));
        }
        let game = state
            .games
            .get_mut(&game_id)
            .ok_or(DomainError::GameNotFound(game_id))?;
        game.head_branch_id = Some(branch_id);
        Ok(())
    }

    async fn try_freeze(&self, game_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.lock();
        let game = state
            .games
            .get_mut(&game_id)
            .ok_or(DomainError::GameNotFound(game_id))?;
        if game.is_frozen {
            return Err(DomainError::GameFrozen(game_id));
        }
        game.is_frozen = true;
        Ok(())
    }

    async fn unfreeze(&self, game_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.lock();
        let game = state
            .games
            .get_mut(&game_id)
            .ok_or(DomainError::GameNotFound(game_id))?;
        game.is_frozen = false;
        Ok(())
    }

    async fn insert_root_round(&self, round: &RoundRecord) -> Result<(), DomainError> {
        if round.parent_id.is_some() {
            return Err(DomainError::Consistency(
                "root round must not have a parent".to_owned(),
            ));
        }
        let mut state = self.lock();
        if !state.games.contains_key(&round.game_id) {
            return Err(DomainError::GameNotFound(round.game_id));
        }
        let has_root = state
            .rounds
            .values()
            .any(|r| r.game_id == round.game_id && r.parent_id.is_none());
        if has_root {
            return Err(DomainError::Consistency(format!(
                "game {} already has a root round",
                round.game_id
            )));
        }
        state.rounds.insert(round.round_id, round.clone());
        Ok(())
    }

    async fn commit_round(
        &self,
        branch_id: Uuid,
        expected_tip: Uuid,
        round: &RoundRecord,
    ) -> Result<(), DomainError> {
        let mut state = self.lock();
        let branch = state
            .branches
            .get(&branch_id)
            .cloned()
            .ok_or_else(|| DomainError::BranchNotFound(branch_id.to_string()))?;
        if branch.tip_round_id != expected_tip {
            return Err(DomainError::ConcurrentAdvancement {
                branch_id,
                expected: expected_tip,
                found: branch.tip_round_id,
            });
        }
        if round.parent_id != Some(expected_tip) {
            return Err(DomainError::Consistency(
                "committed round must be a child of the branch tip".to_owned(),
            ));
        }
        if round.game_id != branch.game_id {
            return Err(DomainError::Consistency(format!(
                "round {} does not belong to game {}",
                round.round_id, branch.game_id
            )));
        }
        state.rounds.insert(round.round_id, round.clone());
        if let Some(b) = state.branches.get_mut(&branch_id) {
            b.tip_round_id = round.round_id;
        }
        Ok(())
    }

    async fn move_tip(
        &self,
        branch_id: Uuid,
        expected_tip: Uuid,
        new_tip: Uuid,
    ) -> Result<(), DomainError> {
        let mut state = self.lock();
        let branch = state
            .branches
            .get(&branch_id)
            .cloned()
            .ok_or_else(|| DomainError::BranchNotFound(branch_id.to_string()))?;
        if branch.tip_round_id != expected_tip {
            return Err(DomainError::ConcurrentAdvancement {
                branch_id,
                expected: expected_tip,
                found: branch.tip_round_id,
            });
        }
        let target = state
            .rounds
            .get(&new_tip)
            .ok_or(DomainError::RoundNotFound(new_tip))?;
        if target.game_id != branch.game_id {
            return Err(DomainError::InvalidRoundReference {
                game_id: branch.game_id,
                round_id: new_tip,
            });
        }
        if let Some(b) = state.branches.get_mut(&branch_id) {
            b.tip_round_id = new_tip;
        }
        Ok(())
    }

    async fn round(&self, round_id: Uuid) -> Result<RoundRecord, DomainError> {
        self.lock()
            .rounds
            .get(&round_id)
            .cloned()
            .ok_or(DomainError::RoundNotFound(round_id))
    }

    async fn ancestor_path(&self, round_id: Uuid) -> Result<Vec<RoundRecord>, DomainError> {
        let state = self.lock();
        let mut path = Vec::new();
        let mut cursor = Some(round_id);
        while let Some(id) = cursor {
            let round = state
                .rounds
                .get(&id)
                .cloned()
                .ok_or(DomainError::RoundNotFound(round_id))?;
            cursor = round.parent_id;
            path.push(round);
            if path.len() > state.rounds.len() {
                return Err(DomainError::Consistency("cycle in round tree".to_owned()));
            }
        }
        path.reverse();
        Ok(path)
    }

    async fn create_branch(&self, branch: &BranchRecord) -> Result<(), DomainError> {
        reject_reserved(&branch.name)?;
        let mut state = self.lock();
        let tip = state
            .rounds
            .get(&branch.tip_round_id)
            .ok_or(DomainError::RoundNotFound(branch.tip_round_id))?;
        if tip.game_id != branch.game_id {
            return Err(DomainError::InvalidRoundReference {
                game_id: branch.game_id,
                round_id: branch.tip_round_id,
            });
        }
        let collision = state
            .branches
            .values()
            .any(|b| b.game_id == branch.game_id && b.name == branch.name);
        if collision {
            return Err(DomainError::NameTaken(branch.name.clone()));
        }
        state.branches.insert(branch.branch_id, branch.clone());
        Ok(())
    }

    async fn branch(&self, branch_id: Uuid) -> Result<BranchRecord, DomainError> {
        self.lock()
            .branches
            .get(&branch_id)
            .cloned()
            .ok_or_else(|| DomainError::BranchNotFound(branch_id.to_string()))
    }

    async fn branch_by_name(&self, game_id: Uuid, name: &str) -> Result<BranchRecord, DomainError> {
        self.lock()
            .branches
            .values()
            .find(|b| b.game_id == game_id && b.name == name)
            .cloned()
            .ok_or_else(|| DomainError::BranchNotFound(name.to_owned()))
    }

    async fn list_branches(&self, game_id: Uuid) -> Result<Vec<BranchRecord>, DomainError> {
        let mut branches: Vec<BranchRecord> = self
            .lock()
            .branches
            .values()
            .filter(|b| b.game_id == game_id)
            .cloned()
            .collect();
        branches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(branches)
    }

    async fn rename_branch(&self, branch_id: Uuid, new_name: &str) -> Result<(), DomainError> {
        reject_reserved(new_name)?;
        let mut state = self.lock();
        let game_id = state
            .branches
            .get(&branch_id)
            .map(|b| b.game_id)
            .ok_or_else(|| DomainError::BranchNotFound(branch_id.to_string()))?;
        let collision = state
            .branches
            .values()
            .any(|b| b.game_id == game_id && b.name == new_name && b.branch_id != branch_id);
        if collision {
            return Err(DomainError::NameTaken(new_name.to_owned()));
        }
        if let Some(b) = state.branches.get_mut(&branch_id) {
            b.name = new_name.to_owned();
        }
        Ok(())
    }

    async fn delete_branch(&self, branch_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.lock();
        let branch = state
            .branches
            .get(&branch_id)
            .cloned()
            .ok_or_else(|| DomainError::BranchNotFound(branch_id.to_string()))?;
        let is_head = state
            .games
            .get(&branch.game_id)
            .is_some_and(|g| g.head_branch_id == Some(branch_id));
        if is_head {
            return Err(DomainError::BranchInUse(branch.name));
        }
        state.branches.remove(&branch_id);
        Ok(())
    }

    async fn create_tag(&self, tag: &TagRecord) -> Result<(), DomainError> {
        reject_reserved(&tag.name)?;
        let mut state = self.lock();
        let target = state
            .rounds
            .get(&tag.round_id)
            .ok_or(DomainError::RoundNotFound(tag.round_id))?;
        if target.game_id != tag.game_id {
            return Err(DomainError::InvalidRoundReference {
                game_id: tag.game_id,
                round_id: tag.round_id,
            });
        }
        let collision = state
            .tags
            .values()
            .any(|t| t.game_id == tag.game_id && t.name == tag.name);
        if collision {
            return Err(DomainError::NameTaken(tag.name.clone()));
        }
        state.tags.insert(tag.tag_id, tag.clone());
        Ok(())
    }

    async fn tag_by_name(&self, game_id: Uuid, name: &str) -> Result<TagRecord, DomainError> {
        self.lock()
            .tags
            .values()
            .find(|t| t.game_id == game_id && t.name == name)
            .cloned()
            .ok_or_else(|| DomainError::TagNotFound(name.to_owned()))
    }

    async fn list_tags(&self, game_id: Uuid) -> Result<Vec<TagRecord>, DomainError> {
        let mut tags: Vec<TagRecord> = self
            .lock()
            .tags
            .values()
            .filter(|t| t.game_id == game_id)
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(tags)
    }

    async fn delete_tag(&self, tag_id: Uuid) -> Result<(), DomainError> {
        let mut state = self.lock();
        if state.tags.remove(&tag_id).is_none() {
            return Err(DomainError::TagNotFound(tag_id.to_string()));
        }
        Ok(())
    }
}
