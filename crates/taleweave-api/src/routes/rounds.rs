//! Round history endpoint.

use axum::extract::{Path, Query, State};
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use taleweave_core::error::DomainError;
use taleweave_core::generator::TokenUsage;
use taleweave_core::store::{RoundRecord, TreeStore};
use taleweave_engine::engine::HISTORY_MAX_LIMIT;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for history endpoints.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of rounds to return, most recent last.
    pub limit: Option<usize>,
}

/// One round in a history response.
#[derive(Debug, Serialize)]
pub struct RoundView {
    /// Round identifier.
    pub round_id: Uuid,
    /// Parent round, absent for the root.
    pub parent_id: Option<Uuid>,
    /// The winning player input the round was generated from.
    pub player_input: String,
    /// The generated narrative text.
    pub narrative: String,
    /// Token usage reported by the generation capability, if any.
    pub usage: Option<TokenUsage>,
    /// Model that produced the narrative, if known.
    pub model_name: Option<String>,
    /// When the round was committed.
    pub created_at: DateTime<Utc>,
}

impl From<RoundRecord> for RoundView {
    fn from(round: RoundRecord) -> Self {
        Self {
            round_id: round.round_id,
            parent_id: round.parent_id,
            player_input: round.player_input,
            narrative: round.narrative,
            usage: round.usage,
            model_name: round.model_name,
            created_at: round.created_at,
        }
    }
}

/// Resolves the ancestor path of `round_id` and keeps the last `limit`
/// rounds, oldest first.
pub(crate) async fn history_of(
    store: &dyn TreeStore,
    round_id: Uuid,
    limit: usize,
) -> Result<Vec<RoundView>, DomainError> {
    let path = store.ancestor_path(round_id).await?;
    let start = path.len().saturating_sub(limit);
    Ok(path.into_iter().skip(start).map(RoundView::from).collect())
}

/// GET /api/v1/rounds/{round_id}/history
#[instrument(skip(state))]
async fn round_history(
    State(state): State<AppState>,
    Path(round_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<RoundView>>, ApiError> {
    let limit = query.limit.unwrap_or(HISTORY_MAX_LIMIT);
    let rounds = history_of(state.store.as_ref(), round_id, limit).await?;
    Ok(Json(rounds))
}

/// Returns the router for round queries.
pub fn router() -> Router<AppState> {
    Router::new().route("/{round_id}/history", get(round_history))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use taleweave_core::store::{BranchRecord, GameRecord};
    use taleweave_test_support::MemoryTreeStore;
    use tower::ServiceExt;

    fn game() -> GameRecord {
        GameRecord {
            game_id: Uuid::new_v4(),
            host_user_id: "host".to_owned(),
            system_prompt: "a drowned city".to_owned(),
            head_branch_id: None,
            is_frozen: false,
            created_at: Utc::now(),
        }
    }

    fn round(game_id: Uuid, parent_id: Option<Uuid>, input: &str) -> RoundRecord {
        RoundRecord {
            round_id: Uuid::new_v4(),
            game_id,
            parent_id,
            player_input: input.to_owned(),
            narrative: format!("narrative for {input}"),
            usage: None,
            model_name: None,
            created_at: Utc::now(),
        }
    }

    /// Seeds a game with a linear chain of `extra` rounds past the root
    /// and returns the store together with the chain, root first.
    async fn seeded_chain(extra: usize) -> (Arc<MemoryTreeStore>, Vec<RoundRecord>) {
        let store = Arc::new(MemoryTreeStore::new());
        let game = game();
        store.create_game(&game).await.unwrap();
        let root = round(game.game_id, None, "begin");
        store.insert_root_round(&root).await.unwrap();
        let main = BranchRecord {
            branch_id: Uuid::new_v4(),
            game_id: game.game_id,
            name: "main".to_owned(),
            tip_round_id: root.round_id,
            created_at: Utc::now(),
        };
        store.create_branch(&main).await.unwrap();
        store
            .set_head_branch(game.game_id, main.branch_id)
            .await
            .unwrap();

        let mut chain = vec![root];
        for i in 0..extra {
            let tip = chain[chain.len() - 1].round_id;
            let next = round(game.game_id, Some(tip), &format!("turn {i}"));
            store.commit_round(main.branch_id, tip, &next).await.unwrap();
            chain.push(next);
        }
        (store, chain)
    }

    async fn get_history(store: Arc<MemoryTreeStore>, uri: &str) -> (StatusCode, Value) {
        let app = router().with_state(AppState::new(store));
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body_bytes).unwrap())
    }

    #[tokio::test]
    async fn test_history_defaults_to_the_last_ten_rounds() {
        // Arrange
        let (store, chain) = seeded_chain(12).await;
        let tip = chain[chain.len() - 1].round_id;

        // Act
        let (status, json) = get_history(store, &format!("/{tip}/history")).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let rounds = json.as_array().unwrap();
        assert_eq!(rounds.len(), 10);
        assert_eq!(
            rounds[9]["round_id"].as_str().unwrap(),
            tip.to_string()
        );
        // Oldest entry of the window, not the root.
        assert_eq!(
            rounds[0]["round_id"].as_str().unwrap(),
            chain[3].round_id.to_string()
        );
    }

    #[tokio::test]
    async fn test_history_honors_an_explicit_limit() {
        // Arrange
        let (store, chain) = seeded_chain(5).await;
        let tip = chain[chain.len() - 1].round_id;

        // Act
        let (status, json) = get_history(store, &format!("/{tip}/history?limit=2")).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let rounds = json.as_array().unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(
            rounds[1]["round_id"].as_str().unwrap(),
            tip.to_string()
        );
    }

    #[tokio::test]
    async fn test_history_of_the_root_is_a_single_round() {
        // Arrange
        let (store, chain) = seeded_chain(0).await;
        let root = chain[0].round_id;

        // Act
        let (status, json) = get_history(store, &format!("/{root}/history")).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let rounds = json.as_array().unwrap();
        assert_eq!(rounds.len(), 1);
        assert!(rounds[0]["parent_id"].is_null());
        assert_eq!(rounds[0]["player_input"], "begin");
    }

    #[tokio::test]
    async fn test_unknown_round_returns_404() {
        // Arrange
        let store = Arc::new(MemoryTreeStore::new());

        // Act
        let (status, json) =
            get_history(store, &format!("/{}/history", Uuid::new_v4())).await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "round_not_found");
    }
}
