//! Branch history endpoint.

use axum::extract::{Path, Query, State};
use axum::{Json, Router, routing::get};
use tracing::instrument;
use uuid::Uuid;

use taleweave_core::store::TreeStore;
use taleweave_engine::engine::HISTORY_MAX_LIMIT;

use crate::error::ApiError;
use crate::routes::rounds::{HistoryQuery, RoundView, history_of};
use crate::state::AppState;

/// GET /api/v1/branches/{branch_id}/history
///
/// History of the branch tip: the tail of its ancestor path, oldest
/// first.
#[instrument(skip(state))]
async fn branch_history(
    State(state): State<AppState>,
    Path(branch_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<RoundView>>, ApiError> {
    let branch = state.store.branch(branch_id).await?;
    let limit = query.limit.unwrap_or(HISTORY_MAX_LIMIT);
    let rounds = history_of(state.store.as_ref(), branch.tip_round_id, limit).await?;
    Ok(Json(rounds))
}

/// Returns the router for branch queries.
pub fn router() -> Router<AppState> {
    Router::new().route("/{branch_id}/history", get(branch_history))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::Value;
    use taleweave_core::store::{BranchRecord, GameRecord, RoundRecord};
    use taleweave_test_support::MemoryTreeStore;
    use tower::ServiceExt;

    async fn seeded() -> (Arc<MemoryTreeStore>, BranchRecord, Vec<Uuid>) {
        let store = Arc::new(MemoryTreeStore::new());
        let game = GameRecord {
            game_id: Uuid::new_v4(),
            host_user_id: "host".to_owned(),
            system_prompt: "a drowned city".to_owned(),
            head_branch_id: None,
            is_frozen: false,
            created_at: Utc::now(),
        };
        store.create_game(&game).await.unwrap();
        let root = RoundRecord {
            round_id: Uuid::new_v4(),
            game_id: game.game_id,
            parent_id: None,
            player_input: "begin".to_owned(),
            narrative: "opening".to_owned(),
            usage: None,
            model_name: None,
            created_at: Utc::now(),
        };
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

        let mut ids = vec![root.round_id];
        for input in ["A", "B"] {
            let tip = ids[ids.len() - 1];
            let next = RoundRecord {
                round_id: Uuid::new_v4(),
                game_id: game.game_id,
                parent_id: Some(tip),
                player_input: input.to_owned(),
                narrative: format!("narrative for {input}"),
                usage: None,
                model_name: None,
                created_at: Utc::now(),
            };
            store.commit_round(main.branch_id, tip, &next).await.unwrap();
            ids.push(next.round_id);
        }
        let main = store.branch(main.branch_id).await.unwrap();
        (store, main, ids)
    }

    async fn get_json(store: Arc<MemoryTreeStore>, uri: &str) -> (StatusCode, Value) {
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
    async fn test_branch_history_follows_the_tip() {
        // Arrange
        let (store, main, ids) = seeded().await;

        // Act
        let (status, json) =
            get_json(store, &format!("/{}/history", main.branch_id)).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let rounds = json.as_array().unwrap();
        assert_eq!(rounds.len(), 3);
        let returned: Vec<String> = rounds
            .iter()
            .map(|r| r["round_id"].as_str().unwrap().to_owned())
            .collect();
        let expected: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        assert_eq!(returned, expected);
    }

    #[tokio::test]
    async fn test_unknown_branch_returns_404() {
        // Arrange
        let store = Arc::new(MemoryTreeStore::new());

        // Act
        let (status, json) =
            get_json(store, &format!("/{}/history", Uuid::new_v4())).await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "branch_not_found");
    }
}
