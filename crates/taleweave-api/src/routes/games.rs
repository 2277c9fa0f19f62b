//! Game query endpoints.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use taleweave_core::store::{BranchRecord, TagRecord, TreeStore};

use crate::error::ApiError;
use crate::state::AppState;

/// One game in the list response.
#[derive(Debug, Serialize)]
pub struct GameSummary {
    /// Game identifier.
    pub game_id: Uuid,
    /// User who hosts the game.
    pub host_user_id: String,
    /// True while a turn advancement is in flight.
    pub is_frozen: bool,
    /// When the game was created.
    pub created_at: DateTime<Utc>,
}

/// Detailed view of a single game.
#[derive(Debug, Serialize)]
pub struct GameDetail {
    /// Game identifier.
    pub game_id: Uuid,
    /// User who hosts the game.
    pub host_user_id: String,
    /// The fixed system prompt the game was started with.
    pub system_prompt: String,
    /// True while a turn advancement is in flight.
    pub is_frozen: bool,
    /// When the game was created.
    pub created_at: DateTime<Utc>,
    /// Name of the checked-out branch, absent before bootstrap finishes.
    pub head_branch: Option<String>,
    /// The round the head branch points at.
    pub tip_round_id: Option<Uuid>,
    /// Number of rounds from the root to the tip, inclusive.
    pub depth: usize,
}

/// One branch in a branch list response.
#[derive(Debug, Serialize)]
pub struct BranchView {
    /// Branch identifier.
    pub branch_id: Uuid,
    /// Branch name, unique within the game.
    pub name: String,
    /// The round the branch points at.
    pub tip_round_id: Uuid,
    /// When the branch was created.
    pub created_at: DateTime<Utc>,
}

impl From<BranchRecord> for BranchView {
    fn from(branch: BranchRecord) -> Self {
        Self {
            branch_id: branch.branch_id,
            name: branch.name,
            tip_round_id: branch.tip_round_id,
            created_at: branch.created_at,
        }
    }
}

/// One tag in a tag list response.
#[derive(Debug, Serialize)]
pub struct TagView {
    /// Tag identifier.
    pub tag_id: Uuid,
    /// Tag name, unique within the game.
    pub name: String,
    /// The round the tag pins.
    pub round_id: Uuid,
    /// When the tag was created.
    pub created_at: DateTime<Utc>,
}

impl From<TagRecord> for TagView {
    fn from(tag: TagRecord) -> Self {
        Self {
            tag_id: tag.tag_id,
            name: tag.name,
            round_id: tag.round_id,
            created_at: tag.created_at,
        }
    }
}

/// GET /api/v1/games
#[instrument(skip(state))]
async fn list_games(
    State(state): State<AppState>,
) -> Result<Json<Vec<GameSummary>>, ApiError> {
    let games = state.store.list_games().await?;
    let summaries = games
        .into_iter()
        .map(|game| GameSummary {
            game_id: game.game_id,
            host_user_id: game.host_user_id,
            is_frozen: game.is_frozen,
            created_at: game.created_at,
        })
        .collect();
    Ok(Json(summaries))
}

/// GET /api/v1/games/{game_id}
#[instrument(skip(state))]
async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<GameDetail>, ApiError> {
    let game = state.store.game(game_id).await?;

    let mut head_branch = None;
    let mut tip_round_id = None;
    let mut depth = 0;
    if let Some(branch_id) = game.head_branch_id {
        let branch = state.store.branch(branch_id).await?;
        depth = state.store.ancestor_path(branch.tip_round_id).await?.len();
        tip_round_id = Some(branch.tip_round_id);
        head_branch = Some(branch.name);
    }

    Ok(Json(GameDetail {
        game_id: game.game_id,
        host_user_id: game.host_user_id,
        system_prompt: game.system_prompt,
        is_frozen: game.is_frozen,
        created_at: game.created_at,
        head_branch,
        tip_round_id,
        depth,
    }))
}

/// GET /api/v1/games/{game_id}/branches
#[instrument(skip(state))]
async fn list_branches(
    State(state): State<AppState>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<Vec<BranchView>>, ApiError> {
    // Surface a 404 for unknown games instead of an empty list.
    state.store.game(game_id).await?;
    let branches = state.store.list_branches(game_id).await?;
    Ok(Json(branches.into_iter().map(BranchView::from).collect()))
}

/// GET /api/v1/games/{game_id}/tags
#[instrument(skip(state))]
async fn list_tags(
    State(state): State<AppState>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<Vec<TagView>>, ApiError> {
    state.store.game(game_id).await?;
    let tags = state.store.list_tags(game_id).await?;
    Ok(Json(tags.into_iter().map(TagView::from).collect()))
}

/// Returns the router for game queries.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_games))
        .route("/{game_id}", get(get_game))
        .route("/{game_id}/branches", get(list_branches))
        .route("/{game_id}/tags", get(list_tags))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use taleweave_core::store::{GameRecord, RoundRecord};
    use taleweave_test_support::MemoryTreeStore;
    use tower::ServiceExt;

    async fn seeded() -> (Arc<MemoryTreeStore>, GameRecord, RoundRecord, BranchRecord) {
        let store = Arc::new(MemoryTreeStore::new());
        let mut game = GameRecord {
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
        game.head_branch_id = Some(main.branch_id);
        (store, game, root, main)
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
    async fn test_list_games_returns_the_seeded_game() {
        // Arrange
        let (store, game, _, _) = seeded().await;

        // Act
        let (status, json) = get_json(store, "/").await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let games = json.as_array().unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(
            games[0]["game_id"].as_str().unwrap(),
            game.game_id.to_string()
        );
        assert_eq!(games[0]["host_user_id"], "host");
        assert_eq!(games[0]["is_frozen"], false);
    }

    #[tokio::test]
    async fn test_get_game_reports_head_branch_and_depth() {
        // Arrange
        let (store, game, root, _) = seeded().await;

        // Act
        let (status, json) = get_json(store, &format!("/{}", game.game_id)).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["head_branch"], "main");
        assert_eq!(
            json["tip_round_id"].as_str().unwrap(),
            root.round_id.to_string()
        );
        assert_eq!(json["depth"], 1);
        assert_eq!(json["system_prompt"], "a drowned city");
    }

    #[tokio::test]
    async fn test_unknown_game_returns_404() {
        // Arrange
        let store = Arc::new(MemoryTreeStore::new());

        // Act
        let (status, json) = get_json(store, &format!("/{}", Uuid::new_v4())).await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "game_not_found");
    }

    #[tokio::test]
    async fn test_list_branches_returns_main() {
        // Arrange
        let (store, game, root, main) = seeded().await;

        // Act
        let (status, json) =
            get_json(store, &format!("/{}/branches", game.game_id)).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let branches = json.as_array().unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0]["name"], "main");
        assert_eq!(
            branches[0]["branch_id"].as_str().unwrap(),
            main.branch_id.to_string()
        );
        assert_eq!(
            branches[0]["tip_round_id"].as_str().unwrap(),
            root.round_id.to_string()
        );
    }

    #[tokio::test]
    async fn test_branches_of_an_unknown_game_returns_404() {
        // Arrange
        let (store, _, _, _) = seeded().await;

        // Act
        let (status, json) =
            get_json(store, &format!("/{}/branches", Uuid::new_v4())).await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "game_not_found");
    }

    #[tokio::test]
    async fn test_list_tags_returns_pinned_rounds() {
        // Arrange
        let (store, game, root, _) = seeded().await;
        store
            .create_tag(&TagRecord {
                tag_id: Uuid::new_v4(),
                game_id: game.game_id,
                name: "act-one".to_owned(),
                round_id: root.round_id,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        // Act
        let (status, json) = get_json(store, &format!("/{}/tags", game.game_id)).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let tags = json.as_array().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0]["name"], "act-one");
        assert_eq!(
            tags[0]["round_id"].as_str().unwrap(),
            root.round_id.to_string()
        );
    }
}
