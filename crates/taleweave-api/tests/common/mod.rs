//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tower::ServiceExt;
use uuid::Uuid;

use taleweave_api::routes;
use taleweave_api::state::AppState;
use taleweave_core::store::{BranchRecord, GameRecord, RoundRecord, TreeStore};
use taleweave_tree_store::SqliteTreeStore;

/// Build the full app router over a real SQLite store. Uses the same
/// route structure as `main.rs`.
pub fn build_test_app(pool: SqlitePool) -> Router {
    let store = Arc::new(SqliteTreeStore::new(pool));
    routes::app(AppState::new(store))
}

/// A seeded game together with its round chain, root first.
pub struct SeededGame {
    pub game: GameRecord,
    pub main: BranchRecord,
    pub rounds: Vec<RoundRecord>,
}

/// Creates a game with a root round, a checked-out `main` branch, and
/// `extra` committed rounds past the root.
pub async fn seed_game(pool: &SqlitePool, extra: usize) -> SeededGame {
    let store = SqliteTreeStore::new(pool.clone());
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

    let mut rounds = vec![root];
    for i in 0..extra {
        let tip = rounds[rounds.len() - 1].round_id;
        let next = RoundRecord {
            round_id: Uuid::new_v4(),
            game_id: game.game_id,
            parent_id: Some(tip),
            player_input: format!("turn {i}"),
            narrative: format!("narrative {i}"),
            usage: None,
            model_name: None,
            created_at: Utc::now(),
        };
        store.commit_round(main.branch_id, tip, &next).await.unwrap();
        rounds.push(next);
    }

    let game = store.game(game.game_id).await.unwrap();
    let main = store.branch(main.branch_id).await.unwrap();
    SeededGame { game, main, rounds }
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
