//! `TreeStore` implementation backed by SQLite.
//!
//! Identifiers are stored as UUID text, timestamps as RFC 3339 text,
//! token usage as a JSON blob. Composite mutations run in a single
//! transaction; the round insert plus tip move inside `commit_round`
//! runs in a nested savepoint scope after the optimistic check passes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Acquire, Row, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

use taleweave_core::error::DomainError;
use taleweave_core::store::{BranchRecord, GameRecord, RoundRecord, TagRecord, TreeStore};

/// Name reserved for checkout shorthand; never a branch or tag name.
const RESERVED_NAME: &str = "head";

/// SQLite-backed tree store.
pub struct SqliteTreeStore {
    pool: SqlitePool,
}

impl SqliteTreeStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn infra(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

fn parse_uuid(value: &str) -> Result<Uuid, DomainError> {
    Uuid::parse_str(value)
        .map_err(|e| DomainError::Consistency(format!("malformed uuid '{value}': {e}")))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Consistency(format!("malformed timestamp '{value}': {e}")))
}

fn row_to_game(row: &SqliteRow) -> Result<GameRecord, DomainError> {
    Ok(GameRecord {
        game_id: parse_uuid(&row.try_get::<String, _>("game_id").map_err(infra)?)?,
        host_user_id: row.try_get("host_user_id").map_err(infra)?,
        system_prompt: row.try_get("system_prompt").map_err(infra)?,
        head_branch_id: row
            .try_get::<Option<String>, _>("head_branch_id")
            .map_err(infra)?
            .as_deref()
            .map(parse_uuid)
            .transpose()?,
        is_frozen: row.try_get::<i64, _>("is_frozen").map_err(infra)? != 0,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at").map_err(infra)?)?,
    })
}

fn row_to_round(row: &SqliteRow) -> Result<RoundRecord, DomainError> {
    let usage = row
        .try_get::<Option<String>, _>("usage")
        .map_err(infra)?
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| DomainError::Consistency(format!("malformed usage blob: {e}")))?;
    Ok(RoundRecord {
        round_id: parse_uuid(&row.try_get::<String, _>("round_id").map_err(infra)?)?,
        game_id: parse_uuid(&row.try_get::<String, _>("game_id").map_err(infra)?)?,
        parent_id: row
            .try_get::<Option<String>, _>("parent_id")
            .map_err(infra)?
            .as_deref()
            .map(parse_uuid)
            .transpose()?,
        player_input: row.try_get("player_input").map_err(infra)?,
        narrative: row.try_get("narrative").map_err(infra)?,
        usage,
        model_name: row.try_get("model_name").map_err(infra)?,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at").map_err(infra)?)?,
    })
}

fn row_to_branch(row: &SqliteRow) -> Result<BranchRecord, DomainError> {
    Ok(BranchRecord {
        branch_id: parse_uuid(&row.try_get::<String, _>("branch_id").map_err(infra)?)?,
        game_id: parse_uuid(&row.try_get::<String, _>("game_id").map_err(infra)?)?,
        name: row.try_get("name").map_err(infra)?,
        tip_round_id: parse_uuid(&row.try_get::<String, _>("tip_round_id").map_err(infra)?)?,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at").map_err(infra)?)?,
    })
}

fn row_to_tag(row: &SqliteRow) -> Result<TagRecord, DomainError> {
    Ok(TagRecord {
        tag_id: parse_uuid(&row.try_get::<String, _>("tag_id").map_err(infra)?)?,
        game_id: parse_uuid(&row.try_get::<String, _>("game_id").map_err(infra)?)?,
        name: row.try_get("name").map_err(infra)?,
        round_id: parse_uuid(&row.try_get::<String, _>("round_id").map_err(infra)?)?,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at").map_err(infra)?)?,
    })
}

fn map_name_collision(err: sqlx::Error, name: &str) -> DomainError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DomainError::NameTaken(name.to_owned())
        }
        _ => infra(err),
    }
}

fn reject_reserved(name: &str) -> Result<(), DomainError> {
    if name.eq_ignore_ascii_case(RESERVED_NAME) {
        return Err(DomainError::ReservedName(name.to_owned()));
    }
    Ok(())
}

async fn fetch_branch(
    conn: &mut SqliteConnection,
    branch_id: Uuid,
) -> Result<BranchRecord, DomainError> {
    let row = sqlx::query(
        "SELECT branch_id, game_id, name, tip_round_id, created_at \
         FROM branches WHERE branch_id = ?",
    )
    .bind(branch_id.to_string())
    .fetch_optional(conn)
    .await
    .map_err(infra)?
    .ok_or_else(|| DomainError::BranchNotFound(branch_id.to_string()))?;
    row_to_branch(&row)
}

async fn fetch_round(
    conn: &mut SqliteConnection,
    round_id: Uuid,
) -> Result<RoundRecord, DomainError> {
    let row = sqlx::query(
        "SELECT round_id, game_id, parent_id, player_input, narrative, usage, model_name, \
         created_at FROM rounds WHERE round_id = ?",
    )
    .bind(round_id.to_string())
    .fetch_optional(conn)
    .await
    .map_err(infra)?
    .ok_or(DomainError::RoundNotFound(round_id))?;
    row_to_round(&row)
}

async fn insert_round(conn: &mut SqliteConnection, round: &RoundRecord) -> Result<(), DomainError> {
    let usage = round
        .usage
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DomainError::Infrastructure(format!("usage serialization failed: {e}")))?;
    sqlx::query(
        "INSERT INTO rounds (round_id, game_id, parent_id, player_input, narrative, usage, \
         model_name, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(round.round_id.to_string())
    .bind(round.game_id.to_string())
    .bind(round.parent_id.map(|id| id.to_string()))
    .bind(&round.player_input)
    .bind(&round.narrative)
    .bind(usage)
    .bind(&round.model_name)
    .bind(round.created_at.to_rfc3339())
    .execute(conn)
    .await
    .map_err(infra)?;
    Ok(())
}

#[async_trait]
impl TreeStore for SqliteTreeStore {
    async fn create_game(&self, game: &GameRecord) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO games (game_id, host_user_id, system_prompt, head_branch_id, \
             is_frozen, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(game.game_id.to_string())
        .bind(&game.host_user_id)
        .bind(&game.system_prompt)
        .bind(game.head_branch_id.map(|id| id.to_string()))
        .bind(i64::from(game.is_frozen))
        .bind(game.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(infra)?;
        Ok(())
    }

    async fn game(&self, game_id: Uuid) -> Result<GameRecord, DomainError> {
        let row = sqlx::query(
            "SELECT game_id, host_user_id, system_prompt, head_branch_id, is_frozen, \
             created_at FROM games WHERE game_id = ?",
        )
        .bind(game_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(infra)?
        .ok_or(DomainError::GameNotFound(game_id))?;
        row_to_game(&row)
    }

    async fn list_games(&self) -> Result<Vec<GameRecord>, DomainError> {
        let rows = sqlx::query(
            "SELECT game_id, host_user_id, system_prompt, head_branch_id, is_frozen, \
             created_at FROM games ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;
        rows.iter().map(row_to_game).collect()
    }

    async fn delete_game(&self, game_id: Uuid) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infra)?;
        // The head pointer references a branch that is about to cascade away.
        sqlx::query("UPDATE games SET head_branch_id = NULL WHERE game_id = ?")
            .bind(game_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(infra)?;
        let result = sqlx::query("DELETE FROM games WHERE game_id = ?")
            .bind(game_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(infra)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::GameNotFound(game_id));
        }
        tx.commit().await.map_err(infra)?;
        info!(%game_id, "game deleted");
        Ok(())
    }

    async fn set_head_branch(&self, game_id: Uuid, branch_id: Uuid) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infra)?;
        let branch = fetch_branch(&mut tx, branch_id).await?;
        if branch.game_id != game_id {
            return Err(DomainError::Consistency(format!(
                "branch {branch_id} belongs to game {}, not {game_id}",
                branch.game_id
            )));
        }
        let result = sqlx::query("UPDATE games SET head_branch_id = ? WHERE game_id = ?")
            .bind(branch_id.to_string())
            .bind(game_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(infra)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::GameNotFound(game_id));
        }
        tx.commit().await.map_err(infra)?;
        Ok(())
    }

    async fn try_freeze(&self, game_id: Uuid) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE games SET is_frozen = 1 WHERE game_id = ? AND is_frozen = 0",
        )
        .bind(game_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(infra)?;
        if result.rows_affected() == 0 {
            // Either the game is missing or someone else holds the flag.
            self.game(game_id).await?;
            return Err(DomainError::GameFrozen(game_id));
        }
        Ok(())
    }

    async fn unfreeze(&self, game_id: Uuid) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE games SET is_frozen = 0 WHERE game_id = ?")
            .bind(game_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(infra)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::GameNotFound(game_id));
        }
        Ok(())
    }

    async fn insert_root_round(&self, round: &RoundRecord) -> Result<(), DomainError> {
        if round.parent_id.is_some() {
            return Err(DomainError::Consistency(
                "root round must not have a parent".to_owned(),
            ));
        }
        let mut tx = self.pool.begin().await.map_err(infra)?;
        let game_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM games WHERE game_id = ?")
            .bind(round.game_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(infra)?;
        if game_exists.is_none() {
            return Err(DomainError::GameNotFound(round.game_id));
        }
        let roots: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rounds WHERE game_id = ? AND parent_id IS NULL",
        )
        .bind(round.game_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(infra)?;
        if roots > 0 {
            return Err(DomainError::Consistency(format!(
                "game {} already has a root round",
                round.game_id
            )));
        }
        insert_round(&mut tx, round).await?;
        tx.commit().await.map_err(infra)?;
        Ok(())
    }

    async fn commit_round(
        &self,
        branch_id: Uuid,
        expected_tip: Uuid,
        round: &RoundRecord,
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infra)?;
        let branch = fetch_branch(&mut tx, branch_id).await?;
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

        // Append and repoint together, under a savepoint inside the
        // outer transaction.
        let mut sp = tx.begin().await.map_err(infra)?;
        insert_round(&mut sp, round).await?;
        sqlx::query("UPDATE branches SET tip_round_id = ? WHERE branch_id = ?")
            .bind(round.round_id.to_string())
            .bind(branch_id.to_string())
            .execute(&mut *sp)
            .await
            .map_err(infra)?;
        sp.commit().await.map_err(infra)?;

        tx.commit().await.map_err(infra)?;
        debug!(%branch_id, round_id = %round.round_id, "round committed");
        Ok(())
    }

    async fn move_tip(
        &self,
        branch_id: Uuid,
        expected_tip: Uuid,
        new_tip: Uuid,
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infra)?;
        let branch = fetch_branch(&mut tx, branch_id).await?;
        if branch.tip_round_id != expected_tip {
            return Err(DomainError::ConcurrentAdvancement {
                branch_id,
                expected: expected_tip,
                found: branch.tip_round_id,
            });
        }
        let target = fetch_round(&mut tx, new_tip).await?;
        if target.game_id != branch.game_id {
            return Err(DomainError::InvalidRoundReference {
                game_id: branch.game_id,
                round_id: new_tip,
            });
        }
        sqlx::query("UPDATE branches SET tip_round_id = ? WHERE branch_id = ?")
            .bind(new_tip.to_string())
            .bind(branch_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(infra)?;
        tx.commit().await.map_err(infra)?;
        debug!(%branch_id, %new_tip, "branch tip moved");
        Ok(())
    }

    async fn round(&self, round_id: Uuid) -> Result<RoundRecord, DomainError> {
        let mut conn = self.pool.acquire().await.map_err(infra)?;
        fetch_round(&mut conn, round_id).await
    }

    async fn ancestor_path(&self, round_id: Uuid) -> Result<Vec<RoundRecord>, DomainError> {
        let rows = sqlx::query(
            "WITH RECURSIVE lineage (round_id, game_id, parent_id, player_input, narrative, \
             usage, model_name, created_at, depth) AS ( \
                 SELECT round_id, game_id, parent_id, player_input, narrative, usage, \
                        model_name, created_at, 0 \
                 FROM rounds WHERE round_id = ? \
                 UNION ALL \
                 SELECT r.round_id, r.game_id, r.parent_id, r.player_input, r.narrative, \
                        r.usage, r.model_name, r.created_at, l.depth + 1 \
                 FROM rounds r JOIN lineage l ON r.round_id = l.parent_id \
             ) \
             SELECT round_id, game_id, parent_id, player_input, narrative, usage, model_name, \
                    created_at \
             FROM lineage ORDER BY depth DESC",
        )
        .bind(round_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;
        if rows.is_empty() {
            return Err(DomainError::RoundNotFound(round_id));
        }
        rows.iter().map(row_to_round).collect()
    }

    async fn create_branch(&self, branch: &BranchRecord) -> Result<(), DomainError> {
        reject_reserved(&branch.name)?;
        let mut tx = self.pool.begin().await.map_err(infra)?;
        let tip = fetch_round(&mut tx, branch.tip_round_id).await?;
        if tip.game_id != branch.game_id {
            return Err(DomainError::InvalidRoundReference {
                game_id: branch.game_id,
                round_id: branch.tip_round_id,
            });
        }
        sqlx::query(
            "INSERT INTO branches (branch_id, game_id, name, tip_round_id, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(branch.branch_id.to_string())
        .bind(branch.game_id.to_string())
        .bind(&branch.name)
        .bind(branch.tip_round_id.to_string())
        .bind(branch.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_name_collision(e, &branch.name))?;
        tx.commit().await.map_err(infra)?;
        Ok(())
    }

    async fn branch(&self, branch_id: Uuid) -> Result<BranchRecord, DomainError> {
        let mut conn = self.pool.acquire().await.map_err(infra)?;
        fetch_branch(&mut conn, branch_id).await
    }

    async fn branch_by_name(&self, game_id: Uuid, name: &str) -> Result<BranchRecord, DomainError> {
        let row = sqlx::query(
            "SELECT branch_id, game_id, name, tip_round_id, created_at \
             FROM branches WHERE game_id = ? AND name = ?",
        )
        .bind(game_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(infra)?
        .ok_or_else(|| DomainError::BranchNotFound(name.to_owned()))?;
        row_to_branch(&row)
    }

    async fn list_branches(&self, game_id: Uuid) -> Result<Vec<BranchRecord>, DomainError> {
        let rows = sqlx::query(
            "SELECT branch_id, game_id, name, tip_round_id, created_at \
             FROM branches WHERE game_id = ? ORDER BY created_at ASC, name ASC",
        )
        .bind(game_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;
        rows.iter().map(row_to_branch).collect()
    }

    async fn rename_branch(&self, branch_id: Uuid, new_name: &str) -> Result<(), DomainError> {
        reject_reserved(new_name)?;
        let result = sqlx::query("UPDATE branches SET name = ? WHERE branch_id = ?")
            .bind(new_name)
            .bind(branch_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| map_name_collision(e, new_name))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::BranchNotFound(branch_id.to_string()));
        }
        Ok(())
    }

    async fn delete_branch(&self, branch_id: Uuid) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(infra)?;
        let branch = fetch_branch(&mut tx, branch_id).await?;
        let head: Option<String> = sqlx::query_scalar(
            "SELECT head_branch_id FROM games WHERE game_id = ?",
        )
        .bind(branch.game_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(infra)?
        .flatten();
        if head.as_deref() == Some(branch_id.to_string().as_str()) {
            return Err(DomainError::BranchInUse(branch.name));
        }
        sqlx::query("DELETE FROM branches WHERE branch_id = ?")
            .bind(branch_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(infra)?;
        tx.commit().await.map_err(infra)?;
        Ok(())
    }

    async fn create_tag(&self, tag: &TagRecord) -> Result<(), DomainError> {
        reject_reserved(&tag.name)?;
        let mut tx = self.pool.begin().await.map_err(infra)?;
        let target = fetch_round(&mut tx, tag.round_id).await?;
        if target.game_id != tag.game_id {
            return Err(DomainError::InvalidRoundReference {
                game_id: tag.game_id,
                round_id: tag.round_id,
            });
        }
        sqlx::query(
            "INSERT INTO tags (tag_id, game_id, name, round_id, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(tag.tag_id.to_string())
        .bind(tag.game_id.to_string())
        .bind(&tag.name)
        .bind(tag.round_id.to_string())
        .bind(tag.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_name_collision(e, &tag.name))?;
        tx.commit().await.map_err(infra)?;
        Ok(())
    }

    async fn tag_by_name(&self, game_id: Uuid, name: &str) -> Result<TagRecord, DomainError> {
        let row = sqlx::query(
            "SELECT tag_id, game_id, name, round_id, created_at \
             FROM tags WHERE game_id = ? AND name = ?",
        )
        .bind(game_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(infra)?
        .ok_or_else(|| DomainError::TagNotFound(name.to_owned()))?;
        row_to_tag(&row)
    }

    async fn list_tags(&self, game_id: Uuid) -> Result<Vec<TagRecord>, DomainError> {
        let rows = sqlx::query(
            "SELECT tag_id, game_id, name, round_id, created_at \
             FROM tags WHERE game_id = ? ORDER BY created_at ASC, name ASC",
        )
        .bind(game_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;
        rows.iter().map(row_to_tag).collect()
    }

    async fn delete_tag(&self, tag_id: Uuid) -> Result<(), DomainError> {
        let result = sqlx::query("DELETE FROM tags WHERE tag_id = ?")
            .bind(tag_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(infra)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::TagNotFound(tag_id.to_string()));
        }
        Ok(())
    }
}
