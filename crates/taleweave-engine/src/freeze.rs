//! Scoped freeze guard around turn-mutating operations.

use std::future::Future;

use tracing::error;
use uuid::Uuid;

use taleweave_core::error::DomainError;
use taleweave_core::store::TreeStore;

/// Acquires the per-game freeze flag for the duration of one operation.
///
/// The flag is released on every exit path, success or failure. Only a
/// process crash mid-operation can leave it set; recovery from that is
/// the administrative force-unfreeze.
pub struct FreezeGuard;

impl FreezeGuard {
    /// Runs `body` with the game's freeze flag held.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::GameFrozen`] if the flag is already set,
    /// the body's error if it fails, or the release error if the body
    /// succeeded but the flag could not be cleared.
    pub async fn run<T, F>(
        store: &dyn TreeStore,
        game_id: Uuid,
        body: F,
    ) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        store.try_freeze(game_id).await?;
        let result = body.await;
        if let Err(release_err) = store.unfreeze(game_id).await {
            error!(%game_id, error = %release_err, "failed to release freeze flag");
            if result.is_ok() {
                return Err(release_err);
            }
        }
        result
    }
}
