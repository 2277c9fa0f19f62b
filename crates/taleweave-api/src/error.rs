//! Taleweave — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use taleweave_core::error::DomainError;

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            DomainError::GameNotFound(_) => (StatusCode::NOT_FOUND, "game_not_found"),
            DomainError::BranchNotFound(_) => (StatusCode::NOT_FOUND, "branch_not_found"),
            DomainError::RoundNotFound(_) => (StatusCode::NOT_FOUND, "round_not_found"),
            DomainError::TagNotFound(_) => (StatusCode::NOT_FOUND, "tag_not_found"),
            DomainError::ProposalNotFound(_) => (StatusCode::NOT_FOUND, "proposal_not_found"),
            DomainError::NoOpenDecision(_) => (StatusCode::NOT_FOUND, "no_open_decision"),
            DomainError::GameFrozen(_) => (StatusCode::CONFLICT, "game_frozen"),
            DomainError::ConcurrentAdvancement { .. } => {
                (StatusCode::CONFLICT, "concurrent_advancement")
            }
            DomainError::NameTaken(_) => (StatusCode::CONFLICT, "name_taken"),
            DomainError::BranchInUse(_) => (StatusCode::CONFLICT, "branch_in_use"),
            DomainError::ReservedName(_) => (StatusCode::BAD_REQUEST, "reserved_name"),
            DomainError::InvalidRoundReference { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_round_reference")
            }
            DomainError::AtRoot => (StatusCode::BAD_REQUEST, "at_root"),
            DomainError::NotAnAncestor(_) => (StatusCode::BAD_REQUEST, "not_an_ancestor"),
            DomainError::NoVotes => (StatusCode::UNPROCESSABLE_ENTITY, "no_votes"),
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            DomainError::Generation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "generation_error"),
            DomainError::Consistency(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "consistency_error")
            }
            DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn status_of(err: DomainError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_not_found_family_maps_to_404() {
        assert_eq!(
            status_of(DomainError::GameNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::BranchNotFound("side".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::RoundNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::TagNotFound("act-one".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_frozen_game_maps_to_409() {
        assert_eq!(
            status_of(DomainError::GameFrozen(Uuid::new_v4())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_concurrent_advancement_maps_to_409() {
        assert_eq!(
            status_of(DomainError::ConcurrentAdvancement {
                branch_id: Uuid::new_v4(),
                expected: Uuid::new_v4(),
                found: Uuid::new_v4(),
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_name_collisions_map_to_409() {
        assert_eq!(
            status_of(DomainError::NameTaken("main".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::BranchInUse("main".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_caller_mistakes_map_to_400() {
        assert_eq!(
            status_of(DomainError::ReservedName("head".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(DomainError::AtRoot), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(DomainError::NotAnAncestor(Uuid::new_v4())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::Validation("bad input".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_empty_tally_maps_to_422() {
        assert_eq!(
            status_of(DomainError::NoVotes),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_infrastructure_maps_to_500() {
        assert_eq!(
            status_of(DomainError::Infrastructure("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(DomainError::Consistency("cycle detected".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
