use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::envelope::ApiResponse;
use crate::error::StoreError;
use crate::models::InvalidId;
use crate::security::TokenError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} is required")]
    MissingParameter(&'static str),

    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    /// The detail is logged, never returned to the client.
    #[error("Internal server error")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParameter(_)
            | ApiError::InvalidId(_)
            | ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        error!(%detail, "request failed");
        ApiError::Internal(detail)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { collection, .. } => {
                ApiError::Conflict(format!("{collection} entry already exists"))
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding => ApiError::internal(err.to_string()),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiResponse::new(self.status(), Value::Null, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_consistent() {
        assert_eq!(ApiError::MissingParameter("title").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(InvalidId("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(TokenError::Expired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden("not yours").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("video").status(), StatusCode::NOT_FOUND);
        let conflict = ApiError::from(StoreError::Conflict {
            collection: "likes",
            key: "k".into(),
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::from(StoreError::Io(std::io::Error::other("disk on fire")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal server error");

        let err = ApiError::from(TokenError::Encoding);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
