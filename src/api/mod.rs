pub mod api_key;
pub mod deployment;
pub mod package;
pub mod pagination;
pub mod verify;

use crate::db::error::DatabaseError;
use crate::handlers::RegistryError;
use rocket::{
    http::Status,
    response::Responder,
    serde::{json::Json, Serialize},
    Request,
};
use thiserror::Error;
use tracing::error;

/// A wrapper for API responses that can return errors.
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// An empty response.
#[derive(Serialize)]
pub struct EmptyResponse;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::Registry(err) => match err {
                RegistryError::NotFound(_) => Status::NotFound,
                RegistryError::InvalidName(_)
                | RegistryError::InvalidVersion(_)
                | RegistryError::InvalidAddress(_)
                | RegistryError::InvalidChainId(_)
                | RegistryError::InvalidRequest(_)
                | RegistryError::ChainNotFound(_) => Status::BadRequest,
                RegistryError::VersionExists { .. } | RegistryError::AlreadyExists(_) => {
                    Status::Conflict
                }
                RegistryError::Forbidden(_) => Status::Forbidden,
                RegistryError::Archive(_) | RegistryError::Database(_) => {
                    Status::InternalServerError
                }
            },
            ApiError::Database(err) if err.is_not_found() => Status::NotFound,
            ApiError::Database(DatabaseError::InvalidCursor(_)) => Status::BadRequest,
            ApiError::Database(_) => Status::InternalServerError,
            ApiError::BadRequest(_) => Status::BadRequest,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        let message = if status == Status::InternalServerError {
            error!("{} {} failed: {}", request.method(), request.uri(), self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { error: message })).respond_to(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        let cases = [
            (RegistryError::NotFound("package".into()), Status::NotFound),
            (RegistryError::InvalidName("X".into()), Status::BadRequest),
            (RegistryError::InvalidChainId(0), Status::BadRequest),
            (RegistryError::ChainNotFound("fuel".into()), Status::BadRequest),
            (
                RegistryError::VersionExists {
                    name: "a".into(),
                    version: "1.0.0".into(),
                },
                Status::Conflict,
            ),
            (RegistryError::AlreadyExists("deployment".into()), Status::Conflict),
            (RegistryError::Forbidden("a".into()), Status::Forbidden),
            (
                RegistryError::from(DatabaseError::InvalidCursor("bogus".into())),
                Status::BadRequest,
            ),
            (
                RegistryError::Database(DatabaseError::Migration("boom".into())),
                Status::InternalServerError,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }

        assert_eq!(
            ApiError::from(DatabaseError::NotFound("api key".into())).status(),
            Status::NotFound
        );
        assert_eq!(
            ApiError::from(DatabaseError::InvalidCursor("bogus".into())).status(),
            Status::BadRequest
        );
    }
}
