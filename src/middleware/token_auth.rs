use crate::config::Config;
use crate::db::Store;
use crate::models;
use rocket::http::hyper::header;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::Request;
use std::sync::Arc;
use tracing::error;

/// A request authenticated with an API key. The key id is the identity that
/// owns the packages it publishes.
pub struct TokenAuth {
    pub api_key: models::ApiKey,
}

impl TokenAuth {
    pub fn owner_id(&self) -> &str {
        &self.api_key.id
    }
}

#[derive(Debug)]
pub enum TokenAuthError {
    Missing,
    Invalid,
    DatabaseConnection,
}

fn bearer_token<'r>(request: &'r Request<'_>) -> Option<&'r str> {
    request
        .headers()
        .get_one(header::AUTHORIZATION.as_str())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for TokenAuth {
    type Error = TokenAuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let store = match request.rocket().state::<Arc<dyn Store>>() {
            Some(store) => store,
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    TokenAuthError::DatabaseConnection,
                ))
            }
        };

        let Some(secret) = bearer_token(request) else {
            return Outcome::Error((Status::Unauthorized, TokenAuthError::Missing));
        };
        match store.validate_api_key(secret) {
            Ok(api_key) => Outcome::Success(TokenAuth { api_key }),
            Err(err) if err.is_not_found() => {
                Outcome::Error((Status::Unauthorized, TokenAuthError::Invalid))
            }
            Err(err) => {
                error!("Failed to validate API key: {}", err);
                Outcome::Error((
                    Status::InternalServerError,
                    TokenAuthError::DatabaseConnection,
                ))
            }
        }
    }
}

/// A request carrying the configured admin token. Admin routes are disabled
/// when no token is configured.
pub struct AdminAuth;

#[derive(Debug)]
pub enum AdminAuthError {
    Disabled,
    Invalid,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminAuth {
    type Error = AdminAuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(admin_token) = request
            .rocket()
            .state::<Config>()
            .and_then(|config| config.admin_token.as_deref())
        else {
            return Outcome::Error((Status::Forbidden, AdminAuthError::Disabled));
        };

        match bearer_token(request) {
            Some(token) if token == admin_token => Outcome::Success(AdminAuth),
            _ => Outcome::Error((Status::Unauthorized, AdminAuthError::Invalid)),
        }
    }
}
