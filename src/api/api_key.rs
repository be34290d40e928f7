use super::package::to_utc;
use crate::models;
use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    /// Only present in the response to the request that created the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl From<models::ApiKey> for ApiKey {
    fn from(api_key: models::ApiKey) -> Self {
        ApiKey {
            revoked: api_key.is_revoked(),
            id: api_key.id,
            label: api_key.label,
            created_at: to_utc(api_key.created_at),
            last_used_at: api_key.last_used_at.map(to_utc),
            // We never return the hash, and the secret isn't stored.
            secret: None,
        }
    }
}

/// The CreateApiKey request.
#[derive(Deserialize, Debug)]
pub struct CreateApiKeyRequest {
    pub label: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeysResponse {
    pub api_keys: Vec<ApiKey>,
}
