use super::package::to_utc;
use super::pagination::Pagination;
use crate::models::Deployment;
use chrono::{DateTime, Utc};
use rocket::FromForm;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The request body to record where a contract of a package was deployed.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordDeploymentRequest {
    pub package_name: String,
    pub version: String,
    pub contract_name: String,
    pub chain_id: i64,
    pub address: String,
    pub deployer: Option<String>,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub constructor_args: Option<Value>,
    pub libraries: Option<BTreeMap<String, String>>,
}

/// Query parameters of the deployment listing.
#[derive(FromForm, Debug, Clone, Default)]
pub struct DeploymentQuery {
    pub chain: Option<String>,
    pub chain_id: Option<i64>,
    pub package: Option<String>,
    pub version: Option<String>,
    pub verified: Option<bool>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

impl DeploymentQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            cursor: self.cursor.clone(),
            limit: self.limit,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatusRequest {
    pub verified: bool,
    pub verified_on: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResponse {
    pub id: String,
    pub package_id: String,
    pub contract_name: String,
    pub chain: String,
    pub chain_id: i64,
    pub address: String,
    pub deployer: Option<String>,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub deployment_data: Option<Value>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_on: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Deployment> for DeploymentResponse {
    fn from(deployment: Deployment) -> Self {
        DeploymentResponse {
            deployment_data: deployment
                .deployment_data
                .as_deref()
                .and_then(|data| serde_json::from_str(data).ok()),
            verified_at: deployment.verified_at.map(to_utc),
            created_at: to_utc(deployment.created_at),
            id: deployment.id,
            package_id: deployment.package_id,
            contract_name: deployment.contract_name,
            chain: deployment.chain,
            chain_id: deployment.chain_id,
            address: deployment.address,
            deployer: deployment.deployer,
            tx_hash: deployment.tx_hash,
            block_number: deployment.block_number,
            verified: deployment.verified,
            verified_on: deployment.verified_on,
        }
    }
}
