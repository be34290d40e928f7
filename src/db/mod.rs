pub mod api_key;
pub mod error;
pub mod postgres;
mod queries;
pub mod sqlite;

use self::error::DatabaseError;
use crate::api::pagination::{PaginatedResponse, Pagination};
use crate::config::DatabaseConfig;
use crate::models::{
    ApiKey, Artifact, ArtifactType, Contract, Deployment, Package, PackageSummary,
};
use chrono::{DateTime, NaiveDateTime};
use std::sync::Arc;

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

/// Filters for [Store::list_packages]. Every field is optional and they combine
/// with AND.
#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    /// Substring of the package name.
    pub search: Option<String>,
    pub chain: Option<String>,
    /// Exact builder tag, e.g. `foundry` or `hardhat`.
    pub project: Option<String>,
    pub version: Option<String>,
    /// Only packages containing a contract with this name (case-insensitive).
    pub contract: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub chain: Option<String>,
    pub chain_id: Option<i64>,
    pub package_id: Option<String>,
    pub package_name: Option<String>,
    pub verified: Option<bool>,
}

/// Everything written by a single publish.
#[derive(Debug, Clone)]
pub struct PublishBundle {
    pub package: Package,
    pub contracts: Vec<ContractBundle>,
}

#[derive(Debug, Clone)]
pub struct ContractBundle {
    pub contract: Contract,
    pub artifacts: Vec<Artifact>,
}

/// The persistence contract of the registry. The SQLite and Postgres adapters
/// return identical results for identical call sequences.
///
/// Missing rows are reported as [DatabaseError::NotFound] and unique constraint
/// violations as [DatabaseError::AlreadyExists]; anything else is passed through
/// with the failing operation attached.
pub trait Store: Send + Sync {
    /// Creates or upgrades the schema. Safe to call repeatedly.
    fn migrate(&self) -> Result<(), DatabaseError>;

    fn create_package(&self, package: &Package) -> Result<Package, DatabaseError>;

    /// Fetch a package by name and exact version.
    fn get_package(&self, name: &str, version: &str) -> Result<Package, DatabaseError>;

    fn get_package_by_id(&self, id: &str) -> Result<Package, DatabaseError>;

    /// All versions of a package, highest first.
    fn get_package_versions(
        &self,
        name: &str,
        include_prerelease: bool,
    ) -> Result<Vec<String>, DatabaseError>;

    /// One entry per package name, ordered by name. The cursor is the last name
    /// of the previous page.
    fn list_packages(
        &self,
        filter: &PackageFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResponse<PackageSummary>, DatabaseError>;

    /// Deletes a package version together with its contracts, artifacts and
    /// deployment records.
    fn delete_package(&self, id: &str) -> Result<(), DatabaseError>;

    fn package_exists(&self, name: &str, version: &str) -> Result<bool, DatabaseError>;

    fn get_package_owner(&self, name: &str) -> Result<Option<String>, DatabaseError>;

    /// Records the owner of a package name unless one is already set. Returns
    /// whether this call claimed it.
    fn set_package_owner(&self, name: &str, owner_id: &str) -> Result<bool, DatabaseError>;

    /// Writes the package, its contracts and their artifacts in one transaction.
    fn publish(&self, bundle: &PublishBundle) -> Result<Package, DatabaseError>;

    fn create_contract(&self, contract: &Contract) -> Result<Contract, DatabaseError>;

    fn get_contract(&self, package_id: &str, name: &str) -> Result<Contract, DatabaseError>;

    fn list_contracts(&self, package_id: &str) -> Result<Vec<Contract>, DatabaseError>;

    /// Inserts the artifact or overwrites the content of the existing
    /// `(contract_id, artifact_type)` entry.
    fn store_artifact(&self, artifact: &Artifact) -> Result<Artifact, DatabaseError>;

    fn get_artifact(
        &self,
        contract_id: &str,
        kind: ArtifactType,
    ) -> Result<Artifact, DatabaseError>;

    fn get_artifact_by_hash(&self, content_hash: &str) -> Result<Artifact, DatabaseError>;

    fn list_artifacts(&self, contract_id: &str) -> Result<Vec<Artifact>, DatabaseError>;

    fn record_deployment(&self, deployment: &Deployment) -> Result<Deployment, DatabaseError>;

    fn get_deployment(
        &self,
        chain: &str,
        chain_id: i64,
        address: &str,
    ) -> Result<Deployment, DatabaseError>;

    /// Deployments in insertion order. The cursor carries the position of the
    /// last deployment of the previous page, see [deployment_cursor].
    fn list_deployments(
        &self,
        filter: &DeploymentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResponse<Deployment>, DatabaseError>;

    fn update_verification_status(
        &self,
        deployment_id: &str,
        verified: bool,
        verified_on: Option<String>,
    ) -> Result<Deployment, DatabaseError>;

    /// Creates a key and returns it along with the plaintext secret. The secret
    /// cannot be recovered afterwards.
    fn create_api_key(&self, label: &str) -> Result<(ApiKey, String), DatabaseError>;

    /// Looks up a key by its secret and marks it used. Revoked keys are
    /// reported as not found.
    fn validate_api_key(&self, secret: &str) -> Result<ApiKey, DatabaseError>;

    fn list_api_keys(&self) -> Result<Vec<ApiKey>, DatabaseError>;

    fn revoke_api_key(&self, id: &str) -> Result<(), DatabaseError>;
}

/// Position of a deployment in the `(created_at, id)` listing order, encoded as
/// `<created_at micros>_<id>`. It stays valid after the deployment is deleted.
pub fn deployment_cursor(deployment: &Deployment) -> String {
    format!(
        "{}_{}",
        deployment.created_at.and_utc().timestamp_micros(),
        deployment.id
    )
}

pub(crate) fn parse_deployment_cursor(cursor: &str) -> Result<(NaiveDateTime, String), DatabaseError> {
    let invalid = || DatabaseError::InvalidCursor(cursor.to_string());
    let (micros, id) = cursor.split_once('_').ok_or_else(invalid)?;
    if id.is_empty() {
        return Err(invalid());
    }
    let micros: i64 = micros.parse().map_err(|_| invalid())?;
    let created_at = DateTime::from_timestamp(
        micros.div_euclid(1_000_000),
        (micros.rem_euclid(1_000_000) * 1_000) as u32,
    )
    .ok_or_else(invalid)?;
    Ok((created_at.naive_utc(), id.to_string()))
}

/// Open the configured backend and bring its schema up to date.
pub fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Store>, DatabaseError> {
    match config {
        DatabaseConfig::Sqlite {
            path,
            busy_timeout_ms,
            max_connections,
        } => {
            tracing::info!("Opening SQLite database at {}", path.display());
            let store = SqliteStore::open(path, *busy_timeout_ms, *max_connections)?;
            Ok(Arc::new(store))
        }
        DatabaseConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
        } => {
            tracing::info!("Connecting to PostgreSQL");
            let store = PgStore::connect(url, *max_connections, *statement_timeout_ms)?;
            Ok(Arc::new(store))
        }
    }
}
