use super::error::{not_found, RegistryError};
use crate::api::deployment::{DeploymentQuery, RecordDeploymentRequest};
use crate::api::pagination::{PaginatedResponse, Pagination};
use crate::db::{DeploymentFilter, Store};
use crate::models::{Deployment, Package};
use crate::util::now;
use crate::validation;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct DeploymentService {
    store: Arc<dyn Store>,
}

impl DeploymentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        DeploymentService { store }
    }

    /// Records a deployment of a published package. The deployment inherits the
    /// package's chain family and its address is stored lower-cased.
    pub fn record(&self, request: &RecordDeploymentRequest) -> Result<Deployment, RegistryError> {
        check_target(request.chain_id, &request.address)?;
        let package = self.find_package(&request.package_name, &request.version)?;

        let deployment = Deployment {
            id: Uuid::new_v4().to_string(),
            package_id: package.id.clone(),
            contract_name: request.contract_name.clone(),
            chain: package.chain.clone(),
            chain_id: request.chain_id,
            address: request.address.to_lowercase(),
            deployer: request.deployer.clone(),
            tx_hash: request.tx_hash.clone(),
            block_number: request.block_number,
            deployment_data: deployment_data(request),
            verified: false,
            verified_at: None,
            verified_on: None,
            created_at: now(),
        };
        let deployment = self.store.record_deployment(&deployment)?;

        info!(
            "Recorded deployment of {}@{} on {}:{} at {}",
            package.name, package.version, deployment.chain, deployment.chain_id, deployment.address
        );
        Ok(deployment)
    }

    pub fn get(&self, chain: &str, chain_id: i64, address: &str) -> Result<Deployment, RegistryError> {
        check_target(chain_id, address)?;
        let address = address.to_lowercase();
        self.store
            .get_deployment(chain, chain_id, &address)
            .map_err(not_found(format!("deployment {chain}:{chain_id}:{address}")))
    }

    pub fn list(
        &self,
        query: &DeploymentQuery,
        pagination: &Pagination,
    ) -> Result<PaginatedResponse<Deployment>, RegistryError> {
        let mut filter = DeploymentFilter {
            chain: query.chain.clone(),
            chain_id: query.chain_id,
            verified: query.verified,
            ..Default::default()
        };
        match (&query.package, &query.version) {
            (Some(name), Some(version)) => {
                filter.package_id = Some(self.find_package(name, version)?.id);
            }
            (Some(name), None) => filter.package_name = Some(name.clone()),
            (None, Some(_)) => {
                return Err(RegistryError::InvalidRequest(
                    "version filter requires a package".to_string(),
                ))
            }
            (None, None) => {}
        }

        Ok(self.store.list_deployments(&filter, pagination)?)
    }

    /// Deployments of one package version.
    pub fn list_by_package(
        &self,
        name: &str,
        version: &str,
        pagination: &Pagination,
    ) -> Result<PaginatedResponse<Deployment>, RegistryError> {
        let package = self.find_package(name, version)?;
        let filter = DeploymentFilter {
            package_id: Some(package.id),
            ..Default::default()
        };
        Ok(self.store.list_deployments(&filter, pagination)?)
    }

    pub fn update_verification_status(
        &self,
        chain: &str,
        chain_id: i64,
        address: &str,
        verified: bool,
        verified_on: Option<String>,
    ) -> Result<Deployment, RegistryError> {
        let deployment = self.get(chain, chain_id, address)?;
        let deployment = self
            .store
            .update_verification_status(&deployment.id, verified, verified_on)
            .map_err(not_found(format!("deployment {}", deployment.id)))?;

        info!(
            "Marked deployment {}:{}:{} as {}",
            deployment.chain,
            deployment.chain_id,
            deployment.address,
            if verified { "verified" } else { "unverified" }
        );
        Ok(deployment)
    }

    fn find_package(&self, name: &str, version: &str) -> Result<Package, RegistryError> {
        let version = validation::validate_or_format_semver(version).unwrap_or_else(|| version.to_string());
        self.store
            .get_package(name, &version)
            .map_err(not_found(format!("package {name}@{version}")))
    }
}

pub(crate) fn check_target(chain_id: i64, address: &str) -> Result<(), RegistryError> {
    if !validation::is_valid_address(address) {
        return Err(RegistryError::InvalidAddress(address.to_string()));
    }
    if !validation::is_valid_chain_id(chain_id) {
        return Err(RegistryError::InvalidChainId(chain_id));
    }
    Ok(())
}

/// Constructor arguments and linked libraries, stored as one JSON object.
fn deployment_data(request: &RecordDeploymentRequest) -> Option<String> {
    let mut data = Map::new();
    if let Some(args) = &request.constructor_args {
        data.insert("constructorArgs".to_string(), args.clone());
    }
    if let Some(libraries) = &request.libraries {
        let libraries = libraries
            .iter()
            .map(|(name, address)| (name.clone(), Value::from(address.as_str())))
            .collect();
        data.insert("libraries".to_string(), Value::Object(libraries));
    }
    (!data.is_empty()).then(|| Value::Object(data).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::package::PublishRequest;
    use crate::db::SqliteStore;
    use crate::handlers::PackageService;
    use serde_json::json;
    use tempfile::TempDir;

    const ADDRESS: &str = "0x1111111111111111111111111111111111111111";

    fn services() -> (TempDir, PackageService, DeploymentService) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store: Arc<dyn Store> =
            Arc::new(SqliteStore::open(dir.path().join("registry.db"), 5000, 2).expect("store"));

        let packages = PackageService::new(store.clone());
        let request: PublishRequest = serde_json::from_value(json!({
            "builder": "hardhat",
            "contracts": [{ "name": "Token", "deployedBytecode": "0xabc" }]
        }))
        .expect("valid request");
        packages.publish("my-pkg", "1.0.0", "k1", &request).expect("publish");
        packages.publish("my-pkg", "1.1.0", "k1", &request).expect("publish");

        (dir, packages, DeploymentService::new(store))
    }

    fn record_request(chain_id: i64, address: &str) -> RecordDeploymentRequest {
        RecordDeploymentRequest {
            package_name: "my-pkg".to_string(),
            version: "1.0.0".to_string(),
            contract_name: "Token".to_string(),
            chain_id,
            address: address.to_string(),
            constructor_args: Some(json!(["0x01", 5])),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_and_get() {
        let (_dir, _packages, service) = services();

        let upper = format!("0x{}", "AB".repeat(20));
        let deployment = service.record(&record_request(1, &upper)).expect("record");
        assert_eq!(deployment.address, upper.to_lowercase());
        assert_eq!(deployment.chain, "evm");
        assert!(!deployment.verified);
        assert_eq!(
            deployment.deployment_data.as_deref(),
            Some(r#"{"constructorArgs":["0x01",5]}"#)
        );

        let fetched = service.get("evm", 1, &upper).expect("get");
        assert_eq!(fetched, deployment);
        assert!(matches!(service.get("evm", 2, &upper), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_record_validation() {
        let (_dir, _packages, service) = services();

        assert!(matches!(
            service.record(&record_request(1, "0x1234")),
            Err(RegistryError::InvalidAddress(_))
        ));
        assert!(matches!(
            service.record(&record_request(0, ADDRESS)),
            Err(RegistryError::InvalidChainId(0))
        ));

        let mut missing = record_request(1, ADDRESS);
        missing.version = "9.9.9".to_string();
        assert!(matches!(service.record(&missing), Err(RegistryError::NotFound(_))));

        service.record(&record_request(1, ADDRESS)).expect("record");
        assert!(matches!(
            service.record(&record_request(1, ADDRESS)),
            Err(RegistryError::AlreadyExists(_))
        ));
        // Same address on another chain id is a separate deployment.
        service.record(&record_request(10, ADDRESS)).expect("record");
    }

    #[test]
    fn test_list_and_verification_status() {
        let (_dir, _packages, service) = services();
        service.record(&record_request(1, ADDRESS)).expect("record");
        service.record(&record_request(10, ADDRESS)).expect("record");
        let mut newer = record_request(1, &format!("0x{}", "22".repeat(20)));
        newer.version = "1.1.0".to_string();
        service.record(&newer).expect("record");

        let all = service
            .list(&DeploymentQuery::default(), &Pagination::default())
            .expect("list");
        assert_eq!(all.data.len(), 3);

        let by_version = service
            .list_by_package("my-pkg", "1.0.0", &Pagination::default())
            .expect("list");
        assert_eq!(by_version.data.len(), 2);

        let query = DeploymentQuery {
            package: Some("my-pkg".to_string()),
            chain_id: Some(1),
            ..Default::default()
        };
        assert_eq!(service.list(&query, &Pagination::default()).expect("list").data.len(), 2);

        let page = service
            .list(&DeploymentQuery::default(), &Pagination::new(None, 2))
            .expect("list");
        assert!(page.has_more);
        let rest = service
            .list(&DeploymentQuery::default(), &Pagination::new(page.next_cursor, 2))
            .expect("list");
        assert_eq!(rest.data.len(), 1);
        assert!(!rest.has_more);

        let updated = service
            .update_verification_status("evm", 1, ADDRESS, true, Some("rpc.example.com".to_string()))
            .expect("update");
        assert!(updated.verified);
        assert!(updated.verified_at.is_some());

        let verified = DeploymentQuery {
            verified: Some(true),
            ..Default::default()
        };
        let page = service.list(&verified, &Pagination::default()).expect("list");
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, updated.id);
    }

    #[test]
    fn test_list_cursor_survives_deletes() {
        let (_dir, packages, service) = services();
        let first = service.record(&record_request(1, ADDRESS)).expect("record");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = service.record(&record_request(10, ADDRESS)).expect("record");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut newer = record_request(1, &format!("0x{}", "22".repeat(20)));
        newer.version = "1.1.0".to_string();
        let third = service.record(&newer).expect("record");

        let page = service
            .list(&DeploymentQuery::default(), &Pagination::new(None, 2))
            .expect("list");
        let ids: Vec<&str> = page.data.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert!(page.has_more);

        // The deployment the cursor points at is gone before the next page.
        packages.delete("my-pkg", "1.0.0", "k1").expect("delete");
        let rest = service
            .list(&DeploymentQuery::default(), &Pagination::new(page.next_cursor, 2))
            .expect("list");
        assert_eq!(rest.data.len(), 1);
        assert_eq!(rest.data[0].id, third.id);
        assert!(!rest.has_more);
    }

    #[test]
    fn test_list_rejects_malformed_cursor() {
        let (_dir, _packages, service) = services();
        service.record(&record_request(1, ADDRESS)).expect("record");

        for cursor in ["bogus", "123_", "abc_def"] {
            assert!(matches!(
                service.list(
                    &DeploymentQuery::default(),
                    &Pagination::new(Some(cursor.to_string()), 5)
                ),
                Err(RegistryError::InvalidRequest(_))
            ));
        }
    }
}
