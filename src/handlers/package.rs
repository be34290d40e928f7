use super::archive;
use super::error::{not_found, RegistryError};
use crate::api::package::{ContractArtifacts, PublishRequest};
use crate::api::pagination::{PaginatedResponse, Pagination};
use crate::db::error::DatabaseError;
use crate::db::{ContractBundle, PackageFilter, PublishBundle, Store};
use crate::models::{Artifact, ArtifactType, Contract, Package, PackageSummary};
use crate::util::{compute_hash, now};
use crate::validation;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Version selector resolving to the highest non-prerelease version.
pub const LATEST: &str = "latest";

/// A contract of a package version along with the artifact kinds it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDetails {
    pub contract: Contract,
    pub artifacts: Vec<ArtifactType>,
}

#[derive(Clone)]
pub struct PackageService {
    store: Arc<dyn Store>,
}

impl PackageService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        PackageService { store }
    }

    /// Publishes `name@version` with the contracts and artifacts in `request`.
    ///
    /// The first publisher of a name becomes its owner; later versions must be
    /// published by the same API key. Versions are immutable.
    pub fn publish(
        &self,
        name: &str,
        version: &str,
        owner_id: &str,
        request: &PublishRequest,
    ) -> Result<Package, RegistryError> {
        info!("Starting to publish package {} version {}", name, version);

        if !validation::is_valid_package_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let version = validation::validate_or_format_semver(version)
            .ok_or_else(|| RegistryError::InvalidVersion(version.to_string()))?;
        validate_contracts(&request.contracts)?;

        self.check_owner(name, owner_id)?;
        if self.store.package_exists(name, &version)? {
            return Err(RegistryError::VersionExists {
                name: name.to_string(),
                version,
            });
        }

        let bundle = build_bundle(name, &version, owner_id, request);
        let package = self.store.publish(&bundle).map_err(|err| match err {
            // Lost the race against a concurrent publish of the same version.
            DatabaseError::AlreadyExists(_) => RegistryError::VersionExists {
                name: name.to_string(),
                version: version.clone(),
            },
            err => RegistryError::from(err),
        })?;

        match self.store.set_package_owner(name, owner_id) {
            Ok(true) => info!("Package {} is now owned by {}", name, owner_id),
            Ok(false) => {}
            Err(err) => warn!("Failed to record owner of package {}: {}", name, err),
        }

        info!(
            "Successfully published package {} version {} with {} contracts",
            name,
            version,
            bundle.contracts.len()
        );
        Ok(package)
    }

    /// Fetches a package version. `version` is an exact version, `latest`, or a
    /// semver requirement such as `^1.2`.
    pub fn get(&self, name: &str, version: &str) -> Result<Package, RegistryError> {
        self.get_resolved(name, version, false)
    }

    /// Like [PackageService::get], letting `latest` and requirements select
    /// prereleases.
    pub fn get_resolved(
        &self,
        name: &str,
        version: &str,
        include_prerelease: bool,
    ) -> Result<Package, RegistryError> {
        let version = self.resolve_version(name, version, include_prerelease)?;
        self.store
            .get_package(name, &version)
            .map_err(not_found(format!("package {name}@{version}")))
    }

    fn resolve_version(
        &self,
        name: &str,
        version: &str,
        include_prerelease: bool,
    ) -> Result<String, RegistryError> {
        if version == LATEST {
            let versions = self.store.get_package_versions(name, include_prerelease)?;
            return validation::resolve_latest(&versions, include_prerelease)
                .ok_or_else(|| RegistryError::NotFound(format!("package {name}")));
        }
        if let Some(exact) = validation::validate_or_format_semver(version) {
            return Ok(exact);
        }

        let versions = self.store.get_package_versions(name, include_prerelease)?;
        validation::resolve_requirement(&versions, version)
            .ok_or_else(|| RegistryError::NotFound(format!("package {name}@{version}")))
    }

    /// Every published version of `name`, highest first.
    pub fn get_versions(
        &self,
        name: &str,
        include_prerelease: bool,
    ) -> Result<Vec<String>, RegistryError> {
        let mut versions = self.store.get_package_versions(name, true)?;
        if versions.is_empty() {
            return Err(RegistryError::NotFound(format!("package {name}")));
        }
        if !include_prerelease {
            versions.retain(|version| !validation::is_prerelease(version));
        }
        Ok(versions)
    }

    pub fn list(
        &self,
        filter: &PackageFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResponse<PackageSummary>, RegistryError> {
        Ok(self.store.list_packages(filter, pagination)?)
    }

    /// Deletes a package version along with its contracts, artifacts and
    /// deployments. Only the owner of the name may delete.
    pub fn delete(&self, name: &str, version: &str, owner_id: &str) -> Result<(), RegistryError> {
        let version = validation::validate_or_format_semver(version)
            .ok_or_else(|| RegistryError::InvalidVersion(version.to_string()))?;
        self.check_owner(name, owner_id)?;

        let package = self
            .store
            .get_package(name, &version)
            .map_err(not_found(format!("package {name}@{version}")))?;
        self.store
            .delete_package(&package.id)
            .map_err(not_found(format!("package {name}@{version}")))?;

        info!("Deleted package {} version {}", name, version);
        Ok(())
    }

    pub fn get_contracts(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<ContractDetails>, RegistryError> {
        let package = self.get(name, version)?;
        self.store
            .list_contracts(&package.id)?
            .into_iter()
            .map(|contract| self.contract_details(contract))
            .collect()
    }

    pub fn get_contract(
        &self,
        name: &str,
        version: &str,
        contract: &str,
    ) -> Result<ContractDetails, RegistryError> {
        let package = self.get(name, version)?;
        let contract = self.find_contract(&package, contract)?;
        self.contract_details(contract)
    }

    pub fn get_artifact(
        &self,
        name: &str,
        version: &str,
        contract: &str,
        kind: ArtifactType,
    ) -> Result<Artifact, RegistryError> {
        let package = self.get(name, version)?;
        let contract = self.find_contract(&package, contract)?;
        self.store.get_artifact(&contract.id, kind).map_err(not_found(format!(
            "{kind} artifact of contract {} in {}@{}",
            contract.name, package.name, package.version
        )))
    }

    /// Builds the gzip tarball of a package version, returning it together
    /// with the package it was built from.
    pub fn get_archive(&self, name: &str, version: &str) -> Result<(Package, Vec<u8>), RegistryError> {
        let package = self.get(name, version)?;
        let contracts = self
            .store
            .list_contracts(&package.id)?
            .into_iter()
            .map(|contract| {
                let artifacts = self.store.list_artifacts(&contract.id)?;
                Ok((contract, artifacts))
            })
            .collect::<Result<Vec<_>, DatabaseError>>()?;

        let data = archive::build_archive(&package, &contracts)?;
        Ok((package, data))
    }

    fn check_owner(&self, name: &str, owner_id: &str) -> Result<(), RegistryError> {
        match self.store.get_package_owner(name)? {
            Some(owner) if owner != owner_id => Err(RegistryError::Forbidden(name.to_string())),
            _ => Ok(()),
        }
    }

    fn find_contract(&self, package: &Package, contract: &str) -> Result<Contract, RegistryError> {
        self.store.get_contract(&package.id, contract).map_err(not_found(format!(
            "contract {contract} in {}@{}",
            package.name, package.version
        )))
    }

    fn contract_details(&self, contract: Contract) -> Result<ContractDetails, RegistryError> {
        let artifacts = self
            .store
            .list_artifacts(&contract.id)?
            .iter()
            .filter_map(Artifact::kind)
            .collect();
        Ok(ContractDetails {
            contract,
            artifacts,
        })
    }
}

fn validate_contracts(contracts: &[ContractArtifacts]) -> Result<(), RegistryError> {
    if contracts.is_empty() {
        return Err(RegistryError::InvalidRequest(
            "a package must contain at least one contract".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for contract in contracts {
        let name = contract.name.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(RegistryError::InvalidRequest(format!(
                "invalid contract name: {:?}",
                contract.name
            )));
        }
        if !seen.insert((name, contract.source_path.as_str())) {
            return Err(RegistryError::InvalidRequest(format!(
                "contract {name} ({}) is listed more than once",
                contract.source_path
            )));
        }
    }
    Ok(())
}

fn build_bundle(
    name: &str,
    version: &str,
    owner_id: &str,
    request: &PublishRequest,
) -> PublishBundle {
    let created_at = now();
    let package = Package {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        version: version.to_string(),
        chain: request.chain.trim().to_lowercase(),
        builder: request.builder.trim().to_string(),
        compiler_version: request.compiler_version.clone(),
        compiler_settings: request.compiler_settings.as_ref().map(ToString::to_string),
        metadata: serde_json::Value::from_iter(
            request
                .metadata
                .iter()
                .map(|(key, value)| (key.clone(), serde_json::Value::from(value.as_str()))),
        )
        .to_string(),
        owner_id: owner_id.to_string(),
        created_at,
    };

    let contracts = request
        .contracts
        .iter()
        .map(|entry| {
            let contract_id = Uuid::new_v4().to_string();
            let artifacts: Vec<Artifact> = entry
                .artifacts()
                .into_iter()
                .map(|(kind, content)| Artifact {
                    id: Uuid::new_v4().to_string(),
                    contract_id: contract_id.clone(),
                    artifact_type: kind.to_string(),
                    content_hash: compute_hash(&content),
                    content,
                    created_at,
                })
                .collect();
            let content_hash = artifacts
                .iter()
                .find(|artifact| artifact.kind() == Some(ArtifactType::Bytecode))
                .map(|artifact| artifact.content_hash.clone())
                .unwrap_or_else(|| compute_hash(&[]));

            ContractBundle {
                contract: Contract {
                    id: contract_id,
                    package_id: package.id.clone(),
                    name: entry.name.trim().to_string(),
                    source_path: entry.source_path.clone(),
                    content_hash,
                    created_at,
                },
                artifacts,
            }
        })
        .collect();

    PublishBundle {
        package,
        contracts,
    }
}
