use super::deployment::check_target;
use super::error::{not_found, RegistryError};
use crate::api::verify::VerifyRequest;
use crate::chain::{ChainRegistry, MatchReport};
use crate::db::Store;
use crate::models::{ArtifactType, Package};
use crate::validation;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Unverified,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    pub status: VerificationStatus,
    /// `full`, `partial` or `none`; absent while pending.
    pub match_type: Option<String>,
    pub message: String,
    /// SHA-256 of the stored deployed bytecode artifact.
    pub expected_hash: String,
}

impl VerificationResult {
    fn pending(expected_hash: String) -> Self {
        VerificationResult {
            verified: false,
            status: VerificationStatus::Pending,
            match_type: None,
            message: "No RPC endpoint provided; verification is pending".to_string(),
            expected_hash,
        }
    }

    fn from_report(report: MatchReport, expected_hash: String) -> Self {
        VerificationResult {
            verified: report.matched,
            status: if report.matched {
                VerificationStatus::Verified
            } else {
                VerificationStatus::Unverified
            },
            match_type: Some(report.match_type),
            message: report.message,
            expected_hash,
        }
    }
}

#[derive(Clone)]
pub struct VerificationService {
    store: Arc<dyn Store>,
    chains: ChainRegistry,
}

impl VerificationService {
    pub fn new(store: Arc<dyn Store>, chains: ChainRegistry) -> Self {
        VerificationService { store, chains }
    }

    /// Checks the code deployed at an address against the deployed bytecode
    /// artifact of a published contract.
    ///
    /// Failures talking to the node are reported as an unverified result rather
    /// than an error. A verified result also marks the matching deployment
    /// record, if one exists, as verified.
    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerificationResult, RegistryError> {
        check_target(request.chain_id, &request.address)?;
        let address = request.address.to_lowercase();

        let version = validation::validate_or_format_semver(&request.version)
            .unwrap_or_else(|| request.version.clone());
        let package = self
            .store
            .get_package(&request.package_name, &version)
            .map_err(not_found(format!("package {}@{}", request.package_name, version)))?;
        let contract = self
            .store
            .get_contract(&package.id, &request.contract_name)
            .map_err(not_found(format!(
                "contract {} in {}@{}",
                request.contract_name, package.name, package.version
            )))?;
        let artifact = self
            .store
            .get_artifact(&contract.id, ArtifactType::DeployedBytecode)
            .map_err(not_found(format!(
                "deployed bytecode of contract {}",
                contract.name
            )))?;

        let verifier = self
            .chains
            .get(&package.chain)
            .ok_or_else(|| RegistryError::ChainNotFound(package.chain.clone()))?;

        let expected_hash = artifact.content_hash.clone();
        let Some(rpc_url) = request.rpc_url.as_deref().filter(|url| !url.is_empty()) else {
            return Ok(VerificationResult::pending(expected_hash));
        };
        let endpoint = Url::parse(rpc_url)
            .map_err(|err| RegistryError::InvalidRequest(format!("invalid RPC URL: {err}")))?;

        let expected = validation::decode_bytecode(&artifact.content);
        let report = match verifier.deployed_bytecode(&endpoint, &address).await {
            Ok(on_chain) if on_chain.is_empty() => {
                MatchReport::none(format!("No contract code at {address}"))
            }
            Ok(_) if expected.is_empty() => MatchReport::none("Published deployed bytecode is empty"),
            Ok(on_chain) if on_chain == expected => MatchReport::full(),
            Ok(_) => match verifier.verify_deployment(&endpoint, &address, &expected).await {
                Ok(report) => report,
                Err(err) => MatchReport::none(format!("Verification failed: {err}")),
            },
            Err(err) => MatchReport::none(format!("Failed to fetch on-chain bytecode: {err}")),
        };
        let result = VerificationResult::from_report(report, expected_hash);

        info!(
            "Verified {}@{} {} on {}:{} at {}: {:?}",
            package.name,
            package.version,
            contract.name,
            package.chain,
            request.chain_id,
            address,
            result.match_type
        );
        if result.verified {
            self.mark_verified(&package, request.chain_id, &address, &endpoint);
        }
        Ok(result)
    }

    fn mark_verified(&self, package: &Package, chain_id: i64, address: &str, endpoint: &Url) {
        let deployment = match self.store.get_deployment(&package.chain, chain_id, address) {
            Ok(deployment) if deployment.package_id == package.id => deployment,
            Ok(_) => return,
            Err(err) if err.is_not_found() => return,
            Err(err) => {
                warn!("Failed to look up deployment at {}: {}", address, err);
                return;
            }
        };

        let verified_on = endpoint.host_str().map(str::to_string);
        if let Err(err) = self
            .store
            .update_verification_status(&deployment.id, true, verified_on)
        {
            warn!("Failed to mark deployment {} verified: {}", deployment.id, err);
        }
    }
}
