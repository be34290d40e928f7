use crate::db::PackageFilter;
use crate::handlers::package::ContractDetails;
use crate::models::{ArtifactType, Package, PackageSummary};
use chrono::{DateTime, NaiveDateTime, Utc};
use rocket::FromForm;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::pagination::Pagination;

pub const DEFAULT_CHAIN: &str = "evm";

fn default_chain() -> String {
    DEFAULT_CHAIN.to_string()
}

/// The publish request body. Name and version come from the route.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[serde(default = "default_chain")]
    pub chain: String,
    #[serde(default)]
    pub builder: String,
    pub compiler_version: Option<String>,
    pub compiler_settings: Option<Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub contracts: Vec<ContractArtifacts>,
}

/// The build outputs submitted for one contract. Every artifact is optional.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifacts {
    pub name: String,
    #[serde(default)]
    pub source_path: String,
    pub abi: Option<Value>,
    pub bytecode: Option<String>,
    pub deployed_bytecode: Option<String>,
    pub standard_json_input: Option<Value>,
    pub storage_layout: Option<Value>,
}

impl ContractArtifacts {
    /// The stored content of each artifact that was submitted. JSON artifacts
    /// are stored serialized, bytecode as the submitted hex text.
    pub fn artifacts(&self) -> Vec<(ArtifactType, Vec<u8>)> {
        let json = |value: &Option<Value>| value.as_ref().map(|v| v.to_string().into_bytes());
        let text = |value: &Option<String>| value.as_ref().map(|v| v.trim().as_bytes().to_vec());

        [
            (ArtifactType::Abi, json(&self.abi)),
            (ArtifactType::Bytecode, text(&self.bytecode)),
            (ArtifactType::DeployedBytecode, text(&self.deployed_bytecode)),
            (ArtifactType::StandardJsonInput, json(&self.standard_json_input)),
            (ArtifactType::StorageLayout, json(&self.storage_layout)),
        ]
        .into_iter()
        .filter_map(|(kind, content)| content.map(|content| (kind, content)))
        .collect()
    }
}

/// Query parameters of the package listing.
#[derive(FromForm, Debug, Clone, Default)]
pub struct PackageQuery {
    pub search: Option<String>,
    pub chain: Option<String>,
    pub project: Option<String>,
    pub version: Option<String>,
    pub contract: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

impl PackageQuery {
    pub fn filter(&self) -> PackageFilter {
        PackageFilter {
            search: self.search.clone(),
            chain: self.chain.clone(),
            project: self.project.clone(),
            version: self.version.clone(),
            contract: self.contract.clone(),
        }
    }

    pub fn pagination(&self) -> Pagination {
        Pagination {
            cursor: self.cursor.clone(),
            limit: self.limit,
        }
    }
}

pub(crate) fn to_utc(time: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(time, Utc)
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PackageResponse {
    pub id: String,
    pub name: String,
    pub version: String,
    pub chain: String,
    pub builder: String,
    pub compiler_version: Option<String>,
    pub compiler_settings: Option<Value>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl From<Package> for PackageResponse {
    fn from(package: Package) -> Self {
        PackageResponse {
            compiler_settings: package.compiler_settings_json(),
            metadata: package.metadata_map(),
            created_at: to_utc(package.created_at),
            id: package.id,
            name: package.name,
            version: package.version,
            chain: package.chain,
            builder: package.builder,
            compiler_version: package.compiler_version,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummaryResponse {
    pub name: String,
    pub chains: Vec<String>,
    pub builders: Vec<String>,
    pub versions: Vec<String>,
    pub latest_version: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<PackageSummary> for PackageSummaryResponse {
    fn from(summary: PackageSummary) -> Self {
        PackageSummaryResponse {
            name: summary.name,
            chains: summary.chains,
            builders: summary.builders,
            versions: summary.versions,
            latest_version: summary.latest_version,
            updated_at: to_utc(summary.updated_at),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VersionsResponse {
    pub name: String,
    pub versions: Vec<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContractResponse {
    pub name: String,
    pub source_path: String,
    pub content_hash: String,
    pub artifacts: Vec<ArtifactType>,
}

impl From<ContractDetails> for ContractResponse {
    fn from(details: ContractDetails) -> Self {
        ContractResponse {
            name: details.contract.name,
            source_path: details.contract.source_path,
            content_hash: details.contract.content_hash,
            artifacts: details.artifacts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_request_defaults() {
        let request: PublishRequest = serde_json::from_value(json!({
            "contracts": [{ "name": "Token", "bytecode": "0xabc" }]
        }))
        .expect("valid request");

        assert_eq!(request.chain, "evm");
        assert_eq!(request.builder, "");
        assert!(request.metadata.is_empty());
        assert_eq!(request.contracts[0].source_path, "");
    }

    #[test]
    fn test_contract_artifacts() {
        let contract = ContractArtifacts {
            name: "Token".to_string(),
            abi: Some(json!([{"type": "function", "name": "transfer"}])),
            bytecode: Some(" 0xabc\n".to_string()),
            ..Default::default()
        };

        let artifacts = contract.artifacts();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].0, ArtifactType::Abi);
        assert_eq!(
            artifacts[0].1,
            br#"[{"name":"transfer","type":"function"}]"#.to_vec()
        );
        assert_eq!(artifacts[1], (ArtifactType::Bytecode, b"0xabc".to_vec()));
    }
}
