use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::{Text, Timestamp};
use diesel::QueryableByName;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::api_keys)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct ApiKey {
    pub id: String,
    pub label: String,
    pub key_hash: Vec<u8>,
    pub created_at: NaiveDateTime,
    pub last_used_at: Option<NaiveDateTime>,
    pub revoked_at: Option<NaiveDateTime>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// One published version of a package. Rows are never updated once inserted.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::packages)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Package {
    pub id: String,
    pub name: String,
    pub version: String,
    pub chain: String,
    pub builder: String,
    pub compiler_version: Option<String>,
    /// JSON document, stored as text so both backends share the column type.
    pub compiler_settings: Option<String>,
    /// JSON object of string keys to string values.
    pub metadata: String,
    pub owner_id: String,
    pub created_at: NaiveDateTime,
}

impl Package {
    pub fn compiler_settings_json(&self) -> Option<serde_json::Value> {
        self.compiler_settings
            .as_deref()
            .and_then(|settings| serde_json::from_str(settings).ok())
    }

    pub fn metadata_map(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.metadata).unwrap_or_default()
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::package_owners)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct PackageOwner {
    pub name: String,
    pub owner_id: String,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::contracts)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Contract {
    pub id: String,
    pub package_id: String,
    pub name: String,
    pub source_path: String,
    /// SHA-256 of the contract's bytecode artifact.
    pub content_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::artifacts)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Artifact {
    pub id: String,
    pub contract_id: String,
    pub artifact_type: String,
    pub content: Vec<u8>,
    pub content_hash: String,
    pub created_at: NaiveDateTime,
}

impl Artifact {
    pub fn kind(&self) -> Option<ArtifactType> {
        self.artifact_type.parse().ok()
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::deployments)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Deployment {
    pub id: String,
    pub package_id: String,
    pub contract_name: String,
    pub chain: String,
    pub chain_id: i64,
    pub address: String,
    pub deployer: Option<String>,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub deployment_data: Option<String>,
    pub verified: bool,
    pub verified_at: Option<NaiveDateTime>,
    pub verified_on: Option<String>,
    pub created_at: NaiveDateTime,
}

/// The build outputs a contract can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Abi,
    Bytecode,
    DeployedBytecode,
    StandardJsonInput,
    StorageLayout,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 5] = [
        ArtifactType::Abi,
        ArtifactType::Bytecode,
        ArtifactType::DeployedBytecode,
        ArtifactType::StandardJsonInput,
        ArtifactType::StorageLayout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Abi => "abi",
            ArtifactType::Bytecode => "bytecode",
            ArtifactType::DeployedBytecode => "deployed-bytecode",
            ArtifactType::StandardJsonInput => "standard-json-input",
            ArtifactType::StorageLayout => "storage-layout",
        }
    }

    /// The file name used for this artifact inside a package archive.
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactType::Abi => "abi.json",
            ArtifactType::Bytecode => "bytecode.hex",
            ArtifactType::DeployedBytecode => "deployed-bytecode.hex",
            ArtifactType::StandardJsonInput => "standard-json-input.json",
            ArtifactType::StorageLayout => "storage-layout.json",
        }
    }

    pub fn is_json(&self) -> bool {
        !matches!(self, ArtifactType::Bytecode | ArtifactType::DeployedBytecode)
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown artifact type: {s}"))
    }
}

/// Raw row of the grouped package listing. Both backends alias their columns
/// to these names so the row decodes identically.
#[derive(QueryableByName, Debug, Clone)]
pub struct PackageGroupRow {
    #[diesel(sql_type = Text)]
    pub name: String,
    /// Comma separated, distinct.
    #[diesel(sql_type = Text)]
    pub chains: String,
    /// Comma separated, distinct.
    #[diesel(sql_type = Text)]
    pub builders: String,
    /// Comma separated list of the versions in the group.
    #[diesel(sql_type = Text)]
    pub versions: String,
    #[diesel(sql_type = Timestamp)]
    pub updated_at: NaiveDateTime,
}

/// One logical entry of a package listing: every matching version of a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSummary {
    pub name: String,
    /// Chain families the matching versions target, sorted.
    pub chains: Vec<String>,
    /// Builder tags of the matching versions, sorted.
    pub builders: Vec<String>,
    /// Versions sorted from highest to lowest.
    pub versions: Vec<String>,
    pub latest_version: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl From<PackageGroupRow> for PackageSummary {
    fn from(row: PackageGroupRow) -> Self {
        let mut versions = split_list(&row.versions);
        crate::validation::sort_versions_desc(&mut versions);
        let latest_version = crate::validation::resolve_latest(&versions, false);

        let mut chains = split_list(&row.chains);
        chains.sort();
        let mut builders = split_list(&row.builders);
        builders.sort();

        PackageSummary {
            name: row.name,
            chains,
            builders,
            versions,
            latest_version,
            updated_at: row.updated_at,
        }
    }
}

fn split_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_type_names() {
        for kind in ArtifactType::ALL {
            assert_eq!(kind.as_str().parse::<ArtifactType>(), Ok(kind));
        }
        assert!("bin".parse::<ArtifactType>().is_err());
        assert_eq!(ArtifactType::DeployedBytecode.file_name(), "deployed-bytecode.hex");
        assert!(ArtifactType::Abi.is_json());
        assert!(!ArtifactType::Bytecode.is_json());
    }

    #[test]
    fn test_package_summary_from_row() {
        let row = PackageGroupRow {
            name: "my-pkg".to_string(),
            chains: "evm".to_string(),
            builders: "hardhat,foundry".to_string(),
            versions: "1.0.0,2.0.0-beta,1.1.0".to_string(),
            updated_at: chrono::Utc::now().naive_utc(),
        };

        let summary = PackageSummary::from(row);
        assert_eq!(summary.versions, vec!["2.0.0-beta", "1.1.0", "1.0.0"]);
        assert_eq!(summary.latest_version.as_deref(), Some("1.1.0"));
        assert_eq!(summary.chains, vec!["evm"]);
        assert_eq!(summary.builders, vec!["foundry", "hardhat"]);
    }
}
