use serde::Deserialize;

/// The request body to check a deployed contract against its published
/// bytecode.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub package_name: String,
    pub version: String,
    pub contract_name: String,
    pub chain_id: i64,
    pub address: String,
    /// JSON-RPC endpoint of a node on the target chain. Without it the
    /// verification is reported as pending.
    pub rpc_url: Option<String>,
}
