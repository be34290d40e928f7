use super::{ChainError, ChainVerifier, MatchReport};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize, Debug)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize, Debug)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Verifier for Ethereum-compatible chains, talking JSON-RPC to the node.
#[derive(Clone, Default)]
pub struct EvmVerifier {
    client: reqwest::Client,
}

#[async_trait]
impl ChainVerifier for EvmVerifier {
    async fn deployed_bytecode(&self, endpoint: &Url, address: &str) -> Result<Vec<u8>, ChainError> {
        let response: RpcResponse = self
            .client
            .post(endpoint.clone())
            .timeout(RPC_TIMEOUT)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": "eth_getCode",
                "params": [address, "latest"],
                "id": 1,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let code = response
            .result
            .ok_or_else(|| ChainError::InvalidResponse("missing result".to_string()))?;
        let code = code.strip_prefix("0x").unwrap_or(&code);
        hex::decode(code).map_err(|err| ChainError::InvalidResponse(err.to_string()))
    }

    async fn verify_deployment(
        &self,
        endpoint: &Url,
        address: &str,
        expected: &[u8],
    ) -> Result<MatchReport, ChainError> {
        let on_chain = self.deployed_bytecode(endpoint, address).await?;
        if on_chain.is_empty() {
            return Ok(MatchReport::none(format!("No contract code at {address}")));
        }
        Ok(compare_bytecode(expected, &on_chain))
    }
}

/// Compares runtime bytecode, falling back to a comparison without the
/// trailing CBOR metadata the Solidity compiler appends.
pub fn compare_bytecode(expected: &[u8], on_chain: &[u8]) -> MatchReport {
    if expected == on_chain {
        return MatchReport::full();
    }

    let expected_code = strip_metadata(expected);
    let on_chain_code = strip_metadata(on_chain);
    if !expected_code.is_empty() && expected_code == on_chain_code {
        return MatchReport::partial("Bytecode matches except for compiler metadata");
    }

    MatchReport::none("Deployed bytecode does not match")
}

/// Removes the CBOR metadata section. Its length is stored big-endian in the
/// last two bytes and the section itself starts with a CBOR map header.
pub fn strip_metadata(code: &[u8]) -> &[u8] {
    let Some(len_bytes) = code.len().checked_sub(2).map(|at| &code[at..]) else {
        return code;
    };
    let metadata_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    if metadata_len == 0 || metadata_len + 2 > code.len() {
        return code;
    }

    let start = code.len() - 2 - metadata_len;
    match code[start] {
        0xa1..=0xa5 => &code[..start],
        _ => code,
    }
}
