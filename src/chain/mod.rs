pub mod evm;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub use evm::EvmVerifier;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

/// Outcome of comparing expected bytecode against what is deployed on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub matched: bool,
    /// `full`, `partial` or `none`.
    pub match_type: String,
    pub message: String,
}

impl MatchReport {
    pub fn full() -> Self {
        MatchReport {
            matched: true,
            match_type: "full".to_string(),
            message: "Deployed bytecode matches exactly".to_string(),
        }
    }

    pub fn partial(message: impl Into<String>) -> Self {
        MatchReport {
            matched: true,
            match_type: "partial".to_string(),
            message: message.into(),
        }
    }

    pub fn none(message: impl Into<String>) -> Self {
        MatchReport {
            matched: false,
            match_type: "none".to_string(),
            message: message.into(),
        }
    }
}

/// Access to one chain family's nodes.
#[async_trait]
pub trait ChainVerifier: Send + Sync {
    /// Fetches the runtime bytecode at `address`. An empty result means there is
    /// no contract at the address.
    async fn deployed_bytecode(&self, endpoint: &Url, address: &str) -> Result<Vec<u8>, ChainError>;

    /// Chain-specific comparison of `expected` against the code at `address`,
    /// used when the raw bytes differ.
    async fn verify_deployment(
        &self,
        endpoint: &Url,
        address: &str,
        expected: &[u8],
    ) -> Result<MatchReport, ChainError>;
}

/// Verifiers by chain family tag, e.g. `evm`.
#[derive(Clone, Default)]
pub struct ChainRegistry {
    verifiers: HashMap<String, Arc<dyn ChainVerifier>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every chain family supported out of the box.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("evm", EvmVerifier::default());
        registry
    }

    pub fn register(&mut self, chain: impl Into<String>, verifier: impl ChainVerifier + 'static) {
        self.verifiers.insert(chain.into(), Arc::new(verifier));
    }

    pub fn get(&self, chain: &str) -> Option<Arc<dyn ChainVerifier>> {
        self.verifiers.get(chain).cloned()
    }

    pub fn chains(&self) -> Vec<&str> {
        let mut chains: Vec<&str> = self.verifiers.keys().map(String::as_str).collect();
        chains.sort_unstable();
        chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = ChainRegistry::with_defaults();
        assert_eq!(registry.chains(), vec!["evm"]);
        assert!(registry.get("evm").is_some());
        assert!(registry.get("fuel").is_none());
        assert!(ChainRegistry::new().get("evm").is_none());
    }
}
