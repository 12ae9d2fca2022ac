//! Resolution of executing code to compile-time artifacts.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::artifact::{contract::ContractInfo, metadata};

/// Resolves code observed during execution to compile-time metadata.
///
/// Deployed code is keyed by the compilation digest of its metadata trailer;
/// creation code is matched against known creation bytecode (implementations
/// must tolerate appended constructor arguments). Both lookups return `None`
/// for unknown code; the trace simply carries no debug info there.
pub trait ArtifactManager: Send + Sync {
    fn contract_by_metadata_hash(&self, hash: &[u8]) -> Option<Arc<ContractInfo>>;

    fn contract_by_creation_code(&self, initcode: &[u8]) -> Option<Arc<ContractInfo>>;
}

/// Map-backed [`ArtifactManager`] over a fixed set of registered contracts.
#[derive(Debug, Default)]
pub struct InMemoryArtifactManager {
    by_metadata_hash: FxHashMap<Vec<u8>, Arc<ContractInfo>>,
    contracts: Vec<Arc<ContractInfo>>,
}

impl InMemoryArtifactManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a contract, indexing it by the metadata digest of its
    /// deployed bytecode (when present) and by its creation bytecode.
    pub fn register(&mut self, info: Arc<ContractInfo>) {
        if let Some(digest) = metadata::metadata_hash(&info.deployed_bytecode.code) {
            self.by_metadata_hash.insert(digest.to_vec(), Arc::clone(&info));
        }
        self.contracts.push(info);
    }
}

impl ArtifactManager for InMemoryArtifactManager {
    fn contract_by_metadata_hash(&self, hash: &[u8]) -> Option<Arc<ContractInfo>> {
        self.by_metadata_hash.get(hash).cloned()
    }

    fn contract_by_creation_code(&self, initcode: &[u8]) -> Option<Arc<ContractInfo>> {
        // Constructor arguments ride at the tail of the initcode, so known
        // creation bytecode is matched as a prefix.
        self.contracts
            .iter()
            .find(|info| {
                !info.bytecode.code.is_empty() && initcode.starts_with(&info.bytecode.code)
            })
            .cloned()
    }
}
