//! Compile-time artifacts: contract metadata, AST indexing, and code
//! identification.

pub mod ast;
mod contract;
mod manager;
pub mod metadata;

pub use contract::{BytecodeInfo, ContractInfo, SourceFile};
pub use manager::{ArtifactManager, InMemoryArtifactManager};
pub use metadata::CodeHash;
