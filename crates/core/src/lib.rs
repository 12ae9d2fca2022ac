//! # sdb-core
//!
//! Source-level trace annotator for EVM transactions.
//!
//! Given a transaction replayed against a [`revm`] database, the annotator
//! produces a step-by-step trace in which every instruction is correlated
//! with a logical call stack (external *and* internal frames), a decoded
//! source location, the matching AST node, any emitted event, and argument
//! views for newly entered functions. External frames are reconciled against
//! VM depth transitions; internal (same-contract) frames are inferred from
//! source-map jump annotations.

#[macro_use]
extern crate tracing;

pub mod abi;
mod annotator;
pub mod artifact;
mod core;
pub mod events;
pub mod frame;
mod inspector;
mod reconcile;
pub mod source_map;
pub mod step;
pub mod utils;

pub use self::core::{Debugger, TxTrace};
pub use annotator::{TraceAnnotator, TxContext, TxTarget};
pub use inspector::TraceInspector;
pub use source_map::decode_source_loc;
