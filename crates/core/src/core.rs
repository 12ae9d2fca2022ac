use std::sync::Arc;

use eyre::{eyre, Result};
use revm::{
    primitives::{EnvWithHandlerCfg, ExecutionResult},
    Database,
};

use crate::{
    artifact::ArtifactManager,
    inspector::TraceInspector,
    step::StepState,
    utils::evm::{new_evm_with_inspector, replay_env},
};

/// The annotated trace of a replayed transaction, together with the VM's
/// execution result. On a VM failure the trace ends at the last step the VM
/// reached and the result carries the failure.
pub struct TxTrace {
    pub steps: Vec<StepState>,
    pub result: ExecutionResult,
}

/// Source-level transaction debugger.
///
/// A `Debugger` is a per-transaction computation parameterized by an
/// artifact manager; it holds no other state and may be reused across
/// transactions and databases.
pub struct Debugger {
    artifacts: Arc<dyn ArtifactManager>,
}

impl Debugger {
    pub fn new(artifacts: Arc<dyn ArtifactManager>) -> Self {
        Self { artifacts }
    }

    /// Replays the transaction described by `env` against `db` and returns
    /// the annotated step trace.
    ///
    /// The transaction is assumed to have been observed already: nonce,
    /// balance and base-fee checks are suppressed before execution.
    pub fn debug_tx<DB>(&self, db: DB, env: EnvWithHandlerCfg) -> Result<TxTrace>
    where
        DB: Database,
        DB::Error: std::error::Error,
    {
        let env = replay_env(env);
        let mut inspector = TraceInspector::new(Arc::clone(&self.artifacts), &env);

        let mut evm = new_evm_with_inspector(db, env, &mut inspector);
        let result = evm.transact().map_err(|err| eyre!("failed to transact: {err}"))?;
        drop(evm);

        inspector.finish(result.result)
    }
}
