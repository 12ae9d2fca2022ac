//! Translation of raw VM callbacks into annotated trace steps.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{Address, Bytes};
use eyre::{OptionExt, Result};
use revm::{
    interpreter::{Interpreter, OpCode},
    primitives::{EnvWithHandlerCfg, ExecutionResult, TxKind},
    Database, EvmContext, Inspector,
};

use crate::{
    annotator::{TraceAnnotator, TxContext, TxTarget},
    artifact::{ArtifactManager, CodeHash},
    core::TxTrace,
    step::{StepState, StepVmState, StorageSnapshot},
    utils::{self, opcode},
};

/// Inspector that normalizes each step callback (operand stack, shared
/// memory and storage snapshots, depth) and feeds the [`TraceAnnotator`].
///
/// The step hook cannot propagate errors, so the first failure is stashed
/// and execution keeps running uninstrumented; [`TraceInspector::finish`]
/// surfaces it to the driver.
pub struct TraceInspector {
    annotator: TraceAnnotator,
    error: Option<eyre::Error>,
}

impl TraceInspector {
    pub fn new(artifacts: Arc<dyn ArtifactManager>, env: &EnvWithHandlerCfg) -> Self {
        let target = match env.tx.transact_to {
            TxKind::Call(address) => TxTarget::Call(address),
            TxKind::Create => TxTarget::Create,
        };
        let tx = TxContext { sender: env.tx.caller, target, data: env.tx.data.clone() };

        Self { annotator: TraceAnnotator::new(artifacts, tx), error: None }
    }

    /// The trace recorded so far.
    pub fn steps(&self) -> &[StepState] {
        self.annotator.steps()
    }

    /// Finalizes the trace, surfacing any error the step hook stashed.
    pub fn finish(self, result: ExecutionResult) -> Result<TxTrace> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(TxTrace { steps: self.annotator.into_steps(), result }),
        }
    }

    fn record<DB>(&mut self, interp: &mut Interpreter, ecx: &mut EvmContext<DB>) -> Result<()>
    where
        DB: Database,
    {
        let op = OpCode::new(interp.current_opcode()).unwrap_or(OpCode::INVALID);
        let address = interp.contract.target_address;
        let code_address = interp.contract.bytecode_address.unwrap_or(address);

        // Memory is copied only when the previous opcode could have changed
        // it; storage is re-read from the journal only after an SSTORE.
        // Everything else aliases the previous step's buffers.
        let memory = self
            .annotator
            .last_step()
            .filter(|step| !opcode::modifies_memory(step.op))
            .map(|step| step.memory.clone())
            .unwrap_or_else(|| interp.shared_memory.context_memory().to_vec().into());

        let storage = match self.annotator.last_step() {
            Some(step) if !opcode::modifies_storage(step.op) => step.storage.clone(),
            _ => dump_storage(ecx, address),
        };

        let vm = StepVmState {
            op,
            pc: interp.program_counter(),
            // Journal depth is 0-based; the trace convention is that the
            // outermost frame reports 1.
            depth: ecx.journaled_state.depth() as usize + 1,
            base_gas: opcode::base_gas(op),
            dynamic_gas: None,
            gas_remaining: interp.gas.remaining(),
            address,
            code_address,
            stack: interp.stack().data().clone(),
            memory,
            storage,
        };

        let (code, code_hash) = self.identify_code(interp, code_address)?;

        self.annotator.record_step(vm, code, code_hash)
    }

    /// Resolves the code blob executing at this step and its identifying
    /// hash, reusing the previous step's resolution whenever the code source
    /// is unchanged.
    fn identify_code(
        &self,
        interp: &Interpreter,
        code_address: Address,
    ) -> Result<(Bytes, Option<CodeHash>)> {
        match self.annotator.last_step() {
            // First step inside a CREATE/CREATE2: the initcode is the memory
            // slice the creating instruction pointed at.
            Some(prev) if opcode::creates_contract(prev.op) => {
                let offset = prev.peek(1).ok_or_eyre("stack underflow at create")?;
                let size = prev.peek(2).ok_or_eyre("stack underflow at create")?;
                let initcode = utils::mem_slice(
                    &prev.memory,
                    utils::to_usize_saturated(offset),
                    utils::to_usize_saturated(size),
                );
                let hash = CodeHash::for_creation(&initcode);

                Ok((initcode, Some(hash)))
            }
            Some(prev) if prev.code_address == code_address => {
                Ok((prev.code.clone(), prev.code_hash.clone()))
            }
            _ => {
                let code = interp.contract.bytecode.original_bytes();
                let hash = CodeHash::for_deployed(&code);
                trace!(?code_address, resolved = hash.is_some(), "resolved executing code");

                Ok((code, hash))
            }
        }
    }
}

impl<DB> Inspector<DB> for TraceInspector
where
    DB: Database,
    DB::Error: std::error::Error,
{
    fn step(&mut self, interp: &mut Interpreter, ecx: &mut EvmContext<DB>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.record(interp, ecx) {
            error!(%err, "trace annotation failed");
            self.error = Some(err);
        }
    }
}

/// Snapshot of the executing account's storage: every slot the transaction
/// journal has touched, at its present value.
fn dump_storage<DB: Database>(ecx: &EvmContext<DB>, address: Address) -> StorageSnapshot {
    let mut storage = BTreeMap::new();
    if let Some(account) = ecx.journaled_state.state.get(&address) {
        for (slot, value) in account.storage.iter() {
            storage.insert(*slot, value.present_value);
        }
    }

    Arc::new(storage)
}
