//! Per-step trace records.

use std::{collections::BTreeMap, ops::Deref, sync::Arc};

use alloy_primitives::{Address, Bytes, U256};
use revm::interpreter::OpCode;

use crate::{
    artifact::{ast::AstNodeHandle, CodeHash, ContractInfo},
    frame::Frame,
    source_map::SrcLocation,
};

/// Storage of the executing account, as observed before the step.
///
/// Steps share the same snapshot until an SSTORE forces a re-read, so
/// retaining long traces costs memory proportional to the mutation rate.
pub type StorageSnapshot = Arc<BTreeMap<U256, U256>>;

/// Canonical VM state at one step, captured before the instruction executes.
#[derive(Clone, Debug)]
pub struct StepVmState {
    pub op: OpCode,
    pub pc: usize,
    /// External call depth; the outermost frame reports 1.
    pub depth: usize,
    /// Static gas charged for the opcode.
    pub base_gas: u64,
    /// Dynamic gas of this step, backfilled once the next same-depth step is
    /// observed.
    pub dynamic_gas: Option<u64>,
    pub gas_remaining: u64,
    /// The executing account.
    pub address: Address,
    /// The account the running code was loaded from (differs from `address`
    /// under DELEGATECALL/CALLCODE).
    pub code_address: Address,
    /// Operand stack, bottom first.
    pub stack: Vec<U256>,
    pub memory: Bytes,
    pub storage: StorageSnapshot,
}

impl StepVmState {
    /// The stack word `n` positions below the top.
    #[inline]
    pub fn peek(&self, n: usize) -> Option<U256> {
        self.stack.len().checked_sub(1 + n).map(|i| self.stack[i])
    }
}

/// An event emitted by a LOG instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDesc {
    pub payload: Bytes,
    /// Topics in declaration order.
    pub topics: Vec<U256>,
}

/// A fully annotated trace step.
#[derive(Clone, Debug)]
pub struct StepState {
    pub vm: StepVmState,
    /// The code blob executing at this step.
    pub code: Bytes,
    pub code_hash: Option<CodeHash>,
    /// Immutable snapshot of the logical frame stack; the last entry is the
    /// frame the instruction executed in.
    pub frames: Vec<Arc<Frame>>,
    pub src: Option<SrcLocation>,
    pub ast_node: Option<AstNodeHandle>,
    pub event: Option<EventDesc>,
    /// Contract info of the current external frame.
    pub info: Option<Arc<ContractInfo>>,
}

impl Deref for StepState {
    type Target = StepVmState;

    fn deref(&self) -> &Self::Target {
        &self.vm
    }
}
