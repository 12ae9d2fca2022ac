//! The per-transaction trace state machine.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use eyre::Result;
use revm_inspectors::tracing::types::CallKind;

use crate::{
    abi::{AbiDecoder, StandardAbiDecoder},
    artifact::{ArtifactManager, CodeHash},
    events,
    frame::{self, Frame},
    reconcile,
    source_map::decode_source_loc,
    step::{StepState, StepVmState},
};

/// What the transaction targets: an existing contract or a deployment.
#[derive(Clone, Debug)]
pub enum TxTarget {
    Call(Address),
    Create,
}

/// The transaction-level inputs needed to seed the base frame.
#[derive(Clone, Debug)]
pub struct TxContext {
    pub sender: Address,
    pub target: TxTarget,
    /// Msg-data for a call, initcode for a creation.
    pub data: Bytes,
}

/// Consumes normalized VM steps and produces the annotated trace.
///
/// Each recorded step carries an immutable snapshot of the logical frame
/// stack, the decoded source location and AST node, and any emitted event.
/// The annotator is a plain state machine over [`StepVmState`]s; it has no
/// dependency on a live VM, which is what the driver's inspector provides.
pub struct TraceAnnotator {
    artifacts: Arc<dyn ArtifactManager>,
    decoder: Arc<dyn AbiDecoder>,
    tx: TxContext,
    frames: Vec<Arc<Frame>>,
    steps: Vec<StepState>,
}

impl TraceAnnotator {
    pub fn new(artifacts: Arc<dyn ArtifactManager>, tx: TxContext) -> Self {
        Self {
            artifacts,
            decoder: Arc::new(StandardAbiDecoder),
            tx,
            frames: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Replaces the standard ABI decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn AbiDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// The trace recorded so far.
    pub fn steps(&self) -> &[StepState] {
        &self.steps
    }

    pub fn last_step(&self) -> Option<&StepState> {
        self.steps.last()
    }

    pub fn into_steps(self) -> Vec<StepState> {
        self.steps
    }

    /// Records one step. `code` and `code_hash` identify the code executing
    /// at this step.
    ///
    /// Errors are invariant violations: the trace up to the previous step
    /// remains valid, but processing must not continue.
    pub fn record_step(
        &mut self,
        vm: StepVmState,
        code: Bytes,
        code_hash: Option<CodeHash>,
    ) -> Result<()> {
        if self.steps.is_empty() {
            self.push_base_frame(&code, code_hash.as_ref());
        } else {
            reconcile::reconcile(
                self.artifacts.as_ref(),
                self.decoder.as_ref(),
                &mut self.frames,
                &self.steps,
                &vm,
                &code,
                code_hash.as_ref(),
                self.steps.len(),
            )?;
        }

        // The previous step's dynamic gas is only known now. Across a depth
        // transition the difference also contains the callee's whole
        // execution, so it is left undefined there.
        if let Some(prev) = self.steps.last_mut() {
            if prev.vm.depth == vm.depth {
                let spent = prev.vm.gas_remaining.saturating_sub(vm.gas_remaining);
                prev.vm.dynamic_gas = Some(spent.saturating_sub(prev.vm.base_gas));
            }
        }

        let (src, ast_node, info) = match frame::top_external(&self.frames) {
            Some((_, ext)) => {
                let (src, node) = decode_source_loc(vm.pc, ext.as_ref());
                (src, node, ext.info().cloned())
            }
            None => (None, None, None),
        };

        let event = events::extract_event(&vm);

        self.steps.push(StepState {
            vm,
            code,
            code_hash,
            frames: self.frames.clone(),
            src,
            ast_node,
            event,
            info,
        });

        Ok(())
    }

    /// Builds the frame the transaction itself runs in.
    fn push_base_frame(&mut self, code: &Bytes, code_hash: Option<&CodeHash>) {
        let frame = match self.tx.target {
            TxTarget::Call(receiver) => Frame::Call(frame::make_call_frame(
                self.artifacts.as_ref(),
                self.decoder.as_ref(),
                CallKind::Call,
                self.tx.sender,
                receiver,
                self.tx.data.clone(),
                code.clone(),
                code_hash.cloned(),
                0,
            )),
            TxTarget::Create => Frame::Creation(frame::make_creation_frame(
                self.artifacts.as_ref(),
                self.tx.sender,
                self.tx.data.clone(),
                0,
            )),
        };

        self.frames.push(Arc::new(frame));
    }
}
