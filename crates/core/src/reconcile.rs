//! Reconciliation of the logical frame stack between consecutive steps.
//!
//! The VM only reports external call depth. Depth transitions are matched
//! against the previous step's opcode to build call and creation frames
//! (rule A); at constant depth, internal call boundaries are inferred from
//! the jump annotations of the source map (rule B). Violations of the
//! depth/opcode contract are hard errors: they mean the reconciler and the
//! VM disagree about execution.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use eyre::{bail, ensure, OptionExt, Result};
use foundry_compilers::artifacts::sourcemap::Jump;
use revm::interpreter::OpCode;

use crate::{
    abi::{self, AbiDecoder},
    artifact::{ArtifactManager, CodeHash},
    frame::{self, Frame, InternalFrame},
    source_map::decode_source_loc,
    step::{StepState, StepVmState},
    utils::{self, opcode},
};

/// Updates `frames` for the step about to be recorded.
///
/// `code` and `code_hash` identify the code executing at the *current* step;
/// on a depth increase they describe the callee.
#[allow(clippy::too_many_arguments)]
pub(crate) fn reconcile(
    artifacts: &dyn ArtifactManager,
    decoder: &dyn AbiDecoder,
    frames: &mut Vec<Arc<Frame>>,
    trace: &[StepState],
    cur: &StepVmState,
    code: &Bytes,
    code_hash: Option<&CodeHash>,
    step_idx: usize,
) -> Result<()> {
    let Some(prev) = trace.last() else { return Ok(()) };

    if cur.depth != prev.depth {
        return reconcile_depth_change(
            artifacts, decoder, frames, prev, cur, code, code_hash, step_idx,
        );
    }

    // Same external depth: only source-map jump annotations reveal internal
    // (same-contract) call boundaries. Without debug info there is nothing
    // to do.
    let (ext_idx, cur_src, node, callee) = {
        let Some((ext_idx, ext)) = frame::top_external(frames) else {
            bail!("invariant violation: no external frame at step {step_idx}");
        };
        let (src, node) = decode_source_loc(cur.pc, ext.as_ref());
        let Some(src) = src else { return Ok(()) };
        let callee = ext.info().and_then(|info| info.ast.callee_at(&src));
        (ext_idx, src, node, callee)
    };

    let entered_internal = cur.op == OpCode::JUMPDEST &&
        prev.op == OpCode::JUMP &&
        prev.src.as_ref().map(|src| src.jump) == Some(Jump::In);

    if entered_internal {
        let args = match &callee {
            Some(callee) => abi::decode_fun_args(&callee.formals(), cur.stack.len())?,
            None => None,
        };

        trace!(pc = cur.pc, callee = callee.as_ref().map(|c| c.name()), "entering internal frame");
        frames.push(Arc::new(Frame::Internal(InternalFrame {
            ext_frame: ext_idx,
            callee,
            node,
            pc: cur.pc,
            start_step: step_idx,
            args,
        })));
    } else if cur.op == OpCode::JUMP && cur_src.jump == Jump::Out {
        // A jump-out that is not an internal return (e.g. a tail call the
        // compiler annotated anyway) leaves the stack inconsistent; surface
        // it instead of guessing.
        match frames.last() {
            Some(frame) if frame.is_internal() => {
                frames.pop();
                trace!(pc = cur.pc, "returning from internal frame");
            }
            _ => bail!(
                "invariant violation: jump-out at step {step_idx} with no internal frame on top"
            ),
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn reconcile_depth_change(
    artifacts: &dyn ArtifactManager,
    decoder: &dyn AbiDecoder,
    frames: &mut Vec<Arc<Frame>>,
    prev: &StepState,
    cur: &StepVmState,
    code: &Bytes,
    code_hash: Option<&CodeHash>,
    step_idx: usize,
) -> Result<()> {
    if cur.depth > prev.depth {
        ensure!(
            cur.depth == prev.depth + 1,
            "invariant violation: depth jumped from {} to {} at step {step_idx}",
            prev.depth,
            cur.depth
        );
        ensure!(
            opcode::increases_depth(prev.op),
            "invariant violation: depth increased after {:?} at step {step_idx}",
            prev.op
        );

        if opcode::creates_contract(prev.op) {
            let offset = prev.peek(1).ok_or_eyre("stack underflow at create")?;
            let size = prev.peek(2).ok_or_eyre("stack underflow at create")?;
            let initcode = utils::mem_slice(
                &prev.memory,
                utils::to_usize_saturated(offset),
                utils::to_usize_saturated(size),
            );

            let frame = frame::make_creation_frame(artifacts, prev.address, initcode, step_idx);
            frames.push(Arc::new(Frame::Creation(frame)));
        } else {
            let receiver = Address::from_word(B256::from(
                prev.peek(1).ok_or_eyre("stack underflow at call")?,
            ));
            // CALL and CALLCODE carry a value word between the address and
            // the argument window.
            let (args_at, len_at) = match prev.op {
                OpCode::CALL | OpCode::CALLCODE => (3, 4),
                _ => (2, 3),
            };
            let offset = prev.peek(args_at).ok_or_eyre("stack underflow at call")?;
            let size = prev.peek(len_at).ok_or_eyre("stack underflow at call")?;
            let msg_data = utils::mem_slice(
                &prev.memory,
                utils::to_usize_saturated(offset),
                utils::to_usize_saturated(size),
            );

            let frame = frame::make_call_frame(
                artifacts,
                decoder,
                frame::call_kind(prev.op),
                prev.address,
                receiver,
                msg_data,
                code.clone(),
                code_hash.cloned(),
                step_idx,
            );
            frames.push(Arc::new(Frame::Call(frame)));
        }
    } else {
        // Pop external frames until the quota is met; internal frames riding
        // on top of a popped external context go with it. This absorbs
        // reverts that unwind several internal frames in one transition.
        let mut quota = prev.depth - cur.depth;
        while quota > 0 {
            let frame = frames
                .pop()
                .ok_or_eyre("invariant violation: frame stack underflow on depth decrease")?;
            if frame.is_external() {
                quota -= 1;
            }
        }
        trace!(from = prev.depth, to = cur.depth, "unwound external frames");
    }

    Ok(())
}
