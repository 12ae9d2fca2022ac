//! Logical call-stack frames.
//!
//! External frames (calls and creations) correspond one-to-one with VM call
//! depth; internal frames represent same-contract function invocations that
//! the VM knows nothing about and are inferred from source-map jump
//! annotations. Frames are shared into every step snapshot through `Arc`, so
//! a snapshot is a shallow clone bounded by call depth.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, Selector};
use revm::interpreter::OpCode;
use revm_inspectors::tracing::types::CallKind;

use crate::{
    abi::{AbiDecoder, DecodedArg},
    artifact::{
        ast::{AstNodeHandle, Callee, FunctionDesc},
        ArtifactManager, CodeHash, ContractInfo,
    },
};

/// An external message-call frame.
#[derive(Clone, Debug)]
pub struct ExtCallFrame {
    pub kind: CallKind,
    pub sender: Address,
    pub receiver: Address,
    pub msg_data: Bytes,
    /// Deployed code executing in this frame.
    pub code: Bytes,
    pub code_hash: Option<CodeHash>,
    pub info: Option<Arc<ContractInfo>>,
    /// Selector-resolved callee: a function or a public state variable.
    pub callee: Option<Callee>,
    pub args: Option<Vec<DecodedArg>>,
    pub start_step: usize,
}

/// A contract-creation frame. The receiver is the zero address until the
/// deployment completes.
#[derive(Clone, Debug)]
pub struct CreationFrame {
    pub sender: Address,
    pub receiver: Address,
    pub creation_code: Bytes,
    pub info: Option<Arc<ContractInfo>>,
    pub constructor: Option<Arc<FunctionDesc>>,
    /// Constructor-tail argument decoding is not performed; this stays
    /// `None`.
    pub args: Option<Vec<DecodedArg>>,
    pub start_step: usize,
}

/// A same-contract function invocation inferred from a jump-into annotation.
#[derive(Clone, Debug)]
pub struct InternalFrame {
    /// Index of the nearest enclosing external frame in the stack snapshot.
    pub ext_frame: usize,
    /// Only meaningful when the entry PC maps to a function definition or a
    /// public state variable.
    pub callee: Option<Callee>,
    pub node: Option<AstNodeHandle>,
    /// PC of the function's entry JUMPDEST.
    pub pc: usize,
    pub start_step: usize,
    pub args: Option<Vec<DecodedArg>>,
}

/// A logical call-stack frame.
#[derive(Clone, Debug)]
pub enum Frame {
    Call(ExtCallFrame),
    Creation(CreationFrame),
    Internal(InternalFrame),
}

impl Frame {
    /// External frames are the ones the VM counts in its call depth.
    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Call(_) | Self::Creation(_))
    }

    #[inline]
    pub fn is_creation(&self) -> bool {
        matches!(self, Self::Creation(_))
    }

    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Contract info resolved for an external frame. Internal frames borrow
    /// their enclosing external frame's info via `ext_frame`.
    pub fn info(&self) -> Option<&Arc<ContractInfo>> {
        match self {
            Self::Call(frame) => frame.info.as_ref(),
            Self::Creation(frame) => frame.info.as_ref(),
            Self::Internal(_) => None,
        }
    }

    pub fn start_step(&self) -> usize {
        match self {
            Self::Call(frame) => frame.start_step,
            Self::Creation(frame) => frame.start_step,
            Self::Internal(frame) => frame.start_step,
        }
    }
}

/// The topmost external frame and its index within the stack.
pub fn top_external(frames: &[Arc<Frame>]) -> Option<(usize, &Arc<Frame>)> {
    frames.iter().enumerate().rev().find(|(_, frame)| frame.is_external())
}

pub(crate) fn call_kind(op: OpCode) -> CallKind {
    match op {
        OpCode::CALLCODE => CallKind::CallCode,
        OpCode::DELEGATECALL => CallKind::DelegateCall,
        OpCode::STATICCALL => CallKind::StaticCall,
        OpCode::CREATE => CallKind::Create,
        OpCode::CREATE2 => CallKind::Create2,
        _ => CallKind::Call,
    }
}

/// Builds an external call frame, resolving contract info by metadata hash
/// and the callee by msg-data selector.
#[allow(clippy::too_many_arguments)]
pub(crate) fn make_call_frame(
    artifacts: &dyn ArtifactManager,
    decoder: &dyn AbiDecoder,
    kind: CallKind,
    sender: Address,
    receiver: Address,
    msg_data: Bytes,
    code: Bytes,
    code_hash: Option<CodeHash>,
    start_step: usize,
) -> ExtCallFrame {
    let info = match &code_hash {
        Some(CodeHash::Metadata(digest)) => artifacts.contract_by_metadata_hash(digest),
        _ => None,
    };

    let callee = match (&info, msg_data.len() >= 4) {
        (Some(info), true) => info.ast.callee_by_selector(Selector::from_slice(&msg_data[..4])),
        _ => None,
    };

    let args = match (&info, &callee) {
        (Some(info), Some(callee)) => {
            match decoder.decode_msg_data(callee, &msg_data, info.encoder_version) {
                Ok(args) => Some(args),
                Err(err) => {
                    warn!(callee = callee.name(), %err, "failed to decode msg-data");
                    None
                }
            }
        }
        _ => None,
    };

    trace!(?kind, ?sender, ?receiver, resolved = info.is_some(), "entering call frame");

    ExtCallFrame { kind, sender, receiver, msg_data, code, code_hash, info, callee, args, start_step }
}

/// Builds a creation frame, resolving contract info by creation-bytecode
/// matching. Constructor-argument decoding is intentionally left out.
pub(crate) fn make_creation_frame(
    artifacts: &dyn ArtifactManager,
    sender: Address,
    creation_code: Bytes,
    start_step: usize,
) -> CreationFrame {
    let info = artifacts.contract_by_creation_code(&creation_code);
    let constructor = info.as_ref().and_then(|info| info.ast.constructor.clone());

    trace!(?sender, resolved = info.is_some(), "entering creation frame");

    CreationFrame {
        sender,
        receiver: Address::ZERO,
        creation_code,
        info,
        constructor,
        args: None,
        start_step,
    }
}
