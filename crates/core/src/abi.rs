//! Argument views over calldata and the operand stack.
//!
//! Views locate where a decoded value lives rather than materializing it:
//! calldata views follow the standard head/tail ABI layout of msg-data, stack
//! views follow the compiler's internal calling convention in which a
//! dynamically-sized calldata argument occupies a two-slot (offset, length)
//! pair and everything else a single slot.

use alloy_primitives::U256;
use eyre::{bail, ensure, Result};

use crate::artifact::ast::{Callee, ParamDesc};

/// ABI encoder generation the contract was compiled with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AbiEncoderVersion {
    V1,
    #[default]
    V2,
}

/// Decodes msg-data argument views for an externally invoked callee.
///
/// The default method is the standard head/tail layout implemented by
/// [`decode_msg_data`]; hosts with richer type information may substitute
/// their own decoder the same way they substitute an
/// [`crate::artifact::ArtifactManager`].
pub trait AbiDecoder: Send + Sync {
    fn decode_msg_data(
        &self,
        callee: &Callee,
        data: &[u8],
        version: AbiEncoderVersion,
    ) -> Result<Vec<DecodedArg>> {
        decode_msg_data(callee, data, version)
    }
}

/// The standard ABI decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardAbiDecoder;

impl AbiDecoder for StandardAbiDecoder {}

/// Where a decoded value lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataLocation {
    /// Operand-stack slot; 0 is the top of the stack.
    Stack { offset_from_top: usize },
    /// Byte address in linear memory.
    Memory { address: usize },
    /// Byte address in the msg-data buffer.
    Calldata { address: usize },
    /// Storage word plus the byte the value ends at within it (0..31, for
    /// packed variables).
    Storage { slot: U256, end_offset: u8 },
}

/// A located view of a typed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataView {
    /// Compiler type string.
    pub ty: String,
    /// Pre-user-defined-value-type alias, when the two differ.
    pub original_ty: Option<String>,
    pub loc: DataLocation,
}

/// A decoded argument of a frame; the view is absent when the type could not
/// be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedArg {
    pub name: String,
    pub view: Option<DataView>,
}

/// Whether the ABI encoding of the type is dynamically sized.
pub fn is_dynamic_abi_type(identifier: &str) -> bool {
    identifier.starts_with("t_bytes_") ||
        identifier.starts_with("t_string") ||
        identifier.contains("$dyn")
}

/// Operand-stack slots occupied by an argument of this type: dynamically
/// sized calldata types are an (offset, length) pair, everything else is a
/// single word.
pub fn calldata_slot_count(identifier: &str) -> usize {
    if identifier.ends_with("_calldata_ptr") && is_dynamic_abi_type(identifier) {
        2
    } else {
        1
    }
}

/// Types the v1 encoder cannot carry across an external interface: structs
/// and nested dynamically-sized arrays.
fn needs_encoder_v2(identifier: &str) -> bool {
    identifier.contains("t_struct") || identifier.matches("$dyn").count() > 1
}

/// Computes calldata views for each formal of an externally invoked callee.
///
/// Static arguments live in their head slot; dynamic arguments are located at
/// the tail their head slot points to. Errors are decode failures the caller
/// recovers from by leaving the frame's arguments undefined.
pub fn decode_msg_data(
    callee: &Callee,
    data: &[u8],
    version: AbiEncoderVersion,
) -> Result<Vec<DecodedArg>> {
    let formals = callee.formals();
    ensure!(
        data.len() >= 4 + 32 * formals.len(),
        "msg-data too short for {} arguments",
        formals.len()
    );

    let mut args = Vec::with_capacity(formals.len());
    for (i, formal) in formals.iter().enumerate() {
        let head = 4 + 32 * i;

        let Some(identifier) = formal.ty.type_identifier.as_deref() else {
            args.push(DecodedArg { name: formal.name.clone(), view: None });
            continue;
        };

        ensure!(
            version == AbiEncoderVersion::V2 || !needs_encoder_v2(identifier),
            "argument {} requires ABI encoder v2",
            formal.name
        );

        let address = if is_dynamic_abi_type(identifier) {
            let offset = U256::from_be_slice(&data[head..head + 32]);
            let Ok(offset) = usize::try_from(offset) else {
                bail!("tail offset out of range for argument {}", formal.name);
            };
            let address = 4usize.saturating_add(offset);
            ensure!(address < data.len(), "tail of argument {} outside msg-data", formal.name);
            address
        } else {
            head
        };

        args.push(DecodedArg {
            name: formal.name.clone(),
            view: Some(DataView {
                ty: formal.ty.type_string.clone().unwrap_or_default(),
                original_ty: None,
                loc: DataLocation::Calldata { address },
            }),
        });
    }

    Ok(args)
}

/// Computes stack views for the formals of an internally entered function.
///
/// Formals are walked last to first, accumulating slot counts from the top of
/// the stack. A stack shallower than the accumulated offset is a hard error
/// (the reconciler mis-identified the entry); an unresolvable formal type
/// yields `Ok(None)` and the frame simply carries no arguments.
pub fn decode_fun_args(
    formals: &[ParamDesc],
    stack_depth: usize,
) -> Result<Option<Vec<DecodedArg>>> {
    let mut args = Vec::with_capacity(formals.len());

    let mut offset_from_top: isize = -1;
    for formal in formals.iter().rev() {
        let Some(identifier) = formal.ty.type_identifier.as_deref() else {
            return Ok(None);
        };

        offset_from_top += calldata_slot_count(identifier) as isize;
        ensure!(
            (offset_from_top as usize) < stack_depth,
            "stack underflow while decoding argument {} (needs depth {}, stack has {})",
            formal.name,
            offset_from_top + 1,
            stack_depth
        );

        args.push(DecodedArg {
            name: formal.name.clone(),
            view: Some(DataView {
                ty: formal.ty.type_string.clone().unwrap_or_default(),
                original_ty: None,
                loc: DataLocation::Stack { offset_from_top: offset_from_top as usize },
            }),
        });
    }

    args.reverse();
    Ok(Some(args))
}
