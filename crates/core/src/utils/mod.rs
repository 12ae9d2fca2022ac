//! Utils

pub mod evm;
pub mod opcode;

use alloy_primitives::{Bytes, U256};

/// Converts a stack word to `usize`, saturating on overflow.
#[inline]
pub(crate) fn to_usize_saturated(value: U256) -> usize {
    if value > U256::from(usize::MAX) {
        usize::MAX
    } else {
        value.to::<usize>()
    }
}

/// Reads `size` bytes of linear memory starting at `offset`.
///
/// Regions beyond the materialized buffer read as zero, matching the EVM's
/// zero-extension semantics for not-yet-expanded memory.
pub(crate) fn mem_slice(memory: &[u8], offset: usize, size: usize) -> Bytes {
    if size == 0 {
        return Bytes::new();
    }

    let mut out = vec![0u8; size];
    if offset < memory.len() {
        let end = offset.saturating_add(size).min(memory.len());
        out[..end - offset].copy_from_slice(&memory[offset..end]);
    }
    out.into()
}
