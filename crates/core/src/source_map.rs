//! Program-counter to source-location resolution.

use std::fmt;

use foundry_compilers::artifacts::sourcemap::Jump;

use crate::{artifact::ast::AstNodeHandle, frame::Frame};

/// A decoded compiler source location: a byte span in one of the compilation
/// sources, plus the jump annotation of the instruction it was decoded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SrcLocation {
    pub start: usize,
    pub length: usize,
    /// Source file index; `None` for compiler-generated code.
    pub index: Option<u32>,
    pub jump: Jump,
}

impl SrcLocation {
    /// Canonical `"start:length:index"` key, the format under which AST nodes
    /// are indexed (a missing source index renders as `-1`).
    pub fn key(&self) -> String {
        match self.index {
            Some(index) => format!("{}:{}:{}", self.start, self.length, index),
            None => format!("{}:{}:-1", self.start, self.length),
        }
    }
}

impl fmt::Display for SrcLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Decodes the source location and AST node for `pc` within an external
/// frame.
///
/// Creation frames resolve against the creation-bytecode source map, call
/// frames against the deployed-bytecode one. Every failure mode (no contract
/// info, PC outside the instruction table, no AST node at the span) yields
/// `None` rather than an error; missing debug info must never abort a trace.
pub fn decode_source_loc(pc: usize, frame: &Frame) -> (Option<SrcLocation>, Option<AstNodeHandle>) {
    let Some(info) = frame.info() else { return (None, None) };

    let bytecode = if frame.is_creation() { &info.bytecode } else { &info.deployed_bytecode };
    let src = bytecode.src_at(pc);
    let node = src.as_ref().and_then(|src| info.ast.node_at(src)).cloned();

    (src, node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_src_key() {
        let src = SrcLocation { start: 40, length: 30, index: Some(0), jump: Jump::Regular };
        assert_eq!(src.key(), "40:30:0");

        let generated = SrcLocation { start: 7, length: 2, index: None, jump: Jump::In };
        assert_eq!(generated.key(), "7:2:-1");
    }
}
