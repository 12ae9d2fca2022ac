//! Compile-time metadata for a single contract.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use alloy_primitives::Bytes;
use eyre::{eyre, Result};
use foundry_compilers::artifacts::{
    sourcemap::{self, SourceMap},
    Ast,
};

use crate::{abi::AbiEncoderVersion, artifact::ast::AstIndex, source_map::SrcLocation, utils::opcode::PcIcMap};

/// One source unit of the compilation.
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub code: Arc<String>,
    pub ast: Ast,
}

/// A bytecode blob with its source map, indexed for per-PC lookups.
#[derive(Clone, Debug)]
pub struct BytecodeInfo {
    pub code: Bytes,
    pub source_map: SourceMap,
    pub pc_ic_map: PcIcMap,
}

impl BytecodeInfo {
    pub fn new(code: Bytes, source_map: &str) -> Result<Self> {
        let source_map =
            sourcemap::parse(source_map).map_err(|err| eyre!("invalid source map: {err}"))?;
        let pc_ic_map = PcIcMap::new(&code);

        Ok(Self { code, source_map, pc_ic_map })
    }

    /// The source location of the instruction at `pc`, or `None` when the PC
    /// is not an instruction boundary or the source map is shorter than the
    /// code.
    pub fn src_at(&self, pc: usize) -> Option<SrcLocation> {
        let ic = self.pc_ic_map.get(pc)?;
        let element = self.source_map.get(ic)?;

        Some(SrcLocation {
            start: element.offset() as usize,
            length: element.length() as usize,
            index: element.index(),
            jump: element.jump(),
        })
    }
}

/// Compile-time metadata of one contract: creation and deployed bytecode with
/// their source maps, the indexed AST, and the ABI encoder version in effect.
#[derive(Clone, Debug)]
pub struct ContractInfo {
    pub name: String,
    /// Creation (constructor) bytecode.
    pub bytecode: BytecodeInfo,
    pub deployed_bytecode: BytecodeInfo,
    pub ast: AstIndex,
    pub encoder_version: AbiEncoderVersion,
    pub sources: BTreeMap<u32, SourceFile>,
}

impl ContractInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        sources: BTreeMap<u32, SourceFile>,
        bytecode: Bytes,
        source_map: &str,
        deployed_bytecode: Bytes,
        deployed_source_map: &str,
        encoder_version: AbiEncoderVersion,
    ) -> Result<Self> {
        let name = name.into();
        let ast = AstIndex::from_sources(&name, sources.values().map(|source| &source.ast));

        Ok(Self {
            name,
            bytecode: BytecodeInfo::new(bytecode, source_map)?,
            deployed_bytecode: BytecodeInfo::new(deployed_bytecode, deployed_source_map)?,
            ast,
            encoder_version,
            sources,
        })
    }
}
