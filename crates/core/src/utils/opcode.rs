use revm::interpreter::{
    opcode::{LOG0, LOG4, PUSH0, PUSH1, PUSH32},
    OpCode,
};
use rustc_hash::FxHashMap;

/// Returns true if the opcode modifies memory.
/// <https://bluealloy.github.io/revm/crates/interpreter/memory.html#opcodes>
/// <https://github.com/crytic/evm-opcodes>
#[inline]
pub const fn modifies_memory(opcode: OpCode) -> bool {
    matches!(
        opcode,
        OpCode::EXTCODECOPY |
            OpCode::MLOAD |
            OpCode::MSTORE |
            OpCode::MSTORE8 |
            OpCode::MCOPY |
            OpCode::CODECOPY |
            OpCode::CALLDATACOPY |
            OpCode::RETURNDATACOPY |
            OpCode::CALL |
            OpCode::CALLCODE |
            OpCode::DELEGATECALL |
            OpCode::STATICCALL
    )
}

/// Returns true if the opcode writes to persistent storage.
#[inline]
pub const fn modifies_storage(opcode: OpCode) -> bool {
    matches!(opcode, OpCode::SSTORE)
}

/// Returns true if the opcode opens a new external call context.
#[inline]
pub const fn increases_depth(opcode: OpCode) -> bool {
    matches!(
        opcode,
        OpCode::CALL |
            OpCode::CALLCODE |
            OpCode::DELEGATECALL |
            OpCode::STATICCALL |
            OpCode::CREATE |
            OpCode::CREATE2
    )
}

/// Returns true if the opcode deploys a new contract.
#[inline]
pub const fn creates_contract(opcode: OpCode) -> bool {
    matches!(opcode, OpCode::CREATE | OpCode::CREATE2)
}

/// Returns the number of topics for LOG0..LOG4, or `None` for any other opcode.
#[inline]
pub fn log_topic_count(opcode: OpCode) -> Option<usize> {
    let byte = opcode.get();
    (LOG0..=LOG4).contains(&byte).then(|| (byte - LOG0) as usize)
}

/// Static (pre-dynamic-expansion) gas charged for the opcode.
pub const fn base_gas(opcode: OpCode) -> u64 {
    match opcode.get() {
        // STOP, RETURN, REVERT, INVALID
        0x00 | 0xf3 | 0xfd | 0xfe => 0,
        // JUMPDEST
        0x5b => 1,
        // ADDRESS, ORIGIN, CALLER, CALLVALUE, CALLDATASIZE, CODESIZE, GASPRICE,
        // RETURNDATASIZE, COINBASE, TIMESTAMP, NUMBER, PREVRANDAO, GASLIMIT,
        // CHAINID, BASEFEE, BLOBBASEFEE, POP, PC, MSIZE, GAS, PUSH0
        0x30 | 0x32..=0x34 | 0x36 | 0x38 | 0x3a | 0x3d | 0x41..=0x46 | 0x48 | 0x4a | 0x50 |
        0x58..=0x5a | 0x5f => 2,
        // ADD, SUB, NOT, LT, GT, SLT, SGT, EQ, ISZERO, AND, OR, XOR, BYTE,
        // SHL, SHR, SAR, CALLDATALOAD, CALLDATACOPY, CODECOPY, RETURNDATACOPY,
        // BLOBHASH, MLOAD, MSTORE, MSTORE8, MCOPY, PUSH1..PUSH32, DUPs, SWAPs
        0x01 | 0x03 | 0x10..=0x1d | 0x35 | 0x37 | 0x39 | 0x3e | 0x49 | 0x51..=0x53 | 0x5e |
        0x60..=0x9f => 3,
        // MUL, DIV, SDIV, MOD, SMOD, SIGNEXTEND, SELFBALANCE
        0x02 | 0x04..=0x07 | 0x0b | 0x47 => 5,
        // ADDMOD, MULMOD, JUMP
        0x08 | 0x09 | 0x56 => 8,
        // EXP, JUMPI
        0x0a | 0x57 => 10,
        // BLOCKHASH
        0x40 => 20,
        // KECCAK256
        0x20 => 30,
        // BALANCE, EXTCODESIZE, EXTCODECOPY, EXTCODEHASH, SLOAD, SSTORE,
        // TLOAD, TSTORE, CALL, CALLCODE, DELEGATECALL, STATICCALL
        0x31 | 0x3b | 0x3c | 0x3f | 0x54 | 0x55 | 0x5c | 0x5d | 0xf1 | 0xf2 | 0xf4 | 0xfa => 100,
        // LOG0..LOG4
        0xa0..=0xa4 => 375,
        // SELFDESTRUCT
        0xff => 5000,
        // CREATE, CREATE2
        0xf0 | 0xf5 => 32000,
        _ => 0,
    }
}

/// Maps from program counter to instruction counter.
///
/// PUSH-N instructions span `1 + N` bytes, so the two coordinates diverge as
/// soon as the code contains a push; compiler source maps are indexed by
/// instruction counter while the VM reports program counters.
#[derive(Debug, Clone)]
pub struct PcIcMap {
    inner: FxHashMap<usize, usize>,
}

impl PcIcMap {
    /// Creates a new `PcIcMap` for the given code.
    pub fn new(code: &[u8]) -> Self {
        let mut map = FxHashMap::default();

        let mut pc = 0;
        let mut cumulative_push_size = 0;
        while pc < code.len() {
            map.insert(pc, pc - cumulative_push_size);

            if (PUSH1..=PUSH32).contains(&code[pc]) {
                // Skip the push bytes.
                let push_size = (code[pc] - PUSH0) as usize;
                pc += push_size;
                cumulative_push_size += push_size;
            }

            pc += 1;
        }

        Self { inner: map }
    }

    /// Returns the length of the map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the instruction counter for the given program counter.
    pub fn get(&self, pc: usize) -> Option<usize> {
        self.inner.get(&pc).copied()
    }
}
