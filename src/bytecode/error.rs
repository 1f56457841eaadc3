//! Bytecode error types.
//!
//! This module defines [`BytecodeError`] and [`BytecodeResult`] for stream
//! decoding, encoding and breakpoint substitution.

use std::fmt;

use super::bytecodes::Bytecode;
use super::operands::OperandType;

/// A bytecode stream that cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedStream {
    /// Scaling prefix followed by a bytecode without scalable operands
    OrphanedPrefix {
        offset: usize,
        prefix: Bytecode,
        bytecode: Bytecode,
    },

    /// Byte does not name any bytecode
    UnknownOpcode { offset: usize, byte: u8 },

    /// Instruction extends past the end of the stream
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

impl MalformedStream {
    /// Stream offset where decoding failed
    pub fn offset(&self) -> usize {
        match self {
            MalformedStream::OrphanedPrefix { offset, .. }
            | MalformedStream::UnknownOpcode { offset, .. }
            | MalformedStream::Truncated { offset, .. } => *offset,
        }
    }
}

impl fmt::Display for MalformedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedStream::OrphanedPrefix {
                offset,
                prefix,
                bytecode,
            } => write!(
                f,
                "Orphaned prefix {} at offset {}: {} has no scalable operands",
                prefix, offset, bytecode
            ),
            MalformedStream::UnknownOpcode { offset, byte } => {
                write!(f, "Unknown opcode {:#04x} at offset {}", byte, offset)
            }
            MalformedStream::Truncated {
                offset,
                needed,
                available,
            } => write!(
                f,
                "Truncated instruction at offset {}: needs {} bytes, {} available",
                offset, needed, available
            ),
        }
    }
}

/// Error types for bytecode decoding and encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    /// Stream could not be decoded
    Malformed(MalformedStream),

    /// Breakpoint substitution applied to a breakpoint form
    NestedBreakpoint(Bytecode),

    /// Wrong number of operand values for a bytecode
    OperandCount {
        bytecode: Bytecode,
        expected: usize,
        actual: usize,
    },

    /// Operand value does not fit its operand type at any scale
    OperandOutOfRange {
        bytecode: Bytecode,
        index: usize,
        operand: OperandType,
        value: i64,
    },

    /// Offset falls inside an instruction rather than at its first byte
    NotInstructionStart { offset: usize, start: usize },

    /// No bytecode with this name
    UnknownName(String),
}

impl fmt::Display for BytecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BytecodeError::Malformed(err) => write!(f, "Malformed bytecode: {}", err),
            BytecodeError::NestedBreakpoint(bc) => {
                write!(f, "Cannot place a breakpoint over {}", bc)
            }
            BytecodeError::OperandCount {
                bytecode,
                expected,
                actual,
            } => write!(
                f,
                "{} takes {} operands, got {}",
                bytecode, expected, actual
            ),
            BytecodeError::OperandOutOfRange {
                bytecode,
                index,
                operand,
                value,
            } => write!(
                f,
                "Operand {} of {} ({}) out of range: {}",
                index, bytecode, operand, value
            ),
            BytecodeError::NotInstructionStart { offset, start } => write!(
                f,
                "Offset {} is inside the instruction starting at {}",
                offset, start
            ),
            BytecodeError::UnknownName(name) => write!(f, "Unknown bytecode: {}", name),
        }
    }
}

impl std::error::Error for BytecodeError {}

impl From<MalformedStream> for BytecodeError {
    fn from(err: MalformedStream) -> Self {
        BytecodeError::Malformed(err)
    }
}

/// Result type for bytecode operations
pub type BytecodeResult<T> = Result<T, BytecodeError>;
