//! Bytecode Metadata Module
//!
//! Instruction-set metadata for a register-based, accumulator-oriented
//! bytecode VM: operand encodings, the bytecode table, operand scaling,
//! classification and debug-break substitution.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 Operand table (operands)                          │
//! │       OperandType → scalable / unsigned / base width              │
//! └───────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 Bytecode table (bytecodes)                        │
//! │   Bytecode → operands, accumulator use, kind                      │
//! │   const-derived: size and operand offsets per scale               │
//! │   const-checked: group contiguity, break coverage (schema)        │
//! └───────────────────────────────────────────────────────────────────┘
//!              │                    │                    │
//!              ▼                    ▼                    ▼
//! ┌──────────────────┐  ┌────────────────────┐  ┌────────────────────┐
//! │ classify         │  │ scale / writer /   │  │ debug_break        │
//! │ jump, accumulator│  │ disasm             │  │ same-size breaks   │
//! │ side effects     │  │ stream encoding    │  │                    │
//! └──────────────────┘  └────────────────────┘  └────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`operands`]: Operand types, scales and accumulator use
//! - [`bytecodes`]: Bytecode enumeration and descriptor table
//! - [`schema`]: Compile-time structural checks and group ranges
//! - [`classify`]: Classification predicates
//! - [`scale`]: Prefix and operand-scale resolution
//! - [`writer`]: Minimal-scale instruction encoding
//! - [`disasm`]: Operand decoding and listings
//! - [`debug_break`]: Breakpoint substitution
//!
//! # Example
//!
//! ```
//! use ignis::bytecode::{Bytecode, BytecodeWriter, OperandScale, resolve_at};
//!
//! let mut writer = BytecodeWriter::new();
//! writer.emit(Bytecode::Add, &[3, 0x1234]).unwrap();
//!
//! let resolved = resolve_at(writer.as_bytes(), 0).unwrap();
//! assert_eq!(resolved.bytecode, Bytecode::Add);
//! assert_eq!(resolved.scale, OperandScale::Double);
//! assert_eq!(resolved.total_size(), 5);
//! ```

pub mod bytecodes;
pub mod classify;
pub mod debug_break;
pub mod disasm;
pub mod error;
pub mod operands;
pub mod scale;
pub mod schema;
pub mod writer;

pub use bytecodes::{
    Bytecode, BytecodeDescriptor, BytecodeKind, JumpCondition, JumpDirection, JumpInfo,
    JumpTarget, MAX_OPERANDS,
};
pub use debug_break::{debug_break, debug_break_for_size_class, original_size_class, SizeClass};
pub use disasm::{disassemble, format_listing, Instruction};
pub use error::{BytecodeError, BytecodeResult, MalformedStream};
pub use operands::{
    scale_for_signed_operand, scale_for_unsigned_operand, AccumulatorUse, OperandScale,
    OperandSize, OperandType, OperandTypeInfo,
};
pub use scale::{
    prefix_for_scale, resolve_at, scale_for_prefix, scaling_prefix, BytecodeIterator,
    ResolvedBytecode,
};
pub use schema::{validate_schema, BytecodeGroup, SchemaViolation, MAX_SINGLE_SIZE};
pub use writer::BytecodeWriter;

/// Largest operand count of any bytecode
pub fn max_operand_count() -> usize {
    Bytecode::iter().map(Bytecode::operand_count).max().unwrap_or(0)
}
