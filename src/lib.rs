/// Ignis - Bytecode Metadata and Handler Dispatch Library
///
/// This library describes the instruction set of a register-based,
/// accumulator-oriented bytecode interpreter and builds the table of handlers
/// the interpreter dispatches through.
///
/// # Architecture
///
/// The library consists of three main parts:
///
/// 1. **Bytecode Metadata** (`bytecode` module)
///    - One descriptor per bytecode: operand types, accumulator use, kind
///    - Sizes and operand offsets at every operand scale, computed at compile time
///    - Prefix resolution (`Wide`, `ExtraWide`) and minimal-scale encoding
///    - Classification predicates and same-size debug-break substitution
///
/// 2. **Handler Dispatch** (`dispatch` module)
///    - Fixed slot layout for every (bytecode, scale) pair and native routine
///    - Placeholder, fill and finalize phases with reference verification
///    - Sequential or rayon-parallel generation, one-time publication
///
/// 3. **Native Handlers** (`jit` module, `jit` feature)
///    - Cranelift generator producing one native function per slot
///
/// # Example
///
/// ```rust
/// use ignis::bytecode::{debug_break, Bytecode, BytecodeWriter, OperandScale};
/// use ignis::dispatch::DispatchLayout;
///
/// let mut writer = BytecodeWriter::new();
/// writer.emit(Bytecode::LdaSmi, &[300]).unwrap();
/// writer.emit(Bytecode::Return, &[]).unwrap();
///
/// let listing = ignis::bytecode::format_listing(writer.as_bytes()).unwrap();
/// assert!(listing.contains("LdaSmi.Wide"));
///
/// // Breakpoints never change instruction size
/// let brk = debug_break(Bytecode::Add).unwrap();
/// assert_eq!(brk.size(OperandScale::Single), Bytecode::Add.size(OperandScale::Single));
///
/// let layout = DispatchLayout::new();
/// assert!(layout.index_of(Bytecode::Return, OperandScale::Double).is_none());
/// ```
pub mod bytecode;
pub mod config;
pub mod dispatch;
#[cfg(feature = "jit")]
pub mod jit;

pub use bytecode::{
    Bytecode, BytecodeError, BytecodeResult, MalformedStream, OperandScale, OperandType,
    ResolvedBytecode,
};
pub use config::{BuildConfig, ConfigError, OptLevel};
pub use dispatch::{
    build_handler_table, build_handler_table_parallel, DispatchError, DispatchLayout,
    HandlerIndex, HandlerTable, HandlerTableCell,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_valid() {
        assert!(bytecode::schema::validate_schema().is_ok());
    }

    #[test]
    fn test_layout_covers_every_bytecode() {
        let layout = DispatchLayout::new();
        for bc in Bytecode::iter() {
            assert!(layout.index_of(bc, OperandScale::Single).is_some());
        }
    }

    #[test]
    fn test_writer_to_listing() {
        let mut writer = bytecode::BytecodeWriter::new();
        writer.emit(Bytecode::Add, &[3, 0x1234]).unwrap();
        writer.emit(Bytecode::Nop, &[]).unwrap();
        let listing = bytecode::format_listing(writer.as_bytes()).unwrap();
        assert_eq!(listing.lines().count(), 2);
    }
}
