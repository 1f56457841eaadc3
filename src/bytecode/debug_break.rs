//! Debug-break substitution
//!
//! A breakpoint is set by overwriting an instruction's opcode byte in place
//! with a debug-break bytecode of the same size, so the operand bytes that
//! follow are consumed unchanged and the stream stays decodable. Scaling
//! prefixes get their own break forms, which keep the following instruction
//! scaled.

use std::fmt;

use tracing::trace;

use super::bytecodes::{Bytecode, BytecodeKind, DESCRIPTORS, SIZES};
use super::error::{BytecodeError, BytecodeResult};
use super::operands::OperandScale;
use super::schema::MAX_SINGLE_SIZE;

/// Size class a debug-break form stands in for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// Unprefixed instruction of this many bytes
    Plain(usize),
    /// The scaling prefix for this scale
    Prefix(OperandScale),
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeClass::Plain(size) => write!(f, "{} byte(s)", size),
            SizeClass::Prefix(scale) => write!(f, "{} prefix", scale),
        }
    }
}

/// Plain debug-break form per unscaled instruction size
const BREAK_BY_SIZE: [Option<Bytecode>; MAX_SINGLE_SIZE + 1] = compute_break_by_size();

const fn compute_break_by_size() -> [Option<Bytecode>; MAX_SINGLE_SIZE + 1] {
    let mut table = [None; MAX_SINGLE_SIZE + 1];
    let mut i = 0;
    while i < Bytecode::COUNT {
        if let BytecodeKind::DebugBreak(None) = DESCRIPTORS[i].kind {
            table[SIZES[i][0] as usize] = Some(Bytecode::ALL[i]);
        }
        i += 1;
    }
    table
}

/// Debug-break form for a prefix scale
const fn prefix_break(scale: OperandScale) -> Option<Bytecode> {
    let mut i = 0;
    while i < Bytecode::COUNT {
        if let BytecodeKind::DebugBreak(Some(s)) = DESCRIPTORS[i].kind {
            if s as u8 == scale as u8 {
                return Some(Bytecode::ALL[i]);
            }
        }
        i += 1;
    }
    None
}

const WIDE_BREAK: Bytecode = match prefix_break(OperandScale::Double) {
    Some(bytecode) => bytecode,
    None => panic!("no debug break for the Wide prefix"),
};
const EXTRA_WIDE_BREAK: Bytecode = match prefix_break(OperandScale::Quadruple) {
    Some(bytecode) => bytecode,
    None => panic!("no debug break for the ExtraWide prefix"),
};

/// Same-size debug-break bytecode to patch over `bytecode`.
///
/// Fails with [`BytecodeError::NestedBreakpoint`] when `bytecode` already is a
/// break form.
pub fn debug_break(bytecode: Bytecode) -> BytecodeResult<Bytecode> {
    if bytecode.is_debug_break() {
        return Err(BytecodeError::NestedBreakpoint(bytecode));
    }
    let replacement = match bytecode.prefix_scale() {
        Some(OperandScale::Double) => WIDE_BREAK,
        Some(OperandScale::Quadruple) => EXTRA_WIDE_BREAK,
        Some(OperandScale::Single) | None => {
            let size = bytecode.size(OperandScale::Single);
            match BREAK_BY_SIZE[size] {
                Some(replacement) => replacement,
                // Size coverage is part of the compile-time schema check
                None => unreachable!("no debug break of size {}", size),
            }
        }
    };
    trace!(
        target: "ignis::bytecode::debug_break",
        original = %bytecode,
        replacement = %replacement,
        "Selected debug break"
    );
    Ok(replacement)
}

/// Size class a debug-break form replaces, `None` for other bytecodes
pub fn original_size_class(bytecode: Bytecode) -> Option<SizeClass> {
    match bytecode.kind() {
        BytecodeKind::DebugBreak(Some(scale)) => Some(SizeClass::Prefix(scale)),
        BytecodeKind::DebugBreak(None) => Some(SizeClass::Plain(bytecode.size(OperandScale::Single))),
        _ => None,
    }
}

/// Debug-break form that replaces a given size class
pub fn debug_break_for_size_class(class: SizeClass) -> Option<Bytecode> {
    match class {
        SizeClass::Plain(size) => BREAK_BY_SIZE.get(size).copied().flatten(),
        SizeClass::Prefix(OperandScale::Double) => Some(WIDE_BREAK),
        SizeClass::Prefix(OperandScale::Quadruple) => Some(EXTRA_WIDE_BREAK),
        SizeClass::Prefix(OperandScale::Single) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_bytecode_has_same_size_break() {
        for bc in Bytecode::iter().filter(|bc| !bc.is_debug_break()) {
            let brk = debug_break(bc).unwrap();
            assert!(brk.is_debug_break());
            if !bc.is_prefix() {
                assert_eq!(
                    brk.size(OperandScale::Single),
                    bc.size(OperandScale::Single),
                    "{} -> {}",
                    bc,
                    brk
                );
            }
        }
    }

    #[test]
    fn test_prefix_breaks() {
        assert_eq!(debug_break(Bytecode::Wide), Ok(Bytecode::DebugBreakWide));
        assert_eq!(debug_break(Bytecode::ExtraWide), Ok(Bytecode::DebugBreakExtraWide));
        assert_eq!(
            original_size_class(Bytecode::DebugBreakWide),
            Some(SizeClass::Prefix(OperandScale::Double))
        );
    }

    #[test]
    fn test_known_sizes() {
        assert_eq!(debug_break(Bytecode::Return), Ok(Bytecode::DebugBreak0));
        assert_eq!(debug_break(Bytecode::Nop), Ok(Bytecode::DebugBreak0));
        assert_eq!(debug_break(Bytecode::Add), Ok(Bytecode::DebugBreak2));
        assert_eq!(debug_break(Bytecode::CallProperty2), Ok(Bytecode::DebugBreak5));
        assert_eq!(original_size_class(Bytecode::DebugBreak2), Some(SizeClass::Plain(3)));
        assert_eq!(original_size_class(Bytecode::Add), None);
    }

    #[test]
    fn test_nested_breakpoint_rejected() {
        assert_eq!(
            debug_break(Bytecode::DebugBreak1),
            Err(BytecodeError::NestedBreakpoint(Bytecode::DebugBreak1))
        );
        assert!(debug_break(Bytecode::DebugBreakWide).is_err());
    }

    #[test]
    fn test_size_class_inverse() {
        for bc in Bytecode::iter().filter(|bc| bc.is_debug_break()) {
            let class = original_size_class(bc).unwrap();
            assert_eq!(debug_break_for_size_class(class), Some(bc));
        }
        assert_eq!(debug_break_for_size_class(SizeClass::Plain(99)), None);
    }
}
