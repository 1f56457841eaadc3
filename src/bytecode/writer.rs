//! Bytecode stream writer
//!
//! Encodes instructions with the smallest operand scale that holds every
//! operand value and emits the matching prefix. Operands are little-endian;
//! signed operands are two's complement.

use tracing::trace;

use super::bytecodes::Bytecode;
use super::debug_break::debug_break;
use super::error::{BytecodeError, BytecodeResult, MalformedStream};
use super::operands::{
    scale_for_signed_operand, scale_for_unsigned_operand, OperandScale, OperandType,
};
use super::scale::{prefix_for_scale, BytecodeIterator, ResolvedBytecode};

/// True if `value` can be encoded in `width` bytes for this operand type
fn fits(operand: OperandType, width: usize, value: i64) -> bool {
    let bits = (width * 8) as u32;
    if operand.is_unsigned() {
        value >= 0 && (bits >= 63 || value < (1i64 << bits))
    } else {
        let bound = 1i64 << (bits - 1);
        value >= -bound && value < bound
    }
}

/// Scale an operand value needs, before range checking
fn required_scale(operand: OperandType, value: i64) -> OperandScale {
    if !operand.is_scalable() {
        return OperandScale::Single;
    }
    if operand.is_unsigned() {
        scale_for_unsigned_operand(value.max(0) as u64)
    } else {
        scale_for_signed_operand(value)
    }
}

/// Growable bytecode stream
#[derive(Debug, Clone, Default)]
pub struct BytecodeWriter {
    code: Vec<u8>,
}

impl BytecodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
        }
    }

    /// Continue an existing stream
    pub fn from_bytes(code: Vec<u8>) -> Self {
        Self { code }
    }

    /// Offset the next instruction will be written at
    #[inline]
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.code
    }

    /// Emit `bytecode` at the smallest scale that holds `operands`.
    ///
    /// Returns the offset of the instruction (its prefix, if any).
    pub fn emit(&mut self, bytecode: Bytecode, operands: &[i64]) -> BytecodeResult<usize> {
        self.check_operand_count(bytecode, operands)?;
        let scale = bytecode
            .operand_types()
            .iter()
            .zip(operands)
            .map(|(&op, &value)| required_scale(op, value))
            .max()
            .unwrap_or(OperandScale::Single);
        self.emit_scaled(bytecode, scale, operands)
    }

    /// Emit `bytecode` at an explicit scale
    pub fn emit_scaled(
        &mut self,
        bytecode: Bytecode,
        scale: OperandScale,
        operands: &[i64],
    ) -> BytecodeResult<usize> {
        self.check_operand_count(bytecode, operands)?;
        let start = self.offset();

        if scale != OperandScale::Single && !bytecode.has_scalable_operands() {
            if let Some(prefix) = prefix_for_scale(scale) {
                return Err(MalformedStream::OrphanedPrefix {
                    offset: start,
                    prefix,
                    bytecode,
                }
                .into());
            }
        }

        for (index, (&operand, &value)) in bytecode.operand_types().iter().zip(operands).enumerate()
        {
            if !fits(operand, operand.width(scale), value) {
                return Err(BytecodeError::OperandOutOfRange {
                    bytecode,
                    index,
                    operand,
                    value,
                });
            }
        }

        if let Some(prefix) = prefix_for_scale(scale) {
            self.code.push(prefix.to_byte());
        }
        self.code.push(bytecode.to_byte());
        for (&operand, &value) in bytecode.operand_types().iter().zip(operands) {
            let width = operand.width(scale);
            self.code
                .extend_from_slice(&(value as u64).to_le_bytes()[..width]);
        }

        trace!(
            target: "ignis::bytecode::writer",
            offset = start,
            bytecode = %bytecode.to_string_with_scale(scale),
            size = self.offset() - start,
            "Emitted instruction"
        );
        Ok(start)
    }

    /// Instruction that starts exactly at `offset`
    fn instruction_at(&self, offset: usize) -> BytecodeResult<ResolvedBytecode> {
        for unit in BytecodeIterator::new(&self.code) {
            let unit = unit?;
            if unit.offset == offset {
                return Ok(unit);
            }
            if unit.next_offset() > offset {
                return Err(BytecodeError::NotInstructionStart {
                    offset,
                    start: unit.offset,
                });
            }
        }
        Err(MalformedStream::Truncated {
            offset,
            needed: 1,
            available: 0,
        }
        .into())
    }

    /// Patch a breakpoint over the instruction at `offset`.
    ///
    /// `offset` must be the first byte of an instruction (its prefix, if any).
    /// Returns the bytecode that was replaced so the caller can restore it.
    pub fn set_breakpoint(&mut self, offset: usize) -> BytecodeResult<Bytecode> {
        let resolved = self.instruction_at(offset)?;
        let original = resolved.prefix.unwrap_or(resolved.bytecode);
        let replacement = debug_break(original)?;
        self.code[offset] = replacement.to_byte();
        Ok(original)
    }

    /// Undo [`BytecodeWriter::set_breakpoint`]
    pub fn clear_breakpoint(&mut self, offset: usize, original: Bytecode) -> BytecodeResult<()> {
        self.instruction_at(offset)?;
        self.code[offset] = original.to_byte();
        Ok(())
    }

    fn check_operand_count(&self, bytecode: Bytecode, operands: &[i64]) -> BytecodeResult<()> {
        if operands.len() != bytecode.operand_count() {
            return Err(BytecodeError::OperandCount {
                bytecode,
                expected: bytecode.operand_count(),
                actual: operands.len(),
            });
        }
        Ok(())
    }
}
