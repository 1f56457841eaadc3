//! Operand decoding and textual disassembly
//!
//! ```text
//!    0  0b 03 07        Add r3, [7]
//!    3  00 0b 03 34 12  Add.Wide r3, [4660]
//!    8  9f 05           JumpIfTrue [5] (@13)
//! ```

use std::fmt;

use itertools::Itertools;
use smallvec::SmallVec;

use super::bytecodes::{Bytecode, MAX_OPERANDS};
use super::error::BytecodeResult;
use super::operands::OperandType;
use super::scale::{BytecodeIterator, ResolvedBytecode};

impl ResolvedBytecode {
    /// Read operand `i` out of `code`, sign- or zero-extended.
    ///
    /// `code` must be the stream this instruction was resolved from.
    pub fn operand_value(&self, code: &[u8], i: usize) -> i64 {
        let operand = self.operand_type(i);
        let offset = self.operand_offset(i);
        let width = self.operand_size(i).bytes();
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(&code[offset..offset + width]);
        let value = u64::from_le_bytes(raw);
        if operand.is_unsigned() || width == 0 {
            value as i64
        } else {
            let shift = 64 - (width as u32) * 8;
            ((value << shift) as i64) >> shift
        }
    }
}

/// A resolved instruction with its decoded operand values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub resolved: ResolvedBytecode,
    pub operands: SmallVec<[i64; MAX_OPERANDS]>,
    /// Raw bytes, prefix included
    pub bytes: SmallVec<[u8; 16]>,
}

impl Instruction {
    /// Decode the instruction `resolved` describes
    pub fn decode(code: &[u8], resolved: ResolvedBytecode) -> Self {
        let operands = (0..resolved.operand_count())
            .map(|i| resolved.operand_value(code, i))
            .collect();
        let bytes = code[resolved.offset..resolved.next_offset()]
            .iter()
            .copied()
            .collect();
        Self {
            resolved,
            operands,
            bytes,
        }
    }

    #[inline]
    pub fn bytecode(&self) -> Bytecode {
        self.resolved.bytecode
    }

    /// Absolute target of an immediate jump
    pub fn jump_target(&self) -> Option<usize> {
        let bytecode = self.bytecode();
        if !bytecode.is_jump_immediate() {
            return None;
        }
        let delta = usize::try_from(*self.operands.first()?).ok()?;
        if bytecode.is_backward_jump() {
            self.resolved.offset.checked_sub(delta)
        } else {
            self.resolved.offset.checked_add(delta)
        }
    }

    fn format_operands(&self) -> String {
        let types = self.bytecode().operand_types();
        let mut parts = Vec::with_capacity(types.len());
        let mut i = 0;
        while i < types.len() {
            let value = self.operands[i];
            match types[i] {
                OperandType::RegList | OperandType::RegOutList => {
                    // The count always follows a list
                    let count = self.operands.get(i + 1).copied().unwrap_or(0);
                    parts.push(match count {
                        0 => format!("r{}-r{}", value, value - 1),
                        _ => format!("r{}-r{}", value, value + count - 1),
                    });
                    i += 2;
                    continue;
                }
                op @ (OperandType::RegPair | OperandType::RegOutPair | OperandType::RegOutTriple) => {
                    let last = value + op.register_count() as i64 - 1;
                    parts.push(format!("r{}-r{}", value, last));
                }
                OperandType::Reg | OperandType::RegOut => parts.push(format!("r{}", value)),
                OperandType::Flag8 => parts.push(format!("#{}", value)),
                OperandType::RuntimeId => parts.push(format!("runtime:{}", value)),
                OperandType::IntrinsicId => parts.push(format!("intrinsic:{}", value)),
                _ => parts.push(format!("[{}]", value)),
            }
            i += 1;
        }
        parts.join(", ")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resolved.scaled_name())?;
        if self.resolved.redundant_prefix {
            return write!(f, " (redundant)");
        }
        if let Some(prefix) = self.resolved.prefix.filter(|p| p.is_debug_break()) {
            write!(f, " <{}>", prefix)?;
        }
        let operands = self.format_operands();
        if !operands.is_empty() {
            write!(f, " {}", operands)?;
        }
        if let Some(target) = self.jump_target() {
            write!(f, " (@{})", target)?;
        }
        Ok(())
    }
}

/// Decode every instruction of a stream
pub fn disassemble(code: &[u8]) -> BytecodeResult<Vec<Instruction>> {
    BytecodeIterator::new(code)
        .map(|resolved| resolved.map(|r| Instruction::decode(code, r)))
        .collect()
}

/// Render a stream as a listing with offsets and raw bytes
pub fn format_listing(code: &[u8]) -> BytecodeResult<String> {
    let instructions = disassemble(code)?;
    let hex_width = instructions
        .iter()
        .map(|ins| ins.bytes.len() * 3)
        .max()
        .unwrap_or(0);
    Ok(instructions
        .iter()
        .map(|ins| {
            let hex = ins.bytes.iter().map(|b| format!("{:02x}", b)).join(" ");
            format!(
                "{:>5}  {:<width$} {}",
                ins.resolved.offset,
                hex,
                ins,
                width = hex_width
            )
        })
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::writer::BytecodeWriter;

    #[test]
    fn test_operand_values_roundtrip_through_writer() {
        let mut w = BytecodeWriter::new();
        w.emit(Bytecode::LdaSmi, &[-5]).unwrap();
        w.emit(Bytecode::LdaSmi, &[-70_000]).unwrap();
        w.emit(Bytecode::Add, &[-3, 40_000]).unwrap();
        let ins = disassemble(w.as_bytes()).unwrap();
        assert_eq!(ins[0].operands.as_slice(), &[-5]);
        assert_eq!(ins[1].operands.as_slice(), &[-70_000]);
        assert_eq!(ins[2].operands.as_slice(), &[-3, 40_000]);
    }

    #[test]
    fn test_display() {
        let mut w = BytecodeWriter::new();
        w.emit(Bytecode::Add, &[3, 7]).unwrap();
        w.emit(Bytecode::Add, &[3, 0x1234]).unwrap();
        w.emit(Bytecode::CallProperty, &[1, 2, 3, 4]).unwrap();
        w.emit(Bytecode::Return, &[]).unwrap();
        let text: Vec<_> = disassemble(w.as_bytes())
            .unwrap()
            .iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(
            text,
            vec![
                "Add r3, [7]",
                "Add.Wide r3, [4660]",
                "CallProperty r1, r2-r4, [4]",
                "Return",
            ]
        );
    }

    #[test]
    fn test_jump_targets() {
        let mut w = BytecodeWriter::new();
        w.emit(Bytecode::Nop, &[]).unwrap();
        let jump = w.emit(Bytecode::JumpIfTrue, &[5]).unwrap();
        let back = w.emit(Bytecode::JumpLoop, &[3, 0]).unwrap();
        let ins = disassemble(w.as_bytes()).unwrap();
        assert_eq!(ins[1].jump_target(), Some(jump + 5));
        assert_eq!(ins[2].jump_target(), Some(back - 3));
        assert_eq!(ins[0].jump_target(), None);
        assert!(ins[1].to_string().ends_with("(@6)"));
    }

    #[test]
    fn test_listing() {
        let mut w = BytecodeWriter::new();
        w.emit(Bytecode::LdaZero, &[]).unwrap();
        w.emit(Bytecode::Star, &[2]).unwrap();
        let listing = format_listing(w.as_bytes()).unwrap();
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].trim_start().starts_with("0 "));
        assert!(lines[1].ends_with("Star r2"));
    }
}
