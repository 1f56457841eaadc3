//! Operand scale resolution over raw bytecode streams
//!
//! An instruction is an optional scaling prefix, an opcode byte and the
//! operands. Without a prefix every scalable operand has its base width; after
//! `Wide` or `ExtraWide` they are two or four times wider, for that one
//! instruction only.
//!
//! ```text
//!   offset  bytes                    resolved
//!   0       Add r3 [7]               Add             Single     3 bytes
//!   3       Wide Add r3 [0x1234]     Add.Wide        Double     1 + 4 bytes
//!   8       ExtraWide Add r3 [..]    Add.ExtraWide   Quadruple  1 + 6 bytes
//! ```
//!
//! Consecutive prefixes are tolerated: every prefix but the last resolves as a
//! standalone one-byte unit flagged `redundant_prefix`. A prefix in front of a
//! bytecode with no scalable operand is a malformed stream. The debug-break
//! forms patched over a prefix keep scaling the instruction that follows.

use super::bytecodes::{Bytecode, BytecodeKind};
use super::error::{BytecodeResult, MalformedStream};
use super::operands::{OperandScale, OperandSize, OperandType};

/// Prefix bytecode that selects `scale`, `None` for `Single`
pub const fn prefix_for_scale(scale: OperandScale) -> Option<Bytecode> {
    match scale {
        OperandScale::Single => None,
        OperandScale::Double => Some(Bytecode::Wide),
        OperandScale::Quadruple => Some(Bytecode::ExtraWide),
    }
}

/// Scale selected by a prefix bytecode, `None` for every other bytecode
pub const fn scale_for_prefix(bytecode: Bytecode) -> Option<OperandScale> {
    bytecode.prefix_scale()
}

/// Scale applied to the next instruction by a prefix or a prefix's debug break
pub const fn scaling_prefix(bytecode: Bytecode) -> Option<OperandScale> {
    match bytecode.kind() {
        BytecodeKind::Prefix(scale) | BytecodeKind::DebugBreak(Some(scale)) => Some(scale),
        _ => None,
    }
}

/// One decoded instruction position within a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBytecode {
    /// Offset of the first byte (the prefix, if any)
    pub offset: usize,
    /// Prefix byte in front of the opcode, if any
    pub prefix: Option<Bytecode>,
    pub bytecode: Bytecode,
    pub scale: OperandScale,
    /// This unit is a prefix immediately followed by another prefix
    pub redundant_prefix: bool,
}

impl ResolvedBytecode {
    /// Number of prefix bytes in front of the opcode (0 or 1)
    #[inline]
    pub fn prefix_len(&self) -> usize {
        usize::from(self.prefix.is_some())
    }

    /// Offset of the opcode byte
    #[inline]
    pub fn opcode_offset(&self) -> usize {
        self.offset + self.prefix_len()
    }

    /// Effective length, prefix included
    #[inline]
    pub fn total_size(&self) -> usize {
        self.prefix_len() + self.bytecode.size(self.scale)
    }

    /// Offset of the next instruction
    #[inline]
    pub fn next_offset(&self) -> usize {
        self.offset + self.total_size()
    }

    pub fn operand_count(&self) -> usize {
        self.bytecode.operand_count()
    }

    pub fn operand_type(&self, i: usize) -> OperandType {
        self.bytecode.operand_type(i)
    }

    /// Absolute stream offset of operand `i`
    pub fn operand_offset(&self, i: usize) -> usize {
        self.opcode_offset() + self.bytecode.operand_offset(i, self.scale)
    }

    /// Width of operand `i` at the resolved scale
    pub fn operand_size(&self, i: usize) -> OperandSize {
        self.bytecode.operand_size(i, self.scale)
    }

    /// Name with scale suffix, e.g. `"Add.Wide"`
    pub fn scaled_name(&self) -> String {
        self.bytecode.to_string_with_scale(self.scale)
    }
}

fn decode_byte(code: &[u8], offset: usize) -> Result<Bytecode, MalformedStream> {
    let byte = *code.get(offset).ok_or(MalformedStream::Truncated {
        offset,
        needed: 1,
        available: 0,
    })?;
    Bytecode::from_byte(byte).ok_or(MalformedStream::UnknownOpcode { offset, byte })
}

fn ensure_available(
    code: &[u8],
    offset: usize,
    needed: usize,
) -> Result<(), MalformedStream> {
    let available = code.len().saturating_sub(offset);
    if available < needed {
        return Err(MalformedStream::Truncated {
            offset,
            needed,
            available,
        });
    }
    Ok(())
}

/// Resolve the instruction starting at `offset`
pub fn resolve_at(code: &[u8], offset: usize) -> BytecodeResult<ResolvedBytecode> {
    let first = decode_byte(code, offset)?;

    let Some(scale) = scaling_prefix(first) else {
        ensure_available(code, offset, first.size(OperandScale::Single))?;
        return Ok(ResolvedBytecode {
            offset,
            prefix: None,
            bytecode: first,
            scale: OperandScale::Single,
            redundant_prefix: false,
        });
    };

    ensure_available(code, offset, 2)?;
    let next = decode_byte(code, offset + 1)?;

    if scaling_prefix(next).is_some() {
        // Superseded by the prefix that follows
        return Ok(ResolvedBytecode {
            offset,
            prefix: None,
            bytecode: first,
            scale: OperandScale::Single,
            redundant_prefix: true,
        });
    }

    if !next.has_scalable_operands() {
        return Err(MalformedStream::OrphanedPrefix {
            offset,
            prefix: first,
            bytecode: next,
        }
        .into());
    }

    ensure_available(code, offset, 1 + next.size(scale))?;
    Ok(ResolvedBytecode {
        offset,
        prefix: Some(first),
        bytecode: next,
        scale,
        redundant_prefix: false,
    })
}

/// Walks a bytecode stream instruction by instruction.
///
/// Yields an error once and then stops if the stream is malformed.
#[derive(Debug, Clone)]
pub struct BytecodeIterator<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> BytecodeIterator<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            offset: 0,
            failed: false,
        }
    }

    /// Offset of the next instruction to resolve
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for BytecodeIterator<'_> {
    type Item = BytecodeResult<ResolvedBytecode>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        match resolve_at(self.code, self.offset) {
            Ok(resolved) => {
                self.offset = resolved.next_offset();
                Some(Ok(resolved))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
