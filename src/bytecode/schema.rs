//! Compile-time schema check for the bytecode table
//!
//! The classifier answers range questions ("is this a forward jump?") from
//! per-descriptor data, but consumers such as the interpreter's dispatch
//! prologue rely on every classification group occupying one contiguous
//! ordinal range. [`check`] is a `const fn`; it runs once during compilation
//! (a violation fails the build) and is callable at runtime through
//! [`validate_schema`].
//!
//! ```text
//! ordinal:  Wide ExtraWide | DebugBreak* | ... | JumpLoop Jump JumpConstant JumpIf*Constant JumpIfToBoolean* JumpIf* | ...
//! group:    [-- Prefix --]   [DebugBreak]        [--------------------------- Jump -----------------------------]
//!                                                 [ Unconditional ]
//!                                                           [---------- JumpConstant ----------]
//!                                                                           [ -- JumpIfToBoolean -- ]
//! ```

use std::fmt;
use std::ops::RangeInclusive;

use tracing::debug;

use super::bytecodes::{
    Bytecode, BytecodeKind, JumpCondition, JumpDirection, JumpTarget, DESCRIPTORS, MAX_OPERANDS,
    SIZES,
};
use super::operands::{OperandScale, OperandType};

/// Ordinal groups that must be contiguous
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BytecodeGroup {
    /// Operand-scaling prefixes
    Prefix,
    /// All breakpoint forms
    DebugBreak,
    /// Every jump
    Jump,
    /// Jumps taken regardless of the accumulator
    UnconditionalJump,
    /// Every jump except the loop back-edge
    ForwardJump,
    /// Jumps whose offset lives in the constant pool
    JumpConstant,
    /// Conditional jumps whose offset lives in the constant pool
    ConditionalJumpConstant,
    /// Conditional jumps with an immediate offset
    ConditionalJumpImmediate,
    /// Jumps that coerce the accumulator to a boolean
    JumpIfToBoolean,
}

impl BytecodeGroup {
    pub const ALL: [BytecodeGroup; 9] = [
        BytecodeGroup::Prefix,
        BytecodeGroup::DebugBreak,
        BytecodeGroup::Jump,
        BytecodeGroup::UnconditionalJump,
        BytecodeGroup::ForwardJump,
        BytecodeGroup::JumpConstant,
        BytecodeGroup::ConditionalJumpConstant,
        BytecodeGroup::ConditionalJumpImmediate,
        BytecodeGroup::JumpIfToBoolean,
    ];

    pub const COUNT: usize = 9;

    const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            BytecodeGroup::Prefix => "Prefix",
            BytecodeGroup::DebugBreak => "DebugBreak",
            BytecodeGroup::Jump => "Jump",
            BytecodeGroup::UnconditionalJump => "UnconditionalJump",
            BytecodeGroup::ForwardJump => "ForwardJump",
            BytecodeGroup::JumpConstant => "JumpConstant",
            BytecodeGroup::ConditionalJumpConstant => "ConditionalJumpConstant",
            BytecodeGroup::ConditionalJumpImmediate => "ConditionalJumpImmediate",
            BytecodeGroup::JumpIfToBoolean => "JumpIfToBoolean",
        }
    }

    /// Group membership, decided from the descriptor's classification data
    pub const fn contains(self, bytecode: Bytecode) -> bool {
        kind_in_group(DESCRIPTORS[bytecode as usize].kind, self)
    }

    /// First member in ordinal order
    pub const fn first(self) -> Bytecode {
        Bytecode::ALL[GROUP_RANGES[self.index()].0 as usize]
    }

    /// Last member in ordinal order
    pub const fn last(self) -> Bytecode {
        Bytecode::ALL[GROUP_RANGES[self.index()].1 as usize]
    }

    /// Ordinal range covered by the group
    pub const fn range(self) -> RangeInclusive<u8> {
        let (first, last) = GROUP_RANGES[self.index()];
        RangeInclusive::new(first, last)
    }
}

impl fmt::Display for BytecodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const fn kind_in_group(kind: BytecodeKind, group: BytecodeGroup) -> bool {
    match group {
        BytecodeGroup::Prefix => matches!(kind, BytecodeKind::Prefix(_)),
        BytecodeGroup::DebugBreak => matches!(kind, BytecodeKind::DebugBreak(_)),
        BytecodeGroup::Jump => matches!(kind, BytecodeKind::Jump(_)),
        BytecodeGroup::UnconditionalJump => match kind {
            BytecodeKind::Jump(info) => matches!(info.condition, JumpCondition::Always),
            _ => false,
        },
        BytecodeGroup::ForwardJump => match kind {
            BytecodeKind::Jump(info) => matches!(info.direction, JumpDirection::Forward),
            _ => false,
        },
        BytecodeGroup::JumpConstant => match kind {
            BytecodeKind::Jump(info) => matches!(info.target, JumpTarget::Constant),
            _ => false,
        },
        BytecodeGroup::ConditionalJumpConstant => match kind {
            BytecodeKind::Jump(info) => {
                matches!(info.target, JumpTarget::Constant)
                    && !matches!(info.condition, JumpCondition::Always)
            }
            _ => false,
        },
        BytecodeGroup::ConditionalJumpImmediate => match kind {
            BytecodeKind::Jump(info) => {
                matches!(info.target, JumpTarget::Immediate)
                    && !matches!(info.condition, JumpCondition::Always)
            }
            _ => false,
        },
        BytecodeGroup::JumpIfToBoolean => match kind {
            BytecodeKind::Jump(info) => matches!(info.condition, JumpCondition::ToBoolean),
            _ => false,
        },
    }
}

/// First and last ordinal of every group
const GROUP_RANGES: [(u8, u8); BytecodeGroup::COUNT] = compute_group_ranges();

const fn compute_group_ranges() -> [(u8, u8); BytecodeGroup::COUNT] {
    let mut ranges = [(0u8, 0u8); BytecodeGroup::COUNT];
    let mut g = 0;
    while g < BytecodeGroup::COUNT {
        let group = BytecodeGroup::ALL[g];
        let mut first = usize::MAX;
        let mut last = 0;
        let mut i = 0;
        while i < Bytecode::COUNT {
            if kind_in_group(DESCRIPTORS[i].kind, group) {
                if first == usize::MAX {
                    first = i;
                }
                last = i;
            }
            i += 1;
        }
        // Empty groups are reported by `check`; leave the range degenerate
        if first != usize::MAX {
            ranges[g] = (first as u8, last as u8);
        }
        g += 1;
    }
    ranges
}

/// Largest unscaled instruction size in the table
pub const MAX_SINGLE_SIZE: usize = compute_max_single_size();

const fn compute_max_single_size() -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < Bytecode::COUNT {
        let size = SIZES[i][0] as usize;
        if size > max {
            max = size;
        }
        i += 1;
    }
    max
}

/// A structural rule the bytecode table breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaViolation {
    /// More bytecodes than fit in an opcode byte
    TooManyBytecodes,
    /// Descriptor stored at the wrong ordinal
    OrdinalMismatch { bytecode: Bytecode },
    TooManyOperands { bytecode: Bytecode },
    /// `OperandType::None` used inside an operand list
    NoneOperand { bytecode: Bytecode },
    /// Register list not followed by a `RegCount`
    UnterminatedRegisterList { bytecode: Bytecode },
    /// `RegCount` not preceded by a register list
    StrayRegisterCount { bytecode: Bytecode },
    /// Prefix with operands, accumulator use or a single scale
    MalformedPrefix { bytecode: Bytecode },
    /// No prefix (or more than one) for a non-single scale
    PrefixCoverage { scale: OperandScale },
    /// Jump offset operand does not match the jump target kind
    JumpTargetOperand { bytecode: Bytecode },
    /// Conditional jump that does not read the accumulator
    ConditionalJumpIgnoresAccumulator { bytecode: Bytecode },
    /// Backward jump that is conditional or constant-pool based
    MalformedBackwardJump { bytecode: Bytecode },
    /// Not exactly one backward jump
    BackwardJumpCount,
    /// Debug-break form with a scalable operand
    ScalableDebugBreak { bytecode: Bytecode },
    /// Two plain debug-break forms of the same size
    DuplicateDebugBreakSize { bytecode: Bytecode },
    /// An instruction size with no debug-break form
    MissingDebugBreakSize { bytecode: Bytecode },
    /// No debug-break form (or more than one) for a prefix scale
    PrefixDebugBreakCoverage { scale: OperandScale },
    EmptyGroup { group: BytecodeGroup },
    /// Group member outside the group's range, or non-member inside it
    NonContiguousGroup { group: BytecodeGroup, bytecode: Bytecode },
}

impl SchemaViolation {
    /// Static description, usable from const context
    pub const fn message(&self) -> &'static str {
        match self {
            SchemaViolation::TooManyBytecodes => "bytecode count exceeds the opcode byte range",
            SchemaViolation::OrdinalMismatch { .. } => "descriptor stored at the wrong ordinal",
            SchemaViolation::TooManyOperands { .. } => "bytecode has more than MAX_OPERANDS operands",
            SchemaViolation::NoneOperand { .. } => "operand list contains OperandType::None",
            SchemaViolation::UnterminatedRegisterList { .. } => {
                "register list is not followed by a register count"
            }
            SchemaViolation::StrayRegisterCount { .. } => {
                "register count is not preceded by a register list"
            }
            SchemaViolation::MalformedPrefix { .. } => {
                "prefix bytecode must have no operands, no accumulator use and a non-single scale"
            }
            SchemaViolation::PrefixCoverage { .. } => {
                "every non-single scale needs exactly one prefix bytecode"
            }
            SchemaViolation::JumpTargetOperand { .. } => {
                "jump offset operand must be UImm (immediate) or Idx (constant pool)"
            }
            SchemaViolation::ConditionalJumpIgnoresAccumulator { .. } => {
                "conditional jump must read the accumulator"
            }
            SchemaViolation::MalformedBackwardJump { .. } => {
                "backward jump must be unconditional with an immediate offset"
            }
            SchemaViolation::BackwardJumpCount => "table must contain exactly one backward jump",
            SchemaViolation::ScalableDebugBreak { .. } => {
                "debug-break form must not have scalable operands"
            }
            SchemaViolation::DuplicateDebugBreakSize { .. } => {
                "two debug-break forms share one instruction size"
            }
            SchemaViolation::MissingDebugBreakSize { .. } => {
                "instruction size has no same-size debug-break form"
            }
            SchemaViolation::PrefixDebugBreakCoverage { .. } => {
                "every prefix needs exactly one debug-break form"
            }
            SchemaViolation::EmptyGroup { .. } => "classification group has no members",
            SchemaViolation::NonContiguousGroup { .. } => {
                "classification group is not a contiguous ordinal range"
            }
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())?;
        match self {
            SchemaViolation::OrdinalMismatch { bytecode }
            | SchemaViolation::TooManyOperands { bytecode }
            | SchemaViolation::NoneOperand { bytecode }
            | SchemaViolation::UnterminatedRegisterList { bytecode }
            | SchemaViolation::StrayRegisterCount { bytecode }
            | SchemaViolation::MalformedPrefix { bytecode }
            | SchemaViolation::JumpTargetOperand { bytecode }
            | SchemaViolation::ConditionalJumpIgnoresAccumulator { bytecode }
            | SchemaViolation::MalformedBackwardJump { bytecode }
            | SchemaViolation::ScalableDebugBreak { bytecode }
            | SchemaViolation::DuplicateDebugBreakSize { bytecode }
            | SchemaViolation::MissingDebugBreakSize { bytecode } => {
                write!(f, " ({})", bytecode)
            }
            SchemaViolation::PrefixCoverage { scale }
            | SchemaViolation::PrefixDebugBreakCoverage { scale } => write!(f, " ({})", scale),
            SchemaViolation::EmptyGroup { group } => write!(f, " ({})", group),
            SchemaViolation::NonContiguousGroup { group, bytecode } => {
                write!(f, " ({} at {})", group, bytecode)
            }
            SchemaViolation::TooManyBytecodes | SchemaViolation::BackwardJumpCount => Ok(()),
        }
    }
}

impl std::error::Error for SchemaViolation {}

const fn check_operands(i: usize) -> Result<(), SchemaViolation> {
    let bytecode = Bytecode::ALL[i];
    let operands = DESCRIPTORS[i].operands;
    if operands.len() > MAX_OPERANDS {
        return Err(SchemaViolation::TooManyOperands { bytecode });
    }
    let mut j = 0;
    while j < operands.len() {
        let op = operands[j];
        if matches!(op, OperandType::None) {
            return Err(SchemaViolation::NoneOperand { bytecode });
        }
        if op.is_register_list()
            && !(j + 1 < operands.len() && matches!(operands[j + 1], OperandType::RegCount))
        {
            return Err(SchemaViolation::UnterminatedRegisterList { bytecode });
        }
        if matches!(op, OperandType::RegCount) && !(j > 0 && operands[j - 1].is_register_list()) {
            return Err(SchemaViolation::StrayRegisterCount { bytecode });
        }
        j += 1;
    }
    Ok(())
}

const fn check_prefixes() -> Result<(), SchemaViolation> {
    let mut double = 0;
    let mut quadruple = 0;
    let mut i = 0;
    while i < Bytecode::COUNT {
        let d = &DESCRIPTORS[i];
        if let BytecodeKind::Prefix(scale) = d.kind {
            if !d.operands.is_empty() || d.accumulator_use.bits() != 0 {
                return Err(SchemaViolation::MalformedPrefix { bytecode: d.bytecode });
            }
            match scale {
                OperandScale::Single => {
                    return Err(SchemaViolation::MalformedPrefix { bytecode: d.bytecode })
                }
                OperandScale::Double => double += 1,
                OperandScale::Quadruple => quadruple += 1,
            }
        }
        i += 1;
    }
    if double != 1 {
        return Err(SchemaViolation::PrefixCoverage { scale: OperandScale::Double });
    }
    if quadruple != 1 {
        return Err(SchemaViolation::PrefixCoverage { scale: OperandScale::Quadruple });
    }
    Ok(())
}

const fn check_jumps() -> Result<(), SchemaViolation> {
    let mut backward = 0;
    let mut i = 0;
    while i < Bytecode::COUNT {
        let d = &DESCRIPTORS[i];
        if let BytecodeKind::Jump(info) = d.kind {
            let expected = match info.target {
                JumpTarget::Immediate => OperandType::UImm,
                JumpTarget::Constant => OperandType::Idx,
            };
            if d.operands.is_empty() || d.operands[0] as u8 != expected as u8 {
                return Err(SchemaViolation::JumpTargetOperand { bytecode: d.bytecode });
            }
            let conditional = !matches!(info.condition, JumpCondition::Always);
            if conditional && !d.accumulator_use.reads() {
                return Err(SchemaViolation::ConditionalJumpIgnoresAccumulator {
                    bytecode: d.bytecode,
                });
            }
            if matches!(info.direction, JumpDirection::Backward) {
                if conditional || !matches!(info.target, JumpTarget::Immediate) {
                    return Err(SchemaViolation::MalformedBackwardJump { bytecode: d.bytecode });
                }
                backward += 1;
            }
        }
        i += 1;
    }
    if backward != 1 {
        return Err(SchemaViolation::BackwardJumpCount);
    }
    Ok(())
}

const fn check_debug_breaks() -> Result<(), SchemaViolation> {
    let mut seen = [false; MAX_SINGLE_SIZE + 1];
    let mut wide = 0;
    let mut extra_wide = 0;
    let mut i = 0;
    while i < Bytecode::COUNT {
        let d = &DESCRIPTORS[i];
        if let BytecodeKind::DebugBreak(prefix) = d.kind {
            if Bytecode::ALL[i].has_scalable_operands() {
                return Err(SchemaViolation::ScalableDebugBreak { bytecode: d.bytecode });
            }
            match prefix {
                Some(OperandScale::Double) => wide += 1,
                Some(OperandScale::Quadruple) => extra_wide += 1,
                Some(OperandScale::Single) => {
                    return Err(SchemaViolation::PrefixDebugBreakCoverage {
                        scale: OperandScale::Single,
                    })
                }
                None => {
                    let size = SIZES[i][0] as usize;
                    if seen[size] {
                        return Err(SchemaViolation::DuplicateDebugBreakSize {
                            bytecode: d.bytecode,
                        });
                    }
                    seen[size] = true;
                }
            }
        }
        i += 1;
    }
    if wide != 1 {
        return Err(SchemaViolation::PrefixDebugBreakCoverage { scale: OperandScale::Double });
    }
    if extra_wide != 1 {
        return Err(SchemaViolation::PrefixDebugBreakCoverage {
            scale: OperandScale::Quadruple,
        });
    }
    // Every size a patchable instruction can have needs a break of that size
    let mut i = 0;
    while i < Bytecode::COUNT {
        let d = &DESCRIPTORS[i];
        let patchable = !matches!(d.kind, BytecodeKind::Prefix(_) | BytecodeKind::DebugBreak(_));
        if patchable && !seen[SIZES[i][0] as usize] {
            return Err(SchemaViolation::MissingDebugBreakSize { bytecode: d.bytecode });
        }
        i += 1;
    }
    Ok(())
}

const fn check_groups() -> Result<(), SchemaViolation> {
    let mut g = 0;
    while g < BytecodeGroup::COUNT {
        let group = BytecodeGroup::ALL[g];
        let (first, last) = GROUP_RANGES[g];
        if !kind_in_group(DESCRIPTORS[first as usize].kind, group) {
            return Err(SchemaViolation::EmptyGroup { group });
        }
        let mut i = 0;
        while i < Bytecode::COUNT {
            let inside = i >= first as usize && i <= last as usize;
            if inside != kind_in_group(DESCRIPTORS[i].kind, group) {
                return Err(SchemaViolation::NonContiguousGroup {
                    group,
                    bytecode: Bytecode::ALL[i],
                });
            }
            i += 1;
        }
        g += 1;
    }
    Ok(())
}

/// Check every structural rule of the bytecode table
pub const fn check() -> Result<(), SchemaViolation> {
    if Bytecode::COUNT > 256 {
        return Err(SchemaViolation::TooManyBytecodes);
    }
    let mut i = 0;
    while i < Bytecode::COUNT {
        if DESCRIPTORS[i].bytecode as usize != i {
            return Err(SchemaViolation::OrdinalMismatch {
                bytecode: DESCRIPTORS[i].bytecode,
            });
        }
        if let Err(violation) = check_operands(i) {
            return Err(violation);
        }
        i += 1;
    }
    if let Err(violation) = check_prefixes() {
        return Err(violation);
    }
    if let Err(violation) = check_jumps() {
        return Err(violation);
    }
    if let Err(violation) = check_debug_breaks() {
        return Err(violation);
    }
    check_groups()
}

const _: () = match check() {
    Ok(()) => (),
    Err(violation) => panic!("{}", violation.message()),
};

/// Run the schema check at runtime
pub fn validate_schema() -> Result<(), SchemaViolation> {
    let result = check();
    debug!(
        target: "ignis::bytecode::schema",
        bytecodes = Bytecode::COUNT,
        max_single_size = MAX_SINGLE_SIZE,
        ok = result.is_ok(),
        "Validated bytecode schema"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_valid() {
        assert_eq!(validate_schema(), Ok(()));
    }

    #[test]
    fn test_group_ranges() {
        assert_eq!(BytecodeGroup::Prefix.first(), Bytecode::Wide);
        assert_eq!(BytecodeGroup::Prefix.last(), Bytecode::ExtraWide);
        assert_eq!(BytecodeGroup::Jump.first(), Bytecode::JumpLoop);
        assert_eq!(BytecodeGroup::Jump.last(), Bytecode::JumpIfJSReceiver);
        assert_eq!(BytecodeGroup::UnconditionalJump.last(), Bytecode::JumpConstant);
        assert_eq!(BytecodeGroup::ForwardJump.first(), Bytecode::Jump);
        assert_eq!(BytecodeGroup::JumpConstant.first(), Bytecode::JumpConstant);
        assert_eq!(
            BytecodeGroup::JumpConstant.last(),
            Bytecode::JumpIfToBooleanFalseConstant
        );
        assert_eq!(
            BytecodeGroup::JumpIfToBoolean.first(),
            Bytecode::JumpIfToBooleanTrueConstant
        );
        assert_eq!(BytecodeGroup::JumpIfToBoolean.last(), Bytecode::JumpIfToBooleanFalse);
    }

    #[test]
    fn test_groups_are_contiguous() {
        for group in BytecodeGroup::ALL {
            for bc in Bytecode::iter() {
                assert_eq!(
                    group.range().contains(&bc.to_byte()),
                    group.contains(bc),
                    "{} / {}",
                    group,
                    bc
                );
            }
        }
    }

    #[test]
    fn test_max_single_size() {
        assert_eq!(MAX_SINGLE_SIZE, 6);
        assert_eq!(MAX_SINGLE_SIZE, Bytecode::DebugBreak5.size(OperandScale::Single));
    }

    #[test]
    fn test_violation_display() {
        let v = SchemaViolation::NonContiguousGroup {
            group: BytecodeGroup::Jump,
            bytecode: Bytecode::Add,
        };
        assert_eq!(
            v.to_string(),
            "classification group is not a contiguous ordinal range (Jump at Add)"
        );
    }
}
