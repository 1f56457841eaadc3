//! Bytecode classification predicates
//!
//! Control-flow analysis, the bytecode verifier and the peephole passes ask
//! these questions about a bytecode. The answers come from the classification
//! stored in each descriptor ([`BytecodeKind`]); the group ranges exposed by
//! [`super::schema::BytecodeGroup`] agree with them by construction.

use super::bytecodes::{Bytecode, BytecodeKind, JumpCondition, JumpDirection, JumpInfo, JumpTarget};
use super::operands::OperandScale;

impl Bytecode {
    /// Jump shape, if this is a jump
    #[inline]
    pub const fn jump_info(self) -> Option<JumpInfo> {
        match self.kind() {
            BytecodeKind::Jump(info) => Some(info),
            _ => None,
        }
    }

    /// Scale applied by this bytecode, if it is a prefix
    #[inline]
    pub const fn prefix_scale(self) -> Option<OperandScale> {
        match self.kind() {
            BytecodeKind::Prefix(scale) => Some(scale),
            _ => None,
        }
    }

    // === Jumps ===

    #[inline]
    pub const fn is_jump(self) -> bool {
        self.jump_info().is_some()
    }

    pub const fn is_unconditional_jump(self) -> bool {
        match self.jump_info() {
            Some(info) => matches!(info.condition, JumpCondition::Always),
            None => false,
        }
    }

    pub const fn is_conditional_jump(self) -> bool {
        match self.jump_info() {
            Some(info) => !matches!(info.condition, JumpCondition::Always),
            None => false,
        }
    }

    /// Jump whose offset is the first operand
    pub const fn is_jump_immediate(self) -> bool {
        match self.jump_info() {
            Some(info) => matches!(info.target, JumpTarget::Immediate),
            None => false,
        }
    }

    /// Jump whose first operand indexes the constant pool
    pub const fn is_jump_constant(self) -> bool {
        match self.jump_info() {
            Some(info) => matches!(info.target, JumpTarget::Constant),
            None => false,
        }
    }

    pub const fn is_conditional_jump_immediate(self) -> bool {
        self.is_conditional_jump() && self.is_jump_immediate()
    }

    pub const fn is_conditional_jump_constant(self) -> bool {
        self.is_conditional_jump() && self.is_jump_constant()
    }

    pub const fn is_forward_jump(self) -> bool {
        match self.jump_info() {
            Some(info) => matches!(info.direction, JumpDirection::Forward),
            None => false,
        }
    }

    /// Only `JumpLoop`
    pub const fn is_backward_jump(self) -> bool {
        match self.jump_info() {
            Some(info) => matches!(info.direction, JumpDirection::Backward),
            None => false,
        }
    }

    /// Jump that converts the accumulator to a boolean before testing it
    pub const fn is_jump_if_to_boolean(self) -> bool {
        match self.jump_info() {
            Some(info) => matches!(info.condition, JumpCondition::ToBoolean),
            None => false,
        }
    }

    /// Jump that performs no coercion
    pub const fn is_jump_without_effects(self) -> bool {
        self.is_jump() && !self.is_jump_if_to_boolean()
    }

    pub const fn is_switch(self) -> bool {
        matches!(self.kind(), BytecodeKind::Switch)
    }

    // === Accumulator ===

    #[inline]
    pub const fn reads_accumulator(self) -> bool {
        self.accumulator_use().reads()
    }

    #[inline]
    pub const fn writes_accumulator(self) -> bool {
        self.accumulator_use().writes()
    }

    pub const fn is_accumulator_load_without_effects(self) -> bool {
        matches!(self.kind(), BytecodeKind::AccumulatorLoad)
    }

    pub const fn is_register_transfer(self) -> bool {
        matches!(self.kind(), BytecodeKind::RegisterTransfer)
    }

    /// Comparison that never calls back into user code
    pub const fn is_compare_without_effects(self) -> bool {
        matches!(self.kind(), BytecodeKind::Compare)
    }

    /// Safe to remove or reorder when its result is unused
    pub const fn has_no_observable_side_effect(self) -> bool {
        match self.kind() {
            BytecodeKind::AccumulatorLoad | BytecodeKind::RegisterTransfer | BytecodeKind::NoOp => {
                true
            }
            BytecodeKind::Jump(info) => !matches!(info.condition, JumpCondition::ToBoolean),
            _ => false,
        }
    }

    // === Frames ===

    pub const fn is_call_or_construct(self) -> bool {
        matches!(self.kind(), BytecodeKind::Call)
    }

    pub const fn returns(self) -> bool {
        matches!(self.kind(), BytecodeKind::Return)
    }

    pub const fn unconditionally_throws(self) -> bool {
        matches!(self.kind(), BytecodeKind::Throw)
    }

    /// Control never falls through to the next instruction
    pub const fn is_terminator(self) -> bool {
        self.is_unconditional_jump() || self.returns() || self.unconditionally_throws()
    }

    // === Encoding ===

    #[inline]
    pub const fn is_prefix(self) -> bool {
        self.prefix_scale().is_some()
    }

    pub const fn is_debug_break(self) -> bool {
        matches!(self.kind(), BytecodeKind::DebugBreak(_))
    }
}
