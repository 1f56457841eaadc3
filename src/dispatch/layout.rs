//! Handler slot layout
//!
//! Every handler the interpreter needs gets a stable [`HandlerIndex`] before
//! any code is generated, so generators can refer to peers by index:
//!
//! ```text
//! index  0 .. N-1        every bytecode at Single scale
//! index  N .. N+W-1      bytecodes with scalable operands at Double scale
//! index  N+W .. N+2W-1   the same bytecodes at Quadruple scale
//! index  N+2W ..         native routines
//! ```
//!
//! A bytecode without scalable operands has no scaled slot; dispatching it
//! with a prefix lands on the `Illegal` handler.

use std::fmt;

use crate::bytecode::{Bytecode, OperandScale};

use super::native::NativeRoutine;

/// Stable position of a handler in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerIndex(u32);

impl HandlerIndex {
    #[inline]
    pub const fn new(index: usize) -> Self {
        HandlerIndex(index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for HandlerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Bytecode {
        bytecode: Bytecode,
        scale: OperandScale,
    },
    Native(NativeRoutine),
}

impl SlotKind {
    pub fn category(self) -> SlotCategory {
        match self {
            SlotKind::Bytecode { .. } => SlotCategory::BytecodeHandler,
            SlotKind::Native(_) => SlotCategory::NativeRoutine,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Bytecode { bytecode, scale } => {
                f.write_str(&bytecode.to_string_with_scale(*scale))
            }
            SlotKind::Native(routine) => write!(f, "native:{}", routine),
        }
    }
}

/// Coarse slot category, carried by placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotCategory {
    BytecodeHandler,
    NativeRoutine,
}

/// True if `bytecode` needs its own handler at `scale`
pub fn needs_handler(bytecode: Bytecode, scale: OperandScale) -> bool {
    scale == OperandScale::Single || bytecode.has_scalable_operands()
}

/// Assignment of handler indices to (bytecode, scale) pairs and native routines
#[derive(Debug, Clone)]
pub struct DispatchLayout {
    slots: Vec<SlotKind>,
    by_bytecode: Vec<[Option<HandlerIndex>; OperandScale::COUNT]>,
    natives: [HandlerIndex; NativeRoutine::COUNT],
    illegal: HandlerIndex,
}

impl DispatchLayout {
    /// Layout for every bytecode and native routine
    pub fn new() -> Self {
        let mut slots = Vec::new();
        let mut by_bytecode = vec![[None; OperandScale::COUNT]; Bytecode::COUNT];

        for scale in OperandScale::ALL {
            for bytecode in Bytecode::iter().filter(|&bc| needs_handler(bc, scale)) {
                by_bytecode[bytecode.ordinal()][scale.index()] =
                    Some(HandlerIndex::new(slots.len()));
                slots.push(SlotKind::Bytecode { bytecode, scale });
            }
        }

        let mut natives = [HandlerIndex::new(0); NativeRoutine::COUNT];
        for routine in NativeRoutine::ALL {
            natives[routine.index()] = HandlerIndex::new(slots.len());
            slots.push(SlotKind::Native(routine));
        }

        // Single-scale slots come first, in ordinal order
        let illegal = HandlerIndex::new(Bytecode::Illegal.ordinal());

        Self {
            slots,
            by_bytecode,
            natives,
            illegal,
        }
    }

    /// Total number of slots
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot contents at `index`, `None` if out of range
    #[inline]
    pub fn slot(&self, index: HandlerIndex) -> Option<SlotKind> {
        self.slots.get(index.index()).copied()
    }

    #[inline]
    pub fn contains(&self, index: HandlerIndex) -> bool {
        index.index() < self.slots.len()
    }

    /// Iterate over `(index, slot)` in index order
    pub fn slots(&self) -> impl Iterator<Item = (HandlerIndex, SlotKind)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, &kind)| (HandlerIndex::new(i), kind))
    }

    /// Slot for `bytecode` at `scale`, `None` when that pair has no handler
    #[inline]
    pub fn index_of(&self, bytecode: Bytecode, scale: OperandScale) -> Option<HandlerIndex> {
        self.by_bytecode[bytecode.ordinal()][scale.index()]
    }

    /// Slot for a native routine
    #[inline]
    pub fn native(&self, routine: NativeRoutine) -> HandlerIndex {
        self.natives[routine.index()]
    }

    /// Slot that every unmapped (opcode byte, scale) pair dispatches to
    #[inline]
    pub fn illegal(&self) -> HandlerIndex {
        self.illegal
    }

    /// Number of bytecode handler slots at `scale`
    pub fn slots_at_scale(&self, scale: OperandScale) -> usize {
        self.by_bytecode
            .iter()
            .filter(|slots| slots[scale.index()].is_some())
            .count()
    }
}

impl Default for DispatchLayout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_counts() {
        let layout = DispatchLayout::new();
        let scalable = Bytecode::iter().filter(|bc| bc.has_scalable_operands()).count();
        assert_eq!(layout.slots_at_scale(OperandScale::Single), Bytecode::COUNT);
        assert_eq!(layout.slots_at_scale(OperandScale::Double), scalable);
        assert_eq!(layout.slots_at_scale(OperandScale::Quadruple), scalable);
        assert_eq!(
            layout.len(),
            Bytecode::COUNT + 2 * scalable + NativeRoutine::COUNT
        );
    }

    #[test]
    fn test_indices_are_dense_and_stable() {
        let layout = DispatchLayout::new();
        for (index, kind) in layout.slots() {
            match kind {
                SlotKind::Bytecode { bytecode, scale } => {
                    assert_eq!(layout.index_of(bytecode, scale), Some(index))
                }
                SlotKind::Native(routine) => assert_eq!(layout.native(routine), index),
            }
        }
        let again = DispatchLayout::new();
        assert_eq!(
            layout.index_of(Bytecode::Add, OperandScale::Double),
            again.index_of(Bytecode::Add, OperandScale::Double)
        );
        assert_eq!(
            layout.index_of(Bytecode::Add, OperandScale::Single),
            Some(HandlerIndex::new(Bytecode::Add.ordinal()))
        );
    }

    #[test]
    fn test_unscalable_bytecodes_have_no_scaled_slot() {
        let layout = DispatchLayout::new();
        assert!(layout.index_of(Bytecode::Return, OperandScale::Single).is_some());
        assert!(layout.index_of(Bytecode::Return, OperandScale::Double).is_none());
        assert!(layout.index_of(Bytecode::Nop, OperandScale::Quadruple).is_none());
        assert!(layout.index_of(Bytecode::LdaSmi, OperandScale::Quadruple).is_some());
        assert_eq!(
            layout.slot(layout.illegal()),
            Some(SlotKind::Bytecode {
                bytecode: Bytecode::Illegal,
                scale: OperandScale::Single
            })
        );
    }
}
