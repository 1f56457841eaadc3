//! Operand types, operand scaling and accumulator use
//!
//! Every operand of every bytecode has an [`OperandType`]. The type alone
//! decides how many bytes the operand occupies in the stream and whether the
//! width changes when the instruction is preceded by a scaling prefix:
//!
//! ```text
//! OperandType     scalable  unsigned  base width
//! ----------------------------------------------
//! None            no        yes       0
//! Reg* (all)      no        no        1
//! Imm             yes       no        1
//! UImm, Idx, ...  yes       yes       1
//! Flag8, Intr.Id  no        yes       1
//! RuntimeId       no        yes       2
//! ```
//!
//! Scalable operands are multiplied by the [`OperandScale`] of the instruction
//! (x1, x2 or x4). Fixed-width operands ignore it.

use std::fmt;

/// Width tier applied to every scalable operand of one instruction.
///
/// The discriminant is the byte multiplier. Only powers of two are used so the
/// scaled width is a shift of the base width; each non-single tier has a
/// dedicated prefix bytecode (`Wide`, `ExtraWide`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandScale {
    /// No prefix
    Single = 1,
    /// Preceded by `Wide`
    Double = 2,
    /// Preceded by `ExtraWide`
    Quadruple = 4,
}

impl OperandScale {
    /// All scales in ascending order
    pub const ALL: [OperandScale; 3] = [
        OperandScale::Single,
        OperandScale::Double,
        OperandScale::Quadruple,
    ];

    /// Number of distinct scales
    pub const COUNT: usize = 3;

    /// Byte multiplier for scalable operands
    #[inline]
    pub const fn multiplier(self) -> usize {
        self as usize
    }

    /// Dense index (0, 1, 2) used for per-scale tables
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            OperandScale::Single => 0,
            OperandScale::Double => 1,
            OperandScale::Quadruple => 2,
        }
    }

    /// Inverse of [`OperandScale::index`]
    #[inline]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(OperandScale::Single),
            1 => Some(OperandScale::Double),
            2 => Some(OperandScale::Quadruple),
            _ => None,
        }
    }

    /// Suffix used when printing scaled bytecodes ("", ".Wide", ".ExtraWide")
    pub const fn suffix(self) -> &'static str {
        match self {
            OperandScale::Single => "",
            OperandScale::Double => ".Wide",
            OperandScale::Quadruple => ".ExtraWide",
        }
    }
}

impl fmt::Display for OperandScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperandScale::Single => "Single",
            OperandScale::Double => "Double",
            OperandScale::Quadruple => "Quadruple",
        };
        f.write_str(name)
    }
}

/// Size in bytes of a decoded operand
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandSize {
    None = 0,
    Byte = 1,
    Short = 2,
    Quad = 4,
}

impl OperandSize {
    /// Size in bytes
    #[inline]
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Convert a byte count into an operand size
    pub const fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            0 => Some(OperandSize::None),
            1 => Some(OperandSize::Byte),
            2 => Some(OperandSize::Short),
            4 => Some(OperandSize::Quad),
            _ => None,
        }
    }
}

/// Accumulator usage of a bytecode, as read/write bit flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccumulatorUse(u8);

impl AccumulatorUse {
    const READ_BIT: u8 = 1 << 0;
    const WRITE_BIT: u8 = 1 << 1;

    /// Accumulator is neither read nor written
    pub const NONE: AccumulatorUse = AccumulatorUse(0);
    /// Accumulator is read
    pub const READ: AccumulatorUse = AccumulatorUse(Self::READ_BIT);
    /// Accumulator is written
    pub const WRITE: AccumulatorUse = AccumulatorUse(Self::WRITE_BIT);
    /// Accumulator is read, then written
    pub const READ_WRITE: AccumulatorUse = AccumulatorUse(Self::READ_BIT | Self::WRITE_BIT);

    #[inline]
    pub const fn reads(self) -> bool {
        self.0 & Self::READ_BIT != 0
    }

    #[inline]
    pub const fn writes(self) -> bool {
        self.0 & Self::WRITE_BIT != 0
    }

    /// Combine two usages
    #[inline]
    pub const fn union(self, other: AccumulatorUse) -> AccumulatorUse {
        AccumulatorUse(self.0 | other.0)
    }

    /// Raw flag bits
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Display for AccumulatorUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match (self.reads(), self.writes()) {
            (false, false) => "None",
            (true, false) => "Read",
            (false, true) => "Write",
            (true, true) => "ReadWrite",
        };
        f.write_str(name)
    }
}

/// Static attributes of an operand type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandTypeInfo {
    /// Width is multiplied by the instruction's operand scale
    pub is_scalable: bool,
    /// Value is zero-extended rather than sign-extended
    pub is_unsigned: bool,
    /// Width in bytes at `OperandScale::Single`
    pub base_width: u8,
}

/// Shape of a single bytecode operand
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// No operand
    None,
    /// Input register
    Reg,
    /// First register of a list; the count is the following `RegCount` operand
    RegList,
    /// First of two consecutive input registers
    RegPair,
    /// Output register
    RegOut,
    /// First register of an output list; the count follows as `RegCount`
    RegOutList,
    /// First of two consecutive output registers
    RegOutPair,
    /// First of three consecutive output registers
    RegOutTriple,
    /// Signed immediate
    Imm,
    /// Unsigned immediate (jump offsets, slot depths)
    UImm,
    /// Constant-pool or feedback index
    Idx,
    /// Length of the preceding register list
    RegCount,
    /// Index into the native context
    NativeContextIndex,
    /// Fixed one-byte flag word
    Flag8,
    /// Fixed one-byte intrinsic identifier
    IntrinsicId,
    /// Fixed two-byte runtime function identifier
    RuntimeId,
}

impl OperandType {
    /// All operand types
    pub const ALL: [OperandType; 16] = [
        OperandType::None,
        OperandType::Reg,
        OperandType::RegList,
        OperandType::RegPair,
        OperandType::RegOut,
        OperandType::RegOutList,
        OperandType::RegOutPair,
        OperandType::RegOutTriple,
        OperandType::Imm,
        OperandType::UImm,
        OperandType::Idx,
        OperandType::RegCount,
        OperandType::NativeContextIndex,
        OperandType::Flag8,
        OperandType::IntrinsicId,
        OperandType::RuntimeId,
    ];

    /// Describe this operand type
    #[inline]
    pub const fn info(self) -> OperandTypeInfo {
        match self {
            OperandType::None => OperandTypeInfo {
                is_scalable: false,
                is_unsigned: true,
                base_width: 0,
            },
            OperandType::Reg
            | OperandType::RegList
            | OperandType::RegPair
            | OperandType::RegOut
            | OperandType::RegOutList
            | OperandType::RegOutPair
            | OperandType::RegOutTriple => OperandTypeInfo {
                is_scalable: false,
                is_unsigned: false,
                base_width: 1,
            },
            OperandType::Imm => OperandTypeInfo {
                is_scalable: true,
                is_unsigned: false,
                base_width: 1,
            },
            OperandType::UImm
            | OperandType::Idx
            | OperandType::RegCount
            | OperandType::NativeContextIndex => OperandTypeInfo {
                is_scalable: true,
                is_unsigned: true,
                base_width: 1,
            },
            OperandType::Flag8 | OperandType::IntrinsicId => OperandTypeInfo {
                is_scalable: false,
                is_unsigned: true,
                base_width: 1,
            },
            OperandType::RuntimeId => OperandTypeInfo {
                is_scalable: false,
                is_unsigned: true,
                base_width: 2,
            },
        }
    }

    #[inline]
    pub const fn is_scalable(self) -> bool {
        self.info().is_scalable
    }

    #[inline]
    pub const fn is_unsigned(self) -> bool {
        self.info().is_unsigned
    }

    #[inline]
    pub const fn base_width(self) -> usize {
        self.info().base_width as usize
    }

    /// Encoded width in bytes at the given scale
    #[inline]
    pub const fn width(self, scale: OperandScale) -> usize {
        let info = self.info();
        if info.is_scalable {
            info.base_width as usize * scale.multiplier()
        } else {
            info.base_width as usize
        }
    }

    /// Encoded width at the given scale as an [`OperandSize`]
    #[inline]
    pub const fn size(self, scale: OperandScale) -> OperandSize {
        match self.width(scale) {
            0 => OperandSize::None,
            1 => OperandSize::Byte,
            2 => OperandSize::Short,
            _ => OperandSize::Quad,
        }
    }

    /// Any register operand, input or output
    pub const fn is_register(self) -> bool {
        self.is_register_input() || self.is_register_output()
    }

    pub const fn is_register_input(self) -> bool {
        matches!(
            self,
            OperandType::Reg | OperandType::RegList | OperandType::RegPair
        )
    }

    pub const fn is_register_output(self) -> bool {
        matches!(
            self,
            OperandType::RegOut
                | OperandType::RegOutList
                | OperandType::RegOutPair
                | OperandType::RegOutTriple
        )
    }

    /// Register list operands whose length is given by the next operand
    pub const fn is_register_list(self) -> bool {
        matches!(self, OperandType::RegList | OperandType::RegOutList)
    }

    /// Number of registers named by a fixed-arity register operand.
    ///
    /// Returns 0 for lists (length is dynamic) and non-register operands.
    pub const fn register_count(self) -> usize {
        match self {
            OperandType::Reg | OperandType::RegOut => 1,
            OperandType::RegPair | OperandType::RegOutPair => 2,
            OperandType::RegOutTriple => 3,
            _ => 0,
        }
    }

    /// Short name used by the disassembler and table dumps
    pub const fn name(self) -> &'static str {
        match self {
            OperandType::None => "None",
            OperandType::Reg => "Reg",
            OperandType::RegList => "RegList",
            OperandType::RegPair => "RegPair",
            OperandType::RegOut => "RegOut",
            OperandType::RegOutList => "RegOutList",
            OperandType::RegOutPair => "RegOutPair",
            OperandType::RegOutTriple => "RegOutTriple",
            OperandType::Imm => "Imm",
            OperandType::UImm => "UImm",
            OperandType::Idx => "Idx",
            OperandType::RegCount => "RegCount",
            OperandType::NativeContextIndex => "NativeContextIndex",
            OperandType::Flag8 => "Flag8",
            OperandType::IntrinsicId => "IntrinsicId",
            OperandType::RuntimeId => "RuntimeId",
        }
    }
}

impl fmt::Display for OperandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Smallest scale able to hold a signed operand value
pub const fn scale_for_signed_operand(value: i64) -> OperandScale {
    if value >= i8::MIN as i64 && value <= i8::MAX as i64 {
        OperandScale::Single
    } else if value >= i16::MIN as i64 && value <= i16::MAX as i64 {
        OperandScale::Double
    } else {
        OperandScale::Quadruple
    }
}

/// Smallest scale able to hold an unsigned operand value
pub const fn scale_for_unsigned_operand(value: u64) -> OperandScale {
    if value <= u8::MAX as u64 {
        OperandScale::Single
    } else if value <= u16::MAX as u64 {
        OperandScale::Double
    } else {
        OperandScale::Quadruple
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_attributes_are_per_kind() {
        assert!(!OperandType::Reg.is_scalable());
        assert_eq!(OperandType::Reg.base_width(), 1);
        assert!(OperandType::Idx.is_scalable());
        assert!(OperandType::Idx.is_unsigned());
        assert!(OperandType::Imm.is_scalable());
        assert!(!OperandType::Imm.is_unsigned());
        assert_eq!(OperandType::RuntimeId.base_width(), 2);
        assert!(!OperandType::RuntimeId.is_scalable());
        assert_eq!(OperandType::None.base_width(), 0);
    }

    #[test]
    fn test_operand_width_by_scale() {
        assert_eq!(OperandType::Idx.width(OperandScale::Single), 1);
        assert_eq!(OperandType::Idx.width(OperandScale::Double), 2);
        assert_eq!(OperandType::Idx.width(OperandScale::Quadruple), 4);
        assert_eq!(OperandType::Flag8.width(OperandScale::Quadruple), 1);
        assert_eq!(OperandType::RuntimeId.size(OperandScale::Quadruple), OperandSize::Short);
        for op in OperandType::ALL {
            for scale in OperandScale::ALL {
                assert_eq!(op.size(scale).bytes(), op.width(scale));
            }
        }
    }

    #[test]
    fn test_accumulator_use_flags() {
        assert!(!AccumulatorUse::NONE.reads());
        assert!(!AccumulatorUse::NONE.writes());
        assert!(AccumulatorUse::READ.reads());
        assert!(AccumulatorUse::WRITE.writes());
        assert_eq!(
            AccumulatorUse::READ.union(AccumulatorUse::WRITE),
            AccumulatorUse::READ_WRITE
        );
        assert_eq!(AccumulatorUse::READ_WRITE.to_string(), "ReadWrite");
    }

    #[test]
    fn test_minimal_scale_for_values() {
        assert_eq!(scale_for_signed_operand(-128), OperandScale::Single);
        assert_eq!(scale_for_signed_operand(128), OperandScale::Double);
        assert_eq!(scale_for_signed_operand(-40_000), OperandScale::Quadruple);
        assert_eq!(scale_for_unsigned_operand(255), OperandScale::Single);
        assert_eq!(scale_for_unsigned_operand(256), OperandScale::Double);
        assert_eq!(scale_for_unsigned_operand(70_000), OperandScale::Quadruple);
    }

    #[test]
    fn test_register_counts() {
        assert_eq!(OperandType::RegOutTriple.register_count(), 3);
        assert_eq!(OperandType::RegPair.register_count(), 2);
        assert_eq!(OperandType::RegList.register_count(), 0);
        assert!(OperandType::RegOutList.is_register_list());
        assert!(OperandType::RegOutList.is_register_output());
        assert!(!OperandType::RegCount.is_register());
    }
}
