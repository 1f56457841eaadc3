//! Bytecode definitions for the register-based interpreter
//!
//! Every bytecode is declared once in [`define_bytecodes!`] with its
//! accumulator use, its operand types and its classification. The macro emits
//! the [`Bytecode`] enum and the descriptor table; per-scale sizes and operand
//! offsets are derived from the operand lists by `const fn`s, so the whole
//! table is computed at compile time.
//!
//! Declaration order is the ordinal order. Classification groups (jumps,
//! constant-pool jumps, ToBoolean jumps, ...) occupy contiguous ordinal ranges
//! and the schema check in [`super::schema`] refuses to compile a table where
//! that stops being true.

use std::fmt;

use super::operands::{AccumulatorUse, OperandScale, OperandSize, OperandType};

/// Maximum number of operands of any bytecode
pub const MAX_OPERANDS: usize = 5;

/// Where a jump finds its offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpTarget {
    /// Offset is encoded as the first operand
    Immediate,
    /// First operand indexes the constant pool, which holds the offset
    Constant,
}

/// What a jump tests before branching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpCondition {
    /// Always taken
    Always,
    /// Tests the accumulator value as-is
    Value,
    /// Converts the accumulator to a boolean first
    ToBoolean,
}

/// Jump direction relative to the current offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpDirection {
    Forward,
    Backward,
}

/// Control-flow shape of a jump bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JumpInfo {
    pub condition: JumpCondition,
    pub target: JumpTarget,
    pub direction: JumpDirection,
}

impl JumpInfo {
    /// The loop back-edge
    pub const LOOP: JumpInfo = JumpInfo {
        condition: JumpCondition::Always,
        target: JumpTarget::Immediate,
        direction: JumpDirection::Backward,
    };

    /// Unconditional forward jump
    pub const fn always(target: JumpTarget) -> JumpInfo {
        JumpInfo {
            condition: JumpCondition::Always,
            target,
            direction: JumpDirection::Forward,
        }
    }

    /// Conditional forward jump on the accumulator value
    pub const fn if_value(target: JumpTarget) -> JumpInfo {
        JumpInfo {
            condition: JumpCondition::Value,
            target,
            direction: JumpDirection::Forward,
        }
    }

    /// Conditional forward jump that first coerces the accumulator to a boolean
    pub const fn if_to_boolean(target: JumpTarget) -> JumpInfo {
        JumpInfo {
            condition: JumpCondition::ToBoolean,
            target,
            direction: JumpDirection::Forward,
        }
    }
}

/// Classification attached to each bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BytecodeKind {
    /// Operand-scaling prefix for the next instruction
    Prefix(OperandScale),
    /// Breakpoint form; `Some(scale)` for the forms replacing a scaling prefix
    DebugBreak(Option<OperandScale>),
    /// Loads into the accumulator without observable effects
    AccumulatorLoad,
    /// Moves between registers (and context registers) without observable effects
    RegisterTransfer,
    /// Does nothing
    NoOp,
    /// Comparison that cannot call user code
    Compare,
    /// Any jump
    Jump(JumpInfo),
    /// Table-driven multi-way branch
    Switch,
    /// Call or construct of a script-level function
    Call,
    /// Returns from the current frame
    Return,
    /// Unconditionally throws
    Throw,
    /// Everything else
    Other,
}

/// Immutable metadata for one bytecode
#[derive(Debug, Clone, Copy)]
pub struct BytecodeDescriptor {
    pub bytecode: Bytecode,
    pub name: &'static str,
    pub accumulator_use: AccumulatorUse,
    pub operands: &'static [OperandType],
    pub kind: BytecodeKind,
}

macro_rules! bytecode_kind {
    () => {
        BytecodeKind::Other
    };
    ($kind:expr) => {{
        #[allow(unused_imports)]
        use BytecodeKind::*;
        $kind
    }};
}

macro_rules! bytecode_one {
    ($name:ident) => {
        1
    };
}

macro_rules! define_bytecodes {
    ($(
        $(#[$attr:meta])*
        $name:ident ($acc:ident $(, $op:ident)*) $(=> $kind:expr)?;
    )*) => {
        /// Bytecode enumeration
        ///
        /// The discriminant is the opcode byte and the index into every
        /// per-bytecode table.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Bytecode {
            $(
                $(#[$attr])*
                $name,
            )*
        }

        impl Bytecode {
            /// Number of bytecodes
            pub const COUNT: usize = 0 $(+ bytecode_one!($name))*;

            /// Every bytecode in ordinal order
            pub const ALL: [Bytecode; Bytecode::COUNT] = [$(Bytecode::$name,)*];
        }

        /// Descriptor table, indexed by ordinal
        pub(crate) const DESCRIPTORS: [BytecodeDescriptor; Bytecode::COUNT] = [
            $(
                BytecodeDescriptor {
                    bytecode: Bytecode::$name,
                    name: stringify!($name),
                    accumulator_use: AccumulatorUse::$acc,
                    operands: &[$(OperandType::$op),*],
                    kind: bytecode_kind!($($kind)?),
                },
            )*
        ];
    };
}

define_bytecodes! {
    // === Operand scaling prefixes ===
    /// Doubles the width of the next instruction's scalable operands
    Wide(NONE) => Prefix(OperandScale::Double);
    /// Quadruples the width of the next instruction's scalable operands
    ExtraWide(NONE) => Prefix(OperandScale::Quadruple);

    // === Debug breaks: one per prefix, one per unscaled instruction size ===
    DebugBreakWide(READ_WRITE) => DebugBreak(Some(OperandScale::Double));
    DebugBreakExtraWide(READ_WRITE) => DebugBreak(Some(OperandScale::Quadruple));
    DebugBreak0(READ_WRITE) => DebugBreak(None);
    DebugBreak1(READ_WRITE, Reg) => DebugBreak(None);
    DebugBreak2(READ_WRITE, Reg, Reg) => DebugBreak(None);
    DebugBreak3(READ_WRITE, Reg, Reg, Reg) => DebugBreak(None);
    DebugBreak4(READ_WRITE, Reg, Reg, Reg, Reg) => DebugBreak(None);
    DebugBreak5(READ_WRITE, RuntimeId, Reg, Reg, Reg) => DebugBreak(None);

    // === Accumulator loads ===
    /// acc = 0
    LdaZero(WRITE) => AccumulatorLoad;
    /// acc = <imm>
    LdaSmi(WRITE, Imm) => AccumulatorLoad;
    LdaUndefined(WRITE) => AccumulatorLoad;
    LdaNull(WRITE) => AccumulatorLoad;
    LdaTheHole(WRITE) => AccumulatorLoad;
    LdaTrue(WRITE) => AccumulatorLoad;
    LdaFalse(WRITE) => AccumulatorLoad;
    /// acc = constant_pool[<idx>]
    LdaConstant(WRITE, Idx) => AccumulatorLoad;

    // === Globals ===
    LdaGlobal(WRITE, Idx, Idx);
    LdaGlobalInsideTypeof(WRITE, Idx, Idx);
    StaGlobal(READ, Idx, Idx);

    // === Context operations ===
    /// Saves the current context in <reg_out> and makes acc the current context
    PushContext(READ, RegOut) => RegisterTransfer;
    /// Restores the context held in <reg>
    PopContext(NONE, Reg) => RegisterTransfer;
    LdaContextSlot(WRITE, Reg, Idx, UImm) => AccumulatorLoad;
    LdaImmutableContextSlot(WRITE, Reg, Idx, UImm) => AccumulatorLoad;
    LdaCurrentContextSlot(WRITE, Idx) => AccumulatorLoad;
    LdaImmutableCurrentContextSlot(WRITE, Idx) => AccumulatorLoad;
    StaContextSlot(READ, Reg, Idx, UImm);
    StaCurrentContextSlot(READ, Idx);

    // === Lookup slots ===
    LdaLookupSlot(WRITE, Idx);
    LdaLookupContextSlot(WRITE, Idx, Idx, UImm);
    LdaLookupGlobalSlot(WRITE, Idx, Idx, UImm);
    LdaLookupSlotInsideTypeof(WRITE, Idx);
    LdaLookupContextSlotInsideTypeof(WRITE, Idx, Idx, UImm);
    LdaLookupGlobalSlotInsideTypeof(WRITE, Idx, Idx, UImm);
    StaLookupSlot(READ_WRITE, Idx, Flag8);

    // === Register transfers ===
    /// acc = <reg>
    Ldar(WRITE, Reg) => AccumulatorLoad;
    /// <reg_out> = acc
    Star(READ, RegOut) => RegisterTransfer;
    /// <reg_out> = <reg>
    Mov(NONE, Reg, RegOut) => RegisterTransfer;
    /// No operation
    Nop(NONE) => NoOp;

    // === Property loads ===
    LdaNamedProperty(WRITE, Reg, Idx, Idx);
    LdaNamedPropertyNoFeedback(WRITE, Reg, Idx);
    LdaKeyedProperty(READ_WRITE, Reg, Idx);

    // === Module variables ===
    LdaModuleVariable(WRITE, Imm, UImm);
    StaModuleVariable(READ, Imm, UImm);

    // === Property stores ===
    StaNamedProperty(READ_WRITE, Reg, Idx, Idx);
    StaNamedPropertyNoFeedback(READ_WRITE, Reg, Idx, Flag8);
    StaNamedOwnProperty(READ_WRITE, Reg, Idx, Idx);
    StaKeyedProperty(READ_WRITE, Reg, Reg, Idx);
    StaInArrayLiteral(READ_WRITE, Reg, Reg, Idx);
    StaDataPropertyInLiteral(READ, Reg, Reg, Flag8, Idx);
    CollectTypeProfile(READ, Imm);

    // === Binary operators: acc = <reg> op acc, feedback slot <idx> ===
    Add(READ_WRITE, Reg, Idx);
    Sub(READ_WRITE, Reg, Idx);
    Mul(READ_WRITE, Reg, Idx);
    Div(READ_WRITE, Reg, Idx);
    Mod(READ_WRITE, Reg, Idx);
    Exp(READ_WRITE, Reg, Idx);
    BitwiseOr(READ_WRITE, Reg, Idx);
    BitwiseXor(READ_WRITE, Reg, Idx);
    BitwiseAnd(READ_WRITE, Reg, Idx);
    ShiftLeft(READ_WRITE, Reg, Idx);
    ShiftRight(READ_WRITE, Reg, Idx);
    ShiftRightLogical(READ_WRITE, Reg, Idx);

    // === Binary operators with a small-integer immediate ===
    AddSmi(READ_WRITE, Imm, Idx);
    SubSmi(READ_WRITE, Imm, Idx);
    MulSmi(READ_WRITE, Imm, Idx);
    DivSmi(READ_WRITE, Imm, Idx);
    ModSmi(READ_WRITE, Imm, Idx);
    ExpSmi(READ_WRITE, Imm, Idx);
    BitwiseOrSmi(READ_WRITE, Imm, Idx);
    BitwiseXorSmi(READ_WRITE, Imm, Idx);
    BitwiseAndSmi(READ_WRITE, Imm, Idx);
    ShiftLeftSmi(READ_WRITE, Imm, Idx);
    ShiftRightSmi(READ_WRITE, Imm, Idx);
    ShiftRightLogicalSmi(READ_WRITE, Imm, Idx);

    // === Unary operators ===
    Inc(READ_WRITE, Idx);
    Dec(READ_WRITE, Idx);
    Negate(READ_WRITE, Idx);
    BitwiseNot(READ_WRITE, Idx);
    ToBooleanLogicalNot(READ_WRITE);
    LogicalNot(READ_WRITE);
    TypeOf(READ_WRITE);
    DeletePropertyStrict(READ_WRITE, Reg);
    DeletePropertySloppy(READ_WRITE, Reg);
    GetSuperConstructor(READ, RegOut);

    // === Calls ===
    CallAnyReceiver(WRITE, Reg, RegList, RegCount, Idx) => Call;
    CallProperty(WRITE, Reg, RegList, RegCount, Idx) => Call;
    CallProperty0(WRITE, Reg, Reg, Idx) => Call;
    CallProperty1(WRITE, Reg, Reg, Reg, Idx) => Call;
    CallProperty2(WRITE, Reg, Reg, Reg, Reg, Idx) => Call;
    CallUndefinedReceiver(WRITE, Reg, RegList, RegCount, Idx) => Call;
    CallUndefinedReceiver0(WRITE, Reg, Idx) => Call;
    CallUndefinedReceiver1(WRITE, Reg, Reg, Idx) => Call;
    CallUndefinedReceiver2(WRITE, Reg, Reg, Reg, Idx) => Call;
    CallNoFeedback(WRITE, Reg, RegList, RegCount) => Call;
    CallWithSpread(WRITE, Reg, RegList, RegCount, Idx) => Call;
    CallRuntime(WRITE, RuntimeId, RegList, RegCount);
    CallRuntimeForPair(NONE, RuntimeId, RegList, RegCount, RegOutPair);
    CallJSRuntime(WRITE, NativeContextIndex, RegList, RegCount) => Call;
    InvokeIntrinsic(WRITE, IntrinsicId, RegList, RegCount);
    Construct(READ_WRITE, Reg, RegList, RegCount, Idx) => Call;
    ConstructWithSpread(READ_WRITE, Reg, RegList, RegCount, Idx) => Call;

    // === Tests ===
    TestEqual(READ_WRITE, Reg, Idx);
    TestEqualStrict(READ_WRITE, Reg, Idx);
    TestLessThan(READ_WRITE, Reg, Idx);
    TestGreaterThan(READ_WRITE, Reg, Idx);
    TestLessThanOrEqual(READ_WRITE, Reg, Idx);
    TestGreaterThanOrEqual(READ_WRITE, Reg, Idx);
    TestReferenceEqual(READ_WRITE, Reg) => Compare;
    TestInstanceOf(READ_WRITE, Reg, Idx);
    TestIn(READ_WRITE, Reg, Idx);
    TestUndetectable(READ_WRITE) => Compare;
    TestNull(READ_WRITE) => Compare;
    TestUndefined(READ_WRITE) => Compare;
    TestTypeOf(READ_WRITE, Flag8) => Compare;

    // === Casts ===
    ToName(READ, RegOut);
    ToNumber(READ_WRITE, Idx);
    ToNumeric(READ_WRITE, Idx);
    ToObject(READ, RegOut);
    ToString(READ_WRITE);

    // === Literals ===
    CreateRegExpLiteral(WRITE, Idx, Idx, Flag8);
    CreateArrayLiteral(WRITE, Idx, Idx, Flag8);
    CreateArrayFromIterable(READ_WRITE);
    CreateEmptyArrayLiteral(WRITE, Idx);
    CreateObjectLiteral(WRITE, Idx, Idx, Flag8);
    CreateEmptyObjectLiteral(WRITE);
    CloneObject(WRITE, Reg, Flag8, Idx);
    GetTemplateObject(WRITE, Idx, Idx);

    // === Closures and contexts ===
    CreateClosure(WRITE, Idx, Idx, Flag8);
    CreateBlockContext(WRITE, Idx);
    CreateCatchContext(WRITE, Reg, Idx);
    CreateFunctionContext(WRITE, Idx, UImm);
    CreateEvalContext(WRITE, Idx, UImm);
    CreateWithContext(WRITE, Reg, Idx);

    // === Arguments ===
    CreateMappedArguments(WRITE);
    CreateUnmappedArguments(WRITE);
    CreateRestParameter(WRITE);

    // === Control flow: ordered so every jump group is one range ===
    /// Loop back-edge by <imm> bytes; <loop_depth> drives on-stack replacement
    JumpLoop(NONE, UImm, Imm) => Jump(JumpInfo::LOOP);
    Jump(NONE, UImm) => Jump(JumpInfo::always(JumpTarget::Immediate));
    JumpConstant(NONE, Idx) => Jump(JumpInfo::always(JumpTarget::Constant));
    JumpIfNullConstant(READ, Idx) => Jump(JumpInfo::if_value(JumpTarget::Constant));
    JumpIfNotNullConstant(READ, Idx) => Jump(JumpInfo::if_value(JumpTarget::Constant));
    JumpIfUndefinedConstant(READ, Idx) => Jump(JumpInfo::if_value(JumpTarget::Constant));
    JumpIfNotUndefinedConstant(READ, Idx) => Jump(JumpInfo::if_value(JumpTarget::Constant));
    JumpIfUndefinedOrNullConstant(READ, Idx) => Jump(JumpInfo::if_value(JumpTarget::Constant));
    JumpIfTrueConstant(READ, Idx) => Jump(JumpInfo::if_value(JumpTarget::Constant));
    JumpIfFalseConstant(READ, Idx) => Jump(JumpInfo::if_value(JumpTarget::Constant));
    JumpIfJSReceiverConstant(READ, Idx) => Jump(JumpInfo::if_value(JumpTarget::Constant));
    JumpIfToBooleanTrueConstant(READ, Idx) => Jump(JumpInfo::if_to_boolean(JumpTarget::Constant));
    JumpIfToBooleanFalseConstant(READ, Idx) => Jump(JumpInfo::if_to_boolean(JumpTarget::Constant));
    JumpIfToBooleanTrue(READ, UImm) => Jump(JumpInfo::if_to_boolean(JumpTarget::Immediate));
    JumpIfToBooleanFalse(READ, UImm) => Jump(JumpInfo::if_to_boolean(JumpTarget::Immediate));
    JumpIfTrue(READ, UImm) => Jump(JumpInfo::if_value(JumpTarget::Immediate));
    JumpIfFalse(READ, UImm) => Jump(JumpInfo::if_value(JumpTarget::Immediate));
    JumpIfNull(READ, UImm) => Jump(JumpInfo::if_value(JumpTarget::Immediate));
    JumpIfNotNull(READ, UImm) => Jump(JumpInfo::if_value(JumpTarget::Immediate));
    JumpIfUndefined(READ, UImm) => Jump(JumpInfo::if_value(JumpTarget::Immediate));
    JumpIfNotUndefined(READ, UImm) => Jump(JumpInfo::if_value(JumpTarget::Immediate));
    JumpIfUndefinedOrNull(READ, UImm) => Jump(JumpInfo::if_value(JumpTarget::Immediate));
    JumpIfJSReceiver(READ, UImm) => Jump(JumpInfo::if_value(JumpTarget::Immediate));

    /// Jump through a table of small-integer cases in the constant pool
    SwitchOnSmiNoFeedback(READ, Idx, UImm, Imm) => Switch;

    // === For-in ===
    ForInEnumerate(WRITE, Reg);
    ForInPrepare(READ, RegOutTriple, Idx);
    ForInContinue(WRITE, Reg, Reg);
    ForInNext(WRITE, Reg, Reg, RegPair, Idx);
    ForInStep(WRITE, Reg);

    // === Frame and non-local control ===
    StackCheck(NONE);
    SetPendingMessage(READ_WRITE);
    Throw(READ) => Throw;
    ReThrow(READ) => Throw;
    Return(READ) => Return;
    ThrowReferenceErrorIfHole(READ, Idx);
    ThrowSuperNotCalledIfHole(READ);
    ThrowSuperAlreadyCalledIfNotHole(READ);

    // === Generators ===
    SwitchOnGeneratorState(NONE, Reg, Idx, UImm) => Switch;
    SuspendGenerator(READ, Reg, RegList, RegCount, UImm);
    ResumeGenerator(WRITE, Reg, RegOutList, RegCount);

    // === Iteration ===
    GetIterator(WRITE, Reg, Idx, Idx);

    // === Debugging and internal ===
    Debugger(NONE);
    IncBlockCounter(NONE, Idx);
    /// Abort execution with reason <flag>
    Abort(NONE, Flag8);
    /// Dispatch target for every opcode byte or scale with no handler
    Illegal(NONE);
}

/// Byte size of every bytecode at every scale, prefix excluded
pub(crate) const SIZES: [[u8; OperandScale::COUNT]; Bytecode::COUNT] = compute_sizes();

/// Operand offsets from the opcode byte, per bytecode and scale
const OPERAND_OFFSETS: [[[u8; MAX_OPERANDS]; OperandScale::COUNT]; Bytecode::COUNT] =
    compute_operand_offsets();

static DESCRIPTOR_TABLE: [BytecodeDescriptor; Bytecode::COUNT] = DESCRIPTORS;
static SIZE_TABLE: [[u8; OperandScale::COUNT]; Bytecode::COUNT] = SIZES;
static OFFSET_TABLE: [[[u8; MAX_OPERANDS]; OperandScale::COUNT]; Bytecode::COUNT] =
    OPERAND_OFFSETS;
static BYTECODE_TABLE: [Bytecode; Bytecode::COUNT] = Bytecode::ALL;

const fn compute_sizes() -> [[u8; OperandScale::COUNT]; Bytecode::COUNT] {
    let mut sizes = [[0u8; OperandScale::COUNT]; Bytecode::COUNT];
    let mut i = 0;
    while i < Bytecode::COUNT {
        let operands = DESCRIPTORS[i].operands;
        let mut s = 0;
        while s < OperandScale::COUNT {
            let scale = OperandScale::ALL[s];
            let mut size = 1;
            let mut j = 0;
            while j < operands.len() {
                size += operands[j].width(scale);
                j += 1;
            }
            sizes[i][s] = size as u8;
            s += 1;
        }
        i += 1;
    }
    sizes
}

const fn compute_operand_offsets() -> [[[u8; MAX_OPERANDS]; OperandScale::COUNT]; Bytecode::COUNT]
{
    let mut offsets = [[[0u8; MAX_OPERANDS]; OperandScale::COUNT]; Bytecode::COUNT];
    let mut i = 0;
    while i < Bytecode::COUNT {
        let operands = DESCRIPTORS[i].operands;
        let mut s = 0;
        while s < OperandScale::COUNT {
            let scale = OperandScale::ALL[s];
            let mut offset = 1;
            let mut j = 0;
            // Operand lists longer than MAX_OPERANDS are rejected by the schema check
            while j < operands.len() && j < MAX_OPERANDS {
                offsets[i][s][j] = offset as u8;
                offset += operands[j].width(scale);
                j += 1;
            }
            s += 1;
        }
        i += 1;
    }
    offsets
}

impl Bytecode {
    /// Convert byte to bytecode, returns None if out of range
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Self> {
        BYTECODE_TABLE.get(byte as usize).copied()
    }

    /// Convert bytecode to its opcode byte
    #[inline]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Ordinal of this bytecode, identical to its opcode byte
    #[inline]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Look up a bytecode by its declared name
    pub fn from_name(name: &str) -> Option<Self> {
        DESCRIPTOR_TABLE
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.bytecode)
    }

    /// Full descriptor record
    #[inline]
    pub fn descriptor(self) -> &'static BytecodeDescriptor {
        &DESCRIPTOR_TABLE[self as usize]
    }

    /// Declared name, e.g. `"LdaSmi"`
    #[inline]
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Name with the scale suffix, e.g. `"LdaSmi.Wide"`
    pub fn to_string_with_scale(self, scale: OperandScale) -> String {
        format!("{}{}", self.name(), scale.suffix())
    }

    #[inline]
    pub const fn kind(self) -> BytecodeKind {
        DESCRIPTORS[self as usize].kind
    }

    #[inline]
    pub const fn accumulator_use(self) -> AccumulatorUse {
        DESCRIPTORS[self as usize].accumulator_use
    }

    /// Operand types in declaration order
    #[inline]
    pub fn operand_types(self) -> &'static [OperandType] {
        self.descriptor().operands
    }

    #[inline]
    pub fn operand_count(self) -> usize {
        self.descriptor().operands.len()
    }

    /// Type of operand `i`.
    ///
    /// Panics if `i` is not below [`Bytecode::operand_count`].
    #[inline]
    pub fn operand_type(self, i: usize) -> OperandType {
        let operands = self.operand_types();
        assert!(
            i < operands.len(),
            "operand index {} out of range for {} ({} operands)",
            i,
            self.name(),
            operands.len()
        );
        operands[i]
    }

    /// Instruction size in bytes at `scale`, opcode included and prefix excluded
    #[inline]
    pub fn size(self, scale: OperandScale) -> usize {
        SIZE_TABLE[self as usize][scale.index()] as usize
    }

    /// Byte offset of operand `i` from the opcode byte.
    ///
    /// Panics if `i` is not below [`Bytecode::operand_count`].
    #[inline]
    pub fn operand_offset(self, i: usize, scale: OperandScale) -> usize {
        let _ = self.operand_type(i);
        OFFSET_TABLE[self as usize][scale.index()][i] as usize
    }

    /// Decoded width of operand `i` at `scale`.
    ///
    /// Panics if `i` is not below [`Bytecode::operand_count`].
    #[inline]
    pub fn operand_size(self, i: usize, scale: OperandScale) -> OperandSize {
        self.operand_type(i).size(scale)
    }

    /// Operand sizes of every operand at `scale`
    pub fn operand_sizes(self, scale: OperandScale) -> impl Iterator<Item = OperandSize> {
        self.operand_types().iter().map(move |op| op.size(scale))
    }

    /// True if at least one operand widens under a scaling prefix
    pub const fn has_scalable_operands(self) -> bool {
        let operands = DESCRIPTORS[self as usize].operands;
        let mut j = 0;
        while j < operands.len() {
            if operands[j].is_scalable() {
                return true;
            }
            j += 1;
        }
        false
    }

    /// Iterate over all bytecodes in ordinal order
    pub fn iter() -> impl Iterator<Item = Bytecode> {
        BYTECODE_TABLE.iter().copied()
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl BytecodeDescriptor {
    /// Size at `scale`
    pub fn size(&self, scale: OperandScale) -> usize {
        self.bytecode.size(scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytecode_roundtrip() {
        for bc in Bytecode::iter() {
            let decoded = Bytecode::from_byte(bc.to_byte()).expect("Should decode valid bytecode");
            assert_eq!(bc, decoded, "Bytecode {:?} roundtrip failed", bc);
            assert_eq!(Bytecode::from_name(bc.name()), Some(bc));
        }
    }

    #[test]
    fn test_invalid_byte() {
        assert!(Bytecode::from_byte(Bytecode::COUNT as u8).is_none());
        assert!(Bytecode::from_byte(0xFF).is_none());
        assert!(Bytecode::from_name("NoSuchBytecode").is_none());
    }

    #[test]
    fn test_add_sizes() {
        // [Reg, Idx]: register stays one byte, index scales
        assert_eq!(Bytecode::Add.operand_count(), 2);
        assert_eq!(Bytecode::Add.size(OperandScale::Single), 3);
        assert_eq!(Bytecode::Add.size(OperandScale::Double), 4);
        assert_eq!(Bytecode::Add.size(OperandScale::Quadruple), 6);
        assert_eq!(Bytecode::Add.operand_offset(1, OperandScale::Quadruple), 2);
        assert_eq!(
            Bytecode::Add.operand_size(1, OperandScale::Double),
            OperandSize::Short
        );
    }

    #[test]
    fn test_fixed_width_operands_ignore_scale() {
        // RuntimeId(2) + RegList(1) + RegCount(scalable)
        assert_eq!(Bytecode::CallRuntime.size(OperandScale::Single), 5);
        assert_eq!(Bytecode::CallRuntime.size(OperandScale::Quadruple), 8);
        assert_eq!(Bytecode::CallRuntime.operand_offset(1, OperandScale::Quadruple), 3);
        assert_eq!(Bytecode::CallRuntime.operand_offset(2, OperandScale::Quadruple), 4);
    }

    #[test]
    fn test_zero_operand_sizes() {
        for scale in OperandScale::ALL {
            assert_eq!(Bytecode::Nop.size(scale), 1);
            assert_eq!(Bytecode::Wide.size(scale), 1);
        }
        assert!(!Bytecode::Nop.has_scalable_operands());
        assert!(Bytecode::LdaSmi.has_scalable_operands());
    }

    #[test]
    #[should_panic(expected = "operand index 2 out of range")]
    fn test_operand_index_out_of_range_panics() {
        Bytecode::Add.operand_offset(2, OperandScale::Single);
    }

    #[test]
    fn test_scaled_name() {
        assert_eq!(Bytecode::LdaSmi.to_string_with_scale(OperandScale::Single), "LdaSmi");
        assert_eq!(Bytecode::LdaSmi.to_string_with_scale(OperandScale::Double), "LdaSmi.Wide");
        assert_eq!(
            Bytecode::LdaSmi.to_string_with_scale(OperandScale::Quadruple),
            "LdaSmi.ExtraWide"
        );
        assert_eq!(Bytecode::JumpLoop.to_string(), "JumpLoop");
    }
}
