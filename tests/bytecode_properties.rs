//! Whole-table properties of the bytecode descriptors
//!
//! Checks the size, scaling, classification and breakpoint rules against
//! every bytecode rather than a handful of samples.

use ignis::bytecode::{
    debug_break, debug_break_for_size_class, disassemble, original_size_class, resolve_at,
    AccumulatorUse, Bytecode, BytecodeError, BytecodeIterator, BytecodeWriter, MalformedStream,
    OperandScale, OperandType, SizeClass,
};

#[test]
fn test_reg_idx_read_write_sizes() {
    let bc = Bytecode::Add;
    assert_eq!(bc.operand_types(), &[OperandType::Reg, OperandType::Idx]);
    assert_eq!(bc.accumulator_use(), AccumulatorUse::READ_WRITE);
    assert_eq!(bc.operand_count(), 2);
    assert_eq!(bc.size(OperandScale::Single), 3);
    assert_eq!(bc.size(OperandScale::Double), 4);
    assert_eq!(bc.size(OperandScale::Quadruple), 6);
    assert!(bc.reads_accumulator());
    assert!(bc.writes_accumulator());
}

#[test]
fn test_zero_operand_sizes_and_side_effects() {
    for bc in Bytecode::iter().filter(|bc| bc.operand_count() == 0) {
        for scale in OperandScale::ALL {
            assert_eq!(bc.size(scale), 1, "{}", bc);
        }
    }
    assert!(Bytecode::Nop.has_no_observable_side_effect());
    assert!(!Bytecode::Nop.is_jump());
    assert!(!Bytecode::Return.has_no_observable_side_effect());
}

#[test]
fn test_size_is_opcode_plus_operand_widths() {
    for bc in Bytecode::iter() {
        for scale in OperandScale::ALL {
            let operands: usize = bc.operand_types().iter().map(|op| op.width(scale)).sum();
            assert_eq!(bc.size(scale), 1 + operands, "{} at {}", bc, scale);

            let mut expected_offset = 1;
            for (i, op) in bc.operand_types().iter().enumerate() {
                assert_eq!(bc.operand_offset(i, scale), expected_offset);
                assert_eq!(bc.operand_size(i, scale).bytes(), op.width(scale));
                expected_offset += op.width(scale);
            }
        }
    }
}

#[test]
fn test_sizes_are_monotonic_across_scales() {
    for bc in Bytecode::iter() {
        let single = bc.size(OperandScale::Single);
        let double = bc.size(OperandScale::Double);
        let quad = bc.size(OperandScale::Quadruple);
        assert!(single <= double && double <= quad, "{}", bc);
        if !bc.has_scalable_operands() {
            assert_eq!(single, quad, "{}", bc);
        }
    }
}

#[test]
fn test_ordinals_match_opcode_bytes() {
    for (ordinal, bc) in Bytecode::iter().enumerate() {
        assert_eq!(bc.ordinal(), ordinal);
        assert_eq!(Bytecode::from_byte(bc.to_byte()), Some(bc));
        assert_eq!(Bytecode::from_name(bc.name()), Some(bc));
    }
    assert_eq!(Bytecode::from_byte(u8::MAX), None);
}

#[test]
fn test_jump_predicates_partition() {
    for bc in Bytecode::iter() {
        if bc.is_jump() {
            assert_ne!(
                bc.is_unconditional_jump(),
                bc.is_conditional_jump(),
                "{}",
                bc
            );
            assert_ne!(bc.is_jump_immediate(), bc.is_jump_constant(), "{}", bc);
            assert_ne!(bc.is_forward_jump(), bc.is_backward_jump(), "{}", bc);
        } else {
            assert!(!bc.is_conditional_jump() && !bc.is_unconditional_jump());
            assert!(!bc.is_jump_if_to_boolean());
        }
        if bc.is_jump_if_to_boolean() {
            assert!(bc.is_conditional_jump());
        }
    }
    assert!(Bytecode::JumpLoop.is_backward_jump());
    assert!(Bytecode::JumpIfToBooleanTrueConstant.is_conditional_jump_constant());
}

#[test]
fn test_side_effect_free_bytecodes() {
    for bc in Bytecode::iter().filter(|bc| bc.has_no_observable_side_effect()) {
        assert!(!bc.is_jump_if_to_boolean(), "{}", bc);
        assert!(!bc.is_call_or_construct(), "{}", bc);
        assert!(!bc.is_debug_break(), "{}", bc);
        assert!(!bc.is_prefix(), "{}", bc);
    }
    assert!(Bytecode::LdaZero.is_accumulator_load_without_effects());
    assert!(Bytecode::Mov.is_register_transfer());
    assert!(Bytecode::JumpIfTrue.has_no_observable_side_effect());
    assert!(!Bytecode::JumpIfToBooleanTrue.has_no_observable_side_effect());
}

#[test]
fn test_every_bytecode_has_a_same_size_break() {
    for bc in Bytecode::iter().filter(|bc| !bc.is_debug_break()) {
        let brk = debug_break(bc).unwrap();
        assert!(brk.is_debug_break());
        assert_eq!(
            brk.size(OperandScale::Single),
            bc.size(OperandScale::Single),
            "{} -> {}",
            bc,
            brk
        );
        let class = original_size_class(brk).unwrap();
        assert_eq!(debug_break_for_size_class(class), Some(brk));
    }
    assert_eq!(
        original_size_class(Bytecode::DebugBreakWide),
        Some(SizeClass::Prefix(OperandScale::Double))
    );
    assert_eq!(original_size_class(Bytecode::Add), None);
}

#[test]
fn test_breakpoints_do_not_nest() {
    for bc in Bytecode::iter().filter(|bc| bc.is_debug_break()) {
        assert!(matches!(
            debug_break(bc),
            Err(BytecodeError::NestedBreakpoint(b)) if b == bc
        ));
    }
}

#[test]
fn test_minimal_encoding_resolves_back() {
    let cases: &[(Bytecode, &[i64], OperandScale)] = &[
        (Bytecode::Add, &[3, 7], OperandScale::Single),
        (Bytecode::Add, &[3, 0x1234], OperandScale::Double),
        (Bytecode::Add, &[3, 0x12345], OperandScale::Quadruple),
        (Bytecode::LdaSmi, &[-128], OperandScale::Single),
        (Bytecode::LdaSmi, &[-129], OperandScale::Double),
        (Bytecode::LdaSmi, &[i32::MIN as i64], OperandScale::Quadruple),
    ];
    for &(bc, operands, scale) in cases {
        let mut writer = BytecodeWriter::new();
        writer.emit(bc, operands).unwrap();
        let resolved = resolve_at(writer.as_bytes(), 0).unwrap();
        assert_eq!(resolved.bytecode, bc);
        assert_eq!(resolved.scale, scale);
        assert_eq!(resolved.total_size(), writer.len());
        for (i, &value) in operands.iter().enumerate() {
            assert_eq!(resolved.operand_value(writer.as_bytes(), i), value);
        }
    }
}

#[test]
fn test_orphaned_prefix_is_rejected() {
    let code = [Bytecode::Wide.to_byte(), Bytecode::Return.to_byte()];
    assert!(matches!(
        resolve_at(&code, 0),
        Err(BytecodeError::Malformed(MalformedStream::OrphanedPrefix {
            offset: 0,
            prefix: Bytecode::Wide,
            bytecode: Bytecode::Return,
        }))
    ));

    let mut iter = BytecodeIterator::new(&code);
    assert!(iter.next().unwrap().is_err());
    assert!(iter.next().is_none());
}

#[test]
fn test_consecutive_prefixes_resolve_separately() {
    let mut code = vec![Bytecode::ExtraWide.to_byte()];
    let mut writer = BytecodeWriter::new();
    writer.emit_scaled(Bytecode::LdaSmi, OperandScale::Double, &[5]).unwrap();
    code.extend_from_slice(writer.as_bytes());

    let resolved: Vec<_> = BytecodeIterator::new(&code)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(resolved.len(), 2);
    assert!(resolved[0].redundant_prefix);
    assert_eq!(resolved[0].bytecode, Bytecode::ExtraWide);
    assert_eq!(resolved[0].total_size(), 1);
    assert_eq!(resolved[1].bytecode, Bytecode::LdaSmi);
    assert_eq!(resolved[1].scale, OperandScale::Double);
    assert_eq!(resolved[1].offset, 1);
}

#[test]
fn test_breakpoint_keeps_stream_decodable() {
    let mut writer = BytecodeWriter::new();
    writer.emit(Bytecode::LdaSmi, &[1000]).unwrap();
    let add = writer.emit(Bytecode::Add, &[2, 3]).unwrap();
    writer.emit(Bytecode::Return, &[]).unwrap();
    let before = disassemble(writer.as_bytes()).unwrap();

    let first = writer.set_breakpoint(0).unwrap();
    let second = writer.set_breakpoint(add).unwrap();
    assert_eq!(first, Bytecode::Wide);
    assert_eq!(second, Bytecode::Add);

    let during = disassemble(writer.as_bytes()).unwrap();
    assert_eq!(during.len(), before.len());
    for (a, b) in before.iter().zip(&during) {
        assert_eq!(a.resolved.offset, b.resolved.offset);
        assert_eq!(a.resolved.total_size(), b.resolved.total_size());
    }
    assert_eq!(during[0].bytecode(), Bytecode::LdaSmi);
    assert_eq!(during[0].resolved.prefix, Some(Bytecode::DebugBreakWide));

    writer.clear_breakpoint(add, second).unwrap();
    writer.clear_breakpoint(0, first).unwrap();
    let after = disassemble(writer.as_bytes()).unwrap();
    assert_eq!(
        after.iter().map(|i| i.to_string()).collect::<Vec<_>>(),
        before.iter().map(|i| i.to_string()).collect::<Vec<_>>()
    );
}
