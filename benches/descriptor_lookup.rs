//! Benchmark for descriptor table lookups and stream decoding
//!
//! Measures the const-derived size/offset tables against the hot paths an
//! interpreter or bytecode tool hits: per-instruction size queries, prefix
//! resolution over a whole stream and breakpoint substitution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ignis::bytecode::{
    debug_break, disassemble, Bytecode, BytecodeIterator, BytecodeWriter, OperandScale,
};

/// Stream mixing every scale, `count` instructions long
fn build_stream(count: usize) -> Vec<u8> {
    let mut writer = BytecodeWriter::with_capacity(count * 4);
    for i in 0..count {
        let value = (i as i64) * 37;
        match i % 5 {
            0 => writer.emit(Bytecode::LdaSmi, &[value % 100]),
            1 => writer.emit(Bytecode::Add, &[3, value]),
            2 => writer.emit(Bytecode::Star, &[(i % 100) as i64]),
            3 => writer.emit(Bytecode::LdaConstant, &[value * 1000]),
            _ => writer.emit(Bytecode::Nop, &[]),
        }
        .expect("encodable instruction");
    }
    writer.into_bytes()
}

// ============================================================================
// Benchmark 1: Table Lookups
// ============================================================================

fn bench_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptor");
    group.throughput(Throughput::Elements(
        (Bytecode::COUNT * OperandScale::COUNT) as u64,
    ));

    group.bench_function("size_all_scales", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for bc in Bytecode::iter() {
                for scale in OperandScale::ALL {
                    total += black_box(bc).size(scale);
                }
            }
            total
        })
    });

    group.bench_function("operand_offsets", |b| {
        b.iter(|| {
            let mut total = 0usize;
            for bc in Bytecode::iter() {
                for i in 0..bc.operand_count() {
                    total += black_box(bc).operand_offset(i, OperandScale::Quadruple);
                }
            }
            total
        })
    });

    group.bench_function("debug_break", |b| {
        b.iter(|| {
            Bytecode::iter()
                .filter_map(|bc| debug_break(black_box(bc)).ok())
                .count()
        })
    });

    group.finish();
}

// ============================================================================
// Benchmark 2: Stream Decoding
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for count in [64, 1024, 16384].iter() {
        let code = build_stream(*count);
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("resolve", count), &code, |b, code| {
            b.iter(|| {
                BytecodeIterator::new(black_box(code))
                    .filter_map(Result::ok)
                    .count()
            })
        });

        group.bench_with_input(BenchmarkId::new("disassemble", count), &code, |b, code| {
            b.iter(|| disassemble(black_box(code)).map(|ins| ins.len()))
        });
    }

    group.finish();
}

// ============================================================================
// Main
// ============================================================================

criterion_group!(benches, bench_sizes, bench_decode);

criterion_main!(benches);
