//! Benchmark for handler table construction
//!
//! Compares sequential and rayon-parallel fills with a generator whose per-slot
//! cost is configurable, and measures native generation through Cranelift.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ignis::bytecode::OperandScale;
use ignis::config::BuildConfig;
use ignis::dispatch::{
    build_handler_table, build_handler_table_parallel, DispatchLayout, GenerateError,
    HandlerArtifact, HandlerGenerator, HandlerIndex, HandlerRequest, SlotKind,
};
use smallvec::SmallVec;

/// Stand-in generator that spins for `work` rounds per slot
struct BusyGenerator {
    work: u64,
}

struct BusyHandler {
    checksum: u64,
    references: SmallVec<[HandlerIndex; 2]>,
}

impl HandlerArtifact for BusyHandler {
    fn references(&self) -> &[HandlerIndex] {
        &self.references
    }
}

impl HandlerGenerator for BusyGenerator {
    type Artifact = BusyHandler;

    fn generate(&self, request: &HandlerRequest<'_>) -> Result<BusyHandler, GenerateError> {
        let mut checksum = request.index().index() as u64;
        for i in 0..self.work {
            checksum = checksum.wrapping_mul(6364136223846793005).wrapping_add(i);
        }
        let mut references = SmallVec::new();
        if let SlotKind::Bytecode { bytecode, scale } = request.kind() {
            if scale != OperandScale::Single {
                references.extend(request.peer(bytecode, OperandScale::Single));
            }
        }
        Ok(BusyHandler {
            checksum,
            references,
        })
    }
}

// ============================================================================
// Benchmark 1: Layout
// ============================================================================

fn bench_layout(c: &mut Criterion) {
    c.bench_function("layout/new", |b| b.iter(|| black_box(DispatchLayout::new()).len()));
}

// ============================================================================
// Benchmark 2: Sequential vs Parallel Fill
// ============================================================================

fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill");
    group.measurement_time(Duration::from_secs(5));

    for work in [0u64, 1_000, 20_000].iter() {
        let generator = BusyGenerator { work: *work };

        group.bench_with_input(BenchmarkId::new("sequential", work), &generator, |b, g| {
            b.iter(|| {
                build_handler_table(g, &BuildConfig::sequential())
                    .map(|t| t.iter().map(|(_, _, h)| h.checksum).sum::<u64>())
            })
        });

        group.bench_with_input(BenchmarkId::new("parallel", work), &generator, |b, g| {
            b.iter(|| {
                build_handler_table_parallel(g, &BuildConfig::parallel())
                    .map(|t| t.iter().map(|(_, _, h)| h.checksum).sum::<u64>())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark 3: Native Generation
// ============================================================================

#[cfg(feature = "jit")]
fn bench_native(c: &mut Criterion) {
    let mut group = c.benchmark_group("native");
    group.sample_size(10);

    for level in [ignis::config::OptLevel::None, ignis::config::OptLevel::Speed] {
        let config = BuildConfig::sequential().with_opt_level(level);
        group.bench_with_input(BenchmarkId::new("cranelift", level), &config, |b, config| {
            b.iter(|| ignis::jit::compile_handler_table(config).map(|t| t.table().len()))
        });
    }

    group.finish();
}

#[cfg(not(feature = "jit"))]
fn bench_native(_c: &mut Criterion) {}

// ============================================================================
// Main
// ============================================================================

criterion_group!(benches, bench_layout, bench_fill, bench_native);

criterion_main!(benches);
