//! Handler table builder
//!
//! Construction runs in three phases:
//!
//! ```text
//!   Empty ──install_placeholders──▶ Placeholdered ──fill / fill_parallel──▶ Filled ──finalize──▶ HandlerTable
//! ```
//!
//! The layout fixes every slot's [`HandlerIndex`] up front, so a generator can
//! emit a reference to a peer whose code does not exist yet. Each such
//! reference is a relocation: at generation time it points at a placeholder.
//! `finalize` checks every recorded reference against the layout and only then
//! hands out the table; any failure discards the whole build.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::bytecode::{Bytecode, OperandScale};
use crate::config::BuildConfig;

use super::error::{BuildState, DispatchError, DispatchResult, GenerateError};
use super::layout::{DispatchLayout, HandlerIndex, SlotCategory, SlotKind};
use super::native::NativeRoutine;
use super::table::{BuildStats, DispatchTable, HandlerTable};

/// One slot the generator is asked to produce
#[derive(Debug, Clone, Copy)]
pub struct HandlerRequest<'a> {
    index: HandlerIndex,
    kind: SlotKind,
    layout: &'a DispatchLayout,
}

impl<'a> HandlerRequest<'a> {
    #[inline]
    pub fn index(&self) -> HandlerIndex {
        self.index
    }

    #[inline]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    #[inline]
    pub fn layout(&self) -> &'a DispatchLayout {
        self.layout
    }

    /// Index of another bytecode handler
    pub fn peer(&self, bytecode: Bytecode, scale: OperandScale) -> Option<HandlerIndex> {
        self.layout.index_of(bytecode, scale)
    }

    /// Index of a native routine
    pub fn native(&self, routine: NativeRoutine) -> HandlerIndex {
        self.layout.native(routine)
    }

    /// Index of the `Illegal` handler
    pub fn illegal(&self) -> HandlerIndex {
        self.layout.illegal()
    }
}

/// Generated code for one slot
pub trait HandlerArtifact {
    /// Slots this code refers to
    fn references(&self) -> &[HandlerIndex];
}

/// Produces the code for handler slots
pub trait HandlerGenerator {
    type Artifact: HandlerArtifact;

    /// Generate the code for one slot. Called exactly once per slot.
    fn generate(&self, request: &HandlerRequest<'_>) -> Result<Self::Artifact, GenerateError>;
}

enum Entry<A> {
    /// Stand-in tagged with the category of code it will become
    Placeholder(SlotCategory),
    Filled(A),
}

/// Builds a [`HandlerTable`] from a layout and a generator
pub struct HandlerTableBuilder<A> {
    layout: DispatchLayout,
    config: BuildConfig,
    state: BuildState,
    entries: Vec<Entry<A>>,
    references: usize,
    relocations: usize,
    parallel: bool,
    started: Instant,
}

impl<A: HandlerArtifact> HandlerTableBuilder<A> {
    pub fn new(layout: DispatchLayout, config: BuildConfig) -> Self {
        Self {
            layout,
            config,
            state: BuildState::Empty,
            entries: Vec::new(),
            references: 0,
            relocations: 0,
            parallel: false,
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn layout(&self) -> &DispatchLayout {
        &self.layout
    }

    /// Number of slots currently holding a placeholder
    pub fn placeholder_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, Entry::Placeholder(_)))
            .count()
    }

    /// Category of code a still-unfilled slot will become
    pub fn placeholder_category(&self, index: HandlerIndex) -> Option<SlotCategory> {
        match self.entries.get(index.index())? {
            Entry::Placeholder(category) => Some(*category),
            Entry::Filled(_) => None,
        }
    }

    fn expect_state(&self, operation: &'static str, expected: BuildState) -> DispatchResult<()> {
        if self.state != expected {
            return Err(DispatchError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Put a placeholder into every slot
    pub fn install_placeholders(&mut self) -> DispatchResult<()> {
        self.expect_state("install placeholders into", BuildState::Empty)?;
        self.entries = self
            .layout
            .slots()
            .map(|(_, kind)| Entry::Placeholder(kind.category()))
            .collect();
        self.state = BuildState::Placeholdered;
        debug!(
            target: "ignis::dispatch::builder",
            slots = self.entries.len(),
            "Installed placeholders"
        );
        Ok(())
    }

    fn request(&self, index: HandlerIndex, kind: SlotKind) -> HandlerRequest<'_> {
        HandlerRequest {
            index,
            kind,
            layout: &self.layout,
        }
    }

    fn log_generated(&self, index: HandlerIndex, kind: SlotKind, artifact: &A) {
        if self.config.trace_codegen {
            trace!(
                target: "ignis::dispatch::builder",
                %index,
                %kind,
                references = artifact.references().len(),
                "Generated handler"
            );
        }
    }

    /// Generate every slot in index order
    pub fn fill<G>(&mut self, generator: &G) -> DispatchResult<()>
    where
        G: HandlerGenerator<Artifact = A>,
    {
        self.expect_state("fill", BuildState::Placeholdered)?;
        let slots: Vec<_> = self.layout.slots().collect();
        for (index, kind) in slots {
            let artifact = match generator.generate(&self.request(index, kind)) {
                Ok(artifact) => artifact,
                Err(source) => {
                    warn!(
                        target: "ignis::dispatch::builder",
                        %index,
                        %kind,
                        error = %source,
                        "Handler generation failed"
                    );
                    self.state = BuildState::Failed;
                    return Err(DispatchError::Generator {
                        slot: index,
                        kind,
                        source,
                    });
                }
            };
            for reference in artifact.references() {
                self.references += 1;
                let pending = matches!(
                    self.entries.get(reference.index()),
                    Some(Entry::Placeholder(_))
                );
                if pending {
                    self.relocations += 1;
                }
            }
            self.log_generated(index, kind, &artifact);
            self.entries[index.index()] = Entry::Filled(artifact);
        }
        self.state = BuildState::Filled;
        Ok(())
    }

    /// Generate every slot on a rayon pool
    ///
    /// All slots are placeholders while generation runs, so every in-layout
    /// reference counts as a relocation.
    pub fn fill_parallel<G>(&mut self, generator: &G) -> DispatchResult<()>
    where
        G: HandlerGenerator<Artifact = A> + Sync,
        A: Send,
    {
        self.expect_state("fill", BuildState::Placeholdered)?;
        let threads = self.config.effective_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ignis-codegen-{}", i))
            .build()
            .map_err(|e| DispatchError::ThreadPool(e.to_string()))?;

        let layout = &self.layout;
        let slots: Vec<_> = layout.slots().collect();
        let artifacts: DispatchResult<Vec<A>> = pool.install(|| {
            slots
                .par_iter()
                .map(|&(index, kind)| {
                    let request = HandlerRequest {
                        index,
                        kind,
                        layout,
                    };
                    generator
                        .generate(&request)
                        .map_err(|source| DispatchError::Generator {
                            slot: index,
                            kind,
                            source,
                        })
                })
                .collect::<DispatchResult<Vec<_>>>()
        });
        let artifacts = match artifacts {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!(target: "ignis::dispatch::builder", error = %e, "Parallel generation failed");
                self.state = BuildState::Failed;
                return Err(e);
            }
        };

        for ((index, kind), artifact) in slots.into_iter().zip(artifacts) {
            let refs = artifact.references();
            self.references += refs.len();
            self.relocations += refs.iter().filter(|r| layout.contains(**r)).count();
            self.log_generated(index, kind, &artifact);
            self.entries[index.index()] = Entry::Filled(artifact);
        }
        self.parallel = true;
        self.state = BuildState::Filled;
        debug!(
            target: "ignis::dispatch::builder",
            threads,
            slots = self.entries.len(),
            "Generated handlers in parallel"
        );
        Ok(())
    }

    /// Verify every slot and reference, then produce the table
    pub fn finalize(self) -> DispatchResult<HandlerTable<A>> {
        if self.state != BuildState::Filled {
            // A placeholdered table reports the first unfilled slot
            if self.state == BuildState::Placeholdered {
                if let Some((slot, kind)) = self
                    .layout
                    .slots()
                    .find(|(i, _)| matches!(self.entries[i.index()], Entry::Placeholder(_)))
                {
                    return Err(DispatchError::UnfilledSlot { slot, kind });
                }
            }
            return Err(DispatchError::InvalidState {
                operation: "finalize",
                state: self.state,
            });
        }

        let mut handlers = Vec::with_capacity(self.entries.len());
        for ((slot, kind), entry) in self.layout.slots().zip(self.entries) {
            match entry {
                Entry::Filled(artifact) => {
                    if self.config.verify_references {
                        if let Some(&to) = artifact
                            .references()
                            .iter()
                            .find(|r| !self.layout.contains(**r))
                        {
                            return Err(DispatchError::DanglingReference { from: slot, to });
                        }
                    }
                    handlers.push(artifact);
                }
                Entry::Placeholder(_) => return Err(DispatchError::UnfilledSlot { slot, kind }),
            }
        }

        let stats = BuildStats {
            slots: handlers.len(),
            references: self.references,
            relocations: self.relocations,
            parallel: self.parallel,
            elapsed: self.started.elapsed(),
        };
        info!(
            target: "ignis::dispatch::builder",
            slots = stats.slots,
            references = stats.references,
            relocations = stats.relocations,
            parallel = stats.parallel,
            elapsed_us = stats.elapsed.as_micros() as u64,
            "Handler table finalized"
        );

        let dispatch = DispatchTable::new(&self.layout);
        Ok(HandlerTable::from_parts(self.layout, handlers, dispatch, stats))
    }
}

/// Build a handler table by generating slots one at a time
pub fn build_handler_table<G>(
    generator: &G,
    config: &BuildConfig,
) -> DispatchResult<HandlerTable<G::Artifact>>
where
    G: HandlerGenerator,
{
    let mut builder = HandlerTableBuilder::new(DispatchLayout::new(), config.clone());
    builder.install_placeholders()?;
    builder.fill(generator)?;
    builder.finalize()
}

/// Build a handler table, generating in parallel when `config.parallel` is set
pub fn build_handler_table_parallel<G>(
    generator: &G,
    config: &BuildConfig,
) -> DispatchResult<HandlerTable<G::Artifact>>
where
    G: HandlerGenerator + Sync,
    G::Artifact: Send,
{
    let mut builder = HandlerTableBuilder::new(DispatchLayout::new(), config.clone());
    builder.install_placeholders()?;
    if config.parallel {
        builder.fill_parallel(generator)?;
    } else {
        builder.fill(generator)?;
    }
    builder.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::{smallvec, SmallVec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Stub {
        refs: SmallVec<[HandlerIndex; 2]>,
    }

    impl HandlerArtifact for Stub {
        fn references(&self) -> &[HandlerIndex] {
            &self.refs
        }
    }

    /// Scaled handlers reference their Single peer; LdaZero references Return
    struct PeerGenerator {
        calls: AtomicUsize,
    }

    impl HandlerGenerator for PeerGenerator {
        type Artifact = Stub;

        fn generate(&self, request: &HandlerRequest<'_>) -> Result<Stub, GenerateError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let refs = match request.kind() {
                SlotKind::Bytecode { bytecode, scale } if scale != OperandScale::Single => {
                    smallvec![request.peer(bytecode, OperandScale::Single).unwrap()]
                }
                SlotKind::Bytecode {
                    bytecode: Bytecode::LdaZero,
                    ..
                } => smallvec![request.peer(Bytecode::Return, OperandScale::Single).unwrap()],
                _ => SmallVec::new(),
            };
            Ok(Stub { refs })
        }
    }

    fn peer_generator() -> PeerGenerator {
        PeerGenerator {
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_build_counts_relocations() {
        let generator = peer_generator();
        let table = build_handler_table(&generator, &BuildConfig::default()).unwrap();
        let layout = DispatchLayout::new();
        assert_eq!(generator.calls.load(Ordering::Relaxed), layout.len());
        // Only LdaZero -> Return points forward at generation time
        assert_eq!(table.stats().relocations, 1);
        let scaled = layout.slots_at_scale(OperandScale::Double)
            + layout.slots_at_scale(OperandScale::Quadruple);
        assert_eq!(table.stats().references, scaled + 1);
    }

    #[test]
    fn test_parallel_build_matches_sequential() {
        let sequential = build_handler_table(&peer_generator(), &BuildConfig::default()).unwrap();
        let parallel = build_handler_table_parallel(
            &peer_generator(),
            &BuildConfig::parallel().with_threads(2),
        )
        .unwrap();
        assert_eq!(sequential.len(), parallel.len());
        assert!(parallel.stats().parallel);
        assert_eq!(parallel.stats().relocations, parallel.stats().references);
        for (index, _) in sequential.layout().slots() {
            assert_eq!(sequential[index].refs, parallel[index].refs);
        }
    }

    #[test]
    fn test_state_machine() {
        let mut builder: HandlerTableBuilder<Stub> =
            HandlerTableBuilder::new(DispatchLayout::new(), BuildConfig::default());
        assert_eq!(builder.state(), BuildState::Empty);
        assert!(matches!(
            builder.fill(&peer_generator()),
            Err(DispatchError::InvalidState { state: BuildState::Empty, .. })
        ));

        builder.install_placeholders().unwrap();
        assert_eq!(builder.placeholder_count(), builder.layout().len());
        assert!(builder.install_placeholders().is_err());

        builder.fill(&peer_generator()).unwrap();
        assert_eq!(builder.state(), BuildState::Filled);
        assert_eq!(builder.placeholder_count(), 0);
        assert!(builder.finalize().is_ok());
    }

    #[test]
    fn test_finalize_without_fill_reports_unfilled_slot() {
        let mut builder: HandlerTableBuilder<Stub> =
            HandlerTableBuilder::new(DispatchLayout::new(), BuildConfig::default());
        builder.install_placeholders().unwrap();
        assert!(matches!(
            builder.finalize(),
            Err(DispatchError::UnfilledSlot { slot, .. }) if slot == HandlerIndex::new(0)
        ));
    }

    struct FailingGenerator;

    impl HandlerGenerator for FailingGenerator {
        type Artifact = Stub;

        fn generate(&self, request: &HandlerRequest<'_>) -> Result<Stub, GenerateError> {
            match request.kind() {
                SlotKind::Native(NativeRoutine::PushArgsThenCall) => {
                    Err(GenerateError::new("out of code space"))
                }
                _ => Ok(Stub {
                    refs: SmallVec::new(),
                }),
            }
        }
    }

    #[test]
    fn test_generator_failure_aborts_build() {
        let err = build_handler_table(&FailingGenerator, &BuildConfig::default()).unwrap_err();
        match err {
            DispatchError::Generator { kind, source, .. } => {
                assert_eq!(kind, SlotKind::Native(NativeRoutine::PushArgsThenCall));
                assert_eq!(source.message(), "out of code space");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(build_handler_table_parallel(&FailingGenerator, &BuildConfig::parallel()).is_err());
    }

    struct DanglingGenerator;

    impl HandlerGenerator for DanglingGenerator {
        type Artifact = Stub;

        fn generate(&self, request: &HandlerRequest<'_>) -> Result<Stub, GenerateError> {
            let refs = if request.index() == request.illegal() {
                smallvec![HandlerIndex::new(request.layout().len() + 10)]
            } else {
                SmallVec::new()
            };
            Ok(Stub { refs })
        }
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let err = build_handler_table(&DanglingGenerator, &BuildConfig::default()).unwrap_err();
        assert!(matches!(err, DispatchError::DanglingReference { .. }));

        // Unchecked builds trust the generator
        let config = BuildConfig::default().with_verify_references(false);
        assert!(build_handler_table(&DanglingGenerator, &config).is_ok());
    }

    /// Fails once, at slot `fail_at`, then generates normally
    struct FlakyGenerator {
        fail_at: HandlerIndex,
    }

    impl HandlerGenerator for FlakyGenerator {
        type Artifact = Stub;

        fn generate(&self, request: &HandlerRequest<'_>) -> Result<Stub, GenerateError> {
            if request.index() == self.fail_at {
                return Err(GenerateError::new("transient failure"));
            }
            Ok(Stub {
                refs: SmallVec::new(),
            })
        }
    }

    #[test]
    fn test_failed_fill_cannot_be_retried() {
        let mut builder = HandlerTableBuilder::new(DispatchLayout::new(), BuildConfig::default());
        builder.install_placeholders().unwrap();
        let flaky = FlakyGenerator {
            fail_at: HandlerIndex::new(50),
        };
        assert!(matches!(
            builder.fill(&flaky),
            Err(DispatchError::Generator { slot, .. }) if slot == HandlerIndex::new(50)
        ));
        assert_eq!(builder.state(), BuildState::Failed);

        let healthy = FlakyGenerator {
            fail_at: HandlerIndex::new(usize::MAX),
        };
        assert_eq!(
            builder.fill(&healthy),
            Err(DispatchError::InvalidState {
                operation: "fill",
                state: BuildState::Failed,
            })
        );
        assert!(matches!(
            builder.finalize(),
            Err(DispatchError::InvalidState {
                operation: "finalize",
                state: BuildState::Failed,
            })
        ));
    }

    #[test]
    fn test_failed_parallel_fill_cannot_be_retried() {
        let mut builder = HandlerTableBuilder::new(DispatchLayout::new(), BuildConfig::parallel());
        builder.install_placeholders().unwrap();
        let flaky = FlakyGenerator {
            fail_at: HandlerIndex::new(3),
        };
        assert!(builder.fill_parallel(&flaky).is_err());
        assert_eq!(builder.state(), BuildState::Failed);
        assert!(builder.fill_parallel(&flaky).is_err());
        assert!(builder.fill(&flaky).is_err());
    }

    #[test]
    fn test_placeholder_category() {
        let layout = DispatchLayout::new();
        let native = layout.native(NativeRoutine::EntryTrampoline);
        let mut builder = HandlerTableBuilder::new(layout, BuildConfig::default());
        assert_eq!(builder.placeholder_category(HandlerIndex::new(0)), None);

        builder.install_placeholders().unwrap();
        assert_eq!(
            builder.placeholder_category(HandlerIndex::new(0)),
            Some(SlotCategory::BytecodeHandler)
        );
        assert_eq!(
            builder.placeholder_category(native),
            Some(SlotCategory::NativeRoutine)
        );

        builder.fill(&peer_generator()).unwrap();
        assert_eq!(builder.placeholder_category(native), None);
    }
}
