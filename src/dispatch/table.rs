//! Finalized handler tables and their publication
//!
//! A [`HandlerTable`] is immutable once built and is `Send + Sync` whenever its
//! handler type is. The interpreter reads it without locking; publication
//! goes through a [`HandlerTableCell`], which hands the table out only after
//! it has been fully constructed.

use std::ops::Index;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tracing::debug;

use crate::bytecode::{Bytecode, OperandScale};

use super::error::{DispatchError, DispatchResult};
use super::layout::{DispatchLayout, HandlerIndex, SlotKind};
use super::native::NativeRoutine;

/// Handler index per (opcode byte, scale)
///
/// Every one of the 256 opcode bytes is mapped at every scale. Bytes that are
/// not bytecodes, and bytecodes that cannot be scaled, map to `Illegal`.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    entries: Box<[HandlerIndex]>,
}

impl DispatchTable {
    const BYTES: usize = 256;

    pub fn new(layout: &DispatchLayout) -> Self {
        let illegal = layout.illegal();
        let mut entries = vec![illegal; Self::BYTES * OperandScale::COUNT];
        for scale in OperandScale::ALL {
            for bytecode in Bytecode::iter() {
                if let Some(index) = layout.index_of(bytecode, scale) {
                    entries[scale.index() * Self::BYTES + bytecode.to_byte() as usize] = index;
                }
            }
        }
        Self {
            entries: entries.into_boxed_slice(),
        }
    }

    /// Handler for an opcode byte dispatched at `scale`
    #[inline]
    pub fn lookup(&self, byte: u8, scale: OperandScale) -> HandlerIndex {
        self.entries[scale.index() * Self::BYTES + byte as usize]
    }

    /// Number of mapped (byte, scale) pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counters collected while building a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    /// Slots in the table
    pub slots: usize,
    /// Peer references recorded by the generator
    pub references: usize,
    /// References that pointed at a placeholder when they were generated
    pub relocations: usize,
    /// Slots were generated on a worker pool
    pub parallel: bool,
    pub elapsed: Duration,
}

/// Immutable table of generated handlers indexed by [`HandlerIndex`]
#[derive(Debug, Clone)]
pub struct HandlerTable<A> {
    layout: DispatchLayout,
    handlers: Vec<A>,
    dispatch: DispatchTable,
    stats: BuildStats,
}

impl<A> HandlerTable<A> {
    pub(crate) fn from_parts(
        layout: DispatchLayout,
        handlers: Vec<A>,
        dispatch: DispatchTable,
        stats: BuildStats,
    ) -> Self {
        Self {
            layout,
            handlers,
            dispatch,
            stats,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn layout(&self) -> &DispatchLayout {
        &self.layout
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Handler slot for `bytecode` at `scale`, `Illegal` when the pair has none
    #[inline]
    pub fn handler_for(&self, bytecode: Bytecode, scale: OperandScale) -> HandlerIndex {
        self.layout
            .index_of(bytecode, scale)
            .unwrap_or_else(|| self.layout.illegal())
    }

    /// Handler reached by dispatching a raw opcode byte
    #[inline]
    pub fn dispatch(&self, byte: u8, scale: OperandScale) -> &A {
        &self.handlers[self.dispatch.lookup(byte, scale).index()]
    }

    #[inline]
    pub fn native(&self, routine: NativeRoutine) -> &A {
        &self.handlers[self.layout.native(routine).index()]
    }

    #[inline]
    pub fn get(&self, index: HandlerIndex) -> Option<&A> {
        self.handlers.get(index.index())
    }

    /// Iterate over `(index, slot, handler)` in index order
    pub fn iter(&self) -> impl Iterator<Item = (HandlerIndex, SlotKind, &A)> + '_ {
        self.layout
            .slots()
            .zip(self.handlers.iter())
            .map(|((index, kind), handler)| (index, kind, handler))
    }

    /// Convert every handler, keeping indices and layout
    pub fn map<B, E, F>(self, mut f: F) -> Result<HandlerTable<B>, E>
    where
        F: FnMut(HandlerIndex, A) -> Result<B, E>,
    {
        let handlers = self
            .handlers
            .into_iter()
            .enumerate()
            .map(|(i, handler)| f(HandlerIndex::new(i), handler))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(HandlerTable {
            layout: self.layout,
            handlers,
            dispatch: self.dispatch,
            stats: self.stats,
        })
    }
}

impl<A> Index<HandlerIndex> for HandlerTable<A> {
    type Output = A;

    fn index(&self, index: HandlerIndex) -> &A {
        &self.handlers[index.index()]
    }
}

/// Write-once slot through which a finished table is published
#[derive(Debug)]
pub struct HandlerTableCell<A> {
    cell: OnceLock<HandlerTable<A>>,
    building: Mutex<()>,
}

impl<A> HandlerTableCell<A> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            building: Mutex::new(()),
        }
    }

    /// Publish `table`; fails if a table was already published
    pub fn publish(&self, table: HandlerTable<A>) -> DispatchResult<&HandlerTable<A>> {
        let slots = table.len();
        self.cell
            .set(table)
            .map_err(|_| DispatchError::AlreadyPublished)?;
        debug!(target: "ignis::dispatch::table", slots, "Published handler table");
        self.get().ok_or(DispatchError::AlreadyPublished)
    }

    /// The published table, if any
    #[inline]
    pub fn get(&self) -> Option<&HandlerTable<A>> {
        self.cell.get()
    }

    /// Publish the table produced by `build` unless one is already published
    ///
    /// Concurrent callers are serialized, so `build` runs at most once per
    /// cell unless it fails. A table handed to [`HandlerTableCell::publish`]
    /// while `build` runs takes precedence.
    pub fn get_or_build<F>(&self, build: F) -> DispatchResult<&HandlerTable<A>>
    where
        F: FnOnce() -> DispatchResult<HandlerTable<A>>,
    {
        if let Some(table) = self.get() {
            return Ok(table);
        }
        let _guard = self
            .building
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(table) = self.get() {
            return Ok(table);
        }
        let table = build()?;
        if self.cell.set(table).is_ok() {
            debug!(target: "ignis::dispatch::table", "Built and published handler table");
        }
        self.get().ok_or(DispatchError::AlreadyPublished)
    }
}

impl<A> Default for HandlerTableCell<A> {
    fn default() -> Self {
        Self::new()
    }
}
