//! Handler Dispatch Module
//!
//! Construction of the interpreter's handler table: one handler per
//! (bytecode, operand scale) pair that needs one, plus a few native routines.
//!
//! # Architecture
//!
//! ```text
//! DispatchLayout ──▶ HandlerTableBuilder ──▶ HandlerTable ──▶ HandlerTableCell
//!  fixed indices      placeholders, fill       immutable        published once
//!                     (HandlerGenerator)
//! ```
//!
//! Generators are pluggable through [`HandlerGenerator`]; the Cranelift
//! generator in `crate::jit` is one implementation.
//!
//! # Modules
//!
//! - [`layout`]: Slot assignment and [`HandlerIndex`]
//! - [`native`]: Non-bytecode routines in the table
//! - [`builder`]: Phased construction and generator traits
//! - [`table`]: Finished tables, dispatch by opcode byte, publication
//! - [`error`]: Construction errors

pub mod builder;
pub mod error;
pub mod layout;
pub mod native;
pub mod table;

pub use builder::{
    build_handler_table, build_handler_table_parallel, HandlerArtifact, HandlerGenerator,
    HandlerRequest, HandlerTableBuilder,
};
pub use error::{BuildState, DispatchError, DispatchResult, GenerateError};
pub use layout::{needs_handler, DispatchLayout, HandlerIndex, SlotCategory, SlotKind};
pub use native::NativeRoutine;
pub use table::{BuildStats, DispatchTable, HandlerTable, HandlerTableCell};
