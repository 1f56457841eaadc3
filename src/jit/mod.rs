//! Cranelift JIT Handler Generator
//!
//! A [`HandlerGenerator`](crate::dispatch::HandlerGenerator) that emits each
//! handler slot as a native function through Cranelift, then resolves the
//! finished table to callable entry points.
//!
//! ```text
//! DispatchLayout ──▶ CraneliftGenerator::new   declare every slot
//!                         │
//!                         ▼
//!                build_handler_table          define slot bodies
//!                         │
//!                         ▼
//!                   into_native               finalize, resolve pointers
//! ```

pub mod codegen;
pub mod error;

pub use codegen::{
    compile_handler_table, CompiledHandler, CraneliftGenerator, HandlerFn, NativeHandlerTable,
};
pub use error::{JitError, JitResult};
