//! JIT error types.
//!
//! This module defines [`JitError`] and [`JitResult`] for the Cranelift
//! handler generator.

use std::fmt;

use crate::dispatch::{DispatchError, GenerateError, HandlerIndex};

// =============================================================================
// JitResult and JitError
// =============================================================================

/// Error types for native handler generation
#[derive(Debug, Clone)]
pub enum JitError {
    /// Cranelift settings, ISA or module error
    CompilationError(String),

    /// The host has no Cranelift backend
    UnsupportedHost(String),

    /// A slot outside the layout the generator was created for
    UnknownSlot(HandlerIndex),

    /// Table construction failed
    Dispatch(DispatchError),
}

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitError::CompilationError(msg) => write!(f, "Compilation error: {}", msg),
            JitError::UnsupportedHost(msg) => write!(f, "Unsupported host: {}", msg),
            JitError::UnknownSlot(index) => write!(f, "Unknown handler slot: {}", index),
            JitError::Dispatch(err) => write!(f, "Dispatch error: {}", err),
        }
    }
}

impl std::error::Error for JitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JitError::Dispatch(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DispatchError> for JitError {
    fn from(err: DispatchError) -> Self {
        JitError::Dispatch(err)
    }
}

impl From<JitError> for GenerateError {
    fn from(err: JitError) -> Self {
        GenerateError::new(err.to_string())
    }
}

/// Result type for JIT operations
pub type JitResult<T> = Result<T, JitError>;
