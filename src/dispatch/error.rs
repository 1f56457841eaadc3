//! Handler table construction errors.

use std::fmt;

use super::layout::{HandlerIndex, SlotKind};

/// Failure reported by a handler generator for one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateError {
    message: String,
}

impl GenerateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GenerateError {}

/// Construction phase of a handler table builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// No entries yet
    Empty,
    /// Every slot holds a placeholder
    Placeholdered,
    /// Every slot holds generated code, references not yet verified
    Filled,
    /// Generation failed part way; the builder cannot be reused
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Empty => "empty",
            BuildState::Placeholdered => "placeholdered",
            BuildState::Filled => "filled",
            BuildState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Error types for handler table construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The generator failed for a slot
    Generator {
        slot: HandlerIndex,
        kind: SlotKind,
        source: GenerateError,
    },

    /// A slot still holds its placeholder at finalization
    UnfilledSlot { slot: HandlerIndex, kind: SlotKind },

    /// Generated code references an index outside the layout
    DanglingReference { from: HandlerIndex, to: HandlerIndex },

    /// Builder operation called in the wrong phase
    InvalidState {
        operation: &'static str,
        state: BuildState,
    },

    /// Worker pool for parallel generation could not be created
    ThreadPool(String),

    /// A table was already published to this cell
    AlreadyPublished,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Generator { slot, kind, source } => {
                write!(f, "Handler generation failed for {} ({}): {}", kind, slot, source)
            }
            DispatchError::UnfilledSlot { slot, kind } => {
                write!(f, "Handler slot {} ({}) was never filled", slot, kind)
            }
            DispatchError::DanglingReference { from, to } => {
                write!(f, "Handler {} references unknown slot {}", from, to)
            }
            DispatchError::InvalidState { operation, state } => {
                write!(f, "Cannot {} a {} handler table", operation, state)
            }
            DispatchError::ThreadPool(msg) => write!(f, "Thread pool error: {}", msg),
            DispatchError::AlreadyPublished => write!(f, "Handler table already published"),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Generator { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for handler table construction
pub type DispatchResult<T> = Result<T, DispatchError>;
