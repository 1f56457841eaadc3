//! Fixed native routines that live in the handler table next to the
//! bytecode handlers.

use std::fmt;

/// Interpreter routines that are not bytecode handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeRoutine {
    /// Sets up an interpreter frame and starts dispatch at offset 0
    EntryTrampoline,
    /// Re-enters dispatch at the current bytecode offset
    EnterAtBytecode,
    /// Re-enters dispatch after the current bytecode
    EnterAtNextBytecode,
    /// Pushes a register list as call arguments, then calls
    PushArgsThenCall,
}

impl NativeRoutine {
    pub const ALL: [NativeRoutine; 4] = [
        NativeRoutine::EntryTrampoline,
        NativeRoutine::EnterAtBytecode,
        NativeRoutine::EnterAtNextBytecode,
        NativeRoutine::PushArgsThenCall,
    ];

    pub const COUNT: usize = 4;

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            NativeRoutine::EntryTrampoline => "EntryTrampoline",
            NativeRoutine::EnterAtBytecode => "EnterAtBytecode",
            NativeRoutine::EnterAtNextBytecode => "EnterAtNextBytecode",
            NativeRoutine::PushArgsThenCall => "PushArgsThenCall",
        }
    }
}

impl fmt::Display for NativeRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
