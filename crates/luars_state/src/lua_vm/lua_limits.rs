//! Centralized thread limits and configuration constants.
//!
//! All magic numbers that control stack sizing, pseudo-indices and table
//! layout are collected here for easy tuning.

// ===== Pseudo-indices =====

/// Stack index addressing the registry table.
pub const REGISTRY_INDEX: i32 = -10000;

/// Stack index addressing the current environment table.
pub const ENVIRON_INDEX: i32 = -10001;

/// Stack index addressing the global variables table (`_G`).
pub const GLOBALS_INDEX: i32 = -10002;

/// Stack index addressing upvalue `i` (1-based) of the running closure.
#[inline]
pub const fn upvalue_index(i: i32) -> i32 {
    GLOBALS_INDEX - i
}

// ===== Calls =====

/// Result count requesting every value the callee returns.
pub const MULTRET: i32 = -1;

/// Default call-frame capacity of a thread.
pub const DEFAULT_CALL_STACK_SIZE: usize = 256;

/// Frames allocated at a time by the growable call-frame stack.
pub const CALL_FRAME_SEGMENT_SIZE: usize = 8;

/// Frames listed in a traceback before it is cut short.
pub const MAX_TRACEBACK_LEVELS: usize = 20;

// ===== Value stack =====

/// Default number of value-stack slots.
pub const DEFAULT_REGISTRY_SIZE: usize = 256 * 20;

/// Slots added each time a growable value stack runs out of room.
pub const DEFAULT_REGISTRY_GROW_STEP: usize = 32;

/// Scratch buffers kept by the allocator for reuse.
pub const ALLOCATOR_POOL_SIZE: usize = 8;

// ===== Tables =====

/// Integer keys at or above this bound always live in the hash part.
pub const MAX_ARRAY_INDEX: i64 = 67_108_864;
