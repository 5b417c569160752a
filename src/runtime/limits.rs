//! Limits for trap handling and diagnostics.

// =============================================================================
// Fault classification
// =============================================================================

/// Distance either side of a thread's stack limit within which an invalid
/// memory access is classified as a stack overflow
pub const STACK_OVERFLOW_WINDOW: usize = 16 * 1024;

// =============================================================================
// Signal stack
// =============================================================================

/// Size of the alternate signal stack allocated for threads that do not
/// already have a large enough one
///
/// The handler classifies the fault and jumps out; it never runs Rust code
/// that allocates or formats, so one signal frame plus headroom is enough.
pub const SIGNAL_STACK_SIZE: usize = 64 * 1024;

// =============================================================================
// Diagnostics
// =============================================================================

/// Maximum number of frames kept in an execution context
pub const MAX_CALLSTACK_FRAMES: usize = 512;
