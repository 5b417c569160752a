//! Trap handling for WebAssembly execution
//!
//! Compiled and interpreted code runs without explicit checks for division by
//! zero, out-of-bounds memory access, or stack exhaustion. The CPU faults, the
//! OS delivers a signal, and [`run_supervised`] turns it into an
//! [`Exception`] with a classified [`Cause`]. Code that detects a trap in
//! software (an `unreachable`, a bad indirect call) uses [`raise_trap`] to
//! take the same exit.

pub mod context;
pub mod exception;
pub mod limits;
mod sys;
pub mod traps;

pub use context::{capture_execution_context, describe_address, ExecutionContext, StackFrame};
pub use exception::{Cause, Exception, ExceptionValue, FaultDetails};
pub use traps::{init_thread, is_supervised, raise_trap, run_supervised};

/// Failures setting up trap handling
///
/// None of these are traps: each one means faults can no longer be delivered
/// safely to the calling thread.
#[derive(Debug, thiserror::Error)]
pub enum TrapError {
    #[error("Failed to allocate a {size} byte signal stack")]
    SignalStackAllocation { size: usize },
    #[error("Failed to install the signal stack: {0}")]
    SignalStack(#[source] std::io::Error),
    #[error("Failed to install the handler for signal {signal}: {source}")]
    HandlerInstall {
        signal: i32,
        #[source]
        source: std::io::Error,
    },
}
