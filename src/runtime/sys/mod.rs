//! Platform layer for trap handling
//!
//! Everything OS-specific lives behind this module: per-thread setup, fault
//! handler installation, and symbol lookup. The resumption point itself is
//! taken by a small C helper compiled in `build.rs`.

use std::ffi::{c_int, c_void};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::{describe_address, lazy_per_thread_init, HandlerGuard};

#[cfg(not(unix))]
mod unsupported;
#[cfg(not(unix))]
pub(crate) use unsupported::{describe_address, lazy_per_thread_init, HandlerGuard};

/// Per-thread facts the fault handler needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThreadInfo {
    /// Lowest usable address of the thread's stack, or zero if unknown
    pub stack_limit: usize,
}

extern "C" {
    fn kasm_core_setjmp(
        jmp_buf_out: *mut *const c_void,
        body: extern "C" fn(*mut c_void),
        payload: *mut c_void,
    ) -> c_int;
    fn kasm_core_longjmp(jmp_buf: *const c_void) -> !;
}

/// Publish a resumption point through `jmp_buf_out` and run `body(payload)`
///
/// Returns true if `body` returned and false if control came back through
/// [`resume`].
///
/// # Safety
///
/// `jmp_buf_out` must stay valid for the duration of the call and `body` must
/// not unwind.
pub(crate) unsafe fn call_with_resumption_point(
    jmp_buf_out: *mut *const c_void,
    body: extern "C" fn(*mut c_void),
    payload: *mut c_void,
) -> bool {
    kasm_core_setjmp(jmp_buf_out, body, payload) != 0
}

/// Jump back to a resumption point
///
/// # Safety
///
/// `jmp_buf` must come from a [`call_with_resumption_point`] that has not yet
/// returned on this thread. Frames in between are discarded without running
/// destructors.
pub(crate) unsafe fn resume(jmp_buf: *const c_void) -> ! {
    kasm_core_longjmp(jmp_buf)
}
