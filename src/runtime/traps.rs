//! Supervised execution
//!
//! [`run_supervised`] is the only way to run code that may fault. While it is
//! active, SIGFPE, SIGSEGV and SIGBUS are routed to a handler that classifies
//! the fault and jumps back to the supervising call, which then returns an
//! [`ExceptionValue::Exception`] instead of letting the process die.
//! [`raise_trap`] takes the same exit for traps detected in software.
//!
//! Each active call owns a [`TrapState`] on its own stack frame. The states
//! of one thread form a stack whose head is kept in a thread local: entering a
//! call pushes its state and remembers the previous head, leaving restores
//! it. Nested calls therefore never touch the slots of the call they are
//! nested in, and the fault handler always reports to the innermost call.
//!
//! A trap abandons every frame between the fault and the supervising call
//! without running destructors. Anything those frames owned is leaked; locks
//! they held stay held.

use super::context::capture_fault_context;
use super::exception::{Cause, Exception, ExceptionValue, FaultDetails};
use super::limits::STACK_OVERFLOW_WINDOW;
use super::{sys, TrapError};
use std::any::Any;
use std::cell::Cell;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

thread_local! {
    static CURRENT: Cell<*const TrapState> = const { Cell::new(ptr::null()) };
}

/// Per-call trap bookkeeping shared between a supervised call and the fault
/// handler
pub(crate) struct TrapState {
    /// Resumption point published by the setjmp helper, null outside the thunk
    jmp_buf: Cell<*const c_void>,
    cause: Cell<Cause>,
    fault: Cell<Option<FaultDetails>>,
    /// Set by `raise_trap`; takes precedence over `cause`
    exception: Cell<Option<Box<Exception>>>,
    stack_limit: usize,
    /// Head of the thread's state stack before this call was entered
    prev: Cell<*const TrapState>,
}

impl TrapState {
    fn new(stack_limit: usize) -> Self {
        TrapState {
            jmp_buf: Cell::new(ptr::null()),
            cause: Cell::new(Cause::Unknown),
            fault: Cell::new(None),
            exception: Cell::new(None),
            stack_limit,
            prev: Cell::new(ptr::null()),
        }
    }

    /// Make this state the thread's innermost one until the guard drops
    fn activate(&self) -> ActiveState<'_> {
        let prev = CURRENT.with(|current| current.replace(self));
        self.prev.set(prev);
        ActiveState(self)
    }

    pub(crate) fn resumption_point(&self) -> *const c_void {
        self.jmp_buf.get()
    }

    pub(crate) fn stack_limit(&self) -> usize {
        self.stack_limit
    }

    /// Called from the signal handler; must not allocate
    pub(crate) fn record_fault(&self, cause: Cause, fault: FaultDetails) {
        self.cause.set(cause);
        self.fault.set(Some(fault));
    }

    /// Build the exception for a call that did not complete and reset the
    /// trap slots
    fn take_exception(&self) -> Box<Exception> {
        let cause = self.cause.replace(Cause::Unknown);
        let fault = self.fault.take();
        if let Some(exception) = self.exception.take() {
            return exception;
        }
        let exception = Exception::new(cause);
        Box::new(match fault {
            Some(fault) => exception
                .with_fault(fault)
                .with_context(capture_fault_context(fault.pc)),
            None => exception,
        })
    }
}

struct ActiveState<'a>(&'a TrapState);

impl Drop for ActiveState<'_> {
    fn drop(&mut self) {
        let head = CURRENT.with(|current| current.replace(self.0.prev.replace(ptr::null())));
        debug_assert!(ptr::eq(head, self.0), "supervised calls exited out of order");
    }
}

/// The innermost active state on this thread, or null
///
/// Safe to call from a signal handler: the thread local is const-initialised
/// and has no destructor.
pub(crate) fn current_state() -> *const TrapState {
    CURRENT.try_with(Cell::get).unwrap_or(ptr::null())
}

/// Whether the calling thread is inside a supervised call
pub fn is_supervised() -> bool {
    !current_state().is_null()
}

/// What the OS told us about a fault, independent of platform encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaultKind {
    /// Arithmetic fault with an integer divide or integer overflow code
    IntegerDivide,
    /// Any other arithmetic fault
    Arithmetic,
    InvalidAccess,
    Other,
}

pub(crate) fn classify_fault(kind: FaultKind, address: usize, stack_limit: usize) -> Cause {
    match kind {
        FaultKind::IntegerDivide => Cause::IntegerDivideByZeroOrIntegerOverflow,
        FaultKind::InvalidAccess
            if stack_limit != 0
                && address > stack_limit.saturating_sub(STACK_OVERFLOW_WINDOW)
                && address < stack_limit.saturating_add(STACK_OVERFLOW_WINDOW) =>
        {
            Cause::StackOverflow
        }
        FaultKind::InvalidAccess => Cause::AccessViolation,
        FaultKind::Arithmetic | FaultKind::Other => Cause::Unknown,
    }
}

struct Call<T, F> {
    thunk: Option<F>,
    result: Option<Result<T, Box<dyn Any + Send>>>,
}

extern "C" fn call_thunk<T, F: FnOnce() -> T>(payload: *mut c_void) {
    // SAFETY: `payload` is the `Call` owned by `run_supervised`, which is
    // blocked in the setjmp helper for the whole of this call.
    let call = unsafe { &mut *payload.cast::<Call<T, F>>() };
    if let Some(thunk) = call.thunk.take() {
        // Unwinding must not cross the C frame of the helper.
        call.result = Some(panic::catch_unwind(AssertUnwindSafe(thunk)));
    }
}

/// Run `thunk`, converting any trap it causes into an exception
///
/// Returns the thunk's result as [`ExceptionValue::Value`], or
/// [`ExceptionValue::Exception`] if it faulted or called [`raise_trap`]. A
/// panic inside the thunk is resumed once the call has been torn down.
///
/// The only error is a failure to set up trap handling for the calling
/// thread, which leaves faults undeliverable and should be treated as fatal.
///
/// ```
/// use kasm_core::runtime::{raise_trap, run_supervised, Cause, Exception};
///
/// let result = run_supervised(|| 6 * 7).unwrap();
/// assert_eq!(result.value(), Some(42));
///
/// let trapped = run_supervised(|| -> i32 { raise_trap(Exception::new(Cause::ReachedUnreachable)) }).unwrap();
/// assert_eq!(trapped.cause(), Some(Cause::ReachedUnreachable));
/// ```
pub fn run_supervised<T, F>(thunk: F) -> Result<ExceptionValue<T>, TrapError>
where
    F: FnOnce() -> T,
{
    let thread = sys::lazy_per_thread_init()?;
    let _handlers = sys::HandlerGuard::install()?;

    let state = TrapState::new(thread.stack_limit);
    let _active = state.activate();

    let mut call = Call {
        thunk: Some(thunk),
        result: None,
    };
    // SAFETY: `state` and `call` outlive the helper call, and `call_thunk` is
    // instantiated for the exact `Call` type passed as payload.
    let completed = unsafe {
        sys::call_with_resumption_point(
            state.jmp_buf.as_ptr(),
            call_thunk::<T, F>,
            (&mut call as *mut Call<T, F>).cast(),
        )
    };
    // The helper's frame is gone; nothing may jump to it any more.
    state.jmp_buf.set(ptr::null());
    debug_assert_eq!(completed, call.result.is_some());

    match call.result.take() {
        Some(Ok(value)) => Ok(ExceptionValue::Value(value)),
        Some(Err(panic)) => panic::resume_unwind(panic),
        None => {
            let exception = state.take_exception();
            log::trace!("supervised call trapped: {}", exception.cause());
            Ok(ExceptionValue::Exception(exception))
        }
    }
}

/// Abandon the innermost supervised call, making it return `exception`
///
/// # Panics
///
/// Panics if the calling thread is not inside [`run_supervised`].
pub fn raise_trap(exception: Exception) -> ! {
    // SAFETY: a non-null head belongs to a `run_supervised` frame further up
    // this thread's stack, so it is live.
    let state = unsafe { current_state().as_ref() }.filter(|state| !state.resumption_point().is_null());
    match state {
        Some(state) => {
            state.exception.set(Some(Box::new(exception)));
            // SAFETY: the resumption point is non-null only while the setjmp
            // helper's frame is live.
            unsafe { sys::resume(state.resumption_point()) }
        }
        None => panic!("raise_trap called outside of a supervised call"),
    }
}

/// Set up trap handling for the calling thread ahead of the first
/// supervised call
pub fn init_thread() -> Result<(), TrapError> {
    sys::lazy_per_thread_init().map(|_| ())
}
