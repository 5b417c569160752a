//! POSIX signal handling
//!
//! Handlers are installed when the first supervised call in the process
//! starts and the previous dispositions are restored when the last one ends,
//! under a process-wide lock. While installed, the handler consults the
//! faulting thread's trap state: faults on threads with no active supervised
//! call are passed on to whatever was installed before.

use super::ThreadInfo;
use crate::runtime::limits::SIGNAL_STACK_SIZE;
use crate::runtime::traps::{classify_fault, current_state, FaultKind};
use crate::runtime::{FaultDetails, TrapError};
use std::cell::{Cell, UnsafeCell};
use std::ffi::{c_int, c_void, CStr};
use std::io;
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::{Mutex, PoisonError};

/// Signals routed to the trap handler, in the order their previous actions
/// are stored
const SIGNALS: [c_int; 3] = [libc::SIGFPE, libc::SIGSEGV, libc::SIGBUS];

#[cfg(target_os = "macos")]
const FPE_INTDIV: c_int = 7;
#[cfg(target_os = "macos")]
const FPE_INTOVF: c_int = 8;
#[cfg(target_os = "freebsd")]
const FPE_INTDIV: c_int = 2;
#[cfg(target_os = "freebsd")]
const FPE_INTOVF: c_int = 1;
#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
const FPE_INTDIV: c_int = 1;
#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
const FPE_INTOVF: c_int = 2;

/// Number of supervised calls currently relying on the installed handlers
static HANDLER_USERS: Mutex<usize> = Mutex::new(0);

struct PreviousActions(UnsafeCell<MaybeUninit<[libc::sigaction; SIGNALS.len()]>>);

// SAFETY: written only while `HANDLER_USERS` is held and the handlers are not
// installed; the signal handler only reads.
unsafe impl Sync for PreviousActions {}

static PREVIOUS_ACTIONS: PreviousActions = PreviousActions(UnsafeCell::new(MaybeUninit::uninit()));

fn previous_action(index: usize) -> *mut libc::sigaction {
    PREVIOUS_ACTIONS.0.get().cast::<libc::sigaction>().wrapping_add(index)
}

thread_local! {
    static THREAD_INFO: Cell<Option<ThreadInfo>> = const { Cell::new(None) };
}

/// Keeps the trap handler installed while alive
pub(crate) struct HandlerGuard(());

impl HandlerGuard {
    pub(crate) fn install() -> Result<Self, TrapError> {
        let mut users = HANDLER_USERS.lock().unwrap_or_else(PoisonError::into_inner);
        if *users == 0 {
            // SAFETY: the lock is held and no handler of ours is installed, so
            // nothing reads the previous actions concurrently.
            unsafe { install_handlers()? };
            log::trace!("installed trap handlers");
        }
        *users += 1;
        Ok(HandlerGuard(()))
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        let mut users = HANDLER_USERS.lock().unwrap_or_else(PoisonError::into_inner);
        *users -= 1;
        if *users == 0 {
            // SAFETY: the lock is held and this was the last user.
            unsafe { restore_handlers(SIGNALS.len()) };
            log::trace!("restored previous signal handlers");
        }
    }
}

unsafe fn install_handlers() -> Result<(), TrapError> {
    let mut action: libc::sigaction = mem::zeroed();
    action.sa_sigaction = trap_handler as usize;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
    libc::sigemptyset(&mut action.sa_mask);

    for (index, &signal) in SIGNALS.iter().enumerate() {
        if libc::sigaction(signal, &action, previous_action(index)) != 0 {
            let source = io::Error::last_os_error();
            restore_handlers(index);
            return Err(TrapError::HandlerInstall { signal, source });
        }
    }
    Ok(())
}

/// Put back the first `count` saved actions
unsafe fn restore_handlers(count: usize) {
    for (index, &signal) in SIGNALS.iter().enumerate().take(count) {
        libc::sigaction(signal, previous_action(index), ptr::null_mut());
    }
}

unsafe extern "C" fn trap_handler(signal: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    // Nothing in here may allocate, lock, or log.
    if let Some(state) = current_state().as_ref() {
        let jmp_buf = state.resumption_point();
        if !jmp_buf.is_null() {
            let fault = FaultDetails {
                signal,
                address: fault_address(info),
                pc: fault_pc(context),
            };
            let kind = fault_kind(signal, (*info).si_code);
            state.record_fault(classify_fault(kind, fault.address, state.stack_limit()), fault);
            super::resume(jmp_buf);
        }
    }
    delegate(signal, info, context);
}

fn fault_kind(signal: c_int, code: c_int) -> FaultKind {
    match signal {
        libc::SIGFPE if code == FPE_INTDIV || code == FPE_INTOVF => FaultKind::IntegerDivide,
        libc::SIGFPE => FaultKind::Arithmetic,
        libc::SIGSEGV | libc::SIGBUS => FaultKind::InvalidAccess,
        _ => FaultKind::Other,
    }
}

/// Hand a fault that is not ours to the action that was installed before
unsafe fn delegate(signal: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    let Some(index) = SIGNALS.iter().position(|&s| s == signal) else {
        return;
    };
    let previous = &*previous_action(index);
    if previous.sa_flags & libc::SA_SIGINFO != 0 {
        let handler: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) = mem::transmute(previous.sa_sigaction);
        handler(signal, info, context);
    } else if previous.sa_sigaction == libc::SIG_DFL || previous.sa_sigaction == libc::SIG_IGN {
        // Reinstate the old disposition and return: the faulting instruction
        // runs again and gets it.
        libc::sigaction(signal, previous, ptr::null_mut());
    } else {
        let handler: extern "C" fn(c_int) = mem::transmute(previous.sa_sigaction);
        handler(signal);
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn fault_address(info: *const libc::siginfo_t) -> usize {
    (*info).si_addr() as usize
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
unsafe fn fault_address(info: *const libc::siginfo_t) -> usize {
    (*info).si_addr as usize
}

#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "x86_64"))]
unsafe fn fault_pc(context: *mut c_void) -> Option<usize> {
    let context = &*context.cast::<libc::ucontext_t>();
    Some(context.uc_mcontext.gregs[libc::REG_RIP as usize] as usize)
}

#[cfg(all(target_os = "linux", target_env = "gnu", target_arch = "aarch64"))]
unsafe fn fault_pc(context: *mut c_void) -> Option<usize> {
    let context = &*context.cast::<libc::ucontext_t>();
    Some(context.uc_mcontext.pc as usize)
}

#[cfg(not(all(target_os = "linux", target_env = "gnu", any(target_arch = "x86_64", target_arch = "aarch64"))))]
unsafe fn fault_pc(_context: *mut c_void) -> Option<usize> {
    None
}

/// Prepare the calling thread for supervised calls; cached after the first
/// success
pub(crate) fn lazy_per_thread_init() -> Result<ThreadInfo, TrapError> {
    if let Some(info) = THREAD_INFO.with(Cell::get) {
        return Ok(info);
    }

    // SAFETY: only inspects or installs the calling thread's signal stack.
    unsafe { ensure_signal_stack()? };

    // SAFETY: queries attributes of the calling thread only.
    let stack_limit = unsafe { thread_stack_limit() }.unwrap_or_else(rlimit_stack_limit);
    let info = ThreadInfo { stack_limit };
    THREAD_INFO.with(|cell| cell.set(Some(info)));
    log::debug!("trap handling ready for thread, stack limit {stack_limit:#x}");
    Ok(info)
}

/// Make sure the handler has somewhere to run when the thread's own stack is
/// exhausted
///
/// An existing alternate stack of at least `SIGSTKSZ` bytes (the Rust runtime
/// installs one on its threads) is reused. Otherwise a new one is allocated
/// and deliberately never freed: it must outlive every signal delivered to
/// the thread.
unsafe fn ensure_signal_stack() -> Result<(), TrapError> {
    let mut current: libc::stack_t = mem::zeroed();
    if libc::sigaltstack(ptr::null(), &mut current) != 0 {
        return Err(TrapError::SignalStack(io::Error::last_os_error()));
    }
    if current.ss_flags & libc::SS_DISABLE == 0 && current.ss_size >= libc::SIGSTKSZ {
        return Ok(());
    }

    let size = SIGNAL_STACK_SIZE.max(libc::SIGSTKSZ);
    let mut memory: Vec<u8> = Vec::new();
    memory
        .try_reserve_exact(size)
        .map_err(|_| TrapError::SignalStackAllocation { size })?;
    memory.resize(size, 0);
    let memory: &'static mut [u8] = Box::leak(memory.into_boxed_slice());

    let stack = libc::stack_t {
        ss_sp: memory.as_mut_ptr().cast(),
        ss_flags: 0,
        ss_size: memory.len(),
    };
    if libc::sigaltstack(&stack, ptr::null_mut()) != 0 {
        return Err(TrapError::SignalStack(io::Error::last_os_error()));
    }
    log::debug!("allocated {size} byte signal stack");
    Ok(())
}

#[cfg(target_os = "linux")]
unsafe fn thread_stack_limit() -> Option<usize> {
    let mut attr: libc::pthread_attr_t = mem::zeroed();
    if libc::pthread_getattr_np(libc::pthread_self(), &mut attr) != 0 {
        return None;
    }
    let mut base: *mut c_void = ptr::null_mut();
    let mut size: libc::size_t = 0;
    let found = libc::pthread_attr_getstack(&attr, &mut base, &mut size) == 0;
    libc::pthread_attr_destroy(&mut attr);
    found.then_some(base as usize)
}

#[cfg(target_os = "macos")]
unsafe fn thread_stack_limit() -> Option<usize> {
    let thread = libc::pthread_self();
    let top = libc::pthread_get_stackaddr_np(thread) as usize;
    top.checked_sub(libc::pthread_get_stacksize_np(thread))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
unsafe fn thread_stack_limit() -> Option<usize> {
    None
}

/// Estimate the stack limit as the current stack pointer minus the process
/// stack size limit; zero when there is no finite limit
fn rlimit_stack_limit() -> usize {
    let marker = 0u8;
    let stack_pointer = &marker as *const u8 as usize;

    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes the struct it is given.
    if unsafe { libc::getrlimit(libc::RLIMIT_STACK, &mut limit) } != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return 0;
    }
    stack_pointer.saturating_sub(limit.rlim_cur as usize)
}

/// Name of the dynamic symbol containing `ip`
pub(crate) fn describe_address(ip: usize) -> Option<String> {
    let mut info: libc::Dl_info = unsafe { mem::zeroed() };
    // SAFETY: dladdr only reads loader tables and fills `info`.
    if unsafe { libc::dladdr(ip as *const c_void, &mut info) } == 0 || info.dli_sname.is_null() {
        return None;
    }
    // SAFETY: dli_sname is a NUL-terminated string owned by the loader.
    let name = unsafe { CStr::from_ptr(info.dli_sname) };
    Some(name.to_string_lossy().into_owned())
}
