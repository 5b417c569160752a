//! Targets without POSIX signals
//!
//! Hardware faults are not intercepted here; only explicit traps raised with
//! `raise_trap` reach the supervising call.

use super::ThreadInfo;
use crate::runtime::TrapError;

pub(crate) struct HandlerGuard(());

impl HandlerGuard {
    pub(crate) fn install() -> Result<Self, TrapError> {
        Ok(HandlerGuard(()))
    }
}

pub(crate) fn lazy_per_thread_init() -> Result<ThreadInfo, TrapError> {
    Ok(ThreadInfo { stack_limit: 0 })
}

pub(crate) fn describe_address(_ip: usize) -> Option<String> {
    None
}
