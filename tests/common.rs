//! Common test utilities shared between integration tests

#![allow(dead_code)]

use std::hint::black_box;
use std::sync::{Mutex, MutexGuard, PoisonError};

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialise tests that inspect process-wide signal dispositions
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handler address and flags for each monitored signal
#[cfg(unix)]
pub fn signal_actions() -> Vec<(usize, i32)> {
    [libc::SIGFPE, libc::SIGSEGV, libc::SIGBUS]
        .iter()
        .map(|&signal| {
            let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
            assert_eq!(unsafe { libc::sigaction(signal, std::ptr::null(), &mut action) }, 0);
            (action.sa_sigaction, action.sa_flags as i32)
        })
        .collect()
}

/// Signed 32-bit division done by the CPU, without Rust's zero check
#[cfg(target_arch = "x86_64")]
#[inline(never)]
pub fn hardware_div(lhs: i32, rhs: i32) -> i32 {
    let quotient: i32;
    unsafe {
        std::arch::asm!(
            "cdq",
            "idiv {rhs:e}",
            rhs = in(reg) rhs,
            inout("eax") lhs => quotient,
            out("edx") _,
        );
    }
    quotient
}

/// Read from the null page
#[inline(never)]
pub fn read_unmapped() -> u64 {
    unsafe { std::ptr::read_volatile(black_box(0x10 as *const u64)) }
}

/// Recurse until the stack runs out
#[allow(unconditional_recursion)]
#[inline(never)]
pub fn recurse_forever(depth: u64) -> u64 {
    let frame = [depth; 32];
    black_box(&frame);
    recurse_forever(black_box(depth + 1)).wrapping_add(frame[black_box(0)])
}
