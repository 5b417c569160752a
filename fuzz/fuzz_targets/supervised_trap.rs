#![no_main]

use libfuzzer_sys::fuzz_target;

use kasm_core::runtime::{raise_trap, run_supervised, Cause, Exception};

const CAUSES: [Cause; 6] = [
    Cause::ReachedUnreachable,
    Cause::IndirectCallSignatureMismatch,
    Cause::UndefinedTableElement,
    Cause::InvalidFloatOperation,
    Cause::OutOfMemory,
    Cause::CalledAbort,
];

fn descend(depth: u8, trap_at: u8, cause: Cause) -> u32 {
    if depth == trap_at {
        raise_trap(Exception::new(cause));
    }
    if depth == 0 {
        return 0;
    }
    descend(depth - 1, trap_at, cause) + 1
}

fuzz_target!(|data: &[u8]| {
    // Each byte triple is one call: recursion depth, trap depth, cause
    for chunk in data.chunks_exact(3) {
        let (depth, trap_at) = (chunk[0] % 64, chunk[1]);
        let cause = CAUSES[chunk[2] as usize % CAUSES.len()];
        let result = run_supervised(|| descend(depth, trap_at, cause)).unwrap();
        if trap_at <= depth {
            assert_eq!(result.cause(), Some(cause));
        } else {
            assert_eq!(result.value(), Some(depth as u32));
        }
    }
});
