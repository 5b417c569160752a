//! The execution core of a WebAssembly virtual machine.
//!
//! kasm-core provides the two pieces an interpreter or compiler builds on:
//! the catalog of operations it can emit, and the boundary that lets the
//! emitted code trap on hardware faults instead of checking every division
//! and memory access up front.
//!
//! # Modules
//!
//! - [`opcodes`] -- Operations grouped by the type class of the value they produce, with stable codes and names.
//! - [`runtime`] -- Supervised execution: fault handling, trap causes, exceptions, and call stack capture.
//!
//! # Example
//!
//! Run code that divides by zero the way a WebAssembly `i32.div_s` would, and
//! get the trap back as a value:
//!
//! ```
//! use kasm_core::runtime::{raise_trap, run_supervised, Cause, Exception};
//!
//! fn div_s(lhs: i32, rhs: i32) -> i32 {
//!     if rhs == 0 {
//!         raise_trap(Exception::new(Cause::IntegerDivideByZeroOrIntegerOverflow));
//!     }
//!     lhs.wrapping_div(rhs)
//! }
//!
//! let ok = run_supervised(|| div_s(10, 3)).unwrap();
//! assert_eq!(ok.value(), Some(3));
//!
//! let trapped = run_supervised(|| div_s(10, 0)).unwrap();
//! assert_eq!(trapped.cause(), Some(Cause::IntegerDivideByZeroOrIntegerOverflow));
//! ```

pub mod opcodes;
pub mod runtime;
