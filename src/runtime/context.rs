//! Call stack snapshots for diagnostics
//!
//! Capture and symbolisation are both best-effort: an empty context or a
//! missing symbol name is a valid answer. Nothing here feeds back into
//! control flow.

use super::limits::MAX_CALLSTACK_FRAMES;
use super::sys;
use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::fmt;

/// One captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackFrame {
    /// Instruction pointer of the frame
    pub ip: usize,
    /// Reserved for a symbol-relative offset; always zero from a raw capture
    pub offset: usize,
}

/// An ordered, immutable call stack, innermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SerializedContext")]
pub struct ExecutionContext {
    frames: Vec<StackFrame>,
}

/// Wire shape of [`ExecutionContext`]; deserialised frames go through
/// [`ExecutionContext::from_frames`] so the frame cap holds
#[derive(Deserialize)]
struct SerializedContext {
    frames: Vec<StackFrame>,
}

impl From<SerializedContext> for ExecutionContext {
    fn from(context: SerializedContext) -> Self {
        ExecutionContext::from_frames(context.frames)
    }
}

impl ExecutionContext {
    /// Build a context from raw frames, keeping at most
    /// [`MAX_CALLSTACK_FRAMES`] of them
    pub fn from_frames(frames: impl IntoIterator<Item = StackFrame>) -> Self {
        ExecutionContext {
            frames: frames.into_iter().take(MAX_CALLSTACK_FRAMES).collect(),
        }
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (depth, frame) in self.frames.iter().enumerate() {
            match describe_address(frame.ip) {
                Some(symbol) => writeln!(f, "{depth:>4}: {:#018x} {symbol}", frame.ip)?,
                None => writeln!(f, "{depth:>4}: {:#018x}", frame.ip)?,
            }
        }
        Ok(())
    }
}

/// Capture the calling thread's stack, up to [`MAX_CALLSTACK_FRAMES`] frames
///
/// Returns an empty context where the target has no unwinder.
#[inline(never)]
pub fn capture_execution_context() -> ExecutionContext {
    let mut frames = Vec::new();
    backtrace::trace(|frame| {
        frames.push(StackFrame {
            ip: frame.ip() as usize,
            offset: 0,
        });
        frames.len() < MAX_CALLSTACK_FRAMES
    });
    ExecutionContext { frames }
}

/// Context for an exception synthesized from a hardware fault: the faulting
/// instruction, when known, followed by the stack of the supervising call
pub(crate) fn capture_fault_context(pc: Option<usize>) -> ExecutionContext {
    let resumed = capture_execution_context();
    let faulting = pc.map(|ip| StackFrame { ip, offset: 0 });
    ExecutionContext::from_frames(faulting.into_iter().chain(resumed.frames))
}

/// Best-effort symbol name for a code address
///
/// Consults debug info first and falls back to the dynamic symbol table.
/// `ip` is an exact instruction address, such as a function entry or a
/// faulting program counter.
pub fn describe_address(ip: usize) -> Option<String> {
    if ip == 0 {
        return None;
    }
    let mut name = None;
    // `resolve` treats its argument as a return address and looks up the
    // byte before it.
    backtrace::resolve(ip.wrapping_add(1) as *mut c_void, |symbol| {
        if name.is_none() {
            name = symbol.name().map(|symbol_name| symbol_name.to_string());
        }
    });
    name.filter(|name: &String| !name.is_empty())
        .or_else(|| sys::describe_address(ip))
}
