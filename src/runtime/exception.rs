//! Runtime exceptions and the result of a supervised call

use super::context::{capture_execution_context, ExecutionContext};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Why a supervised computation was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Cause {
    /// A fault the handler could not classify
    Unknown,
    IntegerDivideByZeroOrIntegerOverflow,
    StackOverflow,
    AccessViolation,

    // Raised explicitly by code running inside the supervised call
    ReachedUnreachable,
    IndirectCallSignatureMismatch,
    UndefinedTableElement,
    InvalidFloatOperation,
    OutOfMemory,
    CalledAbort,
    Custom(&'static str),
}

impl Cause {
    /// Whether the cause is derived from a hardware fault rather than raised
    /// explicitly
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            Cause::Unknown
                | Cause::IntegerDivideByZeroOrIntegerOverflow
                | Cause::StackOverflow
                | Cause::AccessViolation
        )
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Unknown => write!(f, "unknown"),
            Cause::IntegerDivideByZeroOrIntegerOverflow => write!(f, "integer divide by zero or integer overflow"),
            Cause::StackOverflow => write!(f, "stack overflow"),
            Cause::AccessViolation => write!(f, "access violation"),
            Cause::ReachedUnreachable => write!(f, "reached unreachable code"),
            Cause::IndirectCallSignatureMismatch => write!(f, "indirect call signature mismatch"),
            Cause::UndefinedTableElement => write!(f, "undefined table element"),
            Cause::InvalidFloatOperation => write!(f, "invalid float operation"),
            Cause::OutOfMemory => write!(f, "out of memory"),
            Cause::CalledAbort => write!(f, "called abort"),
            Cause::Custom(reason) => write!(f, "{reason}"),
        }
    }
}

/// What the fault handler saw when it intercepted a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultDetails {
    /// The delivered signal number
    pub signal: i32,
    /// The faulting data address reported by the OS (zero for arithmetic faults
    /// on most targets)
    pub address: usize,
    /// Program counter of the faulting instruction, where the target exposes it
    pub pc: Option<usize>,
}

/// A trap that ended a supervised call
#[derive(Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Exception {
    cause: Cause,
    payload: Option<Box<dyn Any + Send>>,
    fault: Option<FaultDetails>,
    context: Option<ExecutionContext>,
}

impl Exception {
    pub fn new(cause: Cause) -> Self {
        Exception {
            cause,
            payload: None,
            fault: None,
            context: None,
        }
    }

    /// Create an exception carrying the current call stack
    pub fn capture(cause: Cause) -> Self {
        Self::new(cause).with_context(capture_execution_context())
    }

    /// Attach an arbitrary diagnostic payload, such as the operands of the
    /// instruction that trapped
    pub fn with_payload<P: Any + Send>(mut self, payload: P) -> Self {
        self.payload = Some(Box::new(payload));
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub(crate) fn with_fault(mut self, fault: FaultDetails) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn cause(&self) -> Cause {
        self.cause
    }

    /// The payload, if one was attached and it has type `P`
    pub fn payload<P: Any>(&self) -> Option<&P> {
        self.payload.as_ref().and_then(|payload| payload.downcast_ref::<P>())
    }

    pub fn take_payload(&mut self) -> Option<Box<dyn Any + Send>> {
        self.payload.take()
    }

    /// Signal details for exceptions synthesized from hardware faults
    pub fn fault(&self) -> Option<&FaultDetails> {
        self.fault.as_ref()
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }
}

/// Outcome of a supervised call: exactly one of a value or an exception
#[derive(Debug)]
#[must_use]
pub enum ExceptionValue<T> {
    Value(T),
    Exception(Box<Exception>),
}

impl<T> ExceptionValue<T> {
    pub fn is_value(&self) -> bool {
        matches!(self, ExceptionValue::Value(_))
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, ExceptionValue::Exception(_))
    }

    /// The success payload, returning None if the call trapped
    pub fn value(self) -> Option<T> {
        match self {
            ExceptionValue::Value(value) => Some(value),
            ExceptionValue::Exception(_) => None,
        }
    }

    /// The exception, returning None if the call completed
    pub fn exception(self) -> Option<Box<Exception>> {
        match self {
            ExceptionValue::Value(_) => None,
            ExceptionValue::Exception(exception) => Some(exception),
        }
    }

    /// Cause of the trap, if there was one
    pub fn cause(&self) -> Option<Cause> {
        match self {
            ExceptionValue::Value(_) => None,
            ExceptionValue::Exception(exception) => Some(exception.cause()),
        }
    }

    pub fn into_result(self) -> Result<T, Box<Exception>> {
        match self {
            ExceptionValue::Value(value) => Ok(value),
            ExceptionValue::Exception(exception) => Err(exception),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_causes() {
        assert!(Cause::StackOverflow.is_hardware());
        assert!(Cause::Unknown.is_hardware());
        assert!(!Cause::ReachedUnreachable.is_hardware());
        assert!(!Cause::Custom("host trap").is_hardware());
    }

    #[test]
    fn exception_display() {
        assert_eq!(
            Exception::new(Cause::IntegerDivideByZeroOrIntegerOverflow).to_string(),
            "integer divide by zero or integer overflow"
        );
        assert_eq!(Exception::new(Cause::Custom("bad import")).to_string(), "bad import");
    }

    #[test]
    fn payload_downcast() {
        let mut exception = Exception::new(Cause::InvalidFloatOperation).with_payload((1.5f64, 0u32));
        assert_eq!(exception.payload::<(f64, u32)>(), Some(&(1.5, 0)));
        assert_eq!(exception.payload::<String>(), None);
        assert!(exception.take_payload().is_some());
        assert!(exception.payload::<(f64, u32)>().is_none());
    }

    #[test]
    fn exception_value_is_one_or_the_other() {
        let ok: ExceptionValue<i32> = ExceptionValue::Value(7);
        assert!(ok.is_value());
        assert_eq!(ok.cause(), None);
        assert_eq!(ok.value(), Some(7));

        let trapped: ExceptionValue<i32> = ExceptionValue::Exception(Box::new(Exception::new(Cause::OutOfMemory)));
        assert!(trapped.is_exception());
        assert_eq!(trapped.cause(), Some(Cause::OutOfMemory));
        let err = trapped.into_result().unwrap_err();
        assert_eq!(err.cause(), Cause::OutOfMemory);
        assert!(err.fault().is_none());
    }

    #[test]
    fn cause_serialises_by_name() {
        assert_eq!(serde_json::to_string(&Cause::StackOverflow).unwrap(), "\"StackOverflow\"");
        assert_eq!(
            serde_json::to_string(&Cause::Custom("halt")).unwrap(),
            "{\"Custom\":\"halt\"}"
        );
    }
}
