//! The opcode catalog
//!
//! Operations are grouped by the class of value they produce. Every class
//! carries the shared control, memory, and call operations; `Int` and `Float`
//! add their unary, binary, cast, and comparison operations plus a literal,
//! `Void` adds the statement forms, and `None` carries the shared set alone.
//!
//! Each class has a `#[repr(u8)]` enum whose discriminants are the stable
//! numeric codes, and each operation has a zero-sized marker type
//! implementing [`Operation`] so that interpreters and compilers can
//! specialise per operation with [`OpVisitor`] instead of matching at runtime.
//!
//! ```
//! use kasm_core::opcodes::{name_of, opcodes_of, IntOp, TypeClass};
//!
//! assert_eq!(name_of(TypeClass::Int, IntOp::Divs.code()).unwrap(), "divs");
//! assert!(opcodes_of(TypeClass::Float).iter().any(|op| op.name == "sqrt"));
//! assert!(name_of(TypeClass::None, 200).is_err());
//! ```

mod catalog;

pub use catalog::{
    any, float, int, none, void, AnyClass, AnyOp, FloatClass, FloatOp, IntClass, IntOp, NoneClass, NoneOp,
    VoidClass, VoidOp,
};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Grouping of operations by the type of value they produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeClass {
    Any,
    Int,
    Float,
    Void,
    None,
}

impl TypeClass {
    pub const ALL: [TypeClass; 5] = [
        TypeClass::Any,
        TypeClass::Int,
        TypeClass::Float,
        TypeClass::Void,
        TypeClass::None,
    ];

    /// The categories this class is layered from, in code order
    pub fn categories(self) -> &'static [Category] {
        match self {
            TypeClass::Any | TypeClass::None => &[Category::Shared],
            TypeClass::Int => &[
                Category::Shared,
                Category::Unary,
                Category::Binary,
                Category::Cast,
                Category::Comparison,
                Category::Literal,
                Category::ExtendingLoad,
                Category::FeatureTest,
            ],
            TypeClass::Float => &[
                Category::Shared,
                Category::Unary,
                Category::Binary,
                Category::Cast,
                Category::Comparison,
                Category::Literal,
            ],
            TypeClass::Void => &[Category::Shared, Category::Statement],
        }
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TypeClass::Any => "any",
                TypeClass::Int => "int",
                TypeClass::Float => "float",
                TypeClass::Void => "void",
                TypeClass::None => "none",
            }
        )
    }
}

/// Which part of the catalog an operation was declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Control, memory, and call operations present in every class
    Shared,
    Unary,
    Binary,
    Cast,
    Comparison,
    Literal,
    /// Zero- and sign-extending loads
    ExtendingLoad,
    FeatureTest,
    /// Discard, no-op, and conditional branch
    Statement,
}

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OpcodeInfo {
    pub class: TypeClass,
    pub category: Category,
    pub code: u8,
    pub name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpcodeError {
    #[error("Invalid opcode {code} for type class {class}")]
    InvalidOpcode { class: TypeClass, code: u8 },
    #[error("Unknown operation {name:?} for type class {class}")]
    UnknownName { class: TypeClass, name: String },
}

/// Type-level stand-in for a [`TypeClass`]
pub trait ClassTag: sealed::Sealed + Copy + 'static {
    /// The class's operation enum
    type Op: Copy + Eq + fmt::Debug + fmt::Display + Into<Opcode>;
    const CLASS: TypeClass;
}

/// Implemented by the zero-sized marker type of every operation
///
/// Marker types live in the per-class modules ([`int`], [`float`], ...), so
/// `int::Add` and `float::Add` are distinct types.
pub trait Operation: sealed::Sealed + Copy + Default + 'static {
    type Class: ClassTag;
    const OP: <Self::Class as ClassTag>::Op;
    const NAME: &'static str;
    const CATEGORY: Category;

    fn opcode() -> Opcode {
        Self::OP.into()
    }
}

/// Generic per-operation dispatch
///
/// `IntOp::dispatch` and friends call [`OpVisitor::visit`] instantiated with
/// the operation's marker type.
pub trait OpVisitor<C: ClassTag> {
    type Output;

    fn visit<O: Operation<Class = C>>(&mut self) -> Self::Output;
}

/// An operation tagged with its class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Any(AnyOp),
    Int(IntOp),
    Float(FloatOp),
    Void(VoidOp),
    None(NoneOp),
}

impl Opcode {
    pub fn from_code(class: TypeClass, code: u8) -> Result<Self, OpcodeError> {
        Ok(match class {
            TypeClass::Any => Opcode::Any(AnyOp::from_code(code)?),
            TypeClass::Int => Opcode::Int(IntOp::from_code(code)?),
            TypeClass::Float => Opcode::Float(FloatOp::from_code(code)?),
            TypeClass::Void => Opcode::Void(VoidOp::from_code(code)?),
            TypeClass::None => Opcode::None(NoneOp::from_code(code)?),
        })
    }

    pub fn from_name(class: TypeClass, name: &str) -> Result<Self, OpcodeError> {
        Self::from_code(class, code_of(class, name)?)
    }

    pub fn class(self) -> TypeClass {
        match self {
            Opcode::Any(_) => TypeClass::Any,
            Opcode::Int(_) => TypeClass::Int,
            Opcode::Float(_) => TypeClass::Float,
            Opcode::Void(_) => TypeClass::Void,
            Opcode::None(_) => TypeClass::None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Opcode::Any(op) => op.code(),
            Opcode::Int(op) => op.code(),
            Opcode::Float(op) => op.code(),
            Opcode::Void(op) => op.code(),
            Opcode::None(op) => op.code(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Any(op) => op.name(),
            Opcode::Int(op) => op.name(),
            Opcode::Float(op) => op.name(),
            Opcode::Void(op) => op.name(),
            Opcode::None(op) => op.name(),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class(), self.name())
    }
}

impl From<AnyOp> for Opcode {
    fn from(op: AnyOp) -> Self {
        Opcode::Any(op)
    }
}

impl From<IntOp> for Opcode {
    fn from(op: IntOp) -> Self {
        Opcode::Int(op)
    }
}

impl From<FloatOp> for Opcode {
    fn from(op: FloatOp) -> Self {
        Opcode::Float(op)
    }
}

impl From<VoidOp> for Opcode {
    fn from(op: VoidOp) -> Self {
        Opcode::Void(op)
    }
}

impl From<NoneOp> for Opcode {
    fn from(op: NoneOp) -> Self {
        Opcode::None(op)
    }
}

/// All operations of a class, in code order
pub fn opcodes_of(class: TypeClass) -> &'static [OpcodeInfo] {
    match class {
        TypeClass::Any => AnyOp::INFO,
        TypeClass::Int => IntOp::INFO,
        TypeClass::Float => FloatOp::INFO,
        TypeClass::Void => VoidOp::INFO,
        TypeClass::None => NoneOp::INFO,
    }
}

/// Name of the operation with numeric `code` in `class`
pub fn name_of(class: TypeClass, code: u8) -> Result<&'static str, OpcodeError> {
    opcodes_of(class)
        .get(code as usize)
        .map(|info| info.name)
        .ok_or(OpcodeError::InvalidOpcode { class, code })
}

static CODES_BY_NAME: Lazy<HashMap<(TypeClass, &'static str), u8>> = Lazy::new(|| {
    TypeClass::ALL
        .iter()
        .flat_map(|&class| opcodes_of(class).iter())
        .map(|info| ((info.class, info.name), info.code))
        .collect()
});

/// Numeric code of the operation called `name` in `class`
pub fn code_of(class: TypeClass, name: &str) -> Result<u8, OpcodeError> {
    CODES_BY_NAME
        .get(&(class, name))
        .copied()
        .ok_or_else(|| OpcodeError::UnknownName {
            class,
            name: name.to_string(),
        })
}
