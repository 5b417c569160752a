//! The opcode table
//!
//! Every operation is declared exactly once, in the category it belongs to.
//! A type class is a list of categories; its enum, marker types, and info
//! table are expanded from that list. Codes follow declaration order, so
//! appending to a category renumbers the classes that include it.

use super::{Category, ClassTag, OpVisitor, OpcodeError, OpcodeInfo, TypeClass};
use std::fmt;

// Category macros. Each appends its operations to the accumulated entry list
// and passes control back to `expand_class!`.

macro_rules! shared_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Shared]
            Error = "error",
            GetLocal = "getLocal",
            SetLocal = "setLocal",
            Load = "load",
            Store = "store",
            CallDirect = "callDirect",
            CallImport = "callImport",
            CallIndirect = "callIndirect",
            Loop = "loop",
            IfElse = "ifElse",
            Select = "select",
            Label = "label",
            Sequence = "sequence",
            Branch = "branch",
            BranchTable = "branchTable",
            Ret = "ret",
            Unreachable = "unreachable",
        }
    };
}

macro_rules! int_unary_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Unary]
            Neg = "neg",
            Abs = "abs",
            BitwiseNot = "bitwiseNot",
            Clz = "clz",
            Ctz = "ctz",
            Popcnt = "popcnt",
        }
    };
}

macro_rules! int_binary_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Binary]
            Add = "add",
            Sub = "sub",
            Mul = "mul",
            Divs = "divs",
            Divu = "divu",
            Rems = "rems",
            Remu = "remu",
            BitwiseAnd = "bitwiseAnd",
            BitwiseOr = "bitwiseOr",
            BitwiseXor = "bitwiseXor",
            Shl = "shl",
            ShrSExt = "shrSExt",
            ShrZExt = "shrZExt",
            Rotl = "rotl",
            Rotr = "rotr",
        }
    };
}

macro_rules! int_cast_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Cast]
            Wrap = "wrap",
            TruncSignedFloat = "truncSignedFloat",
            TruncUnsignedFloat = "truncUnsignedFloat",
            Sext = "sext",
            Zext = "zext",
            ReinterpretFloat = "reinterpretFloat",
        }
    };
}

macro_rules! comparison_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Comparison]
            Eq = "eq",
            Ne = "ne",
            Lts = "lts",
            Ltu = "ltu",
            Lt = "lt",
            Les = "les",
            Leu = "leu",
            Le = "le",
            Gts = "gts",
            Gtu = "gtu",
            Gt = "gt",
            Ges = "ges",
            Geu = "geu",
            Ge = "ge",
        }
    };
}

macro_rules! float_unary_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Unary]
            Neg = "neg",
            Abs = "abs",
            Ceil = "ceil",
            Floor = "floor",
            Trunc = "trunc",
            NearestInt = "nearestInt",
            Sqrt = "sqrt",
        }
    };
}

macro_rules! float_binary_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Binary]
            Add = "add",
            Sub = "sub",
            Mul = "mul",
            Div = "div",
            Rem = "rem",
            Min = "min",
            Max = "max",
            CopySign = "copySign",
        }
    };
}

macro_rules! float_cast_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Cast]
            ConvertSignedInt = "convertSignedInt",
            ConvertUnsignedInt = "convertUnsignedInt",
            Promote = "promote",
            Demote = "demote",
            ReinterpretInt = "reinterpretInt",
        }
    };
}

macro_rules! literal_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Literal]
            Lit = "lit",
        }
    };
}

macro_rules! extending_load_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [ExtendingLoad]
            LoadZExt = "loadZExt",
            LoadSExt = "loadSExt",
        }
    };
}

macro_rules! feature_test_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [FeatureTest]
            HasFeature = "hasFeature",
        }
    };
}

macro_rules! statement_ops {
    ($cb:ident { $($args:tt)* }) => {
        $cb! { $($args)* [Statement]
            DiscardResult = "discardResult",
            Nop = "nop",
            BranchIf = "branchIf",
        }
    };
}

/// Walks a class's category list, collecting entries, then hands the full
/// list to `define_class!`.
macro_rules! expand_class {
    (@collect ($($head:tt)*) [] $($acc:tt)*) => {
        define_class! { $($head)* ; $($acc)* }
    };
    (@collect ($($head:tt)*) [$category:ident $($rest:ident)*] $($acc:tt)*) => {
        $category! { expand_class { @collect ($($head)*) [$($rest)*] $($acc)* } }
    };
}

macro_rules! define_class {
    (
        $(#[$meta:meta])*
        $class:ident, $op:ident, $tag:ident, $markers:ident ;
        $( [$category:ident] $( $variant:ident = $name:literal, )* )*
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum $op {
            $( $( $variant, )* )*
        }

        impl $op {
            /// Every operation of the class, in code order
            pub const ALL: &'static [$op] = &[ $( $( $op::$variant, )* )* ];

            /// Catalog entries of the class, in code order
            pub const INFO: &'static [OpcodeInfo] = &[
                $( $(
                    OpcodeInfo {
                        class: TypeClass::$class,
                        category: Category::$category,
                        code: $op::$variant as u8,
                        name: $name,
                    },
                )* )*
            ];

            /// Stable textual name of the operation
            pub const fn name(self) -> &'static str {
                match self {
                    $( $( $op::$variant => $name, )* )*
                }
            }

            pub const fn category(self) -> Category {
                match self {
                    $( $( $op::$variant => Category::$category, )* )*
                }
            }

            /// Stable numeric code of the operation within its class
            pub const fn code(self) -> u8 {
                self as u8
            }

            /// Look up an operation by numeric code
            pub fn from_code(code: u8) -> Result<Self, OpcodeError> {
                Self::ALL.get(code as usize).copied().ok_or(OpcodeError::InvalidOpcode {
                    class: TypeClass::$class,
                    code,
                })
            }

            /// Call `visitor` with the marker type of this operation
            pub fn dispatch<V: OpVisitor<$tag>>(self, visitor: &mut V) -> V::Output {
                match self {
                    $( $( $op::$variant => visitor.visit::<$markers::$variant>(), )* )*
                }
            }
        }

        impl fmt::Display for $op {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        #[doc = concat!("Type-level tag for the `", stringify!($class), "` class")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $tag;

        impl super::sealed::Sealed for $tag {}

        impl ClassTag for $tag {
            type Op = $op;
            const CLASS: TypeClass = TypeClass::$class;
        }

        #[doc = concat!("Marker types for the operations of the `", stringify!($class), "` class")]
        pub mod $markers {
            use super::{$op, $tag};
            use $crate::opcodes::{Category, Operation};

            $( $(
                #[doc = concat!("`", $name, "`")]
                #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
                pub struct $variant;

                impl $crate::opcodes::sealed::Sealed for $variant {}

                impl Operation for $variant {
                    type Class = $tag;
                    const OP: $op = $op::$variant;
                    const NAME: &'static str = $name;
                    const CATEGORY: Category = Category::$category;
                }
            )* )*
        }
    };
}

expand_class! { @collect (
    /// Operations shared by every type class
    Any, AnyOp, AnyClass, any
) [shared_ops] }

expand_class! { @collect (
    /// Operations producing an integer
    Int, IntOp, IntClass, int
) [
    shared_ops
    int_unary_ops
    int_binary_ops
    int_cast_ops
    comparison_ops
    literal_ops
    extending_load_ops
    feature_test_ops
] }

expand_class! { @collect (
    /// Operations producing a float
    Float, FloatOp, FloatClass, float
) [
    shared_ops
    float_unary_ops
    float_binary_ops
    float_cast_ops
    comparison_ops
    literal_ops
] }

expand_class! { @collect (
    /// Operations producing no value
    Void, VoidOp, VoidClass, void
) [shared_ops statement_ops] }

expand_class! { @collect (
    /// Operations in positions where control never continues
    None, NoneOp, NoneClass, none
) [shared_ops] }
