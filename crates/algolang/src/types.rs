//! The closed type sum (`spec.md` §3) and the operator → result-type tables.

use std::fmt;

/// A type in the algolang type system. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Type {
    Integer,
    Boolean,
    Char,
    String,
    Void,
    Array {
        element: Box<Type>,
        size: u32,
    },
    Function {
        params: Vec<Type>,
        /// `None` denotes a procedure (no return value).
        returns: Option<Box<Type>>,
    },
}

impl Type {
    #[must_use]
    pub fn array(element: Type, size: u32) -> Self {
        Self::Array {
            element: Box::new(element),
            size,
        }
    }

    #[must_use]
    pub fn function(params: Vec<Type>, returns: Option<Type>) -> Self {
        Self::Function {
            params,
            returns: returns.map(Box::new),
        }
    }

    /// `source` is assignable to `target` iff they are structurally equal.
    ///
    /// This language has no implicit conversions (`spec.md` §3).
    #[must_use]
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        self == target
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => write!(f, "цел"),
            Type::Boolean => write!(f, "лог"),
            Type::Char => write!(f, "сим"),
            Type::String => write!(f, "лит"),
            Type::Void => write!(f, "пусто"),
            Type::Array { element, size } => write!(f, "таб[{size}] {element}"),
            Type::Function { params, returns } => {
                write!(f, "алг(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")?;
                if let Some(r) = returns {
                    write!(f, ": {r}")?;
                }
                Ok(())
            }
        }
    }
}

/// Binary arithmetic operators: `Integer × Integer → Integer` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum ArithOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "div")]
    IDiv,
    #[strum(serialize = "mod")]
    Mod,
}

/// Comparison operators: equal operand types drawn from `{Integer, Boolean, Char}`, result `Boolean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum CmpOp {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<>")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

/// Binary logical operators. Operate on `Boolean` only; short-circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum LogicOp {
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

/// A binary operator, grouped by the table it belongs to (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinOpKind {
    Arith(ArithOp),
    Cmp(CmpOp),
    Logic(LogicOp),
}

impl fmt::Display for BinOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOpKind::Arith(op) => write!(f, "{op}"),
            BinOpKind::Cmp(op) => write!(f, "{op}"),
            BinOpKind::Logic(op) => write!(f, "{op}"),
        }
    }
}

/// Unary operators: `+`/`-` on `Integer`, `not` on `Boolean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum UnaryOpKind {
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "not")]
    Not,
}

/// Looks up the result type of a binary operator given its (already-typed) operands.
///
/// Returns `None` when the operator/operand combination has no defined result,
/// mirroring `mel_types.get_binary_op_result_type`.
#[must_use]
pub fn binary_result_type(op: BinOpKind, left: &Type, right: &Type) -> Option<Type> {
    match op {
        BinOpKind::Arith(_) => {
            if *left == Type::Integer && *right == Type::Integer {
                Some(Type::Integer)
            } else {
                None
            }
        }
        BinOpKind::Cmp(_) => {
            if left == right && matches!(left, Type::Integer | Type::Boolean | Type::Char) {
                Some(Type::Boolean)
            } else {
                None
            }
        }
        BinOpKind::Logic(_) => {
            if *left == Type::Boolean && *right == Type::Boolean {
                Some(Type::Boolean)
            } else {
                None
            }
        }
    }
}

/// Looks up the result type of a unary operator given its (already-typed) operand.
#[must_use]
pub fn unary_result_type(op: UnaryOpKind, operand: &Type) -> Option<Type> {
    match op {
        UnaryOpKind::Plus | UnaryOpKind::Minus => (*operand == Type::Integer).then_some(Type::Integer),
        UnaryOpKind::Not => (*operand == Type::Boolean).then_some(Type::Boolean),
    }
}
