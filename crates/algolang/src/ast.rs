//! The typed AST (`spec.md` §3).
//!
//! Every node carries an optional source `Position` plus the two
//! post-semantic-analysis fields `ty` and `const_value`. Before analysis
//! runs, `ty` is `None`; the analyzer fills it in on every expression
//! (non-`Void`) and statement (`Void`). `const_value` starts set only on
//! literal expression nodes and is populated further by the constant
//! folder (§4.6).
//!
//! These types are public and safe to construct directly: since the
//! lexer/parser is out of scope (`spec.md` §1), callers (tests, the CLI's
//! JSON-AST debug format) build `Program` values by hand instead of parsing
//! source text.

use crate::position::Position;
use crate::types::{BinOpKind, Type, UnaryOpKind};
use crate::value::Value;

/// A literal constant folded onto an expression node.
///
/// Kept separate from `Value` because `const_value` only ever holds the
/// scalar kinds literals can produce; arrays are never constant-foldable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Char(char),
    Str(String),
}

impl ConstValue {
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            ConstValue::Int(v) => Value::Int(*v),
            ConstValue::Bool(v) => Value::Bool(*v),
            ConstValue::Char(v) => Value::Char(*v),
            ConstValue::Str(v) => Value::Str(v.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub name: String,
    pub block: Block,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub var_decls: Vec<VarDecl>,
    /// Populated only in the program's top-level block (`spec.md` §3).
    pub func_decls: Vec<FuncDecl>,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub declared_type: TypeNode,
    pub pos: Option<Position>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: String,
    pub declared_type: TypeNode,
    pub pos: Option<Position>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeNode>,
    pub block: Block,
    pub pos: Option<Position>,
}

/// A type as written in source, before resolution to `types::Type`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum TypeNode {
    Simple {
        name: SimpleTypeName,
    },
    Array {
        size_expr: Box<Expr>,
        element_type: Box<TypeNode>,
    },
}

impl TypeNode {
    /// Resolves to a `types::Type`, assuming the analyzer already accepted
    /// this node (so an `Array`'s `size_expr` is guaranteed to be an `Int`
    /// literal; `spec.md` §3/§4.1).
    ///
    /// # Panics
    /// Panics if called on an AST that never passed semantic analysis.
    #[must_use]
    pub fn resolve(&self) -> Type {
        match self {
            TypeNode::Simple { name } => name.to_type(),
            TypeNode::Array { size_expr, element_type } => {
                let ExprKind::Int(size) = size_expr.kind else {
                    panic!("array size_expr must be an Int literal on an analyzed AST");
                };
                Type::array(element_type.resolve(), size as u32)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SimpleTypeName {
    Int,
    Bool,
    Char,
    String,
}

impl SimpleTypeName {
    #[must_use]
    pub fn to_type(self) -> Type {
        match self {
            SimpleTypeName::Int => Type::Integer,
            SimpleTypeName::Bool => Type::Boolean,
            SimpleTypeName::Char => Type::Char,
            SimpleTypeName::String => Type::String,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StmtMeta {
    pub pos: Option<Position>,
    /// `Void` for every statement, once analysis succeeds.
    pub ty: Option<Type>,
}

impl Default for StmtMeta {
    fn default() -> Self {
        Self { pos: None, ty: None }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub meta: StmtMeta,
}

impl Stmt {
    #[must_use]
    pub fn new(kind: StmtKind, pos: Option<Position>) -> Self {
        Self {
            kind,
            meta: StmtMeta { pos, ty: None },
        }
    }

    #[must_use]
    pub fn pos(&self) -> Option<Position> {
        self.meta.pos
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum StmtKind {
    Assign {
        target: Expr,
        value: Expr,
    },
    If {
        cond: Expr,
        then_stmts: Vec<Stmt>,
        else_stmts: Option<Vec<Stmt>>,
    },
    For {
        var_name: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// `цикл … до cond`: executes `body` until `cond` becomes true.
    DoUntil {
        body: Vec<Stmt>,
        cond: Expr,
    },
    Break,
    Continue,
    Return {
        value: Option<Expr>,
    },
    CallStmt {
        call: Expr,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExprMeta {
    pub pos: Option<Position>,
    pub ty: Option<Type>,
    pub const_value: Option<ConstValue>,
}

impl Default for ExprMeta {
    fn default() -> Self {
        Self {
            pos: None,
            ty: None,
            const_value: None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub meta: ExprMeta,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, pos: Option<Position>) -> Self {
        Self {
            kind,
            meta: ExprMeta {
                pos,
                ty: None,
                const_value: None,
            },
        }
    }

    #[must_use]
    pub fn pos(&self) -> Option<Position> {
        self.meta.pos
    }

    #[must_use]
    pub fn ty(&self) -> Option<&Type> {
        self.meta.ty.as_ref()
    }

    /// True if this subtree contains no `Call` node, i.e. evaluating it
    /// (possibly more than once, or not at all) cannot change observable
    /// behavior. Used by the constant folder to guard algebraic identities
    /// (`spec.md` §9, open question 2).
    #[must_use]
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            ExprKind::Call { .. } => false,
            ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Char(_) | ExprKind::String(_) | ExprKind::Identifier(_) => {
                true
            }
            ExprKind::BinOp { left, right, .. } => left.is_pure() && right.is_pure(),
            ExprKind::UnaryOp { operand, .. } => operand.is_pure(),
            ExprKind::ArrayAccess { array, index } => array.is_pure() && index.is_pure(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ExprKind {
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },
    Identifier(String),
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Int(i64),
    Bool(bool),
    Char(char),
    String(String),
}

impl Expr {
    #[must_use]
    pub fn int(v: i64) -> Self {
        let mut e = Expr::new(ExprKind::Int(v), None);
        e.meta.const_value = Some(ConstValue::Int(v));
        e
    }

    #[must_use]
    pub fn boolean(v: bool) -> Self {
        let mut e = Expr::new(ExprKind::Bool(v), None);
        e.meta.const_value = Some(ConstValue::Bool(v));
        e
    }

    #[must_use]
    pub fn char(v: char) -> Self {
        let mut e = Expr::new(ExprKind::Char(v), None);
        e.meta.const_value = Some(ConstValue::Char(v));
        e
    }

    #[must_use]
    pub fn string(v: impl Into<String>) -> Self {
        let s = v.into();
        let mut e = Expr::new(ExprKind::String(s.clone()), None);
        e.meta.const_value = Some(ConstValue::Str(s));
        e
    }

    #[must_use]
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::new(ExprKind::Identifier(name.into()), None)
    }
}
