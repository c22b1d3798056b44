//! Two-pass semantic analysis (`spec.md` §4.1).
//!
//! Modeled on the teacher's checked single-pass-per-node visitor style
//! (grounded directly on `original_source/semantics.py`'s `SemanticAnalyzer`),
//! reshaped into idiomatic Rust: one struct holding a `ScopeTree` and an
//! error accumulator, a `visit_*` method per node kind, each returning the
//! node's type where expressions need one. The analyzer never aborts early;
//! it records a `SemanticError` and keeps going so a single run reports
//! every problem in the program (`spec.md` §4.1, §7).

use crate::ast::{
    Block, Expr, ExprKind, FuncDecl, Program, SimpleTypeName, Stmt, StmtKind, TypeNode, VarDecl,
};
use crate::errors::SemanticError;
use crate::position::Position;
use crate::scope::{ScopeId, ScopeTree, Symbol, SymbolKind};
use crate::types::{binary_result_type, unary_result_type, Type};

/// Builtin function signatures pre-populated into the global scope
/// (`spec.md` §6, plus the supplemental trio recovered from
/// `original_source/mel_types.py`'s `BUILTIN_FUNCTIONS`, SPEC_FULL.md §6a).
fn builtin_signatures() -> Vec<(&'static str, Vec<Type>, Option<Type>)> {
    vec![
        ("print", vec![Type::Void], None), // polymorphic; checked specially below
        ("inc", vec![Type::Integer], None),
        ("dec", vec![Type::Integer], None),
        ("abs", vec![Type::Integer], Some(Type::Integer)),
        ("ord", vec![Type::Char], Some(Type::Integer)),
        ("chr", vec![Type::Integer], Some(Type::Char)),
        ("read", vec![Type::Integer], None),
    ]
}

/// Names whose argument type is checked structurally; `print` is the one
/// builtin that accepts any single argument type (`spec.md` §4.1).
const POLYMORPHIC_BUILTINS: &[&str] = &["print"];

pub struct Analyzer {
    scopes: ScopeTree,
    errors: Vec<SemanticError>,
    /// Return type of the function currently being analyzed, if any.
    current_function_return: Option<Option<Type>>,
}

pub struct AnalysisOutcome {
    pub scopes: ScopeTree,
}

impl Analyzer {
    #[must_use]
    pub fn new() -> Self {
        let mut scopes = ScopeTree::new();
        let global = scopes.global();
        for (name, params, returns) in builtin_signatures() {
            let ty = Type::function(params, returns);
            scopes
                .declare(
                    global,
                    Symbol {
                        name: name.to_owned(),
                        ty,
                        kind: SymbolKind::Builtin,
                        pos: None,
                        is_global: true,
                        local_index: None,
                    },
                )
                .expect("builtin names never collide with each other");
        }
        Self {
            scopes,
            errors: Vec::new(),
            current_function_return: None,
        }
    }

    fn error(&mut self, message: impl Into<String>, pos: Option<Position>) {
        self.errors.push(SemanticError::new(message, pos));
    }

    /// Runs the full two-pass analysis and returns every diagnostic found.
    /// An empty vector means the program analyzed cleanly (`spec.md` §7).
    pub fn analyze(mut self, program: &mut Program) -> (Vec<SemanticError>, AnalysisOutcome) {
        self.visit_block(&mut program.block, true);
        (self.errors, AnalysisOutcome { scopes: self.scopes })
    }

    fn visit_type(&mut self, node: &TypeNode, pos: Option<Position>) -> Option<Type> {
        match node {
            TypeNode::Simple { name } => Some(simple_type(*name)),
            TypeNode::Array { size_expr, element_type } => {
                let element = self.visit_type(element_type, pos)?;
                let size = match &size_expr.kind {
                    ExprKind::Int(v) => *v,
                    _ => {
                        self.error("array size must be a constant", pos);
                        return None;
                    }
                };
                if size <= 0 {
                    self.error("array size must be a positive integer", pos);
                    return None;
                }
                Some(Type::array(element, size as u32))
            }
        }
    }

    fn visit_block(&mut self, block: &mut Block, is_program_top_level: bool) {
        for decl in &mut block.var_decls {
            self.visit_var_decl(decl);
        }
        if is_program_top_level {
            for func in &mut block.func_decls {
                self.declare_function_signature(func);
            }
            for func in &mut block.func_decls {
                self.visit_func_decl(func);
            }
        }
        for stmt in &mut block.statements {
            self.visit_statement(stmt);
        }
    }

    fn visit_var_decl(&mut self, decl: &mut VarDecl) {
        let Some(ty) = self.visit_type(&decl.declared_type, decl.pos) else {
            return;
        };
        let is_global = self.scopes.is_global_scope(self.scopes.current());
        let symbol = Symbol {
            name: decl.name.clone(),
            ty,
            kind: SymbolKind::Variable,
            pos: decl.pos,
            is_global,
            local_index: None,
        };
        let current = self.scopes.current();
        if let Err(existing_pos) = self.scopes.declare(current, symbol) {
            self.error(
                format!("'{}' is already declared in this scope", decl.name),
                existing_pos.or(decl.pos),
            );
        }
    }

    fn declare_function_signature(&mut self, func: &mut FuncDecl) {
        let mut param_types = Vec::with_capacity(func.params.len());
        for param in &func.params {
            match self.visit_type(&param.declared_type, param.pos) {
                Some(ty) => param_types.push(ty),
                None => return,
            }
        }
        let return_type = match &func.return_type {
            Some(node) => match self.visit_type(node, func.pos) {
                Some(ty) => Some(ty),
                None => return,
            },
            None => None,
        };
        let func_type = Type::function(param_types, return_type);
        let global = self.scopes.global();
        let symbol = Symbol {
            name: func.name.clone(),
            ty: func_type,
            kind: SymbolKind::Function,
            pos: func.pos,
            is_global: true,
            local_index: None,
        };
        if let Err(existing_pos) = self.scopes.declare(global, symbol) {
            self.error(
                format!("'{}' is already declared", func.name),
                existing_pos.or(func.pos),
            );
        }
    }

    fn visit_func_decl(&mut self, func: &mut FuncDecl) {
        let return_type = match &func.return_type {
            Some(node) => self.visit_type(node, func.pos),
            None => None,
        };
        let previous = self
            .current_function_return
            .replace(return_type);

        let scope = self.scopes.enter_scope(format!("function_{}", func.name));
        for param in &func.params {
            let Some(ty) = self.visit_type(&param.declared_type, param.pos) else {
                continue;
            };
            let symbol = Symbol {
                name: param.name.clone(),
                ty,
                kind: SymbolKind::Parameter,
                pos: param.pos,
                is_global: false,
                local_index: None,
            };
            if let Err(existing_pos) = self.scopes.declare(scope, symbol) {
                self.error(
                    format!("'{}' is already declared in this scope", param.name),
                    existing_pos.or(param.pos),
                );
            }
        }

        self.visit_block(&mut func.block, false);

        if func.return_type.is_some() && !block_has_return(&func.block) {
            self.error(
                format!("function '{}' must contain a 'знач' statement", func.name),
                func.pos,
            );
        }

        self.scopes.exit_scope(scope);
        self.current_function_return = previous;
    }

    fn visit_statement(&mut self, stmt: &mut Stmt) {
        let pos = stmt.meta.pos;
        match &mut stmt.kind {
            StmtKind::Assign { target, value } => {
                let target_ty = self.visit_expression(target);
                let value_ty = self.visit_expression(value);
                if is_function_or_builtin_target(target) {
                    self.error("cannot assign to a function name", pos);
                } else if let (Some(t), Some(v)) = (&target_ty, &value_ty) {
                    if !v.is_assignable_to(t) {
                        self.error(format!("cannot assign {v} to a variable of type {t}"), pos);
                    }
                }
            }
            StmtKind::If { cond, then_stmts, else_stmts } => {
                let cond_ty = self.visit_expression(cond);
                if let Some(t) = cond_ty {
                    if t != Type::Boolean {
                        self.error(format!("condition must be boolean, got {t}"), pos);
                    }
                }
                let scope = self.scopes.enter_scope("if-then");
                for s in then_stmts.iter_mut() {
                    self.visit_statement(s);
                }
                self.scopes.exit_scope(scope);
                if let Some(else_body) = else_stmts {
                    let scope = self.scopes.enter_scope("if-else");
                    for s in else_body.iter_mut() {
                        self.visit_statement(s);
                    }
                    self.scopes.exit_scope(scope);
                }
            }
            StmtKind::For { var_name, start, end, step, body } => {
                match self.scopes.lookup(self.scopes.current(), var_name) {
                    Some(sym) if sym.ty != Type::Integer => {
                        self.error(format!("loop variable '{var_name}' must be of integer type"), pos);
                    }
                    None => self.error(format!("undefined identifier '{var_name}'"), pos),
                    _ => {}
                }
                self.expect_integer(start, pos, "loop start value");
                self.expect_integer(end, pos, "loop end value");
                if let Some(step) = step {
                    self.expect_integer(step, pos, "loop step value");
                }
                let scope = self.scopes.enter_scope("for-body");
                for s in body.iter_mut() {
                    self.visit_statement(s);
                }
                self.scopes.exit_scope(scope);
            }
            StmtKind::While { cond, body } => {
                let cond_ty = self.visit_expression(cond);
                if let Some(t) = cond_ty {
                    if t != Type::Boolean {
                        self.error(format!("loop condition must be boolean, got {t}"), pos);
                    }
                }
                let scope = self.scopes.enter_scope("while-body");
                for s in body.iter_mut() {
                    self.visit_statement(s);
                }
                self.scopes.exit_scope(scope);
            }
            StmtKind::DoUntil { body, cond } => {
                let scope = self.scopes.enter_scope("do-until-body");
                for s in body.iter_mut() {
                    self.visit_statement(s);
                }
                self.scopes.exit_scope(scope);
                let cond_ty = self.visit_expression(cond);
                if let Some(t) = cond_ty {
                    if t != Type::Boolean {
                        self.error(format!("loop condition must be boolean, got {t}"), pos);
                    }
                }
            }
            StmtKind::Break | StmtKind::Continue => {
                // `break`/`continue` outside a loop is a codegen-time check (`spec.md` §4.1).
            }
            StmtKind::Return { value } => {
                self.visit_return(value.as_mut(), pos);
            }
            StmtKind::CallStmt { call } => {
                // A call used as a statement discards whatever it produces;
                // the code generator pops it unconditionally regardless of
                // return type (`spec.md` §4.4), so no value/void check is
                // needed here beyond what `visit_call` already enforces.
                self.visit_expression(call);
            }
        }
        stmt.meta.ty = Some(Type::Void);
    }

    fn expect_integer(&mut self, expr: &mut Expr, pos: Option<Position>, what: &str) {
        let ty = self.visit_expression(expr);
        if let Some(t) = ty {
            if t != Type::Integer {
                self.error(format!("{what} must be of integer type, got {t}"), pos);
            }
        }
    }

    fn visit_return(&mut self, value: Option<&mut Expr>, pos: Option<Position>) {
        let Some(expected) = self.current_function_return.clone() else {
            self.error("'знач' may only be used inside a function", pos);
            return;
        };
        match value {
            Some(expr) => {
                let actual = self.visit_expression(expr);
                match (actual, expected) {
                    (Some(_), None) => self.error("a procedure cannot return a value", pos),
                    (Some(a), Some(e)) if !a.is_assignable_to(&e) => {
                        self.error(format!("incompatible return type: expected {e}, got {a}"), pos);
                    }
                    _ => {}
                }
            }
            None => {
                if let Some(e) = expected {
                    self.error(format!("function must return a value of type {e}"), pos);
                }
            }
        }
    }

    fn visit_expression(&mut self, expr: &mut Expr) -> Option<Type> {
        let pos = expr.meta.pos;
        let ty = match &mut expr.kind {
            ExprKind::BinOp { op, left, right } => {
                let left_ty = self.visit_expression(left);
                let right_ty = self.visit_expression(right);
                match (left_ty, right_ty) {
                    (Some(l), Some(r)) => match binary_result_type(*op, &l, &r) {
                        Some(t) => Some(t),
                        None => {
                            self.error(format!("invalid operation '{op}' for types {l} and {r}"), pos);
                            None
                        }
                    },
                    _ => None,
                }
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand_ty = self.visit_expression(operand);
                operand_ty.and_then(|t| match unary_result_type(*op, &t) {
                    Some(r) => Some(r),
                    None => {
                        self.error(format!("invalid unary operation '{op}' for type {t}"), pos);
                        None
                    }
                })
            }
            ExprKind::Identifier(name) => match self.scopes.lookup(self.scopes.current(), name) {
                Some(sym) => Some(sym.ty.clone()),
                None => {
                    self.error(format!("undefined identifier '{name}'"), pos);
                    None
                }
            },
            ExprKind::ArrayAccess { array, index } => {
                let array_ty = self.visit_expression(array);
                let index_ty = self.visit_expression(index);
                if let Some(t) = &index_ty {
                    if *t != Type::Integer {
                        self.error("array index must be of integer type", pos);
                    }
                }
                match array_ty {
                    Some(Type::Array { element, .. }) => Some(*element),
                    Some(_) => {
                        self.error("attempted to index a non-array value", pos);
                        None
                    }
                    None => None,
                }
            }
            ExprKind::Call { name, args } => self.visit_call(name.clone(), args, pos),
            ExprKind::Int(_) => Some(Type::Integer),
            ExprKind::Bool(_) => Some(Type::Boolean),
            ExprKind::Char(_) => Some(Type::Char),
            ExprKind::String(_) => Some(Type::String),
        };
        expr.meta.ty = ty.clone();
        ty
    }

    fn visit_call(&mut self, name: String, args: &mut [Expr], pos: Option<Position>) -> Option<Type> {
        if POLYMORPHIC_BUILTINS.contains(&name.as_str()) {
            if args.len() != 1 {
                self.error(format!("'{name}' expects 1 argument, got {}", args.len()), pos);
                return None;
            }
            self.visit_expression(&mut args[0]);
            return Some(Type::Void);
        }

        let Some(sym) = self.scopes.lookup(self.scopes.current(), &name).cloned() else {
            self.error(format!("undefined identifier '{name}'"), pos);
            return None;
        };
        let Type::Function { params, returns } = sym.ty else {
            self.error(format!("'{name}' is not a function"), pos);
            return None;
        };
        if args.len() != params.len() {
            self.error(
                format!("function '{name}' expects {} arguments, got {}", params.len(), args.len()),
                pos,
            );
            return None;
        }
        for (i, (arg, expected)) in args.iter_mut().zip(params.iter()).enumerate() {
            if let Some(actual) = self.visit_expression(arg) {
                if !actual.is_assignable_to(expected) {
                    self.error(
                        format!("argument {} of '{name}': expected {expected}, got {actual}", i + 1),
                        pos,
                    );
                }
            }
        }
        Some(returns.map(|b| *b).unwrap_or(Type::Void))
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn simple_type(name: SimpleTypeName) -> Type {
    name.to_type()
}

fn is_function_or_builtin_target(target: &Expr) -> bool {
    // Only reachable after `visit_expression` has populated `ty`; a plain
    // identifier naming a function carries a `Function` type.
    matches!(target.ty(), Some(Type::Function { .. }))
}

fn block_has_return(block: &Block) -> bool {
    block.statements.iter().any(stmt_has_return)
}

fn stmt_has_return(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return { .. } => true,
        StmtKind::If { then_stmts, else_stmts, .. } => {
            then_stmts.iter().any(stmt_has_return)
                || else_stmts.as_ref().is_some_and(|e| e.iter().any(stmt_has_return))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, TypeNode};
    use crate::position::Position;

    fn simple_type_node(name: SimpleTypeName) -> TypeNode {
        TypeNode::Simple { name }
    }

    #[test]
    fn undeclared_identifier_is_reported() {
        let mut program = Program {
            name: "p".into(),
            block: Block {
                var_decls: vec![],
                func_decls: vec![],
                statements: vec![Stmt::new(
                    StmtKind::CallStmt {
                        call: Expr::new(
                            ExprKind::Call { name: "print".into(), args: vec![Expr::ident("missing")] },
                            Some(Position::new(1, 1)),
                        ),
                    },
                    Some(Position::new(1, 1)),
                )],
            },
        };
        let (errors, _) = Analyzer::new().analyze(&mut program);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("missing"));
    }

    #[test]
    fn redeclaration_in_same_scope_is_reported() {
        let decl = |name: &str| VarDecl {
            name: name.to_owned(),
            declared_type: simple_type_node(SimpleTypeName::Int),
            pos: Some(Position::new(2, 1)),
        };
        let mut program = Program {
            name: "p".into(),
            block: Block {
                var_decls: vec![decl("a"), decl("a")],
                func_decls: vec![],
                statements: vec![],
            },
        };
        let (errors, _) = Analyzer::new().analyze(&mut program);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn function_call_argument_count_mismatch_is_reported() {
        let func = FuncDecl {
            name: "sum".into(),
            params: vec![Param {
                name: "x".into(),
                declared_type: simple_type_node(SimpleTypeName::Int),
                pos: None,
            }],
            return_type: Some(simple_type_node(SimpleTypeName::Int)),
            block: Block {
                var_decls: vec![],
                func_decls: vec![],
                statements: vec![Stmt::new(
                    StmtKind::Return { value: Some(Expr::ident("x")) },
                    None,
                )],
            },
            pos: None,
        };
        let mut program = Program {
            name: "p".into(),
            block: Block {
                var_decls: vec![],
                func_decls: vec![func],
                statements: vec![Stmt::new(
                    StmtKind::CallStmt {
                        call: Expr::new(
                            ExprKind::Call { name: "sum".into(), args: vec![] },
                            Some(Position::new(3, 1)),
                        ),
                    },
                    Some(Position::new(3, 1)),
                )],
            },
        };
        let (errors, _) = Analyzer::new().analyze(&mut program);
        assert!(errors.iter().any(|e| e.message.contains("expects 1 arguments")));
    }

    #[test]
    fn valid_program_analyzes_cleanly() {
        let decl = VarDecl {
            name: "a".into(),
            declared_type: simple_type_node(SimpleTypeName::Int),
            pos: None,
        };
        let mut program = Program {
            name: "p".into(),
            block: Block {
                var_decls: vec![decl],
                func_decls: vec![],
                statements: vec![Stmt::new(
                    StmtKind::Assign { target: Expr::ident("a"), value: Expr::int(5) },
                    None,
                )],
            },
        };
        let (errors, _) = Analyzer::new().analyze(&mut program);
        assert!(errors.is_empty());
    }
}
