//! AST constant folder (`spec.md` §4.6, optimizer pass 1).
//!
//! A bottom-up rewrite producing an equivalent, typed AST plus a count of
//! applied transformations. Grounded on `original_source/optim.py`'s
//! `ConstantFolder`, restructured for ownership: instead of visitors that
//! return a *new* node while holding the old one borrowed, each `fold_*`
//! function consumes its input and returns the replacement (statements
//! return a `Vec<Stmt>` since folding an `if`/`while` can remove, or inline,
//! a whole branch).

use crate::ast::{Block, ConstValue, Expr, ExprKind, FuncDecl, Program, Stmt, StmtKind};
use crate::types::{ArithOp, BinOpKind, CmpOp, LogicOp, Type, UnaryOpKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct FoldStats {
    pub applied: u32,
}

pub fn fold_program(program: &mut Program) -> FoldStats {
    let mut stats = FoldStats::default();
    fold_block(&mut program.block, &mut stats);
    stats
}

fn fold_block(block: &mut Block, stats: &mut FoldStats) {
    for func in &mut block.func_decls {
        fold_func_decl(func, stats);
    }
    let statements = std::mem::take(&mut block.statements);
    block.statements = fold_stmts(statements, stats);
}

fn fold_func_decl(func: &mut FuncDecl, stats: &mut FoldStats) {
    fold_block(&mut func.block, stats);
}

fn fold_stmts(stmts: Vec<Stmt>, stats: &mut FoldStats) -> Vec<Stmt> {
    stmts.into_iter().flat_map(|s| fold_stmt(s, stats)).collect()
}

fn fold_stmt(mut stmt: Stmt, stats: &mut FoldStats) -> Vec<Stmt> {
    match stmt.kind {
        StmtKind::Assign { target, value } => {
            let value = fold_expr(value, stats);
            stmt.kind = StmtKind::Assign { target, value };
            vec![stmt]
        }
        StmtKind::If { cond, then_stmts, else_stmts } => {
            let cond = fold_expr(cond, stats);
            if let Some(ConstValue::Bool(b)) = &cond.meta.const_value {
                stats.applied += 1;
                return if *b {
                    fold_stmts(then_stmts, stats)
                } else {
                    else_stmts.map(|e| fold_stmts(e, stats)).unwrap_or_default()
                };
            }
            let then_stmts = fold_stmts(then_stmts, stats);
            let else_stmts = else_stmts.map(|e| fold_stmts(e, stats));
            stmt.kind = StmtKind::If { cond, then_stmts, else_stmts };
            vec![stmt]
        }
        StmtKind::For { var_name, start, end, step, body } => {
            let start = fold_expr(start, stats);
            let end = fold_expr(end, stats);
            let step = step.map(|s| fold_expr(s, stats));
            let body = fold_stmts(body, stats);
            stmt.kind = StmtKind::For { var_name, start, end, step, body };
            vec![stmt]
        }
        StmtKind::While { cond, body } => {
            let cond = fold_expr(cond, stats);
            if let Some(ConstValue::Bool(false)) = &cond.meta.const_value {
                stats.applied += 1;
                return vec![];
            }
            let body = fold_stmts(body, stats);
            stmt.kind = StmtKind::While { cond, body };
            vec![stmt]
        }
        StmtKind::DoUntil { body, cond } => {
            let body = fold_stmts(body, stats);
            let cond = fold_expr(cond, stats);
            stmt.kind = StmtKind::DoUntil { body, cond };
            vec![stmt]
        }
        StmtKind::Break | StmtKind::Continue => vec![stmt],
        StmtKind::Return { value } => {
            let value = value.map(|v| fold_expr(v, stats));
            stmt.kind = StmtKind::Return { value };
            vec![stmt]
        }
        StmtKind::CallStmt { call } => {
            let call = fold_expr(call, stats);
            stmt.kind = StmtKind::CallStmt { call };
            vec![stmt]
        }
    }
}

fn fold_expr(expr: Expr, stats: &mut FoldStats) -> Expr {
    match expr.kind {
        ExprKind::BinOp { op, left, right } => {
            let left = fold_expr(*left, stats);
            let right = fold_expr(*right, stats);
            fold_bin_op(op, left, right, expr.meta.pos, stats)
        }
        ExprKind::UnaryOp { op, operand } => {
            let operand = fold_expr(*operand, stats);
            fold_unary_op(op, operand, expr.meta.pos, stats)
        }
        ExprKind::ArrayAccess { array, index } => {
            let array = Box::new(fold_expr(*array, stats));
            let index = Box::new(fold_expr(*index, stats));
            Expr { kind: ExprKind::ArrayAccess { array, index }, meta: expr.meta }
        }
        ExprKind::Call { name, args } => {
            let args = args.into_iter().map(|a| fold_expr(a, stats)).collect();
            Expr { kind: ExprKind::Call { name, args }, meta: expr.meta }
        }
        ExprKind::Identifier(_) | ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Char(_) | ExprKind::String(_) => {
            expr
        }
    }
}

fn literal(value: ConstValue, ty: Option<Type>, pos: Option<crate::position::Position>) -> Expr {
    let kind = match &value {
        ConstValue::Int(v) => ExprKind::Int(*v),
        ConstValue::Bool(v) => ExprKind::Bool(*v),
        ConstValue::Char(v) => ExprKind::Char(*v),
        ConstValue::Str(v) => ExprKind::String(v.clone()),
    };
    let mut e = Expr::new(kind, pos);
    e.meta.ty = ty;
    e.meta.const_value = Some(value);
    e
}

fn fold_bin_op(
    op: BinOpKind,
    left: Expr,
    right: Expr,
    pos: Option<crate::position::Position>,
    stats: &mut FoldStats,
) -> Expr {
    let ty = binary_ty(op, &left, &right);
    if let (Some(l), Some(r)) = (&left.meta.const_value, &right.meta.const_value) {
        if let Some(result) = evaluate_binary(op, l, r) {
            stats.applied += 1;
            return literal(result, ty, pos);
        }
    }
    if let Some(folded) = apply_algebraic(op, &left, &right, stats) {
        return folded;
    }
    let meta_ty = ty;
    let mut e = Expr::new(
        ExprKind::BinOp { op, left: Box::new(left), right: Box::new(right) },
        pos,
    );
    e.meta.ty = meta_ty;
    e
}

fn binary_ty(op: BinOpKind, left: &Expr, right: &Expr) -> Option<Type> {
    match (left.meta.ty.clone(), right.meta.ty.clone()) {
        (Some(l), Some(r)) => crate::types::binary_result_type(op, &l, &r),
        _ => None,
    }
}

fn evaluate_binary(op: BinOpKind, left: &ConstValue, right: &ConstValue) -> Option<ConstValue> {
    match op {
        BinOpKind::Arith(arith) => {
            let (ConstValue::Int(l), ConstValue::Int(r)) = (left, right) else { return None };
            match arith {
                ArithOp::Add => Some(ConstValue::Int(l.wrapping_add(*r))),
                ArithOp::Sub => Some(ConstValue::Int(l.wrapping_sub(*r))),
                ArithOp::Mul => Some(ConstValue::Int(l.wrapping_mul(*r))),
                ArithOp::Div | ArithOp::IDiv => (*r != 0).then(|| ConstValue::Int(l.wrapping_div(*r))),
                ArithOp::Mod => (*r != 0).then(|| ConstValue::Int(l.wrapping_rem(*r))),
            }
        }
        BinOpKind::Cmp(cmp) => {
            let ordering = const_value_cmp(left, right)?;
            Some(ConstValue::Bool(match cmp {
                CmpOp::Eq => ordering == std::cmp::Ordering::Equal,
                CmpOp::Ne => ordering != std::cmp::Ordering::Equal,
                CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                CmpOp::Le => ordering != std::cmp::Ordering::Greater,
                CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                CmpOp::Ge => ordering != std::cmp::Ordering::Less,
            }))
        }
        BinOpKind::Logic(logic) => {
            let (ConstValue::Bool(l), ConstValue::Bool(r)) = (left, right) else { return None };
            Some(ConstValue::Bool(match logic {
                LogicOp::And => *l && *r,
                LogicOp::Or => *l || *r,
            }))
        }
    }
}

fn const_value_cmp(left: &ConstValue, right: &ConstValue) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (ConstValue::Int(l), ConstValue::Int(r)) => Some(l.cmp(r)),
        (ConstValue::Bool(l), ConstValue::Bool(r)) => Some(l.cmp(r)),
        (ConstValue::Char(l), ConstValue::Char(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn fold_unary_op(
    op: UnaryOpKind,
    operand: Expr,
    pos: Option<crate::position::Position>,
    stats: &mut FoldStats,
) -> Expr {
    let ty = operand
        .meta
        .ty
        .clone()
        .and_then(|t| crate::types::unary_result_type(op, &t));
    if let Some(value) = &operand.meta.const_value {
        let result = match (op, value) {
            (UnaryOpKind::Plus, ConstValue::Int(v)) => Some(ConstValue::Int(*v)),
            (UnaryOpKind::Minus, ConstValue::Int(v)) => Some(ConstValue::Int(v.wrapping_neg())),
            (UnaryOpKind::Not, ConstValue::Bool(v)) => Some(ConstValue::Bool(!v)),
            _ => None,
        };
        if let Some(result) = result {
            stats.applied += 1;
            return literal(result, ty, pos);
        }
    }
    let mut e = Expr::new(ExprKind::UnaryOp { op, operand: Box::new(operand) }, pos);
    e.meta.ty = ty;
    e
}

/// Algebraic identities (`spec.md` §4.6) guarded by purity (`spec.md` §9,
/// open question 2, decided in SPEC_FULL.md §9a.2): an identity that would
/// *discard* a non-literal operand only fires when that operand is pure.
fn apply_algebraic(op: BinOpKind, left: &Expr, right: &Expr, stats: &mut FoldStats) -> Option<Expr> {
    let left_int = int_literal(left);
    let right_int = int_literal(right);
    let left_bool = bool_literal(left);
    let right_bool = bool_literal(right);

    match op {
        BinOpKind::Arith(ArithOp::Add) => {
            if right_int == Some(0) {
                stats.applied += 1;
                return Some(left.clone());
            }
            if left_int == Some(0) {
                stats.applied += 1;
                return Some(right.clone());
            }
        }
        BinOpKind::Arith(ArithOp::Sub) => {
            if right_int == Some(0) {
                stats.applied += 1;
                return Some(left.clone());
            }
        }
        BinOpKind::Arith(ArithOp::Mul) => {
            if right_int == Some(1) {
                stats.applied += 1;
                return Some(left.clone());
            }
            if left_int == Some(1) {
                stats.applied += 1;
                return Some(right.clone());
            }
            if right_int == Some(0) && left.is_pure() {
                stats.applied += 1;
                return Some(literal(ConstValue::Int(0), left.meta.ty.clone(), left.meta.pos));
            }
            if left_int == Some(0) && right.is_pure() {
                stats.applied += 1;
                return Some(literal(ConstValue::Int(0), right.meta.ty.clone(), right.meta.pos));
            }
        }
        BinOpKind::Arith(ArithOp::Div) | BinOpKind::Arith(ArithOp::IDiv) => {
            if right_int == Some(1) {
                stats.applied += 1;
                return Some(left.clone());
            }
        }
        BinOpKind::Logic(LogicOp::And) => {
            if right_bool == Some(true) {
                stats.applied += 1;
                return Some(left.clone());
            }
            if left_bool == Some(true) {
                stats.applied += 1;
                return Some(right.clone());
            }
            if right_bool == Some(false) && left.is_pure() {
                stats.applied += 1;
                return Some(literal(ConstValue::Bool(false), left.meta.ty.clone(), left.meta.pos));
            }
            if left_bool == Some(false) && right.is_pure() {
                stats.applied += 1;
                return Some(literal(ConstValue::Bool(false), right.meta.ty.clone(), right.meta.pos));
            }
        }
        BinOpKind::Logic(LogicOp::Or) => {
            if right_bool == Some(false) {
                stats.applied += 1;
                return Some(left.clone());
            }
            if left_bool == Some(false) {
                stats.applied += 1;
                return Some(right.clone());
            }
            if right_bool == Some(true) && left.is_pure() {
                stats.applied += 1;
                return Some(literal(ConstValue::Bool(true), left.meta.ty.clone(), left.meta.pos));
            }
            if left_bool == Some(true) && right.is_pure() {
                stats.applied += 1;
                return Some(literal(ConstValue::Bool(true), right.meta.ty.clone(), right.meta.pos));
            }
        }
        _ => {}
    }
    None
}

fn int_literal(expr: &Expr) -> Option<i64> {
    match &expr.meta.const_value {
        Some(ConstValue::Int(v)) => Some(*v),
        _ => None,
    }
}

fn bool_literal(expr: &Expr) -> Option<bool> {
    match &expr.meta.const_value {
        Some(ConstValue::Bool(v)) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed_int(v: i64) -> Expr {
        let mut e = Expr::int(v);
        e.meta.ty = Some(Type::Integer);
        e
    }

    #[test]
    fn folds_constant_arithmetic() {
        let mut stats = FoldStats::default();
        let expr = Expr::new(
            ExprKind::BinOp {
                op: BinOpKind::Arith(ArithOp::Add),
                left: Box::new(typed_int(2)),
                right: Box::new(typed_int(3)),
            },
            None,
        );
        let folded = fold_expr(expr, &mut stats);
        assert_eq!(folded.meta.const_value, Some(ConstValue::Int(5)));
        assert_eq!(stats.applied, 1);
    }

    #[test]
    fn does_not_fold_division_by_zero() {
        let mut stats = FoldStats::default();
        let expr = Expr::new(
            ExprKind::BinOp {
                op: BinOpKind::Arith(ArithOp::Div),
                left: Box::new(typed_int(5)),
                right: Box::new(typed_int(0)),
            },
            None,
        );
        let folded = fold_expr(expr, &mut stats);
        assert!(matches!(folded.kind, ExprKind::BinOp { .. }));
        assert_eq!(stats.applied, 0);
    }

    #[test]
    fn zero_times_impure_call_is_not_folded() {
        let mut stats = FoldStats::default();
        let call = Expr::new(ExprKind::Call { name: "f".into(), args: vec![] }, None);
        let expr = Expr::new(
            ExprKind::BinOp {
                op: BinOpKind::Arith(ArithOp::Mul),
                left: Box::new(typed_int(0)),
                right: Box::new(call),
            },
            None,
        );
        let folded = fold_expr(expr, &mut stats);
        assert!(matches!(folded.kind, ExprKind::BinOp { .. }));
    }

    #[test]
    fn x_plus_zero_folds_to_x_even_when_x_is_a_call() {
        let mut stats = FoldStats::default();
        let call = Expr::new(ExprKind::Call { name: "f".into(), args: vec![] }, None);
        let expr = Expr::new(
            ExprKind::BinOp {
                op: BinOpKind::Arith(ArithOp::Add),
                left: Box::new(call),
                right: Box::new(typed_int(0)),
            },
            None,
        );
        let folded = fold_expr(expr, &mut stats);
        assert!(matches!(folded.kind, ExprKind::Call { .. }));
    }
}
