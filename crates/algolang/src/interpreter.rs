//! Tree-walking interpreter (`spec.md` §4.2).
//!
//! Evaluates an analyzed `Program` directly, against an **environment**: a
//! chain of frames, each a name → value mapping with a parent pointer.
//! Grounded on the teacher's `Namespaces` (`monty/src/namespace.rs`), whose
//! own doc comment explains the rationale adopted here: "instead of using
//! raw pointers to share namespace access between frames, we use indices
//! into [a] central [arena]." Frames are stored in a flat `Vec<Frame>`
//! addressed by `FrameId`, not a borrowed parent-pointer chain, so a
//! function call's frame can point straight at the global frame without
//! fighting the borrow checker over simultaneous mutable access.
//!
//! Non-local control flow is `StatementOutcome` (`spec.md` §9), the direct
//! analogue of the teacher Python's `BreakException`/`ContinueException`/
//! `ReturnException` (`original_source/interpreter.py`).

use ahash::AHashMap;

use crate::ast::{Block, Expr, ExprKind, FuncDecl, Program, Stmt, StmtKind};
use crate::errors::RuntimeError;
use crate::position::Position;
use crate::types::{ArithOp, BinOpKind, CmpOp, LogicOp, UnaryOpKind};
use crate::value::{values_equal, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameId(usize);

struct Frame {
    parent: Option<FrameId>,
    variables: AHashMap<String, Value>,
}

/// Non-local control-flow signal returned by the statement visitor,
/// replacing the teacher's exception-based `Break`/`Continue`/`Return`.
pub enum StatementOutcome {
    Normal,
    Break,
    Continue,
    Return(Option<Value>),
}

/// A source of input lines for the `read` builtin (SPEC_FULL.md §6a).
pub trait InputSource {
    fn next_line(&mut self) -> Option<String>;
}

impl InputSource for std::vec::IntoIter<String> {
    fn next_line(&mut self) -> Option<String> {
        Iterator::next(self)
    }
}

pub struct Interpreter<'a> {
    frames: Vec<Frame>,
    global: FrameId,
    functions: AHashMap<&'a str, &'a FuncDecl>,
    output: Vec<String>,
    input: Option<&'a mut dyn InputSource>,
}

impl<'a> Interpreter<'a> {
    #[must_use]
    pub fn new(input: Option<&'a mut dyn InputSource>) -> Self {
        let global = Frame { parent: None, variables: AHashMap::new() };
        Self {
            frames: vec![global],
            global: FrameId(0),
            functions: AHashMap::new(),
            output: Vec::new(),
            input,
        }
    }

    /// Runs `program` to completion and returns the captured output buffer,
    /// one entry per `print` call, newline already appended (`spec.md` §6).
    pub fn run(mut self, program: &'a Program) -> Result<Vec<String>, RuntimeError> {
        self.register_functions(&program.block);
        match self.exec_block(&program.block, self.global)? {
            StatementOutcome::Return(_) | StatementOutcome::Normal => {}
            StatementOutcome::Break | StatementOutcome::Continue => {
                return Err(RuntimeError::new("break/continue outside a loop at top level", None));
            }
        }
        Ok(self.output)
    }

    fn register_functions(&mut self, block: &'a Block) {
        for func in &block.func_decls {
            self.functions.insert(func.name.as_str(), func);
        }
    }

    fn push_frame(&mut self, parent: FrameId) -> FrameId {
        let id = FrameId(self.frames.len());
        self.frames.push(Frame { parent: Some(parent), variables: AHashMap::new() });
        id
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn define(&mut self, frame: FrameId, name: &str, value: Value) {
        self.frames[frame.0].variables.insert(name.to_owned(), value);
    }

    fn get(&self, frame: FrameId, name: &str) -> Option<Value> {
        let mut current = Some(frame);
        while let Some(id) = current {
            if let Some(v) = self.frames[id.0].variables.get(name) {
                return Some(v.clone());
            }
            current = self.frames[id.0].parent;
        }
        None
    }

    fn set(&mut self, frame: FrameId, name: &str, value: Value) -> bool {
        let mut current = Some(frame);
        while let Some(id) = current {
            if self.frames[id.0].variables.contains_key(name) {
                self.frames[id.0].variables.insert(name.to_owned(), value);
                return true;
            }
            current = self.frames[id.0].parent;
        }
        false
    }

    fn exec_block(&mut self, block: &'a Block, parent: FrameId) -> Result<StatementOutcome, RuntimeError> {
        let frame = self.push_frame(parent);
        let outcome = self.exec_block_in_frame(block, frame);
        self.pop_frame();
        outcome
    }

    fn exec_block_in_frame(&mut self, block: &'a Block, frame: FrameId) -> Result<StatementOutcome, RuntimeError> {
        for decl in &block.var_decls {
            let ty = decl.declared_type.resolve();
            let value = Value::default_for(&ty);
            self.define(frame, &decl.name, value);
        }
        self.exec_statements(&block.statements, frame)
    }

    /// Runs a bare statement list (an `If`/`For`/`While`/`DoUntil` body, which
    /// the AST represents as `Vec<Stmt>` with no declarations section of its
    /// own) in a fresh child scope of `parent`.
    fn exec_stmt_list(&mut self, stmts: &'a [Stmt], parent: FrameId) -> Result<StatementOutcome, RuntimeError> {
        let frame = self.push_frame(parent);
        let outcome = self.exec_statements(stmts, frame);
        self.pop_frame();
        outcome
    }

    fn exec_statements(&mut self, stmts: &'a [Stmt], frame: FrameId) -> Result<StatementOutcome, RuntimeError> {
        for stmt in stmts {
            match self.exec_statement(stmt, frame)? {
                StatementOutcome::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(StatementOutcome::Normal)
    }

    fn exec_statement(&mut self, stmt: &'a Stmt, frame: FrameId) -> Result<StatementOutcome, RuntimeError> {
        let pos = stmt.meta.pos;
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let v = self.eval(value, frame)?;
                self.assign(target, v, frame, pos)?;
                Ok(StatementOutcome::Normal)
            }
            StmtKind::If { cond, then_stmts, else_stmts } => {
                if self.eval(cond, frame)?.as_bool().unwrap_or(false) {
                    self.exec_stmt_list(then_stmts, frame)
                } else if let Some(else_body) = else_stmts {
                    self.exec_stmt_list(else_body, frame)
                } else {
                    Ok(StatementOutcome::Normal)
                }
            }
            StmtKind::For { var_name, start, end, step, body } => {
                self.exec_for(var_name, start, end, step.as_ref(), body, frame, pos)
            }
            StmtKind::While { cond, body } => self.exec_while(cond, body, frame),
            StmtKind::DoUntil { body, cond } => self.exec_do_until(body, cond, frame),
            StmtKind::Break => Ok(StatementOutcome::Break),
            StmtKind::Continue => Ok(StatementOutcome::Continue),
            StmtKind::Return { value } => {
                let v = match value {
                    Some(expr) => Some(self.eval(expr, frame)?),
                    None => None,
                };
                Ok(StatementOutcome::Return(v))
            }
            StmtKind::CallStmt { call } => {
                self.eval(call, frame)?;
                Ok(StatementOutcome::Normal)
            }
        }
    }

    fn exec_for(
        &mut self,
        var_name: &str,
        start: &'a Expr,
        end: &'a Expr,
        step: Option<&'a Expr>,
        body: &'a [Stmt],
        frame: FrameId,
        pos: Option<Position>,
    ) -> Result<StatementOutcome, RuntimeError> {
        let start_value = self.eval(start, frame)?.as_int().ok_or_else(|| runtime_err("for loop start is not an integer", pos))?;
        let end_value = self.eval(end, frame)?.as_int().ok_or_else(|| runtime_err("for loop end is not an integer", pos))?;
        let step_value = match step {
            Some(expr) => self.eval(expr, frame)?.as_int().ok_or_else(|| runtime_err("for loop step is not an integer", pos))?,
            None => 1,
        };

        if !self.set(frame, var_name, Value::Int(start_value)) {
            return Err(runtime_err(format!("undefined identifier '{var_name}'"), pos));
        }

        loop {
            let current = self
                .get(frame, var_name)
                .and_then(|v| v.as_int())
                .ok_or_else(|| runtime_err(format!("undefined identifier '{var_name}'"), pos))?;
            let continue_looping = if step_value >= 0 { current <= end_value } else { current >= end_value };
            if !continue_looping {
                break;
            }

            match self.exec_stmt_list(body, frame)? {
                StatementOutcome::Break => break,
                StatementOutcome::Return(v) => return Ok(StatementOutcome::Return(v)),
                StatementOutcome::Normal | StatementOutcome::Continue => {}
            }

            let current = self
                .get(frame, var_name)
                .and_then(|v| v.as_int())
                .ok_or_else(|| runtime_err(format!("undefined identifier '{var_name}'"), pos))?;
            self.set(frame, var_name, Value::Int(current + step_value));
        }
        Ok(StatementOutcome::Normal)
    }

    fn exec_while(&mut self, cond: &'a Expr, body: &'a [Stmt], frame: FrameId) -> Result<StatementOutcome, RuntimeError> {
        loop {
            if !self.eval(cond, frame)?.as_bool().unwrap_or(false) {
                break;
            }
            match self.exec_stmt_list(body, frame)? {
                StatementOutcome::Break => break,
                StatementOutcome::Return(v) => return Ok(StatementOutcome::Return(v)),
                StatementOutcome::Normal | StatementOutcome::Continue => {}
            }
        }
        Ok(StatementOutcome::Normal)
    }

    fn exec_do_until(&mut self, body: &'a [Stmt], cond: &'a Expr, frame: FrameId) -> Result<StatementOutcome, RuntimeError> {
        loop {
            match self.exec_stmt_list(body, frame)? {
                StatementOutcome::Break => break,
                StatementOutcome::Return(v) => return Ok(StatementOutcome::Return(v)),
                StatementOutcome::Normal | StatementOutcome::Continue => {}
            }
            if self.eval(cond, frame)?.as_bool().unwrap_or(false) {
                break;
            }
        }
        Ok(StatementOutcome::Normal)
    }

    fn assign(&mut self, target: &'a Expr, value: Value, frame: FrameId, pos: Option<Position>) -> Result<(), RuntimeError> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                if !self.set(frame, name, value) {
                    return Err(runtime_err(format!("undefined identifier '{name}'"), pos));
                }
                Ok(())
            }
            ExprKind::ArrayAccess { array, index } => {
                let array_value = self.eval(array, frame)?;
                let index_value = self.eval(index, frame)?.as_int().ok_or_else(|| runtime_err("array index is not an integer", pos))?;
                let array_ref = array_value.as_array().ok_or_else(|| runtime_err("indexing a non-array value", pos))?;
                let mut slots = array_ref.borrow_mut();
                if index_value < 1 || index_value as usize > slots.len() {
                    return Err(runtime_err(format!("index {index_value} is out of array bounds"), pos));
                }
                slots[(index_value - 1) as usize] = value;
                Ok(())
            }
            _ => Err(runtime_err("invalid assignment target", pos)),
        }
    }

    fn eval(&mut self, expr: &'a Expr, frame: FrameId) -> Result<Value, RuntimeError> {
        let pos = expr.meta.pos;
        match &expr.kind {
            ExprKind::BinOp { op, left, right } => self.eval_bin_op(*op, left, right, frame, pos),
            ExprKind::UnaryOp { op, operand } => self.eval_unary_op(*op, operand, frame, pos),
            ExprKind::Identifier(name) => {
                self.get(frame, name).ok_or_else(|| runtime_err(format!("undefined identifier '{name}'"), pos))
            }
            ExprKind::ArrayAccess { array, index } => {
                let array_value = self.eval(array, frame)?;
                let index_value = self.eval(index, frame)?.as_int().ok_or_else(|| runtime_err("array index is not an integer", pos))?;
                let array_ref = array_value.as_array().ok_or_else(|| runtime_err("indexing a non-array value", pos))?;
                let slots = array_ref.borrow();
                if index_value < 1 || index_value as usize > slots.len() {
                    return Err(runtime_err(format!("index {index_value} is out of array bounds"), pos));
                }
                Ok(slots[(index_value - 1) as usize].clone())
            }
            ExprKind::Call { name, args } => self.eval_call(name, args, frame, pos),
            ExprKind::Int(v) => Ok(Value::Int(*v)),
            ExprKind::Bool(v) => Ok(Value::Bool(*v)),
            ExprKind::Char(v) => Ok(Value::Char(*v)),
            ExprKind::String(v) => Ok(Value::Str(v.clone())),
        }
    }

    fn eval_bin_op(
        &mut self,
        op: BinOpKind,
        left: &'a Expr,
        right: &'a Expr,
        frame: FrameId,
        pos: Option<Position>,
    ) -> Result<Value, RuntimeError> {
        // Short-circuit (`spec.md` §4.2, Testable Property 7): `b` is
        // evaluated only when its value can still change the result.
        if let BinOpKind::Logic(logic) = op {
            let left_value = self.eval(left, frame)?.as_bool().ok_or_else(|| runtime_err("operand is not boolean", pos))?;
            return match logic {
                LogicOp::And => {
                    if !left_value {
                        Ok(Value::Bool(false))
                    } else {
                        let right_value = self.eval(right, frame)?.as_bool().ok_or_else(|| runtime_err("operand is not boolean", pos))?;
                        Ok(Value::Bool(right_value))
                    }
                }
                LogicOp::Or => {
                    if left_value {
                        Ok(Value::Bool(true))
                    } else {
                        let right_value = self.eval(right, frame)?.as_bool().ok_or_else(|| runtime_err("operand is not boolean", pos))?;
                        Ok(Value::Bool(right_value))
                    }
                }
            };
        }

        let left_value = self.eval(left, frame)?;
        let right_value = self.eval(right, frame)?;

        match op {
            BinOpKind::Arith(arith) => {
                let l = left_value.as_int().ok_or_else(|| runtime_err("operand is not an integer", pos))?;
                let r = right_value.as_int().ok_or_else(|| runtime_err("operand is not an integer", pos))?;
                match arith {
                    ArithOp::Add => Ok(Value::Int(l.wrapping_add(r))),
                    ArithOp::Sub => Ok(Value::Int(l.wrapping_sub(r))),
                    ArithOp::Mul => Ok(Value::Int(l.wrapping_mul(r))),
                    ArithOp::Div | ArithOp::IDiv => {
                        if r == 0 {
                            Err(runtime_err("division by zero", pos))
                        } else {
                            Ok(Value::Int(l.wrapping_div(r)))
                        }
                    }
                    ArithOp::Mod => {
                        if r == 0 {
                            Err(runtime_err("division by zero", pos))
                        } else {
                            Ok(Value::Int(l.wrapping_rem(r)))
                        }
                    }
                }
            }
            BinOpKind::Cmp(cmp) => {
                let ordering = compare_values(&left_value, &right_value, pos)?;
                Ok(Value::Bool(match cmp {
                    CmpOp::Eq => values_equal(&left_value, &right_value),
                    CmpOp::Ne => !values_equal(&left_value, &right_value),
                    CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                    CmpOp::Le => ordering != std::cmp::Ordering::Greater,
                    CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                    CmpOp::Ge => ordering != std::cmp::Ordering::Less,
                }))
            }
            BinOpKind::Logic(_) => unreachable!("handled above via short-circuit evaluation"),
        }
    }

    fn eval_unary_op(&mut self, op: UnaryOpKind, operand: &'a Expr, frame: FrameId, pos: Option<Position>) -> Result<Value, RuntimeError> {
        let value = self.eval(operand, frame)?;
        match op {
            UnaryOpKind::Plus => {
                let v = value.as_int().ok_or_else(|| runtime_err("operand is not an integer", pos))?;
                Ok(Value::Int(v))
            }
            UnaryOpKind::Minus => {
                let v = value.as_int().ok_or_else(|| runtime_err("operand is not an integer", pos))?;
                Ok(Value::Int(v.wrapping_neg()))
            }
            UnaryOpKind::Not => {
                let v = value.as_bool().ok_or_else(|| runtime_err("operand is not boolean", pos))?;
                Ok(Value::Bool(!v))
            }
        }
    }

    fn eval_call(&mut self, name: &str, args: &'a [Expr], frame: FrameId, pos: Option<Position>) -> Result<Value, RuntimeError> {
        match name {
            "print" => {
                let v = self.eval(&args[0], frame)?;
                self.output.push(format!("{}\n", v.format()));
                Ok(Value::Void)
            }
            "inc" | "dec" => {
                let ExprKind::Identifier(var_name) = &args[0].kind else {
                    return Err(runtime_err(format!("'{name}' requires a variable argument"), pos));
                };
                let current = self.get(frame, var_name).and_then(|v| v.as_int()).ok_or_else(|| runtime_err(format!("undefined identifier '{var_name}'"), pos))?;
                let updated = if name == "inc" { current.wrapping_add(1) } else { current.wrapping_sub(1) };
                self.set(frame, var_name, Value::Int(updated));
                Ok(Value::Void)
            }
            "abs" => {
                let v = self.eval(&args[0], frame)?.as_int().ok_or_else(|| runtime_err("operand is not an integer", pos))?;
                Ok(Value::Int(v.abs()))
            }
            "ord" => {
                let c = self.eval(&args[0], frame)?;
                let ch = match c {
                    Value::Char(c) => c,
                    _ => return Err(runtime_err("'ord' requires a char argument", pos)),
                };
                Ok(Value::Int(ch as i64))
            }
            "chr" => {
                let v = self.eval(&args[0], frame)?.as_int().ok_or_else(|| runtime_err("operand is not an integer", pos))?;
                let c = u32::try_from(v).ok().and_then(char::from_u32).ok_or_else(|| runtime_err(format!("{v} is not a valid character code"), pos))?;
                Ok(Value::Char(c))
            }
            "read" => {
                let ExprKind::Identifier(var_name) = &args[0].kind else {
                    return Err(runtime_err("'read' requires a variable argument", pos));
                };
                let line = self
                    .input
                    .as_deref_mut()
                    .and_then(InputSource::next_line)
                    .ok_or_else(|| runtime_err("end of input", pos))?;
                let parsed: i64 = line.trim().parse().map_err(|_| runtime_err(format!("'{line}' is not an integer"), pos))?;
                if !self.set(frame, var_name, Value::Int(parsed)) {
                    return Err(runtime_err(format!("undefined identifier '{var_name}'"), pos));
                }
                Ok(Value::Void)
            }
            _ => self.call_user_function(name, args, frame, pos),
        }
    }

    fn call_user_function(&mut self, name: &str, args: &'a [Expr], frame: FrameId, pos: Option<Position>) -> Result<Value, RuntimeError> {
        let func = *self.functions.get(name).ok_or_else(|| runtime_err(format!("undefined function '{name}'"), pos))?;
        if args.len() != func.params.len() {
            return Err(runtime_err(
                format!("function '{name}' expects {} arguments, got {}", func.params.len(), args.len()),
                pos,
            ));
        }
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.eval(arg, frame)?);
        }

        // Function frames parent the global frame directly, not the caller's
        // frame (`spec.md` §4.2: "no dynamic chaining through callers").
        let call_frame = self.push_frame(self.global);
        for (param, value) in func.params.iter().zip(arg_values) {
            self.define(call_frame, &param.name, value);
        }
        let outcome = self.exec_block_in_frame(&func.block, call_frame);
        self.pop_frame();

        match outcome? {
            StatementOutcome::Return(v) => Ok(v.unwrap_or(Value::Void)),
            // Falling off the end of a function body without hitting a
            // `Return` on every path (the analyzer's `block_has_return`
            // check only proves one is reachable, not that it always is;
            // see `codegen.rs`'s matching fallback) yields the return
            // type's default rather than `Void`, so the interpreter and
            // the compiled-and-run VM agree even on this edge case.
            _ => Ok(func.return_type.as_ref().map_or(Value::Void, |t| Value::default_for(&t.resolve()))),
        }
    }
}

fn compare_values(a: &Value, b: &Value, pos: Option<Position>) -> Result<std::cmp::Ordering, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::Char(x), Value::Char(y)) => Ok(x.cmp(y)),
        _ => Err(runtime_err("operands are not comparable", pos)),
    }
}

fn runtime_err(message: impl Into<String>, pos: Option<Position>) -> RuntimeError {
    RuntimeError::new(message, pos)
}
