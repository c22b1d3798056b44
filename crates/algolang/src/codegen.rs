//! The bytecode code generator (`spec.md` §4.4).
//!
//! A single pass over the analyzed AST producing a `bytecode::Program`.
//! Grounded on the teacher's `CodeBuilder`/`Compiler` split
//! (`bytecode/builder.rs`, `bytecode/compiler.rs`): a builder-ish instruction
//! buffer plus constant-pool cache, and jump patching via a label handle
//! returned by `emit_jump`/resolved by `mark_label`. The teacher's labels
//! patch byte offsets because its encoding is variable-width; ours patch
//! plain instruction indices directly into the typed `Instruction` vector
//! (`spec.md` §4.3/§4.4: "Jmp* arguments are absolute instruction indices").
//!
//! **Local-slot numbering.** `scope::ScopeTree` resets its `local_count`
//! per nested scope (it exists to drive the *analyzer's* diagnostics, where
//! that doesn't matter). The bytecode VM has one flat locals vector per
//! call frame, so reusing index 0 for a function's first parameter *and*
//! a variable declared inside a nested `if`-block would alias two
//! simultaneously-live slots. This generator therefore keeps its own
//! function-wide, monotonically increasing local counter (`FunctionScope`)
//! instead of consulting `scope.rs`'s per-scope counts — see `DESIGN.md`.

use ahash::AHashMap;

use crate::ast::{
    Block, ConstValue, Expr, ExprKind, FuncDecl, Program as AstProgram, Stmt, StmtKind, VarDecl,
};
use crate::bytecode::{Instruction, Program as BcProgram};
use crate::errors::CodegenError;
use crate::position::Position;
use crate::types::{ArithOp, BinOpKind, CmpOp, LogicOp, Type, UnaryOpKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LabelId(u32);

#[derive(Debug, Default)]
struct Label {
    resolved: Option<u32>,
    /// Indices into `CodeGenerator::code` of instructions referencing this
    /// label (a `Jmp*` target or a `Call`'s `addr`), patched in `finish`.
    references: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct LoopLabels {
    break_label: LabelId,
    continue_label: LabelId,
}

/// Where an identifier resolves to, for load/store lowering.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Global(u32),
    Local(u32),
}

struct FunctionScope {
    /// Stack of block-local name → slot maps, innermost last, for shadowing.
    blocks: Vec<AHashMap<String, u32>>,
    next_local: u32,
    /// `None` for a procedure.
    return_type: Option<Type>,
}

pub struct CodeGenerator {
    code: Vec<Instruction>,
    constants: Vec<ConstValue>,
    const_cache: AHashMap<ConstValue, u32>,
    globals: AHashMap<String, u32>,
    next_global: u32,
    function_labels: AHashMap<String, LabelId>,
    /// A function's local-slot count, known only once its body finishes
    /// compiling. Callers may be compiled before that (top-level code always
    /// runs after every function body, but one function may call another
    /// declared later), so every `Call` site is patched with its callee's
    /// `nlocals` in `finish` rather than at the call site itself.
    function_nlocals: AHashMap<LabelId, u16>,
    labels: Vec<Label>,
    loop_stack: Vec<LoopLabels>,
    current_function: Option<FunctionScope>,
    errors: Vec<CodegenError>,
}

impl CodeGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            const_cache: AHashMap::new(),
            globals: AHashMap::new(),
            next_global: 0,
            function_labels: AHashMap::new(),
            function_nlocals: AHashMap::new(),
            labels: Vec::new(),
            loop_stack: Vec::new(),
            current_function: None,
            errors: Vec::new(),
        }
    }

    /// Lowers an analyzed `Program` to bytecode.
    ///
    /// # Errors
    /// Returns the first `CodegenError` encountered: `spec.md` §7 has the
    /// code generator abort on first error, unlike the analyzer.
    pub fn generate(mut self, program: &AstProgram) -> Result<BcProgram, CodegenError> {
        // Forward references between functions are legal (`spec.md` §4.1),
        // so every function gets a label before any body is compiled.
        for func in &program.block.func_decls {
            let label = self.new_label();
            self.function_labels.insert(func.name.clone(), label);
        }

        let entry_label = self.new_label();
        self.emit_jump(Instruction::Jmp(0), entry_label);

        for func in &program.block.func_decls {
            self.compile_func_decl(func);
            if let Some(err) = self.errors.first() {
                return Err(err.clone());
            }
        }

        self.mark_label(entry_label);
        self.compile_top_level(&program.block);
        self.emit(Instruction::Halt);

        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        self.finish()
    }

    fn error(&mut self, message: impl Into<String>, pos: Option<Position>) {
        self.errors.push(CodegenError::new(message, pos));
    }

    // ---- label plumbing ----

    fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(Label::default());
        id
    }

    fn mark_label(&mut self, label: LabelId) {
        self.labels[label.0 as usize].resolved = Some(self.code.len() as u32);
    }

    /// Emits `instr` (a placeholder `Jmp*`/`Call`) and records its index as
    /// a reference to `label`, to be patched once the label resolves.
    fn emit_jump(&mut self, instr: Instruction, label: LabelId) {
        let idx = self.code.len();
        self.code.push(instr);
        self.labels[label.0 as usize].references.push(idx);
    }

    fn emit(&mut self, instr: Instruction) {
        self.code.push(instr);
    }

    fn finish(mut self) -> Result<BcProgram, CodegenError> {
        for (label_idx, label) in self.labels.iter().enumerate() {
            let Some(addr) = label.resolved else {
                if label.references.is_empty() {
                    continue;
                }
                return Err(CodegenError::new("unresolved label at fix-up", None));
            };
            let nlocals = self.function_nlocals.get(&LabelId(label_idx as u32)).copied();
            for &idx in &label.references {
                patch_target(&mut self.code[idx], addr, nlocals);
            }
        }
        Ok(BcProgram::new(self.constants, self.code, self.next_global))
    }

    // ---- constants ----

    fn const_index(&mut self, value: ConstValue) -> u32 {
        if let Some(&idx) = self.const_cache.get(&value) {
            return idx;
        }
        let idx = self.constants.len() as u32;
        self.constants.push(value.clone());
        self.const_cache.insert(value, idx);
        idx
    }

    // ---- symbol resolution ----

    fn declare_global(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.globals.get(name) {
            return idx;
        }
        let idx = self.next_global;
        self.next_global += 1;
        self.globals.insert(name.to_owned(), idx);
        idx
    }

    fn declare_local(&mut self, name: &str) -> u32 {
        let func = self.current_function.as_mut().expect("declare_local outside a function");
        let idx = func.next_local;
        func.next_local += 1;
        func.blocks.last_mut().expect("no open block scope").insert(name.to_owned(), idx);
        idx
    }

    fn resolve(&self, name: &str) -> Option<Slot> {
        if let Some(func) = &self.current_function {
            for block in func.blocks.iter().rev() {
                if let Some(&idx) = block.get(name) {
                    return Some(Slot::Local(idx));
                }
            }
        }
        self.globals.get(name).map(|&idx| Slot::Global(idx))
    }

    fn emit_load(&mut self, slot: Slot) {
        match slot {
            Slot::Global(g) => self.emit(Instruction::LoadGlobal(g)),
            Slot::Local(l) => self.emit(Instruction::LoadLocal(l)),
        }
    }

    fn emit_store(&mut self, slot: Slot) {
        match slot {
            Slot::Global(g) => self.emit(Instruction::StoreGlobal(g)),
            Slot::Local(l) => self.emit(Instruction::StoreLocal(l)),
        }
    }

    // ---- declarations ----

    fn compile_var_decl(&mut self, decl: &VarDecl) {
        let ty = decl.declared_type.resolve();
        let slot = if self.current_function.is_some() {
            Slot::Local(self.declare_local(&decl.name))
        } else {
            Slot::Global(self.declare_global(&decl.name))
        };
        self.emit(Instruction::PushDefault(ty));
        self.emit_store(slot);
    }

    fn compile_top_level(&mut self, block: &Block) {
        for decl in &block.var_decls {
            self.compile_var_decl(decl);
        }
        for stmt in &block.statements {
            self.compile_stmt(stmt);
        }
    }

    fn compile_func_decl(&mut self, func: &FuncDecl) {
        let label = self.function_labels[&func.name];
        self.mark_label(label);

        let return_type = func.return_type.as_ref().map(crate::ast::TypeNode::resolve);
        self.current_function = Some(FunctionScope {
            blocks: vec![AHashMap::new()],
            next_local: 0,
            return_type: return_type.clone(),
        });

        for param in &func.params {
            self.declare_local(&param.name);
        }
        for decl in &func.block.var_decls {
            self.compile_var_decl(decl);
        }
        for stmt in &func.block.statements {
            self.compile_stmt(stmt);
        }

        // Implicit trailing return (`spec.md` §4.4): every function path
        // must leave exactly one value on the stack before `Return`, the
        // same convention `print` uses for its placeholder 0 so `CallStmt`'s
        // unconditional `Pop` always has something to discard. A procedure
        // gets a placeholder 0 here, matching every explicit value-less
        // `Return` compiled by `compile_stmt` below.
        //
        // A value-returning function also gets a trailing fallback: the
        // analyzer's `block_has_return` check (`analyzer.rs`) only proves a
        // `Return` is reachable along *some* path (e.g. inside an `if` with
        // no `else`), not that every path hits one. Without this, a program
        // that analyzes clean but falls off the end of such a function would
        // run straight into the next function's bytecode. The pushed value
        // is never observed on any path the analyzer already accepted.
        match &return_type {
            None => {
                self.emit(Instruction::PushInt(0));
                self.emit(Instruction::Return);
            }
            Some(ty) => {
                self.emit(Instruction::PushDefault(ty.clone()));
                self.emit(Instruction::Return);
            }
        }

        let nlocals = self.current_function.take().expect("still inside compile_func_decl").next_local;
        self.function_nlocals.insert(label, u16::try_from(nlocals).unwrap_or(u16::MAX));
    }

    // ---- statements ----

    fn compile_stmt(&mut self, stmt: &Stmt) {
        let pos = stmt.meta.pos;
        match &stmt.kind {
            StmtKind::Assign { target, value } => self.compile_assign(target, value, pos),
            StmtKind::If { cond, then_stmts, else_stmts } => {
                self.compile_if(cond, then_stmts, else_stmts.as_deref());
            }
            StmtKind::For { var_name, start, end, step, body } => {
                self.compile_for(var_name, start, end, step.as_ref(), body, pos);
            }
            StmtKind::While { cond, body } => self.compile_while(cond, body),
            StmtKind::DoUntil { body, cond } => self.compile_do_until(body, cond),
            StmtKind::Break => self.compile_break(pos),
            StmtKind::Continue => self.compile_continue(pos),
            StmtKind::Return { value } => self.compile_return(value.as_ref(), pos),
            StmtKind::CallStmt { call } => {
                self.compile_expr(call);
                self.emit(Instruction::Pop);
            }
        }
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr, pos: Option<Position>) {
        match &target.kind {
            ExprKind::Identifier(name) => {
                self.compile_expr(value);
                match self.resolve(name) {
                    Some(slot) => self.emit_store(slot),
                    None => self.error(format!("undefined identifier '{name}'"), pos),
                }
            }
            ExprKind::ArrayAccess { array, index } => {
                // RHS, then array, then index (`spec.md` §4.4); the VM pops
                // the matching reverse order (`SPEC_FULL.md` §9a.4).
                self.compile_expr(value);
                self.compile_expr(array);
                self.compile_expr(index);
                self.emit(Instruction::StoreArray);
            }
            _ => self.error("invalid assignment target", pos),
        }
    }

    fn compile_if(&mut self, cond: &Expr, then_stmts: &[Stmt], else_stmts: Option<&[Stmt]>) {
        self.compile_expr(cond);
        let else_label = self.new_label();
        let end_label = self.new_label();
        self.emit_jump(Instruction::JmpIfFalse(0), else_label);
        for s in then_stmts {
            self.compile_stmt(s);
        }
        self.emit_jump(Instruction::Jmp(0), end_label);
        self.mark_label(else_label);
        if let Some(else_body) = else_stmts {
            for s in else_body {
                self.compile_stmt(s);
            }
        }
        self.mark_label(end_label);
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Stmt]) {
        let start_label = self.new_label();
        let end_label = self.new_label();
        self.mark_label(start_label);
        self.compile_expr(cond);
        self.emit_jump(Instruction::JmpIfFalse(0), end_label);
        self.loop_stack.push(LoopLabels { break_label: end_label, continue_label: start_label });
        for s in body {
            self.compile_stmt(s);
        }
        self.loop_stack.pop();
        self.emit_jump(Instruction::Jmp(0), start_label);
        self.mark_label(end_label);
    }

    fn compile_do_until(&mut self, body: &[Stmt], cond: &Expr) {
        let start_label = self.new_label();
        let continue_label = self.new_label();
        let end_label = self.new_label();
        self.mark_label(start_label);
        self.loop_stack.push(LoopLabels { break_label: end_label, continue_label });
        for s in body {
            self.compile_stmt(s);
        }
        self.loop_stack.pop();
        self.mark_label(continue_label);
        self.compile_expr(cond);
        self.emit_jump(Instruction::JmpIfFalse(0), start_label);
        self.mark_label(end_label);
    }

    /// Direction-aware lowering (`SPEC_FULL.md` §9a.1, resolving `spec.md`
    /// §9 open question 1): `end` and `step` are each evaluated exactly
    /// once into hidden slots, and the loop test branches at runtime on the
    /// sign of `step` between `var <= end` and `var >= end`, matching the
    /// interpreter's per-iteration direction check exactly.
    fn compile_for(
        &mut self,
        var_name: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
        pos: Option<Position>,
    ) {
        let Some(var_slot) = self.resolve(var_name) else {
            self.error(format!("undefined identifier '{var_name}'"), pos);
            return;
        };
        let end_slot = self.new_hidden_slot();
        let step_slot = self.new_hidden_slot();

        self.compile_expr(start);
        self.emit_store(var_slot);
        self.compile_expr(end);
        self.emit_store(end_slot);
        match step {
            Some(expr) => self.compile_expr(expr),
            None => self.emit(Instruction::PushInt(1)),
        }
        self.emit_store(step_slot);

        let start_label = self.new_label();
        let negative_branch = self.new_label();
        let test_done = self.new_label();
        let continue_label = self.new_label();
        let end_label = self.new_label();

        self.mark_label(start_label);
        self.emit_load(step_slot);
        self.emit(Instruction::PushInt(0));
        self.emit(Instruction::Ge);
        self.emit_jump(Instruction::JmpIfFalse(0), negative_branch);
        self.emit_load(var_slot);
        self.emit_load(end_slot);
        self.emit(Instruction::Le);
        self.emit_jump(Instruction::Jmp(0), test_done);
        self.mark_label(negative_branch);
        self.emit_load(var_slot);
        self.emit_load(end_slot);
        self.emit(Instruction::Ge);
        self.mark_label(test_done);
        self.emit_jump(Instruction::JmpIfFalse(0), end_label);

        self.loop_stack.push(LoopLabels { break_label: end_label, continue_label });
        for s in body {
            self.compile_stmt(s);
        }
        self.loop_stack.pop();

        self.mark_label(continue_label);
        self.emit_load(var_slot);
        self.emit_load(step_slot);
        self.emit(Instruction::Add);
        self.emit_store(var_slot);
        self.emit_jump(Instruction::Jmp(0), start_label);
        self.mark_label(end_label);
    }

    /// Allocates a slot for a `for`-loop's evaluated-once `end`/`step`,
    /// invisible to source-level name resolution.
    fn new_hidden_slot(&mut self) -> Slot {
        if self.current_function.is_some() {
            let func = self.current_function.as_mut().unwrap();
            let idx = func.next_local;
            func.next_local += 1;
            Slot::Local(idx)
        } else {
            Slot::Global(self.declare_global(&format!("$hidden{}", self.next_global)))
        }
    }

    fn compile_break(&mut self, pos: Option<Position>) {
        match self.loop_stack.last().copied() {
            Some(labels) => self.emit_jump(Instruction::Jmp(0), labels.break_label),
            None => self.error("'прервать' (break) outside a loop", pos),
        }
    }

    fn compile_continue(&mut self, pos: Option<Position>) {
        match self.loop_stack.last().copied() {
            Some(labels) => self.emit_jump(Instruction::Jmp(0), labels.continue_label),
            None => self.error("'продолжить' (continue) outside a loop", pos),
        }
    }

    fn compile_return(&mut self, value: Option<&Expr>, pos: Option<Position>) {
        match value {
            Some(expr) => self.compile_expr(expr),
            None => {
                if self.current_function.as_ref().and_then(|f| f.return_type.as_ref()).is_some() {
                    self.error("function must return a value", pos);
                }
                self.emit(Instruction::PushInt(0));
            }
        }
        self.emit(Instruction::Return);
    }

    // ---- expressions ----

    fn compile_expr(&mut self, expr: &Expr) {
        let pos = expr.meta.pos;
        match &expr.kind {
            ExprKind::Int(v) => self.emit(Instruction::PushInt(*v)),
            ExprKind::Bool(v) => self.emit(Instruction::PushBool(*v)),
            ExprKind::Char(v) => self.emit(Instruction::PushChar(*v)),
            ExprKind::String(v) => {
                let idx = self.const_index(ConstValue::Str(v.clone()));
                self.emit(Instruction::PushConst(idx));
            }
            ExprKind::Identifier(name) => match self.resolve(name) {
                Some(slot) => self.emit_load(slot),
                None => self.error(format!("undefined identifier '{name}'"), pos),
            },
            ExprKind::ArrayAccess { array, index } => {
                self.compile_expr(array);
                self.compile_expr(index);
                self.emit(Instruction::LoadArray);
            }
            ExprKind::UnaryOp { op, operand } => {
                self.compile_expr(operand);
                self.emit(match op {
                    UnaryOpKind::Plus => return, // `+x` lowers to nothing beyond `x` itself
                    UnaryOpKind::Minus => Instruction::Neg,
                    UnaryOpKind::Not => Instruction::Not,
                });
            }
            ExprKind::BinOp { op, left, right } => self.compile_bin_op(*op, left, right),
            ExprKind::Call { name, args } => self.compile_call(name, args, pos),
        }
    }

    fn compile_bin_op(&mut self, op: BinOpKind, left: &Expr, right: &Expr) {
        if let BinOpKind::Logic(logic) = op {
            // Short-circuit lowering (`spec.md` §4.4): evaluate the left
            // operand once, `Dup` it so the short-circuit path can reuse it
            // as the result, and only evaluate `right` when its value can
            // still change the outcome.
            self.compile_expr(left);
            self.emit(Instruction::Dup);
            let short = self.new_label();
            let end = self.new_label();
            match logic {
                LogicOp::And => self.emit_jump(Instruction::JmpIfFalse(0), short),
                LogicOp::Or => self.emit_jump(Instruction::JmpIfTrue(0), short),
            }
            self.emit(Instruction::Pop);
            self.compile_expr(right);
            self.emit_jump(Instruction::Jmp(0), end);
            self.mark_label(short);
            self.mark_label(end);
            return;
        }

        self.compile_expr(left);
        self.compile_expr(right);
        self.emit(match op {
            BinOpKind::Arith(ArithOp::Add) => Instruction::Add,
            BinOpKind::Arith(ArithOp::Sub) => Instruction::Sub,
            BinOpKind::Arith(ArithOp::Mul) => Instruction::Mul,
            BinOpKind::Arith(ArithOp::Div) => Instruction::Div,
            BinOpKind::Arith(ArithOp::IDiv) => Instruction::IDiv,
            BinOpKind::Arith(ArithOp::Mod) => Instruction::Mod,
            BinOpKind::Cmp(CmpOp::Eq) => Instruction::Eq,
            BinOpKind::Cmp(CmpOp::Ne) => Instruction::Ne,
            BinOpKind::Cmp(CmpOp::Lt) => Instruction::Lt,
            BinOpKind::Cmp(CmpOp::Le) => Instruction::Le,
            BinOpKind::Cmp(CmpOp::Gt) => Instruction::Gt,
            BinOpKind::Cmp(CmpOp::Ge) => Instruction::Ge,
            BinOpKind::Logic(_) => unreachable!("handled above via short-circuit lowering"),
        });
    }

    fn compile_call(&mut self, name: &str, args: &[Expr], pos: Option<Position>) {
        match name {
            "print" => {
                self.compile_expr(&args[0]);
                self.emit(Instruction::Print);
                self.emit(Instruction::PushInt(0));
            }
            "inc" | "dec" => self.compile_inc_dec(name, &args[0], pos),
            "abs" => {
                self.compile_expr(&args[0]);
                self.emit(Instruction::Abs);
            }
            "ord" => {
                self.compile_expr(&args[0]);
                self.emit(Instruction::Ord);
            }
            "chr" => {
                self.compile_expr(&args[0]);
                self.emit(Instruction::Chr);
            }
            "read" => self.compile_read(&args[0], pos),
            _ => self.compile_user_call(name, args, pos),
        }
    }

    fn compile_inc_dec(&mut self, name: &str, arg: &Expr, pos: Option<Position>) {
        let ExprKind::Identifier(var_name) = &arg.kind else {
            self.error(format!("'{name}' requires a variable argument"), pos);
            return;
        };
        match self.resolve(var_name) {
            Some(Slot::Global(g)) => {
                self.emit(if name == "inc" { Instruction::Inc(g) } else { Instruction::Dec(g) });
            }
            Some(Slot::Local(l)) => {
                self.emit(Instruction::LoadLocal(l));
                self.emit(Instruction::PushInt(1));
                self.emit(if name == "inc" { Instruction::Add } else { Instruction::Sub });
                self.emit(Instruction::StoreLocal(l));
            }
            None => self.error(format!("undefined identifier '{var_name}'"), pos),
        }
        self.emit(Instruction::PushInt(0));
    }

    fn compile_read(&mut self, arg: &Expr, pos: Option<Position>) {
        let ExprKind::Identifier(var_name) = &arg.kind else {
            self.error("'read' requires a variable argument", pos);
            return;
        };
        match self.resolve(var_name) {
            Some(Slot::Global(index)) => self.emit(Instruction::Read { index, is_local: false }),
            Some(Slot::Local(index)) => self.emit(Instruction::Read { index, is_local: true }),
            None => self.error(format!("undefined identifier '{var_name}'"), pos),
        }
        self.emit(Instruction::PushInt(0));
    }

    fn compile_user_call(&mut self, name: &str, args: &[Expr], pos: Option<Position>) {
        let Some(&label) = self.function_labels.get(name) else {
            self.error(format!("undefined function '{name}'"), pos);
            return;
        };
        for arg in args {
            self.compile_expr(arg);
        }
        let nparams = u8::try_from(args.len()).unwrap_or(u8::MAX);
        // `nlocals` is patched by the callee's own compilation having run
        // first: every function is compiled before top-level code, so by
        // the time any call site (including a forward-referencing one,
        // once `finish` patches the label) needs it, the callee's local
        // count is already fixed. We look it up lazily through a second
        // pass-friendly placeholder: the call descriptor's `nlocals` is
        // filled in at `finish` time alongside the jump address.
        self.emit_jump(Instruction::Call { addr: 0, nparams, nlocals: 0 }, label);
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn patch_target(instr: &mut Instruction, addr: u32, nlocals: Option<u16>) {
    match instr {
        Instruction::Jmp(t) | Instruction::JmpIfFalse(t) | Instruction::JmpIfTrue(t) => *t = addr,
        Instruction::Call { addr: a, nlocals: n, .. } => {
            *a = addr;
            *n = nlocals.expect("a Call's label must be a function label with a known nlocals");
        }
        other => unreachable!("instruction {other:?} does not reference a label"),
    }
}
