//! End-to-end scenarios from `spec.md` §8 (S1-S8 plus the numbered
//! testable-property invariants), run through both back ends.
//!
//! There is no concrete-syntax parser in this workspace (`spec.md` §1), so
//! each scenario builds its `Program` directly with the public AST
//! constructors instead of parsing source text — the same stand-in the
//! CLI's debug-AST format uses. Every scenario asserts the interpreter and
//! the compile-and-run path (fold + codegen + peephole + VM) produce
//! byte-identical output (Testable Property 1 and 7).

use algolang::ast::{
    Block, Expr, ExprKind, FuncDecl, Param, Program, SimpleTypeName, Stmt, StmtKind, TypeNode,
    VarDecl,
};
use algolang::types::{ArithOp, BinOpKind, CmpOp, LogicOp, UnaryOpKind};
use algolang::{analyze_and_compile_and_run, analyze_and_interpret};
use pretty_assertions::assert_eq;

fn int_type() -> TypeNode {
    TypeNode::Simple { name: SimpleTypeName::Int }
}

fn bin(op: BinOpKind, left: Expr, right: Expr) -> Expr {
    Expr::new(ExprKind::BinOp { op, left: Box::new(left), right: Box::new(right) }, None)
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call { name: name.into(), args }, None)
}

fn print_stmt(arg: Expr) -> Stmt {
    Stmt::new(StmtKind::CallStmt { call: call("print", vec![arg]) }, None)
}

fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::new(StmtKind::Assign { target: Expr::ident(name), value }, None)
}

fn var(name: &str, ty: TypeNode) -> VarDecl {
    VarDecl { name: name.into(), declared_type: ty, pos: None }
}

fn program(var_decls: Vec<VarDecl>, func_decls: Vec<FuncDecl>, statements: Vec<Stmt>) -> Program {
    Program { name: "test".into(), block: Block { var_decls, func_decls, statements } }
}

/// Runs a program both ways and asserts they agree (Testable Property 1),
/// then asserts the folded compile-and-run path agrees too (Property 2/7).
fn run_both(program: Program) -> Vec<String> {
    let interpreted = analyze_and_interpret(program.clone()).expect("interpreter run failed");
    let compiled_unfolded =
        analyze_and_compile_and_run(program.clone(), false, false).expect("unfolded compile run failed");
    assert_eq!(interpreted, compiled_unfolded, "interpreter and VM disagree");
    let compiled_folded =
        analyze_and_compile_and_run(program, true, true).expect("folded+peephole compile run failed");
    assert_eq!(interpreted, compiled_folded, "folding/peephole changed observable output");
    interpreted
}

/// S1 — arithmetic and precedence.
#[test]
fn s1_arithmetic_and_precedence() {
    let p = program(
        vec![var("a", int_type())],
        vec![],
        vec![
            assign("a", bin(BinOpKind::Arith(ArithOp::Add), Expr::int(2), bin(BinOpKind::Arith(ArithOp::Mul), Expr::int(3), Expr::int(4)))),
            print_stmt(Expr::ident("a")),
            assign(
                "a",
                bin(
                    BinOpKind::Arith(ArithOp::Div),
                    bin(BinOpKind::Arith(ArithOp::Sub), Expr::int(10), Expr::int(4)),
                    Expr::int(2),
                ),
            ),
            print_stmt(Expr::ident("a")),
            assign("a", bin(BinOpKind::Arith(ArithOp::Mod), Expr::int(15), Expr::int(4))),
            print_stmt(Expr::ident("a")),
        ],
    );
    assert_eq!(run_both(p), vec!["14\n", "3\n", "3\n"]);
}

/// S2 — `true or <would-divide-by-zero>()` must short-circuit and never
/// call the procedure that would fault.
#[test]
fn s2_short_circuit_avoids_runtime_error() {
    // `or`'s right operand must type as `Boolean`, so `divz` is a function
    // (not a bare procedure) that divides by zero before it ever reaches
    // its `return` — calling it always faults, it just never gets called.
    let divz = FuncDecl {
        name: "divz".into(),
        params: vec![],
        return_type: Some(TypeNode::Simple { name: SimpleTypeName::Bool }),
        block: Block {
            var_decls: vec![var("t", int_type())],
            func_decls: vec![],
            statements: vec![
                assign("t", bin(BinOpKind::Arith(ArithOp::Div), Expr::int(1), Expr::int(0))),
                Stmt::new(StmtKind::Return { value: Some(Expr::boolean(true)) }, None),
            ],
        },
        pos: None,
    };
    let p = program(
        vec![var("a", TypeNode::Simple { name: SimpleTypeName::Bool })],
        vec![divz],
        vec![
            assign("a", bin(BinOpKind::Logic(LogicOp::Or), Expr::boolean(true), call("divz", vec![]))),
            print_stmt(Expr::ident("a")),
        ],
    );
    assert_eq!(run_both(p), vec!["истина\n"]);
}

/// S3 — `for i from 1 to 5 print(i) end`.
#[test]
fn s3_for_loop_sum() {
    let p = program(
        vec![var("i", int_type())],
        vec![],
        vec![Stmt::new(
            StmtKind::For {
                var_name: "i".into(),
                start: Expr::int(1),
                end: Expr::int(5),
                step: None,
                body: vec![print_stmt(Expr::ident("i"))],
            },
            None,
        )],
    );
    assert_eq!(run_both(p), vec!["1\n", "2\n", "3\n", "4\n", "5\n"]);
}

/// S4 — factorial via `while`.
#[test]
fn s4_factorial_via_while() {
    let p = program(
        vec![var("n", int_type()), var("r", int_type())],
        vec![],
        vec![
            assign("n", Expr::int(5)),
            assign("r", Expr::int(1)),
            Stmt::new(
                StmtKind::While {
                    cond: bin(BinOpKind::Cmp(CmpOp::Gt), Expr::ident("n"), Expr::int(0)),
                    body: vec![
                        assign("r", bin(BinOpKind::Arith(ArithOp::Mul), Expr::ident("r"), Expr::ident("n"))),
                        assign("n", bin(BinOpKind::Arith(ArithOp::Sub), Expr::ident("n"), Expr::int(1))),
                    ],
                },
                None,
            ),
            print_stmt(Expr::ident("r")),
        ],
    );
    assert_eq!(run_both(p), vec!["120\n"]);
}

/// S5 — array round-trip, 1-based indexing.
#[test]
fn s5_array_round_trip() {
    let array_ty = TypeNode::Array { size_expr: Box::new(Expr::int(3)), element_type: Box::new(int_type()) };
    let index = |e: Expr| Expr::new(ExprKind::ArrayAccess { array: Box::new(Expr::ident("arr")), index: Box::new(e) }, None);
    let store = |i: i64, v: i64| {
        Stmt::new(StmtKind::Assign { target: index(Expr::int(i)), value: Expr::int(v) }, None)
    };
    let p = program(
        vec![var("arr", array_ty), var("i", int_type())],
        vec![],
        vec![
            store(1, 10),
            store(2, 20),
            store(3, 30),
            Stmt::new(
                StmtKind::For {
                    var_name: "i".into(),
                    start: Expr::int(1),
                    end: Expr::int(3),
                    step: None,
                    body: vec![print_stmt(index(Expr::ident("i")))],
                },
                None,
            ),
        ],
    );
    assert_eq!(run_both(p), vec!["10\n", "20\n", "30\n"]);
}

/// S6 — user-defined function.
#[test]
fn s6_user_function() {
    let sum = FuncDecl {
        name: "sum".into(),
        params: vec![
            Param { name: "x".into(), declared_type: int_type(), pos: None },
            Param { name: "y".into(), declared_type: int_type(), pos: None },
        ],
        return_type: Some(int_type()),
        block: Block {
            var_decls: vec![var("t", int_type())],
            func_decls: vec![],
            statements: vec![
                assign("t", bin(BinOpKind::Arith(ArithOp::Add), Expr::ident("x"), Expr::ident("y"))),
                Stmt::new(StmtKind::Return { value: Some(Expr::ident("t")) }, None),
            ],
        },
        pos: None,
    };
    let p = program(vec![], vec![sum], vec![print_stmt(call("sum", vec![Expr::int(7), Expr::int(8)]))]);
    assert_eq!(run_both(p), vec!["15\n"]);
}

/// S8 — out-of-bounds array access halts with a runtime error and no
/// further output.
#[test]
fn s8_out_of_bounds_is_a_runtime_error() {
    let array_ty = TypeNode::Array { size_expr: Box::new(Expr::int(3)), element_type: Box::new(int_type()) };
    let index = |e: Expr| Expr::new(ExprKind::ArrayAccess { array: Box::new(Expr::ident("arr")), index: Box::new(e) }, None);
    let p = program(vec![var("arr", array_ty)], vec![], vec![print_stmt(index(Expr::int(0)))]);

    let interpreted = analyze_and_interpret(p.clone());
    assert!(interpreted.is_err());
    let compiled = analyze_and_compile_and_run(p, false, false);
    assert!(compiled.is_err());
}

/// Testable Property 8: `for v from s to e` with `s > e` and an implicit
/// step of 1 runs the body zero times.
#[test]
fn for_loop_with_start_greater_than_end_runs_zero_times() {
    let p = program(
        vec![var("i", int_type())],
        vec![],
        vec![Stmt::new(
            StmtKind::For {
                var_name: "i".into(),
                start: Expr::int(5),
                end: Expr::int(1),
                step: None,
                body: vec![print_stmt(Expr::ident("i"))],
            },
            None,
        )],
    );
    assert_eq!(run_both(p), Vec::<String>::new());
}

/// `SPEC_FULL.md` §9a.1: a negative-step `for` loop iterates in the
/// direction `spec.md` §4.1 describes (`while var >= end`), exercising the
/// open question's resolution rather than the teacher's original
/// unconditional `Le`.
#[test]
fn for_loop_with_negative_step_counts_down() {
    let p = program(
        vec![var("i", int_type())],
        vec![],
        vec![Stmt::new(
            StmtKind::For {
                var_name: "i".into(),
                start: Expr::int(3),
                end: Expr::int(1),
                step: Some(Expr::int(-1)),
                body: vec![print_stmt(Expr::ident("i"))],
            },
            None,
        )],
    );
    assert_eq!(run_both(p), vec!["3\n", "2\n", "1\n"]);
}

/// `break`/`continue` inside nested loops at the same depth (`spec.md` §9,
/// open questions 5/6: label ids must not collide between siblings).
#[test]
fn sibling_loops_at_the_same_depth_do_not_collide() {
    let p = program(
        vec![var("i", int_type())],
        vec![],
        vec![
            Stmt::new(
                StmtKind::For {
                    var_name: "i".into(),
                    start: Expr::int(1),
                    end: Expr::int(5),
                    step: None,
                    body: vec![
                        Stmt::new(
                            StmtKind::If {
                                cond: bin(BinOpKind::Cmp(CmpOp::Eq), Expr::ident("i"), Expr::int(3)),
                                then_stmts: vec![Stmt::new(StmtKind::Break, None)],
                                else_stmts: None,
                            },
                            None,
                        ),
                        print_stmt(Expr::ident("i")),
                    ],
                },
                None,
            ),
            Stmt::new(
                StmtKind::For {
                    var_name: "i".into(),
                    start: Expr::int(1),
                    end: Expr::int(5),
                    step: None,
                    body: vec![
                        Stmt::new(
                            StmtKind::If {
                                cond: bin(BinOpKind::Cmp(CmpOp::Eq), Expr::ident("i"), Expr::int(2)),
                                then_stmts: vec![Stmt::new(StmtKind::Continue, None)],
                                else_stmts: None,
                            },
                            None,
                        ),
                        print_stmt(Expr::ident("i")),
                    ],
                },
                None,
            ),
        ],
    );
    assert_eq!(run_both(p), vec!["1\n", "2\n", "1\n", "3\n", "4\n", "5\n"]);
}

/// `DoUntil` (source's `цикл … до cond`) runs until `cond` becomes true.
#[test]
fn do_until_runs_while_condition_is_false() {
    let p = program(
        vec![var("n", int_type())],
        vec![],
        vec![
            assign("n", Expr::int(0)),
            Stmt::new(
                StmtKind::DoUntil {
                    body: vec![
                        assign("n", bin(BinOpKind::Arith(ArithOp::Add), Expr::ident("n"), Expr::int(1))),
                        print_stmt(Expr::ident("n")),
                    ],
                    cond: bin(BinOpKind::Cmp(CmpOp::Ge), Expr::ident("n"), Expr::int(3)),
                },
                None,
            ),
        ],
    );
    assert_eq!(run_both(p), vec!["1\n", "2\n", "3\n"]);
}

/// Unary `not` and comparisons on `Char`.
#[test]
fn unary_not_and_char_comparison() {
    let p = program(
        vec![],
        vec![],
        vec![
            print_stmt(Expr::new(ExprKind::UnaryOp { op: UnaryOpKind::Not, operand: Box::new(Expr::boolean(false)) }, None)),
            print_stmt(bin(BinOpKind::Cmp(CmpOp::Lt), Expr::char('a'), Expr::char('b'))),
        ],
    );
    assert_eq!(run_both(p), vec!["истина\n", "истина\n"]);
}

/// Supplemental builtins recovered from `original_source/` (`SPEC_FULL.md`
/// §6a): `ord`/`chr` round-trip through a character's ordinal value.
#[test]
fn ord_and_chr_round_trip() {
    let p = program(
        vec![],
        vec![],
        vec![print_stmt(call("chr", vec![call("ord", vec![Expr::char('z')])]))],
    );
    assert_eq!(run_both(p), vec!["z\n"]);
}

/// `abs` on a negative literal.
#[test]
fn abs_builtin() {
    let p = program(vec![], vec![], vec![print_stmt(call("abs", vec![Expr::int(-7)]))]);
    assert_eq!(run_both(p), vec!["7\n"]);
}

/// Supplemental builtin `read` (SPEC_FULL.md §6a): reads integers from an
/// injected input source, exercising both back ends' `InputSource` plumbing
/// (`analyze_and_interpret`/`analyze_and_compile_and_run` hardcode no input,
/// so this test drives `Analyzer`/`Interpreter`/`CodeGenerator`/`Vm` directly).
#[test]
fn read_builtin_reads_lines_from_input_source() {
    use algolang::{Analyzer, CodeGenerator, Interpreter, Vm};

    let p = program(
        vec![var("a", int_type()), var("b", int_type())],
        vec![],
        vec![
            Stmt::new(StmtKind::CallStmt { call: call("read", vec![Expr::ident("a")]) }, None),
            Stmt::new(StmtKind::CallStmt { call: call("read", vec![Expr::ident("b")]) }, None),
            print_stmt(bin(BinOpKind::Arith(ArithOp::Add), Expr::ident("a"), Expr::ident("b"))),
        ],
    );

    let mut analyzed = p;
    let (errors, _) = Analyzer::new().analyze(&mut analyzed);
    assert!(errors.is_empty(), "{errors:?}");

    let mut interp_lines = vec!["4".to_string(), "5".to_string()].into_iter();
    let interpreted = Interpreter::new(Some(&mut interp_lines)).run(&analyzed).unwrap();
    assert_eq!(interpreted, vec!["9\n"]);

    let compiled = CodeGenerator::new().generate(&analyzed).unwrap();
    let mut vm_lines = vec!["4".to_string(), "5".to_string()].into_iter();
    let vm_out = Vm::new(&compiled, Some(&mut vm_lines)).run().unwrap();
    assert_eq!(vm_out, interpreted);
}

/// `read` reaching end-of-input is a runtime error, not a silent default.
#[test]
fn read_builtin_errors_at_end_of_input() {
    use algolang::{Analyzer, Interpreter};

    let p = program(
        vec![var("a", int_type())],
        vec![],
        vec![Stmt::new(StmtKind::CallStmt { call: call("read", vec![Expr::ident("a")]) }, None)],
    );
    let mut analyzed = p;
    let (errors, _) = Analyzer::new().analyze(&mut analyzed);
    assert!(errors.is_empty());

    let mut empty = Vec::<String>::new().into_iter();
    let result = Interpreter::new(Some(&mut empty)).run(&analyzed);
    assert!(result.is_err());
}

/// `inc`/`dec` on a global variable.
#[test]
fn inc_and_dec_builtins() {
    let p = program(
        vec![var("a", int_type())],
        vec![],
        vec![
            assign("a", Expr::int(10)),
            Stmt::new(StmtKind::CallStmt { call: call("inc", vec![Expr::ident("a")]) }, None),
            Stmt::new(StmtKind::CallStmt { call: call("dec", vec![Expr::ident("a")]) }, None),
            Stmt::new(StmtKind::CallStmt { call: call("dec", vec![Expr::ident("a")]) }, None),
            print_stmt(Expr::ident("a")),
        ],
    );
    assert_eq!(run_both(p), vec!["9\n"]);
}
