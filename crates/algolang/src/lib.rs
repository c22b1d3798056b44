//! Typed AST, semantic analyzer, tree-walking interpreter, bytecode
//! compiler, peephole optimizer, and stack VM for a Pascal-like
//! "algorithmic language" with Russian-keyword surface syntax.
//!
//! The lexer/parser producing the concrete syntax is out of scope (it is a
//! standard LALR grammar external to this crate); this crate starts from
//! an already-built AST (`ast`), whose node shapes a parser would produce,
//! and carries it through analysis, execution, and optimization.

mod analyzer;
pub mod ast;
pub mod bytecode;
mod codegen;
pub mod errors;
mod folder;
pub mod interpreter;
mod peephole;
pub mod position;
pub mod scope;
pub mod types;
pub mod value;
mod vm;

pub use analyzer::{AnalysisOutcome, Analyzer};
pub use codegen::CodeGenerator;
pub use folder::{fold_program, FoldStats};
pub use interpreter::{Interpreter, InputSource, StatementOutcome};
pub use peephole::{optimize as optimize_peephole, PeepholeStats};
pub use vm::Vm;

use ast::Program;
use errors::AlgolangError;

/// Runs the full `analyze -> interpret` pipeline on an already-parsed
/// program and returns its captured `print` output.
///
/// # Errors
/// Returns `AlgolangError::Semantic` if analysis finds any diagnostics, or
/// `AlgolangError::Runtime` if the interpreter hits a runtime error.
pub fn analyze_and_interpret(mut program: Program) -> Result<Vec<String>, AlgolangError> {
    let (errors, _) = Analyzer::new().analyze(&mut program);
    if !errors.is_empty() {
        return Err(errors.into());
    }
    Interpreter::new(None)
        .run(&program)
        .map_err(AlgolangError::from)
}

/// Runs `analyze -> (optional fold) -> codegen -> (optional peephole) ->
/// run` and returns the VM's captured output, without persisting the
/// compiled program anywhere.
///
/// # Errors
/// Returns the first error encountered at whichever phase produced it.
pub fn analyze_and_compile_and_run(
    mut program: Program,
    fold: bool,
    peephole: bool,
) -> Result<Vec<String>, AlgolangError> {
    let (errors, _) = Analyzer::new().analyze(&mut program);
    if !errors.is_empty() {
        return Err(errors.into());
    }
    if fold {
        fold_program(&mut program);
    }
    let compiled = CodeGenerator::new().generate(&program)?;
    let compiled = if peephole { optimize_peephole(&compiled).0 } else { compiled };
    Vm::new(&compiled, None).run().map_err(AlgolangError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, ExprKind, SimpleTypeName, Stmt, StmtKind, TypeNode, VarDecl};

    fn program_with_print(value: crate::ast::Expr) -> Program {
        Program {
            name: "p".into(),
            block: Block {
                var_decls: vec![],
                func_decls: vec![],
                statements: vec![Stmt::new(
                    StmtKind::CallStmt {
                        call: crate::ast::Expr::new(
                            ExprKind::Call { name: "print".into(), args: vec![value] },
                            None,
                        ),
                    },
                    None,
                )],
            },
        }
    }

    #[test]
    fn interpreter_and_vm_agree_on_output() {
        let decl = VarDecl {
            name: "a".into(),
            declared_type: TypeNode::Simple { name: SimpleTypeName::Int },
            pos: None,
        };
        let assign = Stmt::new(
            StmtKind::Assign {
                target: crate::ast::Expr::ident("a"),
                value: crate::ast::Expr::new(
                    ExprKind::BinOp {
                        op: crate::types::BinOpKind::Arith(crate::types::ArithOp::Add),
                        left: Box::new(crate::ast::Expr::int(2)),
                        right: Box::new(crate::ast::Expr::new(
                            ExprKind::BinOp {
                                op: crate::types::BinOpKind::Arith(crate::types::ArithOp::Mul),
                                left: Box::new(crate::ast::Expr::int(3)),
                                right: Box::new(crate::ast::Expr::int(4)),
                            },
                            None,
                        )),
                    },
                    None,
                ),
            },
            None,
        );
        let print_stmt = Stmt::new(
            StmtKind::CallStmt {
                call: crate::ast::Expr::new(
                    ExprKind::Call { name: "print".into(), args: vec![crate::ast::Expr::ident("a")] },
                    None,
                ),
            },
            None,
        );
        let program = Program {
            name: "arith".into(),
            block: Block {
                var_decls: vec![decl],
                func_decls: vec![],
                statements: vec![assign, print_stmt],
            },
        };

        let interpreted = analyze_and_interpret(program.clone()).unwrap();
        assert_eq!(interpreted, vec!["14\n"]);

        let compiled = analyze_and_compile_and_run(program, false, false).unwrap();
        assert_eq!(compiled, interpreted);
    }

    #[test]
    fn semantic_errors_short_circuit_before_interpretation() {
        let program = program_with_print(crate::ast::Expr::ident("missing"));
        let result = analyze_and_interpret(program);
        assert!(matches!(result, Err(AlgolangError::Semantic(_))));
    }
}
