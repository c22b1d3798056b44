use std::env;
use std::fs;
use std::process::ExitCode;

use algolang::ast::Program;
use algolang::bytecode;
use algolang::{Analyzer, CodeGenerator, Interpreter};

const USAGE: &str = "\
algolang <subcommand> <file> [options]

Subcommands:
  ast <file>               parse a debug AST (JSON) and pretty-print it
  run <file>                analyze and tree-walk interpret a debug AST
  compile <file> [-o out]  analyze, fold, lower to bytecode, peephole-optimize,
                            then run it (or persist it to `out` with `-o`)
  exec <program.json>      load a persisted bytecode Program and run it on the VM

Since this workspace has no concrete-syntax parser (`spec.md` §1 treats the
lexer/parser as an external collaborator), `ast`/`run`/`compile` read a
small textual debug AST format instead of the source language's surface
syntax: a JSON document matching algolang::ast::Program's serde encoding.
This exercises the real analysis/interpretation/codegen pipeline end to
end without requiring the out-of-scope LALR grammar.";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(subcommand) = args.get(1) else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let result = match subcommand.as_str() {
        "ast" => args.get(2).map_or_else(|| Err(usage_error()), |path| cmd_ast(path)),
        "run" => args.get(2).map_or_else(|| Err(usage_error()), |path| cmd_run(path)),
        "compile" => args.get(2).map_or_else(|| Err(usage_error()), |path| cmd_compile(path, &args[3..])),
        "exec" => args.get(2).map_or_else(|| Err(usage_error()), |path| cmd_exec(path)),
        "-h" | "--help" | "help" => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        other => Err(format!("unknown subcommand '{other}'\n\n{USAGE}")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn usage_error() -> String {
    format!("missing <file> argument\n\n{USAGE}")
}

fn read_program(path: &str) -> Result<Program, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("error reading {path}: {err}"))?;
    serde_json::from_str(&text).map_err(|err| format!("error parsing debug AST in {path}: {err}"))
}

fn cmd_ast(path: &str) -> Result<(), String> {
    let program = read_program(path)?;
    let pretty = serde_json::to_string_pretty(&program).map_err(|err| format!("error printing AST: {err}"))?;
    println!("{pretty}");
    Ok(())
}

fn cmd_run(path: &str) -> Result<(), String> {
    let mut program = read_program(path)?;
    let (errors, _) = Analyzer::new().analyze(&mut program);
    if !errors.is_empty() {
        return Err(format_semantic_errors(&errors));
    }
    let output = Interpreter::new(None).run(&program).map_err(|e| e.to_string())?;
    print_output(&output);
    Ok(())
}

fn cmd_compile(path: &str, rest: &[String]) -> Result<(), String> {
    let out_path = parse_output_flag(rest)?;

    let mut program = read_program(path)?;
    let (errors, _) = Analyzer::new().analyze(&mut program);
    if !errors.is_empty() {
        return Err(format_semantic_errors(&errors));
    }
    algolang::fold_program(&mut program);
    let compiled = CodeGenerator::new().generate(&program).map_err(|e| e.to_string())?;
    let (compiled, _) = algolang::optimize_peephole(&compiled);

    if let Some(out_path) = out_path {
        let json = bytecode::persist::to_json(&compiled).map_err(|e| e.to_string())?;
        fs::write(&out_path, json).map_err(|err| format!("error writing {out_path}: {err}"))?;
        return Ok(());
    }

    let output = algolang::Vm::new(&compiled, None).run().map_err(|e| e.to_string())?;
    print_output(&output);
    Ok(())
}

fn cmd_exec(path: &str) -> Result<(), String> {
    let text = fs::read_to_string(path).map_err(|err| format!("error reading {path}: {err}"))?;
    let program = bytecode::persist::from_json(&text).map_err(|e| e.to_string())?;
    let output = algolang::Vm::new(&program, None).run().map_err(|e| e.to_string())?;
    print_output(&output);
    Ok(())
}

fn parse_output_flag(rest: &[String]) -> Result<Option<String>, String> {
    match rest {
        [] => Ok(None),
        [flag, path] if flag == "-o" => Ok(Some(path.clone())),
        _ => Err(format!("unrecognized options: {}\n\n{USAGE}", rest.join(" "))),
    }
}

fn format_semantic_errors(errors: &[algolang::errors::SemanticError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

fn print_output(lines: &[String]) {
    for line in lines {
        print!("{line}");
    }
}
