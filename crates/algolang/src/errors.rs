//! The four-kind diagnostic taxonomy (`spec.md` §7).
//!
//! Modeled on the teacher's `ParseError` (`examples/scostello-monty/src/parse_error.rs`):
//! one enum per phase, each carrying a message and an optional `Position`, with
//! a `Display` impl that prefixes the category and renders the position when present.

use std::fmt;

use crate::position::Position;

/// Syntactically invalid input. Surfaced by the external parser and passed
/// through unchanged; this crate never constructs one itself, but carries
/// the type so a host CLI can report it alongside the other three kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub pos: Option<Position>,
}

/// Produced during semantic analysis. The analyzer accumulates these and
/// keeps going rather than aborting on the first one (`spec.md` §4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticError {
    pub message: String,
    pub pos: Option<Position>,
}

/// Produced during bytecode lowering. The code generator aborts on the
/// first one (`spec.md` §7).
#[derive(Debug, Clone, PartialEq)]
pub struct CodegenError {
    pub message: String,
    pub pos: Option<Position>,
}

/// Produced during execution (interpreter or VM). Both abort on the first
/// one, releasing all scopes/frames in the process (`spec.md` §7).
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub pos: Option<Position>,
}

macro_rules! positioned_error {
    ($name:ident, $prefix:literal) => {
        impl $name {
            #[must_use]
            pub fn new(message: impl Into<String>, pos: Option<Position>) -> Self {
                Self {
                    message: message.into(),
                    pos,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.pos {
                    Some(pos) => write!(f, "{} at {}: {}", $prefix, pos, self.message),
                    None => write!(f, "{}: {}", $prefix, self.message),
                }
            }
        }

        impl std::error::Error for $name {}
    };
}

positioned_error!(ParseError, "ParseError");
positioned_error!(SemanticError, "SemanticError");
positioned_error!(CodegenError, "CodegenError");
positioned_error!(RuntimeError, "RuntimeError");

/// Top-level error composing all four kinds, the way the teacher's
/// `ParseError` gains `From<RunError>`/`From<InternalRunError>` impls to
/// unify phases behind one error type at the API boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgolangError {
    Parse(ParseError),
    Semantic(Vec<SemanticError>),
    Codegen(CodegenError),
    Runtime(RuntimeError),
}

impl fmt::Display for AlgolangError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgolangError::Parse(e) => write!(f, "{e}"),
            AlgolangError::Semantic(errors) => {
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{e}")?;
                }
                Ok(())
            }
            AlgolangError::Codegen(e) => write!(f, "{e}"),
            AlgolangError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AlgolangError {}

impl From<ParseError> for AlgolangError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<Vec<SemanticError>> for AlgolangError {
    fn from(e: Vec<SemanticError>) -> Self {
        Self::Semantic(e)
    }
}

impl From<CodegenError> for AlgolangError {
    fn from(e: CodegenError) -> Self {
        Self::Codegen(e)
    }
}

impl From<RuntimeError> for AlgolangError {
    fn from(e: RuntimeError) -> Self {
        Self::Runtime(e)
    }
}
