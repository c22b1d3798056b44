//! Bytecode program persistence (`spec.md` §6).
//!
//! The teacher persists `Code` via `postcard`, a compact binary format
//! appropriate for its embedded/sandboxed use case. `spec.md` §6 requires a
//! *textual*, *self-describing* record instead, so this layer uses
//! `serde_json` — same `serde`-derive approach as the teacher, a different
//! concrete format chosen to satisfy the spec's textual requirement
//! (`SPEC_FULL.md` §6a; noted as a deliberate stack substitution in
//! `DESIGN.md`, not a silent drop).

use super::Program;

#[derive(Debug)]
pub struct PersistError(serde_json::Error);

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bytecode persistence error: {}", self.0)
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        Self(e)
    }
}

/// Serializes a `Program` to the self-describing textual record of
/// `spec.md` §6: top-level `constants`, `code`, `globals_count` fields.
///
/// # Errors
/// Returns `PersistError` if serialization fails (should not happen for a
/// well-formed `Program`; `serde_json` errors here indicate a bug).
pub fn to_json(program: &Program) -> Result<String, PersistError> {
    Ok(serde_json::to_string_pretty(program)?)
}

/// Deserializes a `Program` previously written by [`to_json`].
///
/// # Errors
/// Returns `PersistError` if `text` is not a valid serialized `Program`.
pub fn from_json(text: &str) -> Result<Program, PersistError> {
    Ok(serde_json::from_str(text)?)
}
