use std::path::PathBuf;

use thiserror::Error;

use crate::{
    intern::Name,
    ir::{SymbolError, Type},
};

/// Problems with the phase list or the phase selection. These are detected
/// before any file is lowered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("phase prerequisites form a cycle: {}", .0.join(" -> "))]
    PhaseCycle(Vec<&'static str>),
    #[error("phase `{phase}` requires `{prerequisite}` which does not run")]
    MissingPrerequisite {
        phase: &'static str,
        prerequisite: &'static str,
    },
    #[error("phase `{phase}` requires `{prerequisite}` to run before it")]
    PrerequisiteOutOfOrder {
        phase: &'static str,
        prerequisite: &'static str,
    },
    #[error("phase `{0}` is declared more than once")]
    DuplicatePhase(&'static str),
    #[error("unknown phase `{name}` in {option}")]
    UnknownPhase { name: String, option: &'static str },
    #[error("unknown phase list `{0}`")]
    UnknownPhaseList(String),
    #[error("rewrite rule for `{receiver}.{name}` is already registered in `{engine}`")]
    DuplicateRewriteRule {
        engine: &'static str,
        receiver: String,
        name: Name,
    },
    #[error("could not start the lowering thread pool: {0}")]
    ThreadPool(String),
}

/// Failure raised by a single lowering pass.
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error("rewrite of `{call}` changed the expression type from {expected} to {actual}")]
    TypeChanged {
        call: Name,
        expected: Type,
        actual: Type,
    },
    #[error("malformed IR: {0}")]
    Malformed(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("in {kind} `{declaration}`: {source}")]
    InDeclaration {
        kind: &'static str,
        declaration: Name,
        #[source]
        source: Box<PassError>,
    },
}

impl PassError {
    pub fn in_declaration(self, kind: &'static str, declaration: Name) -> Self {
        // Keep the innermost declaration only
        match self {
            PassError::InDeclaration { .. } => self,
            other => PassError::InDeclaration {
                kind,
                declaration,
                source: Box::new(other),
            },
        }
    }
}

/// Everything that can abort the lowering of a module.
#[derive(Debug, Error)]
pub enum LoweringError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(
        "postcondition `{condition}` introduced by phase `{introduced_by}` no longer holds after phase `{broken_by}` in {file}"
    )]
    InvariantViolation {
        condition: &'static str,
        introduced_by: &'static str,
        broken_by: &'static str,
        file: String,
    },
    #[error("IR validation failed {when} phase `{phase}` in {location}: {message}")]
    Validation {
        phase: &'static str,
        when: &'static str,
        location: String,
        message: String,
    },
    #[error("phase `{phase}` failed{}: {source}", .file.as_ref().map(|f| format!(" in {f}")).unwrap_or_default())]
    Pass {
        phase: &'static str,
        file: Option<String>,
        #[source]
        source: PassError,
    },
    #[error("could not write IR dump to {path}: {source}")]
    Dump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_context_keeps_innermost() {
        let error = PassError::Malformed("bad".into())
            .in_declaration("function", Name::new("inner"))
            .in_declaration("class", Name::new("Outer"));

        assert_eq!(error.to_string(), "in function `inner`: malformed IR: bad");
    }

    #[test]
    fn cycle_message_lists_path() {
        let error = ConfigurationError::PhaseCycle(vec!["A", "B", "A"]);
        assert_eq!(
            error.to_string(),
            "phase prerequisites form a cycle: A -> B -> A"
        );
    }
}
