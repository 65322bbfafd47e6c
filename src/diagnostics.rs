//! User facing warnings and errors produced while lowering.

use std::sync::{Mutex, PoisonError};

use colored::Colorize;
use strum::{Display, EnumString};

use crate::{
    intern::Name,
    ir::{FileId, Span},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticKind {
    ExceptionInConstExpression,
    ExceptionInConstValInitializer,
    IllTypedConstResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub file: FileId,
    pub span: Span,
    /// Innermost declaration containing the reported element
    pub declaration: Option<Name>,
    pub message: String,
}

impl Diagnostic {
    /// Renders the diagnostic the way it is printed on the terminal
    pub fn render(&self, path: &str) -> String {
        let severity = match self.severity {
            Severity::Warning => "warning".yellow().bold(),
            Severity::Error => "error".red().bold(),
        };

        let location = match self.declaration {
            Some(declaration) => format!("{path}:{} (in `{declaration}`)", self.span),
            None => format!("{path}:{}", self.span),
        };

        format!(
            "{severity}{} {}\n  {} {}",
            format!("[{}]:", self.kind).bold(),
            self.message,
            "-->".blue(),
            location
        )
    }
}

/// Receives diagnostics while the phases run. Implementations must be usable
/// from the worker threads lowering files in parallel.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Keeps every reported diagnostic in memory, in report order.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }
}

impl DiagnosticSink for DiagnosticCollector {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}
