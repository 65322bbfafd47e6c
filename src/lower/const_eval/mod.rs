//! Folds constant expressions into literals.
//!
//! The pass runs over the whole module at once because an expression in one
//! file may read a `const` field or call a function declared in another. It
//! first takes a snapshot of every function and `const` field initializer
//! (the [`Environment`]), then walks every body top-down. An expression the
//! [`Checker`] accepts is handed to the [`Interpreter`]; on success it is
//! replaced by a literal and its subtree is not visited again. A failure is
//! reported according to the configured [`FailurePolicy`] and the
//! expression is kept unchanged.

mod checker;
mod interpreter;

use hashbrown::HashMap;
use tracing::{debug, trace};

pub use self::{
    checker::Checker,
    interpreter::{Interpreter, InterpreterError, apply_operator},
};
use super::{ModuleContext, ModuleLoweringPass, string_concatenation::merge_constant_segments};
use crate::{
    config::{ConstEvalConfig, FailurePolicy},
    diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity},
    error::PassError,
    intern::Name,
    ir::{
        Body, Call, Callee, ConstValue, Declaration, DeclarationKind, Expression, ExpressionKind,
        FileId, Function, Module, OperatorName, PrimitiveKind, Span, Symbol, Type,
        visit::{MutVisitor, all_declarations, walk_expression_mut},
    },
};

/// Snapshot of what the interpreter may look up by symbol.
#[derive(Debug, Default)]
pub struct Environment {
    functions: HashMap<Symbol, (Name, Function)>,
    const_fields: HashMap<Symbol, (Name, Body)>,
}

impl Environment {
    pub fn new(module: &Module) -> Self {
        let mut env = Self::default();

        for declaration in module.files.iter().flat_map(all_declarations) {
            match &declaration.kind {
                DeclarationKind::Function(function) if function.body.is_some() => {
                    env.functions
                        .insert(declaration.symbol, (declaration.name, function.clone()));
                }
                DeclarationKind::Field(field) if field.is_const => {
                    if let Some(initializer) = &field.initializer {
                        env.const_fields
                            .insert(declaration.symbol, (declaration.name, initializer.clone()));
                    }
                }
                _ => {}
            }
        }

        env
    }

    pub fn function(&self, symbol: Symbol) -> Option<(Name, &Function)> {
        self.functions
            .get(&symbol)
            .map(|(name, function)| (*name, function))
    }

    pub fn const_field(&self, symbol: Symbol) -> Option<(Name, &Body)> {
        self.const_fields
            .get(&symbol)
            .map(|(name, initializer)| (*name, initializer))
    }

    /// The primitive operator a call stands for: either a builtin callee or
    /// an operator named function of a primitive type declared outside the
    /// module.
    pub fn builtin_operator(&self, call: &Call) -> Option<(PrimitiveKind, OperatorName)> {
        let kind = call.receiver_type.as_ref().and_then(Type::as_primitive)?;

        let operator = match &call.callee {
            Callee::Builtin(operator) => *operator,
            Callee::Declared { symbol, name } if !self.functions.contains_key(symbol) => {
                name.value().parse().ok()?
            }
            Callee::Declared { .. } => return None,
        };

        Some((kind, operator))
    }
}

pub struct ConstEvaluationLowering;

impl ModuleLoweringPass for ConstEvaluationLowering {
    fn lower(&self, module: &mut Module, ctx: &ModuleContext<'_>) -> Result<(), PassError> {
        let config = &ctx.config.const_eval;
        let env = Environment::new(module);
        let mut cache = HashMap::new();
        let mut checker = Checker::new(&env, config.mode);

        for file in &mut module.files {
            let mut folder = Folder {
                env: &env,
                config,
                checker: &mut checker,
                cache: &mut cache,
                sink: ctx.sink,
                file: file.id,
                declaration: None,
                site: Site::Expression,
                folded: 0,
            };

            for declaration in &mut file.declarations {
                folder.declaration(declaration)?;
            }

            debug!(file = %file.path, folded = folder.folded, "folded constant expressions");
        }

        Ok(())
    }
}

/// Where the expression being folded sits, for the diagnostic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Expression,
    ConstValInitializer,
}

enum Outcome {
    NotCandidate,
    Folded,
    Failed,
}

struct Folder<'a, 'e> {
    env: &'e Environment,
    config: &'e ConstEvalConfig,
    checker: &'a mut Checker<'e>,
    cache: &'a mut HashMap<Symbol, ConstValue>,
    sink: &'a dyn DiagnosticSink,
    file: FileId,
    declaration: Option<Name>,
    site: Site,
    folded: usize,
}

impl Folder<'_, '_> {
    fn declaration(&mut self, declaration: &mut Declaration) -> Result<(), PassError> {
        let previous = self.declaration.replace(declaration.name);

        for annotation in &mut declaration.annotations {
            self.annotation_argument(annotation)?;
        }

        match &mut declaration.kind {
            DeclarationKind::Function(function) => {
                if let Some(body) = &mut function.body {
                    self.visit_block_mut(&mut body.block)?;
                }
            }
            DeclarationKind::Field(field) => {
                if let Some(initializer) = &mut field.initializer {
                    let site = if field.is_const {
                        Site::ConstValInitializer
                    } else {
                        Site::Expression
                    };
                    let previous = std::mem::replace(&mut self.site, site);
                    let result = self.visit_block_mut(&mut initializer.block);
                    self.site = previous;
                    result?;
                }
            }
            DeclarationKind::AnonymousInitializer(body) => self.visit_block_mut(&mut body.block)?,
            DeclarationKind::Class(class) => {
                for member in &mut class.declarations {
                    self.declaration(member)?;
                }
            }
            DeclarationKind::Property(property) => {
                for member in [&mut property.backing_field, &mut property.getter, &mut property.setter]
                    .into_iter()
                    .flatten()
                {
                    self.declaration(member)?;
                }
            }
        }

        self.declaration = previous;
        Ok(())
    }

    /// Annotation arguments: nested annotations recursively, arrays element
    /// by element, anything else as an expression.
    fn annotation_argument(&mut self, argument: &mut Expression) -> Result<(), PassError> {
        match &mut argument.kind {
            ExpressionKind::AnnotationConstructor { arguments, .. }
            | ExpressionKind::ArrayLiteral(arguments) => {
                for argument in arguments {
                    self.annotation_argument(argument)?;
                }
                Ok(())
            }
            _ => self.visit_expression_mut(argument),
        }
    }

    fn try_fold(&mut self, expression: &mut Expression) -> Outcome {
        if !self.checker.is_candidate(expression) {
            return Outcome::NotCandidate;
        }

        let result = Interpreter::new(self.env, self.config, self.cache).evaluate(expression);

        match result {
            Ok(value) if value.ty() == expression.ty => {
                trace!(%value, "folded");
                *expression = Expression::constant(value, expression.span);
                self.folded += 1;
                Outcome::Folded
            }
            Ok(value) => {
                self.report(
                    Severity::Error,
                    DiagnosticKind::IllTypedConstResult,
                    expression.span,
                    format!(
                        "constant evaluation produced `{value}` of type {} for an expression of type {}",
                        value.ty(),
                        expression.ty
                    ),
                );
                Outcome::Failed
            }
            Err(error) => {
                self.failure(error, expression.span);
                Outcome::Failed
            }
        }
    }

    fn failure(&mut self, error: InterpreterError, span: Span) {
        if self.config.suppress_exceptions {
            trace!(%error, %span, "constant evaluation failure suppressed");
            return;
        }

        let (severity, kind) = match (self.config.failure_policy, self.site) {
            (FailurePolicy::Lenient, _) => {
                (Severity::Warning, DiagnosticKind::ExceptionInConstExpression)
            }
            (FailurePolicy::Strict, Site::Expression) => {
                (Severity::Error, DiagnosticKind::ExceptionInConstExpression)
            }
            (FailurePolicy::Strict, Site::ConstValInitializer) => {
                (Severity::Error, DiagnosticKind::ExceptionInConstValInitializer)
            }
        };

        self.report(severity, kind, span, error.to_string());
    }

    fn report(&self, severity: Severity, kind: DiagnosticKind, span: Span, message: String) {
        self.sink.report(Diagnostic {
            severity,
            kind,
            file: self.file,
            span,
            declaration: self.declaration,
            message,
        });
    }
}

impl MutVisitor for Folder<'_, '_> {
    fn visit_expression_mut(&mut self, expression: &mut Expression) -> Result<(), PassError> {
        match self.try_fold(expression) {
            Outcome::Folded | Outcome::Failed => return Ok(()),
            Outcome::NotCandidate => walk_expression_mut(self, expression)?,
        }

        // Templates with a non constant segment still get their constant
        // runs merged
        if let ExpressionKind::StringConcat(segments) = &mut expression.kind {
            *segments = merge_constant_segments(std::mem::take(segments));
        }

        Ok(())
    }
}
