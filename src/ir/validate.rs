//! Structural IR validation run before and after lowering, and around phases
//! selected for validation.

use hashbrown::HashSet;

use super::{
    visit::{self, Visitor},
    Body, Declaration, DeclarationKind, Expression, ExpressionKind, File, Linkage, LocalId,
    LocalOrigin, LoopVariable, Module, Statement, Symbol, SymbolTable,
};
use crate::{index::IndexVec, intern::Name};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub file: String,
    pub declaration: Option<Name>,
    pub message: String,
}

impl ValidationFailure {
    pub fn location(&self) -> String {
        match self.declaration {
            Some(declaration) => format!("{} (in `{declaration}`)", self.file),
            None => self.file.clone(),
        }
    }
}

pub fn validate_module(module: &Module) -> Result<(), ValidationFailure> {
    for file in &module.files {
        validate_file(file, &module.symbols)?;
    }

    Ok(())
}

/// Checks that every symbol resolves, that declarations are linked to the
/// file containing them, that locals are declared before use and released at
/// most once, and that `break`/`continue` target an enclosing loop.
pub fn validate_file(file: &File, symbols: &SymbolTable) -> Result<(), ValidationFailure> {
    let mut validator = FileValidator {
        symbols,
        file,
        declaration: None,
        locals: None,
        declared: HashSet::new(),
        ended: HashSet::new(),
        loops: Vec::new(),
        error: None,
    };

    validator.visit_file(file);

    match validator.error {
        Some((declaration, message)) => Err(ValidationFailure {
            file: file.path.clone(),
            declaration,
            message,
        }),
        None => Ok(()),
    }
}

struct FileValidator<'a> {
    symbols: &'a SymbolTable,
    file: &'a File,
    declaration: Option<Name>,
    /// Names of the locals of the body being visited
    locals: Option<IndexVec<LocalId, Name>>,
    declared: HashSet<LocalId>,
    ended: HashSet<LocalId>,
    loops: Vec<Option<Name>>,
    /// First failure and the declaration it was found in
    error: Option<(Option<Name>, String)>,
}

impl<'a> FileValidator<'a> {
    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some((self.declaration, message));
        }
    }

    fn check_local(&mut self, local: LocalId, usage: &str) {
        let Some(locals) = &self.locals else {
            self.fail(format!("local {local} {usage} outside of a body"));
            return;
        };

        let message = if !locals.contains_index(local) {
            format!("local {local} {usage} does not exist")
        } else if !self.declared.contains(&local) {
            format!("local `{}` ({local}) {usage} before its declaration", locals[local])
        } else if self.ended.contains(&local) {
            format!("local `{}` ({local}) {usage} after the end of its scope", locals[local])
        } else {
            return;
        };

        self.fail(message);
    }

    fn check_loop_target(&mut self, label: &Option<Name>, keyword: &str) {
        let found = match label {
            Some(label) => self.loops.iter().any(|l| l.as_ref() == Some(label)),
            None => !self.loops.is_empty(),
        };

        if !found {
            match label {
                Some(label) => self.fail(format!("{keyword}@{label} has no matching loop")),
                None => self.fail(format!("{keyword} outside of a loop")),
            }
        }
    }
}

impl<'a> Visitor for FileValidator<'a> {
    fn visit_declaration(&mut self, declaration: &Declaration) {
        if self.error.is_some() {
            return;
        }

        let previous = self.declaration.replace(declaration.name);

        match self.symbols.resolve(declaration.symbol) {
            Ok(entry) => {
                if entry.linkage != Linkage::File(self.file.id) {
                    self.fail(format!(
                        "{} `{}` is declared in {} but its symbol is linked elsewhere",
                        declaration.kind.describe(),
                        declaration.name,
                        self.file.path
                    ));
                }
            }
            Err(err) => self.fail(format!("declaration symbol does not resolve: {err}")),
        }

        if let DeclarationKind::Function(function) = &declaration.kind {
            if let Some(body) = &function.body {
                if body.parameter_count() != function.parameters.len() {
                    self.fail(format!(
                        "function declares {} parameters but its body has {}",
                        function.parameters.len(),
                        body.parameter_count()
                    ));
                }
            }
        }

        visit::walk_declaration(self, declaration);

        self.declaration = previous;
    }

    fn visit_body(&mut self, body: &Body) {
        let names = body.locals.iter().map(|l| l.name).collect();
        let previous_locals = self.locals.replace(names);
        let previous_declared = std::mem::take(&mut self.declared);
        let previous_ended = std::mem::take(&mut self.ended);

        self.declared.extend(
            body.locals
                .enumerate()
                .filter(|(_, l)| l.origin == LocalOrigin::Parameter)
                .map(|(id, _)| id),
        );

        visit::walk_body(self, body);

        self.locals = previous_locals;
        self.declared = previous_declared;
        self.ended = previous_ended;
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Let { local, initializer } => {
                if let Some(initializer) = initializer {
                    self.visit_expression(initializer);
                }

                let name = match &self.locals {
                    Some(locals) if locals.contains_index(*local) => locals[*local],
                    _ => {
                        self.fail(format!("declaration of unknown local {local}"));
                        return;
                    }
                };

                if !self.declared.insert(*local) {
                    self.fail(format!("local `{name}` ({local}) is declared twice"));
                }
            }
            Statement::Expression(expression) => self.visit_expression(expression),
            Statement::EndScope(local) => {
                self.check_local(*local, "is released");
                self.ended.insert(*local);
            }
        }
    }

    fn visit_expression(&mut self, expression: &Expression) {
        if self.error.is_some() {
            return;
        }

        match &expression.kind {
            ExpressionKind::GetLocal(local) => self.check_local(*local, "is read"),
            ExpressionKind::SetLocal { local, value } => {
                self.visit_expression(value);
                self.check_local(*local, "is assigned");
            }
            ExpressionKind::While(lp) | ExpressionKind::DoWhile(lp) => {
                self.loops.push(lp.label);
                visit::walk_expression(self, expression);
                self.loops.pop();
            }
            ExpressionKind::For(for_loop) => {
                self.visit_expression(&for_loop.source);
                match &for_loop.variable {
                    LoopVariable::Single(local) => {
                        self.declared.insert(*local);
                    }
                    LoopVariable::Destructured(components) => {
                        for component in components.iter().flatten() {
                            self.declared.insert(component.local);
                            self.visit_symbol(component.function);
                        }
                    }
                }
                if let Some(protocol) = &for_loop.protocol {
                    for symbol in [protocol.iterator, protocol.has_next, protocol.next] {
                        self.visit_symbol(symbol);
                    }
                }

                self.loops.push(for_loop.label);
                self.visit_block(&for_loop.body);
                self.loops.pop();
            }
            ExpressionKind::Break(label) => self.check_loop_target(label, "break"),
            ExpressionKind::Continue(label) => self.check_loop_target(label, "continue"),
            _ => visit::walk_expression(self, expression),
        }
    }

    fn visit_symbol(&mut self, symbol: Symbol) {
        if let Err(err) = self.symbols.resolve(symbol) {
            self.fail(format!("reference does not resolve: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        builder::{self, BodyBuilder, ModuleBuilder},
        SymbolKind, Type,
    };

    #[test]
    fn well_formed_module_passes() {
        let mut builder = ModuleBuilder::new("main");
        let file = builder.add_file("Main.kt");
        let symbol = builder.declare(file, "answer", SymbolKind::Function);

        let mut body = BodyBuilder::new();
        let x = body.local("x", Type::INT, false);
        let declaration = body.function(
            symbol,
            "answer",
            Type::INT,
            vec![builder::let_local(x, builder::int(42)), Statement::EndScope(x)],
            None,
        );
        builder.push(file, declaration);

        assert_eq!(validate_module(&builder.finish()), Ok(()));
    }

    #[test]
    fn use_after_end_scope_is_rejected() {
        let mut builder = ModuleBuilder::new("main");
        let file = builder.add_file("Main.kt");
        let symbol = builder.declare(file, "broken", SymbolKind::Function);

        let mut body = BodyBuilder::new();
        let x = body.local("x", Type::INT, false);
        let declaration = body.function(
            symbol,
            "broken",
            Type::INT,
            vec![builder::let_local(x, builder::int(1)), Statement::EndScope(x)],
            Some(builder::get_local(x, Type::INT)),
        );
        builder.push(file, declaration);

        let failure = validate_module(&builder.finish()).unwrap_err();
        assert_eq!(failure.declaration, Some(Name::new("broken")));
        assert!(failure.message.contains("after the end of its scope"));
    }

    #[test]
    fn stale_symbols_are_rejected() {
        let mut builder = ModuleBuilder::new("main");
        let file = builder.add_file("Main.kt");
        let callee = builder.declare(file, "gone", SymbolKind::Function);
        let caller = builder.declare(file, "caller", SymbolKind::Function);

        let body = BodyBuilder::new();
        let declaration = body.function(
            caller,
            "caller",
            Type::INT,
            Vec::new(),
            Some(builder::call(callee, "gone", None, Vec::new(), Type::INT)),
        );
        builder.push(file, declaration);

        let mut module = builder.finish();
        module.symbols.unbind(callee).unwrap();

        let failure = validate_module(&module).unwrap_err();
        assert!(failure.message.contains("stale"), "{}", failure.message);
    }

    #[test]
    fn unlabeled_break_outside_loop_is_rejected() {
        let mut builder = ModuleBuilder::new("main");
        let file = builder.add_file("Main.kt");
        let symbol = builder.declare(file, "f", SymbolKind::Function);

        let body = BodyBuilder::new();
        let declaration = body.function(
            symbol,
            "f",
            Type::Unit,
            vec![Statement::Expression(Expression::new(
                ExpressionKind::Break(None),
                Type::Nothing,
                Default::default(),
            ))],
            None,
        );
        builder.push(file, declaration);

        let failure = validate_module(&builder.finish()).unwrap_err();
        assert_eq!(failure.message, "break outside of a loop");
    }
}
