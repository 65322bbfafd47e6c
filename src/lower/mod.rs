//! Lowering passes and the contexts they run in.
//!
//! A pass works at one of three granularities. Module passes see the whole
//! module and run once. File passes see a single file and may run on worker
//! threads next to the passes for other files, so they only get shared access
//! to the symbol table and buffer everything else in their [`FileContext`].
//! Body passes are file passes applied to every body of the file through
//! [`ForEachBody`].

pub mod calls;
pub mod const_eval;
pub mod for_loops;
pub mod initializers;
pub mod properties;
pub mod reflective_access;
pub mod string_concatenation;

use crate::{
    config::LoweringConfig,
    diagnostics::{Diagnostic, DiagnosticSink},
    error::PassError,
    intern::Name,
    ir::{Body, Declaration, DeclarationKind, File, FileId, Module, Symbol, SymbolTable},
};

/// Everything a file pass may touch besides its own file.
pub struct FileContext<'a> {
    pub file: FileId,
    pub symbols: &'a SymbolTable,
    pub config: &'a LoweringConfig,
    /// Innermost declaration being lowered, maintained by [`ForEachBody`]
    pub declaration: Option<Name>,
    diagnostics: Vec<Diagnostic>,
    unbind_requests: Vec<Symbol>,
}

impl<'a> FileContext<'a> {
    pub fn new(file: FileId, symbols: &'a SymbolTable, config: &'a LoweringConfig) -> Self {
        Self {
            file,
            symbols,
            config,
            declaration: None,
            diagnostics: Vec::new(),
            unbind_requests: Vec::new(),
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Asks for `symbol` to be unbound once every file finished the current
    /// phase. The declaration behind it must already be gone from the file.
    pub fn request_unbind(&mut self, symbol: Symbol) {
        self.unbind_requests.push(symbol);
    }

    pub fn into_parts(self) -> (Vec<Diagnostic>, Vec<Symbol>) {
        (self.diagnostics, self.unbind_requests)
    }
}

pub struct ModuleContext<'a> {
    pub config: &'a LoweringConfig,
    pub sink: &'a dyn DiagnosticSink,
}

pub trait ModuleLoweringPass: Send + Sync {
    fn lower(&self, module: &mut Module, ctx: &ModuleContext<'_>) -> Result<(), PassError>;
}

pub trait FileLoweringPass: Send + Sync {
    fn lower(&self, file: &mut File, ctx: &mut FileContext<'_>) -> Result<(), PassError>;
}

pub trait BodyLoweringPass: Send + Sync {
    fn lower_body(&self, body: &mut Body, ctx: &mut FileContext<'_>) -> Result<(), PassError>;
}

/// Runs a body lowering over every body in a file: function bodies, field
/// initializers, anonymous initializers and property accessors, nested
/// classes included. Failures are tagged with the declaration they happened
/// in.
pub struct ForEachBody<P>(pub P);

impl<P: BodyLoweringPass> FileLoweringPass for ForEachBody<P> {
    fn lower(&self, file: &mut File, ctx: &mut FileContext<'_>) -> Result<(), PassError> {
        for declaration in &mut file.declarations {
            lower_declaration_bodies(&self.0, declaration, ctx)?;
        }

        Ok(())
    }
}

fn lower_declaration_bodies(
    pass: &impl BodyLoweringPass,
    declaration: &mut Declaration,
    ctx: &mut FileContext<'_>,
) -> Result<(), PassError> {
    let previous = ctx.declaration.replace(declaration.name);
    let kind = declaration.kind.describe();

    let result = match &mut declaration.kind {
        DeclarationKind::Function(function) => match &mut function.body {
            Some(body) => pass.lower_body(body, ctx),
            None => Ok(()),
        },
        DeclarationKind::Field(field) => match &mut field.initializer {
            Some(body) => pass.lower_body(body, ctx),
            None => Ok(()),
        },
        DeclarationKind::AnonymousInitializer(body) => pass.lower_body(body, ctx),
        DeclarationKind::Class(class) => class
            .declarations
            .iter_mut()
            .try_for_each(|member| lower_declaration_bodies(pass, member, ctx)),
        DeclarationKind::Property(property) => {
            [&mut property.backing_field, &mut property.getter, &mut property.setter]
                .into_iter()
                .flatten()
                .try_for_each(|member| lower_declaration_bodies(pass, member, ctx))
        }
    };

    ctx.declaration = previous;
    result.map_err(|err| err.in_declaration(kind, declaration.name))
}

/// Runs `f` on every declaration list of the file (the file itself and every
/// class body), innermost lists first.
pub fn for_each_container(
    declarations: &mut Vec<Declaration>,
    f: &mut impl FnMut(&mut Vec<Declaration>) -> Result<(), PassError>,
) -> Result<(), PassError> {
    for declaration in declarations.iter_mut() {
        if let DeclarationKind::Class(class) = &mut declaration.kind {
            for_each_container(&mut class.declarations, f)
                .map_err(|err| err.in_declaration("class", declaration.name))?;
        }
    }

    f(declarations)
}
