//! Moves instance initialization code into the constructors.
//!
//! [`InitializersLowering`] prepends, in declaration order, an assignment for
//! every instance field with an initializer and the code of every anonymous
//! initializer to each constructor of the class. [`InitializersCleanup`]
//! then drops the anonymous initializers and the now duplicated instance
//! field initializers.

use hashbrown::HashMap;

use super::{FileContext, FileLoweringPass, for_each_container};
use crate::{
    error::PassError,
    intern::Name,
    ir::{
        Block, Body, Declaration, DeclarationKind, Expression, ExpressionKind, File, LocalId,
        LocalOrigin, Span, Statement, Symbol, Type,
        builder,
        visit::{MutVisitor, all_declarations},
    },
    phaser::Postcondition,
};

pub struct InitializersLowering;

pub struct InitializersCleanup;

pub const NO_ANONYMOUS_INITIALIZERS: Postcondition =
    Postcondition::new("no anonymous initializers remain", has_no_anonymous_initializers);

pub fn has_no_anonymous_initializers(file: &File) -> bool {
    all_declarations(file)
        .iter()
        .all(|d| !matches!(d.kind, DeclarationKind::AnonymousInitializer(_)))
}

impl FileLoweringPass for InitializersLowering {
    fn lower(&self, file: &mut File, _ctx: &mut FileContext<'_>) -> Result<(), PassError> {
        for_each_container(&mut file.declarations, &mut |declarations| {
            for declaration in declarations.iter_mut() {
                let DeclarationKind::Class(class) = &mut declaration.kind else {
                    continue;
                };

                lower_class(&mut class.declarations)
                    .map_err(|err| err.in_declaration("class", declaration.name))?;
            }
            Ok(())
        })
    }
}

fn is_instance_field_with_initializer(declaration: &Declaration) -> bool {
    matches!(
        &declaration.kind,
        DeclarationKind::Field(field)
            if !field.is_static && !field.is_const && field.initializer.is_some()
    )
}

fn lower_class(members: &mut [Declaration]) -> Result<(), PassError> {
    // Code run by every constructor before its own body, with the field it
    // initializes
    let prologue = members
        .iter()
        .filter_map(|member| match &member.kind {
            DeclarationKind::Field(field) if is_instance_field_with_initializer(member) => field
                .initializer
                .clone()
                .map(|body| (Some((member.symbol, member.name)), body)),
            DeclarationKind::AnonymousInitializer(body) => Some((None, body.clone())),
            _ => None,
        })
        .collect::<Vec<_>>();

    if prologue.is_empty() {
        return Ok(());
    }

    let mut constructors = members
        .iter_mut()
        .filter_map(|member| match &mut member.kind {
            DeclarationKind::Function(function) if function.is_constructor => {
                Some((member.name, function.body.as_mut()))
            }
            _ => None,
        })
        .peekable();

    if constructors.peek().is_none() {
        return Err(PassError::Malformed(
            "class has instance initializers but no constructor".into(),
        ));
    }

    for (name, body) in constructors {
        let body = body.ok_or_else(|| {
            PassError::Malformed(format!("constructor `{name}` of a class with initializers has no body"))
        })?;

        let mut statements = Vec::new();
        for (field, initializer) in &prologue {
            statements.extend(inline_initializer(body, initializer.clone(), *field)?);
        }

        statements.append(&mut body.block.statements);
        body.block.statements = statements;
    }

    Ok(())
}

/// Moves the locals of `initializer` into `constructor` and returns its code
/// as statements, assigning the value to `field` when there is one.
fn inline_initializer(
    constructor: &mut Body,
    mut initializer: Body,
    field: Option<(Symbol, Name)>,
) -> Result<Vec<Statement>, PassError> {
    if !constructor.locals.contains_index(LocalId::THIS) {
        return Err(PassError::Malformed("constructor without a receiver".into()));
    }
    let receiver_type = constructor.locals[LocalId::THIS].ty.clone();

    // The receiver of the initializer is the receiver of the constructor,
    // every other local gets a fresh slot
    let mut remap = LocalRemapper {
        mapping: HashMap::new(),
    };
    for (local, declaration) in initializer.locals.enumerate() {
        let target = match declaration.origin {
            LocalOrigin::Parameter => LocalId::THIS,
            _ => constructor.locals.push(declaration.clone()),
        };
        remap.mapping.insert(local, target);
    }
    remap.visit_block_mut(&mut initializer.block)?;

    let Block { mut statements, result } = initializer.block;

    match (field, result) {
        (Some((field, _)), Some(value)) => {
            let receiver = builder::get_local(LocalId::THIS, receiver_type);
            statements.push(Statement::Expression(Expression::new(
                ExpressionKind::SetField {
                    field,
                    receiver: Some(Box::new(receiver)),
                    value,
                },
                Type::Unit,
                Span::DUMMY,
            )));
        }
        (Some((_, name)), None) => {
            return Err(PassError::Malformed(format!(
                "initializer of field `{name}` has no value"
            )));
        }
        (None, Some(result)) => statements.push(Statement::Expression(*result)),
        (None, None) => {}
    }

    Ok(statements)
}

struct LocalRemapper {
    mapping: HashMap<LocalId, LocalId>,
}

impl MutVisitor for LocalRemapper {
    fn visit_local_mut(&mut self, local: &mut LocalId) {
        if let Some(target) = self.mapping.get(local) {
            *local = *target;
        }
    }
}

impl FileLoweringPass for InitializersCleanup {
    fn lower(&self, file: &mut File, ctx: &mut FileContext<'_>) -> Result<(), PassError> {
        for_each_container(&mut file.declarations, &mut |declarations| {
            let is_class_body = declarations.iter().any(|d| {
                matches!(&d.kind, DeclarationKind::Function(function) if function.is_constructor)
            });

            declarations.retain(|d| {
                let keep = !matches!(d.kind, DeclarationKind::AnonymousInitializer(_));
                if !keep {
                    ctx.request_unbind(d.symbol);
                }
                keep
            });

            if is_class_body {
                for declaration in declarations.iter_mut() {
                    if !is_instance_field_with_initializer(declaration) {
                        continue;
                    }
                    if let DeclarationKind::Field(field) = &mut declaration.kind {
                        field.initializer = None;
                    }
                }
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::LoweringConfig,
        index::Index,
        ir::{
            Class, ClassKind, Field, FileId, Module, SymbolKind,
            builder::{BodyBuilder, ModuleBuilder},
            validate::validate_module,
        },
    };

    fn point() -> Type {
        Type::Class("Point".into())
    }

    /// ```text
    /// class Point(x0: Int) {
    ///     var x = x0            // field initialized from the constructor
    ///     init { val twice = 2; x = twice }
    ///     val y = 1
    /// }
    /// ```
    /// The field initializer of `x` is expressed through a local to check
    /// that locals get remapped.
    fn module() -> (Module, Symbol) {
        let mut builder = ModuleBuilder::new("main");
        let file = builder.add_file("Point.kt");
        let class = builder.declare(file, "Point", SymbolKind::Class);
        let constructor = builder.declare(file, "<init>", SymbolKind::Function);
        let x = builder.declare(file, "x", SymbolKind::Field);
        let init = builder.declare(file, "<anonymous-init>", SymbolKind::Function);
        let y = builder.declare(file, "y", SymbolKind::Field);

        let mut constructor_body = BodyBuilder::new();
        constructor_body.parameter("this", point());
        constructor_body.parameter("x0", Type::INT);
        let mut constructor_declaration = constructor_body.function(
            constructor,
            "<init>",
            Type::Unit,
            vec![Statement::Expression(builder::int(0))],
            None,
        );
        if let DeclarationKind::Function(function) = &mut constructor_declaration.kind {
            function.is_constructor = true;
            function.has_dispatch_receiver = true;
        }

        let mut x_body = BodyBuilder::new();
        x_body.parameter("this", point());
        let value = x_body.local("value", Type::INT, false);
        let x_initializer = x_body.finish(
            vec![builder::let_local(value, builder::int(7))],
            Some(builder::get_local(value, Type::INT)),
        );
        let x_declaration = builder::declaration(
            x,
            "x",
            DeclarationKind::Field(Field {
                ty: Type::INT,
                initializer: Some(x_initializer),
                is_const: false,
                is_static: false,
                is_mutable: true,
            }),
        );

        let mut init_body = BodyBuilder::new();
        let this = init_body.parameter("this", point());
        let twice = init_body.local("twice", Type::INT, false);
        let assignment = Expression::new(
            ExpressionKind::SetField {
                field: x,
                receiver: Some(Box::new(builder::get_local(this, point()))),
                value: Box::new(builder::get_local(twice, Type::INT)),
            },
            Type::Unit,
            Span::DUMMY,
        );
        let init_declaration = builder::declaration(
            init,
            "<anonymous-init>",
            DeclarationKind::AnonymousInitializer(init_body.finish(
                vec![builder::let_local(twice, builder::int(2)), Statement::Expression(assignment)],
                None,
            )),
        );

        let mut y_declaration = builder::field_with_value(y, "y", builder::int(1), false);
        if let DeclarationKind::Field(field) = &mut y_declaration.kind {
            field.is_static = false;
        }

        builder.push(
            file,
            builder::declaration(
                class,
                "Point",
                DeclarationKind::Class(Class {
                    kind: ClassKind::Class,
                    declarations: vec![constructor_declaration, x_declaration, init_declaration, y_declaration],
                }),
            ),
        );

        (builder.finish(), init)
    }

    fn class_members(file: &File) -> &[Declaration] {
        match &file.declarations[0].kind {
            DeclarationKind::Class(class) => &class.declarations,
            _ => panic!("expected a class"),
        }
    }

    #[test]
    fn constructors_run_initializers_in_declaration_order() {
        let (mut module, init) = module();
        let config = LoweringConfig::default();
        let mut lowered = module.files[0].clone();

        let mut ctx = FileContext::new(FileId::new(0), &module.symbols, &config);
        InitializersLowering.lower(&mut lowered, &mut ctx).unwrap();
        InitializersCleanup.lower(&mut lowered, &mut ctx).unwrap();
        let (_, unbinds) = ctx.into_parts();

        assert!(has_no_anonymous_initializers(&lowered));
        assert_eq!(unbinds, vec![init]);

        let members = class_members(&lowered);
        let DeclarationKind::Function(constructor) = &members[0].kind else {
            panic!("expected the constructor");
        };
        let body = constructor.body.as_ref().unwrap();

        // this, x0, value, twice
        let names = body.locals.iter().map(|l| l.name.value()).collect::<Vec<_>>();
        assert_eq!(names, vec!["this", "x0", "value", "twice"]);

        assert_eq!(body.block.statements.len(), 6);
        assert_eq!(body.block.statements[0], builder::let_local(LocalId::new(2), builder::int(7)));
        assert_eq!(body.block.statements[2], builder::let_local(LocalId::new(3), builder::int(2)));
        let Statement::Expression(Expression {
            kind: ExpressionKind::SetField { receiver: Some(receiver), .. },
            ..
        }) = &body.block.statements[3]
        else {
            panic!("expected the anonymous initializer assignment");
        };
        assert_eq!(**receiver, builder::get_local(LocalId::THIS, point()));
        assert_eq!(body.block.statements[5], Statement::Expression(builder::int(0)));

        // Instance field initializers are gone, the fields stay
        let DeclarationKind::Field(y) = &members[2].kind else {
            panic!("expected field y");
        };
        assert_eq!(y.initializer, None);

        module.files[0] = lowered;
        module.symbols.unbind(init).unwrap();
        assert_eq!(validate_module(&module), Ok(()));
    }

    #[test]
    fn initializers_without_constructor_are_malformed() {
        let (module, _) = module();
        let mut file = module.files[0].clone();
        if let DeclarationKind::Class(class) = &mut file.declarations[0].kind {
            class.declarations.remove(0);
        }

        let config = LoweringConfig::default();
        let mut ctx = FileContext::new(FileId::new(0), &module.symbols, &config);
        let error = InitializersLowering.lower(&mut file, &mut ctx).unwrap_err();

        assert!(error.to_string().contains("Point"), "{error}");
    }
}
