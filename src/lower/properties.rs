//! Replaces property declarations by their backing field and accessors.

use super::{FileContext, FileLoweringPass, for_each_container};
use crate::{
    error::PassError,
    ir::{Declaration, DeclarationKind, File, visit::all_declarations},
    phaser::Postcondition,
};

pub struct PropertiesLowering;

pub const NO_PROPERTIES: Postcondition = Postcondition::new("no properties remain", has_no_properties);

pub fn has_no_properties(file: &File) -> bool {
    all_declarations(file)
        .iter()
        .all(|d| !matches!(d.kind, DeclarationKind::Property(_)))
}

impl FileLoweringPass for PropertiesLowering {
    fn lower(&self, file: &mut File, ctx: &mut FileContext<'_>) -> Result<(), PassError> {
        for_each_container(&mut file.declarations, &mut |declarations| {
            hoist_properties(declarations, ctx);
            Ok(())
        })
    }
}

/// Splices the members of every property into the container at the position
/// of the property, keeping their relative order.
fn hoist_properties(declarations: &mut Vec<Declaration>, ctx: &mut FileContext<'_>) {
    if !declarations
        .iter()
        .any(|d| matches!(d.kind, DeclarationKind::Property(_)))
    {
        return;
    }

    let mut lowered = Vec::with_capacity(declarations.len());

    for declaration in declarations.drain(..) {
        let DeclarationKind::Property(property) = declaration.kind else {
            lowered.push(declaration);
            continue;
        };

        let members = [property.backing_field, property.getter, property.setter]
            .into_iter()
            .flatten()
            .map(|member| *member);

        for mut member in members {
            // Annotations on the property end up on every member
            member
                .annotations
                .extend(declaration.annotations.iter().cloned());
            lowered.push(member);
        }

        ctx.request_unbind(declaration.symbol);
    }

    *declarations = lowered;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::LoweringConfig,
        index::Index,
        ir::{
            Class, ClassKind, FileId, Property, SymbolKind, Type,
            builder::{self, BodyBuilder, ModuleBuilder},
        },
    };

    #[test]
    fn members_replace_the_property() {
        let mut builder = ModuleBuilder::new("main");
        let file = builder.add_file("Point.kt");
        let class = builder.declare(file, "Point", SymbolKind::Class);
        let property = builder.declare(file, "x", SymbolKind::Property);
        let field = builder.declare(file, "x", SymbolKind::Field);
        let getter = builder.declare(file, "getX", SymbolKind::Function);

        let mut getter_body = BodyBuilder::new();
        let this = getter_body.parameter("this", Type::Class("Point".into()));
        let getter_declaration = getter_body.function(
            getter,
            "getX",
            Type::INT,
            Vec::new(),
            Some(builder::get_local(this, Type::Class("Point".into()))),
        );

        let property_declaration = builder::declaration(
            property,
            "x",
            DeclarationKind::Property(Property {
                ty: Type::INT,
                backing_field: Some(Box::new(builder::field_with_value(
                    field,
                    "x",
                    builder::int(0),
                    false,
                ))),
                getter: Some(Box::new(getter_declaration)),
                setter: None,
            }),
        );

        builder.push(
            file,
            builder::declaration(
                class,
                "Point",
                DeclarationKind::Class(Class {
                    kind: ClassKind::Class,
                    declarations: vec![property_declaration],
                }),
            ),
        );

        let mut module = builder.finish();
        let config = LoweringConfig::default();
        let mut ctx = FileContext::new(FileId::new(0), &module.symbols, &config);
        let mut lowered = module.files[0].clone();

        PropertiesLowering.lower(&mut lowered, &mut ctx).unwrap();
        let (_, unbinds) = ctx.into_parts();

        assert!(has_no_properties(&lowered));
        assert_eq!(unbinds, vec![property]);

        let DeclarationKind::Class(class) = &lowered.declarations[0].kind else {
            panic!("expected a class");
        };
        let names = class
            .declarations
            .iter()
            .map(|d| d.name.value())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["x", "getX"]);

        module.files[0] = lowered;
        module.symbols.unbind(property).unwrap();
        assert_eq!(crate::ir::validate::validate_module(&module), Ok(()));
    }
}
