//! Code fragments compiled on their own (an expression evaluated in a
//! debugger, for instance) may use private declarations of other files. The
//! generated code cannot access those directly, so such calls and field
//! accesses go through reflection.

use super::{BodyLoweringPass, FileContext};
use crate::{
    error::PassError,
    intern::Name,
    ir::{
        Body, Call, Callee, Expression, ExpressionKind, FileId, IntrinsicOp, Linkage, Symbol,
        SymbolTable, Visibility,
        visit::{MutVisitor, walk_expression_mut},
    },
};

pub struct ReflectiveAccessLowering;

impl BodyLoweringPass for ReflectiveAccessLowering {
    fn lower_body(&self, body: &mut Body, ctx: &mut FileContext<'_>) -> Result<(), PassError> {
        ReflectiveAccess {
            file: ctx.file,
            symbols: ctx.symbols,
        }
        .visit_block_mut(&mut body.block)
    }
}

struct ReflectiveAccess<'a> {
    file: FileId,
    symbols: &'a SymbolTable,
}

impl ReflectiveAccess<'_> {
    /// The name to access `symbol` by when it is not accessible from the
    /// current file
    fn inaccessible(&self, symbol: Symbol) -> Result<Option<Name>, PassError> {
        let entry = self.symbols.resolve(symbol)?;

        let accessible = entry.visibility != Visibility::Private || entry.linkage == Linkage::File(self.file);
        Ok((!accessible).then_some(entry.name))
    }
}

impl MutVisitor for ReflectiveAccess<'_> {
    fn visit_expression_mut(&mut self, expression: &mut Expression) -> Result<(), PassError> {
        walk_expression_mut(self, expression)?;

        let (op, operands) = match &mut expression.kind {
            ExpressionKind::Call(Call {
                callee: Callee::Declared { symbol, .. },
                receiver,
                arguments,
                ..
            }) => {
                let Some(name) = self.inaccessible(*symbol)? else {
                    return Ok(());
                };
                let operands = receiver
                    .take()
                    .map(|receiver| *receiver)
                    .into_iter()
                    .chain(std::mem::take(arguments))
                    .collect::<Vec<_>>();
                (IntrinsicOp::ReflectiveInvoke { name }, operands)
            }
            ExpressionKind::GetField { field, receiver } => {
                let Some(name) = self.inaccessible(*field)? else {
                    return Ok(());
                };
                let operands = receiver.take().map(|receiver| *receiver).into_iter().collect();
                (IntrinsicOp::ReflectiveGet { name }, operands)
            }
            ExpressionKind::SetField {
                field,
                receiver,
                value,
            } => {
                let Some(name) = self.inaccessible(*field)? else {
                    return Ok(());
                };
                let operands = receiver
                    .take()
                    .map(|receiver| *receiver)
                    .into_iter()
                    .chain([value.take()])
                    .collect();
                (IntrinsicOp::ReflectiveSet { name }, operands)
            }
            _ => return Ok(()),
        };

        expression.kind = ExpressionKind::Intrinsic {
            op,
            arguments: operands,
        };

        Ok(())
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
            Span, Statement, SymbolKind, Type,
            builder::{self, BodyBuilder, ModuleBuilder},
        },
    };

    #[test]
    fn private_members_of_other_files_are_accessed_reflectively() {
        let mut module = ModuleBuilder::new("fragment");
        let fragment = module.add_file("fragment.kt");
        let other = module.add_file("Secret.kt");
        let secret = module.declare_with_visibility(other, "secret", SymbolKind::Function, Visibility::Private);
        let hidden = module.external("hidden", SymbolKind::Field, Visibility::Private);
        let local = module.declare_with_visibility(fragment, "local", SymbolKind::Function, Visibility::Private);
        let visible = module.declare(other, "visible", SymbolKind::Function);
        let module = module.finish();

        let call = |symbol, name| builder::call(symbol, name, None, vec![builder::int(1)], Type::INT);
        let mut body = BodyBuilder::new().finish(
            vec![
                Statement::Expression(call(secret, "secret")),
                Statement::Expression(call(local, "local")),
                Statement::Expression(call(visible, "visible")),
            ],
            Some(Expression::new(
                ExpressionKind::GetField {
                    field: hidden,
                    receiver: None,
                },
                Type::INT,
                Span::DUMMY,
            )),
        );

        let config = LoweringConfig::default();
        let mut ctx = FileContext::new(FileId::new(0), &module.symbols, &config);
        ReflectiveAccessLowering.lower_body(&mut body, &mut ctx).unwrap();

        assert_eq!(
            body.block.statements[0],
            Statement::Expression(builder::intrinsic(
                IntrinsicOp::ReflectiveInvoke {
                    name: Name::new("secret")
                },
                vec![builder::int(1)],
                Type::INT,
            ))
        );
        assert_eq!(
            body.block.statements[1],
            Statement::Expression(call(local, "local"))
        );
        assert_eq!(
            body.block.statements[2],
            Statement::Expression(call(visible, "visible"))
        );
        assert_eq!(
            body.block.result.as_deref(),
            Some(&builder::intrinsic(
                IntrinsicOp::ReflectiveGet {
                    name: Name::new("hidden")
                },
                Vec::new(),
                Type::INT,
            ))
        );
    }
}
