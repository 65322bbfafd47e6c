use super::{
    Block, Body, Call, Callee, Declaration, DeclarationKind, Expression, ExpressionKind, File,
    ForLoop, LocalId, LoopVariable, Statement, Symbol,
};
use crate::error::PassError;

/// Read only traversal of the IR. Every method defaults to walking the
/// children of the node.
pub trait Visitor: Sized {
    fn visit_file(&mut self, file: &File) {
        walk_file(self, file)
    }

    fn visit_declaration(&mut self, declaration: &Declaration) {
        walk_declaration(self, declaration)
    }

    fn visit_body(&mut self, body: &Body) {
        walk_body(self, body)
    }

    fn visit_block(&mut self, block: &Block) {
        walk_block(self, block)
    }

    fn visit_statement(&mut self, statement: &Statement) {
        walk_statement(self, statement)
    }

    fn visit_expression(&mut self, expression: &Expression) {
        walk_expression(self, expression)
    }

    fn visit_symbol(&mut self, _symbol: Symbol) {}

    fn visit_local(&mut self, _local: LocalId) {}
}

pub fn walk_file(visitor: &mut impl Visitor, file: &File) {
    for declaration in &file.declarations {
        visitor.visit_declaration(declaration);
    }
}

pub fn walk_declaration(visitor: &mut impl Visitor, declaration: &Declaration) {
    for annotation in &declaration.annotations {
        visitor.visit_expression(annotation);
    }

    match &declaration.kind {
        DeclarationKind::Function(function) => {
            if let Some(body) = &function.body {
                visitor.visit_body(body);
            }
        }
        DeclarationKind::Class(class) => {
            for member in &class.declarations {
                visitor.visit_declaration(member);
            }
        }
        DeclarationKind::Field(field) => {
            if let Some(initializer) = &field.initializer {
                visitor.visit_body(initializer);
            }
        }
        DeclarationKind::Property(property) => {
            for member in [&property.backing_field, &property.getter, &property.setter]
                .into_iter()
                .flatten()
            {
                visitor.visit_declaration(member);
            }
        }
        DeclarationKind::AnonymousInitializer(body) => visitor.visit_body(body),
    }
}

pub fn walk_body(visitor: &mut impl Visitor, body: &Body) {
    visitor.visit_block(&body.block);
}

pub fn walk_block(visitor: &mut impl Visitor, block: &Block) {
    for statement in &block.statements {
        visitor.visit_statement(statement);
    }

    if let Some(result) = &block.result {
        visitor.visit_expression(result);
    }
}

pub fn walk_statement(visitor: &mut impl Visitor, statement: &Statement) {
    match statement {
        Statement::Let { local, initializer } => {
            if let Some(initializer) = initializer {
                visitor.visit_expression(initializer);
            }
            visitor.visit_local(*local);
        }
        Statement::Expression(expression) => visitor.visit_expression(expression),
        Statement::EndScope(local) => visitor.visit_local(*local),
    }
}

pub fn walk_expression(visitor: &mut impl Visitor, expression: &Expression) {
    match &expression.kind {
        ExpressionKind::Const(_)
        | ExpressionKind::Break(_)
        | ExpressionKind::Continue(_) => {}
        ExpressionKind::GetLocal(local) => visitor.visit_local(*local),
        ExpressionKind::SetLocal { local, value } => {
            visitor.visit_expression(value);
            visitor.visit_local(*local);
        }
        ExpressionKind::GetField { field, receiver } => {
            if let Some(receiver) = receiver {
                visitor.visit_expression(receiver);
            }
            visitor.visit_symbol(*field);
        }
        ExpressionKind::SetField {
            field,
            receiver,
            value,
        } => {
            if let Some(receiver) = receiver {
                visitor.visit_expression(receiver);
            }
            visitor.visit_expression(value);
            visitor.visit_symbol(*field);
        }
        ExpressionKind::Call(call) => walk_call(visitor, call),
        ExpressionKind::Intrinsic { arguments, .. }
        | ExpressionKind::StringConcat(arguments)
        | ExpressionKind::ArrayLiteral(arguments) => {
            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
        ExpressionKind::AnnotationConstructor {
            annotation,
            arguments,
        } => {
            visitor.visit_symbol(*annotation);
            for argument in arguments {
                visitor.visit_expression(argument);
            }
        }
        ExpressionKind::Block(block) => visitor.visit_block(block),
        ExpressionKind::If {
            condition,
            then,
            otherwise,
        } => {
            visitor.visit_expression(condition);
            visitor.visit_expression(then);
            if let Some(otherwise) = otherwise {
                visitor.visit_expression(otherwise);
            }
        }
        ExpressionKind::While(lp) => {
            visitor.visit_expression(&lp.condition);
            visitor.visit_block(&lp.body);
        }
        ExpressionKind::DoWhile(lp) => {
            visitor.visit_block(&lp.body);
            visitor.visit_expression(&lp.condition);
        }
        ExpressionKind::For(for_loop) => walk_for_loop(visitor, for_loop),
        ExpressionKind::Range(range) => {
            visitor.visit_expression(&range.start);
            visitor.visit_expression(&range.end);
            if let Some(step) = &range.step {
                visitor.visit_expression(step);
            }
        }
        ExpressionKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expression(value);
            }
        }
    }
}

pub fn walk_call(visitor: &mut impl Visitor, call: &Call) {
    if let Some(receiver) = &call.receiver {
        visitor.visit_expression(receiver);
    }

    for argument in &call.arguments {
        visitor.visit_expression(argument);
    }

    if let Callee::Declared { symbol, .. } = &call.callee {
        visitor.visit_symbol(*symbol);
    }
}

pub fn walk_for_loop(visitor: &mut impl Visitor, for_loop: &ForLoop) {
    visitor.visit_expression(&for_loop.source);

    if let Some(protocol) = &for_loop.protocol {
        visitor.visit_symbol(protocol.iterator);
        visitor.visit_symbol(protocol.has_next);
        visitor.visit_symbol(protocol.next);
    }

    match &for_loop.variable {
        LoopVariable::Single(local) => visitor.visit_local(*local),
        LoopVariable::Destructured(components) => {
            for component in components.iter().flatten() {
                visitor.visit_local(component.local);
                visitor.visit_symbol(component.function);
            }
        }
    }

    visitor.visit_block(&for_loop.body);
}

/// In place, fallible traversal used by lowerings. Overriding
/// `visit_expression_mut` and calling `walk_expression_mut` first gives a
/// bottom-up rewrite, calling it last gives a top-down one.
pub trait MutVisitor: Sized {
    fn visit_block_mut(&mut self, block: &mut Block) -> Result<(), PassError> {
        walk_block_mut(self, block)
    }

    fn visit_statement_mut(&mut self, statement: &mut Statement) -> Result<(), PassError> {
        walk_statement_mut(self, statement)
    }

    fn visit_expression_mut(&mut self, expression: &mut Expression) -> Result<(), PassError> {
        walk_expression_mut(self, expression)
    }

    fn visit_local_mut(&mut self, _local: &mut LocalId) {}
}

pub fn walk_block_mut(visitor: &mut impl MutVisitor, block: &mut Block) -> Result<(), PassError> {
    for statement in &mut block.statements {
        visitor.visit_statement_mut(statement)?;
    }

    if let Some(result) = &mut block.result {
        visitor.visit_expression_mut(result)?;
    }

    Ok(())
}

pub fn walk_statement_mut(
    visitor: &mut impl MutVisitor,
    statement: &mut Statement,
) -> Result<(), PassError> {
    match statement {
        Statement::Let { local, initializer } => {
            if let Some(initializer) = initializer {
                visitor.visit_expression_mut(initializer)?;
            }
            visitor.visit_local_mut(local);
        }
        Statement::Expression(expression) => visitor.visit_expression_mut(expression)?,
        Statement::EndScope(local) => visitor.visit_local_mut(local),
    }

    Ok(())
}

pub fn walk_expression_mut(
    visitor: &mut impl MutVisitor,
    expression: &mut Expression,
) -> Result<(), PassError> {
    match &mut expression.kind {
        ExpressionKind::Const(_)
        | ExpressionKind::Break(_)
        | ExpressionKind::Continue(_) => {}
        ExpressionKind::GetLocal(local) => visitor.visit_local_mut(local),
        ExpressionKind::SetLocal { local, value } => {
            visitor.visit_expression_mut(value)?;
            visitor.visit_local_mut(local);
        }
        ExpressionKind::GetField { receiver, .. } => {
            if let Some(receiver) = receiver {
                visitor.visit_expression_mut(receiver)?;
            }
        }
        ExpressionKind::SetField {
            receiver, value, ..
        } => {
            if let Some(receiver) = receiver {
                visitor.visit_expression_mut(receiver)?;
            }
            visitor.visit_expression_mut(value)?;
        }
        ExpressionKind::Call(call) => {
            if let Some(receiver) = &mut call.receiver {
                visitor.visit_expression_mut(receiver)?;
            }
            for argument in &mut call.arguments {
                visitor.visit_expression_mut(argument)?;
            }
        }
        ExpressionKind::Intrinsic { arguments, .. }
        | ExpressionKind::StringConcat(arguments)
        | ExpressionKind::ArrayLiteral(arguments)
        | ExpressionKind::AnnotationConstructor { arguments, .. } => {
            for argument in arguments {
                visitor.visit_expression_mut(argument)?;
            }
        }
        ExpressionKind::Block(block) => visitor.visit_block_mut(block)?,
        ExpressionKind::If {
            condition,
            then,
            otherwise,
        } => {
            visitor.visit_expression_mut(condition)?;
            visitor.visit_expression_mut(then)?;
            if let Some(otherwise) = otherwise {
                visitor.visit_expression_mut(otherwise)?;
            }
        }
        ExpressionKind::While(lp) => {
            visitor.visit_expression_mut(&mut lp.condition)?;
            visitor.visit_block_mut(&mut lp.body)?;
        }
        ExpressionKind::DoWhile(lp) => {
            visitor.visit_block_mut(&mut lp.body)?;
            visitor.visit_expression_mut(&mut lp.condition)?;
        }
        ExpressionKind::For(for_loop) => {
            visitor.visit_expression_mut(&mut for_loop.source)?;
            match &mut for_loop.variable {
                LoopVariable::Single(local) => visitor.visit_local_mut(local),
                LoopVariable::Destructured(components) => {
                    for component in components.iter_mut().flatten() {
                        visitor.visit_local_mut(&mut component.local);
                    }
                }
            }
            visitor.visit_block_mut(&mut for_loop.body)?;
        }
        ExpressionKind::Range(range) => {
            visitor.visit_expression_mut(&mut range.start)?;
            visitor.visit_expression_mut(&mut range.end)?;
            if let Some(step) = &mut range.step {
                visitor.visit_expression_mut(step)?;
            }
        }
        ExpressionKind::Return(value) => {
            if let Some(value) = value {
                visitor.visit_expression_mut(value)?;
            }
        }
    }

    Ok(())
}

/// Collects every declaration of a file, nested ones included, in source
/// order.
pub fn all_declarations(file: &File) -> Vec<&Declaration> {
    fn collect<'a>(found: &mut Vec<&'a Declaration>, declaration: &'a Declaration) {
        found.push(declaration);

        match &declaration.kind {
            DeclarationKind::Class(class) => {
                for member in &class.declarations {
                    collect(found, member);
                }
            }
            DeclarationKind::Property(property) => {
                for member in [&property.backing_field, &property.getter, &property.setter]
                    .into_iter()
                    .flatten()
                {
                    collect(found, member);
                }
            }
            _ => {}
        }
    }

    let mut found = Vec::new();
    for declaration in &file.declarations {
        collect(&mut found, declaration);
    }
    found
}

/// Whether any expression in the file satisfies `predicate`
pub fn any_expression(file: &File, predicate: fn(&Expression) -> bool) -> bool {
    struct Finder {
        predicate: fn(&Expression) -> bool,
        found: bool,
    }

    impl Visitor for Finder {
        fn visit_expression(&mut self, expression: &Expression) {
            if self.found {
                return;
            }
            if (self.predicate)(expression) {
                self.found = true;
                return;
            }
            walk_expression(self, expression)
        }
    }

    let mut finder = Finder {
        predicate,
        found: false,
    };
    finder.visit_file(file);
    finder.found
}
