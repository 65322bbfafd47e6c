//! Helpers for constructing IR, shared by the lowerings and the tests.

use super::{
    Block, Body, Call, Callee, ConstValue, Declaration, DeclarationKind, Expression,
    ExpressionKind, Field, File, FileId, Function, IntrinsicOp, Linkage, Local, LocalId,
    LocalOrigin, Loop, Module, OperatorName, Parameter, PrimitiveKind, Span, Statement, Symbol,
    SymbolKind, SymbolTable, Type, Visibility,
};
use crate::{
    error::PassError,
    index::{Index, IndexVec},
    intern::Name,
};

impl Expression {
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

pub fn int(value: i32) -> Expression {
    Expression::constant(ConstValue::Int(value), Span::DUMMY)
}

pub fn long(value: i64) -> Expression {
    Expression::constant(ConstValue::Long(value), Span::DUMMY)
}

pub fn boolean(value: bool) -> Expression {
    Expression::constant(ConstValue::Boolean(value), Span::DUMMY)
}

pub fn string(value: &str) -> Expression {
    Expression::constant(ConstValue::String(value.to_owned()), Span::DUMMY)
}

pub fn get_local(local: LocalId, ty: Type) -> Expression {
    Expression::new(ExpressionKind::GetLocal(local), ty, Span::DUMMY)
}

pub fn set_local(local: LocalId, value: Expression) -> Expression {
    Expression::new(
        ExpressionKind::SetLocal {
            local,
            value: Box::new(value),
        },
        Type::Unit,
        Span::DUMMY,
    )
}

pub fn let_local(local: LocalId, initializer: Expression) -> Statement {
    Statement::Let {
        local,
        initializer: Some(initializer),
    }
}

/// Call of a builtin primitive operator, typed by the operator's result.
pub fn builtin(
    kind: PrimitiveKind,
    operator: OperatorName,
    receiver: Expression,
    arguments: Vec<Expression>,
) -> Result<Expression, PassError> {
    let result = kind.result_of(operator).ok_or_else(|| {
        PassError::Internal(format!("{kind} does not support operator `{operator}`"))
    })?;

    Ok(Expression::new(
        ExpressionKind::Call(Call {
            callee: Callee::Builtin(operator),
            receiver: Some(Box::new(receiver)),
            receiver_type: Some(Type::Primitive(kind)),
            arguments,
            suppress_intrinsics: false,
        }),
        Type::Primitive(result),
        Span::DUMMY,
    ))
}

pub fn call(
    symbol: Symbol,
    name: &str,
    receiver: Option<(Expression, Type)>,
    arguments: Vec<Expression>,
    ty: Type,
) -> Expression {
    let (receiver, receiver_type) = match receiver {
        Some((receiver, receiver_type)) => (Some(Box::new(receiver)), Some(receiver_type)),
        None => (None, None),
    };

    Expression::new(
        ExpressionKind::Call(Call {
            callee: Callee::Declared {
                symbol,
                name: Name::new(name),
            },
            receiver,
            receiver_type,
            arguments,
            suppress_intrinsics: false,
        }),
        ty,
        Span::DUMMY,
    )
}

pub fn intrinsic(op: IntrinsicOp, arguments: Vec<Expression>, ty: Type) -> Expression {
    Expression::new(ExpressionKind::Intrinsic { op, arguments }, ty, Span::DUMMY)
}

pub fn block(statements: Vec<Statement>, result: Option<Expression>) -> Expression {
    let block = Block::new(statements, result);
    let ty = block.ty();
    Expression::new(ExpressionKind::Block(block), ty, Span::DUMMY)
}

pub fn if_then(condition: Expression, then: Expression) -> Expression {
    Expression::new(
        ExpressionKind::If {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: None,
        },
        Type::Unit,
        Span::DUMMY,
    )
}

pub fn while_loop(label: Option<Name>, condition: Expression, body: Block) -> Expression {
    Expression::new(
        ExpressionKind::While(Loop {
            label,
            condition: Box::new(condition),
            body,
        }),
        Type::Unit,
        Span::DUMMY,
    )
}

pub fn do_while_loop(label: Option<Name>, body: Block, condition: Expression) -> Expression {
    Expression::new(
        ExpressionKind::DoWhile(Loop {
            label,
            condition: Box::new(condition),
            body,
        }),
        Type::Unit,
        Span::DUMMY,
    )
}

pub fn declaration(symbol: Symbol, name: &str, kind: DeclarationKind) -> Declaration {
    Declaration {
        symbol,
        name: Name::new(name),
        visibility: Visibility::Public,
        annotations: Vec::new(),
        kind,
        span: Span::DUMMY,
    }
}

/// Builds the local table of a body. Parameters must be added first.
#[derive(Debug, Default)]
pub struct BodyBuilder {
    locals: IndexVec<LocalId, Local>,
    parameters: Vec<Parameter>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameter(&mut self, name: &str, ty: Type) -> LocalId {
        self.parameters.push(Parameter {
            name: Name::new(name),
            ty: ty.clone(),
        });
        self.push(name, ty, false, LocalOrigin::Parameter)
    }

    pub fn local(&mut self, name: &str, ty: Type, is_mutable: bool) -> LocalId {
        self.push(name, ty, is_mutable, LocalOrigin::Source)
    }

    fn push(&mut self, name: &str, ty: Type, is_mutable: bool, origin: LocalOrigin) -> LocalId {
        self.locals.push(Local {
            name: Name::new(name),
            ty,
            is_mutable,
            origin,
        })
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        self.parameters.clone()
    }

    pub fn finish(self, statements: Vec<Statement>, result: Option<Expression>) -> Body {
        Body {
            locals: self.locals,
            block: Block::new(statements, result),
        }
    }

    /// A function declaration whose parameters are the ones added to this
    /// builder
    pub fn function(
        self,
        symbol: Symbol,
        name: &str,
        return_type: Type,
        statements: Vec<Statement>,
        result: Option<Expression>,
    ) -> Declaration {
        let parameters = self.parameters();
        let body = self.finish(statements, result);

        declaration(
            symbol,
            name,
            DeclarationKind::Function(Function {
                parameters,
                return_type,
                body: Some(body),
                has_dispatch_receiver: false,
                is_constructor: false,
                is_intrinsic_const: false,
            }),
        )
    }
}

/// A field whose initializer is a single expression without locals
pub fn field_with_value(symbol: Symbol, name: &str, value: Expression, is_const: bool) -> Declaration {
    let ty = value.ty.clone();

    declaration(
        symbol,
        name,
        DeclarationKind::Field(Field {
            ty,
            initializer: Some(Body {
                locals: IndexVec::new(),
                block: Block::new(Vec::new(), Some(value)),
            }),
            is_const,
            is_static: is_const,
            is_mutable: false,
        }),
    )
}

#[derive(Debug)]
pub struct ModuleBuilder {
    name: Name,
    files: Vec<File>,
    symbols: SymbolTable,
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Name::new(name),
            files: Vec::new(),
            symbols: SymbolTable::new(),
        }
    }

    pub fn add_file(&mut self, path: &str) -> FileId {
        let id = FileId::new(self.files.len());
        self.files.push(File {
            id,
            path: path.to_owned(),
            declarations: Vec::new(),
        });
        id
    }

    pub fn declare(&mut self, file: FileId, name: &str, kind: SymbolKind) -> Symbol {
        self.declare_with_visibility(file, name, kind, Visibility::Public)
    }

    pub fn declare_with_visibility(
        &mut self,
        file: FileId,
        name: &str,
        kind: SymbolKind,
        visibility: Visibility,
    ) -> Symbol {
        self.symbols
            .declare(Name::new(name), kind, visibility, Linkage::File(file))
    }

    pub fn external(&mut self, name: &str, kind: SymbolKind, visibility: Visibility) -> Symbol {
        self.symbols
            .declare(Name::new(name), kind, visibility, Linkage::External)
    }

    pub fn push(&mut self, file: FileId, declaration: Declaration) {
        self.files[file.index()].declarations.push(declaration);
    }

    pub fn finish(self) -> Module {
        Module {
            name: self.name,
            files: self.files,
            symbols: self.symbols,
        }
    }
}
