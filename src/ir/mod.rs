//! The lowering IR.
//!
//! A [`Module`] owns its files, a [`File`] owns its top level declarations and
//! declarations own nested declarations and bodies. Containment is strictly
//! tree shaped. Cross references (call targets, field accesses, annotation
//! classes) go through [`Symbol`] handles resolved against the module's
//! [`SymbolTable`].
//!
//! Executable code lives in a [`Body`]: a table of locals plus a [`Block`].
//! Lowerings rewrite blocks in place and allocate their temporaries in the
//! enclosing body's local table.

pub mod builder;
pub mod constant;
pub mod id;
pub mod pretty_print;
pub mod primitive;
pub mod symbol;
pub mod ty;
pub mod validate;
pub mod visit;

use serde::{Deserialize, Serialize};
use strum::Display;

pub use self::{
    constant::ConstValue,
    id::{FileId, LocalId, Span},
    primitive::{OperatorName, PrimitiveKind},
    symbol::{Linkage, Symbol, SymbolEntry, SymbolError, SymbolKind, SymbolTable, Visibility},
    ty::Type,
};
use crate::{index::IndexVec, intern::Name};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: Name,
    pub files: Vec<File>,
    pub symbols: SymbolTable,
}

impl Module {
    pub fn file(&self, id: FileId) -> Option<&File> {
        self.files.iter().find(|f| f.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: FileId,
    pub path: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub symbol: Symbol,
    pub name: Name,
    #[serde(default)]
    pub visibility: Visibility,
    /// Annotation constructor calls attached to this declaration
    #[serde(default)]
    pub annotations: Vec<Expression>,
    pub kind: DeclarationKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclarationKind {
    Function(Function),
    Class(Class),
    Field(Field),
    Property(Property),
    AnonymousInitializer(Body),
}

impl DeclarationKind {
    pub fn describe(&self) -> &'static str {
        match self {
            DeclarationKind::Function(function) if function.is_constructor => "constructor",
            DeclarationKind::Function(_) => "function",
            DeclarationKind::Class(_) => "class",
            DeclarationKind::Field(_) => "field",
            DeclarationKind::Property(_) => "property",
            DeclarationKind::AnonymousInitializer(_) => "anonymous initializer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Name,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Includes the dispatch receiver `this` as the first parameter for
    /// members. The first locals of the body mirror this list.
    pub parameters: Vec<Parameter>,
    pub return_type: Type,
    /// `None` for declarations without a body in this module
    pub body: Option<Body>,
    #[serde(default)]
    pub has_dispatch_receiver: bool,
    #[serde(default)]
    pub is_constructor: bool,
    /// Marks library functions the compiler is allowed to evaluate
    #[serde(default)]
    pub is_intrinsic_const: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum ClassKind {
    Class,
    Object,
    Interface,
    Annotation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub kind: ClassKind,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub ty: Type,
    /// The value of the block is the initial value. Instance field
    /// initializers see the receiver as local `this`.
    pub initializer: Option<Body>,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub ty: Type,
    pub backing_field: Option<Box<Declaration>>,
    pub getter: Option<Box<Declaration>>,
    pub setter: Option<Box<Declaration>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum LocalOrigin {
    Parameter,
    Source,
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Local {
    pub name: Name,
    pub ty: Type,
    #[serde(default)]
    pub is_mutable: bool,
    pub origin: LocalOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub locals: IndexVec<LocalId, Local>,
    pub block: Block,
}

impl Body {
    pub fn new_local(&mut self, name: &str, ty: Type, is_mutable: bool, origin: LocalOrigin) -> LocalId {
        self.locals.push(Local {
            name: Name::new(name),
            ty,
            is_mutable,
            origin,
        })
    }

    pub fn parameter_count(&self) -> usize {
        self.locals
            .iter()
            .take_while(|l| l.origin == LocalOrigin::Parameter)
            .count()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    /// Trailing expression providing the value of the block
    pub result: Option<Box<Expression>>,
}

impl Block {
    pub fn new(statements: Vec<Statement>, result: Option<Expression>) -> Self {
        Self {
            statements,
            result: result.map(Box::new),
        }
    }

    pub fn ty(&self) -> Type {
        self.result.as_ref().map_or(Type::Unit, |e| e.ty.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Let {
        local: LocalId,
        initializer: Option<Expression>,
    },
    Expression(Expression),
    /// The lexical lifetime of a local ends here
    EndScope(LocalId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub ty: Type,
    #[serde(default)]
    pub span: Span,
}

impl Expression {
    pub fn new(kind: ExpressionKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn constant(value: ConstValue, span: Span) -> Self {
        let ty = value.ty();
        Self::new(ExpressionKind::Const(value), ty, span)
    }

    pub fn unit(span: Span) -> Self {
        Self::new(ExpressionKind::Block(Block::default()), Type::Unit, span)
    }

    /// Moves the expression out, leaving an empty unit block behind
    pub fn take(&mut self) -> Expression {
        let span = self.span;
        std::mem::replace(self, Expression::unit(span))
    }

    pub fn as_const(&self) -> Option<&ConstValue> {
        match &self.kind {
            ExpressionKind::Const(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        self.as_const().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpressionKind {
    Const(ConstValue),
    GetLocal(LocalId),
    SetLocal {
        local: LocalId,
        value: Box<Expression>,
    },
    GetField {
        field: Symbol,
        receiver: Option<Box<Expression>>,
    },
    SetField {
        field: Symbol,
        receiver: Option<Box<Expression>>,
        value: Box<Expression>,
    },
    Call(Call),
    /// A primitive operation understood directly by the backend
    Intrinsic {
        op: IntrinsicOp,
        arguments: Vec<Expression>,
    },
    /// String template. Segments of any type are converted to strings.
    StringConcat(Vec<Expression>),
    Block(Block),
    If {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Option<Box<Expression>>,
    },
    While(Loop),
    /// The condition is evaluated in the scope of the body
    DoWhile(Loop),
    For(ForLoop),
    Range(Range),
    ArrayLiteral(Vec<Expression>),
    /// Only appears in annotation arguments
    AnnotationConstructor {
        annotation: Symbol,
        arguments: Vec<Expression>,
    },
    Break(Option<Name>),
    Continue(Option<Name>),
    Return(Option<Box<Expression>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Callee {
    Declared { symbol: Symbol, name: Name },
    /// Builtin operator of a primitive type
    Builtin(OperatorName),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub callee: Callee,
    pub receiver: Option<Box<Expression>>,
    /// Declared type of the receiver parameter of the callee
    pub receiver_type: Option<Type>,
    pub arguments: Vec<Expression>,
    /// Set for call sites that must keep calling the declared function
    #[serde(default)]
    pub suppress_intrinsics: bool,
}

impl Call {
    pub fn name(&self) -> Name {
        match &self.callee {
            Callee::Declared { name, .. } => *name,
            Callee::Builtin(operator) => operator.name(),
        }
    }

    pub fn symbol(&self) -> Option<Symbol> {
        match &self.callee {
            Callee::Declared { symbol, .. } => Some(*symbol),
            Callee::Builtin(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntrinsicOp {
    Primitive {
        kind: PrimitiveKind,
        operator: OperatorName,
    },
    StringLength,
    StringGet,
    StringEquals,
    StructuralEquals,
    ArraySize,
    ArrayGet,
    ArraySet,
    /// Last element actually reached when stepping from `first` towards
    /// `last` by `step`
    ProgressionLastElement(PrimitiveKind),
    ReflectiveGet {
        name: Name,
    },
    ReflectiveSet {
        name: Name,
    },
    ReflectiveInvoke {
        name: Name,
    },
}

impl core::fmt::Display for IntrinsicOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntrinsicOp::Primitive { kind, operator } => write!(f, "{kind}.{operator}"),
            IntrinsicOp::StringLength => write!(f, "string_length"),
            IntrinsicOp::StringGet => write!(f, "string_get"),
            IntrinsicOp::StringEquals => write!(f, "string_equals"),
            IntrinsicOp::StructuralEquals => write!(f, "structural_equals"),
            IntrinsicOp::ArraySize => write!(f, "array_size"),
            IntrinsicOp::ArrayGet => write!(f, "array_get"),
            IntrinsicOp::ArraySet => write!(f, "array_set"),
            IntrinsicOp::ProgressionLastElement(kind) => {
                write!(f, "progression_last_element<{kind}>")
            }
            IntrinsicOp::ReflectiveGet { name } => write!(f, "reflective_get<{name}>"),
            IntrinsicOp::ReflectiveSet { name } => write!(f, "reflective_set<{name}>"),
            IntrinsicOp::ReflectiveInvoke { name } => write!(f, "reflective_invoke<{name}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub label: Option<Name>,
    pub condition: Box<Expression>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForLoop {
    pub label: Option<Name>,
    pub variable: LoopVariable,
    pub source: Box<Expression>,
    pub body: Block,
    /// Iterator members of the source, required unless the source is a
    /// range, an array or a string
    pub protocol: Option<IteratorProtocol>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoopVariable {
    Single(LocalId),
    /// `for ((a, _, c) in ...)`, `None` entries are skipped components
    Destructured(Vec<Option<DestructuringComponent>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestructuringComponent {
    pub local: LocalId,
    /// The `componentN` function
    pub function: Symbol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorProtocol {
    pub iterator: Symbol,
    pub has_next: Symbol,
    pub next: Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum RangeKind {
    /// `first..last`
    #[strum(serialize = "..")]
    RangeTo,
    /// `first until bound`
    #[strum(serialize = "until")]
    Until,
    /// `first downTo last`
    #[strum(serialize = "downTo")]
    DownTo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub kind: RangeKind,
    pub start: Box<Expression>,
    pub end: Box<Expression>,
    pub step: Option<Box<Expression>>,
}
