//! Table driven replacement of calls by intrinsics.
//!
//! Every [`CallRewriteEngine`] owns a table keyed by the declared receiver
//! type of the callee and its name. Engines are consulted in a fixed order
//! and the first one producing a replacement wins. Call sites marked with
//! `suppress_intrinsics` are never touched.

mod engines;

use hashbrown::HashMap;
use tracing::trace;

pub use self::engines::{array_members, equality, number_operators, string_members};
use super::{BodyLoweringPass, FileContext};
use crate::{
    error::{ConfigurationError, PassError},
    intern::Name,
    ir::{
        Body, Call, Expression, ExpressionKind, PrimitiveKind, Type,
        visit::{MutVisitor, walk_expression_mut},
    },
};

/// Static receiver type a rewrite rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverKey {
    Primitive(PrimitiveKind),
    String,
    Array,
    /// Matches any receiver without a more specific rule
    Any,
}

impl ReceiverKey {
    pub fn of(ty: &Type) -> ReceiverKey {
        match ty {
            Type::Primitive(kind) => ReceiverKey::Primitive(*kind),
            Type::String => ReceiverKey::String,
            Type::Array(_) => ReceiverKey::Array,
            _ => ReceiverKey::Any,
        }
    }
}

impl core::fmt::Display for ReceiverKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiverKey::Primitive(kind) => write!(f, "{kind}"),
            ReceiverKey::String => write!(f, "String"),
            ReceiverKey::Array => write!(f, "Array"),
            ReceiverKey::Any => write!(f, "Any"),
        }
    }
}

pub enum Rewrite {
    /// The rule does not apply, the call is handed back untouched
    Kept(Call),
    Replaced(Expression),
}

/// Receives the call and the type of the call expression.
pub type RewriteFn = fn(Call, &Type) -> Result<Rewrite, PassError>;

pub struct CallRewriteEngine {
    name: &'static str,
    rules: HashMap<(ReceiverKey, Name), RewriteFn>,
}

impl CallRewriteEngine {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn register(
        &mut self,
        receiver: ReceiverKey,
        name: &str,
        rewrite: RewriteFn,
    ) -> Result<(), ConfigurationError> {
        let key = (receiver, Name::new(name));
        if self.rules.contains_key(&key) {
            return Err(ConfigurationError::DuplicateRewriteRule {
                engine: self.name,
                receiver: receiver.to_string(),
                name: key.1,
            });
        }

        self.rules.insert(key, rewrite);
        Ok(())
    }

    /// Replaces an existing rule, returning it
    pub fn override_rule(
        &mut self,
        receiver: ReceiverKey,
        name: &str,
        rewrite: RewriteFn,
    ) -> Option<RewriteFn> {
        self.rules.insert((receiver, Name::new(name)), rewrite)
    }

    /// The rule for `receiver`, falling back to the `Any` rule
    pub fn lookup(&self, receiver: ReceiverKey, name: Name) -> Option<RewriteFn> {
        self.rules
            .get(&(receiver, name))
            .or_else(|| self.rules.get(&(ReceiverKey::Any, name)))
            .copied()
    }

    pub fn rewrite(&self, call: Call, ty: &Type) -> Result<Rewrite, PassError> {
        let Some(receiver_type) = &call.receiver_type else {
            return Ok(Rewrite::Kept(call));
        };

        match self.lookup(ReceiverKey::of(receiver_type), call.name()) {
            Some(rewrite) => rewrite(call, ty),
            None => Ok(Rewrite::Kept(call)),
        }
    }
}

/// Engines applied in order to every call site.
pub struct CallRewriteChain {
    engines: Vec<CallRewriteEngine>,
}

impl CallRewriteChain {
    pub fn new(engines: Vec<CallRewriteEngine>) -> Self {
        Self { engines }
    }

    /// The engines of the JVM backend
    pub fn jvm() -> Result<Self, ConfigurationError> {
        Ok(Self::new(vec![
            number_operators()?,
            equality()?,
            string_members()?,
            array_members()?,
        ]))
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name).collect()
    }

    /// Rewrites `expression` in place when it is a call some engine has a
    /// rule for. Returns whether it changed.
    pub fn rewrite(&self, expression: &mut Expression) -> Result<bool, PassError> {
        match &expression.kind {
            ExpressionKind::Call(call) if !call.suppress_intrinsics => {}
            _ => return Ok(false),
        }

        let span = expression.span;
        let ty = expression.ty.clone();
        let ExpressionKind::Call(mut call) = expression.take().kind else {
            return Err(PassError::Internal("call vanished while rewriting".into()));
        };

        for engine in &self.engines {
            let name = call.name();

            match engine.rewrite(call, &ty)? {
                Rewrite::Kept(kept) => call = kept,
                Rewrite::Replaced(replacement) => {
                    if replacement.ty != ty {
                        return Err(PassError::TypeChanged {
                            call: name,
                            expected: ty,
                            actual: replacement.ty,
                        });
                    }

                    trace!(engine = engine.name, call = %name, "rewrote call");
                    *expression = replacement.with_span(span);
                    return Ok(true);
                }
            }
        }

        *expression = Expression::new(ExpressionKind::Call(call), ty, span);
        Ok(false)
    }
}

/// Applies a [`CallRewriteChain`] to every call, innermost first.
pub struct CallsLowering {
    chain: CallRewriteChain,
}

impl CallsLowering {
    pub fn new(chain: CallRewriteChain) -> Self {
        Self { chain }
    }
}

impl BodyLoweringPass for CallsLowering {
    fn lower_body(&self, body: &mut Body, _ctx: &mut FileContext<'_>) -> Result<(), PassError> {
        CallRewriter { chain: &self.chain }.visit_block_mut(&mut body.block)
    }
}

struct CallRewriter<'a> {
    chain: &'a CallRewriteChain,
}

impl MutVisitor for CallRewriter<'_> {
    fn visit_expression_mut(&mut self, expression: &mut Expression) -> Result<(), PassError> {
        walk_expression_mut(self, expression)?;
        self.chain.rewrite(expression)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::LoweringConfig,
        index::{Index, IndexVec},
        ir::{
            Block, FileId, IntrinsicOp, Linkage, LocalId, OperatorName, Span, Statement, SymbolKind,
            SymbolTable, Visibility, builder,
        },
    };

    fn int_plus(left: i32, right: i32) -> Expression {
        builder::builtin(
            PrimitiveKind::Int,
            OperatorName::Plus,
            builder::int(left),
            vec![builder::int(right)],
        )
        .unwrap()
    }

    fn method(receiver: Expression, name: &str, arguments: Vec<Expression>, ty: Type) -> Expression {
        let mut symbols = SymbolTable::new();
        let symbol = symbols.declare(
            Name::new(name),
            SymbolKind::Function,
            Visibility::Public,
            Linkage::External,
        );
        let receiver_type = receiver.ty.clone();
        builder::call(symbol, name, Some((receiver, receiver_type)), arguments, ty)
    }

    fn lower(expression: Expression) -> Expression {
        let mut body = Body {
            locals: IndexVec::new(),
            block: Block::new(vec![Statement::Expression(expression)], None),
        };

        let symbols = SymbolTable::new();
        let config = LoweringConfig::default();
        let mut ctx = FileContext::new(FileId::new(0), &symbols, &config);
        CallsLowering::new(CallRewriteChain::jvm().unwrap())
            .lower_body(&mut body, &mut ctx)
            .unwrap();

        match body.block.statements.pop() {
            Some(Statement::Expression(expression)) => expression,
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn primitive_operators_become_intrinsics() {
        let lowered = lower(int_plus(1, 2));

        assert_eq!(
            lowered.kind,
            ExpressionKind::Intrinsic {
                op: IntrinsicOp::Primitive {
                    kind: PrimitiveKind::Int,
                    operator: OperatorName::Plus,
                },
                arguments: vec![builder::int(1), builder::int(2)],
            }
        );
        assert_eq!(lowered.ty, Type::INT);
    }

    #[test]
    fn rewriting_twice_changes_nothing() {
        let nested = builder::builtin(
            PrimitiveKind::Int,
            OperatorName::Times,
            int_plus(1, 2),
            vec![method(builder::string("ab"), "length", Vec::new(), Type::INT)],
        )
        .unwrap();

        let once = lower(nested);
        let twice = lower(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn suppressed_calls_are_left_alone() {
        let mut expression = int_plus(3, 4);
        if let ExpressionKind::Call(call) = &mut expression.kind {
            call.suppress_intrinsics = true;
        }

        assert_eq!(lower(expression.clone()), expression);
    }

    #[test]
    fn exact_receiver_wins_over_fallback() {
        let strings = lower(method(
            builder::string("a"),
            "equals",
            vec![builder::string("b")],
            Type::BOOLEAN,
        ));
        assert!(matches!(
            strings.kind,
            ExpressionKind::Intrinsic {
                op: IntrinsicOp::StringEquals,
                ..
            }
        ));

        let point = Expression::new(
            ExpressionKind::GetLocal(LocalId::new(0)),
            Type::Class("Point".into()),
            Span::DUMMY,
        );
        let objects = lower(method(point.clone(), "equals", vec![point], Type::BOOLEAN));
        assert!(matches!(
            objects.kind,
            ExpressionKind::Intrinsic {
                op: IntrinsicOp::StructuralEquals,
                ..
            }
        ));
    }

    #[test]
    fn string_plus_becomes_concatenation() {
        let lowered = lower(method(
            builder::string("a"),
            "plus",
            vec![builder::int(1)],
            Type::String,
        ));

        assert_eq!(
            lowered.kind,
            ExpressionKind::StringConcat(vec![builder::string("a"), builder::int(1)])
        );
    }

    fn always_zero(_call: Call, _ty: &Type) -> Result<Rewrite, PassError> {
        Ok(Rewrite::Replaced(builder::int(0)))
    }

    fn always_one(_call: Call, _ty: &Type) -> Result<Rewrite, PassError> {
        Ok(Rewrite::Replaced(builder::int(1)))
    }

    fn to_long(_call: Call, _ty: &Type) -> Result<Rewrite, PassError> {
        Ok(Rewrite::Replaced(builder::long(1)))
    }

    #[test]
    fn duplicate_rules_are_rejected_unless_overridden() {
        let mut engine = CallRewriteEngine::new("Test");
        let key = ReceiverKey::Primitive(PrimitiveKind::Int);

        engine.register(key, "plus", always_zero).unwrap();
        assert_eq!(
            engine.register(key, "plus", always_one),
            Err(ConfigurationError::DuplicateRewriteRule {
                engine: "Test",
                receiver: "Int".into(),
                name: Name::new("plus"),
            })
        );

        assert!(engine.override_rule(key, "plus", always_one).is_some());
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn first_matching_engine_wins() {
        let key = ReceiverKey::Primitive(PrimitiveKind::Int);
        let mut first = CallRewriteEngine::new("First");
        first.register(key, "plus", always_zero).unwrap();
        let mut second = CallRewriteEngine::new("Second");
        second.register(key, "plus", always_one).unwrap();

        let chain = CallRewriteChain::new(vec![first, second]);
        let mut expression = int_plus(5, 6);

        assert!(chain.rewrite(&mut expression).unwrap());
        assert_eq!(expression, builder::int(0));
    }

    #[test]
    fn rewrites_must_keep_the_type() {
        let mut engine = CallRewriteEngine::new("Widening");
        engine
            .register(ReceiverKey::Primitive(PrimitiveKind::Int), "plus", to_long)
            .unwrap();

        let chain = CallRewriteChain::new(vec![engine]);
        let mut expression = int_plus(5, 6);

        match chain.rewrite(&mut expression) {
            Err(PassError::TypeChanged {
                call,
                expected,
                actual,
            }) => {
                assert_eq!(call, Name::new("plus"));
                assert_eq!((expected, actual), (Type::INT, Type::LONG));
            }
            other => panic!("expected a type change error, got {other:?}"),
        }
    }
}
