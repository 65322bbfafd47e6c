use strum::IntoEnumIterator;

use super::{CallRewriteEngine, ReceiverKey, Rewrite};
use crate::{
    error::{ConfigurationError, PassError},
    ir::{
        Call, Expression, ExpressionKind, IntrinsicOp, OperatorName, PrimitiveKind, Span, Type,
        builder,
    },
};

/// Builtin operators of the primitive types, except `equals`
pub fn number_operators() -> Result<CallRewriteEngine, ConfigurationError> {
    let mut engine = CallRewriteEngine::new("NumberOperators");

    for kind in PrimitiveKind::iter() {
        for operator in OperatorName::iter()
            .filter(|op| *op != OperatorName::Equals && kind.supports_operator(*op))
        {
            engine.register(
                ReceiverKey::Primitive(kind),
                operator.into(),
                primitive_operator,
            )?;
        }
    }

    Ok(engine)
}

pub fn equality() -> Result<CallRewriteEngine, ConfigurationError> {
    let mut engine = CallRewriteEngine::new("Equality");

    for kind in PrimitiveKind::iter() {
        engine.register(ReceiverKey::Primitive(kind), "equals", primitive_operator)?;
    }
    engine.register(ReceiverKey::String, "equals", |call, _| {
        Ok(intrinsic(call, 1, IntrinsicOp::StringEquals, Type::BOOLEAN))
    })?;
    engine.register(ReceiverKey::Any, "equals", |call, _| {
        Ok(intrinsic(call, 1, IntrinsicOp::StructuralEquals, Type::BOOLEAN))
    })?;

    Ok(engine)
}

pub fn string_members() -> Result<CallRewriteEngine, ConfigurationError> {
    let mut engine = CallRewriteEngine::new("StringMembers");

    engine.register(ReceiverKey::String, "length", |call, _| {
        Ok(intrinsic(call, 0, IntrinsicOp::StringLength, Type::INT))
    })?;
    engine.register(ReceiverKey::String, "get", |call, _| {
        Ok(intrinsic(call, 1, IntrinsicOp::StringGet, Type::CHAR))
    })?;
    engine.register(ReceiverKey::String, "plus", |call, _| {
        Ok(concatenation(call, 1))
    })?;
    // `x.toString()` is a template with a single segment
    engine.register(ReceiverKey::Any, "toString", |call, _| {
        Ok(concatenation(call, 0))
    })?;

    Ok(engine)
}

pub fn array_members() -> Result<CallRewriteEngine, ConfigurationError> {
    let mut engine = CallRewriteEngine::new("ArrayMembers");

    engine.register(ReceiverKey::Array, "size", |call, _| {
        Ok(intrinsic(call, 0, IntrinsicOp::ArraySize, Type::INT))
    })?;
    engine.register(ReceiverKey::Array, "get", |call, _| {
        let Some(Type::Array(element)) = call.receiver_type.clone() else {
            return Ok(Rewrite::Kept(call));
        };
        Ok(intrinsic(call, 1, IntrinsicOp::ArrayGet, *element))
    })?;
    engine.register(ReceiverKey::Array, "set", |call, _| {
        Ok(intrinsic(call, 2, IntrinsicOp::ArraySet, Type::Unit))
    })?;

    Ok(engine)
}

fn primitive_operator(call: Call, _ty: &Type) -> Result<Rewrite, PassError> {
    let kind = call.receiver_type.as_ref().and_then(Type::as_primitive);
    let operator = call.name().value().parse::<OperatorName>().ok();

    let (Some(kind), Some(operator)) = (kind, operator) else {
        return Ok(Rewrite::Kept(call));
    };
    let Some(result) = kind.result_of(operator) else {
        return Ok(Rewrite::Kept(call));
    };

    Ok(intrinsic(
        call,
        operator.arity(),
        IntrinsicOp::Primitive { kind, operator },
        Type::Primitive(result),
    ))
}

/// Receiver followed by the arguments, `None` when the call does not have a
/// receiver and exactly `arity` arguments
fn operands(call: Call, arity: usize) -> Result<Vec<Expression>, Call> {
    if call.receiver.is_none() || call.arguments.len() != arity {
        return Err(call);
    }

    let Call {
        receiver,
        arguments,
        ..
    } = call;

    Ok(receiver.map(|r| *r).into_iter().chain(arguments).collect())
}

fn intrinsic(call: Call, arity: usize, op: IntrinsicOp, ty: Type) -> Rewrite {
    match operands(call, arity) {
        Ok(operands) => Rewrite::Replaced(builder::intrinsic(op, operands, ty)),
        Err(call) => Rewrite::Kept(call),
    }
}

fn concatenation(call: Call, arity: usize) -> Rewrite {
    match operands(call, arity) {
        Ok(segments) => Rewrite::Replaced(Expression::new(
            ExpressionKind::StringConcat(segments),
            Type::String,
            Span::DUMMY,
        )),
        Err(call) => Rewrite::Kept(call),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Name;

    #[test]
    fn number_operators_cover_supported_operators_only() {
        let engine = number_operators().unwrap();

        let int = ReceiverKey::Primitive(PrimitiveKind::Int);
        let boolean = ReceiverKey::Primitive(PrimitiveKind::Boolean);

        assert!(engine.lookup(int, Name::new("shl")).is_some());
        assert!(engine.lookup(int, Name::new("not")).is_none());
        assert!(engine.lookup(boolean, Name::new("plus")).is_none());
        assert!(engine.lookup(int, Name::new("equals")).is_none());
    }

    #[test]
    fn arity_mismatch_keeps_the_call() {
        let call = Call {
            callee: crate::ir::Callee::Builtin(OperatorName::Plus),
            receiver: Some(Box::new(builder::int(1))),
            receiver_type: Some(Type::INT),
            arguments: Vec::new(),
            suppress_intrinsics: false,
        };

        assert!(matches!(
            primitive_operator(call, &Type::INT),
            Ok(Rewrite::Kept(_))
        ));
    }
}
