//! A small tree walking interpreter over the IR, bounded by a step budget and
//! a call depth limit.

use std::cmp::Ordering;

use hashbrown::HashMap;
use thiserror::Error;

use super::Environment;
use crate::{
    config::ConstEvalConfig,
    index::Index,
    intern::Name,
    ir::{
        Block, Call, ConstValue, Expression, ExpressionKind, IntrinsicOp, LocalId, OperatorName,
        PrimitiveKind, Statement, Symbol, Type,
    },
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpreterError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {index} is out of bounds for length {length}")]
    IndexOutOfBounds { index: i32, length: usize },
    #[error("evaluation did not finish within {0} steps")]
    StepLimitExceeded(u64),
    #[error("calls nested deeper than {0} levels")]
    CallDepthExceeded(usize),
    #[error("`{0}` finished without returning a value")]
    MissingReturn(Name),
    #[error("initializer of `{0}` depends on its own value")]
    CyclicInitializer(Name),
    #[error("expected {expected} but found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("`{0}` cannot be evaluated at compile time")]
    UnboundSymbol(Symbol),
    #[error("cannot evaluate {0}")]
    Unsupported(String),
}

type Result<T> = std::result::Result<T, InterpreterError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Const(ConstValue),
}

impl Value {
    fn into_const(self) -> Result<ConstValue> {
        match self {
            Value::Const(value) => Ok(value),
            Value::Unit => Err(InterpreterError::TypeMismatch {
                expected: "a value".into(),
                found: "Unit".into(),
            }),
        }
    }
}

/// How evaluation of a node completed.
#[derive(Debug)]
enum Flow {
    Normal(Value),
    Break(Option<Name>),
    Continue(Option<Name>),
    Return(Value),
}

/// Unwraps a normal completion, propagating any jump
macro_rules! value {
    ($flow:expr) => {
        match $flow {
            Flow::Normal(value) => value,
            jump => return Ok(jump),
        }
    };
}

macro_rules! constant {
    ($flow:expr) => {
        value!($flow).into_const()?
    };
}

type Frame = HashMap<LocalId, ConstValue>;

pub struct Interpreter<'a> {
    env: &'a Environment,
    config: &'a ConstEvalConfig,
    /// Values of `const` fields computed so far, shared between candidates
    cache: &'a mut HashMap<Symbol, ConstValue>,
    steps: u64,
    depth: usize,
    initializing: Vec<Symbol>,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        env: &'a Environment,
        config: &'a ConstEvalConfig,
        cache: &'a mut HashMap<Symbol, ConstValue>,
    ) -> Self {
        Self {
            env,
            config,
            cache,
            steps: 0,
            depth: 0,
            initializing: Vec::new(),
        }
    }

    /// Evaluates a stand alone expression to a constant
    pub fn evaluate(&mut self, expression: &Expression) -> Result<ConstValue> {
        let mut frame = Frame::new();

        match self.expression(expression, &mut frame)? {
            Flow::Normal(value) => value.into_const(),
            Flow::Return(_) => Err(InterpreterError::Unsupported("return outside of a function".into())),
            Flow::Break(_) | Flow::Continue(_) => {
                Err(InterpreterError::Unsupported("jump outside of a loop".into()))
            }
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.config.step_limit {
            return Err(InterpreterError::StepLimitExceeded(self.config.step_limit));
        }
        Ok(())
    }

    fn expression(&mut self, expression: &Expression, frame: &mut Frame) -> Result<Flow> {
        self.tick()?;

        let value = match &expression.kind {
            ExpressionKind::Const(value) => Value::Const(value.clone()),
            ExpressionKind::GetLocal(local) => match frame.get(local) {
                Some(value) => Value::Const(value.clone()),
                None => {
                    return Err(InterpreterError::Unsupported(format!(
                        "read of local {local} before it has a value"
                    )));
                }
            },
            ExpressionKind::SetLocal { local, value } => {
                let value = constant!(self.expression(value, frame)?);
                frame.insert(*local, value);
                Value::Unit
            }
            ExpressionKind::GetField {
                field,
                receiver: None,
            } => Value::Const(self.const_field(*field)?),
            ExpressionKind::Call(call) => return self.call(call, frame),
            ExpressionKind::Intrinsic { op, arguments } => {
                let mut operands = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    operands.push(constant!(self.expression(argument, frame)?));
                }
                Value::Const(apply_intrinsic(op, operands)?)
            }
            ExpressionKind::StringConcat(segments) => {
                let mut units = Vec::new();
                for segment in segments {
                    constant!(self.expression(segment, frame)?).encode_utf16_into(&mut units);
                }
                Value::Const(ConstValue::String(String::from_utf16_lossy(&units)))
            }
            ExpressionKind::Block(block) => return self.block(block, frame),
            ExpressionKind::If {
                condition,
                then,
                otherwise,
            } => {
                if self.condition(condition, frame)? {
                    return self.expression(then, frame);
                }
                match otherwise {
                    Some(otherwise) => return self.expression(otherwise, frame),
                    None => Value::Unit,
                }
            }
            ExpressionKind::While(lp) => loop {
                match self.expression(&lp.condition, frame)? {
                    Flow::Normal(Value::Const(ConstValue::Boolean(true))) => {}
                    Flow::Normal(Value::Const(ConstValue::Boolean(false))) => break Value::Unit,
                    Flow::Normal(other) => return Err(not_a_condition(other)),
                    jump => return Ok(jump),
                }

                match self.block(&lp.body, frame)? {
                    Flow::Break(label) if targets(label, lp.label) => break Value::Unit,
                    Flow::Normal(_) => {}
                    Flow::Continue(label) if targets(label, lp.label) => {}
                    jump => return Ok(jump),
                }
            },
            ExpressionKind::DoWhile(lp) => loop {
                match self.block(&lp.body, frame)? {
                    Flow::Break(label) if targets(label, lp.label) => break Value::Unit,
                    Flow::Normal(_) => {}
                    Flow::Continue(label) if targets(label, lp.label) => {}
                    jump => return Ok(jump),
                }

                match self.expression(&lp.condition, frame)? {
                    Flow::Normal(Value::Const(ConstValue::Boolean(true))) => {}
                    Flow::Normal(Value::Const(ConstValue::Boolean(false))) => break Value::Unit,
                    Flow::Normal(other) => return Err(not_a_condition(other)),
                    jump => return Ok(jump),
                }
            },
            ExpressionKind::Break(label) => return Ok(Flow::Break(*label)),
            ExpressionKind::Continue(label) => return Ok(Flow::Continue(*label)),
            ExpressionKind::Return(value) => {
                let value = match value {
                    Some(value) => value!(self.expression(value, frame)?),
                    None => Value::Unit,
                };
                return Ok(Flow::Return(value));
            }
            other => return Err(InterpreterError::Unsupported(describe(other).into())),
        };

        Ok(Flow::Normal(value))
    }

    fn condition(&mut self, condition: &Expression, frame: &mut Frame) -> Result<bool> {
        match self.expression(condition, frame)? {
            Flow::Normal(Value::Const(ConstValue::Boolean(value))) => Ok(value),
            Flow::Normal(other) => Err(not_a_condition(other)),
            _ => Err(InterpreterError::Unsupported("jump inside a condition".into())),
        }
    }

    fn block(&mut self, block: &Block, frame: &mut Frame) -> Result<Flow> {
        for statement in &block.statements {
            match statement {
                Statement::Let {
                    local,
                    initializer: Some(initializer),
                } => {
                    let value = constant!(self.expression(initializer, frame)?);
                    frame.insert(*local, value);
                }
                Statement::Let {
                    initializer: None, ..
                }
                | Statement::EndScope(_) => {}
                Statement::Expression(expression) => {
                    value!(self.expression(expression, frame)?);
                }
            }
        }

        match &block.result {
            Some(result) => self.expression(result, frame),
            None => Ok(Flow::Normal(Value::Unit)),
        }
    }

    fn call(&mut self, call: &Call, frame: &mut Frame) -> Result<Flow> {
        let mut operands = Vec::with_capacity(call.arguments.len() + 1);
        if let Some(receiver) = &call.receiver {
            operands.push(constant!(self.expression(receiver, frame)?));
        }
        for argument in &call.arguments {
            operands.push(constant!(self.expression(argument, frame)?));
        }

        if let Some((kind, operator)) = self.env.builtin_operator(call) {
            let mut operands = operands.into_iter();
            let receiver = operands
                .next()
                .ok_or_else(|| InterpreterError::Unsupported(format!("`{operator}` without a receiver")))?;
            return apply_operator(kind, operator, receiver, operands.collect())
                .map(|value| Flow::Normal(Value::Const(value)));
        }

        let symbol = call
            .symbol()
            .ok_or_else(|| InterpreterError::Unsupported(format!("call of `{}`", call.name())))?;

        self.invoke(symbol, operands).map(Flow::Normal)
    }

    fn invoke(&mut self, symbol: Symbol, arguments: Vec<ConstValue>) -> Result<Value> {
        let (name, function) = self
            .env
            .function(symbol)
            .ok_or(InterpreterError::UnboundSymbol(symbol))?;
        let body = function
            .body
            .as_ref()
            .ok_or(InterpreterError::UnboundSymbol(symbol))?;

        if arguments.len() != function.parameters.len() {
            return Err(InterpreterError::TypeMismatch {
                expected: format!("{} arguments for `{name}`", function.parameters.len()),
                found: arguments.len().to_string(),
            });
        }

        if self.depth >= self.config.call_depth_limit {
            return Err(InterpreterError::CallDepthExceeded(self.config.call_depth_limit));
        }

        let mut callee_frame = arguments
            .into_iter()
            .enumerate()
            .map(|(i, value)| (LocalId::new(i), value))
            .collect::<Frame>();

        self.depth += 1;
        let flow = self.block(&body.block, &mut callee_frame);
        self.depth -= 1;

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal(value) if body.block.result.is_some() => Ok(value),
            Flow::Normal(_) if function.return_type == Type::Unit => Ok(Value::Unit),
            Flow::Normal(_) => Err(InterpreterError::MissingReturn(name)),
            Flow::Break(_) | Flow::Continue(_) => Err(InterpreterError::Unsupported(format!(
                "jump out of `{name}`"
            ))),
        }
    }

    fn const_field(&mut self, field: Symbol) -> Result<ConstValue> {
        if let Some(value) = self.cache.get(&field) {
            return Ok(value.clone());
        }

        let (name, initializer) = self
            .env
            .const_field(field)
            .ok_or(InterpreterError::UnboundSymbol(field))?;

        if self.initializing.contains(&field) {
            return Err(InterpreterError::CyclicInitializer(name));
        }

        self.initializing.push(field);
        let mut frame = Frame::new();
        let flow = self.block(&initializer.block, &mut frame);
        self.initializing.pop();

        let value = match flow? {
            Flow::Normal(value) => value.into_const()?,
            _ => return Err(InterpreterError::Unsupported(format!("jump in the initializer of `{name}`"))),
        };

        self.cache.insert(field, value.clone());
        Ok(value)
    }
}

fn targets(jump: Option<Name>, lp: Option<Name>) -> bool {
    jump.is_none() || jump == lp
}

fn not_a_condition(value: Value) -> InterpreterError {
    InterpreterError::TypeMismatch {
        expected: "Boolean".into(),
        found: match value {
            Value::Unit => "Unit".into(),
            Value::Const(value) => value.ty().to_string(),
        },
    }
}

fn describe(kind: &ExpressionKind) -> &'static str {
    match kind {
        ExpressionKind::GetField { .. } => "a field of an instance",
        ExpressionKind::SetField { .. } => "a field assignment",
        ExpressionKind::For(_) => "a for loop",
        ExpressionKind::Range(_) => "a range",
        ExpressionKind::ArrayLiteral(_) => "an array",
        ExpressionKind::AnnotationConstructor { .. } => "an annotation",
        _ => "this expression",
    }
}

fn mismatch(expected: impl ToString, found: &ConstValue) -> InterpreterError {
    InterpreterError::TypeMismatch {
        expected: expected.to_string(),
        found: found.ty().to_string(),
    }
}

fn apply_intrinsic(op: &IntrinsicOp, operands: Vec<ConstValue>) -> Result<ConstValue> {
    let mut operands = operands.into_iter();
    let mut next = || {
        operands
            .next()
            .ok_or_else(|| InterpreterError::Unsupported(format!("`{op}` with missing operands")))
    };

    match op {
        IntrinsicOp::Primitive { kind, operator } => {
            let receiver = next()?;
            let mut arguments = Vec::new();
            for _ in 0..operator.arity() {
                arguments.push(next()?);
            }
            apply_operator(*kind, *operator, receiver, arguments)
        }
        IntrinsicOp::StringLength => match next()? {
            ConstValue::String(text) => Ok(ConstValue::Int(text.encode_utf16().count() as i32)),
            other => Err(mismatch("String", &other)),
        },
        IntrinsicOp::StringGet => match (next()?, next()?) {
            (ConstValue::String(text), ConstValue::Int(index)) => char_at(&text, index),
            (other, _) => Err(mismatch("String", &other)),
        },
        IntrinsicOp::StringEquals | IntrinsicOp::StructuralEquals => {
            let (left, right) = (next()?, next()?);
            Ok(ConstValue::Boolean(left == right))
        }
        IntrinsicOp::ProgressionLastElement(kind) => {
            let (first, last, step) = (next()?, next()?, next()?);
            progression_last_element(*kind, &first, &last, &step)
        }
        other => Err(InterpreterError::Unsupported(format!("intrinsic `{other}`"))),
    }
}

fn char_at(text: &str, index: i32) -> Result<ConstValue> {
    let units = text.encode_utf16().collect::<Vec<_>>();

    usize::try_from(index)
        .ok()
        .and_then(|i| units.get(i))
        .map(|unit| ConstValue::Char(*unit))
        .ok_or(InterpreterError::IndexOutOfBounds {
            index,
            length: units.len(),
        })
}

/// Integral value of Byte, Short, Int, Long and Char constants
fn integral(value: &ConstValue) -> Option<i64> {
    match value {
        ConstValue::Byte(v) => Some(i64::from(*v)),
        ConstValue::Short(v) => Some(i64::from(*v)),
        ConstValue::Int(v) => Some(i64::from(*v)),
        ConstValue::Long(v) => Some(*v),
        ConstValue::Char(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn floating(value: &ConstValue) -> Option<f64> {
    match value {
        ConstValue::Float(v) => Some(f64::from(*v)),
        ConstValue::Double(v) => Some(*v),
        other => integral(other).map(|v| v as f64),
    }
}

/// Chars are UTF-16 code units, so only the low 16 bits of `code` survive
fn char_from(code: i64) -> ConstValue {
    ConstValue::Char(code as u16)
}

fn convert(value: &ConstValue, target: PrimitiveKind) -> Result<ConstValue> {
    let from_float = matches!(value, ConstValue::Float(_) | ConstValue::Double(_));

    // Floating point values go through Int (or Long) first
    let whole = match (from_float, floating(value), integral(value)) {
        (true, Some(v), _) if target == PrimitiveKind::Long => v as i64,
        (true, Some(v), _) => i64::from(v as i32),
        (false, _, Some(v)) => v,
        _ => return Err(mismatch("a number", value)),
    };

    Ok(match target {
        PrimitiveKind::Byte => ConstValue::Byte(whole as i8),
        PrimitiveKind::Short => ConstValue::Short(whole as i16),
        PrimitiveKind::Int => ConstValue::Int(whole as i32),
        PrimitiveKind::Long => ConstValue::Long(whole),
        PrimitiveKind::Char => char_from(whole),
        // One rounding step from the source value
        PrimitiveKind::Float => ConstValue::Float(match value {
            ConstValue::Float(v) => *v,
            ConstValue::Double(v) => *v as f32,
            _ => whole as f32,
        }),
        PrimitiveKind::Double => {
            ConstValue::Double(floating(value).ok_or_else(|| mismatch("a number", value))?)
        }
        PrimitiveKind::Boolean => return Err(mismatch("a number", value)),
    })
}

/// Orders two values. With `total` floating point values follow `compareTo`:
/// `-0.0` sorts below `0.0` and NaN above everything, equal to itself.
/// Otherwise they follow IEEE 754 and any NaN makes them unordered.
fn compare(receiver: &ConstValue, argument: &ConstValue, total: bool) -> Result<Option<Ordering>> {
    match (receiver, argument) {
        (ConstValue::Float(_) | ConstValue::Double(_), _)
        | (_, ConstValue::Float(_) | ConstValue::Double(_)) => {
            let left = floating(receiver).ok_or_else(|| mismatch("a number", receiver))?;
            let right = floating(argument).ok_or_else(|| mismatch("a number", argument))?;
            Ok(match (total, left.is_nan(), right.is_nan()) {
                (false, _, _) => left.partial_cmp(&right),
                (true, true, true) => Some(Ordering::Equal),
                (true, true, false) => Some(Ordering::Greater),
                (true, false, true) => Some(Ordering::Less),
                (true, false, false) => Some(left.total_cmp(&right)),
            })
        }
        (ConstValue::Boolean(left), ConstValue::Boolean(right)) => Ok(Some(left.cmp(right))),
        _ => {
            let left = integral(receiver).ok_or_else(|| mismatch("a number", receiver))?;
            let right = integral(argument).ok_or_else(|| mismatch("a number", argument))?;
            Ok(Some(left.cmp(&right)))
        }
    }
}

/// Applies a builtin operator with the semantics of the target platform:
/// integer arithmetic wraps, shifts mask their distance, integer division by
/// zero fails.
pub fn apply_operator(
    kind: PrimitiveKind,
    operator: OperatorName,
    receiver: ConstValue,
    arguments: Vec<ConstValue>,
) -> Result<ConstValue> {
    if !kind.supports_operator(operator) {
        return Err(InterpreterError::Unsupported(format!("{kind}.{operator}")));
    }
    if receiver.ty() != Type::Primitive(kind) {
        return Err(mismatch(kind, &receiver));
    }
    if arguments.len() != operator.arity() {
        return Err(InterpreterError::Unsupported(format!(
            "{kind}.{operator} with {} arguments",
            arguments.len()
        )));
    }

    if let Some(target) = operator.conversion_target() {
        return convert(&receiver, target);
    }

    let argument = arguments.into_iter().next();

    match operator {
        OperatorName::Equals => {
            let argument = argument.ok_or_else(|| mismatch(kind, &receiver))?;
            return Ok(ConstValue::Boolean(match (&receiver, &argument) {
                (ConstValue::Double(l), ConstValue::Double(r)) => l == r,
                (ConstValue::Float(l), ConstValue::Float(r)) => l == r,
                (l, r) => l == r,
            }));
        }
        OperatorName::CompareTo
        | OperatorName::Less
        | OperatorName::LessOrEqual
        | OperatorName::Greater
        | OperatorName::GreaterOrEqual => {
            let argument = argument.ok_or_else(|| mismatch(kind, &receiver))?;
            let total = operator == OperatorName::CompareTo;
            let ordering = compare(&receiver, &argument, total)?;
            return Ok(match (operator, ordering) {
                (OperatorName::CompareTo, Some(ordering)) => ConstValue::Int(ordering as i32),
                (OperatorName::CompareTo, None) => {
                    return Err(InterpreterError::Unsupported("an unordered compareTo".into()));
                }
                (_, None) => ConstValue::Boolean(false),
                (OperatorName::Less, Some(ordering)) => ConstValue::Boolean(ordering.is_lt()),
                (OperatorName::LessOrEqual, Some(ordering)) => ConstValue::Boolean(ordering.is_le()),
                (OperatorName::Greater, Some(ordering)) => ConstValue::Boolean(ordering.is_gt()),
                (_, Some(ordering)) => ConstValue::Boolean(ordering.is_ge()),
            });
        }
        _ => {}
    }

    match (receiver, argument) {
        (ConstValue::Boolean(value), None) => Ok(ConstValue::Boolean(!value)),
        (ConstValue::Boolean(left), Some(ConstValue::Boolean(right))) => {
            Ok(ConstValue::Boolean(match operator {
                OperatorName::And => left & right,
                OperatorName::Or => left | right,
                _ => left ^ right,
            }))
        }
        (ConstValue::Char(value), None) => {
            let code = i64::from(value);
            Ok(char_from(if operator == OperatorName::Inc { code + 1 } else { code - 1 }))
        }
        (ConstValue::Int(value), argument) => {
            let argument = argument.map(|a| integral(&a).ok_or_else(|| mismatch(kind, &a))).transpose()?;
            integer_operator(operator, i64::from(value), argument, 32)
                .map(|v| ConstValue::Int(v as i32))
        }
        (ConstValue::Long(value), argument) => {
            let argument = argument.map(|a| integral(&a).ok_or_else(|| mismatch(kind, &a))).transpose()?;
            integer_operator(operator, value, argument, 64).map(ConstValue::Long)
        }
        (ConstValue::Double(value), argument) => {
            let argument = argument.map(|a| floating(&a).ok_or_else(|| mismatch(kind, &a))).transpose()?;
            float_operator(operator, value, argument).map(ConstValue::Double)
        }
        (ConstValue::Float(value), argument) => {
            let argument = argument.map(|a| floating(&a).ok_or_else(|| mismatch(kind, &a))).transpose()?;
            float_operator(operator, f64::from(value), argument).map(|v| ConstValue::Float(v as f32))
        }
        (receiver, _) => Err(InterpreterError::Unsupported(format!(
            "{operator} on {}",
            receiver.ty()
        ))),
    }
}

/// Integer arithmetic on `bits` wide values, computed in 64 bits and
/// truncated by the caller
fn integer_operator(operator: OperatorName, value: i64, argument: Option<i64>, bits: u32) -> Result<i64> {
    let truncate = |v: i64| if bits == 32 { i64::from(v as i32) } else { v };
    let rhs = || argument.ok_or_else(|| InterpreterError::Unsupported(format!("{operator} without an argument")));

    Ok(match operator {
        OperatorName::Plus => truncate(value.wrapping_add(rhs()?)),
        OperatorName::Minus => truncate(value.wrapping_sub(rhs()?)),
        OperatorName::Times => truncate(value.wrapping_mul(rhs()?)),
        OperatorName::Div | OperatorName::Rem => {
            let divisor = rhs()?;
            if divisor == 0 {
                return Err(InterpreterError::DivisionByZero);
            }
            if bits == 32 {
                let (value, divisor) = (value as i32, divisor as i32);
                i64::from(if operator == OperatorName::Div {
                    value.wrapping_div(divisor)
                } else {
                    value.wrapping_rem(divisor)
                })
            } else if operator == OperatorName::Div {
                value.wrapping_div(divisor)
            } else {
                value.wrapping_rem(divisor)
            }
        }
        OperatorName::And => value & rhs()?,
        OperatorName::Or => value | rhs()?,
        OperatorName::Xor => value ^ rhs()?,
        OperatorName::Shl | OperatorName::Shr | OperatorName::Ushr => {
            let distance = (rhs()? as u32) & (bits - 1);
            match (operator, bits) {
                (OperatorName::Shl, 32) => i64::from((value as i32).wrapping_shl(distance)),
                (OperatorName::Shr, 32) => i64::from((value as i32).wrapping_shr(distance)),
                (_, 32) => i64::from(((value as i32 as u32) >> distance) as i32),
                (OperatorName::Shl, _) => value.wrapping_shl(distance),
                (OperatorName::Shr, _) => value.wrapping_shr(distance),
                _ => ((value as u64) >> distance) as i64,
            }
        }
        OperatorName::Inv => !value,
        OperatorName::UnaryMinus => truncate(value.wrapping_neg()),
        OperatorName::UnaryPlus => value,
        OperatorName::Inc => truncate(value.wrapping_add(1)),
        OperatorName::Dec => truncate(value.wrapping_sub(1)),
        other => return Err(InterpreterError::Unsupported(format!("integer {other}"))),
    })
}

fn float_operator(operator: OperatorName, value: f64, argument: Option<f64>) -> Result<f64> {
    let rhs = || argument.ok_or_else(|| InterpreterError::Unsupported(format!("{operator} without an argument")));

    Ok(match operator {
        OperatorName::Plus => value + rhs()?,
        OperatorName::Minus => value - rhs()?,
        OperatorName::Times => value * rhs()?,
        OperatorName::Div => value / rhs()?,
        OperatorName::Rem => value % rhs()?,
        OperatorName::UnaryMinus => -value,
        OperatorName::UnaryPlus => value,
        OperatorName::Inc => value + 1.0,
        OperatorName::Dec => value - 1.0,
        other => return Err(InterpreterError::Unsupported(format!("floating point {other}"))),
    })
}

/// Last element of the progression from `first` towards `last` by `step`
fn progression_last_element(
    kind: PrimitiveKind,
    first: &ConstValue,
    last: &ConstValue,
    step: &ConstValue,
) -> Result<ConstValue> {
    let (Some(first), Some(last), Some(step)) = (integral(first), integral(last), integral(step)) else {
        return Err(mismatch(kind, first));
    };

    if step == 0 {
        return Err(InterpreterError::Unsupported("a progression with step 0".into()));
    }

    // Differences of Long bounds need more than 64 bits
    let (first, last, step) = (i128::from(first), i128::from(last), i128::from(step));
    let element = if step > 0 {
        if first >= last { last } else { last - (last - first).rem_euclid(step) }
    } else if first <= last {
        last
    } else {
        last + (first - last).rem_euclid(-step)
    };

    // The last element lies between the bounds, so it fits their type
    match kind {
        PrimitiveKind::Int => Ok(ConstValue::Int(element as i32)),
        PrimitiveKind::Long => Ok(ConstValue::Long(element as i64)),
        PrimitiveKind::Char => Ok(char_from(element as i64)),
        other => Err(InterpreterError::Unsupported(format!("a progression of {other}"))),
    }
}
