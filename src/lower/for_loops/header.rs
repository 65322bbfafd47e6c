//! The three flavors of loop header. A header allocates the iteration state
//! when it is created and knows how to produce the current element, advance
//! the state and test for the end of the iteration.

use super::LoopGenerator;
use crate::{
    error::PassError,
    intern::Name,
    ir::{
        Block, Expression, ExpressionKind, IntrinsicOp, IteratorProtocol, LocalId, OperatorName,
        PrimitiveKind, Range, RangeKind, Type,
        builder::{self, builtin},
    },
};

pub enum LoopHeader {
    Progression(ProgressionHeader),
    Indexed(IndexedHeader),
    Iterator(IteratorHeader),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

pub struct ProgressionHeader {
    kind: PrimitiveKind,
    direction: Direction,
    induction_variable: LocalId,
    /// Last element reached, inclusive
    last: LocalId,
    step: Option<LocalId>,
    not_empty: Expression,
}

pub struct IndexedHeader {
    container: LocalId,
    length: LocalId,
    index: LocalId,
    get: IntrinsicOp,
    element_type: Type,
}

pub struct IteratorHeader {
    protocol: IteratorProtocol,
    iterator: LocalId,
    element_type: Type,
}

impl LoopHeader {
    /// Picks the flavor from the shape and type of `source` and allocates
    /// its temporaries.
    pub fn new(
        source: Expression,
        protocol: Option<IteratorProtocol>,
        generator: &mut LoopGenerator<'_>,
    ) -> Result<Self, PassError> {
        match source.kind {
            ExpressionKind::Range(range) => {
                ProgressionHeader::new(range, generator).map(LoopHeader::Progression)
            }
            _ if matches!(source.ty, Type::Array(_) | Type::String) => {
                IndexedHeader::new(source, generator).map(LoopHeader::Indexed)
            }
            _ => IteratorHeader::new(source, protocol, generator).map(LoopHeader::Iterator),
        }
    }

    /// Value of the loop variable for the current iteration
    pub fn next_value(&self, generator: &LoopGenerator<'_>) -> Expression {
        match self {
            LoopHeader::Progression(header) => generator.load(header.induction_variable),
            LoopHeader::Indexed(header) => builder::intrinsic(
                header.get.clone(),
                vec![generator.load(header.container), generator.load(header.index)],
                header.element_type.clone(),
            ),
            LoopHeader::Iterator(header) => builder::call(
                header.protocol.next,
                "next",
                Some((generator.load(header.iterator), header.iterator_type())),
                Vec::new(),
                header.element_type.clone(),
            ),
        }
    }

    /// Moves the iteration state past the current element. Runs before the
    /// body so `continue` does not skip it.
    pub fn advance(&self, generator: &LoopGenerator<'_>) -> Result<Option<Expression>, PassError> {
        match self {
            LoopHeader::Progression(header) => header.advance(generator).map(Some),
            LoopHeader::Indexed(header) => {
                let next = builtin(
                    PrimitiveKind::Int,
                    OperatorName::Plus,
                    generator.load(header.index),
                    vec![builder::int(1)],
                )?;
                Ok(Some(builder::set_local(header.index, next)))
            }
            LoopHeader::Iterator(_) => Ok(None),
        }
    }

    /// Wraps `body` into the loop. `current` holds the value of the current
    /// element inside the body.
    pub fn build_loop(
        self,
        label: Option<Name>,
        body: Block,
        current: LocalId,
        generator: &LoopGenerator<'_>,
    ) -> Result<Expression, PassError> {
        match self {
            LoopHeader::Progression(header) => {
                let reached_last = builtin(
                    header.kind,
                    OperatorName::Equals,
                    generator.load(current),
                    vec![generator.load(header.last)],
                )?;
                let condition = builtin(
                    PrimitiveKind::Boolean,
                    OperatorName::Not,
                    reached_last,
                    Vec::new(),
                )?;

                Ok(builder::if_then(
                    header.not_empty,
                    builder::do_while_loop(label, body, condition),
                ))
            }
            LoopHeader::Indexed(header) => {
                let condition = builtin(
                    PrimitiveKind::Int,
                    OperatorName::Less,
                    generator.load(header.index),
                    vec![generator.load(header.length)],
                )?;

                Ok(builder::while_loop(label, condition, body))
            }
            LoopHeader::Iterator(header) => {
                let condition = builder::call(
                    header.protocol.has_next,
                    "hasNext",
                    Some((generator.load(header.iterator), header.iterator_type())),
                    Vec::new(),
                    Type::BOOLEAN,
                );

                Ok(builder::while_loop(label, condition, body))
            }
        }
    }
}

impl ProgressionHeader {
    fn new(range: Range, generator: &mut LoopGenerator<'_>) -> Result<Self, PassError> {
        let Range {
            kind: range_kind,
            start,
            end,
            step,
        } = range;

        let kind = start
            .ty
            .as_primitive()
            .filter(|kind| {
                matches!(
                    kind,
                    PrimitiveKind::Int | PrimitiveKind::Long | PrimitiveKind::Char
                )
            })
            .ok_or_else(|| {
                PassError::Malformed(format!("cannot iterate over a range of {}", start.ty))
            })?;

        if end.ty != start.ty {
            return Err(PassError::Malformed(format!(
                "range bounds have different types {} and {}",
                start.ty, end.ty
            )));
        }

        let first = generator.temporary("first", *start, false)?;
        let bound = generator.temporary(
            if range_kind == RangeKind::Until { "bound" } else { "last" },
            *end,
            false,
        )?;

        let compare_bounds = |operator| {
            builtin(
                kind,
                operator,
                generator.load(first),
                vec![generator.load(bound)],
            )
        };

        let (direction, not_empty, last) = match range_kind {
            RangeKind::RangeTo => (
                Direction::Up,
                compare_bounds(OperatorName::LessOrEqual)?,
                bound,
            ),
            RangeKind::DownTo => (
                Direction::Down,
                compare_bounds(OperatorName::GreaterOrEqual)?,
                bound,
            ),
            // `first < bound` guards the loop, so `bound - 1` is only used
            // when it cannot wrap around
            RangeKind::Until => {
                let not_empty = compare_bounds(OperatorName::Less)?;
                let last = generator.temporary(
                    "last",
                    builtin(kind, OperatorName::Dec, generator.load(bound), Vec::new())?,
                    false,
                )?;
                (Direction::Up, not_empty, last)
            }
        };

        let (step, last) = match step {
            Some(step) => {
                let step_kind = step_kind(kind);
                if step.ty != Type::Primitive(step_kind) {
                    return Err(PassError::Malformed(format!(
                        "step of a {kind} range must be {step_kind}, found {}",
                        step.ty
                    )));
                }

                let step = generator.temporary("step", *step, false)?;
                let signed_step = match direction {
                    Direction::Up => generator.load(step),
                    Direction::Down => builtin(
                        step_kind,
                        OperatorName::UnaryMinus,
                        generator.load(step),
                        Vec::new(),
                    )?,
                };

                let last_element = generator.temporary(
                    "lastElement",
                    builder::intrinsic(
                        IntrinsicOp::ProgressionLastElement(kind),
                        vec![generator.load(first), generator.load(last), signed_step],
                        Type::Primitive(kind),
                    ),
                    false,
                )?;

                (Some(step), last_element)
            }
            None => (None, last),
        };

        let induction_variable =
            generator.temporary("inductionVariable", generator.load(first), true)?;

        Ok(Self {
            kind,
            direction,
            induction_variable,
            last,
            step,
            not_empty,
        })
    }

    fn advance(&self, generator: &LoopGenerator<'_>) -> Result<Expression, PassError> {
        let current = generator.load(self.induction_variable);

        let next = match (self.step, self.direction) {
            (None, Direction::Up) => builtin(self.kind, OperatorName::Inc, current, Vec::new())?,
            (None, Direction::Down) => builtin(self.kind, OperatorName::Dec, current, Vec::new())?,
            (Some(step), direction) => {
                let operator = match direction {
                    Direction::Up => OperatorName::Plus,
                    Direction::Down => OperatorName::Minus,
                };

                if self.kind == PrimitiveKind::Char {
                    // Characters only step by one natively
                    let code = builtin(PrimitiveKind::Char, OperatorName::ToInt, current, Vec::new())?;
                    let moved = builtin(PrimitiveKind::Int, operator, code, vec![generator.load(step)])?;
                    builtin(PrimitiveKind::Int, OperatorName::ToChar, moved, Vec::new())?
                } else {
                    builtin(self.kind, operator, current, vec![generator.load(step)])?
                }
            }
        };

        Ok(builder::set_local(self.induction_variable, next))
    }
}

fn step_kind(kind: PrimitiveKind) -> PrimitiveKind {
    match kind {
        PrimitiveKind::Long => PrimitiveKind::Long,
        _ => PrimitiveKind::Int,
    }
}

impl IndexedHeader {
    fn new(source: Expression, generator: &mut LoopGenerator<'_>) -> Result<Self, PassError> {
        let (get, size, element_type, name) = match &source.ty {
            Type::Array(element) => (
                IntrinsicOp::ArrayGet,
                IntrinsicOp::ArraySize,
                (**element).clone(),
                "array",
            ),
            Type::String => (
                IntrinsicOp::StringGet,
                IntrinsicOp::StringLength,
                Type::CHAR,
                "string",
            ),
            other => {
                return Err(PassError::Malformed(format!(
                    "cannot index into a value of type {other}"
                )));
            }
        };

        // A local that can not be reassigned by the body is iterated directly
        let reusable = match &source.kind {
            ExpressionKind::GetLocal(local) if !generator.is_mutable(*local) => Some(*local),
            _ => None,
        };
        let container = match reusable {
            Some(local) => local,
            None => generator.temporary(name, source, false)?,
        };

        let length = generator.temporary(
            "length",
            builder::intrinsic(size, vec![generator.load(container)], Type::INT),
            false,
        )?;
        let index = generator.temporary("index", builder::int(0), true)?;

        Ok(Self {
            container,
            length,
            index,
            get,
            element_type,
        })
    }
}

impl IteratorHeader {
    fn new(
        source: Expression,
        protocol: Option<IteratorProtocol>,
        generator: &mut LoopGenerator<'_>,
    ) -> Result<Self, PassError> {
        let protocol = protocol.ok_or_else(|| {
            PassError::Malformed(format!(
                "cannot iterate over {} without iterator members",
                source.ty
            ))
        })?;

        let element_type = source.ty.element_type().unwrap_or(Type::Any);
        let source_type = source.ty.clone();

        let iterator = generator.temporary(
            "iterator",
            builder::call(
                protocol.iterator,
                "iterator",
                Some((source, source_type)),
                Vec::new(),
                Type::Iterator(Box::new(element_type.clone())),
            ),
            false,
        )?;

        Ok(Self {
            protocol,
            iterator,
            element_type,
        })
    }

    fn iterator_type(&self) -> Type {
        Type::Iterator(Box::new(self.element_type.clone()))
    }
}
