//! Flattens nested string templates and merges adjacent literal segments.

use super::{BodyLoweringPass, FileContext};
use crate::{
    error::PassError,
    ir::{
        Body, ConstValue, Expression, ExpressionKind,
        visit::{MutVisitor, walk_expression_mut},
    },
};

pub struct FlattenStringConcatenation;

impl BodyLoweringPass for FlattenStringConcatenation {
    fn lower_body(&self, body: &mut Body, _ctx: &mut FileContext<'_>) -> Result<(), PassError> {
        Flattener.visit_block_mut(&mut body.block)
    }
}

struct Flattener;

impl MutVisitor for Flattener {
    fn visit_expression_mut(&mut self, expression: &mut Expression) -> Result<(), PassError> {
        walk_expression_mut(self, expression)?;

        let ExpressionKind::StringConcat(segments) = &mut expression.kind else {
            return Ok(());
        };

        let flat = flatten(std::mem::take(segments));
        *segments = merge_constant_segments(flat);

        // A template of a single literal is that literal
        let literal = match segments.as_slice() {
            [single] if matches!(single.as_const(), Some(ConstValue::String(_))) => {
                Some(single.clone())
            }
            _ => None,
        };

        if let Some(literal) = literal {
            let span = expression.span;
            *expression = literal.with_span(span);
        }

        Ok(())
    }
}

/// Splices the segments of nested concatenations into their parent.
fn flatten(segments: Vec<Expression>) -> Vec<Expression> {
    let mut flat = Vec::with_capacity(segments.len());

    for segment in segments {
        match segment.kind {
            ExpressionKind::StringConcat(inner) => flat.extend(flatten(inner)),
            _ => flat.push(segment),
        }
    }

    flat
}

/// Merges every run of adjacent constant segments into one string literal,
/// left to right. Non constant segments are kept in place and separate the
/// runs. Empty literals are dropped unless nothing else is left.
pub fn merge_constant_segments(segments: Vec<Expression>) -> Vec<Expression> {
    let mut merged: Vec<Expression> = Vec::with_capacity(segments.len());
    let mut pending: Option<(Vec<u16>, Expression)> = None;

    for segment in segments {
        match segment.as_const() {
            Some(value) => match &mut pending {
                Some((units, _)) => value.encode_utf16_into(units),
                None => {
                    let mut units = Vec::new();
                    value.encode_utf16_into(&mut units);
                    pending = Some((units, segment));
                }
            },
            None => {
                merged.extend(pending.take().and_then(into_literal));
                merged.push(segment);
            }
        }
    }
    merged.extend(pending.take().and_then(into_literal));

    if merged.is_empty() {
        merged.push(crate::ir::builder::string(""));
    }

    merged
}

/// The literal for a merged run, keeping the span of its first segment
fn into_literal((units, first): (Vec<u16>, Expression)) -> Option<Expression> {
    if units.is_empty() {
        return None;
    }

    let text = String::from_utf16_lossy(&units);
    Some(Expression::constant(ConstValue::String(text), first.span))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::LoweringConfig,
        index::{Index, IndexVec},
        ir::{
            Block, FileId, LocalId, Span, SymbolTable, Type,
            builder::{self, string},
        },
    };

    fn concat(segments: Vec<Expression>) -> Expression {
        Expression::new(
            ExpressionKind::StringConcat(segments),
            Type::String,
            Span::DUMMY,
        )
    }

    fn x() -> Expression {
        builder::get_local(LocalId::new(0), Type::INT)
    }

    #[test]
    fn folding_stops_at_non_constant_segments() {
        let merged = merge_constant_segments(vec![string("a"), x(), string("b"), string("c")]);

        assert_eq!(merged, vec![string("a"), x(), string("bc")]);
    }

    #[test]
    fn literals_of_other_types_are_stringified() {
        let merged = merge_constant_segments(vec![
            string("n="),
            builder::int(4),
            builder::boolean(true),
            x(),
            string(""),
        ]);

        assert_eq!(merged, vec![string("n=4true"), x()]);
    }

    #[test]
    fn adjacent_surrogate_chars_merge_into_one_code_point() {
        let char = |unit| Expression::constant(ConstValue::Char(unit), Span::DUMMY);

        let merged = merge_constant_segments(vec![string("<"), char(0xD83D), char(0xDE00), string(">")]);

        assert_eq!(merged, vec![string("<😀>")]);
    }

    #[test]
    fn nested_templates_are_flattened() {
        let mut body = Body {
            locals: IndexVec::new(),
            block: Block::new(
                Vec::new(),
                Some(concat(vec![
                    string("<"),
                    concat(vec![string("a"), concat(vec![string("b")])]),
                    string(">"),
                ])),
            ),
        };

        let symbols = SymbolTable::new();
        let config = LoweringConfig::default();
        let mut ctx = FileContext::new(FileId::new(0), &symbols, &config);
        FlattenStringConcatenation
            .lower_body(&mut body, &mut ctx)
            .unwrap();

        assert_eq!(body.block.result.as_deref(), Some(&string("<ab>")));
    }
}
