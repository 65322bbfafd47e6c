use hashbrown::{HashMap, HashSet};

use super::Environment;
use crate::{
    config::EvaluationMode,
    index::Index,
    ir::{Block, Call, Expression, ExpressionKind, IntrinsicOp, LocalId, Statement, Symbol, Type},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    /// Body is being checked, at this nesting level
    Checking(usize),
    Accepted,
    Rejected,
}

/// Decides whether an expression may be handed to the interpreter under a
/// given [`EvaluationMode`].
///
/// A call of a function whose body is still being checked is accepted
/// optimistically. A function whose acceptance relied on such a call is
/// only remembered once the outermost function of that recursion is
/// accepted too.
pub struct Checker<'a> {
    env: &'a Environment,
    mode: EvaluationMode,
    /// Locals that get a value inside the expression being checked
    bound: HashSet<LocalId>,
    in_function: bool,
    functions: HashMap<Symbol, Verdict>,
    /// Number of function bodies being checked
    depth: usize,
    /// Shallowest level of an unfinished function the current body relies on
    assumed: usize,
}

impl<'a> Checker<'a> {
    pub fn new(env: &'a Environment, mode: EvaluationMode) -> Self {
        Self {
            env,
            mode,
            bound: HashSet::new(),
            in_function: false,
            functions: HashMap::new(),
            depth: 0,
            assumed: usize::MAX,
        }
    }

    /// Whether `expression` is worth folding: not already a literal, of a
    /// type literals can have, and interpretable.
    pub fn is_candidate(&mut self, expression: &Expression) -> bool {
        if expression.is_const()
            || !matches!(expression.ty, Type::Primitive(_) | Type::String)
        {
            return false;
        }

        self.bound.clear();
        self.in_function = false;
        self.expression(expression)
    }

    fn expression(&mut self, expression: &Expression) -> bool {
        match &expression.kind {
            ExpressionKind::Const(_) => true,
            ExpressionKind::GetLocal(local) => self.bound.contains(local),
            ExpressionKind::SetLocal { local, value } => {
                self.bound.contains(local) && self.expression(value)
            }
            ExpressionKind::GetField {
                field,
                receiver: None,
            } => self.env.const_field(*field).is_some(),
            ExpressionKind::Call(call) => self.call(call),
            ExpressionKind::Intrinsic { op, arguments } => {
                is_interpretable(op) && arguments.iter().all(|argument| self.expression(argument))
            }
            ExpressionKind::StringConcat(segments) => {
                segments.iter().all(|segment| self.expression(segment))
            }
            ExpressionKind::Block(block) => self.block(block),
            ExpressionKind::If {
                condition,
                then,
                otherwise,
            } => {
                self.expression(condition)
                    && self.expression(then)
                    && otherwise
                        .as_deref()
                        .is_none_or(|otherwise| self.expression(otherwise))
            }
            ExpressionKind::While(lp) | ExpressionKind::DoWhile(lp) => {
                // The condition of a do-while sees the locals of the body
                self.in_function && self.block(&lp.body) && self.expression(&lp.condition)
            }
            ExpressionKind::Break(_) | ExpressionKind::Continue(_) => self.in_function,
            ExpressionKind::Return(value) => {
                self.in_function && value.as_deref().is_none_or(|value| self.expression(value))
            }
            _ => false,
        }
    }

    fn block(&mut self, block: &Block) -> bool {
        for statement in &block.statements {
            let accepted = match statement {
                Statement::Let { local, initializer } => {
                    let accepted = initializer
                        .as_ref()
                        .is_none_or(|initializer| self.expression(initializer));
                    self.bound.insert(*local);
                    accepted
                }
                Statement::Expression(expression) => self.expression(expression),
                Statement::EndScope(_) => true,
            };

            if !accepted {
                return false;
            }
        }

        block
            .result
            .as_deref()
            .is_none_or(|result| self.expression(result))
    }

    fn call(&mut self, call: &Call) -> bool {
        let operands_accepted = call
            .receiver
            .as_deref()
            .into_iter()
            .chain(&call.arguments)
            .all(|operand| self.expression(operand));

        if !operands_accepted {
            return false;
        }

        if let Some((kind, operator)) = self.env.builtin_operator(call) {
            return kind.supports_operator(operator);
        }

        call.symbol().is_some_and(|symbol| self.function(symbol))
    }

    fn function(&mut self, symbol: Symbol) -> bool {
        match self.functions.get(&symbol) {
            Some(Verdict::Accepted) => return true,
            Some(Verdict::Rejected) => return false,
            Some(Verdict::Checking(level)) => {
                self.assumed = self.assumed.min(*level);
                return true;
            }
            None => {}
        }

        let Some((_, function)) = self.env.function(symbol) else {
            return false;
        };

        let allowed = match self.mode {
            EvaluationMode::Builtins => false,
            EvaluationMode::IntrinsicConst => function.is_intrinsic_const,
            EvaluationMode::Full => true,
        };
        let Some(body) = function.body.as_ref().filter(|_| allowed) else {
            self.functions.insert(symbol, Verdict::Rejected);
            return false;
        };

        let level = self.depth;
        self.functions.insert(symbol, Verdict::Checking(level));
        self.depth += 1;

        let parameters = (0..function.parameters.len()).map(LocalId::new).collect();
        let bound = std::mem::replace(&mut self.bound, parameters);
        let in_function = std::mem::replace(&mut self.in_function, true);
        let assumed = std::mem::replace(&mut self.assumed, usize::MAX);

        let accepted = self.block(&body.block);

        self.bound = bound;
        self.in_function = in_function;
        self.depth -= 1;
        let relied_on = std::mem::replace(&mut self.assumed, assumed);

        if !accepted {
            self.functions.insert(symbol, Verdict::Rejected);
        } else if relied_on < level {
            // Provisional until the caller it relied on is decided
            self.functions.remove(&symbol);
            self.assumed = self.assumed.min(relied_on);
        } else {
            self.functions.insert(symbol, Verdict::Accepted);
        }

        accepted
    }
}

fn is_interpretable(op: &IntrinsicOp) -> bool {
    matches!(
        op,
        IntrinsicOp::Primitive { .. }
            | IntrinsicOp::StringLength
            | IntrinsicOp::StringGet
            | IntrinsicOp::StringEquals
            | IntrinsicOp::StructuralEquals
            | IntrinsicOp::ProgressionLastElement(_)
    )
}
