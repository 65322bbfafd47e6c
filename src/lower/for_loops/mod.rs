//! Lowers `for` loops over progressions, arrays, strings and iterators into
//! `while`/`do-while` loops over explicit iteration state.
//!
//! Lowering one loop walks a fixed sequence of states:
//!
//! 1. `BeforeLoop`: the header allocates the iteration state (bounds, index,
//!    iterator). Every temporary registers a leave task.
//! 2. `BeforeBody`: the current element is computed and the loop variables
//!    are declared with their value, then the iteration state advances.
//! 3. `Body`: the source body is appended unchanged.
//! 4. `AfterBody`: the header builds the loop and its exit test.
//! 5. `AfterLoop`: the leave tasks run in reverse order of registration.

mod header;

use strum::Display;

use self::header::LoopHeader;
use super::{BodyLoweringPass, FileContext};
use crate::{
    error::PassError,
    index::IndexVec,
    intern::Name,
    ir::{
        Block, Body, Expression, ExpressionKind, File, ForLoop, Local, LocalId, LocalOrigin,
        LoopVariable, Statement, Type,
        builder,
        visit::{MutVisitor, any_expression, walk_expression_mut},
    },
    phaser::Postcondition,
};

pub struct ForLoopsLowering;

pub const NO_FOR_LOOPS: Postcondition = Postcondition::new("no for loops remain", has_no_for_loops);

pub fn has_no_for_loops(file: &File) -> bool {
    !any_expression(file, |e| matches!(e.kind, ExpressionKind::For(_)))
}

impl BodyLoweringPass for ForLoopsLowering {
    fn lower_body(&self, body: &mut Body, _ctx: &mut FileContext<'_>) -> Result<(), PassError> {
        let Body { locals, block } = body;
        ForLoopTransformer { locals }.visit_block_mut(block)
    }
}

struct ForLoopTransformer<'a> {
    locals: &'a mut IndexVec<LocalId, Local>,
}

impl MutVisitor for ForLoopTransformer<'_> {
    fn visit_expression_mut(&mut self, expression: &mut Expression) -> Result<(), PassError> {
        // Inner loops first
        walk_expression_mut(self, expression)?;

        if !matches!(expression.kind, ExpressionKind::For(_)) {
            return Ok(());
        }

        let span = expression.span;
        let ExpressionKind::For(for_loop) = expression.take().kind else {
            return Err(PassError::Internal("for loop vanished while lowering".into()));
        };

        *expression = lower_for_loop(for_loop, self.locals)?.with_span(span);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LoopState {
    BeforeLoop,
    BeforeBody,
    Body,
    AfterBody,
    AfterLoop,
}

impl LoopState {
    fn successor(self) -> Option<LoopState> {
        match self {
            LoopState::BeforeLoop => Some(LoopState::BeforeBody),
            LoopState::BeforeBody => Some(LoopState::Body),
            LoopState::Body => Some(LoopState::AfterBody),
            LoopState::AfterBody => Some(LoopState::AfterLoop),
            LoopState::AfterLoop => None,
        }
    }
}

type LeaveTask = Box<dyn FnOnce(&mut Vec<Statement>)>;

/// Collects the statements of one lowered loop and tracks the temporaries it
/// allocates.
pub struct LoopGenerator<'a> {
    locals: &'a mut IndexVec<LocalId, Local>,
    state: LoopState,
    /// Statements placed before the loop
    before_loop: Vec<Statement>,
    /// Statements of the new loop body
    body: Vec<Statement>,
    leave_tasks: Vec<LeaveTask>,
}

impl<'a> LoopGenerator<'a> {
    pub fn new(locals: &'a mut IndexVec<LocalId, Local>) -> Self {
        Self {
            locals,
            state: LoopState::BeforeLoop,
            before_loop: Vec::new(),
            body: Vec::new(),
            leave_tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn transition(&mut self, next: LoopState) -> Result<(), PassError> {
        if self.state.successor() != Some(next) {
            return Err(PassError::Internal(format!(
                "for loop lowering cannot go from {} to {next}",
                self.state
            )));
        }

        self.state = next;
        Ok(())
    }

    fn unexpected(&self, action: &str) -> PassError {
        PassError::Internal(format!("cannot {action} in state {}", self.state))
    }

    /// Declares a new local holding `initializer` and schedules the end of
    /// its scope after the loop.
    pub fn temporary(
        &mut self,
        name: &str,
        initializer: Expression,
        is_mutable: bool,
    ) -> Result<LocalId, PassError> {
        let statements = match self.state {
            LoopState::BeforeLoop => &mut self.before_loop,
            LoopState::BeforeBody => &mut self.body,
            _ => return Err(self.unexpected("allocate a temporary")),
        };

        let local = self.locals.push(Local {
            name: Name::new(name),
            ty: initializer.ty.clone(),
            is_mutable,
            origin: LocalOrigin::Temporary,
        });

        statements.push(builder::let_local(local, initializer));
        self.leave_tasks
            .push(Box::new(move |statements| statements.push(Statement::EndScope(local))));

        Ok(local)
    }

    /// Declares a loop variable of the source with its value for the current
    /// iteration.
    pub fn bind(&mut self, local: LocalId, value: Expression) -> Result<(), PassError> {
        if self.state != LoopState::BeforeBody {
            return Err(self.unexpected("bind a loop variable"));
        }

        let declared = self
            .locals
            .get(local)
            .map(|l| &l.ty)
            .ok_or_else(|| PassError::Malformed(format!("loop variable {local} does not exist")))?;

        if !declared.accepts(&value.ty) {
            return Err(PassError::Malformed(format!(
                "loop variable `{}` of type {declared} cannot hold {}",
                self.locals[local].name, value.ty
            )));
        }

        self.body.push(builder::let_local(local, value));
        Ok(())
    }

    pub fn emit(&mut self, expression: Expression) -> Result<(), PassError> {
        match self.state {
            LoopState::BeforeBody | LoopState::Body => {
                self.body.push(Statement::Expression(expression));
                Ok(())
            }
            _ => Err(self.unexpected("emit into the loop body")),
        }
    }

    pub fn append_body(&mut self, block: Block) -> Result<(), PassError> {
        if self.state != LoopState::Body {
            return Err(self.unexpected("append the source body"));
        }

        self.body.extend(block.statements);
        if let Some(result) = block.result {
            self.body.push(Statement::Expression(*result));
        }

        Ok(())
    }

    pub fn take_body(&mut self) -> Result<Block, PassError> {
        if self.state != LoopState::AfterBody {
            return Err(self.unexpected("close the loop body"));
        }

        Ok(Block::new(std::mem::take(&mut self.body), None))
    }

    pub fn load(&self, local: LocalId) -> Expression {
        let ty = self.local_type(local);
        builder::get_local(local, ty)
    }

    pub fn local_type(&self, local: LocalId) -> Type {
        self.locals.get(local).map_or(Type::Any, |l| l.ty.clone())
    }

    pub fn is_mutable(&self, local: LocalId) -> bool {
        self.locals.get(local).is_none_or(|l| l.is_mutable)
    }

    /// Places `lowered` after the loop setup and releases every temporary,
    /// last allocated first.
    pub fn finish(mut self, lowered: Expression) -> Result<Expression, PassError> {
        self.transition(LoopState::AfterLoop)?;

        let mut statements = std::mem::take(&mut self.before_loop);
        statements.push(Statement::Expression(lowered));

        while let Some(task) = self.leave_tasks.pop() {
            task(&mut statements);
        }

        Ok(builder::block(statements, None))
    }
}

fn lower_for_loop(
    for_loop: ForLoop,
    locals: &mut IndexVec<LocalId, Local>,
) -> Result<Expression, PassError> {
    let ForLoop {
        label,
        variable,
        source,
        body,
        protocol,
    } = for_loop;

    let mut generator = LoopGenerator::new(locals);
    let header = LoopHeader::new(*source, protocol, &mut generator)?;

    generator.transition(LoopState::BeforeBody)?;
    let value = header.next_value(&generator);
    let current = bind_loop_variable(&mut generator, variable, value)?;
    if let Some(advance) = header.advance(&generator)? {
        generator.emit(advance)?;
    }

    generator.transition(LoopState::Body)?;
    generator.append_body(body)?;

    generator.transition(LoopState::AfterBody)?;
    let body = generator.take_body()?;
    let lowered = header.build_loop(label, body, current, &generator)?;

    generator.finish(lowered)
}

/// Returns the local holding the current element.
fn bind_loop_variable(
    generator: &mut LoopGenerator<'_>,
    variable: LoopVariable,
    value: Expression,
) -> Result<LocalId, PassError> {
    match variable {
        LoopVariable::Single(local) => {
            generator.bind(local, value)?;
            Ok(local)
        }
        LoopVariable::Destructured(components) => {
            let element_type = value.ty.clone();
            let element = generator.temporary("element", value, false)?;

            for (position, component) in components.into_iter().enumerate() {
                let Some(component) = component else {
                    continue;
                };

                let value = builder::call(
                    component.function,
                    &format!("component{}", position + 1),
                    Some((generator.load(element), element_type.clone())),
                    Vec::new(),
                    generator.local_type(component.local),
                );
                generator.bind(component.local, value)?;
            }

            Ok(element)
        }
    }
}
