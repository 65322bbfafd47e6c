use colored::Colorize;
use itertools::Itertools;

use super::{
    Block, Body, Call, Declaration, DeclarationKind, Expression, ExpressionKind, File, Function,
    LocalId, LoopVariable, Module, Statement, Symbol, SymbolTable, Visibility,
};
use crate::{index::IndexVec, intern::Name};

/// Renders a module as colored pseudo source, used for IR dumps and the
/// CLI output.
pub fn pretty_print_module(module: &Module) -> String {
    let mut printer = Printer::new(&module.symbols);

    printer.line(format!("{} {}", "module".magenta(), module.name.value().blue()));
    for file in &module.files {
        printer.file(file);
    }

    printer.out
}

pub fn pretty_print_file(file: &File, symbols: &SymbolTable) -> String {
    let mut printer = Printer::new(symbols);
    printer.file(file);
    printer.out
}

struct Printer<'a> {
    symbols: &'a SymbolTable,
    locals: Option<&'a IndexVec<LocalId, super::Local>>,
    indent: usize,
    out: String,
}

impl<'a> Printer<'a> {
    fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            locals: None,
            indent: 0,
            out: String::new(),
        }
    }

    fn line(&mut self, text: String) {
        self.out.push_str(&"  ".repeat(self.indent));
        self.out.push_str(&text);
        self.out.push('\n');
    }

    fn symbol(&self, symbol: Symbol) -> String {
        self.symbols
            .name_of(symbol)
            .map_or_else(|| format!("<unknown {symbol}>"), |n| n.value().to_owned())
    }

    fn local(&self, local: LocalId) -> String {
        let name = self
            .locals
            .and_then(|locals| locals.get(local))
            .map_or("<local>", |l| l.name.value());

        format!("{name}_{local}").yellow().to_string()
    }

    fn file(&mut self, file: &'a File) {
        self.line(format!("{} {}", "file".magenta(), file.path.blue()));

        self.indent += 1;
        for declaration in &file.declarations {
            self.declaration(declaration);
        }
        self.indent -= 1;
    }

    fn declaration(&mut self, declaration: &'a Declaration) {
        for annotation in &declaration.annotations {
            let text = self.expression(annotation);
            self.line(text);
        }

        let visibility = match declaration.visibility {
            Visibility::Public => String::new(),
            other => format!("{} ", other.to_string().magenta()),
        };
        let name = declaration.name.value().blue();

        match &declaration.kind {
            DeclarationKind::Function(function) => {
                let header = self.function_header(declaration.name, function);
                match &function.body {
                    Some(body) => {
                        self.line(format!("{visibility}{header} {}", "{".white()));
                        self.body(body);
                        self.line("}".white().to_string());
                    }
                    None => self.line(format!("{visibility}{header}")),
                }
            }
            DeclarationKind::Class(class) => {
                self.line(format!(
                    "{visibility}{} {name} {}",
                    class.kind.to_string().magenta(),
                    "{".white()
                ));
                self.indent += 1;
                for member in &class.declarations {
                    self.declaration(member);
                }
                self.indent -= 1;
                self.line("}".white().to_string());
            }
            DeclarationKind::Field(field) => {
                let mut modifiers = String::new();
                if field.is_static {
                    modifiers.push_str("static ");
                }
                if field.is_const {
                    modifiers.push_str("const ");
                }
                modifiers.push_str(if field.is_mutable { "var" } else { "val" });

                let header = format!(
                    "{visibility}{} {name}: {}",
                    modifiers.magenta(),
                    field.ty.to_string().green()
                );
                match &field.initializer {
                    Some(initializer) => {
                        self.line(format!("{header} = {}", "{".white()));
                        self.body(initializer);
                        self.line("}".white().to_string());
                    }
                    None => self.line(header),
                }
            }
            DeclarationKind::Property(property) => {
                self.line(format!(
                    "{visibility}{} {name}: {} {}",
                    "property".magenta(),
                    property.ty.to_string().green(),
                    "{".white()
                ));
                self.indent += 1;
                for member in [&property.backing_field, &property.getter, &property.setter]
                    .into_iter()
                    .flatten()
                {
                    self.declaration(member);
                }
                self.indent -= 1;
                self.line("}".white().to_string());
            }
            DeclarationKind::AnonymousInitializer(body) => {
                self.line(format!("{} {}", "init".magenta(), "{".white()));
                self.body(body);
                self.line("}".white().to_string());
            }
        }
    }

    fn function_header(&self, name: Name, function: &Function) -> String {
        let keyword = if function.is_constructor {
            "constructor"
        } else {
            "fun"
        };

        format!(
            "{} {}({}): {}",
            keyword.magenta(),
            name.value().blue(),
            function
                .parameters
                .iter()
                .map(|p| format!("{}: {}", p.name, p.ty.to_string().green()))
                .join(", "),
            function.return_type.to_string().green()
        )
    }

    fn body(&mut self, body: &'a Body) {
        let previous = self.locals.replace(&body.locals);

        self.indent += 1;
        self.block_contents(&body.block);
        self.indent -= 1;

        self.locals = previous;
    }

    fn block_contents(&mut self, block: &Block) {
        for statement in &block.statements {
            let text = self.statement(statement);
            self.line(text);
        }

        if let Some(result) = &block.result {
            let text = self.expression(result);
            self.line(text);
        }
    }

    /// Renders a block as `{ ... }` spanning multiple lines. The opening brace
    /// is left to the caller's line.
    fn block(&mut self, block: &Block) -> String {
        let mut nested = Printer {
            symbols: self.symbols,
            locals: self.locals,
            indent: self.indent + 1,
            out: String::new(),
        };
        nested.block_contents(block);

        format!(
            "{}\n{}{}{}",
            "{".white(),
            nested.out,
            "  ".repeat(self.indent),
            "}".white()
        )
    }

    fn statement(&mut self, statement: &Statement) -> String {
        match statement {
            Statement::Let { local, initializer } => {
                let (keyword, ty) = match self.locals.and_then(|l| l.get(*local)) {
                    Some(l) => (if l.is_mutable { "var" } else { "val" }, l.ty.to_string()),
                    None => ("val", String::from("?")),
                };

                let mut text = format!("{} {}: {}", keyword.magenta(), self.local(*local), ty.green());
                if let Some(initializer) = initializer {
                    text.push_str(&format!(" {} {}", "=".white(), self.expression(initializer)));
                }
                text
            }
            Statement::Expression(expression) => self.expression(expression),
            Statement::EndScope(local) => format!("{} {}", "end_scope".cyan(), self.local(*local)),
        }
    }

    fn arguments(&mut self, arguments: &[Expression]) -> String {
        arguments.iter().map(|a| self.expression(a)).join(", ")
    }

    fn call(&mut self, call: &Call) -> String {
        let arguments = self.arguments(&call.arguments);
        let name = call.name().value().blue();

        match &call.receiver {
            Some(receiver) => format!("{}.{name}({arguments})", self.expression(receiver)),
            None => format!("{name}({arguments})"),
        }
    }

    fn label(label: &Option<Name>) -> String {
        label.map(|l| format!("{l}@ ")).unwrap_or_default()
    }

    fn expression(&mut self, expression: &Expression) -> String {
        match &expression.kind {
            ExpressionKind::Const(value) => value.to_string().purple().to_string(),
            ExpressionKind::GetLocal(local) => self.local(*local),
            ExpressionKind::SetLocal { local, value } => {
                format!("{} {} {}", self.local(*local), "=".white(), self.expression(value))
            }
            ExpressionKind::GetField { field, receiver } => match receiver {
                Some(receiver) => format!("{}.{}", self.expression(receiver), self.symbol(*field)),
                None => self.symbol(*field),
            },
            ExpressionKind::SetField {
                field,
                receiver,
                value,
            } => {
                let target = match receiver {
                    Some(receiver) => format!("{}.{}", self.expression(receiver), self.symbol(*field)),
                    None => self.symbol(*field),
                };
                format!("{target} {} {}", "=".white(), self.expression(value))
            }
            ExpressionKind::Call(call) => self.call(call),
            ExpressionKind::Intrinsic { op, arguments } => {
                format!("{}({})", op.to_string().cyan(), self.arguments(arguments))
            }
            ExpressionKind::StringConcat(segments) => {
                format!("{}({})", "concat".cyan(), self.arguments(segments))
            }
            ExpressionKind::Block(block) => self.block(block),
            ExpressionKind::If {
                condition,
                then,
                otherwise,
            } => {
                let mut text = format!(
                    "{} ({}) {}",
                    "if".magenta(),
                    self.expression(condition),
                    self.expression(then)
                );
                if let Some(otherwise) = otherwise {
                    text.push_str(&format!(" {} {}", "else".magenta(), self.expression(otherwise)));
                }
                text
            }
            ExpressionKind::While(lp) => format!(
                "{}{} ({}) {}",
                Self::label(&lp.label),
                "while".magenta(),
                self.expression(&lp.condition),
                self.block(&lp.body)
            ),
            ExpressionKind::DoWhile(lp) => format!(
                "{}{} {} {} ({})",
                Self::label(&lp.label),
                "do".magenta(),
                self.block(&lp.body),
                "while".magenta(),
                self.expression(&lp.condition)
            ),
            ExpressionKind::For(for_loop) => {
                let variable = match &for_loop.variable {
                    LoopVariable::Single(local) => self.local(*local),
                    LoopVariable::Destructured(components) => format!(
                        "({})",
                        components
                            .iter()
                            .map(|c| c.as_ref().map_or("_".to_owned(), |c| self.local(c.local)))
                            .join(", ")
                    ),
                };
                format!(
                    "{}{} ({variable} {} {}) {}",
                    Self::label(&for_loop.label),
                    "for".magenta(),
                    "in".magenta(),
                    self.expression(&for_loop.source),
                    self.block(&for_loop.body)
                )
            }
            ExpressionKind::Range(range) => {
                let mut text = format!(
                    "{} {} {}",
                    self.expression(&range.start),
                    range.kind,
                    self.expression(&range.end)
                );
                if let Some(step) = &range.step {
                    text.push_str(&format!(" {} {}", "step".magenta(), self.expression(step)));
                }
                text
            }
            ExpressionKind::ArrayLiteral(elements) => format!("[{}]", self.arguments(elements)),
            ExpressionKind::AnnotationConstructor {
                annotation,
                arguments,
            } => format!(
                "@{}({})",
                self.symbol(*annotation).blue(),
                self.arguments(arguments)
            ),
            ExpressionKind::Break(label) => match label {
                Some(label) => format!("{}@{label}", "break".magenta()),
                None => "break".magenta().to_string(),
            },
            ExpressionKind::Continue(label) => match label {
                Some(label) => format!("{}@{label}", "continue".magenta()),
                None => "continue".magenta().to_string(),
            },
            ExpressionKind::Return(value) => match value {
                Some(value) => format!("{} {}", "return".magenta(), self.expression(value)),
                None => "return".magenta().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::{
        IntrinsicOp, OperatorName, PrimitiveKind, SymbolKind, Type,
        builder::{self, BodyBuilder, ModuleBuilder},
    };

    #[test]
    fn prints_function_bodies_as_pseudo_source() {
        let mut module = ModuleBuilder::new("test");
        let file = module.add_file("main.kt");
        let f = module.declare(file, "f", SymbolKind::Function);

        let mut body = BodyBuilder::new();
        let n = body.parameter("n", Type::INT);
        let x = body.local("x", Type::INT, true);
        let plus = builder::builtin(
            PrimitiveKind::Int,
            OperatorName::Plus,
            builder::get_local(n, Type::INT),
            vec![builder::int(1)],
        )
        .unwrap();
        let length = builder::intrinsic(IntrinsicOp::StringLength, vec![builder::string("ab")], Type::INT);

        let function = body.function(
            f,
            "f",
            Type::INT,
            vec![
                builder::let_local(x, plus),
                Statement::Expression(builder::if_then(
                    builder::boolean(true),
                    builder::block(vec![Statement::Expression(builder::set_local(x, length))], None),
                )),
                Statement::EndScope(x),
            ],
            Some(builder::get_local(x, Type::INT)),
        );
        module.push(file, function);
        let module = module.finish();

        let printed = pretty_print_file(&module.files[0], &module.symbols);

        assert_eq!(
            strip_ansi_escapes::strip_str(printed),
            indoc! {r#"
                file main.kt
                  fun f(n: Int): Int {
                    var x_1: Int = n_0.plus(1)
                    if (true) {
                      x_1 = string_length("ab")
                    }
                    end_scope x_1
                    x_1
                  }
            "#}
        );
    }
}
