//! Phase lists of the JVM backend.
//!
//! `IrLowering` lowers a whole module. `IrFragmentLowering` lowers a code
//! fragment compiled against an existing module, and additionally routes
//! accesses to private declarations of other files through reflection.

use crate::{
    error::ConfigurationError,
    ir::validate::validate_module,
    lower::{
        ForEachBody,
        calls::{CallRewriteChain, CallsLowering},
        const_eval::ConstEvaluationLowering,
        for_loops::{ForLoopsLowering, NO_FOR_LOOPS},
        initializers::{InitializersCleanup, InitializersLowering, NO_ANONYMOUS_INITIALIZERS},
        properties::{NO_PROPERTIES, PropertiesLowering},
        reflective_access::ReflectiveAccessLowering,
        string_concatenation::FlattenStringConcatenation,
    },
    phaser::{CompilerPhase, FilePhase, ModulePhase, PhaseDescriptor, PhaseList, per_file},
};

pub const IR_LOWERING: &str = "IrLowering";
pub const IR_FRAGMENT_LOWERING: &str = "IrFragmentLowering";

fn validate_before_lowering() -> ModulePhase {
    ModulePhase::validation(
        PhaseDescriptor::new(
            "ValidateIrBeforeLowering",
            "Validate the IR produced by the front end",
        ),
        validate_module,
    )
}

fn validate_after_lowering() -> ModulePhase {
    ModulePhase::validation(
        PhaseDescriptor::new("ValidateIrAfterLowering", "Validate the lowered IR"),
        validate_module,
    )
}

fn const_evaluation() -> ModulePhase {
    ModulePhase::lowering(
        PhaseDescriptor::new(
            "ConstEvaluationLowering",
            "Evaluate constant expressions and replace them by literals",
        ),
        ConstEvaluationLowering,
    )
}

fn properties() -> FilePhase {
    FilePhase::lowering(
        PhaseDescriptor::new(
            "Properties",
            "Move fields and accessors of properties out of property declarations",
        )
        .sticky(NO_PROPERTIES),
        PropertiesLowering,
    )
}

fn for_loops() -> FilePhase {
    FilePhase::lowering(
        PhaseDescriptor::new("ForLoops", "Lower for loops to while and do-while loops")
            .sticky(NO_FOR_LOOPS),
        ForEachBody(ForLoopsLowering),
    )
}

fn calls() -> Result<FilePhase, ConfigurationError> {
    Ok(FilePhase::lowering(
        PhaseDescriptor::new("Calls", "Replace calls of builtin members by intrinsics")
            .prerequisite("ForLoops"),
        ForEachBody(CallsLowering::new(CallRewriteChain::jvm()?)),
    ))
}

fn string_concatenation() -> FilePhase {
    FilePhase::lowering(
        PhaseDescriptor::new(
            "FlattenStringConcatenation",
            "Flatten nested string concatenations and merge constant segments",
        )
        .prerequisite("Calls"),
        ForEachBody(FlattenStringConcatenation),
    )
}

fn initializers() -> FilePhase {
    FilePhase::lowering(
        PhaseDescriptor::new(
            "Initializers",
            "Run instance field and anonymous initializers in every constructor",
        ),
        InitializersLowering,
    )
}

fn initializers_cleanup() -> FilePhase {
    FilePhase::lowering(
        PhaseDescriptor::new(
            "InitializersCleanup",
            "Remove initializers that were moved into constructors",
        )
        .prerequisite("Initializers")
        .sticky(NO_ANONYMOUS_INITIALIZERS),
        InitializersCleanup,
    )
}

fn reflective_access() -> FilePhase {
    FilePhase::lowering(
        PhaseDescriptor::new(
            "ReflectiveAccess",
            "Access private declarations of other files through reflection",
        )
        .prerequisite("Properties"),
        ForEachBody(ReflectiveAccessLowering),
    )
}

pub fn jvm_lowering_phases() -> Result<PhaseList, ConfigurationError> {
    PhaseList::new(
        IR_LOWERING,
        "IR lowering of a module for the JVM",
        CompilerPhase::from(validate_before_lowering())
            .then(const_evaluation())
            .then(per_file(
                "PerformByIrFile",
                "Lower each file",
                vec![
                    properties(),
                    for_loops(),
                    calls()?,
                    string_concatenation(),
                    initializers(),
                    initializers_cleanup(),
                ],
            ))
            .then(validate_after_lowering()),
    )
}

pub fn jvm_fragment_lowering_phases() -> Result<PhaseList, ConfigurationError> {
    PhaseList::new(
        IR_FRAGMENT_LOWERING,
        "IR lowering of a code fragment for the JVM",
        CompilerPhase::from(validate_before_lowering())
            .then(const_evaluation())
            .then(per_file(
                "PrefixOfIrPhases",
                "Lowerings shared with module compilation",
                vec![properties(), for_loops()],
            ))
            .then(per_file(
                "FragmentLowerings",
                "Lowerings specific to code fragments",
                vec![reflective_access()],
            ))
            .then(per_file(
                "SuffixOfIrPhases",
                "Lowerings shared with module compilation",
                vec![
                    calls()?,
                    string_concatenation(),
                    initializers(),
                    initializers_cleanup(),
                ],
            ))
            .then(validate_after_lowering()),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::LoweringConfig,
        diagnostics::DiagnosticCollector,
        error::{LoweringError, PassError},
        index::Index,
        intern::Name,
        ir::{
            Block, Class, ClassKind, DeclarationKind, Expression, ExpressionKind, File,
            ForLoop, IntrinsicOp, LocalId, LoopVariable, Module, OperatorName, PrimitiveKind,
            Property, Range, RangeKind, Span, Statement, SymbolKind, Type, Visibility,
            builder::{self, BodyBuilder, ModuleBuilder},
            visit::any_expression,
        },
        lower::{FileContext, FileLoweringPass},
        phaser::{
            config::PhaseConfig,
            engine::{PhaseRunner, RunSummary},
        },
    };

    #[test]
    fn module_lowering_order() {
        let list = jvm_lowering_phases().unwrap();

        assert_eq!(
            list.phase_names(),
            vec![
                "ValidateIrBeforeLowering",
                "ConstEvaluationLowering",
                "Properties",
                "ForLoops",
                "Calls",
                "FlattenStringConcatenation",
                "Initializers",
                "InitializersCleanup",
                "ValidateIrAfterLowering",
            ]
        );
        assert_eq!(list.group_members("PerformByIrFile").map(|m| m.len()), Some(6));
    }

    #[test]
    fn fragment_lowering_groups() {
        let list = jvm_fragment_lowering_phases().unwrap();

        assert_eq!(
            list.group_members("PrefixOfIrPhases"),
            Some(vec!["Properties", "ForLoops"])
        );
        assert_eq!(
            list.group_members("FragmentLowerings"),
            Some(vec!["ReflectiveAccess"])
        );
        assert_eq!(
            list.group_members("SuffixOfIrPhases"),
            Some(vec![
                "Calls",
                "FlattenStringConcatenation",
                "Initializers",
                "InitializersCleanup"
            ])
        );
    }

    #[test]
    fn disabling_for_loops_disables_calls_too() {
        let list = jvm_lowering_phases().unwrap();
        let phases = PhaseConfig {
            enabled: Some(vec!["Calls".into()]),
            ..PhaseConfig::default()
        };

        let error = phases.resolve(&list).unwrap_err();
        assert_eq!(
            error,
            ConfigurationError::MissingPrerequisite {
                phase: "Calls",
                prerequisite: "ForLoops"
            }
        );
    }

    fn int(kind: OperatorName, left: Expression, right: Expression) -> Expression {
        builder::builtin(PrimitiveKind::Int, kind, left, vec![right]).unwrap()
    }

    /// ```text
    /// // Main.kt
    /// const val LIMIT = 2 * 21
    /// fun sum(n: Int): Int { var total = 0; for (i in 1..n) total = total + i; return total }
    /// class Counter { val label = "c"; init { } }
    ///
    /// // Text.kt
    /// fun describe(s: String): String = "len=" + s.length
    /// ```
    fn module() -> Module {
        let mut module = ModuleBuilder::new("app");
        let main = module.add_file("Main.kt");
        let text = module.add_file("Text.kt");

        let limit = module.declare(main, "LIMIT", SymbolKind::Field);
        let sum = module.declare(main, "sum", SymbolKind::Function);
        let counter = module.declare(main, "Counter", SymbolKind::Class);
        let constructor = module.declare(main, "<init>", SymbolKind::Function);
        let label = module.declare(main, "label", SymbolKind::Property);
        let label_field = module.declare(main, "label", SymbolKind::Field);
        let init = module.declare(main, "<anonymous-init>", SymbolKind::AnonymousInitializer);
        let describe = module.declare(text, "describe", SymbolKind::Function);
        let plus = module.external("plus", SymbolKind::Function, Visibility::Public);
        let length = module.external("length", SymbolKind::Property, Visibility::Public);

        module.push(
            main,
            builder::field_with_value(
                limit,
                "LIMIT",
                int(OperatorName::Times, builder::int(2), builder::int(21)),
                true,
            ),
        );

        let mut body = BodyBuilder::new();
        let n = body.parameter("n", Type::INT);
        let total = body.local("total", Type::INT, true);
        let i = body.local("i", Type::INT, false);
        let add = builder::set_local(
            total,
            int(
                OperatorName::Plus,
                builder::get_local(total, Type::INT),
                builder::get_local(i, Type::INT),
            ),
        );
        let source = Expression::new(
            ExpressionKind::Range(Range {
                kind: RangeKind::RangeTo,
                start: Box::new(builder::int(1)),
                end: Box::new(builder::get_local(n, Type::INT)),
                step: None,
            }),
            Type::Progression(PrimitiveKind::Int),
            Span::DUMMY,
        );
        let for_loop = Expression::new(
            ExpressionKind::For(ForLoop {
                label: None,
                variable: LoopVariable::Single(i),
                source: Box::new(source),
                body: Block::new(vec![Statement::Expression(add)], None),
                protocol: None,
            }),
            Type::Unit,
            Span::DUMMY,
        );
        module.push(
            main,
            body.function(
                sum,
                "sum",
                Type::INT,
                vec![
                    builder::let_local(total, builder::int(0)),
                    Statement::Expression(for_loop),
                ],
                Some(builder::get_local(total, Type::INT)),
            ),
        );

        let mut constructor_body = BodyBuilder::new();
        constructor_body.parameter("this", Type::Class("Counter".into()));
        let mut constructor_declaration =
            constructor_body.function(constructor, "<init>", Type::Unit, Vec::new(), None);
        if let DeclarationKind::Function(function) = &mut constructor_declaration.kind {
            function.is_constructor = true;
            function.has_dispatch_receiver = true;
        }
        let mut backing_field = builder::field_with_value(label_field, "label", builder::string("c"), false);
        if let DeclarationKind::Field(field) = &mut backing_field.kind {
            field.is_static = false;
        }
        let property = builder::declaration(
            label,
            "label",
            DeclarationKind::Property(Property {
                ty: Type::String,
                backing_field: Some(Box::new(backing_field)),
                getter: None,
                setter: None,
            }),
        );
        let mut init_body = BodyBuilder::new();
        init_body.parameter("this", Type::Class("Counter".into()));
        let anonymous_init = builder::declaration(
            init,
            "<anonymous-init>",
            DeclarationKind::AnonymousInitializer(init_body.finish(Vec::new(), None)),
        );
        module.push(
            main,
            builder::declaration(
                counter,
                "Counter",
                DeclarationKind::Class(Class {
                    kind: ClassKind::Class,
                    declarations: vec![constructor_declaration, property, anonymous_init],
                }),
            ),
        );

        let mut body = BodyBuilder::new();
        let s = body.parameter("s", Type::String);
        let s_length = builder::call(
            length,
            "length",
            Some((builder::get_local(s, Type::String), Type::String)),
            Vec::new(),
            Type::INT,
        );
        let result = builder::call(
            plus,
            "plus",
            Some((builder::string("len="), Type::String)),
            vec![s_length],
            Type::String,
        );
        module.push(
            text,
            body.function(describe, "describe", Type::String, Vec::new(), Some(result)),
        );

        module.finish()
    }

    fn lower(threads: usize) -> (Module, RunSummary) {
        let list = jvm_lowering_phases().unwrap();
        let config = LoweringConfig {
            threads,
            ..LoweringConfig::default()
        };
        let runner = PhaseRunner::new(&list, &PhaseConfig::default(), &config).unwrap();
        let sink = DiagnosticCollector::new();

        let mut module = module();
        let summary = runner.run(&mut module, &sink).unwrap();
        (module, summary)
    }

    fn has_calls(expression: &Expression) -> bool {
        matches!(expression.kind, ExpressionKind::Call(_))
    }

    #[test]
    fn module_is_fully_lowered() {
        let (module, summary) = lower(1);

        assert_eq!(summary.executed.len(), 9);
        assert_eq!(summary.errors, 0);
        assert!(module.files.iter().all(|file| !any_expression(file, has_calls)));

        // LIMIT was folded
        let DeclarationKind::Field(limit) = &module.files[0].declarations[0].kind else {
            panic!("expected LIMIT");
        };
        let value = limit.initializer.as_ref().and_then(|b| b.block.result.as_deref());
        assert_eq!(value, Some(&builder::int(42)));

        // The constructor initializes the hoisted backing field
        let DeclarationKind::Class(counter) = &module.files[0].declarations[2].kind else {
            panic!("expected Counter");
        };
        let names = counter
            .declarations
            .iter()
            .map(|d| d.name.value())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["<init>", "label"]);
        let DeclarationKind::Function(constructor) = &counter.declarations[0].kind else {
            panic!("expected the constructor");
        };
        let statements = &constructor.body.as_ref().unwrap().block.statements;
        assert!(matches!(
            statements.as_slice(),
            [Statement::Expression(Expression {
                kind: ExpressionKind::SetField { .. },
                ..
            })]
        ));

        // "len=" + s.length
        let DeclarationKind::Function(describe) = &module.files[1].declarations[0].kind else {
            panic!("expected describe");
        };
        let result = describe.body.as_ref().and_then(|b| b.block.result.as_deref());
        assert_eq!(
            result,
            Some(&Expression::new(
                ExpressionKind::StringConcat(vec![
                    builder::string("len="),
                    builder::intrinsic(
                        IntrinsicOp::StringLength,
                        vec![builder::get_local(LocalId::new(0), Type::String)],
                        Type::INT,
                    ),
                ]),
                Type::String,
                Span::DUMMY,
            ))
        );
    }

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let (sequential, sequential_summary) = lower(1);
        let (parallel, parallel_summary) = lower(4);

        assert_eq!(parallel, sequential);
        assert_eq!(parallel_summary, sequential_summary);
    }

    #[test]
    fn fragment_lowering_reaches_private_members_reflectively() {
        let mut module = module();
        let secret = module.symbols.declare(
            Name::new("secret"),
            SymbolKind::Function,
            Visibility::Private,
            crate::ir::Linkage::External,
        );
        let DeclarationKind::Function(describe) = &mut module.files[1].declarations[0].kind else {
            panic!("expected describe");
        };
        let body = describe.body.as_mut().unwrap();
        body.block.statements.push(Statement::Expression(builder::call(
            secret,
            "secret",
            None,
            Vec::new(),
            Type::Unit,
        )));

        let list = jvm_fragment_lowering_phases().unwrap();
        let config = LoweringConfig::default();
        let runner = PhaseRunner::new(&list, &PhaseConfig::default(), &config).unwrap();
        let summary = runner.run(&mut module, &DiagnosticCollector::new()).unwrap();

        assert_eq!(summary.executed.len(), 10);
        let DeclarationKind::Function(describe) = &module.files[1].declarations[0].kind else {
            panic!("expected describe");
        };
        assert_eq!(
            describe.body.as_ref().unwrap().block.statements[0],
            Statement::Expression(builder::intrinsic(
                IntrinsicOp::ReflectiveInvoke {
                    name: Name::new("secret")
                },
                Vec::new(),
                Type::Unit,
            ))
        );
    }

    #[test]
    fn pass_failures_carry_the_file() {
        // A field initializer without a value cannot be moved into the
        // constructor
        let mut module = module();
        let DeclarationKind::Class(counter) = &mut module.files[0].declarations[2].kind else {
            panic!("expected Counter");
        };
        let DeclarationKind::Property(property) = &mut counter.declarations[1].kind else {
            panic!("expected label");
        };
        if let Some(DeclarationKind::Field(field)) =
            property.backing_field.as_mut().map(|f| &mut f.kind)
        {
            if let Some(initializer) = &mut field.initializer {
                initializer.block.result = None;
            }
        }

        let list = jvm_lowering_phases().unwrap();
        let config = LoweringConfig::default();
        let runner = PhaseRunner::new(&list, &PhaseConfig::default(), &config).unwrap();
        let error = runner
            .run(&mut module, &DiagnosticCollector::new())
            .unwrap_err();

        match error {
            LoweringError::Pass { phase, file, .. } => {
                assert_eq!(phase, "Initializers");
                assert_eq!(file.as_deref(), Some("Main.kt"));
            }
            other => panic!("expected a pass failure, got {other}"),
        }
    }

    /// Brings an anonymous initializer back into `Text.kt`
    struct ReinsertAnonymousInitializer;

    impl FileLoweringPass for ReinsertAnonymousInitializer {
        fn lower(&self, file: &mut File, _ctx: &mut FileContext<'_>) -> Result<(), PassError> {
            if file.path == "Text.kt" {
                let symbol = file.declarations[0].symbol;
                file.declarations.push(builder::declaration(
                    symbol,
                    "<anonymous-init>",
                    DeclarationKind::AnonymousInitializer(BodyBuilder::new().finish(Vec::new(), None)),
                ));
            }
            Ok(())
        }
    }

    #[test]
    fn initializers_reappearing_after_cleanup_are_reported() {
        let list = PhaseList::new(
            "Regression",
            "lowering followed by a phase that undoes the cleanup",
            per_file(
                "PerformByIrFile",
                "",
                vec![
                    properties(),
                    for_loops(),
                    calls().unwrap(),
                    string_concatenation(),
                    initializers(),
                    initializers_cleanup(),
                    FilePhase::lowering(
                        PhaseDescriptor::new("Reinsert", "Add an anonymous initializer"),
                        ReinsertAnonymousInitializer,
                    ),
                ],
            ),
        )
        .unwrap();
        let config = LoweringConfig::default();
        let runner = PhaseRunner::new(&list, &PhaseConfig::default(), &config).unwrap();

        let error = runner
            .run(&mut module(), &DiagnosticCollector::new())
            .unwrap_err();

        match error {
            LoweringError::InvariantViolation {
                condition,
                introduced_by,
                broken_by,
                file,
            } => {
                assert_eq!(condition, "no anonymous initializers remain");
                assert_eq!(introduced_by, "InitializersCleanup");
                assert_eq!(broken_by, "Reinsert");
                assert_eq!(file, "Text.kt");
            }
            other => panic!("expected an invariant violation, got {other}"),
        }
    }

    #[test]
    fn unknown_phase_lists_are_rejected() {
        assert!(matches!(
            crate::backend::phase_list_by_name("IrBogus"),
            Err(ConfigurationError::UnknownPhaseList(name)) if name == "IrBogus"
        ));
    }
}
