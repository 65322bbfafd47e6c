//! Drives a [`PhaseList`] over a module.
//!
//! Phases run strictly one after another. Inside a per-file group every
//! member phase is applied to all files (on the thread pool when one is
//! configured) and the group waits for every file before the next member
//! starts. File results are merged in file order so a parallel run reports
//! exactly what a sequential run would.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, info_span};

use super::{
    FileAction, FilePhase, ModuleAction, ModulePhase, PhaseDescriptor, PhaseList, Postcondition,
    Step,
    actions::{Moment, dump_module, validate_around},
    config::{PhaseConfig, ResolvedPhaseConfig},
};
use crate::{
    config::LoweringConfig,
    diagnostics::{Diagnostic, DiagnosticSink, Severity},
    error::{ConfigurationError, LoweringError, PassError},
    ir::{File, Module, Symbol, SymbolTable},
    lower::{FileContext, ModuleContext},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Phases that actually ran, in order
    pub executed: Vec<&'static str>,
    pub errors: usize,
    pub warnings: usize,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.errors == 0
    }
}

pub struct PhaseRunner<'a> {
    list: &'a PhaseList,
    phases: ResolvedPhaseConfig,
    config: &'a LoweringConfig,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

#[derive(Default)]
struct RunState {
    executed: Vec<&'static str>,
    /// Sticky postconditions of the phases run so far with the phase that
    /// introduced them
    active: Vec<(&'static str, Postcondition)>,
    dumps: usize,
}

struct FileOutcome {
    path: String,
    diagnostics: Vec<Diagnostic>,
    unbind_requests: Vec<Symbol>,
    result: Result<(), FileFailure>,
}

enum FileFailure {
    Pass(PassError),
    Validation(&'static str),
}

impl<'a> PhaseRunner<'a> {
    pub fn new(
        list: &'a PhaseList,
        phase_config: &PhaseConfig,
        config: &'a LoweringConfig,
    ) -> Result<Self, ConfigurationError> {
        let phases = phase_config.resolve(list)?;

        #[cfg(feature = "parallel")]
        let pool = match config.threads {
            1 => None,
            threads => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("lowering-{i}"))
                    .build()
                    .map_err(|err| ConfigurationError::ThreadPool(err.to_string()))?,
            ),
        };

        Ok(Self {
            list,
            phases,
            config,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    pub fn run(
        &self,
        module: &mut Module,
        sink: &dyn DiagnosticSink,
    ) -> Result<RunSummary, LoweringError> {
        let _span = info_span!("lowering", list = self.list.name, module = %module.name).entered();

        let sink = CountingSink::new(sink);
        let mut state = RunState::default();

        for step in self.list.steps() {
            match step {
                Step::Module(phase) => self.run_module_phase(phase, module, &sink, &mut state)?,
                Step::PerFile { name, phases, .. } => {
                    let _group = info_span!("group", name = *name).entered();

                    for phase in phases {
                        self.run_file_phase(phase, module, &sink, &mut state)?;
                    }
                }
            }
        }

        let summary = RunSummary {
            executed: state.executed,
            errors: sink.errors.load(Ordering::Relaxed),
            warnings: sink.warnings.load(Ordering::Relaxed),
        };

        info!(
            phases = summary.executed.len(),
            errors = summary.errors,
            warnings = summary.warnings,
            "lowering finished"
        );

        Ok(summary)
    }

    fn is_enabled(&self, descriptor: &PhaseDescriptor) -> bool {
        if self.phases.enabled.contains(descriptor.name) {
            true
        } else {
            debug!(phase = descriptor.name, "skipping disabled phase");
            false
        }
    }

    fn log_progress(&self, descriptor: &PhaseDescriptor, message: &str) {
        if self.phases.verbose.contains(descriptor.name) {
            info!(phase = descriptor.name, "{message}");
        } else {
            debug!(phase = descriptor.name, "{message}");
        }
    }

    fn run_module_phase(
        &self,
        phase: &ModulePhase,
        module: &mut Module,
        sink: &CountingSink<'_>,
        state: &mut RunState,
    ) -> Result<(), LoweringError> {
        let descriptor = &phase.descriptor;
        if !self.is_enabled(descriptor) {
            return Ok(());
        }

        let _span = info_span!("phase", name = descriptor.name).entered();
        self.before_phase(descriptor, module, state)?;
        self.log_progress(descriptor, "running module phase");

        match &phase.action {
            ModuleAction::Lower(pass) => {
                let ctx = ModuleContext {
                    config: self.config,
                    sink,
                };
                pass.lower(module, &ctx)
                    .map_err(|source| LoweringError::Pass {
                        phase: descriptor.name,
                        file: None,
                        source,
                    })?;
            }
            ModuleAction::Validate(validator) => {
                validator(module).map_err(|failure| LoweringError::Validation {
                    phase: descriptor.name,
                    when: "in",
                    location: failure.location(),
                    message: failure.message,
                })?;
            }
        }

        self.after_phase(descriptor, module, state)
    }

    fn run_file_phase(
        &self,
        phase: &FilePhase,
        module: &mut Module,
        sink: &CountingSink<'_>,
        state: &mut RunState,
    ) -> Result<(), LoweringError> {
        let descriptor = &phase.descriptor;
        if !self.is_enabled(descriptor) {
            return Ok(());
        }

        let _span = info_span!("phase", name = descriptor.name).entered();
        self.before_phase(descriptor, module, state)?;
        self.log_progress(descriptor, "running file phase");

        let Module { files, symbols, .. } = &mut *module;
        let shared: &SymbolTable = &*symbols;
        let config = self.config;

        let outcomes = self.for_each_file(files, |file| {
            debug!(file = %file.path, "lowering file");

            let mut ctx = FileContext::new(file.id, shared, config);
            let result = match &phase.action {
                FileAction::Lower(pass) => pass.lower(file, &mut ctx).map_err(FileFailure::Pass),
                FileAction::Validate(predicate) if (predicate.check)(file) => Ok(()),
                FileAction::Validate(predicate) => Err(FileFailure::Validation(predicate.name)),
            };

            let (diagnostics, unbind_requests) = ctx.into_parts();
            FileOutcome {
                path: file.path.clone(),
                diagnostics,
                unbind_requests,
                result,
            }
        });

        // Barrier: every file finished this phase
        let mut first_failure = None;
        for outcome in outcomes {
            for diagnostic in outcome.diagnostics {
                sink.report(diagnostic);
            }

            for symbol in outcome.unbind_requests {
                if let Err(err) = symbols.unbind(symbol) {
                    first_failure.get_or_insert((outcome.path.clone(), FileFailure::Pass(err.into())));
                }
            }

            if let Err(failure) = outcome.result {
                first_failure.get_or_insert((outcome.path, failure));
            }
        }

        if let Some((path, failure)) = first_failure {
            return Err(match failure {
                FileFailure::Pass(source) => LoweringError::Pass {
                    phase: descriptor.name,
                    file: Some(path),
                    source,
                },
                FileFailure::Validation(condition) => LoweringError::Validation {
                    phase: descriptor.name,
                    when: "in",
                    location: path,
                    message: format!("`{condition}` does not hold"),
                },
            });
        }

        self.after_phase(descriptor, module, state)
    }

    #[cfg(feature = "parallel")]
    fn for_each_file<R: Send>(
        &self,
        files: &mut [File],
        lower: impl Fn(&mut File) -> R + Send + Sync,
    ) -> Vec<R> {
        use rayon::prelude::*;

        match &self.pool {
            Some(pool) => pool.install(|| files.par_iter_mut().map(&lower).collect()),
            None => files.iter_mut().map(lower).collect(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn for_each_file<R: Send>(
        &self,
        files: &mut [File],
        lower: impl Fn(&mut File) -> R + Send + Sync,
    ) -> Vec<R> {
        files.iter_mut().map(lower).collect()
    }

    fn before_phase(
        &self,
        descriptor: &PhaseDescriptor,
        module: &Module,
        state: &mut RunState,
    ) -> Result<(), LoweringError> {
        if self.phases.validate_before.contains(descriptor.name) {
            validate_around(module, descriptor.name, Moment::Before)?;
        }

        if self.phases.dump_before.contains(descriptor.name) {
            state.dumps += 1;
            dump_module(
                module,
                descriptor.name,
                Moment::Before,
                self.phases.dump_directory.as_deref(),
                state.dumps,
            )?;
        }

        Ok(())
    }

    fn after_phase(
        &self,
        descriptor: &PhaseDescriptor,
        module: &Module,
        state: &mut RunState,
    ) -> Result<(), LoweringError> {
        state.executed.push(descriptor.name);

        if self.phases.dump_after.contains(descriptor.name) {
            state.dumps += 1;
            dump_module(
                module,
                descriptor.name,
                Moment::After,
                self.phases.dump_directory.as_deref(),
                state.dumps,
            )?;
        }

        state.active.extend(
            descriptor
                .sticky_postconditions
                .iter()
                .map(|condition| (descriptor.name, *condition)),
        );

        if self.phases.check_sticky_conditions {
            check_postconditions(&module.files, &state.active, descriptor.name)?;
        }

        if self.phases.validate_after.contains(descriptor.name) {
            validate_around(module, descriptor.name, Moment::After)?;
        }

        self.log_progress(descriptor, "phase finished");
        Ok(())
    }
}

fn check_postconditions(
    files: &[File],
    active: &[(&'static str, Postcondition)],
    current: &'static str,
) -> Result<(), LoweringError> {
    for (introduced_by, condition) in active {
        if let Some(file) = files.iter().find(|file| !(condition.check)(file)) {
            return Err(LoweringError::InvariantViolation {
                condition: condition.name,
                introduced_by: *introduced_by,
                broken_by: current,
                file: file.path.clone(),
            });
        }
    }

    Ok(())
}

/// Counts what passes through so the run summary can report totals.
struct CountingSink<'a> {
    inner: &'a dyn DiagnosticSink,
    errors: AtomicUsize,
    warnings: AtomicUsize,
}

impl<'a> CountingSink<'a> {
    fn new(inner: &'a dyn DiagnosticSink) -> Self {
        Self {
            inner,
            errors: AtomicUsize::new(0),
            warnings: AtomicUsize::new(0),
        }
    }
}

impl DiagnosticSink for CountingSink<'_> {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors.fetch_add(1, Ordering::Relaxed),
            Severity::Warning => self.warnings.fetch_add(1, Ordering::Relaxed),
        };
        self.inner.report(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        diagnostics::{DiagnosticCollector, DiagnosticKind},
        ir::{
            Span, SymbolKind, Type,
            builder::{self, BodyBuilder, ModuleBuilder},
            validate::validate_module,
        },
        lower::FileLoweringPass,
        phaser::{CompilerPhase, per_file, tests::Noop},
    };

    const NO_ANNOTATIONS: Postcondition = Postcondition::new("no annotations", has_no_annotations);

    fn has_no_annotations(file: &File) -> bool {
        file.declarations.iter().all(|d| d.annotations.is_empty())
    }

    struct StripAnnotations;

    impl FileLoweringPass for StripAnnotations {
        fn lower(&self, file: &mut File, _ctx: &mut FileContext<'_>) -> Result<(), PassError> {
            for declaration in &mut file.declarations {
                declaration.annotations.clear();
            }
            Ok(())
        }
    }

    struct Annotate;

    impl FileLoweringPass for Annotate {
        fn lower(&self, file: &mut File, _ctx: &mut FileContext<'_>) -> Result<(), PassError> {
            for declaration in &mut file.declarations {
                declaration.annotations.push(builder::int(0));
            }
            Ok(())
        }
    }

    /// Fails on every file but the first
    struct FailAfterFirst;

    impl FileLoweringPass for FailAfterFirst {
        fn lower(&self, file: &mut File, _ctx: &mut FileContext<'_>) -> Result<(), PassError> {
            if file.path == "a.kt" {
                Ok(())
            } else {
                Err(PassError::Malformed(format!("cannot lower {}", file.path)))
            }
        }
    }

    struct Report;

    impl FileLoweringPass for Report {
        fn lower(&self, file: &mut File, ctx: &mut FileContext<'_>) -> Result<(), PassError> {
            ctx.report(Diagnostic {
                severity: Severity::Warning,
                kind: DiagnosticKind::ExceptionInConstExpression,
                file: file.id,
                span: Span::DUMMY,
                declaration: None,
                message: file.path.clone(),
            });
            Ok(())
        }
    }

    fn module() -> Module {
        let mut builder = ModuleBuilder::new("test");

        for path in ["a.kt", "b.kt", "c.kt", "d.kt"] {
            let file = builder.add_file(path);
            let f = builder.declare(file, "f", SymbolKind::Function);
            builder.push(
                file,
                BodyBuilder::new().function(f, "f", Type::INT, Vec::new(), Some(builder::int(1))),
            );
        }

        builder.finish()
    }

    fn list(phases: Vec<FilePhase>) -> PhaseList {
        PhaseList::new(
            "Test",
            "test list",
            CompilerPhase::from(ModulePhase::validation(
                PhaseDescriptor::new("Validate", "validate the input"),
                validate_module,
            ))
            .then(per_file("Files", "file phases", phases)),
        )
        .unwrap()
    }

    fn run(
        list: &PhaseList,
        phases: &PhaseConfig,
        threads: usize,
        module: &mut Module,
    ) -> (Result<RunSummary, LoweringError>, Vec<Diagnostic>) {
        let config = LoweringConfig {
            threads,
            ..LoweringConfig::default()
        };
        let sink = DiagnosticCollector::new();
        let runner = PhaseRunner::new(list, phases, &config).unwrap();
        let result = runner.run(module, &sink);
        (result, sink.into_diagnostics())
    }

    #[test]
    fn phases_run_in_order_and_disabled_phases_are_skipped() {
        let list = list(vec![
            FilePhase::lowering(PhaseDescriptor::new("A", ""), Noop),
            FilePhase::lowering(PhaseDescriptor::new("B", ""), Noop),
            FilePhase::lowering(PhaseDescriptor::new("C", "").prerequisite("A"), Noop),
        ]);
        let phases = PhaseConfig {
            enabled: Some(vec!["Validate".into(), "A".into(), "C".into()]),
            ..PhaseConfig::default()
        };

        let (result, _) = run(&list, &phases, 1, &mut module());

        assert_eq!(result.unwrap().executed, vec!["Validate", "A", "C"]);
    }

    #[test]
    fn broken_sticky_postcondition_names_both_phases() {
        let list = list(vec![
            FilePhase::lowering(
                PhaseDescriptor::new("StripAnnotations", "").sticky(NO_ANNOTATIONS),
                StripAnnotations,
            ),
            FilePhase::lowering(PhaseDescriptor::new("Between", ""), Noop),
            FilePhase::lowering(PhaseDescriptor::new("Annotate", ""), Annotate),
        ]);

        let (result, _) = run(&list, &PhaseConfig::default(), 1, &mut module());

        match result {
            Err(LoweringError::InvariantViolation {
                condition,
                introduced_by,
                broken_by,
                file,
            }) => {
                assert_eq!(condition, "no annotations");
                assert_eq!(introduced_by, "StripAnnotations");
                assert_eq!(broken_by, "Annotate");
                assert_eq!(file, "a.kt");
            }
            other => panic!("expected an invariant violation, got {other:?}"),
        }

        // Without sticky checks the same list runs through
        let phases = PhaseConfig {
            check_sticky_conditions: false,
            ..PhaseConfig::default()
        };
        let (result, _) = run(&list, &phases, 1, &mut module());
        assert!(result.is_ok());
    }

    #[test]
    fn pass_errors_name_the_first_failing_file() {
        let list = list(vec![FilePhase::lowering(
            PhaseDescriptor::new("Fail", ""),
            FailAfterFirst,
        )]);

        for threads in [1, 4] {
            let (result, _) = run(&list, &PhaseConfig::default(), threads, &mut module());

            match result {
                Err(LoweringError::Pass { phase, file, .. }) => {
                    assert_eq!(phase, "Fail");
                    assert_eq!(file.as_deref(), Some("b.kt"));
                }
                other => panic!("expected a pass error, got {other:?}"),
            }
        }
    }

    #[test]
    fn file_diagnostics_are_reported_in_file_order() {
        let list = list(vec![FilePhase::lowering(PhaseDescriptor::new("Report", ""), Report)]);

        let (result, diagnostics) = run(&list, &PhaseConfig::default(), 4, &mut module());

        assert_eq!(result.unwrap().warnings, 4);
        let order = diagnostics.iter().map(|d| d.message.as_str()).collect::<Vec<_>>();
        assert_eq!(order, vec!["a.kt", "b.kt", "c.kt", "d.kt"]);
    }

    #[test]
    fn validation_phases_fail_on_broken_input() {
        let list = list(vec![FilePhase::lowering(PhaseDescriptor::new("A", ""), Noop)]);
        let mut module = module();
        // A declaration whose symbol belongs to another file
        let moved = module.files[1].declarations[0].clone();
        module.files[0].declarations.push(moved);

        let (result, _) = run(&list, &PhaseConfig::default(), 1, &mut module);

        assert!(
            matches!(result, Err(LoweringError::Validation { phase: "Validate", .. })),
            "{result:?}"
        );
    }

    #[test]
    fn dumps_are_written_to_the_dump_directory() {
        let directory = mktemp::Temp::new_dir().unwrap();
        let list = list(vec![FilePhase::lowering(PhaseDescriptor::new("A", ""), Noop)]);
        let phases = PhaseConfig {
            dump_before: vec!["A".into()],
            dump_after: vec!["Files".into()],
            dump_directory: Some(directory.as_path().to_path_buf()),
            ..PhaseConfig::default()
        };

        let (result, _) = run(&list, &phases, 1, &mut module());
        result.unwrap();

        let before = std::fs::read_to_string(directory.as_path().join("01_A_before.ir")).unwrap();
        let after = std::fs::read_to_string(directory.as_path().join("02_A_after.ir")).unwrap();

        assert_eq!(before, after);
        assert!(before.contains("a.kt"));
        assert!(!before.contains('\u{1b}'));
    }
}
