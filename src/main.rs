use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{CommandFactory, Parser, ValueEnum, error::ErrorKind};
use colored::Colorize;
use lowerc::{
    backend::phase_list_by_name,
    config::{ConstEvalConfig, EvaluationMode, FailurePolicy, LoweringConfig},
    diagnostics::DiagnosticCollector,
    ir::{Module, pretty_print::pretty_print_module},
    phaser::{config::PhaseConfig, engine::PhaseRunner},
};
use tracing::{debug, error};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON serialized module to lower
    module: Option<PathBuf>,

    /// Phase list to run
    #[arg(long, default_value = "ir-lowering")]
    phases: String,

    /// Only run these phases (comma separated, `all` for every phase)
    #[arg(long, value_delimiter = ',')]
    enable: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    dump_before: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    dump_after: Vec<String>,

    /// Write dumps to this directory instead of standard output
    #[arg(long)]
    dump_directory: Option<PathBuf>,

    #[arg(long, value_delimiter = ',')]
    validate_before: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    validate_after: Vec<String>,

    /// Log the progress of these phases at info level
    #[arg(long, value_delimiter = ',')]
    verbose_phase: Vec<String>,

    /// Skip checking sticky postconditions after every phase
    #[arg(long)]
    no_sticky_checks: bool,

    #[arg(long, value_enum, default_value_t = EvaluationMode::default())]
    const_eval: EvaluationMode,

    #[arg(long, value_enum, default_value_t = FailurePolicy::default())]
    const_failure: FailurePolicy,

    /// Worker threads for per-file phases, 0 picks one per core
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Print the selected phase list and exit
    #[arg(long)]
    list_phases: bool,

    /// Do not print the lowered module
    #[arg(long)]
    quiet_output: bool,

    /// Enable verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Set log level (overrides --verbose/--quiet)
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.verbose, args.quiet, args.log_level);

    let list = match phase_list_by_name(&args.phases) {
        Ok(list) => list,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if args.list_phases {
        print!("{}", list.outline());
        return ExitCode::SUCCESS;
    }

    let Some(path) = &args.module else {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing module file!")
            .exit();
    };

    let mut module = match read_module(path) {
        Ok(module) => module,
        Err(message) => {
            Args::command().error(ErrorKind::InvalidValue, message).exit();
        }
    };

    let phase_config = PhaseConfig {
        enabled: args.enable.clone(),
        verbose: args.verbose_phase.clone(),
        dump_before: args.dump_before.clone(),
        dump_after: args.dump_after.clone(),
        dump_directory: args.dump_directory.clone(),
        validate_before: args.validate_before.clone(),
        validate_after: args.validate_after.clone(),
        check_sticky_conditions: !args.no_sticky_checks,
    };

    let config = LoweringConfig {
        const_eval: ConstEvalConfig {
            mode: args.const_eval,
            failure_policy: args.const_failure,
            ..Default::default()
        },
        threads: args.threads,
    };

    let runner = match PhaseRunner::new(&list, &phase_config, &config) {
        Ok(runner) => runner,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let collector = DiagnosticCollector::new();
    let result = runner.run(&mut module, &collector);

    for diagnostic in collector.diagnostics() {
        let path = module
            .file(diagnostic.file)
            .map(|file| file.path.as_str())
            .unwrap_or("<unknown>");
        eprintln!("{}", diagnostic.render(path));
    }

    match result {
        Ok(summary) => {
            debug!(executed = ?summary.executed, "phases executed");

            if !args.quiet_output {
                print!("{}", pretty_print_module(&module));
            }

            if summary.succeeded() {
                ExitCode::SUCCESS
            } else {
                eprintln!(
                    "{} lowering produced {} error(s)",
                    "error:".red().bold(),
                    summary.errors
                );
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn read_module(path: &Path) -> Result<Module, String> {
    if !path.is_file() {
        return Err(format!("Module file '{}' does not exist!", path.display()));
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|err| format!("Could not read '{}': {err}", path.display()))?;

    serde_json::from_str(&contents)
        .map_err(|err| format!("'{}' is not a valid module: {err}", path.display()))
}

fn setup_logging(verbose: u8, quiet: bool, log_level: Option<LogLevel>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if let Some(level) = log_level {
        EnvFilter::new(match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        })
    };

    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true);

    tracing_subscriber::registry()
        .with(formatter)
        .with(filter)
        .init();
}
