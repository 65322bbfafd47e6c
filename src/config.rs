use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which expressions the constant evaluator is allowed to interpret.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationMode {
    /// Literals, builtin operators, string templates and `const` fields
    Builtins,
    /// Additionally calls to functions marked as compiler evaluable
    #[default]
    IntrinsicConst,
    /// Additionally calls to any function whose body is interpretable
    Full,
}

/// What an interpreter failure turns into.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// An error diagnostic, the build fails
    Strict,
    /// A warning, the expression is kept as is
    #[default]
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstEvalConfig {
    pub mode: EvaluationMode,
    pub failure_policy: FailurePolicy,
    /// Drop interpreter failures without reporting anything. Only meant for
    /// resilience testing.
    pub suppress_exceptions: bool,
    pub step_limit: u64,
    pub call_depth_limit: usize,
}

impl Default for ConstEvalConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::default(),
            failure_policy: FailurePolicy::default(),
            suppress_exceptions: false,
            step_limit: 100_000,
            call_depth_limit: 64,
        }
    }
}

/// Settings shared by every lowering pass of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringConfig {
    pub const_eval: ConstEvalConfig,
    /// Worker threads for per-file phases. `0` picks one per core, `1` runs
    /// files sequentially.
    pub threads: usize,
}

impl Default for LoweringConfig {
    fn default() -> Self {
        Self {
            const_eval: ConstEvalConfig::default(),
            threads: 0,
        }
    }
}
