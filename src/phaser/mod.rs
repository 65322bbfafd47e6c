//! Phase descriptors, composition and static validation of phase lists.
//!
//! A phase list is pure configuration: it is built once, checked for
//! duplicate names, prerequisite cycles and prerequisite ordering, and then
//! only read by the [`engine`] while a module is lowered.

pub mod actions;
pub mod config;
pub mod engine;

use hashbrown::{HashMap, HashSet};
use itertools::{Either, Itertools};

use crate::{
    error::ConfigurationError,
    ir::{File, Module, validate::ValidationFailure},
    lower::{FileLoweringPass, ModuleLoweringPass},
};

/// A named invariant over a lowered file.
#[derive(Clone, Copy)]
pub struct Postcondition {
    pub name: &'static str,
    pub check: fn(&File) -> bool,
}

impl Postcondition {
    pub const fn new(name: &'static str, check: fn(&File) -> bool) -> Self {
        Self { name, check }
    }
}

impl core::fmt::Debug for Postcondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Postcondition").field(&self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct PhaseDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub prerequisites: Vec<&'static str>,
    /// Hold after this phase and every phase after it
    pub sticky_postconditions: Vec<Postcondition>,
}

impl PhaseDescriptor {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            prerequisites: Vec::new(),
            sticky_postconditions: Vec::new(),
        }
    }

    pub fn prerequisite(mut self, name: &'static str) -> Self {
        self.prerequisites.push(name);
        self
    }

    pub fn sticky(mut self, postcondition: Postcondition) -> Self {
        self.sticky_postconditions.push(postcondition);
        self
    }
}

pub type ModuleValidator = fn(&Module) -> Result<(), ValidationFailure>;

pub enum ModuleAction {
    Lower(Box<dyn ModuleLoweringPass>),
    /// Fails the run with a compiler-internal error when the check fails
    Validate(ModuleValidator),
}

pub struct ModulePhase {
    pub descriptor: PhaseDescriptor,
    pub action: ModuleAction,
}

impl ModulePhase {
    pub fn lowering(descriptor: PhaseDescriptor, pass: impl ModuleLoweringPass + 'static) -> Self {
        Self {
            descriptor,
            action: ModuleAction::Lower(Box::new(pass)),
        }
    }

    pub fn validation(descriptor: PhaseDescriptor, validator: ModuleValidator) -> Self {
        Self {
            descriptor,
            action: ModuleAction::Validate(validator),
        }
    }
}

pub enum FileAction {
    Lower(Box<dyn FileLoweringPass>),
    Validate(Postcondition),
}

pub struct FilePhase {
    pub descriptor: PhaseDescriptor,
    pub action: FileAction,
}

impl FilePhase {
    pub fn lowering(descriptor: PhaseDescriptor, pass: impl FileLoweringPass + 'static) -> Self {
        Self {
            descriptor,
            action: FileAction::Lower(Box::new(pass)),
        }
    }

    /// A pseudo phase asserting `predicate` on every file
    pub fn validate(
        name: &'static str,
        description: &'static str,
        predicate: Postcondition,
    ) -> Self {
        Self {
            descriptor: PhaseDescriptor::new(name, description),
            action: FileAction::Validate(predicate),
        }
    }
}

/// A composable unit of the phase list.
pub enum CompilerPhase {
    Module(ModulePhase),
    /// Every member phase runs on all files independently, then the group
    /// synchronizes before the next member starts.
    PerFile {
        name: &'static str,
        description: &'static str,
        phases: Vec<FilePhase>,
    },
    Sequence(Vec<CompilerPhase>),
}

impl CompilerPhase {
    /// Runs `self` to completion on the whole module, then `next`
    pub fn then(self, next: impl Into<CompilerPhase>) -> CompilerPhase {
        let mut phases = match self {
            CompilerPhase::Sequence(phases) => phases,
            other => vec![other],
        };

        match next.into() {
            CompilerPhase::Sequence(rest) => phases.extend(rest),
            other => phases.push(other),
        }

        CompilerPhase::Sequence(phases)
    }
}

impl From<ModulePhase> for CompilerPhase {
    fn from(value: ModulePhase) -> Self {
        CompilerPhase::Module(value)
    }
}

pub fn sequence(first: impl Into<CompilerPhase>, second: impl Into<CompilerPhase>) -> CompilerPhase {
    first.into().then(second)
}

pub fn per_file(
    name: &'static str,
    description: &'static str,
    phases: Vec<FilePhase>,
) -> CompilerPhase {
    CompilerPhase::PerFile {
        name,
        description,
        phases,
    }
}

/// A flattened element of a phase list.
pub enum Step {
    Module(ModulePhase),
    PerFile {
        name: &'static str,
        description: &'static str,
        phases: Vec<FilePhase>,
    },
}

/// A validated, ordered list of phases.
pub struct PhaseList {
    pub name: &'static str,
    pub description: &'static str,
    steps: Vec<Step>,
}

impl PhaseList {
    pub fn new(
        name: &'static str,
        description: &'static str,
        root: CompilerPhase,
    ) -> Result<Self, ConfigurationError> {
        let mut steps = Vec::new();
        flatten(root, &mut steps);

        let list = Self {
            name,
            description,
            steps,
        };
        list.check()?;

        Ok(list)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Descriptors of every phase in execution order
    pub fn descriptors(&self) -> impl Iterator<Item = &PhaseDescriptor> {
        self.steps.iter().flat_map(|step| match step {
            Step::Module(phase) => Either::Left(std::iter::once(&phase.descriptor)),
            Step::PerFile { phases, .. } => Either::Right(phases.iter().map(|p| &p.descriptor)),
        })
    }

    pub fn phase_names(&self) -> Vec<&'static str> {
        self.descriptors().map(|d| d.name).collect()
    }

    /// Member phases of the per-file group called `name`
    pub fn group_members(&self, name: &str) -> Option<Vec<&'static str>> {
        self.steps.iter().find_map(|step| match step {
            Step::PerFile {
                name: group,
                phases,
                ..
            } if *group == name => Some(phases.iter().map(|p| p.descriptor.name).collect()),
            _ => None,
        })
    }

    pub fn descriptor(&self, name: &str) -> Option<&PhaseDescriptor> {
        self.descriptors().find(|d| d.name == name)
    }

    /// Human readable outline of the list, used by `--list-phases`
    pub fn outline(&self) -> String {
        let mut out = format!("{}: {}\n", self.name, self.description);

        for step in &self.steps {
            match step {
                Step::Module(phase) => {
                    out.push_str(&describe_phase(&phase.descriptor, 1));
                }
                Step::PerFile {
                    name,
                    description,
                    phases,
                } => {
                    out.push_str(&format!("  {name} (per file): {description}\n"));
                    for phase in phases {
                        out.push_str(&describe_phase(&phase.descriptor, 2));
                    }
                }
            }
        }

        out
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        let descriptors = self.descriptors().collect::<Vec<_>>();

        // Unique names, group names included
        let mut seen = HashSet::new();
        let group_names = self.steps.iter().filter_map(|step| match step {
            Step::PerFile { name, .. } => Some(*name),
            Step::Module(_) => None,
        });
        for name in descriptors.iter().map(|d| d.name).chain(group_names) {
            if !seen.insert(name) {
                return Err(ConfigurationError::DuplicatePhase(name));
            }
        }

        let by_name = descriptors
            .iter()
            .map(|d| (d.name, *d))
            .collect::<HashMap<_, _>>();

        for descriptor in &descriptors {
            for prerequisite in &descriptor.prerequisites {
                if !by_name.contains_key(prerequisite) {
                    return Err(ConfigurationError::MissingPrerequisite {
                        phase: descriptor.name,
                        prerequisite: *prerequisite,
                    });
                }
            }
        }

        if let Some(cycle) = find_cycle(&descriptors, &by_name) {
            return Err(ConfigurationError::PhaseCycle(cycle));
        }

        let position = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name, i))
            .collect::<HashMap<_, _>>();

        for (index, descriptor) in descriptors.iter().enumerate() {
            for prerequisite in &descriptor.prerequisites {
                if position[prerequisite] >= index {
                    return Err(ConfigurationError::PrerequisiteOutOfOrder {
                        phase: descriptor.name,
                        prerequisite: *prerequisite,
                    });
                }
            }
        }

        Ok(())
    }
}

fn describe_phase(descriptor: &PhaseDescriptor, depth: usize) -> String {
    let mut line = format!(
        "{}{}: {}",
        "  ".repeat(depth),
        descriptor.name,
        descriptor.description
    );

    if !descriptor.prerequisites.is_empty() {
        line.push_str(&format!(
            " [requires {}]",
            descriptor.prerequisites.iter().join(", ")
        ));
    }

    line.push('\n');
    line
}

fn flatten(phase: CompilerPhase, steps: &mut Vec<Step>) {
    match phase {
        CompilerPhase::Module(phase) => steps.push(Step::Module(phase)),
        CompilerPhase::PerFile {
            name,
            description,
            phases,
        } => steps.push(Step::PerFile {
            name,
            description,
            phases,
        }),
        CompilerPhase::Sequence(phases) => {
            for phase in phases {
                flatten(phase, steps);
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth first search over the prerequisite graph. Returns the offending path
/// with the repeated phase at both ends.
fn find_cycle(
    descriptors: &[&PhaseDescriptor],
    by_name: &HashMap<&'static str, &PhaseDescriptor>,
) -> Option<Vec<&'static str>> {
    fn visit(
        name: &'static str,
        by_name: &HashMap<&'static str, &PhaseDescriptor>,
        marks: &mut HashMap<&'static str, Mark>,
        path: &mut Vec<&'static str>,
    ) -> Option<Vec<&'static str>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(name);
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        path.push(name);

        if let Some(descriptor) = by_name.get(name) {
            for prerequisite in &descriptor.prerequisites {
                if let Some(cycle) = visit(*prerequisite, by_name, marks, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        marks.insert(name, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    descriptors
        .iter()
        .find_map(|d| visit(d.name, by_name, &mut marks, &mut Vec::new()))
}
