use std::path::PathBuf;

use hashbrown::HashSet;

use super::PhaseList;
use crate::error::ConfigurationError;

/// Selects which phases run and which debugging actions run around them.
/// Every name is either a phase or a per-file group of the selected list.
/// `ALL` stands for every phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseConfig {
    /// Allow-list of phases to run, `None` runs all of them
    pub enabled: Option<Vec<String>>,
    /// Phases whose progress is logged at info level
    pub verbose: Vec<String>,
    pub dump_before: Vec<String>,
    pub dump_after: Vec<String>,
    /// Write dumps to files in this directory instead of standard output
    pub dump_directory: Option<PathBuf>,
    pub validate_before: Vec<String>,
    pub validate_after: Vec<String>,
    pub check_sticky_conditions: bool,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            verbose: Vec::new(),
            dump_before: Vec::new(),
            dump_after: Vec::new(),
            dump_directory: None,
            validate_before: Vec::new(),
            validate_after: Vec::new(),
            check_sticky_conditions: true,
        }
    }
}

/// A [`PhaseConfig`] checked against a phase list, with group names expanded.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPhaseConfig {
    pub enabled: HashSet<&'static str>,
    pub verbose: HashSet<&'static str>,
    pub dump_before: HashSet<&'static str>,
    pub dump_after: HashSet<&'static str>,
    pub dump_directory: Option<PathBuf>,
    pub validate_before: HashSet<&'static str>,
    pub validate_after: HashSet<&'static str>,
    pub check_sticky_conditions: bool,
}

impl PhaseConfig {
    pub fn resolve(&self, list: &PhaseList) -> Result<ResolvedPhaseConfig, ConfigurationError> {
        let enabled = match &self.enabled {
            Some(names) => expand(list, names, "the enabled phases")?,
            None => list.phase_names().into_iter().collect(),
        };

        // Running a phase without its prerequisites would lower IR it was
        // never written to handle
        for descriptor in list.descriptors() {
            if !enabled.contains(descriptor.name) {
                continue;
            }

            for prerequisite in &descriptor.prerequisites {
                if !enabled.contains(prerequisite) {
                    return Err(ConfigurationError::MissingPrerequisite {
                        phase: descriptor.name,
                        prerequisite: *prerequisite,
                    });
                }
            }
        }

        Ok(ResolvedPhaseConfig {
            enabled,
            verbose: expand(list, &self.verbose, "verbose phases")?,
            dump_before: expand(list, &self.dump_before, "dump before")?,
            dump_after: expand(list, &self.dump_after, "dump after")?,
            dump_directory: self.dump_directory.clone(),
            validate_before: expand(list, &self.validate_before, "validate before")?,
            validate_after: expand(list, &self.validate_after, "validate after")?,
            check_sticky_conditions: self.check_sticky_conditions,
        })
    }
}

fn expand(
    list: &PhaseList,
    names: &[String],
    option: &'static str,
) -> Result<HashSet<&'static str>, ConfigurationError> {
    let mut expanded = HashSet::new();

    for name in names {
        if name.eq_ignore_ascii_case("all") {
            expanded.extend(list.phase_names());
        } else if let Some(members) = list.group_members(name) {
            expanded.extend(members);
        } else if let Some(descriptor) = list.descriptor(name) {
            expanded.insert(descriptor.name);
        } else {
            return Err(ConfigurationError::UnknownPhase {
                name: name.clone(),
                option,
            });
        }
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phaser::{FilePhase, PhaseDescriptor, per_file, tests::Noop};

    fn list() -> PhaseList {
        PhaseList::new(
            "Test",
            "test list",
            per_file(
                "Group",
                "",
                vec![
                    FilePhase::lowering(PhaseDescriptor::new("A", ""), Noop),
                    FilePhase::lowering(PhaseDescriptor::new("B", "").prerequisite("A"), Noop),
                ],
            ),
        )
        .unwrap()
    }

    #[test]
    fn everything_is_enabled_by_default() {
        let resolved = PhaseConfig::default().resolve(&list()).unwrap();

        assert!(resolved.enabled.contains("A"));
        assert!(resolved.enabled.contains("B"));
        assert!(resolved.dump_after.is_empty());
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        let config = PhaseConfig {
            dump_after: vec!["Bogus".into()],
            ..Default::default()
        };

        assert_eq!(
            config.resolve(&list()).err(),
            Some(ConfigurationError::UnknownPhase {
                name: "Bogus".into(),
                option: "dump after"
            })
        );
    }

    #[test]
    fn disabling_a_prerequisite_is_rejected() {
        let config = PhaseConfig {
            enabled: Some(vec!["B".into()]),
            ..Default::default()
        };

        assert_eq!(
            config.resolve(&list()).err(),
            Some(ConfigurationError::MissingPrerequisite {
                phase: "B",
                prerequisite: "A"
            })
        );
    }

    #[test]
    fn group_names_expand_to_members() {
        let config = PhaseConfig {
            enabled: Some(vec!["Group".into()]),
            validate_after: vec!["all".into()],
            ..Default::default()
        };

        let resolved = config.resolve(&list()).unwrap();
        assert_eq!(resolved.enabled.len(), 2);
        assert_eq!(resolved.validate_after.len(), 2);
    }
}
