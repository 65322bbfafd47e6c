//! Debugging actions attached to phases: IR dumps and structural validation.

use std::path::Path;

use strum::Display;
use tracing::debug;

use crate::{
    error::LoweringError,
    ir::{Module, pretty_print::pretty_print_module, validate::validate_module},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Moment {
    Before,
    After,
}

/// Prints the module, or writes it without colors to
/// `<directory>/<NN>_<phase>_<moment>.ir`. `sequence` orders the files of one
/// run.
pub fn dump_module(
    module: &Module,
    phase: &'static str,
    moment: Moment,
    directory: Option<&Path>,
    sequence: usize,
) -> Result<(), LoweringError> {
    let rendered = pretty_print_module(module);

    match directory {
        Some(directory) => {
            let path = directory.join(format!("{sequence:02}_{phase}_{moment}.ir"));
            let plain = strip_ansi_escapes::strip_str(&rendered);

            std::fs::create_dir_all(directory)
                .and_then(|_| std::fs::write(&path, plain))
                .map_err(|source| LoweringError::Dump {
                    path: path.clone(),
                    source,
                })?;

            debug!(path = %path.display(), "wrote IR dump");
        }
        None => {
            println!("// IR {moment} {phase}");
            print!("{rendered}");
        }
    }

    Ok(())
}

pub fn validate_around(
    module: &Module,
    phase: &'static str,
    moment: Moment,
) -> Result<(), LoweringError> {
    validate_module(module).map_err(|failure| LoweringError::Validation {
        phase,
        when: match moment {
            Moment::Before => "before",
            Moment::After => "after",
        },
        location: failure.location(),
        message: failure.message,
    })
}
