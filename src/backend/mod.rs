//! Backends own the phase lists that lower the IR for their target. Only the
//! JVM backend exists so far.

pub mod jvm;

use crate::{error::ConfigurationError, phaser::PhaseList};

/// Looks a phase list up by its name (`IrLowering`) or by its command line
/// spelling (`ir-lowering`).
pub fn phase_list_by_name(name: &str) -> Result<PhaseList, ConfigurationError> {
    match name {
        jvm::IR_LOWERING | "ir-lowering" => jvm::jvm_lowering_phases(),
        jvm::IR_FRAGMENT_LOWERING | "ir-fragment-lowering" => jvm::jvm_fragment_lowering_phases(),
        other => Err(ConfigurationError::UnknownPhaseList(other.to_owned())),
    }
}
