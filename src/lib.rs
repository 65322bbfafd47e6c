//! A phase based lowering engine for a Kotlin style IR.
//!
//! A [`phaser::PhaseList`] composes lowering passes into ordered module
//! phases and per-file groups, checks their prerequisites, and lets a
//! [`phaser::engine::PhaseRunner`] apply them to an [`ir::Module`] with
//! optional dumps, validation and sticky postcondition checks. The passes
//! themselves live in [`lower`] and the JVM phase lists in [`backend::jvm`].

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod intern;
pub mod ir;
pub mod lower;
pub mod phaser;
