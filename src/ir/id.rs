use serde::{Deserialize, Serialize};

use crate::index::simple_index;

simple_index! {
    /// Identifies a file within the module being lowered.
    pub struct FileId;
}

simple_index! {
    /// Identifies a local variable within a single [`Body`](super::Body).
    /// Parameters occupy the first ids, temporaries created by lowerings are
    /// appended after the source locals.
    pub struct LocalId;
}

impl LocalId {
    /// The implicit receiver of constructors and member initializers
    pub const THIS: Self = Self(0);
}

/// Byte offsets of the source element an IR node was produced from. Synthetic
/// nodes inherit the span of the node they replace.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const DUMMY: Self = Self { start: 0, end: 0 };

    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

impl core::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
