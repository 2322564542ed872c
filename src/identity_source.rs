//! Lookup of an already-known identity by relative path.
//!
//! While scanning one root, the scanner asks the other root whether it already
//! tracks an identity at the same path. This lets two fresh roots that start out
//! as copies of each other agree on identities from their very first scan.

use crate::index_file::CurrentPaths;

pub trait IdentitySource {
    /// Identity currently at `relative_path`, if this source knows one.
    fn identity_for_path(&self, relative_path: &str) -> Option<String>;
}

/// Source that never knows anything. Used when bootstrapping is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSource;

impl IdentitySource for NullSource {
    fn identity_for_path(&self, _relative_path: &str) -> Option<String> {
        None
    }
}

/// Tries each source in order and returns the first answer.
#[derive(Default)]
pub struct CompositeSource<'a> {
    sources: Vec<&'a dyn IdentitySource>,
}

impl<'a> CompositeSource<'a> {
    pub fn new(sources: Vec<&'a dyn IdentitySource>) -> Self {
        CompositeSource { sources }
    }
}

impl IdentitySource for CompositeSource<'_> {
    fn identity_for_path(&self, relative_path: &str) -> Option<String> {
        self.sources
            .iter()
            .find_map(|source| source.identity_for_path(relative_path))
    }
}

impl IdentitySource for CurrentPaths {
    fn identity_for_path(&self, relative_path: &str) -> Option<String> {
        self.get(relative_path).map(str::to_string)
    }
}
