// ABOUTME: Set of registry prefixes known for the current workflow.
// ABOUTME: Drives prefix trimming in file names and the registry alias symlinks.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySet(BTreeSet<String>);

impl RegistrySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registry, ignoring blanks and trailing slashes.
    pub fn insert(&mut self, registry: &str) -> bool {
        let registry = registry.trim().trim_end_matches('/');
        if registry.is_empty() {
            return false;
        }
        self.0.insert(registry.to_string())
    }

    pub fn contains(&self, registry: &str) -> bool {
        self.0.contains(registry)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Registries ordered longest first, ties broken alphabetically.
    pub fn longest_first(&self) -> Vec<&str> {
        let mut registries: Vec<&str> = self.iter().collect();
        registries.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        registries
    }
}

impl<S: AsRef<str>> FromIterator<S> for RegistrySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<S: AsRef<str>> Extend<S> for RegistrySet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for registry in iter {
            self.insert(registry.as_ref());
        }
    }
}
