//! Named fixture scopes
//!
//! Scopes are merged top-down while the runner descends the tree: a
//! child's fixtures shadow same-named fixtures of its ancestors.

#[cfg(test)]
use serde_json::Value;
use std::sync::Arc;

use super::engine::Fixture;

/// Ordered mapping from name to fixture
#[derive(Clone, Debug, Default)]
pub struct FixtureScope {
    entries: Vec<(String, Arc<Fixture>)>,
}

impl FixtureScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixture under its own name, replacing any previous entry
    pub fn with(mut self, fixture: Arc<Fixture>) -> Self {
        self.insert(fixture.name().to_string(), fixture);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, fixture: Arc<Fixture>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = fixture,
            None => self.entries.push((name, fixture)),
        }
    }

    /// Inherited scope overlaid with `own`; the inputs are unchanged
    pub fn merge(&self, own: &FixtureScope) -> FixtureScope {
        let mut merged = self.clone();
        for (name, fixture) in &own.entries {
            merged.insert(name.clone(), Arc::clone(fixture));
        }
        merged
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Fixture>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, fixture)| fixture)
    }

    /// Value of a fixture, if it is in scope
    #[cfg(test)]
    pub fn value(&self, name: &str) -> Option<Value> {
        self.get(name).map(|fixture| fixture.value())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn fixtures(&self) -> impl DoubleEndedIterator<Item = &Arc<Fixture>> {
        self.entries.iter().map(|(_, fixture)| fixture)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Fixture>)> {
        self.entries.iter().map(|(name, fixture)| (name.as_str(), fixture))
    }
}

impl FromIterator<Arc<Fixture>> for FixtureScope {
    fn from_iter<I: IntoIterator<Item = Arc<Fixture>>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), Self::with)
    }
}
