use crate::class::ClassRegistry;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Allow/deny policy over classes.
///
/// A class is allowed when the closest class in its lineage that appears in
/// either list is an allowed one. Listing a class in both lists denies it.
///
/// Evaluating rules means walking the hierarchy, so a save bakes the filter
/// once up front and the capture workers share the baked set read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassFilter {
    pub allowed_classes: Vec<String>,
    pub ignored_classes: Vec<String>,
    #[serde(skip)]
    baked: Option<AHashSet<String>>,
}

impl ClassFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allowing(base: &str) -> Self {
        Self::new().allow(base)
    }

    pub fn allow(mut self, class: &str) -> Self {
        self.allowed_classes.push(class.to_string());
        self.baked = None;
        self
    }

    pub fn ignore(mut self, class: &str) -> Self {
        self.ignored_classes.push(class.to_string());
        self.baked = None;
        self
    }

    pub fn is_baked(&self) -> bool {
        self.baked.is_some()
    }

    /// Precomputes the allowed set for every class in `registry`.
    pub fn bake(&mut self, registry: &ClassRegistry) {
        let baked = registry
            .classes()
            .filter(|class| self.evaluate(class, registry))
            .map(|class| class.to_string())
            .collect::<AHashSet<_>>();

        log::debug!(
            "Baked class filter: {} of {} classes allowed",
            baked.len(),
            registry.len()
        );
        self.baked = Some(baked);
    }

    /// Returns a baked copy, leaving `self` untouched.
    pub fn baked(&self, registry: &ClassRegistry) -> Self {
        let mut filter = self.clone();
        filter.bake(registry);
        filter
    }

    /// Uses the baked set when present. Classes missing from a baked set are
    /// evaluated against the rules so late-registered classes still resolve.
    pub fn is_class_allowed(&self, class: &str, registry: &ClassRegistry) -> bool {
        match &self.baked {
            Some(set) if set.contains(class) => true,
            Some(_) if registry.contains(class) => false,
            _ => self.evaluate(class, registry),
        }
    }

    fn evaluate(&self, class: &str, registry: &ClassRegistry) -> bool {
        for ancestor in registry.lineage(class) {
            if self.ignored_classes.iter().any(|c| c == ancestor) {
                return false;
            }
            if self.allowed_classes.iter().any(|c| c == ancestor) {
                return true;
            }
        }
        false
    }
}
