use ahash::AHashMap;

/// Single-inheritance class hierarchy of the simulation's object types.
///
/// The live object model owns the real hierarchy; this is the snapshot of it
/// the filter and capture workers consult.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    parents: AHashMap<String, Option<String>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `class` under `parent`. Re-registering replaces the parent.
    pub fn register(&mut self, class: impl Into<String>, parent: Option<&str>) -> &mut Self {
        self.parents
            .insert(class.into(), parent.map(|p| p.to_string()));
        self
    }

    pub fn with_class(mut self, class: &str, parent: Option<&str>) -> Self {
        self.register(class, parent);
        self
    }

    pub fn contains(&self, class: &str) -> bool {
        self.parents.contains_key(class)
    }

    pub fn parent_of(&self, class: &str) -> Option<&str> {
        self.parents.get(class).and_then(|p| p.as_deref())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(|c| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Walks from `class` up to its root, starting with `class` itself.
    pub fn lineage<'a>(&'a self, class: &'a str) -> Lineage<'a> {
        Lineage {
            registry: self,
            next: Some(class),
            remaining: self.parents.len() + 1,
        }
    }

    pub fn is_child_of(&self, class: &str, ancestor: &str) -> bool {
        self.lineage(class).any(|c| c == ancestor)
    }
}

pub struct Lineage<'a> {
    registry: &'a ClassRegistry,
    next: Option<&'a str>,
    // Guards against cycles in a malformed registry.
    remaining: usize,
}

impl<'a> Iterator for Lineage<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.next?;
        self.next = self.registry.parent_of(current);
        Some(current)
    }
}
