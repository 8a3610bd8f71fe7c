use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhysicsState {
    pub simulating: bool,
    pub linear_velocity: [f32; 3],
    pub angular_velocity: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub name: String,
    pub class: String,
    pub transform: Option<Transform>,
    pub tags: Vec<String>,
    pub properties: Vec<u8>,
    pub children: Vec<ComponentRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub class: String,
    pub transform: Option<Transform>,
    pub physics: Option<PhysicsState>,
    pub tags: Vec<String>,
    /// Spawned while the game ran rather than placed in the level, so a load
    /// has to instantiate it instead of finding it.
    pub spawned_at_runtime: bool,
    pub components: Vec<ComponentRecord>,
    pub properties: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LevelKey {
    /// The world's persistent level.
    Main,
    /// A streamed sub-level, identified by its package name.
    Streaming(String),
}

impl std::fmt::Display for LevelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelKey::Main => f.write_str("Persistent"),
            LevelKey::Streaming(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub key: LevelKey,
    pub entities: Vec<EntityRecord>,
}

impl LevelRecord {
    pub fn new(key: LevelKey) -> Self {
        Self {
            key,
            entities: Vec::new(),
        }
    }

    pub fn clean(&mut self) {
        self.entities.clear();
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Captured body of a save: every level's records plus world scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub map: String,
    pub time_seconds: f64,
    pub main_level: LevelRecord,
    /// Kept in first-seen order so encoded output is stable.
    pub sub_levels: Vec<LevelRecord>,
}

impl WorldSnapshot {
    pub fn new() -> Self {
        Self {
            map: String::new(),
            time_seconds: 0.0,
            main_level: LevelRecord::new(LevelKey::Main),
            sub_levels: Vec::new(),
        }
    }

    /// Drops captured entities but keeps level slots, so the next save
    /// repopulates them in place.
    pub fn clean(&mut self) {
        self.main_level.clean();
        for level in &mut self.sub_levels {
            level.clean();
        }
    }

    pub fn level(&self, key: &LevelKey) -> Option<&LevelRecord> {
        match key {
            LevelKey::Main => Some(&self.main_level),
            LevelKey::Streaming(_) => self.sub_levels.iter().find(|l| &l.key == key),
        }
    }

    pub fn level_mut(&mut self, key: &LevelKey) -> Option<&mut LevelRecord> {
        match key {
            LevelKey::Main => Some(&mut self.main_level),
            LevelKey::Streaming(_) => self.sub_levels.iter_mut().find(|l| &l.key == key),
        }
    }

    /// Finds the record for `key`, adding an empty one if this is the first
    /// time the level is seen. Never creates duplicates.
    pub fn level_or_insert(&mut self, key: &LevelKey) -> &mut LevelRecord {
        if let LevelKey::Main = key {
            return &mut self.main_level;
        }

        let index = match self.sub_levels.iter().position(|l| &l.key == key) {
            Some(index) => index,
            None => {
                self.sub_levels.push(LevelRecord::new(key.clone()));
                self.sub_levels.len() - 1
            }
        };
        &mut self.sub_levels[index]
    }

    pub fn levels(&self) -> impl Iterator<Item = &LevelRecord> {
        std::iter::once(&self.main_level).chain(self.sub_levels.iter())
    }

    pub fn entity_count(&self) -> usize {
        self.levels().map(|l| l.len()).sum()
    }
}

impl Default for WorldSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
