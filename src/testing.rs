//! In-memory world fixtures shared by the unit tests.

use crate::class::ClassRegistry;
use crate::error::{Result, SaveError};
use crate::record::{PhysicsState, Transform};
use crate::world::{SimComponent, SimEntity, SimLevel, SimWorld, StreamingLevel};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_classes() -> ClassRegistry {
    ClassRegistry::new()
        .with_class("Object", None)
        .with_class("Actor", Some("Object"))
        .with_class("Light", Some("Actor"))
        .with_class("Pawn", Some("Actor"))
        .with_class("ActorComponent", Some("Object"))
        .with_class("SceneComponent", Some("ActorComponent"))
        .with_class("PrimitiveComponent", Some("SceneComponent"))
        .with_class("MeshComponent", Some("PrimitiveComponent"))
        .with_class("StaticMeshComponent", Some("MeshComponent"))
        .with_class("InstancedStaticMeshComponent", Some("StaticMeshComponent"))
        .with_class("SkinnedMeshComponent", Some("MeshComponent"))
        .with_class("SkeletalMeshComponent", Some("SkinnedMeshComponent"))
}

#[derive(Debug, Clone)]
pub struct TestComponent {
    name: String,
    class: String,
    tags: Vec<String>,
    transform: Option<Transform>,
    valid: bool,
    children: Vec<TestComponent>,
}

impl TestComponent {
    pub fn new(name: &str, class: &str) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            tags: Vec::new(),
            transform: None,
            valid: true,
            children: Vec::new(),
        }
    }

    pub fn tagged(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn spatial(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_child(mut self, child: TestComponent) -> Self {
        self.children.push(child);
        self
    }
}

impl SimComponent for TestComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        &self.class
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn transform(&self) -> Option<Transform> {
        self.transform
    }

    fn children(&self) -> Vec<&dyn SimComponent> {
        self.children.iter().map(|c| c as &dyn SimComponent).collect()
    }

    fn save_properties(&self) -> Result<Vec<u8>> {
        Ok(self.name.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct TestEntity {
    name: String,
    class: String,
    tags: Vec<String>,
    movable: bool,
    transform: Transform,
    spawned: bool,
    valid: bool,
    broken: bool,
    properties: Vec<u8>,
    components: Vec<TestComponent>,
}

impl TestEntity {
    pub fn new(name: &str, class: &str) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            tags: Vec::new(),
            movable: false,
            transform: Transform::IDENTITY,
            spawned: false,
            valid: true,
            broken: false,
            properties: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn movable(mut self) -> Self {
        self.movable = true;
        self
    }

    pub fn at(mut self, translation: [f32; 3]) -> Self {
        self.transform = Transform::from_translation(translation);
        self
    }

    pub fn tagged(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn spawned(mut self) -> Self {
        self.spawned = true;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    /// Fails while encoding its properties.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn with_properties(mut self, properties: Vec<u8>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_component(mut self, component: TestComponent) -> Self {
        self.components.push(component);
        self
    }
}

impl SimEntity for TestEntity {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        &self.class
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn has_movable_root(&self) -> bool {
        self.movable
    }

    fn transform(&self) -> Transform {
        self.transform
    }

    fn physics(&self) -> PhysicsState {
        PhysicsState::default()
    }

    fn spawned_at_runtime(&self) -> bool {
        self.spawned
    }

    fn components(&self) -> Vec<&dyn SimComponent> {
        self.components.iter().map(|c| c as &dyn SimComponent).collect()
    }

    fn save_properties(&self) -> Result<Vec<u8>> {
        if self.broken {
            return Err(SaveError::Capture(format!("{} has no archive", self.name)));
        }
        Ok(self.properties.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestLevel {
    entities: Vec<Option<TestEntity>>,
}

impl TestLevel {
    pub fn new(entities: Vec<TestEntity>) -> Self {
        Self {
            entities: entities.into_iter().map(Some).collect(),
        }
    }

    /// `count` movable actors named `entity-<index>`.
    pub fn numbered(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| {
                    TestEntity::new(&format!("entity-{}", i), "Actor")
                        .movable()
                        .at([i as f32, 0.0, 0.0])
                        .with_properties((i as u32).to_le_bytes().to_vec())
                })
                .collect(),
        )
    }

    pub fn with_hole(mut self) -> Self {
        self.entities.push(None);
        self
    }
}

impl SimLevel for TestLevel {
    fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn entity(&self, index: usize) -> Option<&dyn SimEntity> {
        self.entities
            .get(index)
            .and_then(|e| e.as_ref())
            .map(|e| e as &dyn SimEntity)
    }
}

pub struct TestWorld {
    pub map: String,
    pub time_seconds: f64,
    pub authority: bool,
    pub classes: ClassRegistry,
    pub main: TestLevel,
    pub streaming: Vec<(String, Option<TestLevel>)>,
}

impl TestWorld {
    pub fn new(main: TestLevel) -> Self {
        Self {
            map: "/Game/Maps/Harbor".to_string(),
            time_seconds: 120.0,
            authority: true,
            classes: test_classes(),
            main,
            streaming: Vec::new(),
        }
    }

    pub fn with_streaming(mut self, package: &str, level: Option<TestLevel>) -> Self {
        self.streaming.push((package.to_string(), level));
        self
    }
}

impl SimWorld for TestWorld {
    fn map_name(&self) -> &str {
        &self.map
    }

    fn time_seconds(&self) -> f64 {
        self.time_seconds
    }

    fn has_authority(&self) -> bool {
        self.authority
    }

    fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    fn main_level(&self) -> &dyn SimLevel {
        &self.main
    }

    fn streaming_levels(&self) -> Vec<StreamingLevel<'_>> {
        self.streaming
            .iter()
            .map(|(package, level)| StreamingLevel {
                package: package.clone(),
                loaded: level.as_ref().map(|l| l as &dyn SimLevel),
            })
            .collect()
    }
}
