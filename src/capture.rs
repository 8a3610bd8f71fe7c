use crate::class::ClassRegistry;
use crate::filter::ClassFilter;
use crate::record::{ComponentRecord, EntityRecord, LevelKey};
use crate::world::{SimComponent, SimEntity, SimLevel};
use bitflags::bitflags;
use std::ops::Range;

pub const TAG_NO_SAVE: &str = "!Save";
pub const TAG_NO_TRANSFORM: &str = "!SaveTransform";
pub const TAG_NO_PHYSICS: &str = "!SavePhysics";
pub const TAG_NO_COMPONENTS: &str = "!SaveComponents";
pub const TAG_NO_TAGS: &str = "!SaveTags";
/// Opt-in for component transforms, which are not captured by default.
pub const TAG_SAVE_TRANSFORM: &str = "SaveTransform";

/// Rendering geometry is rebuilt from assets on load and never persisted.
pub const MESH_COMPONENT_CLASSES: [&str; 2] = ["StaticMeshComponent", "SkeletalMeshComponent"];

bitflags! {
    /// Save-control tags present on an object, parsed once per capture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SaveTags: u8 {
        const NO_SAVE = 1 << 0;
        const NO_TRANSFORM = 1 << 1;
        const NO_PHYSICS = 1 << 2;
        const NO_COMPONENTS = 1 << 3;
        const NO_TAGS = 1 << 4;
        const SAVE_TRANSFORM = 1 << 5;
    }
}

impl SaveTags {
    pub fn parse(tags: &[String]) -> Self {
        tags.iter().fold(SaveTags::empty(), |flags, tag| {
            flags
                | match tag.as_str() {
                    TAG_NO_SAVE => SaveTags::NO_SAVE,
                    TAG_NO_TRANSFORM => SaveTags::NO_TRANSFORM,
                    TAG_NO_PHYSICS => SaveTags::NO_PHYSICS,
                    TAG_NO_COMPONENTS => SaveTags::NO_COMPONENTS,
                    TAG_NO_TAGS => SaveTags::NO_TAGS,
                    TAG_SAVE_TRANSFORM => SaveTags::SAVE_TRANSFORM,
                    _ => SaveTags::empty(),
                }
        })
    }
}

bitflags! {
    /// What a worker captures for one entity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const TRANSFORM = 1 << 0;
        const PHYSICS = 1 << 1;
        const TAGS = 1 << 2;
        const COMPONENTS = 1 << 3;
        const RUNTIME_SPAWNED = 1 << 4;
    }
}

impl Capabilities {
    /// `None` when the entity must not be saved at all.
    pub fn of_entity(entity: &dyn SimEntity, store_components: bool) -> Option<Self> {
        if !entity.is_valid() {
            return None;
        }
        let tags = SaveTags::parse(entity.tags());
        if tags.contains(SaveTags::NO_SAVE) {
            return None;
        }

        let mut caps = Capabilities::empty();
        caps.set(
            Capabilities::TRANSFORM,
            entity.has_movable_root() && !tags.contains(SaveTags::NO_TRANSFORM),
        );
        caps.set(Capabilities::PHYSICS, !tags.contains(SaveTags::NO_PHYSICS));
        caps.set(Capabilities::TAGS, !tags.contains(SaveTags::NO_TAGS));
        caps.set(
            Capabilities::COMPONENTS,
            store_components && !tags.contains(SaveTags::NO_COMPONENTS),
        );
        caps.set(Capabilities::RUNTIME_SPAWNED, entity.spawned_at_runtime());
        Some(caps)
    }

    pub fn of_component(component: &dyn SimComponent, classes: &ClassRegistry) -> Option<Self> {
        if !component.is_valid() {
            return None;
        }
        let tags = SaveTags::parse(component.tags());
        if tags.contains(SaveTags::NO_SAVE) || is_mesh_component(component.class(), classes) {
            return None;
        }

        let mut caps = Capabilities::COMPONENTS;
        caps.set(
            Capabilities::TRANSFORM,
            component.transform().is_some() && tags.contains(SaveTags::SAVE_TRANSFORM),
        );
        caps.set(Capabilities::TAGS, !tags.contains(SaveTags::NO_TAGS));
        Some(caps)
    }
}

fn is_mesh_component(class: &str, classes: &ClassRegistry) -> bool {
    MESH_COMPONENT_CLASSES
        .iter()
        .any(|mesh| classes.is_child_of(class, mesh))
}

/// One unit of capture work: a disjoint index range of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTask {
    /// Position in scheduling order. Merge sorts on this.
    pub sequence: usize,
    pub level: LevelKey,
    pub range: Range<usize>,
}

/// Records produced by one task, held locally until merge.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutput {
    pub sequence: usize,
    pub level: LevelKey,
    pub records: Vec<EntityRecord>,
    pub skipped: usize,
}

/// Shared, read-only state every worker of one save sees.
#[derive(Clone, Copy)]
pub struct CaptureContext<'a> {
    pub classes: &'a ClassRegistry,
    pub filter: &'a ClassFilter,
    pub store_components: bool,
}

impl<'a> CaptureContext<'a> {
    pub fn run(&self, task: &CaptureTask, level: &dyn SimLevel) -> CaptureOutput {
        let mut output = CaptureOutput {
            sequence: task.sequence,
            level: task.level.clone(),
            records: Vec::with_capacity(task.range.len()),
            skipped: 0,
        };

        for index in task.range.clone() {
            let Some(entity) = level.entity(index) else {
                output.skipped += 1;
                continue;
            };
            match self.capture_entity(entity) {
                Some(record) => output.records.push(record),
                None => output.skipped += 1,
            }
        }

        output
    }

    pub fn capture_entity(&self, entity: &dyn SimEntity) -> Option<EntityRecord> {
        let caps = Capabilities::of_entity(entity, self.store_components)?;
        if !self.filter.is_class_allowed(entity.class(), self.classes) {
            return None;
        }

        let properties = match entity.save_properties() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping entity '{}': {}", entity.name(), e);
                return None;
            }
        };

        let components = if caps.contains(Capabilities::COMPONENTS) {
            self.capture_components(entity.components())
        } else {
            Vec::new()
        };

        Some(EntityRecord {
            name: entity.name().to_string(),
            class: entity.class().to_string(),
            transform: caps
                .contains(Capabilities::TRANSFORM)
                .then(|| entity.transform()),
            physics: caps.contains(Capabilities::PHYSICS).then(|| entity.physics()),
            tags: if caps.contains(Capabilities::TAGS) {
                entity.tags().to_vec()
            } else {
                Vec::new()
            },
            spawned_at_runtime: caps.contains(Capabilities::RUNTIME_SPAWNED),
            components,
            properties,
        })
    }

    fn capture_components(&self, components: Vec<&dyn SimComponent>) -> Vec<ComponentRecord> {
        components
            .into_iter()
            .filter_map(|component| self.capture_component(component))
            .collect()
    }

    fn capture_component(&self, component: &dyn SimComponent) -> Option<ComponentRecord> {
        let caps = Capabilities::of_component(component, self.classes)?;

        let properties = match component.save_properties() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping component '{}': {}", component.name(), e);
                return None;
            }
        };

        Some(ComponentRecord {
            name: component.name().to_string(),
            class: component.class().to_string(),
            transform: if caps.contains(Capabilities::TRANSFORM) {
                component.transform()
            } else {
                None
            },
            tags: if caps.contains(Capabilities::TAGS) {
                component.tags().to_vec()
            } else {
                Vec::new()
            },
            properties,
            children: self.capture_components(component.children()),
        })
    }
}
