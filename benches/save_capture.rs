use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tx2_slot::{
    CaptureContext, CaptureSchedule, ClassFilter, ClassRegistry, CompressionCodec, LevelKey,
    MemoryStore, Partitioner, PhysicsState, Result, SaveContext, SavePools, SaveRequest,
    SaveSettings, SaveTask, SimComponent, SimEntity, SimLevel, SimWorld, SlotMetadata, SlotWriter,
    StreamingLevel, Transform, WorldSnapshot, merge_outputs,
};

struct BenchEntity {
    name: String,
    tags: Vec<String>,
    transform: Transform,
}

impl SimEntity for BenchEntity {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &str {
        "Actor"
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn has_movable_root(&self) -> bool {
        true
    }

    fn transform(&self) -> Transform {
        self.transform
    }

    fn physics(&self) -> PhysicsState {
        PhysicsState::default()
    }

    fn spawned_at_runtime(&self) -> bool {
        false
    }

    fn components(&self) -> Vec<&dyn SimComponent> {
        Vec::new()
    }

    fn save_properties(&self) -> Result<Vec<u8>> {
        Ok(self.name.as_bytes().to_vec())
    }
}

struct BenchLevel {
    entities: Vec<BenchEntity>,
}

impl SimLevel for BenchLevel {
    fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn entity(&self, index: usize) -> Option<&dyn SimEntity> {
        self.entities.get(index).map(|e| e as &dyn SimEntity)
    }
}

struct BenchWorld {
    classes: ClassRegistry,
    level: BenchLevel,
}

impl SimWorld for BenchWorld {
    fn map_name(&self) -> &str {
        "/Game/Maps/Bench"
    }

    fn time_seconds(&self) -> f64 {
        60.0
    }

    fn has_authority(&self) -> bool {
        true
    }

    fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    fn main_level(&self) -> &dyn SimLevel {
        &self.level
    }

    fn streaming_levels(&self) -> Vec<StreamingLevel<'_>> {
        Vec::new()
    }
}

fn create_test_world(entity_count: usize) -> BenchWorld {
    let entities = (0..entity_count)
        .map(|i| BenchEntity {
            name: format!("entity-{}", i),
            tags: vec!["Bench".to_string()],
            transform: Transform::from_translation([i as f32, i as f32 * 0.5, 0.0]),
        })
        .collect();

    BenchWorld {
        classes: ClassRegistry::new()
            .with_class("Object", None)
            .with_class("Actor", Some("Object")),
        level: BenchLevel { entities },
    }
}

fn captured_snapshot(world: &BenchWorld) -> WorldSnapshot {
    let filter = ClassFilter::allowing("Actor").baked(world.classes());
    let ctx = CaptureContext {
        classes: world.classes(),
        filter: &filter,
        store_components: true,
    };
    let partitioner = Partitioner::new(&SaveSettings::sequential(), 1);
    let mut schedule = CaptureSchedule::new();
    schedule.schedule_level(LevelKey::Main, world.main_level(), &partitioner);

    let mut snapshot = WorldSnapshot::new();
    merge_outputs(&mut snapshot, schedule.run(&ctx, None));
    snapshot
}

fn bench_capture_sequential_vs_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture");
    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();

    for size in [100, 1000, 10000].iter() {
        let world = create_test_world(*size);
        let filter = ClassFilter::allowing("Actor").baked(world.classes());
        let ctx = CaptureContext {
            classes: world.classes(),
            filter: &filter,
            store_components: true,
        };

        group.throughput(Throughput::Elements(*size as u64));
        for (label, threaded) in [("sequential", false), ("pool", true)] {
            let settings = SaveSettings::new()
                .with_worker_threads(4)
                .with_multithreaded_capture(threaded);
            let partitioner = Partitioner::new(&settings, 1);

            group.bench_with_input(BenchmarkId::new(label, size), size, |b, _| {
                b.iter(|| {
                    let mut schedule = CaptureSchedule::new();
                    schedule.schedule_level(LevelKey::Main, world.main_level(), &partitioner);
                    let outputs = schedule.run(&ctx, threaded.then_some(&pool));
                    let mut snapshot = WorldSnapshot::new();
                    black_box(merge_outputs(&mut snapshot, outputs));
                });
            });
        }
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let metadata = SlotMetadata::new("Bench");

    for size in [100, 1000, 10000].iter() {
        let snapshot = captured_snapshot(&create_test_world(*size));
        group.throughput(Throughput::Elements(*size as u64));

        for (label, codec) in [
            ("none", CompressionCodec::None),
            ("zstd", CompressionCodec::zstd_default()),
            ("lz4", CompressionCodec::Lz4),
        ] {
            let writer = SlotWriter::new().with_compression(codec);
            group.bench_with_input(BenchmarkId::new(label, size), size, |b, _| {
                b.iter(|| {
                    let bytes = writer.encode(&metadata, black_box(&snapshot)).unwrap();
                    black_box(bytes);
                });
            });
        }
    }

    group.finish();
}

fn bench_full_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_save");
    let settings = SaveSettings::sequential();
    let pools = SavePools::sequential();

    for size in [1000, 10000].iter() {
        let world = create_test_world(*size);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let store = Arc::new(MemoryStore::new());
                let mut task = SaveTask::new(
                    SaveRequest::new("Bench"),
                    SaveContext::default(),
                    settings.clone(),
                    store,
                );
                black_box(task.start(&world, &pools));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_capture_sequential_vs_pool, bench_encode, bench_full_save);
criterion_main!(benches);
