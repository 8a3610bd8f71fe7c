use crate::capture::{CaptureContext, CaptureOutput, CaptureTask};
use crate::record::{LevelKey, WorldSnapshot};
use crate::settings::{SaveSettings, MIN_ENTITIES_PER_TASK};
use crate::world::SimLevel;
use rayon::ThreadPool;
use std::ops::Range;

/// Decides how many tasks each level gets and how big they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    /// Background workers plus the calling thread.
    pub workers: usize,
    /// Levels captured in this save, main level included.
    pub levels: usize,
    pub min_per_task: usize,
    pub multithreaded: bool,
}

impl Partitioner {
    pub fn new(settings: &SaveSettings, levels: usize) -> Self {
        Self {
            workers: settings.total_workers(),
            levels,
            min_per_task: MIN_ENTITIES_PER_TASK,
            multithreaded: settings.multithreaded_capture,
        }
    }

    /// `max(1, round(workers / (levels + 1)))`, or 1 when capture is
    /// sequential.
    pub fn tasks_per_level(&self) -> usize {
        if !self.multithreaded {
            return 1;
        }
        let share = self.workers as f64 / (self.levels + 1) as f64;
        (share.round() as usize).max(1)
    }

    pub fn split(&self, entity_count: usize) -> Vec<Range<usize>> {
        if self.multithreaded {
            split_ranges(entity_count, self.tasks_per_level(), self.min_per_task)
        } else {
            split_ranges(entity_count, 1, 1.max(entity_count))
        }
    }
}

/// Cuts `[0, count)` into consecutive ranges of
/// `max(ceil(count / tasks), min_per_task)`. Only the last range may be
/// shorter. An empty collection yields no ranges.
pub fn split_ranges(count: usize, tasks: usize, min_per_task: usize) -> Vec<Range<usize>> {
    let balanced = count.div_ceil(tasks.max(1));
    let per_task = balanced.max(min_per_task).max(1);

    let mut ranges = Vec::with_capacity(count.div_ceil(per_task));
    let mut start = 0;
    while start < count {
        let end = (start + per_task).min(count);
        ranges.push(start..end);
        start = end;
    }
    ranges
}

/// Capture tasks for every level of one save, in scheduling order.
pub struct CaptureSchedule<'w> {
    jobs: Vec<(CaptureTask, &'w dyn SimLevel)>,
}

impl<'w> CaptureSchedule<'w> {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn schedule_level(
        &mut self,
        key: LevelKey,
        level: &'w dyn SimLevel,
        partitioner: &Partitioner,
    ) -> usize {
        let ranges = partitioner.split(level.entity_count());
        let scheduled = ranges.len();

        log::debug!(
            "Level '{}': {} entities in {} tasks",
            key,
            level.entity_count(),
            scheduled
        );

        for range in ranges {
            let task = CaptureTask {
                sequence: self.jobs.len(),
                level: key.clone(),
                range,
            };
            self.jobs.push((task, level));
        }
        scheduled
    }

    pub fn tasks(&self) -> impl Iterator<Item = &CaptureTask> {
        self.jobs.iter().map(|(task, _)| task)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Runs every task and blocks until all are done.
    ///
    /// With a pool, the first task runs on the calling thread and the rest
    /// are spawned onto the pool. Without one, tasks run in order on the
    /// calling thread. Each task fills only its own output slot.
    pub fn run(self, ctx: &CaptureContext<'_>, pool: Option<&ThreadPool>) -> Vec<CaptureOutput> {
        let mut slots: Vec<Option<CaptureOutput>> = (0..self.jobs.len()).map(|_| None).collect();

        match pool {
            Some(pool) if self.jobs.len() > 1 => {
                let (first_job, rest_jobs) = self.jobs.split_at(1);
                let (first_slot, rest_slots) = slots.split_at_mut(1);
                pool.in_place_scope(|scope| {
                    for ((task, level), slot) in rest_jobs.iter().zip(rest_slots.iter_mut()) {
                        let level = *level;
                        scope.spawn(move |_| *slot = Some(ctx.run(task, level)));
                    }
                    let (task, level) = &first_job[0];
                    first_slot[0] = Some(ctx.run(task, *level));
                });
            }
            _ => {
                for ((task, level), slot) in self.jobs.iter().zip(slots.iter_mut()) {
                    *slot = Some(ctx.run(task, *level));
                }
            }
        }

        slots.into_iter().flatten().collect()
    }
}

impl Default for CaptureSchedule<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends task outputs into their level records in scheduling order,
/// whatever order they finished in.
pub fn merge_outputs(snapshot: &mut WorldSnapshot, mut outputs: Vec<CaptureOutput>) -> MergeStats {
    outputs.sort_by_key(|output| output.sequence);

    let mut stats = MergeStats::default();
    for output in outputs {
        stats.tasks += 1;
        stats.captured += output.records.len();
        stats.skipped += output.skipped;
        snapshot
            .level_or_insert(&output.level)
            .entities
            .extend(output.records);
    }
    stats
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub tasks: usize,
    pub captured: usize,
    pub skipped: usize,
}
