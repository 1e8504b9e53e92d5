use dashmap::{DashMap, mapref::entry::Entry};
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::runtime::Handle;
use tracing::debug;

use crate::{
    common::{
        Discipline, EntityId, Extension, Location, RegionCoord, Result, SchedulerError, TickUtils,
        Timing, new_host_id,
    },
    host::{
        GlobalTickHost, HostRuntime, HostTask, REGION_SCHEDULER_CAPABILITY, RegionShardedHost,
        Runnable,
        memory::{
            core::{
                EntityRegistry, EntityRoute, EntityRouter, LoopIdentity, LoopKind, TaskBook,
                TickLoop, await_advance, current_loop,
            },
            task::{MemoryTask, Surface},
        },
    },
};

/// 区域边长默认 16 个区块 (2^4)
const DEFAULT_REGION_SHIFT: u8 = 4;
const DEFAULT_TICK_MILLIS: u64 = 50;

/// 区域循环与实体位置
///
/// 区域循环在实体任务到期时回查这里，所以它们只持有弱引用。
struct RegionDirectory {
    host: Arc<str>,
    region_shift: u8,
    runtime: Handle,
    /// 区域线程按需创建
    loops: DashMap<RegionCoord, Arc<TickLoop>>,
    entities: EntityRegistry,
    this: Weak<RegionDirectory>,
}

impl RegionDirectory {
    fn region_of(&self, location: &Location) -> RegionCoord {
        location.region(self.region_shift)
    }

    fn region_loop(&self, coord: RegionCoord, start_tick: u64) -> Result<Arc<TickLoop>> {
        match self.loops.entry(coord) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let router: Weak<dyn EntityRouter> = self.this.clone();
                let region = Arc::new(TickLoop::spawn(
                    LoopIdentity {
                        host: self.host.clone(),
                        kind: LoopKind::Region(entry.key().clone()),
                    },
                    start_tick,
                    self.runtime.clone(),
                    Some(router),
                )?);
                debug!("[Host-{}] Region {} created.", self.host, entry.key());
                entry.insert(region.clone());
                Ok(region)
            }
        }
    }
}

impl EntityRouter for RegionDirectory {
    fn route(&self, entity: EntityId, here: &LoopKind, now: u64) -> Result<EntityRoute> {
        let Some(location) = self.entities.location(entity) else {
            return Ok(EntityRoute::Retired);
        };
        let coord = self.region_of(&location);
        if matches!(here, LoopKind::Region(owned) if *owned == coord) {
            return Ok(EntityRoute::Local);
        }
        Ok(EntityRoute::Moved(self.region_loop(coord, now)?))
    }
}

struct RegionInner {
    id: Arc<str>,
    tick_millis: u64,
    global: TickLoop,
    directory: Arc<RegionDirectory>,
    book: TaskBook,
    shutting_down: AtomicBool,
}

/// 内存版区域分片宿主
///
/// - 一个全局 Tick 线程 (全局区域调度器 + 异步调度器的计时)。
/// - 每个区域一个 Tick 线程，第一次有任务落到该区域时创建。
/// - 实体登记表: 实体任务每次到期都按实体当前位置确认归属，实体移到别的区域后
///   任务交给新区域的线程，在它的下一个 Tick 执行；实体被移除后任务取消而不执行。
///
/// 所有线程只在调用 `advance` 时一起推进。
#[derive(Clone)]
pub struct MemoryRegionHost {
    inner: Arc<RegionInner>,
}

impl MemoryRegionHost {
    /// 使用默认区域大小和 Tick 长度创建宿主
    ///
    /// 必须在 Tokio 运行时内调用。
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_REGION_SHIFT, DEFAULT_TICK_MILLIS)
    }

    pub fn with_options(region_shift: u8, tick_millis: u64) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            SchedulerError::Unsupported(format!("memory host needs a Tokio runtime: {}", e))
        })?;
        let id: Arc<str> = Arc::from(new_host_id());
        let global = TickLoop::spawn(
            LoopIdentity {
                host: id.clone(),
                kind: LoopKind::Global,
            },
            0,
            runtime.clone(),
            None,
        )?;
        let directory = Arc::new_cyclic(|this| RegionDirectory {
            host: id.clone(),
            region_shift,
            runtime,
            loops: DashMap::new(),
            entities: EntityRegistry::default(),
            this: this.clone(),
        });
        Ok(Self {
            inner: Arc::new(RegionInner {
                id,
                tick_millis: tick_millis.max(1),
                global,
                directory,
                book: TaskBook::default(),
                shutting_down: AtomicBool::new(false),
            }),
        })
    }

    pub fn region_of(&self, location: &Location) -> RegionCoord {
        self.inner.directory.region_of(location)
    }

    // ------------------------------------------
    // 实体管理
    // ------------------------------------------

    pub fn spawn_entity(&self, location: Location) -> EntityId {
        let id = EntityId::random();
        self.inner.directory.entities.insert(id, location);
        id
    }

    /// 移动实体，实体不存在时返回 false
    ///
    /// 已提交的实体任务下次到期时跟随实体换到新区域的线程。
    pub fn move_entity(&self, id: EntityId, location: Location) -> bool {
        self.inner.directory.entities.relocate(id, location)
    }

    /// 移除实体 (retire)，之后该实体上的任务都不再执行
    pub fn remove_entity(&self, id: EntityId) -> bool {
        self.inner.directory.entities.remove(id)
    }

    pub fn entity_location(&self, id: EntityId) -> Option<Location> {
        self.inner.directory.entities.location(id)
    }

    // ------------------------------------------
    // 时间推进
    // ------------------------------------------

    /// 全局线程与所有已存在的区域线程一起推进 N 个 Tick，
    /// 然后等待期间投递的异步执行全部结束。
    ///
    /// 推进过程中新创建的区域线程从创建时的 Tick 开始计时，不参与本轮。
    pub async fn advance(&self, ticks: u64) -> Result<()> {
        let mut receivers = vec![self.inner.global.advance(ticks)?];
        let regions: Vec<Arc<TickLoop>> = self
            .inner
            .directory
            .loops
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for region in regions {
            receivers.push(region.advance(ticks)?);
        }
        await_advance(receivers).await?;
        self.inner.book.prune();
        Ok(())
    }

    pub fn current_tick(&self) -> u64 {
        self.inner.global.current_tick()
    }

    /// 已创建的区域线程数
    pub fn region_count(&self) -> usize {
        self.inner.directory.loops.len()
    }

    pub fn live_tasks(&self) -> usize {
        self.inner.book.live()
    }

    /// 停机: 拒绝新任务，取消全部任务，停止所有线程
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.book.cancel_where(|_| true);
        self.inner.global.shutdown();
        for region in self.inner.directory.loops.iter() {
            region.value().shutdown();
        }
    }

    // ------------------------------------------
    // 内部工具
    // ------------------------------------------

    fn admit(&self, owner: &Extension) -> Result<()> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(SchedulerError::rejected(owner.id(), "host is shutting down"));
        }
        if !owner.is_enabled() {
            return Err(SchedulerError::rejected(owner.id(), "extension is disabled"));
        }
        Ok(())
    }

    /// 区域调度器的时序约束: 延迟至少 1 个 Tick
    fn check_timing(timing: &Timing) -> Result<()> {
        match timing {
            Timing::Delayed(0) | Timing::Periodic { delay: 0, .. } => {
                Err(SchedulerError::InvalidArgument(
                    "region scheduler delays must be at least one tick".into(),
                ))
            }
            Timing::Periodic { period: 0, .. } => Err(SchedulerError::InvalidArgument(
                "region scheduler period must be at least one tick".into(),
            )),
            _ => Ok(()),
        }
    }

    fn region_loop(&self, coord: RegionCoord) -> Result<Arc<TickLoop>> {
        self.inner
            .directory
            .region_loop(coord, self.inner.global.current_tick())
    }

    fn submit(
        &self,
        target: &TickLoop,
        owner: &Extension,
        surface: Surface,
        discipline: Discipline,
        timing: Timing,
        body: Runnable,
    ) -> Arc<dyn HostTask> {
        let task = Arc::new(MemoryTask::new(
            self.inner.book.next_id(),
            owner.clone(),
            surface,
            discipline,
            timing.period(),
            body,
        ));
        self.inner.book.register(task.clone());
        target.enqueue(task.clone(), timing.initial_delay());
        task
    }

    fn on_current_region(&self, coord: &RegionCoord) -> bool {
        matches!(
            current_loop(),
            Some(LoopIdentity { host, kind: LoopKind::Region(owned) })
                if host == self.inner.id && &owned == coord
        )
    }
}

impl RegionShardedHost for MemoryRegionHost {
    fn is_global_tick_thread(&self) -> bool {
        matches!(
            current_loop(),
            Some(LoopIdentity { host, kind: LoopKind::Global }) if host == self.inner.id
        )
    }

    fn is_tick_thread(&self) -> bool {
        matches!(current_loop(), Some(identity) if identity.host == self.inner.id)
    }

    fn is_owned_by_current_region(&self, location: &Location) -> bool {
        self.on_current_region(&self.region_of(location))
    }

    fn is_entity_owned_by_current_region(&self, entity: EntityId) -> bool {
        match self.inner.directory.entities.location(entity) {
            Some(location) => self.on_current_region(&self.region_of(&location)),
            None => false,
        }
    }

    fn run_global(
        &self,
        owner: &Extension,
        timing: Timing,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>> {
        self.admit(owner)?;
        Self::check_timing(&timing)?;
        Ok(self.submit(
            &self.inner.global,
            owner,
            Surface::Global,
            Discipline::Sync,
            timing,
            body,
        ))
    }

    fn run_region(
        &self,
        owner: &Extension,
        location: &Location,
        timing: Timing,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>> {
        self.admit(owner)?;
        Self::check_timing(&timing)?;
        let region = self.region_loop(self.region_of(location))?;
        Ok(self.submit(&region, owner, Surface::Region, Discipline::Sync, timing, body))
    }

    fn run_entity(
        &self,
        owner: &Extension,
        entity: EntityId,
        timing: Timing,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>> {
        self.admit(owner)?;
        Self::check_timing(&timing)?;
        let location = self
            .inner
            .directory
            .entities
            .location(entity)
            .ok_or_else(|| SchedulerError::rejected(owner.id(), format!("entity {} is retired", entity)))?;
        let region = self.region_loop(self.region_of(&location))?;
        Ok(self.submit(
            &region,
            owner,
            Surface::Entity(entity),
            Discipline::Sync,
            timing,
            body,
        ))
    }

    fn run_async(
        &self,
        owner: &Extension,
        delay: Duration,
        period: Option<Duration>,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>> {
        self.admit(owner)?;
        // 异步调度器按墙钟计时，这里折算回全局线程的 Tick 来驱动
        let tick = self.inner.tick_millis;
        let delay = TickUtils::from_duration(delay, tick);
        let timing = match period {
            Some(period) => Timing::Periodic {
                delay,
                period: TickUtils::from_duration(period, tick).max(1),
            },
            None => Timing::Delayed(delay),
        };
        Ok(self.submit(
            &self.inner.global,
            owner,
            Surface::Async,
            Discipline::Async,
            timing,
            body,
        ))
    }

    fn cancel_global_tasks(&self, owner: &Extension) {
        let cancelled = self.inner.book.cancel_where(|task| {
            task.surface() == Surface::Global && task.owner().same_as(owner)
        });
        debug!("[Host-{}] Cancelled {} global tasks of {}.", self.inner.id, cancelled, owner.id());
    }

    fn cancel_async_tasks(&self, owner: &Extension) {
        let cancelled = self.inner.book.cancel_where(|task| {
            task.surface() == Surface::Async && task.owner().same_as(owner)
        });
        debug!("[Host-{}] Cancelled {} async tasks of {}.", self.inner.id, cancelled, owner.id());
    }
}

impl HostRuntime for MemoryRegionHost {
    fn name(&self) -> &str {
        "memory-region"
    }

    fn provides(&self, capability: &str) -> bool {
        capability == REGION_SCHEDULER_CAPABILITY
    }

    /// 区域宿主没有可用的全局 Tick 调度接口
    fn global_tick(&self) -> Option<Arc<dyn GlobalTickHost>> {
        None
    }

    fn region_sharded(&self) -> Option<Arc<dyn RegionShardedHost>> {
        Some(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::runnable;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn setup() -> (MemoryRegionHost, Extension) {
        let host = MemoryRegionHost::new().unwrap();
        let ext = Extension::new("region-host", Arc::new(host.clone()));
        (host, ext)
    }

    #[tokio::test]
    async fn region_task_runs_on_owning_thread() {
        let (host, ext) = setup();
        let here = Location::new("world", 10.0, 64.0, 10.0);
        let elsewhere = Location::new("world", 5000.0, 64.0, 10.0);
        let seen = Arc::new(Mutex::new(None));

        let observer = host.clone();
        let (a, b) = (here.clone(), elsewhere.clone());
        let record = seen.clone();
        host.run_region(
            &ext,
            &here,
            Timing::Immediate,
            runnable(move || {
                *record.lock() = Some((
                    observer.is_owned_by_current_region(&a),
                    observer.is_owned_by_current_region(&b),
                    observer.is_global_tick_thread(),
                    observer.is_tick_thread(),
                ));
            }),
        )
        .unwrap();
        host.advance(1).await.unwrap();

        assert_eq!(*seen.lock(), Some((true, false, false, true)));
        assert_eq!(host.region_count(), 1);
    }

    #[tokio::test]
    async fn zero_delay_is_rejected_by_region_surfaces() {
        let (host, ext) = setup();
        let err = host
            .run_global(&ext, Timing::Delayed(0), runnable(|| {}))
            .err().unwrap();
        assert!(matches!(err, SchedulerError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn retired_entity_rejects_and_drops_tasks() {
        let (host, ext) = setup();
        let entity = host.spawn_entity(Location::new("world", 0.0, 64.0, 0.0));
        let count = Arc::new(AtomicUsize::new(0));
        let body_count = count.clone();

        let task = host
            .run_entity(
                &ext,
                entity,
                Timing::Delayed(2),
                runnable(move || {
                    body_count.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(host.remove_entity(entity));
        host.advance(3).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(task.is_cancelled());

        let err = host
            .run_entity(&ext, entity, Timing::Immediate, runnable(|| {}))
            .err().unwrap();
        assert!(matches!(err, SchedulerError::TaskRejected { .. }));
    }

    #[tokio::test]
    async fn bulk_cancel_leaves_region_tasks_alone() {
        let (host, ext) = setup();
        let global = host
            .run_global(&ext, Timing::Periodic { delay: 1, period: 1 }, runnable(|| {}))
            .unwrap();
        let region = host
            .run_region(
                &ext,
                &Location::new("world", 0.0, 0.0, 0.0),
                Timing::Periodic { delay: 1, period: 1 },
                runnable(|| {}),
            )
            .unwrap();
        let offtick = host
            .run_async(&ext, Duration::ZERO, Some(Duration::from_millis(50)), runnable(|| {}))
            .unwrap();

        host.cancel_global_tasks(&ext);
        host.cancel_async_tasks(&ext);
        assert!(global.is_cancelled());
        assert!(offtick.is_cancelled());
        assert!(!region.is_cancelled());
    }
}
