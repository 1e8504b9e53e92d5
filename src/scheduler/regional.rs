use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};
use tracing::{debug, trace, warn};

use crate::{
    common::{
        AffinityKind, Discipline, EntityId, Extension, Location, Result, SchedulerConfig,
        SchedulerError, TickUtils, Timing,
    },
    host::{HostTask, RegionShardedHost, Runnable},
    scheduler::{BackendKind, TaskScheduler, hooks::HookChain},
    task::ScheduledTask,
};

/// 区域分片后端
///
/// - 无亲和性的同步任务走全局区域调度器。
/// - 异步任务走宿主的异步调度器，Tick 按 `tick_millis` 折算成墙钟时间。
/// - `submit_at` / `submit_on` 路由到区域/实体调度器。
///
/// 宿主的批量取消只覆盖全局和异步两个调度器，区域/实体任务需要后端自己记账，
/// 所以这里保留一份已发出句柄的登记表，定期清理已经结束的句柄。
///
/// 与 `cancel_tasks` 并发的提交按"先提交、后取消"处理: 宿主已经接受但还没
/// 登记的句柄，在登记后发现期间发生过批量取消，会自己取消掉。
pub struct RegionScheduler {
    extension: Extension,
    host: Arc<dyn RegionShardedHost>,
    tick_millis: u64,
    prune_every: usize,
    hooks: HookChain,
    /// task_id -> 句柄
    issued: DashMap<u64, ScheduledTask>,
    submissions: AtomicUsize,
    /// 每次批量取消加一
    cancel_epoch: AtomicU64,
}

impl RegionScheduler {
    pub(crate) fn new(
        extension: Extension,
        host: Arc<dyn RegionShardedHost>,
        config: &SchedulerConfig,
        hooks: HookChain,
    ) -> Self {
        Self {
            extension,
            host,
            tick_millis: config.tick_millis,
            prune_every: config.prune_every.max(1),
            hooks,
            issued: DashMap::new(),
            submissions: AtomicUsize::new(0),
            cancel_epoch: AtomicU64::new(0),
        }
    }

    /// 当前登记中的句柄数
    pub fn tracked(&self) -> usize {
        self.issued.len()
    }

    /// 区域调度器要求延迟至少 1 个 Tick
    ///
    /// 延迟 0 的一次性任务改为立即执行，初始延迟 0 的周期任务改为 1。
    fn normalize(timing: Timing) -> Timing {
        match timing {
            Timing::Delayed(0) => Timing::Immediate,
            Timing::Periodic { delay: 0, period } => Timing::Periodic { delay: 1, period },
            other => other,
        }
    }

    /// 检查扩展状态，返回提交开始时的批量取消代数
    fn admit(&self) -> Result<u64> {
        if self.extension.is_enabled() {
            return Ok(self.cancel_epoch.load(Ordering::SeqCst));
        }
        Err(self.reject(SchedulerError::rejected(
            self.extension.id(),
            "extension is not enabled",
        )))
    }

    fn reject(&self, error: SchedulerError) -> SchedulerError {
        warn!("Submission for {} rejected: {}", self.extension.id(), error);
        self.hooks.rejected(&self.extension, &error);
        error
    }

    /// 包装宿主任务，登记并通知钩子
    fn issue(
        &self,
        submitted: Result<Arc<dyn HostTask>>,
        epoch: u64,
        discipline: Discipline,
        affinity: AffinityKind,
        timing: Timing,
    ) -> Result<ScheduledTask> {
        let task = submitted.map_err(|e| self.reject(e))?;
        let handle = ScheduledTask::new(task, BackendKind::Regional, discipline, affinity, timing);
        trace!(
            "Task {} submitted for {} ({:?}, {:?}, {:?})",
            handle.id(),
            self.extension.id(),
            discipline,
            affinity,
            timing
        );

        if self.submissions.fetch_add(1, Ordering::Relaxed) % self.prune_every == 0 {
            self.issued.retain(|_, tracked| !tracked.is_done());
        }
        self.issued.insert(handle.id(), handle.clone());

        if self.cancel_epoch.load(Ordering::SeqCst) != epoch {
            handle.cancel();
            self.issued.remove(&handle.id());
            debug!(
                "Task {} of {} raced a bulk cancel and was cancelled",
                handle.id(),
                self.extension.id()
            );
        }

        self.hooks.submitted(&handle);
        Ok(handle)
    }
}

impl TaskScheduler for RegionScheduler {
    fn extension(&self) -> &Extension {
        &self.extension
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Regional
    }

    fn is_global_thread(&self) -> bool {
        self.host.is_global_tick_thread()
    }

    fn is_tick_thread(&self) -> bool {
        self.host.is_tick_thread()
    }

    fn is_entity_thread(&self, entity: EntityId) -> bool {
        self.host.is_entity_owned_by_current_region(entity)
    }

    fn is_region_thread(&self, location: &Location) -> bool {
        self.host.is_owned_by_current_region(location)
    }

    fn submit(
        &self,
        discipline: Discipline,
        timing: Timing,
        body: Runnable,
    ) -> Result<ScheduledTask> {
        let epoch = self.admit()?;
        let submitted = match discipline {
            Discipline::Sync => {
                self.host
                    .run_global(&self.extension, Self::normalize(timing), body)
            }
            Discipline::Async => {
                let delay = TickUtils::to_duration(timing.initial_delay(), self.tick_millis);
                let period = timing
                    .period()
                    .map(|period| TickUtils::to_duration(period, self.tick_millis));
                self.host.run_async(&self.extension, delay, period, body)
            }
        };
        self.issue(submitted, epoch, discipline, AffinityKind::Global, timing)
    }

    fn submit_at(
        &self,
        location: &Location,
        timing: Timing,
        body: Runnable,
    ) -> Result<ScheduledTask> {
        let epoch = self.admit()?;
        let submitted =
            self.host
                .run_region(&self.extension, location, Self::normalize(timing), body);
        self.issue(submitted, epoch, Discipline::Sync, AffinityKind::Region, timing)
    }

    fn submit_on(&self, entity: EntityId, timing: Timing, body: Runnable) -> Result<ScheduledTask> {
        let epoch = self.admit()?;
        let submitted =
            self.host
                .run_entity(&self.extension, entity, Self::normalize(timing), body);
        self.issue(submitted, epoch, Discipline::Sync, AffinityKind::Entity, timing)
    }

    fn cancel_tasks(&self) {
        if !self.extension.is_enabled() {
            trace!(
                "Extension {} is not enabled, skipping bulk cancel",
                self.extension.id()
            );
            return;
        }
        // 先推进代数再扫登记表，之后才登记的并发提交由提交方自己取消
        self.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        self.host.cancel_global_tasks(&self.extension);
        self.host.cancel_async_tasks(&self.extension);

        // 区域/实体任务只能逐个取消
        let mut cancelled = 0usize;
        self.issued.retain(|_, handle| {
            if !handle.is_done() {
                handle.cancel();
                cancelled += 1;
            }
            false
        });
        debug!(
            "Cancelled all tasks of {} ({} tracked handles)",
            self.extension.id(),
            cancelled
        );
        self.hooks.cancelled_all(&self.extension);
    }
}
