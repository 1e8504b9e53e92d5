use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::runtime::Handle;
use tracing::debug;

use crate::{
    common::{Discipline, Extension, Result, SchedulerError, Timing, new_host_id},
    host::{
        GlobalTickHost, HostRuntime, HostTask, RegionShardedHost, Runnable,
        memory::{
            core::{LoopIdentity, LoopKind, TaskBook, TickLoop, await_advance, current_loop},
            task::{MemoryTask, Surface},
        },
    },
};

struct LegacyInner {
    id: Arc<str>,
    main: TickLoop,
    book: TaskBook,
    shutting_down: AtomicBool,
}

/// 内存版经典宿主
///
/// 只有一个主 Tick 线程。同步任务在主线程执行，异步任务到期后投递到
/// Tokio 的阻塞线程池。时间只在调用 `advance` 时推进。
///
/// Clone 是廉价的 (内部是 Arc)。
#[derive(Clone)]
pub struct MemoryLegacyHost {
    inner: Arc<LegacyInner>,
}

impl MemoryLegacyHost {
    /// 创建宿主并启动主 Tick 线程
    ///
    /// 必须在 Tokio 运行时内调用 (异步任务需要它的阻塞线程池)。
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| SchedulerError::Unsupported(format!("memory host needs a Tokio runtime: {}", e)))?;
        let id: Arc<str> = Arc::from(new_host_id());
        let main = TickLoop::spawn(
            LoopIdentity {
                host: id.clone(),
                kind: LoopKind::Main,
            },
            0,
            runtime,
            None,
        )?;
        Ok(Self {
            inner: Arc::new(LegacyInner {
                id,
                main,
                book: TaskBook::default(),
                shutting_down: AtomicBool::new(false),
            }),
        })
    }

    /// 推进 N 个 Tick，并等待期间投递的异步执行全部结束
    pub async fn advance(&self, ticks: u64) -> Result<()> {
        let rx = self.inner.main.advance(ticks)?;
        await_advance(vec![rx]).await?;
        self.inner.book.prune();
        Ok(())
    }

    pub fn current_tick(&self) -> u64 {
        self.inner.main.current_tick()
    }

    /// 尚未结束的任务数
    pub fn live_tasks(&self) -> usize {
        self.inner.book.live()
    }

    /// 停机: 拒绝新任务，取消全部任务，停止主线程
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        self.inner.book.cancel_where(|_| true);
        self.inner.main.shutdown();
    }
}

impl GlobalTickHost for MemoryLegacyHost {
    fn is_primary_thread(&self) -> bool {
        matches!(
            current_loop(),
            Some(LoopIdentity { host, kind: LoopKind::Main }) if host == self.inner.id
        )
    }

    fn schedule(
        &self,
        owner: &Extension,
        discipline: Discipline,
        timing: Timing,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(SchedulerError::rejected(owner.id(), "host is shutting down"));
        }
        if !owner.is_enabled() {
            return Err(SchedulerError::rejected(owner.id(), "extension is disabled"));
        }
        let task = Arc::new(MemoryTask::new(
            self.inner.book.next_id(),
            owner.clone(),
            Surface::Main,
            discipline,
            timing.period(),
            body,
        ));
        self.inner.book.register(task.clone());
        self.inner.main.enqueue(task.clone(), timing.initial_delay());
        Ok(task)
    }

    fn cancel_tasks(&self, owner: &Extension) {
        let cancelled = self
            .inner
            .book
            .cancel_where(|task| task.owner().same_as(owner));
        debug!("[Host-{}] Cancelled {} tasks of {}.", self.inner.id, cancelled, owner.id());
    }
}

impl HostRuntime for MemoryLegacyHost {
    fn name(&self) -> &str {
        "memory-legacy"
    }

    fn provides(&self, _capability: &str) -> bool {
        false
    }

    fn global_tick(&self) -> Option<Arc<dyn GlobalTickHost>> {
        Some(Arc::new(self.clone()))
    }

    fn region_sharded(&self) -> Option<Arc<dyn RegionShardedHost>> {
        None
    }
}
