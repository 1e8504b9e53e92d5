use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    common::{AffinityKind, Discipline, Extension, Timing},
    host::{CancelOutcome, HostTask},
    scheduler::BackendKind,
};

struct HandleInner {
    task: Arc<dyn HostTask>,
    backend: BackendKind,
    discipline: Discipline,
    affinity: AffinityKind,
    timing: Timing,
    /// 显式取消的锁存位
    ///
    /// 一旦置位永不回退，保证 `is_cancelled()` 单调。
    cancelled: AtomicBool,
}

/// 已提交任务的句柄
///
/// 由 `TaskScheduler` 的提交操作创建，Clone 是廉价的 (内部是 Arc)。
/// 所有状态查询都委托给宿主任务，外加一个本地锁存位。
#[derive(Clone)]
pub struct ScheduledTask {
    inner: Arc<HandleInner>,
}

impl ScheduledTask {
    pub(crate) fn new(
        task: Arc<dyn HostTask>,
        backend: BackendKind,
        discipline: Discipline,
        affinity: AffinityKind,
        timing: Timing,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                task,
                backend,
                discipline,
                affinity,
                timing,
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// 宿主内的任务编号
    pub fn id(&self) -> u64 {
        self.inner.task.task_id()
    }

    pub fn owner(&self) -> &Extension {
        self.inner.task.owner()
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend
    }

    pub fn discipline(&self) -> Discipline {
        self.inner.discipline
    }

    pub fn is_async(&self) -> bool {
        self.inner.discipline == Discipline::Async
    }

    pub fn affinity(&self) -> AffinityKind {
        self.inner.affinity
    }

    pub fn timing(&self) -> Timing {
        self.inner.timing
    }

    pub fn is_repeating(&self) -> bool {
        self.inner.timing.is_repeating()
    }

    /// 取消任务
    ///
    /// 正在执行的工作体不会被打断，但之后不会再执行。
    /// 调用之后 `is_cancelled()` 恒为 true。
    pub fn cancel(&self) -> CancelOutcome {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.task.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        if self.inner.task.is_cancelled() {
            self.inner.cancelled.store(true, Ordering::Release);
            return true;
        }
        false
    }

    pub fn is_running(&self) -> bool {
        self.inner.task.is_running()
    }

    /// 一次性任务已执行，或任务已被取消且不在执行中
    pub fn is_done(&self) -> bool {
        self.inner.task.is_done()
    }

    /// 两个句柄是否指向同一次提交
    pub fn same_as(&self, other: &ScheduledTask) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id())
            .field("owner", self.owner().id())
            .field("backend", &self.inner.backend)
            .field("discipline", &self.inner.discipline)
            .field("affinity", &self.inner.affinity)
            .field("timing", &self.inner.timing)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
