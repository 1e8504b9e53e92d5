use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;

use crate::{
    common::{Discipline, EntityId, Extension},
    host::{CancelOutcome, HostTask, Runnable},
};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// 任务挂在宿主的哪个调度面上
///
/// 区域宿主的批量取消只覆盖 `Global` 与 `Async`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Surface {
    Main,
    Global,
    Region,
    Entity(EntityId),
    Async,
}

/// 内存宿主中的任务
///
/// 状态流转: Pending -> Running -> (Pending | Done)。
/// 取消标记用 `CancellationToken` 表达，天然只能从 false 变成 true。
pub(crate) struct MemoryTask {
    id: u64,
    owner: Extension,
    surface: Surface,
    discipline: Discipline,
    period: Option<u64>,
    token: CancellationToken,
    state: AtomicU8,
    /// 终态后释放，打断 工作体 -> 工作对象 -> 句柄 -> 任务 的引用环
    body: Mutex<Option<Runnable>>,
}

impl MemoryTask {
    pub(crate) fn new(
        id: u64,
        owner: Extension,
        surface: Surface,
        discipline: Discipline,
        period: Option<u64>,
        body: Runnable,
    ) -> Self {
        Self {
            id,
            owner,
            surface,
            discipline,
            period,
            token: CancellationToken::new(),
            state: AtomicU8::new(PENDING),
            body: Mutex::new(Some(body)),
        }
    }

    pub(crate) fn surface(&self) -> Surface {
        self.surface
    }

    pub(crate) fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub(crate) fn period(&self) -> Option<u64> {
        self.period
    }

    /// 开始一次执行
    ///
    /// 返回 `None` 表示本次不应执行 (已取消、已结束、或上一次异步执行还没跑完)。
    pub(crate) fn begin(&self) -> Option<Runnable> {
        if self
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        if self.token.is_cancelled() {
            self.finish();
            return None;
        }
        let body = self.body.lock().clone();
        if body.is_none() {
            self.finish();
        }
        body
    }

    /// 结束一次执行
    ///
    /// 返回 `true` 表示这是周期任务且尚未取消，应当重新入队。
    pub(crate) fn end(&self) -> bool {
        if self.period.is_some() && !self.token.is_cancelled() {
            self.state.store(PENDING, Ordering::Release);
            true
        } else {
            self.finish();
            false
        }
    }

    /// 宿主侧的强制终止 (扩展卸载、实体移除)
    pub(crate) fn retire(&self) {
        self.token.cancel();
        if self
            .state
            .compare_exchange(PENDING, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.body.lock().take();
        }
    }

    fn finish(&self) {
        self.state.store(DONE, Ordering::Release);
        self.body.lock().take();
    }
}

impl HostTask for MemoryTask {
    fn task_id(&self) -> u64 {
        self.id
    }

    fn owner(&self) -> &Extension {
        &self.owner
    }

    fn cancel(&self) -> CancelOutcome {
        if self.token.is_cancelled() {
            return CancelOutcome::AlreadyCancelled;
        }
        if self.state.load(Ordering::Acquire) == DONE {
            return CancelOutcome::AlreadyDone;
        }
        self.token.cancel();
        match self
            .state
            .compare_exchange(PENDING, DONE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.body.lock().take();
                CancelOutcome::Cancelled
            }
            // 正在执行: 由 end() 收尾
            Err(_) => CancelOutcome::CancelledWhileRunning,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{GlobalTickHost, HostRuntime, RegionShardedHost, runnable};
    use std::sync::Arc;

    struct NullHost;

    impl HostRuntime for NullHost {
        fn name(&self) -> &str {
            "null"
        }
        fn provides(&self, _capability: &str) -> bool {
            false
        }
        fn global_tick(&self) -> Option<Arc<dyn GlobalTickHost>> {
            None
        }
        fn region_sharded(&self) -> Option<Arc<dyn RegionShardedHost>> {
            None
        }
    }

    fn task(period: Option<u64>) -> MemoryTask {
        let ext = Extension::new("task-test", Arc::new(NullHost));
        MemoryTask::new(1, ext, Surface::Main, Discipline::Sync, period, runnable(|| {}))
    }

    #[test]
    fn one_shot_finishes_after_run() {
        let task = task(None);
        assert!(task.begin().is_some());
        assert!(task.is_running());
        assert!(!task.end());
        assert!(task.is_done());
        assert!(!task.is_cancelled());
        assert_eq!(task.cancel(), CancelOutcome::AlreadyDone);
    }

    #[test]
    fn cancel_while_running_stops_repetition() {
        let task = task(Some(5));
        assert!(task.begin().is_some());
        assert_eq!(task.cancel(), CancelOutcome::CancelledWhileRunning);
        assert!(!task.end());
        assert!(task.is_done());
        assert!(task.is_cancelled());
        assert_eq!(task.cancel(), CancelOutcome::AlreadyCancelled);
    }

    #[test]
    fn cancelled_pending_task_never_begins() {
        let task = task(Some(5));
        assert_eq!(task.cancel(), CancelOutcome::Cancelled);
        assert!(task.begin().is_none());
        assert!(task.is_done());
    }
}
