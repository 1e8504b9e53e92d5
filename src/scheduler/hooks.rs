use std::sync::Arc;

use crate::{
    common::{Extension, SchedulerError},
    scheduler::{BackendKind, SchedulerMetrics},
    task::ScheduledTask,
};

/// 调度钩子接口
///
/// 用户可以通过实现此 Trait 介入选择器和后端的关键节点。
/// 常见用途：
/// - 监控计数 (见 `MetricsHook`)
/// - 审计扩展提交了哪些任务
///
/// 钩子在调用线程上同步执行，可能是 Tick 线程，实现必须足够轻量。
pub trait SchedulerHook: Send + Sync + 'static {
    /// 选择器为扩展创建了调度能力
    fn on_backend_selected(&self, _extension: &Extension, _backend: BackendKind) {}

    /// 提交成功
    fn on_submit(&self, _task: &ScheduledTask) {}

    /// 提交被拒绝 (参数错误不会触发)
    fn on_rejected(&self, _extension: &Extension, _error: &SchedulerError) {}

    /// 执行了一次批量取消
    fn on_cancel_tasks(&self, _extension: &Extension) {}
}

pub struct NoOpHook;

impl SchedulerHook for NoOpHook {}

/// 钩子链
///
/// 按注册顺序 (FIFO) 依次调用。
#[derive(Clone, Default)]
pub(crate) struct HookChain {
    hooks: Arc<[Arc<dyn SchedulerHook>]>,
}

impl HookChain {
    pub(crate) fn new(hooks: Vec<Arc<dyn SchedulerHook>>) -> Self {
        Self {
            hooks: hooks.into(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    pub(crate) fn backend_selected(&self, extension: &Extension, backend: BackendKind) {
        for hook in self.hooks.iter() {
            hook.on_backend_selected(extension, backend);
        }
    }

    pub(crate) fn submitted(&self, task: &ScheduledTask) {
        for hook in self.hooks.iter() {
            hook.on_submit(task);
        }
    }

    pub(crate) fn rejected(&self, extension: &Extension, error: &SchedulerError) {
        for hook in self.hooks.iter() {
            hook.on_rejected(extension, error);
        }
    }

    pub(crate) fn cancelled_all(&self, extension: &Extension) {
        for hook in self.hooks.iter() {
            hook.on_cancel_tasks(extension);
        }
    }
}

// ==========================================
// 内置钩子: 指标统计
// ==========================================

pub struct MetricsHook {
    metrics: Arc<SchedulerMetrics>,
}

impl MetricsHook {
    pub fn new(metrics: Arc<SchedulerMetrics>) -> Self {
        Self { metrics }
    }
}

impl SchedulerHook for MetricsHook {
    fn on_backend_selected(&self, _extension: &Extension, backend: BackendKind) {
        self.metrics.inc_backend(backend);
    }

    fn on_submit(&self, _task: &ScheduledTask) {
        self.metrics.inc_submitted();
    }

    fn on_rejected(&self, _extension: &Extension, _error: &SchedulerError) {
        self.metrics.inc_rejected();
    }

    fn on_cancel_tasks(&self, _extension: &Extension) {
        self.metrics.inc_bulk_cancels();
    }
}
