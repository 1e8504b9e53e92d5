use parking_lot::Mutex;
use std::sync::Arc;

use crate::{
    common::{Extension, Result, SchedulerError},
    host::{CancelOutcome, Runnable},
    scheduler::{TaskScheduler, selector},
    task::ScheduledTask,
};

// ==========================================
// 1. 工作体接口 (Work)
// ==========================================

/// 可延迟执行的工作体
///
/// 实现者只需要写 `run`。`control` 指向承载它的工作对象，
/// 工作体可以借此在满足条件时取消自己 (例如周期任务跑够 N 次)。
pub trait Work: Send + Sync + 'static {
    fn run(&self, control: &WorkControl);
}

// 闭包直接就是工作体
impl<F> Work for F
where
    F: Fn(&WorkControl) + Send + Sync + 'static,
{
    fn run(&self, control: &WorkControl) {
        self(control)
    }
}

// ==========================================
// 2. 绑定槽位 (WorkControl)
// ==========================================

/// 工作对象与其任务句柄之间的绑定
///
/// 提交、取消、查询都在同一把锁下完成，所以两个并发提交只有一个能成功。
/// 工作体在提交返回之前就被宿主调度起来的话，它对 `cancel()` 的调用会
/// 等到绑定完成后再执行。
#[derive(Clone, Default)]
pub struct WorkControl {
    slot: Arc<Mutex<Option<ScheduledTask>>>,
}

impl WorkControl {
    /// 取消绑定的任务
    pub fn cancel(&self) -> Result<CancelOutcome> {
        let slot = self.slot.lock();
        let task = slot.as_ref().ok_or(SchedulerError::NotYetScheduled)?;
        Ok(task.cancel())
    }

    /// 绑定的任务是否已被取消
    pub fn is_cancelled(&self) -> Result<bool> {
        let slot = self.slot.lock();
        let task = slot.as_ref().ok_or(SchedulerError::NotYetScheduled)?;
        Ok(task.is_cancelled())
    }

    /// 绑定的任务句柄，未提交时为 `None`
    pub fn task(&self) -> Option<ScheduledTask> {
        self.slot.lock().clone()
    }

    pub fn is_scheduled(&self) -> bool {
        self.slot.lock().is_some()
    }
}

// ==========================================
// 3. 工作对象 (DeferrableWork)
// ==========================================

/// 自绑定的延迟工作对象
///
/// 状态: 未调度 -> 已调度 -> (取消 / 自然结束)。
/// 一个工作对象一生只绑定一个任务句柄，第二次提交返回 `AlreadyScheduled`。
///
/// 提交时通过进程级选择器 (`scheduler::selector`) 找到扩展对应的后端。
/// 这里不提供亲和性重载，需要区域/实体亲和性的调用方直接使用 `TaskScheduler`。
///
/// Clone 得到的是同一个工作对象的另一个引用，共享绑定状态。
pub struct DeferrableWork<W> {
    body: Arc<W>,
    control: WorkControl,
}

impl<W> Clone for DeferrableWork<W> {
    fn clone(&self) -> Self {
        Self {
            body: self.body.clone(),
            control: self.control.clone(),
        }
    }
}

impl<W: Work> DeferrableWork<W> {
    pub fn new(body: W) -> Self {
        Self {
            body: Arc::new(body),
            control: WorkControl::default(),
        }
    }

    pub fn body(&self) -> &W {
        &self.body
    }

    pub fn control(&self) -> &WorkControl {
        &self.control
    }

    /// 取消绑定的任务，未提交时返回 `NotYetScheduled`
    pub fn cancel(&self) -> Result<CancelOutcome> {
        self.control.cancel()
    }

    /// 绑定的任务是否已被取消，未提交时返回 `NotYetScheduled`
    pub fn is_cancelled(&self) -> Result<bool> {
        self.control.is_cancelled()
    }

    pub fn task(&self) -> Option<ScheduledTask> {
        self.control.task()
    }

    /// 下一个 Tick 在 Tick 线程执行
    pub fn run_task(&self, extension: &Extension) -> Result<ScheduledTask> {
        self.submit(extension, |scheduler, body| scheduler.run_task(body))
    }

    /// **异步任务不得访问宿主 API，线程安全由调用方自己保证。**
    ///
    /// 下一个 Tick 投递到宿主的异步线程池执行。
    pub fn run_task_async(&self, extension: &Extension) -> Result<ScheduledTask> {
        self.submit(extension, |scheduler, body| scheduler.run_task_async(body))
    }

    /// `delay` 个 Tick 之后在 Tick 线程执行
    pub fn run_task_later(&self, extension: &Extension, delay: i64) -> Result<ScheduledTask> {
        self.submit(extension, |scheduler, body| {
            scheduler.run_task_later(body, delay)
        })
    }

    /// **异步任务不得访问宿主 API。**
    pub fn run_task_later_async(&self, extension: &Extension, delay: i64) -> Result<ScheduledTask> {
        self.submit(extension, |scheduler, body| {
            scheduler.run_task_later_async(body, delay)
        })
    }

    /// 首次延迟 `delay` 个 Tick，之后每 `period` 个 Tick 在 Tick 线程执行，直到取消
    pub fn run_task_timer(
        &self,
        extension: &Extension,
        delay: i64,
        period: i64,
    ) -> Result<ScheduledTask> {
        self.submit(extension, |scheduler, body| {
            scheduler.run_task_timer(body, delay, period)
        })
    }

    /// **异步任务不得访问宿主 API。**
    pub fn run_task_timer_async(
        &self,
        extension: &Extension,
        delay: i64,
        period: i64,
    ) -> Result<ScheduledTask> {
        self.submit(extension, |scheduler, body| {
            scheduler.run_task_timer_async(body, delay, period)
        })
    }

    /// 检查状态、提交、绑定句柄，全部在槽位锁内完成
    ///
    /// 任何一步失败，槽位保持为空。
    fn submit<F>(&self, extension: &Extension, submit: F) -> Result<ScheduledTask>
    where
        F: FnOnce(&dyn TaskScheduler, Runnable) -> Result<ScheduledTask>,
    {
        let mut slot = self.control.slot.lock();
        if slot.is_some() {
            return Err(SchedulerError::AlreadyScheduled);
        }
        let scheduler = selector::scheduler(extension)?;
        let task = submit(scheduler.as_ref(), self.runnable())?;
        *slot = Some(task.clone());
        Ok(task)
    }

    fn runnable(&self) -> Runnable {
        let body = self.body.clone();
        let control = self.control.clone();
        Arc::new(move || body.run(&control))
    }
}
