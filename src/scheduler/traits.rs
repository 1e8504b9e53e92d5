use serde::Serialize;
use tracing::warn;

use crate::{
    common::{
        Discipline, EntityId, Extension, Location, Result, SchedulerError, TickUtils, Timing,
    },
    host::Runnable,
    task::ScheduledTask,
};

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// 全局 Tick 宿主 (只有一个主线程)
    Legacy,
    /// 区域分片宿主
    Regional,
}

/// 调度能力 (Scheduling Capability)
///
/// 每个扩展一个实例，由选择器按宿主类型创建并缓存。
///
/// 后端只需要实现必选部分 (谓词、`submit`、`cancel_tasks`)，
/// 整个提交矩阵 (立即/延迟/周期 × 同步/异步 × 亲和性) 都由默认方法展开。
/// 支持区域分片的后端覆盖 `submit_at` / `submit_on`。
pub trait TaskScheduler: Send + Sync + 'static {
    // ==========================================
    // 1. 身份与线程谓词
    // ==========================================

    /// 绑定的扩展
    fn extension(&self) -> &Extension;

    fn backend(&self) -> BackendKind;

    /// 当前线程是否是全局 Tick 线程
    fn is_global_thread(&self) -> bool;

    /// 当前线程是否是任意 Tick 线程
    fn is_tick_thread(&self) -> bool;

    /// 当前线程是否持有该实体
    fn is_entity_thread(&self, entity: EntityId) -> bool;

    /// 当前线程是否持有该坐标所在的区域
    fn is_region_thread(&self, location: &Location) -> bool;

    // ==========================================
    // 2. 后端原语
    // ==========================================

    /// 不限定亲和性的提交
    fn submit(&self, discipline: Discipline, timing: Timing, body: Runnable)
    -> Result<ScheduledTask>;

    /// 按区域提交，默认忽略坐标，退化为同步提交
    fn submit_at(
        &self,
        location: &Location,
        timing: Timing,
        body: Runnable,
    ) -> Result<ScheduledTask> {
        let _ = location;
        self.submit(Discipline::Sync, timing, body)
    }

    /// 按实体提交，默认忽略实体，退化为同步提交
    fn submit_on(&self, entity: EntityId, timing: Timing, body: Runnable) -> Result<ScheduledTask> {
        let _ = entity;
        self.submit(Discipline::Sync, timing, body)
    }

    /// 取消该扩展持有的全部任务
    ///
    /// 幂等。扩展已卸载时什么都不做。
    fn cancel_tasks(&self);

    // ==========================================
    // 3. 提交矩阵: 同步
    // ==========================================

    fn run_task(&self, body: Runnable) -> Result<ScheduledTask> {
        self.submit(Discipline::Sync, Timing::Immediate, body)
    }

    fn run_task_later(&self, body: Runnable, delay: i64) -> Result<ScheduledTask> {
        self.submit(Discipline::Sync, TickUtils::delayed(delay)?, body)
    }

    fn run_task_timer(&self, body: Runnable, delay: i64, period: i64) -> Result<ScheduledTask> {
        self.submit(Discipline::Sync, TickUtils::periodic(delay, period)?, body)
    }

    // ==========================================
    // 4. 提交矩阵: 异步
    // ==========================================

    /// **异步任务不得访问宿主 API。**
    fn run_task_async(&self, body: Runnable) -> Result<ScheduledTask> {
        self.submit(Discipline::Async, Timing::Immediate, body)
    }

    fn run_task_later_async(&self, body: Runnable, delay: i64) -> Result<ScheduledTask> {
        self.submit(Discipline::Async, TickUtils::delayed(delay)?, body)
    }

    fn run_task_timer_async(
        &self,
        body: Runnable,
        delay: i64,
        period: i64,
    ) -> Result<ScheduledTask> {
        self.submit(Discipline::Async, TickUtils::periodic(delay, period)?, body)
    }

    // ==========================================
    // 5. 提交矩阵: 区域亲和性
    // ==========================================

    fn run_task_at(&self, location: &Location, body: Runnable) -> Result<ScheduledTask> {
        self.submit_at(location, Timing::Immediate, body)
    }

    fn run_task_later_at(
        &self,
        location: &Location,
        body: Runnable,
        delay: i64,
    ) -> Result<ScheduledTask> {
        self.submit_at(location, TickUtils::delayed(delay)?, body)
    }

    fn run_task_timer_at(
        &self,
        location: &Location,
        body: Runnable,
        delay: i64,
        period: i64,
    ) -> Result<ScheduledTask> {
        self.submit_at(location, TickUtils::periodic(delay, period)?, body)
    }

    // ==========================================
    // 6. 提交矩阵: 实体亲和性
    // ==========================================

    fn run_task_on(&self, entity: EntityId, body: Runnable) -> Result<ScheduledTask> {
        self.submit_on(entity, Timing::Immediate, body)
    }

    fn run_task_later_on(
        &self,
        entity: EntityId,
        body: Runnable,
        delay: i64,
    ) -> Result<ScheduledTask> {
        self.submit_on(entity, TickUtils::delayed(delay)?, body)
    }

    fn run_task_timer_on(
        &self,
        entity: EntityId,
        body: Runnable,
        delay: i64,
        period: i64,
    ) -> Result<ScheduledTask> {
        self.submit_on(entity, TickUtils::periodic(delay, period)?, body)
    }

    // ==========================================
    // 7. 旧版重载 (显式传入扩展句柄)
    // ==========================================
    // 能力对象本身已经绑定了扩展，这里的参数只做校验。

    #[deprecated(note = "the capability is already bound to its extension, use `run_task`")]
    fn run_task_for(&self, extension: Option<&Extension>, body: Runnable) -> Result<ScheduledTask> {
        check_extension(self.extension(), extension)?;
        self.run_task(body)
    }

    #[deprecated(note = "use `run_task_later`")]
    fn run_task_later_for(
        &self,
        extension: Option<&Extension>,
        body: Runnable,
        delay: i64,
    ) -> Result<ScheduledTask> {
        check_extension(self.extension(), extension)?;
        self.run_task_later(body, delay)
    }

    #[deprecated(note = "use `run_task_timer`")]
    fn run_task_timer_for(
        &self,
        extension: Option<&Extension>,
        body: Runnable,
        delay: i64,
        period: i64,
    ) -> Result<ScheduledTask> {
        check_extension(self.extension(), extension)?;
        self.run_task_timer(body, delay, period)
    }

    #[deprecated(note = "use `run_task_async`")]
    fn run_task_async_for(
        &self,
        extension: Option<&Extension>,
        body: Runnable,
    ) -> Result<ScheduledTask> {
        check_extension(self.extension(), extension)?;
        self.run_task_async(body)
    }

    #[deprecated(note = "use `run_task_later_async`")]
    fn run_task_later_async_for(
        &self,
        extension: Option<&Extension>,
        body: Runnable,
        delay: i64,
    ) -> Result<ScheduledTask> {
        check_extension(self.extension(), extension)?;
        self.run_task_later_async(body, delay)
    }

    #[deprecated(note = "use `run_task_timer_async`")]
    fn run_task_timer_async_for(
        &self,
        extension: Option<&Extension>,
        body: Runnable,
        delay: i64,
        period: i64,
    ) -> Result<ScheduledTask> {
        check_extension(self.extension(), extension)?;
        self.run_task_timer_async(body, delay, period)
    }
}

/// 旧版重载的扩展句柄校验
///
/// 空句柄是非法参数。句柄与绑定的扩展不一致时只记录警告，仍然以绑定的扩展提交。
fn check_extension(bound: &Extension, passed: Option<&Extension>) -> Result<()> {
    let passed = passed
        .ok_or_else(|| SchedulerError::InvalidArgument("extension must not be null".into()))?;
    if !passed.same_as(bound) {
        warn!(
            "Extension {} submitted through the capability of {}, using the bound extension",
            passed.id(),
            bound.id()
        );
    }
    Ok(())
}
