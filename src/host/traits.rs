use std::{sync::Arc, time::Duration};

use crate::common::{Discipline, EntityId, Extension, Location, Result, Timing};

/// 工作体
///
/// 周期任务会被反复调用，所以是 `Fn` 而不是 `FnOnce`。
pub type Runnable = Arc<dyn Fn() + Send + Sync + 'static>;

/// 把闭包包装成 `Runnable`
pub fn runnable<F>(body: F) -> Runnable
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(body)
}

/// 区域调度能力的探测符号
///
/// 宿主通过 `HostRuntime::provides` 声明自己是否具备区域分片调度。
pub const REGION_SCHEDULER_CAPABILITY: &str = "threaded-regions";

/// 取消结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// 任务尚未开始执行，之后也不会再执行
    Cancelled,
    /// 任务正在执行，本次执行不会被中断，但不会再有下一次
    CancelledWhileRunning,
    /// 之前已经被取消过
    AlreadyCancelled,
    /// 一次性任务已经执行完毕
    AlreadyDone,
}

// ==========================================
// 1. 宿主任务 (HostTask)
// ==========================================

/// 宿主调度器返回的任务对象
///
/// 后端把它包装成对外的 `ScheduledTask`。
pub trait HostTask: Send + Sync + 'static {
    /// 宿主内唯一的任务编号
    fn task_id(&self) -> u64;

    /// 提交该任务的扩展
    fn owner(&self) -> &Extension;

    /// 请求取消
    ///
    /// 不能中断正在执行的工作体，只保证之后不再执行。
    fn cancel(&self) -> CancelOutcome;

    fn is_cancelled(&self) -> bool;

    fn is_running(&self) -> bool;

    /// 一次性任务已执行，或任务已被取消且不在执行中
    fn is_done(&self) -> bool;
}

// ==========================================
// 2. 全局 Tick 调度接口 (GlobalTickHost)
// ==========================================

/// 经典宿主的调度接口: 只有一个主 Tick 线程
pub trait GlobalTickHost: Send + Sync + 'static {
    /// 当前线程是否是主 Tick 线程
    fn is_primary_thread(&self) -> bool;

    /// 提交任务
    ///
    /// - `Discipline::Sync`: 到期时在主 Tick 线程执行。
    /// - `Discipline::Async`: 到期时交给宿主的异步线程池执行。
    ///
    /// 延迟 0 等同于下一个 Tick。
    fn schedule(
        &self,
        owner: &Extension,
        discipline: Discipline,
        timing: Timing,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>>;

    /// 取消该扩展持有的全部任务
    fn cancel_tasks(&self, owner: &Extension);
}

// ==========================================
// 3. 区域分片调度接口 (RegionShardedHost)
// ==========================================

/// 区域分片宿主的调度接口
///
/// 宿主有一个全局 Tick 线程和若干区域线程，每个区域 (以及其中的实体)
/// 同一时刻只属于一个区域线程。
///
/// # 时序约束
/// 与全局 Tick 接口不同，这里的同步接口要求延迟至少为 1 个 Tick：
/// `Timing::Delayed(0)` 和初始延迟为 0 的 `Timing::Periodic` 是非法参数。
pub trait RegionShardedHost: Send + Sync + 'static {
    fn is_global_tick_thread(&self) -> bool;

    /// 当前线程是否是任意一个 Tick 线程 (全局或区域)
    fn is_tick_thread(&self) -> bool;

    /// 当前线程是否持有该坐标所在的区域
    fn is_owned_by_current_region(&self, location: &Location) -> bool;

    /// 当前线程是否持有该实体
    fn is_entity_owned_by_current_region(&self, entity: EntityId) -> bool;

    /// 全局区域调度器
    fn run_global(
        &self,
        owner: &Extension,
        timing: Timing,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>>;

    /// 区域调度器
    fn run_region(
        &self,
        owner: &Extension,
        location: &Location,
        timing: Timing,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>>;

    /// 实体调度器
    ///
    /// 实体已经被移除时返回 `TaskRejected`。
    fn run_entity(
        &self,
        owner: &Extension,
        entity: EntityId,
        timing: Timing,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>>;

    /// 异步调度器 (按墙钟时间计时)
    fn run_async(
        &self,
        owner: &Extension,
        delay: Duration,
        period: Option<Duration>,
        body: Runnable,
    ) -> Result<Arc<dyn HostTask>>;

    /// 取消该扩展在全局区域调度器上的任务
    fn cancel_global_tasks(&self, owner: &Extension);

    /// 取消该扩展在异步调度器上的任务
    fn cancel_async_tasks(&self, owner: &Extension);
}

// ==========================================
// 4. 宿主运行时 (HostRuntime)
// ==========================================

/// 宿主运行时的能力面
///
/// 选择器通过它探测宿主类型，并拿到对应的调度接口。
pub trait HostRuntime: Send + Sync + 'static {
    /// 宿主名称，用于日志
    fn name(&self) -> &str;

    /// 宿主是否提供某个能力符号
    fn provides(&self, capability: &str) -> bool;

    fn global_tick(&self) -> Option<Arc<dyn GlobalTickHost>>;

    fn region_sharded(&self) -> Option<Arc<dyn RegionShardedHost>>;
}
