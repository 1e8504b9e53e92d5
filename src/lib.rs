// 1. 基础模块
pub mod common;

// 2. 宿主接口与内存实现
pub mod host;

// 3. 调度能力 (后端 + 选择器)
pub mod scheduler;

// 4. 自绑定的延迟工作对象
pub mod task;

pub mod prelude {
    pub use crate::common::{
        BackendPreference, Discipline, EntityId, Extension, Location, Result, SchedulerConfig,
        SchedulerError, Timing,
    };
    pub use crate::host::{CancelOutcome, HostRuntime, MemoryLegacyHost, MemoryRegionHost, runnable};
    pub use crate::scheduler::{
        BackendKind, MetricsHook, SchedulerHook, SchedulerMetrics, SchedulerSelector,
        TaskScheduler, selector,
    };
    pub use crate::task::{DeferrableWork, ScheduledTask, Work, WorkControl};
}
