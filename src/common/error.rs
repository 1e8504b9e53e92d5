use thiserror::Error;

use crate::common::ExtensionId;

/// 调度层统一结果类型
///
/// 使用此别名可以简化函数签名：`fn do_something() -> Result<()>`
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    // ==========================================
    // 1. 调用方参数错误 (Caller Input)
    // ==========================================
    /// 参数非法
    ///
    /// - 触发场景: 扩展句柄为空 (仅旧版重载可表达)、延迟为负数、周期不为正数。
    /// - 后果: 调用无任何副作用，不会产生任务句柄。
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ==========================================
    // 2. 生命周期错误 (DeferrableWork Lifecycle)
    // ==========================================
    /// 工作对象已经绑定过任务
    ///
    /// - 触发场景: 对同一个 `DeferrableWork` 第二次提交。
    /// - 后果: 第一次提交得到的句柄保持不变。
    #[error("Already scheduled")]
    AlreadyScheduled,

    /// 工作对象尚未提交
    ///
    /// - 触发场景: 在提交之前调用 `cancel()` 或 `is_cancelled()`。
    #[error("Not scheduled yet")]
    NotYetScheduled,

    // ==========================================
    // 3. 后端拒绝 (Backend Rejection)
    // ==========================================
    /// 宿主拒绝了本次提交
    ///
    /// - 触发场景: 扩展已被卸载、宿主正在停机、实体已经移除。
    /// - 后果: `DeferrableWork` 保持未调度状态，可以再次尝试提交。
    #[error("Task rejected for extension {extension}: {reason}")]
    TaskRejected {
        extension: ExtensionId,
        reason: String,
    },

    /// 宿主没有可用的调度能力
    ///
    /// - 触发场景: 宿主既不提供全局 Tick 调度也不提供区域调度，
    ///   或者配置强制指定了宿主不具备的后端。
    #[error("Unsupported host: {0}")]
    Unsupported(String),

    // ==========================================
    // 4. 配置错误 (Configuration)
    // ==========================================
    /// 配置错误
    ///
    /// - 触发场景: 参数校验不通过，或者进程级选择器被重复安装。
    #[error("Configuration error: {0}")]
    Config(String),

    /// 配置反序列化失败
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 通用 IO 错误
    ///
    /// - 触发场景: 内存宿主创建 Tick 线程失败。
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    pub(crate) fn rejected(extension: &ExtensionId, reason: impl Into<String>) -> Self {
        SchedulerError::TaskRejected {
            extension: extension.clone(),
            reason: reason.into(),
        }
    }

    /// 是否属于工作对象的状态机错误
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            SchedulerError::AlreadyScheduled | SchedulerError::NotYetScheduled
        )
    }

    /// 是否是宿主侧的拒绝 (调用本身合法，但当前无法受理)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SchedulerError::TaskRejected { .. } | SchedulerError::Unsupported(_)
        )
    }
}
