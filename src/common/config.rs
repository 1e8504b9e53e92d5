use serde::{Deserialize, Serialize};

use crate::common::error::{Result, SchedulerError};

/// 后端选择偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// 自动探测 (默认)
    ///
    /// - 机制: 宿主提供区域调度能力时使用区域后端，否则使用全局 Tick 后端。
    #[default]
    Auto,

    /// 强制使用全局 Tick 后端
    Legacy,

    /// 强制使用区域调度后端
    ///
    /// - 宿主不具备区域调度能力时，选择器返回 `Unsupported`。
    Regional,
}

/// 调度层配置
///
/// 支持 `serde` 反序列化，所有字段都有默认值，可以只写需要覆盖的部分。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 后端选择偏好
    pub backend: BackendPreference,

    /// 单个 Tick 对应的毫秒数
    ///
    /// - 说明: 只在宿主接口按墙钟时间计时的地方使用 (区域宿主的异步调度器)。
    /// - 默认值: 50 (每秒 20 Tick)
    pub tick_millis: u64,

    /// 区域后端清理已结束句柄的频率
    ///
    /// - 说明: 区域后端需要自己记录发出的句柄，以便 `cancel_tasks()` 能覆盖区域/实体任务。
    ///   每提交 N 次清理一次已经结束的句柄。
    /// - 默认值: 64
    pub prune_every: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            tick_millis: 50,
            prune_every: 64,
        }
    }
}

impl SchedulerConfig {
    /// 从 JSON 加载配置，并做校验
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_millis == 0 {
            return Err(SchedulerError::Config(
                "tick_millis must be greater than 0".into(),
            ));
        }
        if self.prune_every == 0 {
            return Err(SchedulerError::Config(
                "prune_every must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = SchedulerConfig::from_json(r#"{ "backend": "legacy" }"#).unwrap();
        assert_eq!(cfg.backend, BackendPreference::Legacy);
        assert_eq!(cfg.tick_millis, 50);
        assert_eq!(cfg.prune_every, 64);
    }

    #[test]
    fn zero_tick_length_is_rejected() {
        let err = SchedulerConfig::from_json(r#"{ "tick_millis": 0 }"#).unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = SchedulerConfig::from_json("{ backend: ").unwrap_err();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }
}
