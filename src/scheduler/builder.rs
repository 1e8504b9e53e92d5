use std::sync::Arc;

use tracing::debug;

use crate::{
    common::{BackendPreference, Result, SchedulerConfig},
    scheduler::{SchedulerHook, SchedulerSelector, hooks::HookChain},
};

/// 选择器构建器
///
/// ```ignore
/// let metrics = Arc::new(SchedulerMetrics::default());
/// let selector = SchedulerSelector::builder()
///     .with_backend(BackendPreference::Auto)
///     .with_hook(MetricsHook::new(metrics.clone()))
///     .build()?;
/// selector::install(selector)?;
/// ```
#[derive(Default)]
pub struct SelectorBuilder {
    /// 选填: 配置 (默认 `SchedulerConfig::default()`)
    config: Option<SchedulerConfig>,
    /// 选填: 钩子链路
    hooks: Vec<Arc<dyn SchedulerHook>>,
}

impl SelectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 只覆盖后端偏好，其余配置保持不变
    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        let config = self.config.take().unwrap_or_default();
        self.config = Some(config.with_backend(backend));
        self
    }

    /// 添加钩子 (支持链式调用)
    ///
    /// **注意**: 钩子的执行顺序与添加顺序一致 (FIFO)。
    pub fn with_hook<H>(mut self, hook: H) -> Self
    where
        H: SchedulerHook,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// 校验配置并生成选择器
    pub fn build(self) -> Result<SchedulerSelector> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let hooks = HookChain::new(self.hooks);
        debug!(
            "Scheduler selector built: backend={:?}, tick_millis={}, hooks={}",
            config.backend,
            config.tick_millis,
            hooks.len()
        );
        Ok(SchedulerSelector::from_parts(config, hooks))
    }
}
