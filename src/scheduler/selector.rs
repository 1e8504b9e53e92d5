use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::{
    common::{
        BackendPreference, Extension, ExtensionId, Result, SchedulerConfig, SchedulerError,
    },
    host::{HostRuntime, REGION_SCHEDULER_CAPABILITY},
    scheduler::{
        BackendKind, GlobalTickScheduler, RegionScheduler, SelectorBuilder, TaskScheduler,
        hooks::HookChain,
    },
};

/// 调度能力选择器
///
/// 按扩展缓存调度能力: 同一个扩展反复查询得到同一个实例，
/// 后端类型在第一次查询时根据宿主探测结果 (或配置的偏好) 确定。
///
/// 扩展的卸载流程应调用 [`SchedulerSelector::unload`]: 先取消任务并移出缓存，
/// 再把扩展标记为已卸载。只调用 `Extension::disable` 的话，缓存项要等到
/// 下一次查询该扩展时才被清掉。
pub struct SchedulerSelector {
    config: SchedulerConfig,
    hooks: HookChain,
    cache: DashMap<ExtensionId, Arc<dyn TaskScheduler>>,
}

impl Default for SchedulerSelector {
    fn default() -> Self {
        Self {
            config: SchedulerConfig::default(),
            hooks: HookChain::default(),
            cache: DashMap::new(),
        }
    }
}

impl SchedulerSelector {
    pub(crate) fn from_parts(config: SchedulerConfig, hooks: HookChain) -> Self {
        Self {
            config,
            hooks,
            cache: DashMap::new(),
        }
    }

    pub fn builder() -> SelectorBuilder {
        SelectorBuilder::new()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 探测宿主适合的后端
    ///
    /// 宿主声明了区域调度能力并且真的给出了区域接口时选区域后端，
    /// 否则退回全局 Tick 后端。两者都没有返回 `None`。
    pub fn probe(host: &dyn HostRuntime) -> Option<BackendKind> {
        if host.provides(REGION_SCHEDULER_CAPABILITY) {
            if host.region_sharded().is_some() {
                return Some(BackendKind::Regional);
            }
            warn!(
                "Host {} advertises {} without a region surface",
                host.name(),
                REGION_SCHEDULER_CAPABILITY
            );
        }
        host.global_tick().map(|_| BackendKind::Legacy)
    }

    /// 获取扩展的调度能力
    pub fn scheduler_for(&self, extension: &Extension) -> Result<Arc<dyn TaskScheduler>> {
        if !extension.is_enabled() {
            if self.cache.remove(extension.id()).is_some() {
                debug!("Evicted capability of disabled extension {}", extension.id());
            }
            let error = SchedulerError::rejected(extension.id(), "extension is not enabled");
            self.hooks.rejected(extension, &error);
            return Err(error);
        }

        if let Some(cached) = self.cache.get(extension.id()) {
            return Ok(cached.value().clone());
        }

        // 构建期间持有分片写锁，钩子放到锁外调用
        let mut created = None;
        let scheduler = self
            .cache
            .entry(extension.id().clone())
            .or_try_insert_with(|| {
                let scheduler = self.build(extension)?;
                created = Some(scheduler.backend());
                Ok::<_, SchedulerError>(scheduler)
            })?
            .value()
            .clone();

        if let Some(backend) = created {
            debug!(
                "Extension {} bound to {:?} backend on host {}",
                extension.id(),
                backend,
                extension.host().name()
            );
            self.hooks.backend_selected(extension, backend);
        }
        Ok(scheduler)
    }

    fn build(&self, extension: &Extension) -> Result<Arc<dyn TaskScheduler>> {
        let host = extension.host();
        let backend = match self.config.backend {
            BackendPreference::Auto => Self::probe(host.as_ref()).ok_or_else(|| {
                SchedulerError::Unsupported(format!(
                    "host {} exposes no scheduling surface",
                    host.name()
                ))
            })?,
            BackendPreference::Legacy => BackendKind::Legacy,
            BackendPreference::Regional => BackendKind::Regional,
        };

        let scheduler: Arc<dyn TaskScheduler> = match backend {
            BackendKind::Regional => {
                let surface = host.region_sharded().ok_or_else(|| {
                    SchedulerError::Unsupported(format!(
                        "host {} has no region scheduler",
                        host.name()
                    ))
                })?;
                Arc::new(RegionScheduler::new(
                    extension.clone(),
                    surface,
                    &self.config,
                    self.hooks.clone(),
                ))
            }
            BackendKind::Legacy => {
                let surface = host.global_tick().ok_or_else(|| {
                    SchedulerError::Unsupported(format!(
                        "host {} has no global tick scheduler",
                        host.name()
                    ))
                })?;
                Arc::new(GlobalTickScheduler::new(
                    extension.clone(),
                    surface,
                    self.hooks.clone(),
                ))
            }
        };
        Ok(scheduler)
    }

    /// 释放扩展的调度能力
    ///
    /// 取消它持有的全部任务并移出缓存。之前没有创建过返回 false。
    pub fn release(&self, extension: &Extension) -> bool {
        match self.cache.remove(extension.id()) {
            Some((_, scheduler)) => {
                scheduler.cancel_tasks();
                debug!("Released capability of {}", extension.id());
                true
            }
            None => false,
        }
    }

    /// 卸载扩展
    ///
    /// 取消它的全部任务、移出缓存，然后标记扩展已卸载，之后的提交都会被拒绝。
    /// 顺序不能反过来: 已卸载扩展上的批量取消是空操作。
    pub fn unload(&self, extension: &Extension) {
        let released = self.release(extension);
        extension.disable();
        debug!(
            "Extension {} unloaded (capability released: {})",
            extension.id(),
            released
        );
    }

    /// 已缓存的后端类型
    pub fn backend_of(&self, extension: &Extension) -> Option<BackendKind> {
        self.cache
            .get(extension.id())
            .map(|cached| cached.value().backend())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

// ==========================================
// 进程级选择器
// ==========================================

static GLOBAL: OnceLock<SchedulerSelector> = OnceLock::new();

/// 安装进程级选择器
///
/// 只能在第一次使用之前安装一次，之后再安装 (或者已经被懒加载为默认配置)
/// 返回 `Config` 错误。
pub fn install(selector: SchedulerSelector) -> Result<()> {
    GLOBAL.set(selector).map_err(|_| {
        SchedulerError::Config("the process-wide scheduler selector is already initialized".into())
    })
}

/// 进程级选择器，未安装时使用默认配置
pub fn global() -> &'static SchedulerSelector {
    GLOBAL.get_or_init(SchedulerSelector::default)
}

/// 从进程级选择器获取扩展的调度能力
pub fn scheduler(extension: &Extension) -> Result<Arc<dyn TaskScheduler>> {
    global().scheduler_for(extension)
}

/// 从进程级选择器释放扩展的调度能力
pub fn release(extension: &Extension) -> bool {
    global().release(extension)
}

/// 通过进程级选择器卸载扩展
pub fn unload(extension: &Extension) {
    global().unload(extension)
}
