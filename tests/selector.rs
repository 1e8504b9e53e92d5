mod support;

use parking_lot::Mutex;
use std::sync::{Arc, atomic::Ordering};

use support::{count, counter, legacy, regional};
use tickbridge::{
    common::{BackendPreference, Extension, Location, SchedulerConfig, SchedulerError},
    host::{GlobalTickHost, HostRuntime, MemoryLegacyHost, RegionShardedHost},
    scheduler::{
        BackendKind, MetricsHook, SchedulerHook, SchedulerMetrics, SchedulerSelector,
        TaskScheduler,
    },
    task::ScheduledTask,
};

// ==========================================
// 测试用宿主
// ==========================================

/// 什么调度接口都不提供的宿主
struct BareHost;

impl HostRuntime for BareHost {
    fn name(&self) -> &str {
        "bare"
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

/// 声明了区域能力却只给出全局 Tick 接口的宿主
struct MisreportingHost(MemoryLegacyHost);

impl HostRuntime for MisreportingHost {
    fn name(&self) -> &str {
        "misreporting"
    }

    fn provides(&self, _capability: &str) -> bool {
        true
    }

    fn global_tick(&self) -> Option<Arc<dyn GlobalTickHost>> {
        self.0.global_tick()
    }

    fn region_sharded(&self) -> Option<Arc<dyn RegionShardedHost>> {
        None
    }
}

/// 记录钩子调用顺序
#[derive(Clone, Default)]
struct RecordingHook {
    events: Arc<Mutex<Vec<String>>>,
}

impl SchedulerHook for RecordingHook {
    fn on_backend_selected(&self, extension: &Extension, backend: BackendKind) {
        self.events
            .lock()
            .push(format!("selected:{}:{:?}", extension.name(), backend));
    }

    fn on_submit(&self, task: &ScheduledTask) {
        self.events
            .lock()
            .push(format!("submit:{}", task.owner().name()));
    }

    fn on_rejected(&self, extension: &Extension, _error: &SchedulerError) {
        self.events
            .lock()
            .push(format!("rejected:{}", extension.name()));
    }

    fn on_cancel_tasks(&self, extension: &Extension) {
        self.events
            .lock()
            .push(format!("cancel_tasks:{}", extension.name()));
    }
}

// ==========================================
// 探测与缓存
// ==========================================

#[tokio::test]
async fn capability_is_cached_per_extension() {
    let (_host, ext) = legacy("cached");
    let selector = SchedulerSelector::default();

    let first = selector.scheduler_for(&ext).unwrap();
    let second = selector.scheduler_for(&ext).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(selector.len(), 1);

    // 同一个宿主上的另一个扩展拿到另一个实例
    let other = Extension::new("cached-other", ext.host().clone());
    let third = selector.scheduler_for(&other).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert!(third.extension().same_as(&other));
    assert_eq!(selector.len(), 2);
}

#[tokio::test]
async fn probing_picks_the_backend_from_the_host() {
    let (_legacy_host, legacy_ext) = legacy("probe-legacy");
    let (_region_host, region_ext) = regional("probe-region");
    let selector = SchedulerSelector::default();

    assert_eq!(
        SchedulerSelector::probe(legacy_ext.host().as_ref()),
        Some(BackendKind::Legacy)
    );
    assert_eq!(
        SchedulerSelector::probe(region_ext.host().as_ref()),
        Some(BackendKind::Regional)
    );

    assert!(selector.backend_of(&legacy_ext).is_none());
    selector.scheduler_for(&legacy_ext).unwrap();
    selector.scheduler_for(&region_ext).unwrap();
    assert_eq!(selector.backend_of(&legacy_ext), Some(BackendKind::Legacy));
    assert_eq!(selector.backend_of(&region_ext), Some(BackendKind::Regional));
}

#[tokio::test]
async fn misreported_capability_falls_back_to_the_global_tick() {
    let host = MisreportingHost(MemoryLegacyHost::new().unwrap());
    let ext = Extension::new("misreporting", Arc::new(host));
    let scheduler = SchedulerSelector::default().scheduler_for(&ext).unwrap();
    assert_eq!(scheduler.backend(), BackendKind::Legacy);
}

#[tokio::test]
async fn host_without_surfaces_is_unsupported() {
    let ext = Extension::new("bare", Arc::new(BareHost));
    let selector = SchedulerSelector::default();
    let err = selector.scheduler_for(&ext).err().unwrap();
    assert!(matches!(err, SchedulerError::Unsupported(_)));
    assert!(selector.is_empty());
}

#[tokio::test]
async fn forced_backend_must_exist_on_the_host() {
    let (_legacy_host, legacy_ext) = legacy("forced-legacy-host");
    let (_region_host, region_ext) = regional("forced-region-host");

    let regional_only = SchedulerSelector::builder()
        .with_backend(BackendPreference::Regional)
        .build()
        .unwrap();
    assert!(matches!(
        regional_only.scheduler_for(&legacy_ext),
        Err(SchedulerError::Unsupported(_))
    ));
    assert_eq!(
        regional_only.scheduler_for(&region_ext).unwrap().backend(),
        BackendKind::Regional
    );

    let legacy_only = SchedulerSelector::builder()
        .with_backend(BackendPreference::Legacy)
        .build()
        .unwrap();
    assert!(matches!(
        legacy_only.scheduler_for(&region_ext),
        Err(SchedulerError::Unsupported(_))
    ));
}

#[test]
fn builder_rejects_invalid_config() {
    let config = SchedulerConfig {
        tick_millis: 0,
        ..SchedulerConfig::default()
    };
    let err = SchedulerSelector::builder()
        .with_config(config)
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, SchedulerError::Config(_)));
}

// ==========================================
// 扩展生命周期
// ==========================================

#[tokio::test]
async fn disabled_extension_is_evicted() {
    let (_host, ext) = legacy("evicted");
    let selector = SchedulerSelector::default();
    selector.scheduler_for(&ext).unwrap();
    assert_eq!(selector.len(), 1);

    ext.disable();
    let err = selector.scheduler_for(&ext).err().unwrap();
    assert!(matches!(err, SchedulerError::TaskRejected { .. }));
    assert!(selector.is_empty());
    assert!(selector.backend_of(&ext).is_none());
}

#[tokio::test]
async fn unload_drops_the_capability_without_another_lookup() {
    let (host, ext) = regional("unloaded-eagerly");
    let selector = SchedulerSelector::default();
    let scheduler = selector.scheduler_for(&ext).unwrap();
    let (runs, body) = counter();
    let entity = host.spawn_entity(Location::new("overworld", 0.0, 0.0, 0.0));

    let global = scheduler.run_task_timer(body.clone(), 1, 1).unwrap();
    let on_entity = scheduler.run_task_later_on(entity, body, 4).unwrap();
    assert_eq!(selector.len(), 1);

    selector.unload(&ext);
    assert!(!ext.is_enabled());
    assert!(selector.is_empty());
    assert!(selector.backend_of(&ext).is_none());
    assert!(global.is_cancelled());
    assert!(on_entity.is_cancelled());

    host.advance(10).await.unwrap();
    assert_eq!(count(&runs), 0);
    assert_eq!(host.live_tasks(), 0);
    assert!(matches!(
        selector.scheduler_for(&ext),
        Err(SchedulerError::TaskRejected { .. })
    ));
}

#[tokio::test]
async fn release_cancels_outstanding_work() {
    let (host, ext) = regional("released");
    let selector = SchedulerSelector::default();
    let scheduler = selector.scheduler_for(&ext).unwrap();
    let (runs, body) = counter();
    let entity = host.spawn_entity(Location::new("overworld", 0.0, 0.0, 0.0));

    let global = scheduler.run_task_later(body.clone(), 5).unwrap();
    let on_entity = scheduler.run_task_timer_on(entity, body, 1, 1).unwrap();

    assert!(selector.release(&ext));
    assert!(!selector.release(&ext));
    assert!(global.is_cancelled());
    assert!(on_entity.is_cancelled());

    host.advance(10).await.unwrap();
    assert_eq!(count(&runs), 0);

    // 释放后重新获取得到新实例
    let fresh = selector.scheduler_for(&ext).unwrap();
    assert!(!Arc::ptr_eq(&scheduler, &fresh));
}

// ==========================================
// 钩子与指标
// ==========================================

#[tokio::test]
async fn metrics_hook_counts_selector_and_backend_events() {
    let (_host, ext) = legacy("metrics");
    let (_region_host, region_ext) = regional("metrics-region");
    let metrics = Arc::new(SchedulerMetrics::default());
    let selector = SchedulerSelector::builder()
        .with_hook(MetricsHook::new(metrics.clone()))
        .build()
        .unwrap();

    let scheduler = selector.scheduler_for(&ext).unwrap();
    selector.scheduler_for(&ext).unwrap();
    selector.scheduler_for(&region_ext).unwrap();
    assert_eq!(metrics.backends_legacy.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.backends_regional.load(Ordering::Relaxed), 1);

    let (_, body) = counter();
    scheduler.run_task(body.clone()).unwrap();
    scheduler.run_task_later_async(body.clone(), 3).unwrap();
    assert_eq!(metrics.submitted.load(Ordering::Relaxed), 2);

    // 参数错误不算拒绝
    assert!(scheduler.run_task_later(body.clone(), -1).is_err());
    assert_eq!(metrics.rejected.load(Ordering::Relaxed), 0);

    scheduler.cancel_tasks();
    assert_eq!(metrics.bulk_cancels.load(Ordering::Relaxed), 1);

    ext.disable();
    assert!(scheduler.run_task(body).is_err());
    assert_eq!(metrics.rejected.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn hooks_fire_in_order() {
    let (_host, ext) = legacy("hooked");
    let recorder = RecordingHook::default();
    let selector = SchedulerSelector::builder()
        .with_hook(recorder.clone())
        .build()
        .unwrap();

    let scheduler = selector.scheduler_for(&ext).unwrap();
    let (_, body) = counter();
    scheduler.run_task_later(body.clone(), 3).unwrap();
    scheduler.cancel_tasks();
    ext.disable();
    let _ = scheduler.run_task(body);

    assert_eq!(
        *recorder.events.lock(),
        vec![
            "selected:hooked:Legacy".to_string(),
            "submit:hooked".to_string(),
            "cancel_tasks:hooked".to_string(),
            "rejected:hooked".to_string(),
        ]
    );
}
