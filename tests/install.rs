// 进程级选择器只能安装一次，单独放在一个测试二进制里
mod support;

use std::sync::{Arc, atomic::Ordering};

use support::legacy;
use tickbridge::{
    common::SchedulerError,
    scheduler::{MetricsHook, SchedulerMetrics, SchedulerSelector, selector},
    task::{DeferrableWork, WorkControl},
};

#[tokio::test]
async fn installed_selector_serves_deferrable_work() {
    let metrics = Arc::new(SchedulerMetrics::default());
    let installed = SchedulerSelector::builder()
        .with_hook(MetricsHook::new(metrics.clone()))
        .build()
        .unwrap();
    selector::install(installed).unwrap();

    let again = selector::install(SchedulerSelector::default()).unwrap_err();
    assert!(matches!(again, SchedulerError::Config(_)));

    let (host, ext) = legacy("installed");
    let work = DeferrableWork::new(|_: &WorkControl| {});
    work.run_task_later(&ext, 2).unwrap();
    assert_eq!(metrics.submitted.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.backends_legacy.load(Ordering::Relaxed), 1);
    assert_eq!(selector::global().len(), 1);

    host.advance(2).await.unwrap();
    assert!(selector::release(&ext));
    assert!(selector::global().is_empty());

    // 卸载时不需要再查询一次就能清掉缓存
    let (_host, unloaded) = legacy("installed-unload");
    selector::scheduler(&unloaded).unwrap();
    assert_eq!(selector::global().len(), 1);
    selector::unload(&unloaded);
    assert!(!unloaded.is_enabled());
    assert!(selector::global().is_empty());
}
