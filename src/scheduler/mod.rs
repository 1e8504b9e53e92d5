pub mod builder;
pub mod hooks;
pub mod legacy;
pub mod metrics;
pub mod regional;
pub mod selector;
pub mod traits;

pub use builder::SelectorBuilder;
pub use hooks::{MetricsHook, NoOpHook, SchedulerHook};
pub use legacy::GlobalTickScheduler;
pub use metrics::SchedulerMetrics;
pub use regional::RegionScheduler;
pub use selector::SchedulerSelector;
pub use traits::{BackendKind, TaskScheduler};
