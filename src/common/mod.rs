pub mod config;
pub mod error;
pub mod model;
pub mod time;
pub(crate) mod utils;

// 导出配置
pub use config::{BackendPreference, SchedulerConfig};

// 导出错误类型
pub use error::{Result, SchedulerError};

// 导出核心模型
pub use model::{
    Affinity, AffinityKind, Discipline, EntityId, Extension, ExtensionId, Location, RegionCoord,
    Timing,
};

pub use time::TickUtils;
// 内部工具的快捷访问
pub(crate) use utils::{new_extension_id, new_host_id};
