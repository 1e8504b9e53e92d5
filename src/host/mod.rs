pub mod memory;
pub mod traits;

pub use memory::{MemoryLegacyHost, MemoryRegionHost};
pub use traits::{
    CancelOutcome, GlobalTickHost, HostRuntime, HostTask, REGION_SCHEDULER_CAPABILITY,
    RegionShardedHost, Runnable, runnable,
};
