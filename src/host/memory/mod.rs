pub(crate) mod core;
pub mod legacy;
pub mod regional;
pub(crate) mod task;

pub use legacy::MemoryLegacyHost;
pub use regional::MemoryRegionHost;
