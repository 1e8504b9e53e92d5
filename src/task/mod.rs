pub mod deferrable;
pub mod handle;

pub use deferrable::{DeferrableWork, Work, WorkControl};
pub use handle::ScheduledTask;
