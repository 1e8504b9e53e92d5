use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::{
    common::{
        AffinityKind, Discipline, EntityId, Extension, Location, Result, SchedulerError, Timing,
    },
    host::{GlobalTickHost, Runnable},
    scheduler::{BackendKind, TaskScheduler, hooks::HookChain},
    task::ScheduledTask,
};

/// 全局 Tick 后端
///
/// 宿主只有一个主线程，所有线程谓词都等价于"当前是否是主线程"，
/// 亲和性提交全部退化为普通同步提交。
pub struct GlobalTickScheduler {
    extension: Extension,
    host: Arc<dyn GlobalTickHost>,
    hooks: HookChain,
}

impl GlobalTickScheduler {
    pub(crate) fn new(extension: Extension, host: Arc<dyn GlobalTickHost>, hooks: HookChain) -> Self {
        Self {
            extension,
            host,
            hooks,
        }
    }

    fn reject(&self, error: SchedulerError) -> SchedulerError {
        warn!("Submission for {} rejected: {}", self.extension.id(), error);
        self.hooks.rejected(&self.extension, &error);
        error
    }
}

impl TaskScheduler for GlobalTickScheduler {
    fn extension(&self) -> &Extension {
        &self.extension
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn is_global_thread(&self) -> bool {
        self.host.is_primary_thread()
    }

    fn is_tick_thread(&self) -> bool {
        self.host.is_primary_thread()
    }

    fn is_entity_thread(&self, _entity: EntityId) -> bool {
        self.host.is_primary_thread()
    }

    fn is_region_thread(&self, _location: &Location) -> bool {
        self.host.is_primary_thread()
    }

    fn submit(
        &self,
        discipline: Discipline,
        timing: Timing,
        body: Runnable,
    ) -> Result<ScheduledTask> {
        if !self.extension.is_enabled() {
            return Err(self.reject(SchedulerError::rejected(
                self.extension.id(),
                "extension is not enabled",
            )));
        }

        let task = self
            .host
            .schedule(&self.extension, discipline, timing, body)
            .map_err(|e| self.reject(e))?;

        let handle = ScheduledTask::new(
            task,
            BackendKind::Legacy,
            discipline,
            AffinityKind::Global,
            timing,
        );
        trace!(
            "Task {} submitted for {} ({:?}, {:?})",
            handle.id(),
            self.extension.id(),
            discipline,
            timing
        );
        self.hooks.submitted(&handle);
        Ok(handle)
    }

    fn cancel_tasks(&self) {
        if !self.extension.is_enabled() {
            trace!(
                "Extension {} is not enabled, skipping bulk cancel",
                self.extension.id()
            );
            return;
        }
        self.host.cancel_tasks(&self.extension);
        debug!("Cancelled all tasks of {}", self.extension.id());
        self.hooks.cancelled_all(&self.extension);
    }
}
