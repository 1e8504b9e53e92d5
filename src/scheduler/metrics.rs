use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::scheduler::BackendKind;

/// 调度层核心指标
// 使用 Atomic，Tick 线程上计数不需要加锁
#[derive(Debug, Default, Serialize)]
pub struct SchedulerMetrics {
    // --- 后端分布 ---
    /// 选中全局 Tick 后端的扩展数
    pub backends_legacy: AtomicU64,

    /// 选中区域后端的扩展数
    pub backends_regional: AtomicU64,

    // --- 累积计数 (Counters) ---
    /// 历史总提交数
    pub submitted: AtomicU64,

    /// 历史总拒绝数
    pub rejected: AtomicU64,

    /// 批量取消次数
    pub bulk_cancels: AtomicU64,
}

impl SchedulerMetrics {
    pub fn inc_backend(&self, backend: BackendKind) {
        match backend {
            BackendKind::Legacy => self.backends_legacy.fetch_add(1, Ordering::Relaxed),
            BackendKind::Regional => self.backends_regional.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_bulk_cancels(&self) {
        self.bulk_cancels.fetch_add(1, Ordering::Relaxed);
    }
}
