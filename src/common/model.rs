use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use uuid::Uuid;

use crate::{common::new_extension_id, host::HostRuntime};

// ==========================================
// 1. 扩展句柄 (Extension)
// ==========================================

/// 扩展的唯一标识
///
/// 每次构造 `Extension` 都会生成新的 ID，同名扩展重新加载后也不会复用旧 ID。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionId(Arc<str>);

impl ExtensionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

struct ExtensionInner {
    id: ExtensionId,
    name: String,
    host: Arc<dyn HostRuntime>,
    enabled: AtomicBool,
}

/// 扩展句柄
///
/// 加载到宿主中的插件/模块。对核心而言是不透明的：
/// 只用来做缓存 Key、判断是否仍处于加载状态、以及找到它所在的宿主。
///
/// Clone 是廉价的 (内部是 Arc)。
#[derive(Clone)]
pub struct Extension {
    inner: Arc<ExtensionInner>,
}

impl Extension {
    pub fn new(name: impl Into<String>, host: Arc<dyn HostRuntime>) -> Self {
        let name = name.into();
        let id = ExtensionId(Arc::from(format!("{}-{}", name, new_extension_id())));
        Self {
            inner: Arc::new(ExtensionInner {
                id,
                name,
                host,
                enabled: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> &ExtensionId {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 扩展所在的宿主
    pub fn host(&self) -> &Arc<dyn HostRuntime> {
        &self.inner.host
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// 标记扩展已卸载
    ///
    /// 之后所有提交都会被拒绝。只翻转标记，不取消已有任务，也不清理选择器缓存；
    /// 完整的卸载流程走 `SchedulerSelector::unload`。
    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::Release);
    }

    /// 是否是同一个扩展实例
    pub fn same_as(&self, other: &Extension) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("id", &self.inner.id)
            .field("host", &self.inner.host.name())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

// ==========================================
// 2. 空间坐标 (Location / RegionCoord)
// ==========================================

/// 世界坐标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// 所在区块坐标 (16x16 方块)
    pub fn chunk(&self) -> (i32, i32) {
        ((self.x.floor() as i32) >> 4, (self.z.floor() as i32) >> 4)
    }

    /// 所在区域坐标
    ///
    /// `shift` 是区域边长 (以区块计) 的以 2 为底的对数，由宿主决定。
    pub fn region(&self, shift: u8) -> RegionCoord {
        let (cx, cz) = self.chunk();
        RegionCoord {
            world: self.world.clone(),
            x: cx >> shift,
            z: cz >> shift,
        }
    }
}

/// 区域坐标
///
/// 区域调度宿主中，一个区域同一时刻只由一个线程持有。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCoord {
    pub world: String,
    pub x: i32,
    pub z: i32,
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{},{}]", self.world, self.x, self.z)
    }
}

/// 实体标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ==========================================
// 3. 调度参数 (Affinity / Discipline / Timing)
// ==========================================

/// 亲和性 Key
///
/// 只对同步 (On-tick) 任务有意义。不支持区域分片的后端忽略它，
/// 在唯一的 Tick 线程上执行。
#[derive(Debug, Clone, PartialEq)]
pub enum Affinity {
    /// 不限定，运行在全局 Tick 线程
    Global,
    /// 运行在持有该坐标所在区域的线程
    Region(Location),
    /// 运行在持有该实体的线程
    Entity(EntityId),
}

impl Affinity {
    pub fn kind(&self) -> AffinityKind {
        match self {
            Affinity::Global => AffinityKind::Global,
            Affinity::Region(_) => AffinityKind::Region,
            Affinity::Entity(_) => AffinityKind::Entity,
        }
    }
}

/// 亲和性类别 (不带具体 Key，用于句柄上的状态查询)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AffinityKind {
    Global,
    Region,
    Entity,
}

/// 线程纪律
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Discipline {
    /// 同步: 在 Tick 线程执行，可以安全访问宿主 API
    Sync,
    /// 异步: 在 Tick 之外执行，**不得**访问宿主 API
    Async,
}

/// 调度时序 (单位: Tick)
///
/// 调用方传入的原始参数应先经过 `TickUtils` 校验再构造。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timing {
    /// 下一个 Tick 执行
    Immediate,
    /// N 个 Tick 之后执行 (0 等同于下一个 Tick)
    Delayed(u64),
    /// 首次延迟 `delay` 个 Tick，此后每 `period` 个 Tick 执行一次，直到被取消
    Periodic { delay: u64, period: u64 },
}

impl Timing {
    pub fn is_repeating(&self) -> bool {
        matches!(self, Timing::Periodic { .. })
    }

    /// 首次执行前等待的 Tick 数
    pub fn initial_delay(&self) -> u64 {
        match self {
            Timing::Immediate => 0,
            Timing::Delayed(delay) => *delay,
            Timing::Periodic { delay, .. } => *delay,
        }
    }

    pub fn period(&self) -> Option<u64> {
        match self {
            Timing::Periodic { period, .. } => Some(*period),
            _ => None,
        }
    }
}
