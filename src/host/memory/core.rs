use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    cell::RefCell,
    collections::BTreeMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{error, trace};

use crate::{
    common::{Discipline, EntityId, Location, RegionCoord, Result, SchedulerError},
    host::{HostTask, Runnable, memory::task::{MemoryTask, Surface}},
};

// ==========================================
// 1. 线程身份 (Loop Identity)
// ==========================================

/// Tick 线程的种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoopKind {
    /// 经典宿主的唯一主线程
    Main,
    /// 区域宿主的全局线程
    Global,
    /// 区域宿主中持有某个区域的线程
    Region(RegionCoord),
}

/// 线程身份: 哪个宿主实例的哪种 Tick 线程
///
/// 同一进程里可能同时存在多个内存宿主 (并行测试)，所以要带上宿主 ID。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoopIdentity {
    pub(crate) host: Arc<str>,
    pub(crate) kind: LoopKind,
}

thread_local! {
    static CURRENT_LOOP: RefCell<Option<LoopIdentity>> = const { RefCell::new(None) };
}

/// 当前线程的 Tick 身份，非 Tick 线程返回 `None`
pub(crate) fn current_loop() -> Option<LoopIdentity> {
    CURRENT_LOOP.with(|current| current.borrow().clone())
}

// ==========================================
// 2. 实体登记表 (EntityRegistry)
// ==========================================

/// 存活实体及其位置。被移除 (retired) 的实体不在表中。
#[derive(Debug, Default)]
pub(crate) struct EntityRegistry {
    entities: DashMap<EntityId, Location>,
}

impl EntityRegistry {
    pub(crate) fn insert(&self, id: EntityId, location: Location) {
        self.entities.insert(id, location);
    }

    /// 更新位置，实体不存在时返回 false
    pub(crate) fn relocate(&self, id: EntityId, location: Location) -> bool {
        match self.entities.get_mut(&id) {
            Some(mut entry) => {
                *entry = location;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }

    pub(crate) fn location(&self, id: EntityId) -> Option<Location> {
        self.entities.get(&id).map(|entry| entry.value().clone())
    }
}

/// 实体任务到期时的去向
pub(crate) enum EntityRoute {
    /// 实体仍在当前循环持有的区域里
    Local,
    /// 实体已被移除
    Retired,
    /// 实体已经移到另一个区域，任务交给该区域的循环
    Moved(Arc<TickLoop>),
}

/// 实体任务的路由
///
/// 实体可能在任务提交之后移动，所以每次到期都要重新确认归属。
pub(crate) trait EntityRouter: Send + Sync {
    /// `here` 是当前循环的种类，`now` 是当前循环的 Tick (新建区域循环的起点)
    fn route(&self, entity: EntityId, here: &LoopKind, now: u64) -> Result<EntityRoute>;
}

// ==========================================
// 3. Tick 循环 (TickLoop)
// ==========================================

enum LoopCommand {
    Advance {
        ticks: u64,
        done: oneshot::Sender<Vec<JoinHandle<()>>>,
    },
}

struct LoopShared {
    identity: LoopIdentity,
    current_tick: AtomicU64,
    /// 【等待索引】(到期 Tick, 任务 ID) -> 任务
    queue: Mutex<BTreeMap<(u64, u64), Arc<MemoryTask>>>,
    /// 异步工作体投递到 Tokio 的阻塞线程池
    runtime: Handle,
    /// 只有区域循环需要。弱引用: 路由表本身持有全部区域循环
    router: Option<Weak<dyn EntityRouter>>,
}

/// 一个专属的 Tick 线程
///
/// 线程不会自己推进时间，只在收到 `advance` 命令时执行指定数量的 Tick，
/// 方便测试精确控制节奏。发送端被丢弃后线程自然退出。
pub(crate) struct TickLoop {
    shared: Arc<LoopShared>,
    commands: Mutex<Option<mpsc::UnboundedSender<LoopCommand>>>,
}

impl TickLoop {
    pub(crate) fn spawn(
        identity: LoopIdentity,
        start_tick: u64,
        runtime: Handle,
        router: Option<Weak<dyn EntityRouter>>,
    ) -> Result<Self> {
        let thread_name = match &identity.kind {
            LoopKind::Main => format!("tick-main-{}", identity.host),
            LoopKind::Global => format!("tick-global-{}", identity.host),
            LoopKind::Region(coord) => format!("tick-region-{}-{}", identity.host, coord),
        };
        let shared = Arc::new(LoopShared {
            identity,
            current_tick: AtomicU64::new(start_tick),
            queue: Mutex::new(BTreeMap::new()),
            runtime,
            router,
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let loop_shared = shared.clone();
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_loop(loop_shared, rx))?;

        Ok(Self {
            shared,
            commands: Mutex::new(Some(tx)),
        })
    }

    pub(crate) fn current_tick(&self) -> u64 {
        self.shared.current_tick.load(Ordering::Acquire)
    }

    /// 入队
    ///
    /// 延迟 0 与 1 等价: 最早在下一个 Tick 执行，提交本身从不执行工作体。
    pub(crate) fn enqueue(&self, task: Arc<MemoryTask>, delay: u64) {
        let due = self.current_tick() + delay.max(1);
        self.shared.queue.lock().insert((due, task.task_id()), task);
    }

    /// 请求推进 N 个 Tick
    ///
    /// 返回的接收端在这些 Tick 跑完后收到本轮投递出去的异步执行句柄。
    pub(crate) fn advance(&self, ticks: u64) -> Result<oneshot::Receiver<Vec<JoinHandle<()>>>> {
        let (done, rx) = oneshot::channel();
        let guard = self.commands.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| SchedulerError::Unsupported("tick loop has been shut down".into()))?;
        sender
            .send(LoopCommand::Advance { ticks, done })
            .map_err(|_| SchedulerError::Unsupported("tick loop thread has exited".into()))?;
        Ok(rx)
    }

    /// 停止线程 (已入队的命令仍会执行完)
    pub(crate) fn shutdown(&self) {
        self.commands.lock().take();
    }
}

fn run_loop(shared: Arc<LoopShared>, mut commands: mpsc::UnboundedReceiver<LoopCommand>) {
    CURRENT_LOOP.with(|current| *current.borrow_mut() = Some(shared.identity.clone()));
    trace!("[Host-{}] {:?} loop started.", shared.identity.host, shared.identity.kind);

    while let Some(command) = commands.blocking_recv() {
        match command {
            LoopCommand::Advance { ticks, done } => {
                let mut spawned = Vec::new();
                for _ in 0..ticks {
                    shared.tick(&mut spawned);
                }
                // 调用方可能已经不再等待
                let _ = done.send(spawned);
            }
        }
    }

    trace!("[Host-{}] {:?} loop stopped.", shared.identity.host, shared.identity.kind);
}

impl LoopShared {
    fn tick(&self, spawned: &mut Vec<JoinHandle<()>>) {
        let now = self.current_tick.fetch_add(1, Ordering::AcqRel) + 1;

        // 取出所有到期任务后立即释放锁: 工作体里可能继续提交任务
        let due: Vec<Arc<MemoryTask>> = {
            let mut queue = self.queue.lock();
            let later = queue.split_off(&(now + 1, 0));
            std::mem::replace(&mut *queue, later).into_values().collect()
        };

        for task in due {
            self.dispatch(task, now, spawned);
        }
    }

    fn dispatch(&self, task: Arc<MemoryTask>, now: u64, spawned: &mut Vec<JoinHandle<()>>) {
        if !task.owner().is_enabled() {
            task.retire();
            return;
        }

        if let Surface::Entity(entity) = task.surface() {
            match self.route_entity(entity, now) {
                EntityRoute::Local => {}
                EntityRoute::Retired => {
                    task.retire();
                    return;
                }
                EntityRoute::Moved(region) => {
                    trace!(
                        "[Host-{}] Task {} follows entity {} out of {:?}.",
                        self.identity.host,
                        task.task_id(),
                        entity,
                        self.identity.kind
                    );
                    region.enqueue(task, 0);
                    return;
                }
            }
        }

        match task.discipline() {
            Discipline::Sync => {
                let Some(body) = task.begin() else {
                    return;
                };
                run_guarded(&task, &body);
                if task.end() {
                    self.requeue(task, now);
                }
            }
            Discipline::Async => {
                match task.begin() {
                    Some(body) => {
                        let running = task.clone();
                        spawned.push(self.runtime.spawn_blocking(move || {
                            run_guarded(&running, &body);
                            running.end();
                        }));
                    }
                    // 上一次异步执行还没结束，跳过本轮
                    None if !task.is_done() => {}
                    None => return,
                }
                if task.period().is_some() {
                    self.requeue(task, now);
                }
            }
        }
    }

    fn requeue(&self, task: Arc<MemoryTask>, now: u64) {
        if let Some(period) = task.period() {
            let due = now + period.max(1);
            self.queue.lock().insert((due, task.task_id()), task);
        }
    }

    fn route_entity(&self, entity: EntityId, now: u64) -> EntityRoute {
        let Some(router) = self.router.as_ref().and_then(Weak::upgrade) else {
            return EntityRoute::Local;
        };
        match router.route(entity, &self.identity.kind, now) {
            Ok(route) => route,
            Err(e) => {
                error!(
                    "[Host-{}] Entity {} could not be routed, dropping its task: {}",
                    self.identity.host, entity, e
                );
                EntityRoute::Retired
            }
        }
    }
}

fn run_guarded(task: &MemoryTask, body: &Runnable) {
    if catch_unwind(AssertUnwindSafe(|| body())).is_err() {
        error!(
            "[Host] Task {} of {} panicked.",
            task.task_id(),
            task.owner().id()
        );
    }
}

/// 等待一次推进结束，并等完本轮投递的全部异步执行
pub(crate) async fn await_advance(
    receivers: Vec<oneshot::Receiver<Vec<JoinHandle<()>>>>,
) -> Result<()> {
    let batches = futures::future::join_all(receivers).await;
    for batch in batches {
        let handles = batch
            .map_err(|_| SchedulerError::Unsupported("tick loop thread has exited".into()))?;
        for handle in handles {
            if let Err(e) = handle.await {
                error!("[Host] Async task join failed: {}", e);
            }
        }
    }
    Ok(())
}

/// 宿主级任务编号分配与登记
#[derive(Default)]
pub(crate) struct TaskBook {
    next_id: AtomicU64,
    tasks: DashMap<u64, Arc<MemoryTask>>,
}

impl TaskBook {
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn register(&self, task: Arc<MemoryTask>) {
        self.tasks.insert(task.task_id(), task);
    }

    /// 取消满足条件的任务
    pub(crate) fn cancel_where(&self, predicate: impl Fn(&MemoryTask) -> bool) -> usize {
        let mut cancelled = 0;
        for entry in self.tasks.iter() {
            if predicate(entry.value()) && !entry.value().is_done() {
                entry.value().cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// 清理已结束的任务
    pub(crate) fn prune(&self) {
        self.tasks.retain(|_, task| !task.is_done());
    }

    pub(crate) fn live(&self) -> usize {
        self.tasks.iter().filter(|entry| !entry.value().is_done()).count()
    }
}
