use crate::application::ports::{BackgroundLease, Clock};
use crate::domain::entities::ScheduledTask;
use crate::domain::value_objects::{TaskId, TaskStatus};
use crate::shared::error::AppError;
use crate::shared::metrics::OutcomeCounter;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// 定期実行される処理本体
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self) -> Result<(), AppError>;
}

/// クロージャをそのままハンドラとして登録するためのラッパー
pub struct FnTaskHandler<F> {
    f: F,
}

impl<F> FnTaskHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnTaskHandler<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), AppError>> + Send,
{
    async fn run(&self) -> Result<(), AppError> {
        (self.f)().await
    }
}

pub struct TaskRegistration {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub interval: Duration,
    pub enabled: bool,
    pub handler: Arc<dyn TaskHandler>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "error")]
pub enum RunOutcome {
    Completed,
    Failed(String),
    AlreadyRunning,
}

struct TaskSlot {
    name: String,
    description: String,
    interval: Duration,
    enabled: bool,
    status: TaskStatus,
    last_run_at: Option<i64>,
    last_error: Option<String>,
    /// 有効化・無効化のたびに進め、古いタイマーを無効にする
    generation: u64,
    handler: Arc<dyn TaskHandler>,
    runs: Arc<OutcomeCounter>,
}

impl TaskSlot {
    fn snapshot(&self, id: &TaskId) -> ScheduledTask {
        ScheduledTask {
            id: id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            interval_ms: self.interval.as_millis().min(u128::from(u64::MAX)) as u64,
            enabled: self.enabled,
            status: self.status,
            last_run_at: self.last_run_at,
            last_error: self.last_error.clone(),
            runs: self.runs.snapshot(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct DueEntry {
    at: Instant,
    seq: u64,
    id: TaskId,
    generation: u64,
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskId, TaskSlot>,
    queue: BinaryHeap<Reverse<DueEntry>>,
    seq: u64,
    started: bool,
}

impl SchedulerState {
    fn push(&mut self, id: &TaskId, at: Instant, generation: u64) {
        self.seq += 1;
        self.queue.push(Reverse(DueEntry {
            at,
            seq: self.seq,
            id: id.clone(),
            generation,
        }));
    }

    /// 未実行なら即時、実行済みなら 1 周期後に予定する
    fn schedule_initial(&mut self, id: &TaskId, now: Instant) {
        let Some(slot) = self.tasks.get_mut(id) else {
            return;
        };
        slot.generation += 1;
        let generation = slot.generation;
        let at = if slot.last_run_at.is_none() {
            now
        } else {
            now + slot.interval
        };
        self.push(id, at, generation);
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    wakeup: Notify,
    clock: Arc<dyn Clock>,
    task_timeout: Option<Duration>,
}

/// 優先度付きキュー 1 本とループ 1 本で全タスクのタイマーを扱うスケジューラ。
///
/// - 同じタスクは同時に 1 つしか走らない。実行中に周期が来ても何もしない
/// - 失敗してもタイマーは止めない
/// - `stop()` はタイマーだけを止め、実行中の処理は最後まで走らせる
pub struct BackgroundScheduler {
    shared: Arc<Shared>,
    lease: Arc<dyn BackgroundLease>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundScheduler {
    pub fn new(
        lease: Arc<dyn BackgroundLease>,
        clock: Arc<dyn Clock>,
        task_timeout: Option<Duration>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::default()),
                wakeup: Notify::new(),
                clock,
                task_timeout,
            }),
            lease,
            loop_handle: Mutex::new(None),
        }
    }

    pub async fn register(&self, registration: TaskRegistration) -> Result<(), AppError> {
        if registration.interval.is_zero() {
            return Err(AppError::InvalidInput(format!(
                "Task {} must have a non-zero interval",
                registration.id
            )));
        }

        let mut state = self.shared.state.lock().await;
        if state.tasks.contains_key(&registration.id) {
            return Err(AppError::InvalidInput(format!(
                "Task {} is already registered",
                registration.id
            )));
        }

        let id = registration.id.clone();
        state.tasks.insert(
            id.clone(),
            TaskSlot {
                name: registration.name,
                description: registration.description,
                interval: registration.interval,
                enabled: registration.enabled,
                status: TaskStatus::Idle,
                last_run_at: None,
                last_error: None,
                generation: 0,
                handler: registration.handler,
                runs: Arc::new(OutcomeCounter::new()),
            },
        );
        if state.started && registration.enabled {
            state.schedule_initial(&id, Instant::now());
            self.shared.wakeup.notify_one();
        }

        tracing::debug!(target: "offline::scheduler", task = %id, "Task registered");
        Ok(())
    }

    pub async fn enable(&self, id: &TaskId, enabled: bool) -> Result<(), AppError> {
        let mut state = self.shared.state.lock().await;
        let started = state.started;
        let slot = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Task {id}")))?;

        if slot.enabled == enabled {
            return Ok(());
        }
        slot.enabled = enabled;

        if enabled {
            if started {
                state.schedule_initial(id, Instant::now());
                self.shared.wakeup.notify_one();
            }
        } else {
            // キュー上の古いエントリは世代違いで読み捨てられる
            slot.generation += 1;
        }

        tracing::info!(target: "offline::scheduler", task = %id, enabled, "Task toggled");
        Ok(())
    }

    /// 実行権を取得し、有効なタスクのタイマーを張る
    pub async fn start(&self) -> Result<(), AppError> {
        let mut handle = self.loop_handle.lock().await;
        {
            let mut state = self.shared.state.lock().await;
            if state.started {
                return Ok(());
            }
            self.lease.acquire().await?;
            state.started = true;

            let now = Instant::now();
            let enabled: Vec<TaskId> = state
                .tasks
                .iter()
                .filter(|(_, slot)| slot.enabled)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &enabled {
                state.schedule_initial(id, now);
            }
            tracing::info!(target: "offline::scheduler", tasks = enabled.len(), "Scheduler started");
        }

        if handle.is_none() {
            let shared = Arc::clone(&self.shared);
            *handle = Some(tokio::spawn(run_loop(shared)));
        }
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// すべてのタイマーを止めて実行権を返す。登録と履歴は残る
    pub async fn stop(&self) -> Result<(), AppError> {
        let mut handle = self.loop_handle.lock().await;
        {
            let mut state = self.shared.state.lock().await;
            if !state.started {
                return Ok(());
            }
            state.started = false;
            state.queue.clear();
        }
        if let Some(handle) = handle.take() {
            handle.abort();
        }
        self.lease.release().await?;
        tracing::info!(target: "offline::scheduler", "Scheduler stopped");
        Ok(())
    }

    pub async fn is_started(&self) -> bool {
        self.shared.state.lock().await.started
    }

    pub fn lease_held(&self) -> bool {
        self.lease.is_held()
    }

    /// 手動実行。実行中なら `AlreadyRunning` を返し、二重には走らせない
    pub async fn run_now(&self, id: &TaskId) -> Result<RunOutcome, AppError> {
        let claimed = {
            let mut state = self.shared.state.lock().await;
            let slot = state
                .tasks
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Task {id}")))?;
            claim(slot)
        };

        match claimed {
            Some((handler, runs)) => Ok(execute(&self.shared, id, handler, runs).await),
            None => {
                tracing::debug!(target: "offline::scheduler", task = %id, "Manual run ignored, task already running");
                Ok(RunOutcome::AlreadyRunning)
            }
        }
    }

    pub async fn tasks(&self) -> Vec<ScheduledTask> {
        let state = self.shared.state.lock().await;
        let mut tasks: Vec<ScheduledTask> = state
            .tasks
            .iter()
            .map(|(id, slot)| slot.snapshot(id))
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub async fn task(&self, id: &TaskId) -> Option<ScheduledTask> {
        let state = self.shared.state.lock().await;
        state.tasks.get(id).map(|slot| slot.snapshot(id))
    }
}

/// 実行中でなければ `Running` にしてハンドラを返す
fn claim(slot: &mut TaskSlot) -> Option<(Arc<dyn TaskHandler>, Arc<OutcomeCounter>)> {
    if slot.status.is_running() {
        return None;
    }
    slot.status = TaskStatus::Running;
    Some((Arc::clone(&slot.handler), Arc::clone(&slot.runs)))
}

async fn run_loop(shared: Arc<Shared>) {
    loop {
        let next_due = {
            let state = shared.state.lock().await;
            state.queue.peek().map(|Reverse(entry)| entry.at)
        };

        match next_due {
            None => {
                shared.wakeup.notified().await;
                continue;
            }
            Some(at) if at > Instant::now() => {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = shared.wakeup.notified() => continue,
                }
            }
            Some(_) => {}
        }

        let fired = collect_due(&shared).await;
        for (id, handler, runs) in fired {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                execute(&shared, &id, handler, runs).await;
            });
        }
    }
}

type Claimed = (TaskId, Arc<dyn TaskHandler>, Arc<OutcomeCounter>);

/// 期限が来たエントリを取り出し、次回分を積み直す
async fn collect_due(shared: &Shared) -> Vec<Claimed> {
    let now = Instant::now();
    let mut state = shared.state.lock().await;
    let mut fired = Vec::new();

    while state
        .queue
        .peek()
        .is_some_and(|Reverse(entry)| entry.at <= now)
    {
        let Some(Reverse(entry)) = state.queue.pop() else {
            break;
        };
        if !state.started {
            continue;
        }
        let Some(slot) = state.tasks.get_mut(&entry.id) else {
            continue;
        };
        if !slot.enabled || slot.generation != entry.generation {
            continue;
        }

        let mut next = entry.at + slot.interval;
        if next <= now {
            next = now + slot.interval;
        }
        let generation = slot.generation;

        match claim(slot) {
            Some((handler, runs)) => fired.push((entry.id.clone(), handler, runs)),
            None => {
                tracing::debug!(
                    target: "offline::scheduler",
                    task = %entry.id,
                    "Tick skipped, previous run still in flight"
                );
            }
        }
        state.push(&entry.id, next, generation);
    }
    fired
}

async fn execute(
    shared: &Shared,
    id: &TaskId,
    handler: Arc<dyn TaskHandler>,
    runs: Arc<OutcomeCounter>,
) -> RunOutcome {
    let started = Instant::now();
    tracing::debug!(target: "offline::scheduler", task = %id, "Task started");

    let guarded = AssertUnwindSafe(handler.run()).catch_unwind();
    let result = match shared.task_timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(result) => result,
            Err(_) => Ok(Err(AppError::Scheduler(format!(
                "Task timed out after {} ms",
                limit.as_millis()
            )))),
        },
        None => guarded.await,
    };
    let result = result.unwrap_or_else(|_| Err(AppError::Scheduler("Task panicked".to_string())));

    let finished_at = shared.clock.now_ms();
    let duration_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

    let mut state = shared.state.lock().await;
    let Some(slot) = state.tasks.get_mut(id) else {
        return RunOutcome::Failed(format!("Task {id} disappeared"));
    };
    slot.last_run_at = Some(finished_at);

    match result {
        Ok(()) => {
            slot.status = TaskStatus::Idle;
            slot.last_error = None;
            runs.record_success(finished_at);
            tracing::info!(target: "offline::scheduler", task = %id, duration_ms, "Task completed");
            RunOutcome::Completed
        }
        Err(err) => {
            let message = err.to_string();
            slot.status = TaskStatus::Failed;
            slot.last_error = Some(message.clone());
            runs.record_failure(finished_at);
            tracing::error!(
                target: "offline::scheduler",
                task = %id,
                duration_ms,
                error = %message,
                "Task failed"
            );
            RunOutcome::Failed(message)
        }
    }
}
