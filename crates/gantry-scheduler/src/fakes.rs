//! Hand-written collaborators for unit tests.

use async_trait::async_trait;
use chrono::Utc;
use gantry_core::{
    Build, BuildStatus, Component, ComponentRegistry, Error, Job, Lock, LockFactory, LockId,
    Migrator, Result, Runner, Task, WorkerInventory, WorkerRecord, WorkerState,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch};

/// Ordered record of collaborator calls, shared between fakes.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<&'static str>>>);

impl Events {
    pub fn push(&self, event: &'static str) {
        self.0.lock().expect("events poisoned").push(event);
    }

    pub fn snapshot(&self) -> Vec<&'static str> {
        self.0.lock().expect("events poisoned").clone()
    }
}

// --- locks ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    Busy,
    Fail,
}

pub struct FakeLock {
    id: LockId,
    releases: Arc<AtomicUsize>,
    fail_release: bool,
    events: Events,
}

#[async_trait]
impl Lock for FakeLock {
    fn id(&self) -> &LockId {
        &self.id
    }

    async fn release(self: Box<Self>) -> Result<()> {
        self.events.push("release");
        self.releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(Error::Lock("connection reset".to_string()));
        }
        Ok(())
    }
}

/// Hands out locks according to a script, then a fallback outcome.
pub struct FakeLockFactory {
    script: Mutex<VecDeque<Acquire>>,
    fallback: Acquire,
    requested: Mutex<Vec<LockId>>,
    releases: Arc<AtomicUsize>,
    pub fail_release: bool,
    events: Events,
}

impl FakeLockFactory {
    pub fn new(fallback: Acquire, events: Events) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requested: Mutex::new(Vec::new()),
            releases: Arc::new(AtomicUsize::new(0)),
            fail_release: false,
            events,
        }
    }

    pub fn scripted(script: &[Acquire], fallback: Acquire, events: Events) -> Self {
        let factory = Self::new(fallback, events);
        factory
            .script
            .lock()
            .expect("script poisoned")
            .extend(script.iter().copied());
        factory
    }

    pub fn acquire_calls(&self) -> usize {
        self.requested.lock().expect("requested poisoned").len()
    }

    pub fn requested(&self) -> Vec<LockId> {
        self.requested.lock().expect("requested poisoned").clone()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn attempt(&self, id: LockId) -> Result<Option<Box<dyn Lock>>> {
        self.requested
            .lock()
            .expect("requested poisoned")
            .push(id.clone());
        let outcome = self
            .script
            .lock()
            .expect("script poisoned")
            .pop_front()
            .unwrap_or(self.fallback);

        match outcome {
            Acquire::Granted => Ok(Some(Box::new(FakeLock {
                id,
                releases: self.releases.clone(),
                fail_release: self.fail_release,
                events: self.events.clone(),
            }))),
            Acquire::Busy => Ok(None),
            Acquire::Fail => Err(Error::Lock("connection refused".to_string())),
        }
    }
}

#[async_trait]
impl LockFactory for FakeLockFactory {
    async fn acquire(&self, id: LockId) -> Result<Option<Box<dyn Lock>>> {
        self.attempt(id)
    }
}

// --- components ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Find {
    Found { paused: bool, elapsed: bool },
    Missing,
    Fail,
}

struct FakeComponent {
    name: String,
    paused: bool,
    elapsed: bool,
    updates: Arc<AtomicUsize>,
    fail_update: bool,
    events: Events,
}

#[async_trait]
impl Component for FakeComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn paused(&self) -> bool {
        self.paused
    }

    fn interval_elapsed(&self) -> bool {
        self.elapsed
    }

    async fn update_last_ran(&self) -> Result<()> {
        self.events.push("update_last_ran");
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.fail_update {
            return Err(Error::Storage("disk full".to_string()));
        }
        Ok(())
    }
}

pub struct FakeComponentRegistry {
    outcome: Find,
    finds: AtomicUsize,
    updates: Arc<AtomicUsize>,
    pub fail_update: bool,
    events: Events,
}

impl FakeComponentRegistry {
    pub fn new(outcome: Find, events: Events) -> Self {
        Self {
            outcome,
            finds: AtomicUsize::new(0),
            updates: Arc::new(AtomicUsize::new(0)),
            fail_update: false,
            events,
        }
    }

    pub fn due(events: Events) -> Self {
        Self::new(
            Find::Found {
                paused: false,
                elapsed: true,
            },
            events,
        )
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComponentRegistry for FakeComponentRegistry {
    async fn find(&self, name: &str) -> Result<Option<Box<dyn Component>>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Find::Found { paused, elapsed } => Ok(Some(Box::new(FakeComponent {
                name: name.to_string(),
                paused,
                elapsed,
                updates: self.updates.clone(),
                fail_update: self.fail_update,
                events: self.events.clone(),
            }))),
            Find::Missing => Ok(None),
            Find::Fail => Err(Error::Storage("connection refused".to_string())),
        }
    }
}

// --- tasks ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail,
    Panic,
}

pub struct FakeTask {
    outcome: Outcome,
    runs: AtomicUsize,
    events: Events,
}

impl FakeTask {
    pub fn new(outcome: Outcome, events: Events) -> Self {
        Self {
            outcome,
            runs: AtomicUsize::new(0),
            events,
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for FakeTask {
    async fn run(&self) -> Result<()> {
        self.events.push("run");
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => Err(Error::Task("nope".to_string())),
            Outcome::Panic => panic!("task blew up"),
        }
    }
}

// --- migrations ---

pub struct FakeMigrator {
    pub locks: FakeLockFactory,
    pub fail_migrate: bool,
    migrations: AtomicUsize,
    events: Events,
}

impl FakeMigrator {
    pub fn new(locks: FakeLockFactory, events: Events) -> Self {
        Self {
            locks,
            fail_migrate: false,
            migrations: AtomicUsize::new(0),
            events,
        }
    }

    pub fn migrations(&self) -> usize {
        self.migrations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Migrator for FakeMigrator {
    async fn acquire_migration_lock(&self) -> Result<Option<Box<dyn Lock>>> {
        self.locks.attempt(LockId::database_migration())
    }

    async fn migrate(&self) -> Result<()> {
        self.events.push("migrate");
        self.migrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_migrate {
            return Err(Error::Migration("syntax error at or near".to_string()));
        }
        Ok(())
    }
}

/// Announces readiness, then serves until the shutdown signal flips.
pub struct FakeRunner {
    pub calls: Arc<AtomicUsize>,
    pub events: Events,
}

#[async_trait]
impl Runner for FakeRunner {
    async fn run(self, mut signals: watch::Receiver<bool>, ready: oneshot::Sender<()>) -> Result<()> {
        self.events.push("next_runner");
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = ready.send(());
        while !*signals.borrow() {
            if signals.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

// --- workers ---

pub struct FakeInventory {
    workers: Vec<WorkerRecord>,
    pub fail: bool,
}

impl FakeInventory {
    /// One worker per entry, with that many active containers.
    pub fn with_containers(active: &[u32]) -> Self {
        let workers = active
            .iter()
            .enumerate()
            .map(|(i, active)| WorkerRecord {
                name: format!("worker-{i}"),
                state: WorkerState::Running,
                active_containers: *active,
                expires_at: None,
            })
            .collect();
        Self {
            workers,
            fail: false,
        }
    }
}

#[async_trait]
impl WorkerInventory for FakeInventory {
    async fn workers(&self) -> Result<Vec<WorkerRecord>> {
        if self.fail {
            return Err(Error::Storage("workers table unavailable".to_string()));
        }
        Ok(self.workers.clone())
    }
}

// --- jobs ---

pub fn pending_build(id: i64, job_name: &str) -> Build {
    Build {
        id,
        job_name: job_name.to_string(),
        status: BuildStatus::Pending,
        scheduled: false,
        created_at: Utc::now(),
    }
}

/// In-memory job whose builds behave like the database queries:
/// scheduled pending builds count as running and still occupy the head of
/// the pending queue.
pub struct FakeJob {
    name: String,
    max_in_flight: u32,
    serial_groups: Vec<String>,
    started: usize,
    /// (build id, scheduled)
    pending: Mutex<Vec<(i64, bool)>>,
    /// Pretend the next pending build disappeared.
    pub vanished: bool,
    pub fail_queries: bool,
    pub fail_status_write: bool,
    pub lose_schedule_race: bool,
    pub scopes: Mutex<Vec<Vec<String>>>,
    pub running_calls: AtomicUsize,
    pub next_pending_calls: AtomicUsize,
    pub reached_writes: Mutex<Vec<bool>>,
    pub scheduled: Mutex<Vec<i64>>,
}

impl FakeJob {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            max_in_flight: 0,
            serial_groups: Vec::new(),
            started: 0,
            pending: Mutex::new(Vec::new()),
            vanished: false,
            fail_queries: false,
            fail_status_write: false,
            lose_schedule_race: false,
            scopes: Mutex::new(Vec::new()),
            running_calls: AtomicUsize::new(0),
            next_pending_calls: AtomicUsize::new(0),
            reached_writes: Mutex::new(Vec::new()),
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub fn max_in_flight(mut self, max: u32) -> Self {
        self.max_in_flight = max;
        self
    }

    pub fn serial_groups(mut self, groups: &[&str]) -> Self {
        self.serial_groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn started(mut self, started: usize) -> Self {
        self.started = started;
        self
    }

    pub fn pending(self, ids: &[i64]) -> Self {
        *self.pending.lock().expect("pending poisoned") =
            ids.iter().map(|id| (*id, false)).collect();
        self
    }

    pub fn reached_writes(&self) -> Vec<bool> {
        self.reached_writes.lock().expect("writes poisoned").clone()
    }

    pub fn scheduled_builds(&self) -> Vec<i64> {
        self.scheduled.lock().expect("scheduled poisoned").clone()
    }

    pub fn scopes(&self) -> Vec<Vec<String>> {
        self.scopes.lock().expect("scopes poisoned").clone()
    }

    fn query(&self, scope: &[String]) -> Result<()> {
        self.scopes
            .lock()
            .expect("scopes poisoned")
            .push(scope.to_vec());
        if self.fail_queries {
            return Err(Error::Storage("builds table unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Job for FakeJob {
    fn pipeline(&self) -> &str {
        "main"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    fn serial_groups(&self) -> &[String] {
        &self.serial_groups
    }

    async fn running_builds_by_serial_group(&self, serial_groups: &[String]) -> Result<Vec<Build>> {
        self.running_calls.fetch_add(1, Ordering::SeqCst);
        self.query(serial_groups)?;

        let pending = self.pending.lock().expect("pending poisoned");
        let scheduled = pending.iter().filter(|(_, scheduled)| *scheduled).count();
        Ok((0..(self.started + scheduled) as i64)
            .map(|i| Build {
                status: BuildStatus::Started,
                ..pending_build(i + 1, &self.name)
            })
            .collect())
    }

    async fn next_pending_build_by_serial_group(
        &self,
        serial_groups: &[String],
    ) -> Result<Option<Build>> {
        self.next_pending_calls.fetch_add(1, Ordering::SeqCst);
        self.query(serial_groups)?;

        if self.vanished {
            return Ok(None);
        }
        let pending = self.pending.lock().expect("pending poisoned");
        Ok(pending
            .iter()
            .map(|(id, _)| *id)
            .min()
            .map(|id| pending_build(id, &self.name)))
    }

    async fn set_max_in_flight_reached(&self, reached: bool) -> Result<()> {
        self.reached_writes
            .lock()
            .expect("writes poisoned")
            .push(reached);
        if self.fail_status_write {
            return Err(Error::Storage("jobs table is read-only".to_string()));
        }
        Ok(())
    }

    async fn pending_builds(&self) -> Result<Vec<Build>> {
        if self.fail_queries {
            return Err(Error::Storage("builds table unavailable".to_string()));
        }
        let mut pending: Vec<i64> = self
            .pending
            .lock()
            .expect("pending poisoned")
            .iter()
            .filter(|(_, scheduled)| !scheduled)
            .map(|(id, _)| *id)
            .collect();
        pending.sort_unstable();
        Ok(pending
            .into_iter()
            .map(|id| pending_build(id, &self.name))
            .collect())
    }

    async fn schedule_build(&self, build_id: i64) -> Result<bool> {
        if self.lose_schedule_race {
            return Ok(false);
        }
        let mut pending = self.pending.lock().expect("pending poisoned");
        match pending.iter_mut().find(|(id, scheduled)| *id == build_id && !scheduled) {
            Some(entry) => {
                entry.1 = true;
                self.scheduled
                    .lock()
                    .expect("scheduled poisoned")
                    .push(build_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
