//! Background cell builds.
//!
//! Workers run the scene-free prepare stage; the scene is single-owner, so
//! finished jobs are committed by [`BuildPool::poll`] on the thread that owns
//! it. A job is cancelled by flagging its [`PendingBuild`]; the flag is
//! checked by the worker before it starts and again at commit time, and only
//! the commit-time check is authoritative.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::thread::JoinHandle;

use cellworld_records::{CellRecord, WorldDatabase};
use cellworld_scene::Scene;
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::build::{CellFactory, PreparedCell, prepare_cell};
use crate::cache::{CellCache, CellKey, Claim, ResidentCell};

/// How a build ended.
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Ready(Arc<ResidentCell>),
    /// The cell has no record; nothing was built.
    Empty,
    Cancelled,
}

impl BuildOutcome {
    pub fn cell(&self) -> Option<&Arc<ResidentCell>> {
        match self {
            Self::Ready(cell) => Some(cell),
            Self::Empty | Self::Cancelled => None,
        }
    }
}

#[derive(Default)]
struct PendingState {
    outcome: Option<BuildOutcome>,
    wakers: Vec<Waker>,
}

/// Shared state of one in-flight build: cancel flag plus the eventual
/// outcome, observable as a future or by blocking.
pub struct PendingBuild {
    key: CellKey,
    cancel: AtomicBool,
    state: Mutex<PendingState>,
    resolved: Condvar,
}

impl std::fmt::Debug for PendingBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingBuild")
            .field("key", &self.key)
            .field("cancelled", &self.is_cancelled())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl PendingBuild {
    pub(crate) fn new(key: CellKey) -> Self {
        Self {
            key,
            cancel: AtomicBool::new(false),
            state: Mutex::new(PendingState::default()),
            resolved: Condvar::new(),
        }
    }

    pub fn key(&self) -> &CellKey {
        &self.key
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Clear the cancel flag. Returns whether it was set.
    pub(crate) fn revive(&self) -> bool {
        self.cancel.swap(false, Ordering::AcqRel)
    }

    pub fn is_resolved(&self) -> bool {
        self.lock().outcome.is_some()
    }

    pub fn outcome(&self) -> Option<BuildOutcome> {
        self.lock().outcome.clone()
    }

    /// First resolution wins.
    pub(crate) fn resolve(&self, outcome: BuildOutcome) {
        let wakers = {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return;
            }
            state.outcome = Some(outcome);
            std::mem::take(&mut state.wakers)
        };
        self.resolved.notify_all();
        for waker in wakers {
            waker.wake();
        }
    }

    /// Block the calling thread until the build resolves.
    ///
    /// Must not be called on the thread that commits the build.
    pub fn wait(&self) -> BuildOutcome {
        let mut state = self.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            state = self
                .resolved
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn poll_outcome(&self, cx: &mut Context<'_>) -> Poll<BuildOutcome> {
        let mut state = self.lock();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a requested cell. Resolves once the build commits, is found
/// empty, or is cancelled.
///
/// Concurrent requests for the same in-flight key share one build.
#[derive(Debug, Clone)]
pub struct BuildTicket {
    pending: Arc<PendingBuild>,
}

impl BuildTicket {
    fn new(pending: Arc<PendingBuild>) -> Self {
        Self { pending }
    }

    fn resolved(key: CellKey, outcome: BuildOutcome) -> Self {
        let pending = Arc::new(PendingBuild::new(key));
        pending.resolve(outcome);
        Self { pending }
    }

    pub fn key(&self) -> &CellKey {
        self.pending.key()
    }

    pub fn is_ready(&self) -> bool {
        self.pending.is_resolved()
    }

    pub fn try_outcome(&self) -> Option<BuildOutcome> {
        self.pending.outcome()
    }

    /// Whether both tickets wait on the same build.
    pub fn shares_build_with(&self, other: &BuildTicket) -> bool {
        Arc::ptr_eq(&self.pending, &other.pending)
    }
}

impl Future for BuildTicket {
    type Output = BuildOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.pending.poll_outcome(cx)
    }
}

struct BuildJob {
    pending: Arc<PendingBuild>,
    record: Arc<CellRecord>,
}

struct BuildDone {
    pending: Arc<PendingBuild>,
    record: Arc<CellRecord>,
    /// `None` when the worker skipped a cancelled job.
    prepared: Option<PreparedCell>,
}

fn spawn_workers(
    count: usize,
    db: Arc<dyn WorldDatabase>,
    rx_job: Receiver<BuildJob>,
    tx_done: Sender<BuildDone>,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let db = Arc::clone(&db);
        let rx_job = rx_job.clone();
        let tx_done = tx_done.clone();

        let handle = std::thread::Builder::new()
            .name(format!("cell-build-{i}"))
            .spawn(move || {
                while let Ok(job) = rx_job.recv() {
                    let prepared = if job.pending.is_cancelled() {
                        tracing::trace!(key = %job.pending.key(), "skipping cancelled build");
                        None
                    } else {
                        Some(prepare_cell(db.as_ref(), Arc::clone(&job.record)))
                    };
                    let done = BuildDone {
                        pending: job.pending,
                        record: job.record,
                        prepared,
                    };
                    if tx_done.send(done).is_err() {
                        break;
                    }
                }
            })?;
        handles.push(handle);
    }
    Ok(handles)
}

/// Worker pool that prepares cells off-thread and commits them on
/// [`BuildPool::poll`].
pub struct BuildPool {
    cache: Arc<CellCache>,
    tx_job: Option<Sender<BuildJob>>,
    rx_done: Receiver<BuildDone>,
    workers: Vec<JoinHandle<()>>,
    jobs: HashMap<CellKey, Arc<PendingBuild>>,
}

impl BuildPool {
    pub fn new(
        workers: usize,
        db: Arc<dyn WorldDatabase>,
        cache: Arc<CellCache>,
    ) -> std::io::Result<Self> {
        let (tx_job, rx_job) = unbounded();
        let (tx_done, rx_done) = unbounded();
        let workers = spawn_workers(workers.max(1), db, rx_job, tx_done)?;
        tracing::debug!(workers = workers.len(), "build pool started");
        Ok(Self {
            cache,
            tx_job: Some(tx_job),
            rx_done,
            workers,
            jobs: HashMap::new(),
        })
    }

    pub fn cache(&self) -> &Arc<CellCache> {
        &self.cache
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Jobs submitted and not yet resolved.
    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_in_flight(&self, key: &CellKey) -> bool {
        self.jobs.contains_key(key)
    }

    /// Request a cell. Cached cells resolve immediately; a key already in
    /// flight shares its build and, if it was cancelled, is revived.
    pub fn request(&mut self, record: Arc<CellRecord>) -> BuildTicket {
        let key = CellKey::for_record(&record);
        match self.cache.claim(&key) {
            Claim::Cached(cell) => BuildTicket::resolved(key, BuildOutcome::Ready(cell)),
            Claim::InFlight(pending) => {
                if pending.revive() {
                    tracing::debug!(%key, "revived cancelled build");
                }
                BuildTicket::new(pending)
            }
            Claim::Claimed(pending) => {
                tracing::debug!(%key, "queueing build");
                self.jobs.insert(key, Arc::clone(&pending));
                self.submit(BuildJob {
                    pending: Arc::clone(&pending),
                    record,
                });
                BuildTicket::new(pending)
            }
        }
    }

    /// Flag an in-flight build as cancelled. Cached cells are unaffected.
    /// Returns whether a build was flagged.
    pub fn cancel(&mut self, key: &CellKey) -> bool {
        match self.jobs.get(key) {
            Some(pending) => {
                pending.cancel();
                tracing::debug!(%key, "build cancelled");
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        for pending in self.jobs.values() {
            pending.cancel();
        }
        self.jobs.len()
    }

    /// Commit every finished job without blocking. Returns how many builds
    /// resolved.
    pub fn poll(&mut self, scene: &mut Scene, factory: &mut CellFactory) -> usize {
        let mut resolved = 0;
        while let Ok(done) = self.rx_done.try_recv() {
            if self.finish(done, scene, factory) {
                resolved += 1;
            }
        }
        resolved
    }

    /// Commit finished jobs until `key` resolves. Returns `None` if the key
    /// was never requested from this pool and is not cached.
    pub fn wait(
        &mut self,
        key: &CellKey,
        scene: &mut Scene,
        factory: &mut CellFactory,
    ) -> Option<BuildOutcome> {
        let Some(pending) = self.jobs.get(key).cloned() else {
            return self.cache.get(key).map(BuildOutcome::Ready);
        };
        while !pending.is_resolved() {
            match self.rx_done.recv() {
                Ok(done) => {
                    self.finish(done, scene, factory);
                }
                Err(_) => {
                    tracing::warn!(%key, "build workers gone");
                    self.jobs.remove(key);
                    self.cache.abandon(key, BuildOutcome::Cancelled);
                    break;
                }
            }
        }
        pending.outcome()
    }

    /// Block until every in-flight job has resolved.
    pub fn wait_all(&mut self, scene: &mut Scene, factory: &mut CellFactory) {
        let keys: Vec<CellKey> = self.jobs.keys().cloned().collect();
        for key in keys {
            self.wait(&key, scene, factory);
        }
    }

    fn submit(&mut self, job: BuildJob) {
        let sent = match &self.tx_job {
            Some(tx) => tx.send(job).map_err(|err| err.into_inner()),
            None => Err(job),
        };
        if let Err(job) = sent {
            let key = job.pending.key().clone();
            tracing::warn!(%key, "build pool closed, dropping request");
            self.jobs.remove(&key);
            self.cache.abandon(&key, BuildOutcome::Cancelled);
        }
    }

    fn finish(&mut self, done: BuildDone, scene: &mut Scene, factory: &mut CellFactory) -> bool {
        let key = done.pending.key().clone();
        if done.pending.is_cancelled() {
            self.jobs.remove(&key);
            self.cache.abandon(&key, BuildOutcome::Cancelled);
            tracing::trace!(%key, "dropped cancelled build");
            return true;
        }
        match done.prepared {
            Some(prepared) => {
                let cell = factory.commit(scene, prepared);
                self.jobs.remove(&key);
                self.cache.complete(&key, Some(cell));
                true
            }
            None => {
                // Skipped while cancelled, then revived.
                tracing::debug!(%key, "resubmitting revived build");
                self.submit(BuildJob {
                    pending: done.pending,
                    record: done.record,
                });
                false
            }
        }
    }
}

impl Drop for BuildPool {
    fn drop(&mut self) {
        self.tx_job.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("build worker panicked");
            }
        }
        for (key, _) in self.jobs.drain() {
            self.cache.abandon(&key, BuildOutcome::Cancelled);
        }
    }
}
