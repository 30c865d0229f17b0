use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ResamplerConfig;
use crate::error::Error;

/// Identifies the submitter of a job so its work can be removed without
/// touching other submitters sharing the pool.
pub type OwnerId = u64;

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);
static SHARED_POOL: Mutex<Weak<ResamplingPool>> = Mutex::new(Weak::new());

pub fn next_owner_id() -> OwnerId {
    NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
}

/// Unit of work run on the pool's worker thread.
///
/// Implementations poll `cancel` at their own checkpoints; the pool never
/// interrupts a running job.
pub trait PoolJob: Send {
    fn name(&self) -> &str;

    fn run(&mut self, cancel: &CancellationToken);
}

struct QueuedJob {
    owner: OwnerId,
    token: CancellationToken,
    job: Box<dyn PoolJob>,
}

struct RunningJob {
    owner: OwnerId,
    token: CancellationToken,
}

#[derive(Default)]
struct PoolState {
    queue: VecDeque<QueuedJob>,
    running: Option<RunningJob>,
    shutdown: bool,
}

impl PoolState {
    fn is_running(&self, owner: OwnerId) -> bool {
        self.running.as_ref().is_some_and(|r| r.owner == owner)
    }
}

#[derive(Default)]
struct PoolInner {
    state: Mutex<PoolState>,
    work_ready: Condvar,
    job_done: Condvar,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO job queue served by a single named worker thread.
pub struct ResamplingPool {
    name: String,
    teardown_timeout: Duration,
    inner: Arc<PoolInner>,
    worker: Option<JoinHandle<()>>,
}

impl ResamplingPool {
    pub fn new(name: &str, teardown_timeout: Duration) -> Result<Self, Error> {
        let inner = Arc::new(PoolInner::default());
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn({
                let inner = Arc::clone(&inner);
                move || worker_loop(&inner)
            })
            .map_err(|source| Error::WorkerSpawn {
                name: name.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.to_string(),
            teardown_timeout,
            inner,
            worker: Some(worker),
        })
    }

    /// Process-wide pool, created on first use and torn down once the last
    /// holder drops it. A later call after teardown starts a fresh pool.
    ///
    /// Only the first caller's thread name and teardown timeout apply while
    /// the pool is alive.
    pub fn shared(config: &ResamplerConfig) -> Result<Arc<Self>, Error> {
        let mut slot = SHARED_POOL.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = slot.upgrade() {
            return Ok(pool);
        }
        let pool = Arc::new(Self::new(
            &config.worker_thread_name,
            config.teardown_timeout,
        )?);
        *slot = Arc::downgrade(&pool);
        debug!("started shared resampling pool '{}'", config.worker_thread_name);
        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `job`. Jobs are never evicted for queue pressure; they either
    /// run or are removed explicitly.
    pub fn submit(&self, owner: OwnerId, token: CancellationToken, job: Box<dyn PoolJob>) {
        let mut state = self.inner.lock();
        if state.shutdown {
            token.cancel();
            return;
        }
        state.queue.push_back(QueuedJob { owner, token, job });
        self.inner.work_ready.notify_one();
    }

    /// Drop every queued job of `owner`, cancel its running job, and wait
    /// up to `wait` for that job to return.
    ///
    /// Returns `true` when nothing of `owner` is still running.
    pub fn remove_jobs(&self, owner: OwnerId, wait: Duration) -> bool {
        let mut state = self.inner.lock();
        state.queue.retain(|queued| {
            if queued.owner == owner {
                queued.token.cancel();
                debug!("removed queued job '{}'", queued.job.name());
                false
            } else {
                true
            }
        });
        if let Some(running) = state.running.as_ref().filter(|r| r.owner == owner) {
            running.token.cancel();
        }
        if wait.is_zero() || self.on_worker_thread() {
            return !state.is_running(owner);
        }
        let (state, _) = self
            .inner
            .job_done
            .wait_timeout_while(state, wait, |s| s.is_running(owner))
            .unwrap_or_else(PoisonError::into_inner);
        !state.is_running(owner)
    }

    pub fn pending_jobs(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_running(&self, owner: OwnerId) -> bool {
        self.inner.lock().is_running(owner)
    }

    fn on_worker_thread(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.thread().id() == thread::current().id())
    }
}

impl Drop for ResamplingPool {
    fn drop(&mut self) {
        let on_worker = self.on_worker_thread();
        let finished = {
            let mut state = self.inner.lock();
            state.shutdown = true;
            for queued in state.queue.drain(..) {
                queued.token.cancel();
            }
            if let Some(running) = state.running.as_ref() {
                running.token.cancel();
            }
            self.inner.work_ready.notify_all();
            if on_worker {
                false
            } else {
                let (state, _) = self
                    .inner
                    .job_done
                    .wait_timeout_while(state, self.teardown_timeout, |s| s.running.is_some())
                    .unwrap_or_else(PoisonError::into_inner);
                state.running.is_none()
            }
        };

        let Some(worker) = self.worker.take() else {
            return;
        };
        if finished {
            if worker.join().is_err() {
                error!("resampling worker '{}' panicked", self.name);
            }
        } else if !on_worker {
            warn!(
                "resampling pool '{}' abandoned a job still running after {:?}",
                self.name, self.teardown_timeout
            );
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let (mut job, token) = {
            let mut state = inner.lock();
            loop {
                if state.shutdown {
                    return;
                }
                match state.queue.pop_front() {
                    Some(queued) if queued.token.is_cancelled() => continue,
                    Some(queued) => {
                        state.running = Some(RunningJob {
                            owner: queued.owner,
                            token: queued.token.clone(),
                        });
                        break (queued.job, queued.token);
                    }
                    None => {
                        state = inner
                            .work_ready
                            .wait(state)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                }
            }
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| job.run(&token)));
        if result.is_err() {
            error!("job '{}' panicked", job.name());
        }
        drop(job);

        let mut state = inner.lock();
        state.running = None;
        inner.job_done.notify_all();
    }
}
