//! Single-worker offload pool for translation calls.
//!
//! One worker task drains a FIFO queue, so jobs run one at a time in
//! submission order while the update loop keeps accepting updates. Each job
//! runs in its own task: a panicking job resolves to `WorkerFailure` and the
//! worker moves on to the next one.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    task::{Context, Poll},
    time::Duration,
};

use tokio::{
    sync::{mpsc, oneshot},
    task::{AbortHandle, JoinError, JoinHandle},
};
use tokio_util::sync::CancellationToken;

use crate::{
    errors::{Error, OffloadError},
    ports::{TranslationContext, Translator},
    Result,
};

/// How long a cancelled worker gets to report `Cancelled` before it is aborted.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// One unit of translation work.
#[derive(Clone, Debug)]
pub struct OffloadJob {
    pub input: String,
    pub context: TranslationContext,
}

pub type OffloadResult = std::result::Result<String, OffloadError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    Open,
    Draining,
    Stopped,
    /// The worker loop died; every submission fails with `PoolUnavailable`.
    Degraded,
}

struct Queued {
    seq: u64,
    job: OffloadJob,
    reply: oneshot::Sender<OffloadResult>,
}

struct Shared {
    state: Mutex<PoolState>,
    tx: Mutex<Option<mpsc::UnboundedSender<Queued>>>,
    cancel: CancellationToken,
    supervisor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    worker_abort: AbortHandle,
    next_seq: AtomicU64,
}

/// Handle to the process-wide translation worker.
///
/// Construct once at startup and share it (`Arc`) with whoever submits jobs
/// or stops the pool.
pub struct OffloadPool {
    shared: Arc<Shared>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OffloadPool {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// Fails when called outside a runtime; callers treat that as fatal.
    pub fn new(translator: Arc<dyn Translator>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Config(format!("offload pool needs a tokio runtime: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = runtime.spawn(worker_loop(translator, rx, cancel.clone()));

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::Open),
            tx: Mutex::new(Some(tx)),
            cancel,
            supervisor: tokio::sync::Mutex::new(None),
            worker_abort: worker.abort_handle(),
            next_seq: AtomicU64::new(1),
        });

        let watched = Arc::downgrade(&shared);
        let supervisor = runtime.spawn(async move {
            let outcome = worker.await;
            let Some(shared) = watched.upgrade() else {
                return;
            };
            let mut state = lock(&shared.state);
            if *state == PoolState::Open {
                tracing::error!(error = ?outcome.err(), "offload worker exited unexpectedly; pool degraded");
                *state = PoolState::Degraded;
                lock(&shared.tx).take();
            }
        });

        // Nobody else can reach the supervisor slot yet.
        if let Ok(mut slot) = shared.supervisor.try_lock() {
            *slot = Some(supervisor);
        }

        tracing::info!("offload pool started (1 worker)");
        Ok(Self { shared })
    }

    pub fn state(&self) -> PoolState {
        *lock(&self.shared.state)
    }

    /// Queue a job. Never blocks; the returned future resolves once the
    /// worker has run the job (or it was cancelled / refused).
    pub fn submit(&self, job: OffloadJob) -> PendingTranslation {
        let (reply, rx) = oneshot::channel();
        let guard = lock(&self.shared.tx);
        let Some(tx) = guard.as_ref() else {
            return PendingTranslation::failed(OffloadError::PoolUnavailable);
        };

        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        if tx.send(Queued { seq, job, reply }).is_err() {
            return PendingTranslation::failed(OffloadError::PoolUnavailable);
        }
        tracing::debug!(seq, "offload job queued");
        PendingTranslation { rx }
    }

    /// Stop accepting jobs and wait for queued/running ones to finish.
    ///
    /// After `timeout` elapses the running job and everything still queued
    /// resolve to `Cancelled`. Calling this again is a no-op.
    pub async fn drain_and_stop(&self, timeout: Option<Duration>) {
        {
            let mut state = lock(&self.shared.state);
            match *state {
                PoolState::Draining | PoolState::Stopped => return,
                PoolState::Open | PoolState::Degraded => *state = PoolState::Draining,
            }
            lock(&self.shared.tx).take();
        }

        tracing::info!(?timeout, "offload pool draining");

        let handle = self.shared.supervisor.lock().await.take();
        if let Some(mut handle) = handle {
            let finished = match timeout {
                Some(limit) => tokio::time::timeout(limit, &mut handle).await.is_ok(),
                None => {
                    let _ = (&mut handle).await;
                    true
                }
            };
            if !finished {
                tracing::warn!("offload drain timed out; cancelling outstanding jobs");
                self.shared.cancel.cancel();
                if tokio::time::timeout(CANCEL_GRACE, &mut handle).await.is_err() {
                    self.shared.worker_abort.abort();
                    let _ = handle.await;
                }
            }
        }

        *lock(&self.shared.state) = PoolState::Stopped;
        tracing::info!("offload pool stopped");
    }

    #[cfg(test)]
    fn kill_worker(&self) {
        self.shared.worker_abort.abort();
    }
}

impl Drop for OffloadPool {
    fn drop(&mut self) {
        let mut state = lock(&self.shared.state);
        if *state == PoolState::Open {
            *state = PoolState::Draining;
        }
        // Closing the queue lets the worker finish what is queued and exit.
        lock(&self.shared.tx).take();
    }
}

/// Result of a submitted job.
#[must_use = "a submitted job's result should be awaited"]
pub struct PendingTranslation {
    rx: oneshot::Receiver<OffloadResult>,
}

impl PendingTranslation {
    fn failed(err: OffloadError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { rx }
    }
}

impl Future for PendingTranslation {
    type Output = OffloadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| {
            r.unwrap_or_else(|_| {
                Err(OffloadError::WorkerFailure(
                    "worker dropped the job".to_string(),
                ))
            })
        })
    }
}

async fn worker_loop(
    translator: Arc<dyn Translator>,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    cancel: CancellationToken,
) {
    loop {
        let queued = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(q) => q,
                None => break,
            },
        };

        let Queued { seq, job, reply } = queued;
        if reply.is_closed() {
            tracing::debug!(seq, "offload job abandoned by waiter; skipping");
            continue;
        }

        tracing::debug!(seq, chars = job.input.chars().count(), "offload job started");
        let translator = translator.clone();
        let mut task =
            tokio::spawn(async move { translator.translate(&job.input, &job.context).await });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                task.abort();
                let _ = reply.send(Err(OffloadError::Cancelled));
                break;
            }
            joined = &mut task => job_outcome(seq, joined),
        };
        let _ = reply.send(result);
    }

    rx.close();
    let mut cancelled = 0usize;
    while let Ok(q) = rx.try_recv() {
        let _ = q.reply.send(Err(OffloadError::Cancelled));
        cancelled += 1;
    }
    if cancelled > 0 {
        tracing::warn!(cancelled, "offload jobs cancelled before running");
    }
    tracing::debug!("offload worker exited");
}

fn job_outcome(seq: u64, joined: std::result::Result<Result<String>, JoinError>) -> OffloadResult {
    match joined {
        Ok(Ok(text)) => {
            tracing::debug!(seq, "offload job finished");
            Ok(text)
        }
        Ok(Err(e)) => {
            tracing::warn!(seq, error = %e, "translation failed");
            Err(OffloadError::WorkerFailure(e.to_string()))
        }
        Err(e) if e.is_panic() => {
            let msg = panic_message(e);
            tracing::error!(seq, panic = %msg, "offload job crashed; worker continues");
            Err(OffloadError::WorkerFailure(format!("job panicked: {msg}")))
        }
        Err(_) => Err(OffloadError::Cancelled),
    }
}

fn panic_message(e: JoinError) -> String {
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn job(input: &str) -> OffloadJob {
        OffloadJob {
            input: input.to_string(),
            context: TranslationContext::default(),
        }
    }

    /// Records execution order and flags any overlap between jobs.
    #[derive(Default)]
    struct Recording {
        log: Mutex<Vec<String>>,
        running: AtomicU64,
        overlapped: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Translator for Recording {
        async fn translate(&self, text: &str, _ctx: &TranslationContext) -> Result<String> {
            if self.running.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            lock(&self.log).push(text.to_string());
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            match text {
                "boom" => panic!("translator exploded"),
                "fail" => Err(Error::External("service said no".to_string())),
                other => Ok(other.to_uppercase()),
            }
        }
    }

    /// Signals when a job starts and then never finishes.
    struct Stuck {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl Translator for Stuck {
        async fn translate(&self, _text: &str, _ctx: &TranslationContext) -> Result<String> {
            self.started.notify_one();
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn jobs_run_in_submission_order_one_at_a_time() {
        let tr = Arc::new(Recording::default());
        let pool = OffloadPool::new(tr.clone()).unwrap();

        let inputs: Vec<String> = (1..=20).map(|i| format!("j{i}")).collect();
        let pending: Vec<_> = inputs.iter().map(|i| pool.submit(job(i))).collect();
        for (input, p) in inputs.iter().zip(pending) {
            assert_eq!(p.await.unwrap(), input.to_uppercase());
        }

        assert_eq!(*lock(&tr.log), inputs);
        assert!(!tr.overlapped.load(Ordering::SeqCst));
        pool.drain_and_stop(None).await;
    }

    #[tokio::test]
    async fn service_error_maps_to_worker_failure() {
        let pool = OffloadPool::new(Arc::new(Recording::default())).unwrap();
        let res = pool.submit(job("fail")).await;
        assert!(matches!(res, Err(OffloadError::WorkerFailure(m)) if m.contains("service said no")));
        pool.drain_and_stop(None).await;
    }

    #[tokio::test]
    async fn panicking_job_does_not_take_the_worker_down() {
        let pool = OffloadPool::new(Arc::new(Recording::default())).unwrap();

        let crashed = pool.submit(job("boom"));
        let after = pool.submit(job("ok"));

        assert!(matches!(crashed.await, Err(OffloadError::WorkerFailure(_))));
        assert_eq!(after.await.unwrap(), "OK");
        assert_eq!(pool.state(), PoolState::Open);
        pool.drain_and_stop(None).await;
    }

    #[tokio::test]
    async fn drain_lets_queued_jobs_finish() {
        let pool = OffloadPool::new(Arc::new(Recording::default())).unwrap();
        let a = pool.submit(job("a"));
        let b = pool.submit(job("b"));

        pool.drain_and_stop(Some(Duration::from_secs(5))).await;

        assert_eq!(a.await.unwrap(), "A");
        assert_eq!(b.await.unwrap(), "B");
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn zero_timeout_cancels_running_job_and_refuses_new_ones() {
        let started = Arc::new(Notify::new());
        let pool = OffloadPool::new(Arc::new(Stuck {
            started: started.clone(),
        }))
        .unwrap();

        let running = pool.submit(job("slow"));
        let queued = pool.submit(job("never"));
        started.notified().await;

        pool.drain_and_stop(Some(Duration::ZERO)).await;

        assert_eq!(running.await, Err(OffloadError::Cancelled));
        assert_eq!(queued.await, Err(OffloadError::Cancelled));
        assert_eq!(
            pool.submit(job("late")).await,
            Err(OffloadError::PoolUnavailable)
        );
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn drain_is_idempotent() {
        let pool = OffloadPool::new(Arc::new(Recording::default())).unwrap();
        pool.drain_and_stop(None).await;
        pool.drain_and_stop(Some(Duration::ZERO)).await;
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn dead_worker_degrades_the_pool() {
        let pool = OffloadPool::new(Arc::new(Recording::default())).unwrap();
        pool.kill_worker();

        for _ in 0..100 {
            if pool.state() == PoolState::Degraded {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(pool.state(), PoolState::Degraded);
        assert_eq!(
            pool.submit(job("x")).await,
            Err(OffloadError::PoolUnavailable)
        );
        pool.drain_and_stop(None).await;
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[test]
    fn construction_outside_runtime_is_fatal() {
        let err = OffloadPool::new(Arc::new(Recording::default()))
            .err()
            .expect("no runtime");
        assert!(err.is_fatal());
    }
}
