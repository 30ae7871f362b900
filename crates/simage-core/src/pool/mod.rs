//! Local worker pool: bounded, concurrent batch hashing.
//!
//! Batches are admitted with a [`JobTicket`] (at most `max_queue_size` in
//! flight), queued on a bounded channel, and picked up by a fixed set of
//! workers that run each `HashJob` on the blocking thread pool.
//!
//! A batch interrupted by [`HashWorkerPool::shutdown`] writes nothing; its
//! paths are hashed again on the next scan.

mod job;
pub mod observer;
mod ticket;

pub(crate) use job::{HashJob, JobContext};
pub use job::JobOutcome;
pub use observer::{BufferLevelObserver, ObserverId, ObserverRegistry};
pub use ticket::{JobTicket, TicketBooth};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{Config, PoolConfig};
use crate::error::PoolError;
use crate::pipeline::decode::ImageLoader;
use crate::pipeline::hash::{Fingerprinter, PerceptualHasher};
use crate::sink::RecordSink;
use crate::types::HashJobBatch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Running totals across all jobs of one pool.
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    batches: AtomicUsize,
    hashed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl PoolStats {
    pub(crate) fn record(&self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Completed { hashed, failed } => {
                self.batches.fetch_add(1, Ordering::Relaxed);
                self.hashed.fetch_add(hashed, Ordering::Relaxed);
                self.failed.fetch_add(failed, Ordering::Relaxed);
            }
            JobOutcome::Cancelled { .. } => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> PoolSummary {
        PoolSummary {
            batches_completed: self.batches.load(Ordering::Relaxed),
            images_hashed: self.hashed.load(Ordering::Relaxed),
            images_failed: self.failed.load(Ordering::Relaxed),
            batches_cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Counts of finished work, for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub batches_completed: usize,
    pub images_hashed: usize,
    pub images_failed: usize,
    /// Batches interrupted or discarded by shutdown
    pub batches_cancelled: usize,
}

/// Bounded pool of hashing workers.
///
/// Must be created inside a tokio runtime; workers are spawned immediately.
pub struct HashWorkerPool {
    booth: TicketBooth,
    observers: Arc<ObserverRegistry>,
    queue: Mutex<Option<mpsc::Sender<HashJob>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<HashJob>>>,
    closed: AtomicBool,
    cancelled: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    finished: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sink: Arc<dyn RecordSink>,
    stats: Arc<PoolStats>,
    worker_count: usize,
}

impl HashWorkerPool {
    /// Build a pool using the configured perceptual hasher and limits.
    pub fn new(config: &Config, sink: Arc<dyn RecordSink>) -> Self {
        Self::with_hasher(
            &config.pool,
            ImageLoader::new(config.limits.clone()),
            Arc::new(PerceptualHasher::new(&config.hashing)),
            sink,
        )
    }

    /// Build a pool around an explicit loader and hasher.
    pub fn with_hasher(
        pool: &PoolConfig,
        loader: ImageLoader,
        hasher: Arc<dyn Fingerprinter>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let capacity = pool.max_queue_size.max(1);
        let worker_count = pool.resolved_workers();
        let observers = Arc::new(ObserverRegistry::new());
        let booth = TicketBooth::new(capacity, observers.clone());
        let (tx, rx) = mpsc::channel(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(rx));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(PoolStats::default());

        let ctx = JobContext {
            loader,
            hasher,
            sink: sink.clone(),
            cancelled: cancelled.clone(),
            stats: stats.clone(),
        };

        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    receiver.clone(),
                    ctx.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        tracing::info!(
            "Hash worker pool started: {} workers, {} batches in flight max",
            worker_count,
            capacity
        );

        Self {
            booth,
            observers,
            queue: Mutex::new(Some(tx)),
            receiver,
            closed: AtomicBool::new(false),
            cancelled,
            shutdown_tx,
            finished: watch::channel(false).0,
            workers: Mutex::new(workers),
            sink,
            stats,
            worker_count,
        }
    }

    /// Queue a batch, waiting for a free ticket first.
    ///
    /// Returns once the batch is queued, not when it has been hashed. Fails
    /// with [`PoolError::Closed`] after shutdown, including for callers that
    /// were waiting for a ticket when shutdown began.
    pub async fn submit(&self, batch: HashJobBatch) -> Result<(), PoolError> {
        if self.closed.load(Ordering::Acquire) {
            tracing::error!("Rejected batch of {} paths: pool is shut down", batch.len());
            return Err(PoolError::Closed);
        }

        let ticket = self.booth.acquire().await?;
        let sender = lock(&self.queue).clone().ok_or(PoolError::Closed)?;
        sender
            .send(HashJob::new(batch, ticket))
            .await
            .map_err(|_| PoolError::Closed)
    }

    /// Wait until every submitted batch has been hashed and written.
    ///
    /// Returns immediately once the pool is shut down.
    pub async fn wait_idle(&self) {
        self.booth.wait_idle().await;
    }

    /// Stop the pool.
    ///
    /// Refuses new batches, wakes blocked submitters, interrupts running
    /// batches between images, discards queued ones, then shuts the sink
    /// down. Safe to call more than once; later calls wait for the first
    /// to finish.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            let mut finished = self.finished.subscribe();
            let _ = finished.wait_for(|done| *done).await;
            return;
        }
        tracing::info!("Shutting down hash worker pool");

        self.cancelled.store(true, Ordering::Release);
        self.booth.close();
        self.shutdown_tx.send_replace(true);
        lock(&self.queue).take();

        let workers = std::mem::take(&mut *lock(&self.workers));
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!("Hash worker failed: {e}");
            }
        }

        let mut rx = self.receiver.lock().await;
        rx.close();
        let mut discarded = 0usize;
        while let Ok(job) = rx.try_recv() {
            discarded += 1;
            drop(job);
        }
        drop(rx);
        if discarded > 0 {
            self.stats.cancelled.fetch_add(discarded, Ordering::Relaxed);
            tracing::info!("Discarded {} queued batches", discarded);
        }

        self.sink.shutdown();
        self.finished.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Batches currently holding a ticket.
    pub fn buffer_level(&self) -> usize {
        self.booth.in_use()
    }

    pub fn max_queue_size(&self) -> usize {
        self.booth.capacity()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn summary(&self) -> PoolSummary {
        self.stats.snapshot()
    }

    pub fn subscribe(&self, observer: Arc<dyn BufferLevelObserver>) -> ObserverId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }
}

impl Drop for HashWorkerPool {
    fn drop(&mut self) {
        // Stop detached workers if shutdown() was never awaited.
        self.cancelled.store(true, Ordering::Release);
        self.booth.close();
        self.shutdown_tx.send_replace(true);
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<HashJob>>>,
    ctx: JobContext,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };

        let ctx = ctx.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || job.run(&ctx)).await {
            tracing::error!("Hash worker {} lost a batch: {}", id, e);
        }
    }
    tracing::debug!("Hash worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::hash::FingerprintError;
    use crate::sink::MemorySink;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn write_png(path: &Path, seed: u8) {
        RgbImage::from_fn(32, 32, |x, y| {
            Rgb([seed.wrapping_mul(3), (x * 7) as u8, (y * 5) as u8])
        })
        .save(path)
        .unwrap();
    }

    fn images(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("img_{i}.png"));
                write_png(&path, i as u8);
                path
            })
            .collect()
    }

    fn pool_config(max_queue_size: usize, workers: usize) -> PoolConfig {
        PoolConfig {
            max_queue_size,
            workers,
            ..PoolConfig::default()
        }
    }

    fn pool_with(
        config: &PoolConfig,
        hasher: Arc<dyn Fingerprinter>,
    ) -> (HashWorkerPool, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let pool = HashWorkerPool::with_hasher(config, ImageLoader::default(), hasher, sink.clone());
        (pool, sink)
    }

    /// Real hasher that sleeps before every image.
    struct SlowHasher {
        delay: Duration,
        inner: PerceptualHasher,
    }

    impl Fingerprinter for SlowHasher {
        fn fingerprint(&self, image: &DynamicImage) -> Result<u64, FingerprintError> {
            std::thread::sleep(self.delay);
            self.inner.fingerprint(image)
        }
    }

    fn slow(delay_ms: u64) -> Arc<dyn Fingerprinter> {
        Arc::new(SlowHasher {
            delay: Duration::from_millis(delay_ms),
            inner: PerceptualHasher::default(),
        })
    }

    #[tokio::test]
    async fn test_mixed_batch_with_single_ticket() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = images(dir.path(), 3);
        let text = dir.path().join("readme.txt");
        std::fs::write(&text, "plain text").unwrap();
        paths.push(text.clone());

        let (pool, sink) = pool_with(&pool_config(1, 2), Arc::new(PerceptualHasher::default()));
        pool.submit(HashJobBatch::new(paths)).await.unwrap();
        pool.wait_idle().await;

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.bad_files(), vec![text]);
        assert_eq!(sink.add_calls(), vec![3]);
        assert_eq!(pool.buffer_level(), 0);
        assert_eq!(
            pool.summary(),
            PoolSummary {
                batches_completed: 1,
                images_hashed: 3,
                images_failed: 1,
                batches_cancelled: 0,
            }
        );

        pool.shutdown().await;
        assert!(sink.is_shut_down());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_buffer_level_never_exceeds_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let paths = images(dir.path(), 4);

        let (pool, sink) = pool_with(&pool_config(2, 3), slow(5));
        let peak = Arc::new(AtomicUsize::new(0));
        let notifications = Arc::new(AtomicUsize::new(0));
        let (p, n) = (peak.clone(), notifications.clone());
        pool.subscribe(Arc::new(move |level: usize| {
            p.fetch_max(level, Ordering::SeqCst);
            n.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..10 {
            pool.submit(HashJobBatch::new(paths.clone())).await.unwrap();
        }
        pool.wait_idle().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.buffer_level(), 0);
        assert_eq!(sink.add_calls().len(), 10);
        // One notification per acquire and one per release
        assert_eq!(notifications.load(Ordering::SeqCst), 20);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_summary_is_current_once_idle() {
        let dir = tempfile::tempdir().unwrap();
        let paths = images(dir.path(), 2);

        let (pool, _sink) = pool_with(&pool_config(3, 3), slow(2));
        for round in 1..=5 {
            pool.submit(HashJobBatch::new(paths.clone())).await.unwrap();
            pool.wait_idle().await;

            let summary = pool.summary();
            assert_eq!(summary.batches_completed, round);
            assert_eq!(summary.images_hashed, round * 2);
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails_fast() {
        let (pool, sink) = pool_with(&pool_config(4, 1), Arc::new(PerceptualHasher::default()));
        pool.shutdown().await;

        let result = pool
            .submit(HashJobBatch::new(vec![PathBuf::from("/tmp/x.png")]))
            .await;
        assert_eq!(result, Err(PoolError::Closed));
        assert_eq!(pool.buffer_level(), 0);
        assert!(sink.add_calls().is_empty());
        assert!(pool.is_shut_down());
    }

    #[tokio::test]
    async fn test_all_failed_batch_releases_ticket() {
        let (pool, sink) = pool_with(&pool_config(1, 1), Arc::new(PerceptualHasher::default()));
        let missing = vec![
            PathBuf::from("/does/not/exist/a.png"),
            PathBuf::from("/does/not/exist/b.png"),
        ];

        pool.submit(HashJobBatch::new(missing.clone())).await.unwrap();
        // A second submit only gets a ticket once the first batch released it
        pool.submit(HashJobBatch::new(Vec::new())).await.unwrap();
        pool.wait_idle().await;

        assert_eq!(sink.add_calls(), vec![0, 0]);
        assert_eq!(sink.bad_files(), missing);
        assert_eq!(pool.buffer_level(), 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_discards_interrupted_batch() {
        let dir = tempfile::tempdir().unwrap();
        let one = images(dir.path(), 1);
        let batch: HashJobBatch = std::iter::repeat(one[0].clone()).take(40).collect();

        let (pool, sink) = pool_with(&pool_config(4, 1), slow(25));
        pool.submit(batch.clone()).await.unwrap();
        pool.submit(batch).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        pool.shutdown().await;

        assert!(sink.add_calls().is_empty(), "interrupted batches must not write");
        assert!(sink.bad_files().is_empty());
        assert!(sink.is_shut_down());
        assert_eq!(pool.buffer_level(), 0);
        assert_eq!(pool.summary().batches_cancelled, 2);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_submitter() {
        let dir = tempfile::tempdir().unwrap();
        let one = images(dir.path(), 1);
        let batch: HashJobBatch = std::iter::repeat(one[0].clone()).take(40).collect();

        let (pool, _sink) = pool_with(&pool_config(1, 1), slow(25));
        let pool = Arc::new(pool);
        pool.submit(batch.clone()).await.unwrap();

        let blocked = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit(batch).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!blocked.is_finished());

        pool.shutdown().await;
        let result = tokio::time::timeout(Duration::from_secs(2), blocked)
            .await
            .expect("blocked submitter must wake on shutdown")
            .unwrap();
        assert_eq!(result, Err(PoolError::Closed));
    }

    #[tokio::test]
    async fn test_concurrent_shutdown_waits_for_first() {
        let dir = tempfile::tempdir().unwrap();
        let one = images(dir.path(), 1);
        let batch: HashJobBatch = std::iter::repeat(one[0].clone()).take(10).collect();

        let (pool, sink) = pool_with(&pool_config(2, 1), slow(20));
        let pool = Arc::new(pool);
        pool.submit(batch).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let first = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.shutdown().await })
        };
        tokio::task::yield_now().await;
        pool.shutdown().await;
        assert!(sink.is_shut_down());
        first.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (pool, sink) = pool_with(&pool_config(2, 1), Arc::new(PerceptualHasher::default()));
        pool.shutdown().await;
        pool.shutdown().await;
        assert!(sink.is_shut_down());
        pool.wait_idle().await;
    }
}
