//! A single batch of hashing work.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::pipeline::decode::ImageLoader;
use crate::pipeline::hash::{hash_file, Fingerprinter};
use crate::sink::RecordSink;
use crate::types::{BadFileMarker, HashJobBatch, HashRecord};

use super::ticket::JobTicket;
use super::PoolStats;

/// Everything a job needs besides its own paths. Shared by all workers.
#[derive(Clone)]
pub struct JobContext {
    pub loader: ImageLoader,
    pub hasher: Arc<dyn Fingerprinter>,
    pub sink: Arc<dyn RecordSink>,
    pub cancelled: Arc<AtomicBool>,
    pub(crate) stats: Arc<PoolStats>,
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every path was attempted and the results were written.
    Completed { hashed: usize, failed: usize },
    /// The pool was shut down mid-batch; nothing was written.
    Cancelled { attempted: usize },
}

/// A batch paired with the ticket that admitted it.
pub struct HashJob {
    batch: HashJobBatch,
    ticket: JobTicket,
}

impl HashJob {
    pub fn new(batch: HashJobBatch, ticket: JobTicket) -> Self {
        Self { batch, ticket }
    }

    /// Hash every path, then hand the results to the sink in one `add`
    /// followed by one `mark_bad` per failure. Blocking; run it off the
    /// async executor.
    ///
    /// The outcome is counted before the ticket is released, on every path.
    pub fn run(self, ctx: &JobContext) -> JobOutcome {
        let HashJob { batch, ticket } = self;
        let start = Instant::now();
        let paths = batch.into_paths();
        let total = paths.len();

        let mut records: Vec<HashRecord> = Vec::with_capacity(total);
        let mut bad: Vec<PathBuf> = Vec::new();

        for (attempted, path) in paths.into_iter().enumerate() {
            if ctx.cancelled.load(Ordering::Acquire) {
                tracing::debug!(
                    "Batch interrupted after {}/{} images, discarding results",
                    attempted,
                    total
                );
                let outcome = JobOutcome::Cancelled { attempted };
                ctx.stats.record(outcome);
                drop(ticket);
                return outcome;
            }

            match hash_file(&ctx.loader, ctx.hasher.as_ref(), &path) {
                Ok(fingerprint) => records.push(HashRecord::new(path, fingerprint)),
                Err(e) => {
                    tracing::warn!("{}", e);
                    bad.push(path);
                }
            }
        }

        let hashed = records.len();
        let failed = bad.len();
        ctx.sink.add(records);
        for path in bad {
            ctx.sink.mark_bad(BadFileMarker::new(path));
        }
        let outcome = JobOutcome::Completed { hashed, failed };
        ctx.stats.record(outcome);
        drop(ticket);

        tracing::debug!(
            "Batch of {} done in {:?} ({} hashed, {} failed)",
            total,
            start.elapsed(),
            hashed,
            failed
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::hash::PerceptualHasher;
    use crate::pool::observer::ObserverRegistry;
    use crate::pool::ticket::TicketBooth;
    use crate::sink::MemorySink;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_png(path: &Path, shade: u8) {
        RgbImage::from_fn(32, 32, |x, _| Rgb([shade, (x * 8) as u8, 0]))
            .save(path)
            .unwrap();
    }

    fn context(sink: Arc<MemorySink>) -> JobContext {
        JobContext {
            loader: ImageLoader::default(),
            hasher: Arc::new(PerceptualHasher::default()),
            sink,
            cancelled: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PoolStats::default()),
        }
    }

    #[tokio::test]
    async fn test_mixed_batch_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let broken = dir.path().join("broken.png");
        write_png(&good, 90);
        std::fs::write(&broken, b"not really a png").unwrap();

        let booth = TicketBooth::new(1, Arc::new(ObserverRegistry::new()));
        let ticket = booth.acquire().await.unwrap();
        let sink = Arc::new(MemorySink::new());
        let ctx = context(sink.clone());

        let job = HashJob::new(HashJobBatch::new(vec![good.clone(), broken.clone()]), ticket);
        let outcome = job.run(&ctx);

        assert_eq!(outcome, JobOutcome::Completed { hashed: 1, failed: 1 });
        assert_eq!(sink.add_calls(), vec![1]);
        assert!(sink.fingerprint(&good).is_some());
        assert_eq!(sink.bad_files(), vec![broken]);
        assert_eq!(booth.in_use(), 0);
        assert_eq!(ctx.stats.snapshot().images_failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_job_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 10);

        let booth = TicketBooth::new(1, Arc::new(ObserverRegistry::new()));
        let ticket = booth.acquire().await.unwrap();
        let sink = Arc::new(MemorySink::new());
        let ctx = context(sink.clone());
        ctx.cancelled.store(true, Ordering::Release);

        let outcome = HashJob::new(HashJobBatch::new(vec![path]), ticket).run(&ctx);

        assert_eq!(outcome, JobOutcome::Cancelled { attempted: 0 });
        assert!(sink.add_calls().is_empty());
        assert!(sink.bad_files().is_empty());
        assert_eq!(booth.in_use(), 0);
        assert_eq!(ctx.stats.snapshot().batches_cancelled, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_still_adds() {
        let booth = TicketBooth::new(1, Arc::new(ObserverRegistry::new()));
        let ticket = booth.acquire().await.unwrap();
        let sink = Arc::new(MemorySink::new());

        let outcome = HashJob::new(HashJobBatch::default(), ticket).run(&context(sink.clone()));

        assert_eq!(outcome, JobOutcome::Completed { hashed: 0, failed: 0 });
        assert_eq!(sink.add_calls(), vec![0]);
    }
}
