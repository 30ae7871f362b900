//! Hashing on the local worker pool.

use simage_core::pipeline::into_batches;
use simage_core::{HashWorkerPool, JsonlSink, PoolSummary};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::progress::{buffer_message, create_progress_bar, RunSummary};
use super::HashContext;

/// Feed every discovered image to the pool in batches and wait for it to
/// drain. Ctrl-C shuts the pool down; interrupted batches are not recorded.
pub async fn run_local(ctx: HashContext) -> anyhow::Result<RunSummary> {
    let HashContext {
        config,
        output,
        files,
        skipped,
    } = ctx;
    let start = Instant::now();
    let total = files.len();

    let sink = Arc::new(JsonlSink::open(&output)?);
    let pool = Arc::new(HashWorkerPool::new(&config, sink));
    tracing::info!(
        "Hashing {} images with {} workers into {:?}",
        total,
        pool.worker_count(),
        output
    );

    let progress = create_progress_bar(total as u64);
    let max = pool.max_queue_size();
    let observer = {
        let progress = progress.clone();
        pool.subscribe(Arc::new(move |level: usize| {
            progress.set_message(buffer_message(level, max));
        }))
    };

    let ticker = {
        let pool = pool.clone();
        let progress = progress.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(100));
            loop {
                interval.tick().await;
                progress.set_position(done(&pool.summary()));
            }
        })
    };

    let interrupt = {
        let pool = pool.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, shutting down the hash worker pool");
                pool.shutdown().await;
            }
        })
    };

    let paths: Vec<PathBuf> = files.into_iter().map(|f| f.path).collect();
    for batch in into_batches(paths, config.pool.batch_size) {
        if let Err(e) = pool.submit(batch).await {
            tracing::warn!("Stopped submitting batches: {e}");
            break;
        }
    }

    pool.wait_idle().await;
    pool.shutdown().await;
    interrupt.abort();
    ticker.abort();
    pool.unsubscribe(observer);

    let stats = pool.summary();
    progress.set_position(done(&stats));
    progress.finish_and_clear();

    Ok(summarize(stats, total, skipped, start.elapsed(), output))
}

fn done(stats: &PoolSummary) -> u64 {
    (stats.images_hashed + stats.images_failed) as u64
}

fn summarize(
    stats: PoolSummary,
    total: usize,
    skipped: usize,
    elapsed: Duration,
    output: PathBuf,
) -> RunSummary {
    let attempted = stats.images_hashed + stats.images_failed;
    RunSummary {
        hashed: stats.images_hashed,
        failed: stats.images_failed,
        skipped,
        interrupted: total.saturating_sub(attempted),
        elapsed,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simage_core::pipeline::DiscoveredFile;
    use simage_core::sink::read_entries;
    use simage_core::{Config, StoredEntry};

    fn discovered(path: PathBuf) -> DiscoveredFile {
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        DiscoveredFile { path, size }
    }

    #[tokio::test]
    async fn test_run_local_writes_records_and_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for i in 0..5u8 {
            let path = dir.path().join(format!("img_{i}.png"));
            image::RgbImage::from_fn(24, 24, |x, y| image::Rgb([i * 40, x as u8, y as u8]))
                .save(&path)
                .unwrap();
            files.push(discovered(path));
        }
        let broken = dir.path().join("broken.jpg");
        std::fs::write(&broken, b"not a jpeg").unwrap();
        files.push(discovered(broken.clone()));

        let mut config = Config::default();
        config.pool.batch_size = 2;
        config.pool.max_queue_size = 1;
        config.pool.workers = 2;
        let output = dir.path().join("out").join("hashes.jsonl");

        let summary = run_local(HashContext {
            config,
            output: output.clone(),
            files,
            skipped: 4,
        })
        .await
        .unwrap();

        assert_eq!(summary.hashed, 5);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 4);
        assert_eq!(summary.interrupted, 0);

        let (entries, skipped_lines) = read_entries(&output).unwrap();
        assert_eq!(skipped_lines, 0);
        let records = entries
            .iter()
            .filter(|e| matches!(e, StoredEntry::Record(_)))
            .count();
        assert_eq!(records, 5);
        assert!(entries
            .iter()
            .any(|e| matches!(e, StoredEntry::BadFile(m) if m.path == broken)));
    }

    #[test]
    fn test_summarize_counts_interrupted() {
        let stats = PoolSummary {
            batches_completed: 1,
            images_hashed: 3,
            images_failed: 1,
            batches_cancelled: 2,
        };
        let summary = summarize(stats, 10, 0, Duration::from_secs(1), PathBuf::new());
        assert_eq!(summary.interrupted, 6);
    }
}
