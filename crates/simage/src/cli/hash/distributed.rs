//! Hashing through the request/result message protocol.
//!
//! Consumers and the producer share an in-process bus here, so a run
//! exercises the same correlation path a remote worker node would.

use simage_core::messaging::{
    HashRequestConsumer, HashRequestProducer, InMemoryBus, MessageTransport, ProducerSummary,
};
use simage_core::{ImageLoader, JsonlSink, PerceptualHasher, RecordSink};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::progress::{create_progress_bar, RunSummary};
use super::HashContext;

/// Send every discovered image as a hash request and record the results.
pub async fn run_distributed(ctx: HashContext) -> anyhow::Result<RunSummary> {
    let HashContext {
        config,
        output,
        files,
        skipped,
    } = ctx;
    let start = Instant::now();
    let total = files.len();
    let messaging = config.messaging.clone();

    let bus = Arc::new(InMemoryBus::new());
    let sink = Arc::new(JsonlSink::open(&output)?);
    let loader = ImageLoader::new(config.limits.clone());
    let hasher = Arc::new(PerceptualHasher::new(&config.hashing));

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut consumers = Vec::with_capacity(messaging.consumers);
    for _ in 0..messaging.consumers {
        let consumer = Arc::new(HashRequestConsumer::new(
            bus.clone(),
            &messaging,
            loader.clone(),
            hasher.clone(),
        ));
        let subscription = bus.subscribe(&messaging.request_address)?;
        consumers.push(tokio::spawn(consumer.run(subscription, stop_rx.clone())));
    }
    tracing::info!(
        "Hashing {} images through {} consumers into {:?}",
        total,
        consumers.len(),
        output
    );

    let producer = Arc::new(HashRequestProducer::new(
        bus.clone(),
        &messaging,
        config.pool.max_queue_size,
        loader,
        sink.clone(),
    ));
    let results = bus.subscribe(&messaging.result_address)?;
    let (sending_tx, sending_rx) = watch::channel(false);
    let collector = {
        let producer = producer.clone();
        tokio::spawn(async move { producer.collect_results(&results, sending_rx).await })
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupt = {
        let bus = bus.clone();
        let producer = producer.clone();
        let interrupted = interrupted.clone();
        let request_address = messaging.request_address.clone();
        let result_address = messaging.result_address.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, closing the message bus");
                interrupted.store(true, Ordering::Release);
                producer.close();
                bus.close(&request_address);
                bus.close(&result_address);
            }
        })
    };

    let progress = create_progress_bar(total as u64);
    for file in files {
        if interrupted.load(Ordering::Acquire) {
            break;
        }
        if let Err(e) = producer.request(&file.path).await {
            tracing::warn!("Stopped sending requests: {e}");
            break;
        }
        progress.inc(1);
        progress.set_message(format!("{} awaiting results", producer.pending()));
    }

    sending_tx.send_replace(true);
    match collector.await {
        Ok(matched) => tracing::debug!("Matched {} results", matched),
        Err(e) => tracing::error!("Result collector failed: {e}"),
    }

    stop_tx.send_replace(true);
    bus.close(&messaging.request_address);
    for handle in consumers {
        if let Err(e) = handle.await {
            tracing::error!("Hash consumer failed: {e}");
        }
    }
    interrupt.abort();
    sink.shutdown();
    progress.finish_and_clear();

    Ok(summarize(
        producer.summary(),
        total,
        skipped,
        start.elapsed(),
        output,
    ))
}

fn summarize(
    stats: ProducerSummary,
    total: usize,
    skipped: usize,
    elapsed: Duration,
    output: PathBuf,
) -> RunSummary {
    let failed = stats.failed + stats.unreadable;
    RunSummary {
        hashed: stats.hashed,
        failed,
        skipped,
        interrupted: total.saturating_sub(stats.hashed + failed),
        elapsed,
        output,
    }
}
