//! Thumbnail worker queue.
//!
//! A small pool of threads renders thumbnails through the shared cache. Jobs
//! go in over a bounded flume channel; whatever does not fit waits in a
//! backlog that is fed to the channel as workers free up. Results come back
//! on an unbounded channel that the UI drains from the GLib main loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use flume::{Receiver, Sender, TrySendError};
use image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::cache::ThumbnailCache;
use super::generator::{ThumbBox, ThumbnailSource};

pub const DEFAULT_WORKERS: usize = 2;

const MAX_WORKERS: usize = 4;

/// Jobs handed to workers ahead of time; the rest wait in the backlog.
pub const DEFAULT_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct ThumbnailJob {
    /// Caller-chosen id echoed back in the result.
    pub ticket: u64,
    pub source: ThumbnailSource,
    pub bbox: ThumbBox,
}

#[derive(Debug, Clone)]
pub enum ThumbnailOutcome {
    Image(Arc<RgbaImage>),
    Blank,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ThumbnailReady {
    pub ticket: u64,
    pub outcome: ThumbnailOutcome,
}

pub struct ThumbnailQueue {
    request_tx: Option<Sender<ThumbnailJob>>,
    backlog: Mutex<VecDeque<ThumbnailJob>>,
    result_rx: Receiver<ThumbnailReady>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    cache: ThumbnailCache,
}

impl ThumbnailQueue {
    pub fn new(workers: usize, queue_size: usize, cache: ThumbnailCache) -> anyhow::Result<Self> {
        let num_workers = workers.clamp(1, MAX_WORKERS);

        let (request_tx, request_rx) = flume::bounded(queue_size.max(1));
        let (result_tx, result_rx) = flume::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let rx = request_rx.clone();
            let tx = result_tx.clone();
            let shutdown = Arc::clone(&shutdown);
            let cache = cache.clone();

            let handle = thread::Builder::new()
                .name(format!("thumb-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, tx, shutdown, cache))
                .context("Failed to spawn thumbnail worker")?;
            handles.push(handle);
        }

        debug!(num_workers, queue_size, "Started thumbnail worker queue");

        Ok(Self {
            request_tx: Some(request_tx),
            backlog: Mutex::new(VecDeque::new()),
            result_rx,
            workers: handles,
            shutdown,
            cache,
        })
    }

    /// Queues a job behind everything already waiting. Returns false only
    /// once the queue is shut down.
    pub fn submit(&self, job: ThumbnailJob) -> bool {
        if self.request_tx.is_none() {
            return false;
        }
        self.backlog.lock().push_back(job);
        self.feed_workers();
        true
    }

    /// Queues a job ahead of the backlog.
    pub fn submit_next(&self, job: ThumbnailJob) -> bool {
        if self.request_tx.is_none() {
            return false;
        }
        self.backlog.lock().push_front(job);
        self.feed_workers();
        true
    }

    /// Moves backlog jobs into the channel until it is full.
    fn feed_workers(&self) {
        let Some(tx) = self.request_tx.as_ref() else {
            return;
        };
        let mut backlog = self.backlog.lock();
        while let Some(job) = backlog.pop_front() {
            match tx.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    backlog.push_front(job);
                    trace!(waiting = backlog.len(), "Thumbnail workers busy");
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    error!("Thumbnail queue disconnected");
                    backlog.clear();
                    break;
                }
            }
        }
    }

    /// Finished jobs so far (non-blocking). Also refills the workers from the
    /// backlog.
    pub fn poll_results(&self) -> Vec<ThumbnailReady> {
        let results = self.result_rx.try_iter().collect();
        self.feed_workers();
        results
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    pub fn shutdown(&mut self) {
        debug!("Shutting down thumbnail queue");
        self.shutdown.store(true, Ordering::SeqCst);
        self.backlog.lock().clear();
        // Dropping the sender wakes idle workers
        self.request_tx = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("Thumbnail queue shutdown complete");
    }
}

impl Drop for ThumbnailQueue {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<ThumbnailJob>,
    tx: Sender<ThumbnailReady>,
    shutdown: Arc<AtomicBool>,
    cache: ThumbnailCache,
) {
    debug!(worker_id, "Thumbnail worker started");

    while let Ok(job) = rx.recv() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let ready = process_job(&job, &cache);
        if tx.send(ready).is_err() {
            break;
        }
    }

    debug!(worker_id, "Thumbnail worker stopped");
}

fn process_job(job: &ThumbnailJob, cache: &ThumbnailCache) -> ThumbnailReady {
    trace!(ticket = job.ticket, "Processing thumbnail job");

    let outcome = match cache.get_or_generate(&job.source, job.bbox) {
        Ok(Some(image)) => ThumbnailOutcome::Image(image),
        Ok(None) => ThumbnailOutcome::Blank,
        Err(e) => {
            warn!(ticket = job.ticket, error = ?e, "Failed to open image");
            ThumbnailOutcome::Failed(format!("{:#}", e))
        }
    };

    ThumbnailReady {
        ticket: job.ticket,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thumbnails::generator::GRID_BOX;
    use image::{ImageFormat, Rgba};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn collect(queue: &ThumbnailQueue, count: usize) -> HashMap<u64, ThumbnailOutcome> {
        let deadline = Instant::now() + Duration::from_secs(30);
        let mut results = HashMap::new();
        while results.len() < count {
            assert!(Instant::now() < deadline, "only {} of {} results", results.len(), count);
            for ready in queue.poll_results() {
                results.insert(ready.ticket, ready.outcome);
            }
            thread::sleep(Duration::from_millis(5));
        }
        results
    }

    fn write_png(path: &std::path::Path, w: u32, h: u32) {
        let img = RgbaImage::from_pixel(w, h, Rgba([1, 1, 1, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        std::fs::write(path, out.into_inner()).unwrap();
    }

    #[test]
    fn test_jobs_round_trip_with_tickets() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.png");
        write_png(&src, 64, 32);

        let cache = ThumbnailCache::new(dir.path().join("thumbs"), 16);
        let queue = ThumbnailQueue::new(DEFAULT_WORKERS, DEFAULT_QUEUE_SIZE, cache).unwrap();

        for (ticket, source) in [
            (1, ThumbnailSource::File(src)),
            (2, ThumbnailSource::Blank),
            (3, ThumbnailSource::File(dir.path().join("missing.png"))),
        ] {
            assert!(queue.submit(ThumbnailJob {
                ticket,
                source,
                bbox: GRID_BOX,
            }));
        }

        assert!(queue.submit_next(ThumbnailJob {
            ticket: 4,
            source: ThumbnailSource::Blank,
            bbox: GRID_BOX,
        }));

        let results = collect(&queue, 4);
        assert!(matches!(results[&4], ThumbnailOutcome::Blank));
        match &results[&1] {
            ThumbnailOutcome::Image(image) => assert_eq!(image.dimensions(), (320, 160)),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(results[&2], ThumbnailOutcome::Blank));
        assert!(matches!(results[&3], ThumbnailOutcome::Failed(_)));
    }

    #[test]
    fn test_jobs_beyond_capacity_wait_instead_of_dropping() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("big.png");
        write_png(&src, 600, 600);

        let cache = ThumbnailCache::new(dir.path().join("thumbs"), 16);
        let queue = ThumbnailQueue::new(1, 2, cache).unwrap();

        let jobs = 200;
        for ticket in 1..=jobs {
            assert!(queue.submit(ThumbnailJob {
                ticket,
                source: ThumbnailSource::File(src.clone()),
                bbox: GRID_BOX,
            }));
        }
        assert!(queue.backlog.lock().len() > 0);

        let results = collect(&queue, jobs as usize);
        assert_eq!(results.len(), jobs as usize);
        assert!(results
            .values()
            .all(|outcome| matches!(outcome, ThumbnailOutcome::Image(_))));
        assert_eq!(queue.backlog.lock().len(), 0);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let dir = tempdir().unwrap();
        let cache = ThumbnailCache::new(dir.path().to_path_buf(), 16);
        let mut queue = ThumbnailQueue::new(1, DEFAULT_QUEUE_SIZE, cache).unwrap();
        queue.shutdown();
        let job = ThumbnailJob {
            ticket: 9,
            source: ThumbnailSource::Blank,
            bbox: GRID_BOX,
        };
        assert!(!queue.submit(job.clone()));
        assert!(!queue.submit_next(job));
        assert!(queue.poll_results().is_empty());
        assert_eq!(queue.backlog.lock().len(), 0);
    }
}
