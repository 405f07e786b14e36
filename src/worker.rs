//! Transform worker
//!
//! Parsing and folding raw frames runs on a dedicated thread so the event
//! loop never blocks on it. Results come back as events on the loop's
//! channel, tagged with the generation they were computed under. Frames
//! that queue up while the worker is busy yield a single result.

use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::instrument::Generation;
use crate::orderbook::{BookTransform, ConsolidatedUpdate};

/// Raw frame handed to the worker
#[derive(Debug, Clone)]
pub struct TransformJob {
    pub generation: Generation,
    pub raw: String,
}

/// Consolidated update produced for a job
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub generation: Generation,
    pub update: ConsolidatedUpdate,
}

/// Fire-and-forget hand-off of raw frames
pub trait TransformDispatch: Send {
    fn dispatch(&self, job: TransformJob);
}

/// Runs a [`BookTransform`] on its own OS thread
pub struct TransformWorker {
    jobs: std_mpsc::Sender<TransformJob>,
}

impl TransformWorker {
    /// Start the worker thread; it exits once the worker is dropped or the
    /// result channel closes
    pub fn spawn<T, E>(transform: T, results: mpsc::UnboundedSender<E>) -> Result<Self>
    where
        T: BookTransform,
        E: From<TransformOutput> + Send + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        thread::Builder::new()
            .name("book-transform".to_string())
            .spawn(move || run_worker(transform, rx, results))?;

        Ok(Self { jobs: tx })
    }
}

impl TransformDispatch for TransformWorker {
    fn dispatch(&self, job: TransformJob) {
        if self.jobs.send(job).is_err() {
            warn!("Transform worker stopped, frame dropped");
        }
    }
}

fn run_worker<T, E>(
    mut transform: T,
    jobs: std_mpsc::Receiver<TransformJob>,
    results: mpsc::UnboundedSender<E>,
) where
    T: BookTransform,
    E: From<TransformOutput>,
{
    info!("Transform worker started");
    let mut generation: Option<Generation> = None;

    while let Ok(first) = jobs.recv() {
        // Every queued frame is folded in order; only the newest result is posted
        let mut latest: Option<TransformOutput> = None;
        let mut superseded = 0usize;

        for job in std::iter::once(first).chain(jobs.try_iter()) {
            if generation != Some(job.generation) {
                debug!(generation = %job.generation, "New generation, resetting transform");
                transform.reset();
                generation = Some(job.generation);
            }

            match transform.transform(&job.raw) {
                Ok(Some(update)) => {
                    if latest.is_some() {
                        superseded += 1;
                    }
                    latest = Some(TransformOutput {
                        generation: job.generation,
                        update,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to transform frame"),
            }
        }

        if superseded > 0 {
            debug!(superseded, "Coalesced transform results");
        }
        if let Some(output) = latest {
            if results.send(output.into()).is_err() {
                break;
            }
        }
    }

    info!("Transform worker stopped");
}
