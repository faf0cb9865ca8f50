//! Worker threads.
//!
//! Each worker is an OS thread with its own current-thread tokio runtime and
//! its own trees. The coordinator hands out one job at a time over a
//! per-worker channel and receives results as JSON, so nothing but strings
//! crosses a thread boundary. A worker gets its next job only after
//! reporting the previous one, which keeps fast workers busy.

use super::{run_leaf, ExpectationSet};
use crate::logging::{CaseRecorder, CaseResult};
use crate::options::RunnerOptions;
use crate::query::parse_query;
use crate::registry::TestFileLoader;
use crate::result::{CtsError, CtsResult};
use crate::tree::TestTree;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

/// One case to run: the query of the tree it belongs to and its own query
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub(crate) tree: String,
    pub(crate) case: String,
}

/// Progress of one submitted job, by its index in the submitted list
#[derive(Debug)]
pub(crate) enum JobUpdate {
    /// Handed to a worker
    Started(usize),
    /// Result received from the worker
    Finished(usize, CaseResult),
}

#[derive(Debug)]
struct WorkerEvent {
    worker: usize,
    /// Position of the job in the submitted list
    index: usize,
    /// JSON-encoded `CaseResult`, or why the case could not run
    outcome: Result<String, String>,
}

pub(crate) struct WorkerPool {
    loader: Arc<dyn TestFileLoader>,
    options: RunnerOptions,
    size: usize,
}

impl WorkerPool {
    pub(crate) fn new(
        loader: Arc<dyn TestFileLoader>,
        options: RunnerOptions,
        size: usize,
    ) -> Self {
        Self {
            loader,
            options,
            size: size.max(1),
        }
    }

    /// Run `jobs`, reporting when each starts and finishes
    ///
    /// For [`JobUpdate::Finished`], `on_update` returns whether the case
    /// failed; with fail-fast set no further jobs are handed out after the
    /// first failure.
    pub(crate) async fn run(
        self,
        jobs: Vec<Job>,
        mut on_update: impl FnMut(JobUpdate) -> bool,
    ) -> CtsResult<()> {
        let (event_tx, mut event_rx) = unbounded_channel();
        let workers = self.size.min(jobs.len()).max(1);
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (job_tx, job_rx) = mpsc::channel::<(usize, Job)>();
            let loader = Arc::clone(&self.loader);
            let options = self.options.clone();
            let events = event_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("conformo-worker-{id}"))
                .spawn(move || worker_main(id, loader, options, job_rx, events))?;
            queues.push(Some(job_tx));
            handles.push(handle);
        }
        drop(event_tx);
        tracing::debug!(workers, jobs = jobs.len(), "worker pool started");

        let mut pending = jobs.into_iter().enumerate();
        let mut outstanding = 0usize;
        for (id, queue) in queues.iter_mut().enumerate() {
            if let Some(index) = dispatch(id, queue, &mut pending)? {
                outstanding += 1;
                on_update(JobUpdate::Started(index));
            }
        }

        let mut stopped = false;
        while outstanding > 0 {
            let Some(event) = event_rx.recv().await else {
                return Err(CtsError::WorkerDisconnected {
                    worker: 0,
                    message: format!("all workers exited with {outstanding} cases outstanding"),
                });
            };
            outstanding -= 1;
            let result = match event.outcome {
                Ok(json) => serde_json::from_str::<CaseResult>(&json)?,
                Err(message) => worker_failure(event.worker, &message),
            };
            let failed = on_update(JobUpdate::Finished(event.index, result));
            stopped |= failed && self.options.fail_fast;
            if stopped {
                queues[event.worker] = None;
            } else if let Some(index) =
                dispatch(event.worker, &mut queues[event.worker], &mut pending)?
            {
                outstanding += 1;
                on_update(JobUpdate::Started(index));
            }
        }

        drop(queues);
        for (id, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                tracing::warn!(worker = id, "worker thread panicked");
            }
        }
        Ok(())
    }
}

/// Send the next job to a worker, closing its queue when none are left
///
/// Returns the index of the job sent.
fn dispatch(
    worker: usize,
    queue: &mut Option<mpsc::Sender<(usize, Job)>>,
    pending: &mut impl Iterator<Item = (usize, Job)>,
) -> CtsResult<Option<usize>> {
    let Some(tx) = queue.as_ref() else {
        return Ok(None);
    };
    let Some(job) = pending.next() else {
        *queue = None;
        return Ok(None);
    };
    let index = job.0;
    tx.send(job).map_err(|e| CtsError::WorkerDisconnected {
        worker,
        message: format!("could not send {}", (e.0).1.case),
    })?;
    Ok(Some(index))
}

fn worker_failure(worker: usize, message: &str) -> CaseResult {
    let mut recorder = CaseRecorder::new(false);
    recorder.start();
    recorder.exception(format!("worker {worker}: {message}"), None);
    recorder.finish()
}

fn worker_main(
    id: usize,
    loader: Arc<dyn TestFileLoader>,
    options: RunnerOptions,
    jobs: mpsc::Receiver<(usize, Job)>,
    events: UnboundedSender<WorkerEvent>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(worker = id, error = %e, "could not start worker runtime");
            for (index, _) in jobs.iter() {
                let outcome = Err(format!("runtime unavailable: {e}"));
                let _ = events.send(WorkerEvent {
                    worker: id,
                    index,
                    outcome,
                });
            }
            return;
        }
    };

    let expectations = ExpectationSet::new(options.expectations.clone());
    let mut trees: HashMap<String, TestTree> = HashMap::new();
    while let Ok((index, job)) = jobs.recv() {
        let outcome = runtime
            .block_on(run_job(&loader, &options, &expectations, &mut trees, &job))
            .and_then(|result| serde_json::to_string(&result).map_err(|e| e.to_string()));
        let event = WorkerEvent {
            worker: id,
            index,
            outcome,
        };
        if events.send(event).is_err() {
            break;
        }
    }
    tracing::debug!(worker = id, trees = trees.len(), "worker exiting");
}

async fn run_job(
    loader: &Arc<dyn TestFileLoader>,
    options: &RunnerOptions,
    expectations: &ExpectationSet,
    trees: &mut HashMap<String, TestTree>,
    job: &Job,
) -> Result<CaseResult, String> {
    let tree = match trees.entry(job.tree.clone()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let query = parse_query(&job.tree).map_err(|e| e.to_string())?;
            let tree = TestTree::load(Arc::clone(loader), query)
                .await
                .map_err(|e| e.to_string())?;
            entry.insert(tree)
        }
    };

    let case = parse_query(&job.case).map_err(|e| e.to_string())?;
    let file = case
        .file_query()
        .and_then(|file| tree.find(&file.to_string()))
        .ok_or_else(|| format!("no file node for {}", job.case))?;
    tree.load_subtree(file).await.map_err(|e| e.to_string())?;
    let leaf = tree
        .find(&job.case)
        .ok_or_else(|| format!("{} not found in worker tree", job.case))?;
    Ok(run_leaf(tree, leaf, options, expectations).await)
}
