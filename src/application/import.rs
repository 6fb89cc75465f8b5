use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::config::{DEFAULT_WORKERS, MAX_WORKERS};
use crate::domain::{ImportItem, ImportSummary, NewTransaction};

use super::{AppError, BudgetEnforcer, ErrorKind, Scope};

/// Resolve a caller-supplied worker count: non-positive values fall back
/// to `default_workers`, everything is clamped to `[1, MAX_WORKERS]`.
pub fn clamp_workers(requested: i32, default_workers: usize) -> usize {
    let workers = if requested <= 0 {
        default_workers
    } else {
        requested as usize
    };
    workers.clamp(1, MAX_WORKERS)
}

struct Job {
    index: usize,
    transaction: NewTransaction,
}

struct ItemOutcome {
    index: usize,
    result: Result<(), String>,
}

/// Applies budget-gated inserts to a batch with bounded parallelism.
///
/// Items are dispatched in input order through a bounded queue shared by
/// the workers; each processed item yields exactly one outcome, collected
/// by a single aggregator. Completion order is unspecified.
#[derive(Clone)]
pub struct ImportPipeline {
    enforcer: BudgetEnforcer,
    default_workers: usize,
}

impl ImportPipeline {
    pub fn new(enforcer: BudgetEnforcer) -> Self {
        Self {
            enforcer,
            default_workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_default_workers(mut self, default_workers: usize) -> Self {
        self.default_workers = default_workers;
        self
    }

    /// Run the batch to completion or until `scope` is interrupted.
    ///
    /// On interruption, items already picked up by a worker still finish
    /// and are counted; the returned `AppError::ImportAborted` carries that
    /// partial summary. Items still waiting in the job queue, or never
    /// dispatched, are absent from it.
    pub async fn run(
        &self,
        scope: &Scope,
        items: Vec<ImportItem>,
        workers: i32,
    ) -> Result<ImportSummary, AppError> {
        let total = items.len();
        let workers = clamp_workers(workers, self.default_workers);
        tracing::info!(items = total, workers, "bulk import started");

        let (job_tx, job_rx) = mpsc::channel::<Job>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<ItemOutcome>(workers);

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            tasks.spawn(work(
                worker_id,
                self.enforcer.clone(),
                scope.clone(),
                Arc::clone(&job_rx),
                result_tx.clone(),
            ));
        }
        tasks.spawn(dispatch(items, scope.clone(), job_tx, result_tx));

        // Closes once the dispatcher and every worker have returned
        let mut summary = ImportSummary::default();
        while let Some(outcome) = result_rx.recv().await {
            match outcome.result {
                Ok(()) => summary.record_accepted(),
                Err(error) => summary.record_rejected(outcome.index, error),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "import task failed");
            }
        }

        let processed = summary.processed() as usize;
        if processed < total {
            if let Some(reason) = scope.interrupted() {
                tracing::info!(
                    accepted = summary.accepted,
                    rejected = summary.rejected,
                    total,
                    %reason,
                    "bulk import interrupted"
                );
                return Err(AppError::ImportAborted {
                    partial: summary,
                    reason,
                    total,
                });
            }
            return Err(AppError::Internal(format!(
                "import lost results: {} of {} items reported",
                processed, total
            )));
        }

        tracing::info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            "bulk import finished"
        );
        Ok(summary)
    }
}

/// Feed jobs in input order. Pre-parse failures go straight to the
/// aggregator without occupying a worker.
async fn dispatch(
    items: Vec<ImportItem>,
    scope: Scope,
    jobs: mpsc::Sender<Job>,
    results: mpsc::Sender<ItemOutcome>,
) {
    for item in items {
        if scope.interrupted().is_some() {
            break;
        }
        match item.parsed {
            Err(reason) => {
                let outcome = ItemOutcome {
                    index: item.index,
                    result: Err(reason),
                };
                if results.send(outcome).await.is_err() {
                    break;
                }
            }
            Ok(transaction) => {
                let job = Job {
                    index: item.index,
                    transaction,
                };
                tokio::select! {
                    biased;
                    _ = scope.done() => break,
                    sent = jobs.send(job) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn work(
    worker_id: usize,
    enforcer: BudgetEnforcer,
    scope: Scope,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<ItemOutcome>,
) {
    loop {
        let job = {
            let mut jobs = jobs.lock().await;
            tokio::select! {
                biased;
                _ = scope.done() => None,
                job = jobs.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };

        let result = admit(&enforcer, job.transaction).await;
        if let Err(error) = &result {
            tracing::debug!(worker_id, index = job.index, %error, "import item rejected");
        }
        let outcome = ItemOutcome {
            index: job.index,
            result,
        };
        if results.send(outcome).await.is_err() {
            break;
        }
    }
}

async fn admit(enforcer: &BudgetEnforcer, transaction: NewTransaction) -> Result<(), String> {
    let admitted = match transaction.validate() {
        Ok(()) => enforcer.try_add(transaction).await.map(|_| ()),
        Err(err) => Err(AppError::from(err)),
    };
    admitted.map_err(|err| match err.kind() {
        ErrorKind::Internal => {
            tracing::error!(error = %err, "import item failed");
            "internal error".to_string()
        }
        _ => err.to_string(),
    })
}
