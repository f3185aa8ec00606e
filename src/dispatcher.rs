use std::{fmt, num::NonZeroUsize, sync::Arc};

use tokio::{
    sync::{Mutex, Semaphore},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    accounts::{Credential, CredentialPool},
    claimer::ClaimClient,
    ledger::{compute_delta, max_seen, Ledger, WorkItem},
    source::WorkSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Diffing,
    Dispatching,
    Draining,
    Cancelling,
    Done,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        matches!(
            (self, next),
            (Idle, Fetching)
                | (Fetching, Diffing)
                | (Fetching, Cancelling)
                | (Fetching, Done)
                | (Diffing, Dispatching)
                | (Diffing, Cancelling)
                | (Diffing, Done)
                | (Dispatching, Draining)
                | (Dispatching, Cancelling)
                | (Draining, Done)
                | (Draining, Cancelling)
                | (Cancelling, Done)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub processed: usize,
    pub succeeded: usize,
}

impl RunStats {
    fn record(&mut self, claimed: bool) {
        self.processed += 1;
        if claimed {
            self.succeeded += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    FetchFailed,
    NothingFetched,
    NoNewItems,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Items handed to the worker pool.
    pub submitted: usize,
    pub stats: RunStats,
    /// Every state visited, `Idle` first and `Done` last.
    pub states: Vec<RunState>,
}

/// State shared by the workers of a single run.
struct RunContext {
    stats: Mutex<RunStats>,
    cancel: CancellationToken,
}

struct StateTrail {
    states: Vec<RunState>,
}

impl StateTrail {
    fn new() -> Self {
        Self {
            states: vec![RunState::Idle],
        }
    }

    fn current(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Idle)
    }

    fn advance(&mut self, next: RunState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {current} -> {next}"
        );
        tracing::debug!("Run state {current} -> {next}");
        self.states.push(next);
    }

    fn finish(mut self, outcome: RunOutcome, submitted: usize, stats: RunStats) -> RunReport {
        self.advance(RunState::Done);
        RunReport {
            outcome,
            submitted,
            stats,
            states: self.states,
        }
    }
}

pub struct Dispatcher<S, C> {
    source: S,
    ledger: Ledger,
    pool: Arc<CredentialPool>,
    client: Arc<C>,
    concurrency: NonZeroUsize,
    cancel: CancellationToken,
}

impl<S, C> Dispatcher<S, C>
where
    S: WorkSource,
    C: ClaimClient,
{
    pub fn new(
        source: S,
        ledger: Ledger,
        pool: CredentialPool,
        client: C,
        concurrency: NonZeroUsize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            ledger,
            pool: Arc::new(pool),
            client: Arc::new(client),
            concurrency,
            cancel,
        }
    }

    /// Fetch, diff against the ledger, persist the delta and claim every new item.
    pub async fn run(&self) -> RunReport {
        let mut trail = StateTrail::new();

        tracing::info!("Starting claim run");
        trail.advance(RunState::Fetching);

        let remote = match self.source.fetch().await {
            Ok(remote) if remote.is_empty() => {
                tracing::warn!("Work source returned no usernames, nothing to process");
                return trail.finish(RunOutcome::NothingFetched, 0, RunStats::default());
            }
            Ok(remote) => remote,
            Err(e) => {
                tracing::error!("Failed to fetch usernames, stopping: {e}");
                return trail.finish(RunOutcome::FetchFailed, 0, RunStats::default());
            }
        };

        if self.cancel.is_cancelled() {
            return Self::cancel_before_dispatch(trail);
        }

        trail.advance(RunState::Diffing);

        let previous = self.ledger.load().await.unwrap_or_else(|e| {
            tracing::warn!("{e}. Treating ledger as empty");
            vec![]
        });
        tracing::info!("Highest number already seen: {}", max_seen(&previous));

        let delta = compute_delta(&remote, &previous);
        if delta.is_empty() {
            tracing::info!("No new usernames to process");
            return trail.finish(RunOutcome::NoNewItems, 0, RunStats::default());
        }

        // The ledger must not mark items seen that this run will never attempt.
        if self.cancel.is_cancelled() {
            return Self::cancel_before_dispatch(trail);
        }

        trail.advance(RunState::Dispatching);

        match self.ledger.persist(&delta).await {
            Ok(()) => tracing::info!(
                "Found {} new usernames, saved to {}",
                delta.len(),
                self.ledger.path().display()
            ),
            Err(e) => tracing::error!("{e}. Continuing with {} new usernames", delta.len()),
        }

        let total = delta.len();
        let context = Arc::new(RunContext {
            stats: Mutex::new(RunStats::default()),
            cancel: self.cancel.clone(),
        });

        tracing::info!(
            "Claiming {total} usernames with {} workers and {} accounts",
            self.concurrency,
            self.pool.len()
        );

        let (submitted, workers) = self.submit_all(delta, &context).await;

        if context.cancel.is_cancelled() {
            trail.advance(RunState::Cancelling);
        } else {
            trail.advance(RunState::Draining);
        }

        let failed_workers = self.drain(workers).await;

        if context.cancel.is_cancelled() && trail.current() != RunState::Cancelling {
            trail.advance(RunState::Cancelling);
        }

        let mut stats = *context.stats.lock().await;
        if failed_workers > 0 {
            tracing::warn!("{failed_workers} claim workers failed, counting them as failed claims");
            stats.processed += failed_workers;
        }

        if trail.current() == RunState::Cancelling {
            tracing::warn!(
                "Run interrupted after {} of {total} usernames ({} succeeded), results are incomplete",
                stats.processed,
                stats.succeeded
            );
            return trail.finish(RunOutcome::Cancelled, submitted, stats);
        }

        tracing::info!("Claiming finished! Succeeded: {}/{total}", stats.succeeded);
        trail.finish(RunOutcome::Completed, submitted, stats)
    }

    /// Hands items to the pool in order, at most `concurrency` in flight. Stops
    /// submitting once cancelled.
    async fn submit_all(
        &self,
        delta: Vec<WorkItem>,
        context: &Arc<RunContext>,
    ) -> (usize, JoinSet<()>) {
        let permits = Arc::new(Semaphore::new(self.concurrency.get()));
        let mut workers = JoinSet::new();
        let mut submitted = 0;

        for (slot, item) in delta.into_iter().enumerate() {
            if context.cancel.is_cancelled() {
                break;
            }

            let permit = tokio::select! {
                biased;
                _ = context.cancel.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let credential = self.pool.assign(slot).clone();
            let client = Arc::clone(&self.client);
            let context = Arc::clone(context);

            workers.spawn(async move {
                let _permit = permit;
                process_item(client.as_ref(), &context, item, credential).await;
            });
            submitted += 1;
        }

        (submitted, workers)
    }

    /// Waits for every submitted worker. Returns how many died before recording a result.
    async fn drain(&self, mut workers: JoinSet<()>) -> usize {
        let mut failed = 0;

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("Claim worker failed: {e}");
                failed += 1;
            }
        }

        failed
    }

    fn cancel_before_dispatch(mut trail: StateTrail) -> RunReport {
        tracing::warn!("Run interrupted before claiming, ledger left untouched");
        trail.advance(RunState::Cancelling);
        trail.finish(RunOutcome::Cancelled, 0, RunStats::default())
    }
}

async fn process_item<C: ClaimClient>(
    client: &C,
    context: &RunContext,
    item: WorkItem,
    credential: Credential,
) {
    if context.cancel.is_cancelled() {
        tracing::debug!("Skipping #{} - {}, run cancelled", item.number, item.identifier);
        return;
    }

    let claimed = client.claim(&item.identifier, &credential).await;

    let mut stats = context.stats.lock().await;
    stats.record(claimed);

    if claimed {
        tracing::info!(
            "#{} - {} - claim succeeded ({})",
            item.number,
            item.identifier,
            credential.label()
        );
    } else {
        tracing::warn!(
            "#{} - {} - claim failed ({})",
            item.number,
            item.identifier,
            credential.label()
        );
    }
}
