// src/engine/dispatcher.rs
// =============================================================================
// Runs one batch of identifiers through a checker.
//
// How it works:
// 1. Every identifier becomes a pending job in a shared queue (input order)
// 2. A bounded set of workers pulls the next ready job from the queue
// 3. A job is validated locally, then budgeted by the rate limiter, then
//    looked up (one network call)
// 4. Retryable failures go back to the end of the queue with a not-before
//    instant; the worker moves on instead of sleeping on it
// 5. Outcomes are stored by original index, so the aggregate comes back in
//    input order no matter which lookup finished first
//
// Cancellation drops whatever lookups are in flight. Identifiers without a
// final verdict at that point come back as Unknown/cancelled.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::limiter::RateLimiter;
use super::retry::{RetryDecision, RetryPolicy};
use crate::checker::{validate_context, CheckContext, Checker, FailureKind, ProbeResult};
use crate::error::EngineError;
use crate::outcome::{CheckOutcome, Diagnostic, DiagnosticKind, Progress, ResultAggregate, Verdict};

/// Upper bound on workers when no explicit concurrency is given.
pub const MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Concurrent,
    /// One worker, one lookup at a time.
    Sequential,
}

/// Ordered identifiers plus the context shared by all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub identifiers: Vec<String>,
    pub context: CheckContext,
}

impl Batch {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
            context: CheckContext::default(),
        }
    }

    pub fn with_context(mut self, context: CheckContext) -> Self {
        self.context = context;
        self
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOptions {
    pub mode: Mode,
    /// Worker count in concurrent mode; defaults to MAX_CONCURRENCY.
    pub concurrency: Option<usize>,
}

impl DispatchOptions {
    pub fn sequential() -> Self {
        Self {
            mode: Mode::Sequential,
            concurrency: None,
        }
    }

    pub fn concurrent(limit: usize) -> Self {
        Self {
            mode: Mode::Concurrent,
            concurrency: Some(limit),
        }
    }

    /// Workers to spawn for a batch of `batch_len` identifiers (never 0).
    pub fn worker_count(&self, batch_len: usize) -> usize {
        let limit = match self.mode {
            Mode::Sequential => 1,
            Mode::Concurrent => self.concurrency.unwrap_or(MAX_CONCURRENCY),
        };
        limit.min(batch_len).max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Job {
    index: usize,
    not_before: Option<Instant>,
}

enum Next {
    Ready(Job),
    WaitUntil(Instant),
    Idle,
}

#[derive(Default)]
struct Slot {
    attempts: u32,
    started: Option<Instant>,
    outcome: Option<CheckOutcome>,
}

struct RunState<'a> {
    batch: &'a Batch,
    queue: Mutex<VecDeque<Job>>,
    slots: Mutex<Vec<Slot>>,
    remaining: AtomicUsize,
    wake: Notify,
}

// Neither lock is held across an await, so a poisoned lock still holds
// consistent data
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<'a> RunState<'a> {
    fn new(batch: &'a Batch) -> Self {
        let queue = (0..batch.len())
            .map(|index| Job {
                index,
                not_before: None,
            })
            .collect();
        Self {
            batch,
            queue: Mutex::new(queue),
            slots: Mutex::new((0..batch.len()).map(|_| Slot::default()).collect()),
            remaining: AtomicUsize::new(batch.len()),
            wake: Notify::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) == 0
    }

    // Takes the first job whose not-before instant has passed
    fn next_job(&self, now: Instant) -> Next {
        let mut queue = lock(&self.queue);
        let ready = queue
            .iter()
            .position(|job| job.not_before.map_or(true, |at| at <= now));

        match ready {
            Some(position) => queue.remove(position).map_or(Next::Idle, Next::Ready),
            None => queue
                .iter()
                .filter_map(|job| job.not_before)
                .min()
                .map_or(Next::Idle, Next::WaitUntil),
        }
    }

    fn requeue(&self, job: Job) {
        lock(&self.queue).push_back(job);
        self.wake.notify_waiters();
    }

    // Marks a lookup as started and returns the attempt number
    fn begin_attempt(&self, index: usize) -> u32 {
        let mut slots = lock(&self.slots);
        let slot = &mut slots[index];
        slot.started.get_or_insert_with(Instant::now);
        slot.attempts += 1;
        slot.attempts
    }

    fn attempts(&self, index: usize) -> u32 {
        lock(&self.slots)[index].attempts
    }

    // Stores the one and only outcome for `index`
    fn finish(&self, index: usize, verdict: Verdict, diagnostic: Option<Diagnostic>) -> Option<CheckOutcome> {
        let outcome = {
            let mut slots = lock(&self.slots);
            let slot = &mut slots[index];
            if slot.outcome.is_some() {
                return None;
            }
            let outcome = CheckOutcome {
                identifier: self.batch.identifiers[index].clone(),
                verdict,
                diagnostic,
                attempts: slot.attempts,
                latency: slot.started.map_or(Duration::ZERO, |started| started.elapsed()),
            };
            slot.outcome = Some(outcome.clone());
            outcome
        };

        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.wake.notify_waiters();
        }
        Some(outcome)
    }
}

/// Drives a checker over batches of identifiers.
pub struct Dispatcher {
    checker: Arc<dyn Checker>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    options: DispatchOptions,
    progress: Option<mpsc::UnboundedSender<Progress>>,
    cancel: CancelToken,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &self.checker.kind())
            .field("policy", &self.policy)
            .field("options", &self.options)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(checker: Arc<dyn Checker>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            checker,
            limiter,
            policy: RetryPolicy::default(),
            options: DispatchOptions::default(),
            progress: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Sends one `Progress` event per identifier as soon as it is final.
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Checks every identifier of `batch` and returns the outcomes in input order.
    ///
    /// # Errors
    ///
    /// Only for a context the checker cannot use (e.g. a repository batch
    /// without an owner). Those are reported before any lookup is made.
    /// Per-identifier failures end up as verdicts, never as errors.
    pub async fn run(&self, batch: &Batch) -> Result<ResultAggregate, EngineError> {
        if batch.is_empty() {
            return Ok(ResultAggregate::default());
        }
        validate_context(self.checker.kind(), &batch.context)?;

        let workers = self.options.worker_count(batch.len());
        info!(
            kind = %self.checker.kind(),
            identifiers = batch.len(),
            workers,
            mode = ?self.options.mode,
            "starting batch"
        );

        let state = RunState::new(batch);
        futures::future::join_all((0..workers).map(|id| self.worker(id, &state))).await;

        // Whatever has no outcome yet was cut short by cancellation
        let pending: Vec<usize> = lock(&state.slots)
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.outcome.is_none())
            .map(|(index, _)| index)
            .collect();
        if !pending.is_empty() {
            warn!(unfinished = pending.len(), "batch cancelled");
        }
        for index in pending {
            self.record(&state, index, Verdict::Unknown, Some(Diagnostic::cancelled()));
        }

        let slots = state.slots.into_inner().unwrap_or_else(PoisonError::into_inner);
        let outcomes: Vec<CheckOutcome> = slots.into_iter().filter_map(|slot| slot.outcome).collect();
        let aggregate = ResultAggregate::new(outcomes);

        info!(
            available = aggregate.count(Verdict::Available),
            taken = aggregate.count(Verdict::Taken),
            invalid = aggregate.count(Verdict::Invalid),
            unknown = aggregate.count(Verdict::Unknown),
            "batch finished"
        );
        Ok(aggregate)
    }

    async fn worker(&self, id: usize, state: &RunState<'_>) {
        loop {
            if state.is_done() || self.cancel.is_cancelled() {
                return;
            }

            // Register for wake-ups before looking at the queue so a requeue
            // or completion between the check and the wait isn't missed
            let notified = state.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match state.next_job(Instant::now()) {
                Next::Ready(job) => self.process(id, job, state).await,
                Next::WaitUntil(at) => {
                    tokio::select! {
                        _ = sleep_until(at) => {}
                        _ = notified.as_mut() => {}
                        _ = self.cancel.cancelled() => return,
                    }
                }
                Next::Idle => {
                    tokio::select! {
                        _ = notified.as_mut() => {}
                        _ = self.cancel.cancelled() => return,
                    }
                }
            }
        }
    }

    async fn process(&self, worker: usize, job: Job, state: &RunState<'_>) {
        let identifier = state.batch.identifiers[job.index].as_str();
        let service = self.checker.kind().service();

        if let Err(reason) = self.checker.validate(identifier) {
            debug!(worker, identifier, %reason, "rejected locally");
            self.record(
                state,
                job.index,
                Verdict::Invalid,
                Some(Diagnostic::new(DiagnosticKind::MalformedIdentifier, reason.to_string())),
            );
            return;
        }

        let lookup = async {
            let permit = self.limiter.acquire(service).await;
            let attempt = state.begin_attempt(job.index);
            debug!(worker, identifier, attempt, "lookup");
            let result = self.checker.lookup(identifier, &state.batch.context).await;
            self.limiter.release(permit);
            result
        };

        // Losing the race to cancellation drops the lookup mid-flight
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            result = lookup => result,
        };

        let failure = match result {
            ProbeResult::Confirmed { verdict, diagnostic } => {
                self.record(state, job.index, verdict, diagnostic);
                return;
            }
            ProbeResult::Failed(failure) => failure,
        };

        // The service's budget is exhausted for everyone, whatever happens to
        // this identifier
        if failure.kind == FailureKind::RateLimited {
            if let Some(hint) = failure.retry_after {
                self.limiter.pause(service, hint).await;
            }
        }

        let attempt = state.attempts(job.index);
        match self.policy.decide(attempt, &failure) {
            RetryDecision::RetryAfter(delay) => {
                debug!(
                    worker,
                    identifier,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %failure.diagnostic,
                    "retry scheduled"
                );
                state.requeue(Job {
                    index: job.index,
                    not_before: Some(Instant::now() + delay),
                });
            }
            RetryDecision::GiveUp => {
                warn!(identifier, attempt, reason = %failure.diagnostic, "giving up");
                self.record(state, job.index, Verdict::Unknown, Some(failure.diagnostic));
            }
        }
    }

    fn record(&self, state: &RunState<'_>, index: usize, verdict: Verdict, diagnostic: Option<Diagnostic>) {
        let Some(outcome) = state.finish(index, verdict, diagnostic) else {
            return;
        };
        if let Some(progress) = &self.progress {
            // The receiver may have gone away; the aggregate still has everything
            let _ = progress.send(Progress {
                index,
                identifier: outcome.identifier,
                verdict: outcome.verdict,
                attempts: outcome.attempts,
            });
        }
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why not just sleep inside the worker before a retry?
//    - A sleeping worker does nothing else. With one worker (--sync) every
//      other identifier would wait behind the retry
//    - Putting the job back with a not-before instant lets the worker pick
//      up something that is ready now
//
// 2. What is tokio::sync::Notify?
//    - A way for one task to wake others without sending data
//    - notified().enable() registers interest before we look at the queue,
//      so a wake-up that happens in between is not lost
//
// 3. What does `biased;` in select! mean?
//    - Branches are checked top to bottom instead of randomly
//    - Cancellation is checked first, so a cancelled run never starts a
//      new lookup
//
// 4. Why std::sync::Mutex and not tokio's here?
//    - The queue and slots are only locked for a few instructions and never
//      across an .await, so the cheaper blocking mutex is fine
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{validate, CheckKind, InvalidIdentifier, ProbeFailure};
    use crate::engine::{RateBudget, Service};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;

    // Answers from a fixed table; unknown names fail transiently
    struct TableChecker {
        answers: HashMap<&'static str, ProbeResult>,
        lookups: AtomicU32,
    }

    impl TableChecker {
        fn new(answers: Vec<(&'static str, ProbeResult)>) -> Arc<Self> {
            Arc::new(Self {
                answers: answers.into_iter().collect(),
                lookups: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Checker for TableChecker {
        fn kind(&self) -> CheckKind {
            CheckKind::GitHubUsername
        }

        fn validate(&self, identifier: &str) -> Result<(), InvalidIdentifier> {
            validate::validate_username(identifier)
        }

        async fn lookup(&self, identifier: &str, _context: &CheckContext) -> ProbeResult {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.answers.get(identifier).cloned().unwrap_or_else(|| {
                ProbeResult::Failed(ProbeFailure::transient(DiagnosticKind::Timeout, "request timed out"))
            })
        }
    }

    fn unlimited() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new([]))
    }

    fn found() -> ProbeResult {
        ProbeResult::confirmed(Verdict::Taken, Diagnostic::http(200))
    }

    fn not_found() -> ProbeResult {
        ProbeResult::confirmed(Verdict::Available, Diagnostic::http(404))
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(DispatchOptions::default().worker_count(3), 3);
        assert_eq!(DispatchOptions::default().worker_count(50), MAX_CONCURRENCY);
        assert_eq!(DispatchOptions::concurrent(25).worker_count(50), 25);
        assert_eq!(DispatchOptions::concurrent(0).worker_count(5), 1);
        assert_eq!(DispatchOptions::sequential().worker_count(50), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_empty_aggregate() {
        let checker = TableChecker::new(vec![]);
        let aggregate = Dispatcher::new(checker, unlimited())
            .run(&Batch::default())
            .await
            .unwrap();
        assert!(aggregate.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_gives_up() {
        let checker = TableChecker::new(vec![]);
        let dispatcher = Dispatcher::new(checker.clone(), unlimited());

        let aggregate = dispatcher.run(&Batch::new(["flaky"])).await.unwrap();
        let outcome = &aggregate.outcomes()[0];

        assert_eq!(outcome.verdict, Verdict::Unknown);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.diagnostic.as_ref().unwrap().kind, DiagnosticKind::Timeout);
        assert_eq!(checker.lookups.load(Ordering::SeqCst), 3);
        // 500ms + 1s of backoff between the three attempts
        assert!(outcome.latency >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_block_other_identifiers() {
        let checker = TableChecker::new(vec![("octocat", found())]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(checker, unlimited())
            .with_options(DispatchOptions::sequential())
            .with_progress(tx);

        let aggregate = dispatcher.run(&Batch::new(["flaky", "octocat"])).await.unwrap();
        assert_eq!(aggregate.outcomes()[1].verdict, Verdict::Taken);

        // With one worker, octocat still finishes while flaky waits on backoff
        let first = rx.recv().await.unwrap();
        assert_eq!(first.identifier, "octocat");
        assert_eq!(first.index, 1);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.identifier, "flaky");
        assert_eq!(second.verdict, Verdict::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_pauses_service() {
        struct LimitedOnce {
            calls: AtomicU32,
        }

        #[async_trait]
        impl Checker for LimitedOnce {
            fn kind(&self) -> CheckKind {
                CheckKind::GitHubUsername
            }

            fn validate(&self, _identifier: &str) -> Result<(), InvalidIdentifier> {
                Ok(())
            }

            async fn lookup(&self, _identifier: &str, _context: &CheckContext) -> ProbeResult {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    ProbeResult::Failed(ProbeFailure::rate_limited("HTTP 429", Some(Duration::from_secs(20))))
                } else {
                    ProbeResult::confirmed(Verdict::Available, Diagnostic::http(404))
                }
            }
        }

        let limiter = Arc::new(RateLimiter::new([(
            Service::GitHub,
            RateBudget {
                capacity: 100,
                refill_every: Duration::from_millis(1),
            },
        )]));
        let checker = Arc::new(LimitedOnce {
            calls: AtomicU32::new(0),
        });
        let start = Instant::now();

        let aggregate = Dispatcher::new(checker, limiter).run(&Batch::new(["x"])).await.unwrap();
        let outcome = &aggregate.outcomes()[0];

        assert_eq!(outcome.verdict, Verdict::Available);
        assert_eq!(outcome.attempts, 2);
        assert!(Instant::now() - start >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_missing_owner_fails_before_any_lookup() {
        struct RepoStub(AtomicU32);

        #[async_trait]
        impl Checker for RepoStub {
            fn kind(&self) -> CheckKind {
                CheckKind::GitHubRepo
            }

            fn validate(&self, _identifier: &str) -> Result<(), InvalidIdentifier> {
                Ok(())
            }

            async fn lookup(&self, _identifier: &str, _context: &CheckContext) -> ProbeResult {
                self.0.fetch_add(1, Ordering::SeqCst);
                not_found()
            }
        }

        let checker = Arc::new(RepoStub(AtomicU32::new(0)));
        let result = Dispatcher::new(checker.clone(), unlimited())
            .run(&Batch::new(["repo-a", "repo-b"]))
            .await;

        assert!(matches!(result, Err(EngineError::MissingOwner)));
        assert_eq!(checker.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_marks_everything_unknown() {
        let checker = TableChecker::new(vec![("octocat", found())]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let aggregate = Dispatcher::new(checker.clone(), unlimited())
            .with_cancel(cancel)
            .run(&Batch::new(["octocat", "bad_name!"]))
            .await
            .unwrap();

        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.iter().all(CheckOutcome::is_cancelled));
        assert_eq!(checker.lookups.load(Ordering::SeqCst), 0);
    }
}
