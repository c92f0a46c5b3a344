//! Bounded-concurrency extraction runner.
//!
//! Jobs are admitted FIFO under a semaphore sized to `max_concurrency` and
//! owned by the processor, so the cap holds across overlapping
//! `process_batch` calls. Each admitted job holds its permit through every
//! retry until it reaches a terminal state. Every attempt runs as its own
//! task raced against the per-attempt timeout. A timed-out attempt is
//! aborted, but work it pushed onto a blocking thread keeps running
//! detached; its late progress reports and result are discarded because
//! every write carries the ticket of the attempt that produced it, and a
//! failed attempt's ticket is revoked before the backoff sleep.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::models::job::{Job, JobStatus};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runner limits. Defaults: 3 concurrent jobs, 2 retries, 30s per attempt,
/// backoff starting at 1s and capped at 5s.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            retry_attempts: 2,
            timeout: Duration::from_millis(30_000),
            backoff_base: Duration::from_millis(1_000),
            backoff_max: Duration::from_millis(5_000),
        }
    }
}

impl BatchConfig {
    /// Delay before the retry that follows failed attempt number `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }
}

/// Usage errors surfaced synchronously to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("No pending jobs to process")]
    EmptyBatch,

    #[error("Job with id '{0}' already exists")]
    DuplicateJob(String),
}

/// Counts by status plus timing over completed jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Completed jobs as a percentage of all jobs.
    pub overall_progress: u8,
    pub total_processing_time_ms: i64,
    pub average_processing_time_ms: f64,
}

impl BatchStatistics {
    /// Failed jobs are counted but excluded from the timing figures.
    pub fn from_jobs<'a, P: 'a>(jobs: impl IntoIterator<Item = &'a Job<P>>) -> Self {
        let mut stats = Self::default();
        let mut timed = 0usize;

        for job in jobs {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Completed => {
                    stats.completed += 1;
                    if let Some(ms) = job.processing_time_ms() {
                        stats.total_processing_time_ms += ms;
                        timed += 1;
                    }
                }
            }
        }

        if stats.total > 0 {
            stats.overall_progress =
                ((stats.completed as f64 / stats.total as f64) * 100.0).round() as u8;
        }
        if timed > 0 {
            stats.average_processing_time_ms = stats.total_processing_time_ms as f64 / timed as f64;
        }

        stats
    }
}

/// Notification emitted on the broadcast channel returned by
/// [`BatchProcessor::subscribe`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Progress { job_id: String, progress: u8 },
    Completed { job_id: String, attempts: u32 },
    Failed { job_id: String, attempts: u32, error: String },
}

/// Callbacks fired as jobs move through the runner. They may be invoked
/// concurrently from different jobs and never while the job table is locked.
pub trait BatchObserver<P>: Send + Sync {
    fn on_progress(&self, _job: &Job<P>, _stats: &BatchStatistics) {}

    fn on_job_complete(&self, _job: &Job<P>) {}

    fn on_job_error(&self, _job: &Job<P>, _error: &str) {}
}

/// Handle given to the extraction call for reporting 0-100 progress.
///
/// Reports from an attempt that has been superseded (timed out or retried)
/// are ignored.
#[derive(Clone)]
pub struct ProgressReporter {
    report: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressReporter {
    /// A reporter that drops every update.
    pub fn noop() -> Self {
        Self {
            report: Arc::new(|_| {}),
        }
    }

    /// Report progress; values are clamped into `0..=100`.
    pub fn report(&self, percent: f64) {
        let clamped = if percent.is_nan() {
            0
        } else {
            percent.clamp(0.0, 100.0).round() as u8
        };
        (self.report)(clamped);
    }
}

/// Jobs addressed by id, iterated in insertion order.
///
/// `tickets` holds the write token of the attempt currently allowed to
/// touch each processing job. Tickets are never reused, even across
/// [`BatchProcessor::clear`].
struct JobTable<P> {
    order: Vec<String>,
    jobs: HashMap<String, Job<P>>,
    tickets: HashMap<String, u64>,
    next_ticket: u64,
}

impl<P: Clone> JobTable<P> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            jobs: HashMap::new(),
            tickets: HashMap::new(),
            next_ticket: 0,
        }
    }

    fn issue_ticket(&mut self, id: &str) -> u64 {
        self.next_ticket += 1;
        self.tickets.insert(id.to_string(), self.next_ticket);
        self.next_ticket
    }

    fn iter(&self) -> impl Iterator<Item = &Job<P>> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }

    fn snapshot_where(&self, status: Option<JobStatus>) -> Vec<Job<P>> {
        self.iter()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect()
    }

    fn stats(&self) -> BatchStatistics {
        BatchStatistics::from_jobs(self.iter())
    }

    /// The job if `ticket` is still the live write token for it.
    fn current_attempt(&mut self, id: &str, ticket: u64) -> Option<&mut Job<P>> {
        if self.tickets.get(id) != Some(&ticket) {
            return None;
        }
        self.jobs
            .get_mut(id)
            .filter(|job| job.status == JobStatus::Processing)
    }
}

/// Write token plus the attempt number it belongs to.
#[derive(Debug, Clone, Copy)]
struct Attempt {
    ticket: u64,
    number: u32,
}

struct Shared<P> {
    config: BatchConfig,
    slots: Arc<Semaphore>,
    table: Mutex<JobTable<P>>,
    observer: Option<Arc<dyn BatchObserver<P>>>,
    events: broadcast::Sender<BatchEvent>,
}

/// Runs an injected extraction function over queued jobs with bounded
/// parallelism, per-attempt timeout, and exponential-backoff retry.
pub struct BatchProcessor<P> {
    shared: Arc<Shared<P>>,
}

impl<P> BatchProcessor<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(config: BatchConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_observer(config: BatchConfig, observer: Arc<dyn BatchObserver<P>>) -> Self {
        Self::build(config, Some(observer))
    }

    fn build(config: BatchConfig, observer: Option<Arc<dyn BatchObserver<P>>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let slots = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            shared: Arc::new(Shared {
                config,
                slots,
                table: Mutex::new(JobTable::new()),
                observer,
                events,
            }),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.shared.config
    }

    /// Subscribe to progress/completion/failure events. Subscribe before
    /// calling [`process_batch`](Self::process_batch) to see every event.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.shared.events.subscribe()
    }

    /// Register a pending job. Duplicate ids are rejected.
    pub fn add_job(&self, id: impl Into<String>, payload: P) -> Result<(), BatchError> {
        let id = id.into();
        let mut table = self.shared.table.lock();
        if table.jobs.contains_key(&id) {
            return Err(BatchError::DuplicateJob(id));
        }
        table.order.push(id.clone());
        table.jobs.insert(id.clone(), Job::new(id, payload));
        metrics::counter!("extraction_jobs_total").increment(1);
        Ok(())
    }

    pub fn job(&self, id: &str) -> Option<Job<P>> {
        self.shared.table.lock().jobs.get(id).cloned()
    }

    pub fn all_jobs(&self) -> Vec<Job<P>> {
        self.shared.table.lock().snapshot_where(None)
    }

    pub fn pending_jobs(&self) -> Vec<Job<P>> {
        self.shared.table.lock().snapshot_where(Some(JobStatus::Pending))
    }

    pub fn completed_jobs(&self) -> Vec<Job<P>> {
        self.shared.table.lock().snapshot_where(Some(JobStatus::Completed))
    }

    pub fn failed_jobs(&self) -> Vec<Job<P>> {
        self.shared.table.lock().snapshot_where(Some(JobStatus::Failed))
    }

    pub fn statistics(&self) -> BatchStatistics {
        self.shared.table.lock().stats()
    }

    /// Drop every job. Attempts still running from an earlier batch lose
    /// their write tickets, so they discard their results and never retry,
    /// even against a new job added under the same id.
    pub fn clear(&self) {
        let mut table = self.shared.table.lock();
        table.order.clear();
        table.jobs.clear();
        table.tickets.clear();
    }

    /// Drive every currently pending job to `completed` or `failed`.
    ///
    /// Returns once every job this call admitted is terminal. Job failures
    /// never abort the batch; the only error is calling this with nothing
    /// pending, in which case `extract` is never invoked. Overlapping calls
    /// share the processor's concurrency limit and never run the same job
    /// twice.
    pub async fn process_batch<F, Fut, E>(&self, extract: F) -> Result<BatchStatistics, BatchError>
    where
        F: Fn(P, ProgressReporter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let pending: Vec<String> = self
            .shared
            .table
            .lock()
            .iter()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| job.id.clone())
            .collect();

        if pending.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let config = &self.shared.config;
        info!(
            jobs = pending.len(),
            max_concurrency = config.max_concurrency,
            retry_attempts = config.retry_attempts,
            timeout_ms = config.timeout.as_millis() as u64,
            "Starting extraction batch"
        );

        let extract = Arc::new(extract);
        let mut running = JoinSet::new();

        for id in pending {
            // The semaphore is never closed, so acquisition only fails if it were.
            let Ok(permit) = Arc::clone(&self.shared.slots).acquire_owned().await else {
                error!("Concurrency limiter closed unexpectedly");
                break;
            };

            // Another call may have taken the job while we waited for a slot.
            let Some((attempt, payload)) = self.shared.admit(&id) else {
                continue;
            };
            debug!(job_id = %id, "Job admitted");

            let shared = Arc::clone(&self.shared);
            let extract = Arc::clone(&extract);
            running.spawn(async move {
                shared.run_job(id, attempt, payload, extract).await;
                drop(permit);
            });
        }

        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job task ended abnormally");
            }
        }

        let stats = self.statistics();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            average_ms = stats.average_processing_time_ms,
            "Extraction batch finished"
        );
        Ok(stats)
    }
}

impl<P> Shared<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Start the first attempt of a pending job.
    fn admit(&self, id: &str) -> Option<(Attempt, P)> {
        let (attempt, job, stats) = {
            let mut table = self.table.lock();
            if table.jobs.get(id)?.status != JobStatus::Pending {
                return None;
            }
            let ticket = table.issue_ticket(id);
            let job = table.jobs.get_mut(id)?;
            Self::start_attempt(job);
            let attempt = Attempt {
                ticket,
                number: job.attempts,
            };
            let job = job.clone();
            (attempt, job, table.stats())
        };

        self.notify_progress(&job, &stats);
        Some((attempt, job.payload))
    }

    /// Revoke a failed attempt's ticket before backing off. Returns the
    /// parked ticket the retry must present, or `None` if the job was
    /// cleared or taken over meanwhile.
    fn park(&self, id: &str, failed: Attempt) -> Option<u64> {
        let mut table = self.table.lock();
        table.current_attempt(id, failed.ticket)?;
        Some(table.issue_ticket(id))
    }

    /// Start the next attempt of a job parked with `parked`.
    fn retry(&self, id: &str, parked: u64) -> Option<(Attempt, P)> {
        let (attempt, job, stats) = {
            let mut table = self.table.lock();
            let job = table.current_attempt(id, parked)?;
            Self::start_attempt(job);
            let attempt = Attempt {
                ticket: parked,
                number: job.attempts,
            };
            let job = job.clone();
            (attempt, job, table.stats())
        };

        self.notify_progress(&job, &stats);
        Some((attempt, job.payload))
    }

    fn start_attempt(job: &mut Job<P>) {
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.progress = 0;
        job.started_at = Some(Utc::now());
    }

    async fn run_job<F, Fut, E>(
        self: Arc<Self>,
        id: String,
        mut attempt: Attempt,
        mut payload: P,
        extract: Arc<F>,
    )
    where
        F: Fn(P, ProgressReporter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let max_attempts = self.config.max_attempts();

        loop {
            let reporter = self.reporter(&id, attempt.ticket);
            match self.run_attempt(payload, reporter, &extract).await {
                Ok(text) => {
                    self.complete(&id, attempt.ticket, text);
                    return;
                }
                Err(message) if attempt.number < max_attempts => {
                    let Some(parked) = self.park(&id, attempt) else {
                        return;
                    };
                    let delay = self.config.backoff_delay(attempt.number);
                    warn!(
                        job_id = %id,
                        attempt = attempt.number,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Extraction attempt failed, retrying"
                    );
                    metrics::counter!("extraction_job_retries").increment(1);
                    tokio::time::sleep(delay).await;

                    match self.retry(&id, parked) {
                        Some((next, fresh)) => {
                            attempt = next;
                            payload = fresh;
                        }
                        None => return,
                    }
                }
                Err(message) => {
                    self.fail(&id, attempt.ticket, message);
                    return;
                }
            }
        }
    }

    async fn run_attempt<F, Fut, E>(
        &self,
        payload: P,
        reporter: ProgressReporter,
        extract: &Arc<F>,
    ) -> Result<String, String>
    where
        F: Fn(P, ProgressReporter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let handle = tokio::spawn((extract.as_ref())(payload, reporter));
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.config.timeout, handle).await {
            Ok(Ok(Ok(text))) => Ok(text),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_error)) => Err(format!("Extraction task failed: {}", join_error)),
            Err(_) => {
                abort.abort();
                Err(format!(
                    "Processing timeout after {}ms",
                    self.config.timeout.as_millis()
                ))
            }
        }
    }

    fn complete(&self, id: &str, ticket: u64, text: String) {
        let (job, stats) = {
            let mut table = self.table.lock();
            let Some(job) = table.current_attempt(id, ticket) else {
                return;
            };
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.ended_at = Some(Utc::now());
            job.result = Some(text);
            let job = job.clone();
            table.tickets.remove(id);
            (job, table.stats())
        };

        let elapsed_ms = job.processing_time_ms().unwrap_or_default();
        info!(job_id = %id, attempts = job.attempts, elapsed_ms, "Extraction job completed");
        metrics::counter!("extraction_jobs_completed").increment(1);
        metrics::histogram!("extraction_processing_seconds").record(elapsed_ms as f64 / 1000.0);

        self.notify_progress(&job, &stats);
        if let Some(observer) = &self.observer {
            observer.on_job_complete(&job);
        }
        let _ = self.events.send(BatchEvent::Completed {
            job_id: job.id.clone(),
            attempts: job.attempts,
        });
    }

    fn fail(&self, id: &str, ticket: u64, message: String) {
        let (job, stats) = {
            let mut table = self.table.lock();
            let Some(job) = table.current_attempt(id, ticket) else {
                return;
            };
            job.status = JobStatus::Failed;
            job.ended_at = Some(Utc::now());
            job.error = Some(message.clone());
            let job = job.clone();
            table.tickets.remove(id);
            (job, table.stats())
        };

        error!(job_id = %id, attempts = job.attempts, error = %message, "Extraction job failed");
        metrics::counter!("extraction_jobs_failed").increment(1);

        self.notify_progress(&job, &stats);
        if let Some(observer) = &self.observer {
            observer.on_job_error(&job, &message);
        }
        let _ = self.events.send(BatchEvent::Failed {
            job_id: job.id.clone(),
            attempts: job.attempts,
            error: message,
        });
    }

    /// Progress handle bound to one attempt. Holds only a weak reference so a
    /// detached attempt cannot keep the runner alive.
    fn reporter(self: &Arc<Self>, id: &str, ticket: u64) -> ProgressReporter {
        let shared = Arc::downgrade(self);
        let id = id.to_string();
        ProgressReporter {
            report: Arc::new(move |progress| {
                if let Some(shared) = shared.upgrade() {
                    shared.report_progress(&id, ticket, progress);
                }
            }),
        }
    }

    fn report_progress(&self, id: &str, ticket: u64, progress: u8) {
        let (job, stats) = {
            let mut table = self.table.lock();
            let Some(job) = table.current_attempt(id, ticket) else {
                return;
            };
            job.progress = progress;
            let job = job.clone();
            (job, table.stats())
        };
        self.notify_progress(&job, &stats);
    }

    fn notify_progress(&self, job: &Job<P>, stats: &BatchStatistics) {
        if let Some(observer) = &self.observer {
            observer.on_progress(job, stats);
        }
        let _ = self.events.send(BatchEvent::Progress {
            job_id: job.id.clone(),
            progress: job.progress,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicU8, Ordering};

    fn finished(id: &str, status: JobStatus, elapsed_ms: i64) -> Job<()> {
        let start = Utc::now();
        let mut job = Job::new(id, ());
        job.status = status;
        job.attempts = 1;
        job.started_at = Some(start);
        job.ended_at = Some(start + ChronoDuration::milliseconds(elapsed_ms));
        match status {
            JobStatus::Completed => job.result = Some("text".to_string()),
            JobStatus::Failed => job.error = Some("boom".to_string()),
            _ => {}
        }
        job
    }

    #[test]
    fn test_default_config() {
        let config = BatchConfig::default();
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = BatchConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(4_000));
        assert_eq!(config.backoff_delay(4), Duration::from_millis(5_000));
        assert_eq!(config.backoff_delay(40), Duration::from_millis(5_000));
    }

    #[test]
    fn test_statistics_average_excludes_failed() {
        let jobs = vec![
            finished("a", JobStatus::Completed, 10),
            finished("b", JobStatus::Completed, 20),
            finished("c", JobStatus::Completed, 30),
            finished("d", JobStatus::Failed, 5_000),
            finished("e", JobStatus::Failed, 7_000),
        ];

        let stats = BatchStatistics::from_jobs(&jobs);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.total_processing_time_ms, 60);
        assert_eq!(stats.average_processing_time_ms, 20.0);
        assert_eq!(stats.overall_progress, 60);
    }

    #[test]
    fn test_statistics_skip_completed_without_timestamps() {
        let mut untimed = finished("a", JobStatus::Completed, 0);
        untimed.started_at = None;
        let jobs = vec![untimed, finished("b", JobStatus::Completed, 40), Job::new("c", ())];

        let stats = BatchStatistics::from_jobs(&jobs);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.average_processing_time_ms, 40.0);
        assert_eq!(stats.overall_progress, 67);
    }

    #[test]
    fn test_statistics_empty() {
        let stats = BatchStatistics::from_jobs(Vec::<Job<()>>::new().iter());
        assert_eq!(stats, BatchStatistics::default());
    }

    #[test]
    fn test_reporter_clamps() {
        let seen = Arc::new(AtomicU8::new(0));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter {
            report: Arc::new(move |p| sink.store(p, Ordering::SeqCst)),
        };

        reporter.report(150.0);
        assert_eq!(seen.load(Ordering::SeqCst), 100);
        reporter.report(-3.0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        reporter.report(42.4);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        reporter.report(f64::NAN);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let processor = BatchProcessor::new(BatchConfig::default());
        processor.add_job("a", 1u32).unwrap();
        assert_eq!(
            processor.add_job("a", 2u32),
            Err(BatchError::DuplicateJob("a".to_string()))
        );
        assert_eq!(processor.job("a").unwrap().payload, 1);
        assert_eq!(processor.all_jobs().len(), 1);
    }

    #[test]
    fn test_clear_discards_jobs() {
        let processor = BatchProcessor::new(BatchConfig::default());
        processor.add_job("a", ()).unwrap();
        processor.add_job("b", ()).unwrap();
        processor.clear();
        assert!(processor.all_jobs().is_empty());
        assert_eq!(processor.statistics().total, 0);
        processor.add_job("a", ()).unwrap();
    }

    #[test]
    fn test_snapshots_keep_insertion_order() {
        let processor = BatchProcessor::new(BatchConfig::default());
        for id in ["z", "a", "m"] {
            processor.add_job(id, ()).unwrap();
        }
        let ids: Vec<String> = processor.pending_jobs().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
        assert!(processor.completed_jobs().is_empty());
        assert!(processor.failed_jobs().is_empty());
    }
}
