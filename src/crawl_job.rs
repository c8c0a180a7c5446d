//! Per-job crawl runtime: lifecycle state machine, dispatcher, worker pool.
//!
//! One dispatcher task per job drains the frontier, acquires a rate token
//! per fetch, and hands URLs to a bounded worker pool. Workers fetch, mark
//! the URL visited before parsing, expand the frontier, and append postings
//! to the index. Every state mutation is persisted to the job's status file.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, JobConfig};
use crate::error::CrawlError;
use crate::extractor::{self, Extraction};
use crate::frontier::{Frontier, Push, RejectReason};
use crate::index_writer::{IndexWriter, Posting};
use crate::layout::{now_ts, DataLayout};
use crate::network::FetchClient;
use crate::rate_limit::{Acquire, RateLimiter};
use crate::visited::VisitedRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Active,
    Paused,
    Stopped,
    Finished,
    Interrupted,
}

impl JobStatus {
    /// Whether a runtime is still (or should still be) attached.
    pub fn is_running(self) -> bool {
        matches!(self, JobStatus::Active | JobStatus::Paused)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Active => "Active",
            JobStatus::Paused => "Paused",
            JobStatus::Stopped => "Stopped",
            JobStatus::Finished => "Finished",
            JobStatus::Interrupted => "Interrupted",
        };
        write!(f, "{name}")
    }
}

/// Dispatcher control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Desired {
    Run,
    Pause,
    Stop,
}

/// How the dispatcher loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Finished,
    Stopped,
}

/// Mutable per-job state guarded by one lock.
struct JobState {
    status: JobStatus,
    visited_count: u64,
    created_at: u64,
    updated_at: u64,
    completed_at: Option<u64>,
    logs: VecDeque<String>,
}

/// JSON persisted to `crawlers/{id}.status` on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusFile {
    pub crawler_id: String,
    pub status: JobStatus,
    pub origin: String,
    pub max_depth: u32,
    pub hit_rate: f64,
    pub max_queue_capacity: usize,
    pub max_urls_to_visit: u64,
    pub visited_count: u64,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

impl StatusFile {
    pub fn config(&self) -> JobConfig {
        JobConfig {
            origin: self.origin.clone(),
            max_depth: self.max_depth,
            hit_rate: self.hit_rate,
            max_queue_capacity: self.max_queue_capacity,
            max_urls_to_visit: self.max_urls_to_visit,
        }
    }
}

/// Full snapshot served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub crawler_id: String,
    pub origin: String,
    pub max_depth: u32,
    pub hit_rate: f64,
    pub max_queue_capacity: usize,
    pub max_urls_to_visit: u64,
    pub status: JobStatus,
    pub visited_count: u64,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    pub queue: Vec<String>,
    pub logs: Vec<String>,
}

pub struct CrawlJob {
    id: String,
    config: JobConfig,
    layout: DataLayout,
    frontier: Frontier,
    visited: Arc<VisitedRegistry>,
    index: Arc<IndexWriter>,
    fetcher: FetchClient,
    state: Mutex<JobState>,
    control: watch::Sender<Desired>,
    cancel: CancellationToken,
}

impl CrawlJob {
    /// Build a fresh job seeded with its origin URL. The runtime is not
    /// started until [`CrawlJob::spawn`].
    pub fn new(
        id: String,
        config: JobConfig,
        layout: DataLayout,
        visited: Arc<VisitedRegistry>,
        index: Arc<IndexWriter>,
        fetcher: FetchClient,
    ) -> Result<Arc<Self>, CrawlError> {
        let frontier = Frontier::new(
            layout.queue_file(&id),
            config.max_queue_capacity,
            config.max_depth,
            Arc::clone(&visited),
        );

        let now = now_ts();
        let (control, _) = watch::channel(Desired::Run);
        let job = Arc::new(Self {
            id,
            config,
            layout,
            frontier,
            visited,
            index,
            fetcher,
            state: Mutex::new(JobState {
                status: JobStatus::Active,
                visited_count: 0,
                created_at: now,
                updated_at: now,
                completed_at: None,
                logs: VecDeque::new(),
            }),
            control,
            cancel: CancellationToken::new(),
        });

        job.frontier.push(&job.config.origin, 0)?;
        job.log(format!("Crawler created for {}", job.config.origin));
        job.persist_status()?;
        Ok(job)
    }

    /// Rebuild a runtime from `{id}.status` and `{id}.queue`, restoring the
    /// frontier, counters, and log tail. The job comes back `Active`.
    pub fn resume_from_disk(
        id: String,
        layout: DataLayout,
        visited: Arc<VisitedRegistry>,
        index: Arc<IndexWriter>,
        fetcher: FetchClient,
    ) -> Result<Arc<Self>, CrawlError> {
        let status_path = layout.status_file(&id);
        let raw = std::fs::read_to_string(&status_path)
            .map_err(|_| CrawlError::NotFound(id.clone()))?;
        let file: StatusFile = serde_json::from_str(&raw).map_err(|e| {
            CrawlError::invalid(format!("corrupt status file for {id}: {e}"))
        })?;
        let config = file.config();

        let (frontier, skipped) = Frontier::load(
            layout.queue_file(&id),
            config.max_queue_capacity,
            config.max_depth,
            Arc::clone(&visited),
        )?;

        let logs = load_log_tail(&layout, &id);

        let now = now_ts();
        let (control, _) = watch::channel(Desired::Run);
        let job = Arc::new(Self {
            id,
            config,
            layout,
            frontier,
            visited,
            index,
            fetcher,
            state: Mutex::new(JobState {
                status: JobStatus::Active,
                visited_count: file.visited_count,
                created_at: file.created_at,
                updated_at: now,
                completed_at: None,
                logs,
            }),
            control,
            cancel: CancellationToken::new(),
        });

        if skipped > 0 {
            job.log(format!("Skipped {skipped} malformed queue entries"));
        }
        if job.frontier.size() == 0 {
            // nothing left on disk; re-seed so an unfinished origin is retried
            job.frontier.push(&job.config.origin, 0)?;
        }
        job.log("Resumed crawler from files");
        job.persist_status()?;
        Ok(job)
    }

    /// Start the dispatcher task.
    pub fn spawn(self: &Arc<Self>) {
        let job = Arc::clone(self);
        tokio::spawn(async move { job.run().await });
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    pub fn pause(&self) -> Result<(), CrawlError> {
        {
            let mut state = self.state.lock();
            if state.status != JobStatus::Active {
                return Err(CrawlError::IllegalTransition(format!(
                    "cannot pause a {} crawler",
                    state.status
                )));
            }
            state.status = JobStatus::Paused;
            state.updated_at = now_ts();
        }
        let _ = self.control.send(Desired::Pause);
        self.log("Crawler paused");
        self.persist_status()?;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), CrawlError> {
        {
            let mut state = self.state.lock();
            if state.status != JobStatus::Paused {
                return Err(CrawlError::IllegalTransition(format!(
                    "cannot resume a {} crawler",
                    state.status
                )));
            }
            state.status = JobStatus::Active;
            state.updated_at = now_ts();
        }
        let _ = self.control.send(Desired::Run);
        self.log("Crawler resumed");
        self.persist_status()?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), CrawlError> {
        {
            let mut state = self.state.lock();
            if !state.status.is_running() {
                return Err(CrawlError::IllegalTransition(format!(
                    "cannot stop a {} crawler",
                    state.status
                )));
            }
            let now = now_ts();
            state.status = JobStatus::Stopped;
            state.updated_at = now;
            state.completed_at = Some(now);
        }
        let _ = self.control.send(Desired::Stop);
        self.cancel.cancel();
        self.log("Crawler stopped by operator");
        self.persist_status()?;
        Ok(())
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.lock();
        StatusSnapshot {
            crawler_id: self.id.clone(),
            origin: self.config.origin.clone(),
            max_depth: self.config.max_depth,
            hit_rate: self.config.hit_rate,
            max_queue_capacity: self.config.max_queue_capacity,
            max_urls_to_visit: self.config.max_urls_to_visit,
            status: state.status,
            visited_count: state.visited_count,
            created_at: state.created_at,
            updated_at: state.updated_at,
            completed_at: state.completed_at,
            queue: self
                .frontier
                .snapshot()
                .into_iter()
                .map(|(url, depth)| format!("{url} (depth: {depth})"))
                .collect(),
            logs: state.logs.iter().cloned().collect(),
        }
    }

    // ---- dispatcher ----

    async fn run(self: Arc<Self>) {
        let limiter = RateLimiter::new(self.config.hit_rate);
        let mut control = self.control.subscribe();
        let permits = Arc::new(Semaphore::new(Config::WORKERS_PER_JOB));
        let mut workers: JoinSet<()> = JoinSet::new();

        let outcome = loop {
            while workers.try_join_next().is_some() {}

            let desired = *control.borrow_and_update();
            match desired {
                Desired::Stop => break RunOutcome::Stopped,
                Desired::Pause => {
                    // in-flight fetches complete normally; nothing new starts
                    if control.changed().await.is_err() {
                        break RunOutcome::Stopped;
                    }
                    continue;
                }
                Desired::Run => {}
            }

            // URL budget: let in-flight fetches land, then finish
            let max_urls = self.config.max_urls_to_visit;
            if max_urls > 0 {
                let visited = self.state.lock().visited_count;
                let in_flight = workers.len() as u64;
                if visited >= max_urls && in_flight == 0 {
                    break RunOutcome::Finished;
                }
                if visited + in_flight >= max_urls {
                    tokio::select! {
                        _ = workers.join_next(), if !workers.is_empty() => {}
                        _ = control.changed() => {}
                    }
                    continue;
                }
            }

            if self.frontier.size() == 0 {
                if workers.is_empty() {
                    break RunOutcome::Finished;
                }
                // in-flight workers may still grow the frontier
                tokio::select! {
                    _ = workers.join_next(), if !workers.is_empty() => {}
                    _ = control.changed() => {}
                }
                continue;
            }

            // one rate token per admitted fetch
            tokio::select! {
                acquired = limiter.acquire(&self.cancel) => {
                    if acquired == Acquire::Cancelled {
                        break RunOutcome::Stopped;
                    }
                }
                _ = control.changed() => continue,
            }

            let entry = match self.frontier.pop() {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    self.persistence_failure(e);
                    break RunOutcome::Stopped;
                }
            };

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break RunOutcome::Stopped,
                },
                _ = self.cancel.cancelled() => break RunOutcome::Stopped,
            };

            let job = Arc::clone(&self);
            let (url, depth) = entry;
            workers.spawn(async move {
                job.process_url(url, depth).await;
                drop(permit);
            });
        };

        while workers.join_next().await.is_some() {}

        self.finish(outcome);
    }

    // ---- worker ----

    async fn process_url(&self, url: String, depth: u32) {
        // the enqueue-time check cannot see URLs visited after enqueue
        if self.visited.contains(&url) {
            return;
        }

        self.log(format!("Crawling {url} at depth {depth}"));

        let body = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self.fetcher.fetch(&url) => result,
        };

        // the mark precedes parsing so a crash mid-parse cannot refetch
        match self.visited.mark(&url, &self.id) {
            Ok(true) => self.bump_visited(),
            Ok(false) => {}
            Err(e) => {
                self.persistence_failure(e);
                return;
            }
        }

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                self.log(format!("Fetch failed for {url}: {e}"));
                return;
            }
        };

        let base = url.clone();
        let page = match tokio::task::spawn_blocking(move || extractor::extract(&body, &base)).await
        {
            Ok(page) => page,
            Err(e) => {
                self.log(format!("Parse failed for {url}: {e}"));
                Extraction::default()
            }
        };

        if !self.budget_reached() {
            for link in &page.links {
                match self.frontier.push(link, depth + 1) {
                    Ok(Push::Accepted) => {}
                    Ok(Push::Rejected(RejectReason::Full)) => {
                        self.log(format!("Queue full, dropped {link}"));
                    }
                    Ok(Push::Rejected(_)) => {}
                    Err(e) => {
                        self.persistence_failure(e);
                        return;
                    }
                }
            }
        }

        let postings: Vec<Posting> = page
            .tokens
            .iter()
            .map(|(word, &frequency)| Posting {
                word: word.clone(),
                relevant_url: url.clone(),
                origin_url: self.config.origin.clone(),
                depth,
                frequency,
            })
            .collect();
        if let Err(e) = self.index.append(&postings) {
            self.persistence_failure(e);
            return;
        }

        self.log(format!(
            "Indexed {} words and found {} links on {url}",
            postings.len(),
            page.links.len()
        ));
    }

    // ---- shared helpers ----

    fn budget_reached(&self) -> bool {
        let max_urls = self.config.max_urls_to_visit;
        max_urls > 0 && self.state.lock().visited_count >= max_urls
    }

    fn bump_visited(&self) {
        {
            let mut state = self.state.lock();
            state.visited_count += 1;
            state.updated_at = now_ts();
        }
        if let Err(e) = self.persist_status() {
            self.persistence_failure(e);
        }
    }

    fn finish(&self, outcome: RunOutcome) {
        let message = {
            let mut state = self.state.lock();
            if !state.status.is_running() {
                return;
            }
            let now = now_ts();
            state.status = match outcome {
                RunOutcome::Finished => JobStatus::Finished,
                RunOutcome::Stopped => JobStatus::Stopped,
            };
            state.updated_at = now;
            state.completed_at = Some(now);
            match outcome {
                RunOutcome::Finished => "Crawler finished",
                RunOutcome::Stopped => "Crawler stopped",
            }
        };
        self.log(message);
        if let Err(e) = self.persist_status() {
            tracing::error!(crawler_id = %self.id, "failed to persist final status: {e}");
        }
    }

    /// Disk trouble takes the job down without touching any other job.
    fn persistence_failure(&self, error: io::Error) {
        self.log(format!("Persistence error, stopping crawler: {error}"));
        {
            let mut state = self.state.lock();
            if state.status.is_running() {
                let now = now_ts();
                state.status = JobStatus::Stopped;
                state.updated_at = now;
                state.completed_at = Some(now);
            }
        }
        let _ = self.control.send(Desired::Stop);
        self.cancel.cancel();
        let _ = self.persist_status();
    }

    fn persist_status(&self) -> io::Result<()> {
        let file = {
            let state = self.state.lock();
            StatusFile {
                crawler_id: self.id.clone(),
                status: state.status,
                origin: self.config.origin.clone(),
                max_depth: self.config.max_depth,
                hit_rate: self.config.hit_rate,
                max_queue_capacity: self.config.max_queue_capacity,
                max_urls_to_visit: self.config.max_urls_to_visit,
                visited_count: state.visited_count,
                created_at: state.created_at,
                updated_at: state.updated_at,
                completed_at: state.completed_at,
            }
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(self.layout.status_file(&self.id), json)
    }

    fn log<S: Into<String>>(&self, message: S) {
        let message = message.into();
        let line = format!(
            "{} - {message}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        tracing::info!(crawler_id = %self.id, "{message}");

        {
            let mut state = self.state.lock();
            if state.logs.len() >= Config::LOG_RING_CAPACITY {
                state.logs.pop_front();
            }
            state.logs.push_back(line.clone());
        }

        // job log file failures must not take the crawl down
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.layout.log_file(&self.id))
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            tracing::warn!(crawler_id = %self.id, "failed to append job log: {e}");
        }
    }
}

fn load_log_tail(layout: &DataLayout, id: &str) -> VecDeque<String> {
    let mut logs = VecDeque::new();
    if let Ok(contents) = std::fs::read_to_string(layout.log_file(id)) {
        for line in contents.lines() {
            if logs.len() >= Config::LOG_RING_CAPACITY {
                logs.pop_front();
            }
            logs.push_back(line.to_string());
        }
    }
    logs
}
