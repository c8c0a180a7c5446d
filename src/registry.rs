//! Job registry: the process-wide map of crawler id to runtime handle.
//!
//! Snapshots merge the live runtime (authoritative while the process is up)
//! with the on-disk status file. A status file claiming a running state with
//! no runtime behind it belongs to a crawl that died with the process; the
//! registry surfaces it as `Interrupted` until an operator resumes it from
//! files.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{Config, JobConfig};
use crate::crawl_job::{CrawlJob, JobStatus, StatusFile, StatusSnapshot};
use crate::error::CrawlError;
use crate::index_writer::IndexWriter;
use crate::layout::{now_ts, DataLayout};
use crate::network::FetchClient;
use crate::visited::VisitedRegistry;

/// One row of the crawler listing.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlerSummary {
    pub crawler_id: String,
    pub status: JobStatus,
    pub origin: String,
    pub visited_count: u64,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CrawlerList {
    pub crawlers: Vec<CrawlerSummary>,
    pub total_count: usize,
    pub active_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub total_visited_urls: usize,
    pub total_words_in_database: usize,
    pub total_active_crawlers: usize,
    pub total_crawlers_created: usize,
    pub active_crawler_ids: Vec<String>,
    pub storage_files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearReport {
    pub files_deleted: usize,
    pub visited_urls_cleared: usize,
    pub active_crawlers_stopped: usize,
}

pub struct JobRegistry {
    layout: DataLayout,
    visited: Arc<VisitedRegistry>,
    index: Arc<IndexWriter>,
    fetcher: FetchClient,
    jobs: Mutex<HashMap<String, Arc<CrawlJob>>>,
    created_seq: AtomicU64,
}

impl JobRegistry {
    /// Open the registry over `data_dir`, loading the visited log. Failures
    /// here mean the platform cannot run at all.
    pub fn open(data_dir: &str) -> Result<Arc<Self>, CrawlError> {
        let layout = DataLayout::new(data_dir)
            .map_err(|e| CrawlError::Fatal(format!("cannot create data layout: {e}")))?;
        let visited = VisitedRegistry::open(layout.visited_file())
            .map_err(|e| CrawlError::Fatal(format!("cannot load visited registry: {e}")))?;
        let fetcher = FetchClient::new(Config::USER_AGENT)
            .map_err(|e| CrawlError::Fatal(format!("cannot build HTTP client: {e}")))?;
        let index = IndexWriter::new(layout.storage_dir());

        Ok(Arc::new(Self {
            layout,
            visited: Arc::new(visited),
            index: Arc::new(index),
            fetcher,
            jobs: Mutex::new(HashMap::new()),
            created_seq: AtomicU64::new(0),
        }))
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Startup reconciliation: status files claiming a running state have no
    /// runtime behind them anymore and are rewritten as `Interrupted`.
    pub fn mark_interrupted_on_start(&self) -> Result<usize, CrawlError> {
        let mut reconciled = 0;
        for id in self.known_ids()? {
            let Some(mut file) = self.read_status_file(&id) else {
                continue;
            };
            if file.status.is_running() {
                file.status = JobStatus::Interrupted;
                file.updated_at = now_ts();
                let json = serde_json::to_string_pretty(&file)
                    .map_err(|e| CrawlError::Fatal(format!("cannot encode status: {e}")))?;
                fs::write(self.layout.status_file(&id), json)?;
                tracing::info!(crawler_id = %id, "marked interrupted crawl from previous run");
                reconciled += 1;
            }
        }
        Ok(reconciled)
    }

    /// Create and start a new crawl job.
    pub fn create(&self, config: JobConfig) -> Result<String, CrawlError> {
        let config = config.validated()?;
        let id = format!("{}_{}", now_ts(), self.created_seq.fetch_add(1, Ordering::SeqCst));

        let job = CrawlJob::new(
            id.clone(),
            config,
            self.layout.clone(),
            Arc::clone(&self.visited),
            Arc::clone(&self.index),
            self.fetcher.clone(),
        )?;
        job.spawn();

        self.jobs.lock().insert(id.clone(), job);
        Ok(id)
    }

    /// Status snapshot for one job, live or reconstructed from disk.
    pub fn get(&self, id: &str) -> Result<StatusSnapshot, CrawlError> {
        if let Some(job) = self.jobs.lock().get(id).cloned() {
            return Ok(job.snapshot());
        }

        let file = self
            .read_status_file(id)
            .ok_or_else(|| CrawlError::NotFound(id.to_string()))?;
        Ok(self.snapshot_from_disk(id, file))
    }

    pub fn list(&self) -> Result<CrawlerList, CrawlError> {
        let jobs = self.jobs.lock();
        let mut crawlers = Vec::new();

        for id in self.known_ids()? {
            if let Some(job) = jobs.get(&id) {
                let snapshot = job.snapshot();
                crawlers.push(CrawlerSummary {
                    crawler_id: snapshot.crawler_id,
                    status: snapshot.status,
                    origin: snapshot.origin,
                    visited_count: snapshot.visited_count,
                    created_at: snapshot.created_at,
                    updated_at: snapshot.updated_at,
                    completed_at: snapshot.completed_at,
                });
            } else if let Some(file) = self.read_status_file(&id) {
                let status = if file.status.is_running() {
                    JobStatus::Interrupted
                } else {
                    file.status
                };
                crawlers.push(CrawlerSummary {
                    crawler_id: file.crawler_id,
                    status,
                    origin: file.origin,
                    visited_count: file.visited_count,
                    created_at: file.created_at,
                    updated_at: file.updated_at,
                    completed_at: file.completed_at,
                });
            }
        }

        // newest first, stable on id for equal timestamps
        crawlers.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.crawler_id.cmp(&b.crawler_id))
        });

        let active_count = jobs.values().filter(|j| j.is_running()).count();
        Ok(CrawlerList {
            total_count: crawlers.len(),
            active_count,
            crawlers,
        })
    }

    pub fn pause(&self, id: &str) -> Result<(), CrawlError> {
        self.with_live_job(id, |job| job.pause())
    }

    pub fn resume(&self, id: &str) -> Result<(), CrawlError> {
        self.with_live_job(id, |job| job.resume())
    }

    pub fn stop(&self, id: &str) -> Result<(), CrawlError> {
        self.with_live_job(id, |job| job.stop())
    }

    /// Rebuild a job from its files and start it. The only path back to
    /// `Active` for a `Stopped` or `Interrupted` crawl.
    pub fn resume_from_files(&self, id: &str) -> Result<(), CrawlError> {
        {
            let jobs = self.jobs.lock();
            if let Some(job) = jobs.get(id) {
                if job.is_running() {
                    return Err(CrawlError::IllegalTransition(format!(
                        "crawler {id} is already active"
                    )));
                }
            }
        }

        let job = CrawlJob::resume_from_disk(
            id.to_string(),
            self.layout.clone(),
            Arc::clone(&self.visited),
            Arc::clone(&self.index),
            self.fetcher.clone(),
        )?;
        job.spawn();
        self.jobs.lock().insert(id.to_string(), job);
        Ok(())
    }

    /// Administrative wipe of every persisted artifact: visited log, per-job
    /// files, and index shards. Running jobs are stopped first.
    pub fn clear_all(&self) -> Result<ClearReport, CrawlError> {
        let mut stopped = 0;
        {
            let mut jobs = self.jobs.lock();
            for job in jobs.values() {
                if job.stop().is_ok() {
                    stopped += 1;
                }
            }
            jobs.clear();
        }

        let visited_cleared = self.visited.clear()?;
        let mut files_deleted = self.index.clear()?;

        for entry in fs::read_dir(self.layout.crawlers_dir())? {
            let entry = entry?;
            if entry.path().is_file() {
                fs::remove_file(entry.path())?;
                files_deleted += 1;
            }
        }

        Ok(ClearReport {
            files_deleted,
            visited_urls_cleared: visited_cleared,
            active_crawlers_stopped: stopped,
        })
    }

    pub fn stats(&self) -> Result<StatsReport, CrawlError> {
        let jobs = self.jobs.lock();
        let mut active_crawler_ids: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.is_running())
            .map(|(id, _)| id.clone())
            .collect();
        active_crawler_ids.sort();

        Ok(StatsReport {
            total_visited_urls: self.visited.len(),
            total_words_in_database: self.index.word_count()?,
            total_active_crawlers: active_crawler_ids.len(),
            total_crawlers_created: self.known_ids()?.len(),
            active_crawler_ids,
            storage_files: self.index.shard_files()?,
        })
    }

    // ---- internals ----

    fn with_live_job<F>(&self, id: &str, op: F) -> Result<(), CrawlError>
    where
        F: FnOnce(&CrawlJob) -> Result<(), CrawlError>,
    {
        let job = self.jobs.lock().get(id).cloned();
        match job {
            Some(job) => op(&job),
            None => {
                if self.read_status_file(id).is_some() {
                    Err(CrawlError::IllegalTransition(format!(
                        "crawler {id} has no attached runtime"
                    )))
                } else {
                    Err(CrawlError::NotFound(id.to_string()))
                }
            }
        }
    }

    /// Ids of every crawler with a status file on disk, sorted.
    fn known_ids(&self) -> Result<Vec<String>, CrawlError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.layout.crawlers_dir())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_suffix(".status") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read_status_file(&self, id: &str) -> Option<StatusFile> {
        let raw = fs::read_to_string(self.layout.status_file(id)).ok()?;
        match serde_json::from_str(&raw) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(crawler_id = %id, "unreadable status file: {e}");
                None
            }
        }
    }

    fn snapshot_from_disk(&self, id: &str, file: StatusFile) -> StatusSnapshot {
        let status = if file.status.is_running() {
            // a running state with no runtime means the process died mid-run
            JobStatus::Interrupted
        } else {
            file.status
        };

        let queue = fs::read_to_string(self.layout.queue_file(id))
            .map(|contents| {
                contents
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(|line| match line.rsplit_once(' ') {
                        Some((url, depth)) => format!("{url} (depth: {depth})"),
                        None => line.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let logs = fs::read_to_string(self.layout.log_file(id))
            .map(|contents| {
                let lines: Vec<String> = contents.lines().map(|l| l.to_string()).collect();
                let skip = lines.len().saturating_sub(Config::LOG_RING_CAPACITY);
                lines.into_iter().skip(skip).collect()
            })
            .unwrap_or_default();

        StatusSnapshot {
            crawler_id: file.crawler_id,
            origin: file.origin,
            max_depth: file.max_depth,
            hit_rate: file.hit_rate,
            max_queue_capacity: file.max_queue_capacity,
            max_urls_to_visit: file.max_urls_to_visit,
            status,
            visited_count: file.visited_count,
            created_at: file.created_at,
            updated_at: file.updated_at,
            completed_at: file.completed_at,
            queue,
            logs,
        }
    }
}
