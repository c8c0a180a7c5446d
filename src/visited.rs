//! Process-wide registry of URLs already fetched by any job.
//!
//! A URL visited by one job is never re-fetched by another. Marks live in an
//! in-memory set backed by an append-only log; mark writes are serialized by
//! the set's write lock, so `mark(u)` happens-before any later `contains(u)`
//! observation from any job.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::layout::now_ts;

pub struct VisitedRegistry {
    path: PathBuf,
    inner: RwLock<Inner>,
}

struct Inner {
    set: HashSet<String>,
    log: File,
}

impl VisitedRegistry {
    /// Open the registry, replaying the on-disk log into memory.
    /// Duplicate and malformed lines in the log are tolerated.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut set = HashSet::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if let Some(url) = line.split_whitespace().next() {
                    if url.starts_with("http://") || url.starts_with("https://") {
                        set.insert(url.to_string());
                    }
                }
            }
        }

        let log = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            inner: RwLock::new(Inner { set, log }),
        })
    }

    /// Record `url` as visited by `job_id`. Idempotent: returns `false`
    /// without touching the log when the URL was already marked.
    pub fn mark(&self, url: &str, job_id: &str) -> io::Result<bool> {
        let mut inner = self.inner.write();
        if inner.set.contains(url) {
            return Ok(false);
        }

        let line = format!("{url} {job_id} {}\n", now_ts());
        if let Err(e) = inner.log.write_all(line.as_bytes()) {
            return Err(e);
        }

        inner.set.insert(url.to_string());
        Ok(true)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.read().set.contains(url)
    }

    pub fn len(&self) -> usize {
        self.inner.read().set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Administrative clear: truncate the log and forget every mark.
    /// Returns how many URLs were dropped.
    pub fn clear(&self) -> io::Result<usize> {
        let mut inner = self.inner.write();
        inner.log = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let dropped = inner.set.len();
        inner.set.clear();
        Ok(dropped)
    }
}
