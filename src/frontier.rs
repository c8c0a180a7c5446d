//! Per-job frontier: a bounded FIFO of (url, depth) mirrored to disk.
//!
//! Back-pressure policy is drop-newest: a push against a full queue is
//! rejected and already-queued entries keep their order. Every mutation
//! rewrites the mirror file, which stays cheap under the queue capacity cap.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::visited::VisitedRegistry;

/// Outcome of a frontier push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Accepted,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Queue is at capacity; the newest link is dropped.
    Full,
    /// The URL was already fetched by some job.
    AlreadyVisited,
    /// The entry's depth exceeds the job's depth budget.
    BudgetExceeded,
}

pub struct Frontier {
    queue: Mutex<VecDeque<(String, u32)>>,
    capacity: usize,
    max_depth: u32,
    path: PathBuf,
    visited: Arc<VisitedRegistry>,
}

impl Frontier {
    pub fn new<P: AsRef<Path>>(
        path: P,
        capacity: usize,
        max_depth: u32,
        visited: Arc<VisitedRegistry>,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity,
            max_depth,
            path: path.as_ref().to_path_buf(),
            visited,
        }
    }

    /// Rebuild a frontier from its mirror file. Returns the frontier and the
    /// number of malformed lines that were skipped.
    pub fn load<P: AsRef<Path>>(
        path: P,
        capacity: usize,
        max_depth: u32,
        visited: Arc<VisitedRegistry>,
    ) -> io::Result<(Self, usize)> {
        let path = path.as_ref().to_path_buf();
        let mut queue = VecDeque::new();
        let mut skipped = 0;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                // depth is the final field; the url never contains spaces
                match line.rsplit_once(' ') {
                    Some((url, depth_str)) => match depth_str.parse::<u32>() {
                        Ok(depth) if !url.is_empty() && queue.len() < capacity => {
                            queue.push_back((url.to_string(), depth));
                        }
                        Ok(_) => skipped += 1,
                        Err(_) => skipped += 1,
                    },
                    None => skipped += 1,
                }
            }
        }

        let frontier = Self {
            queue: Mutex::new(queue),
            capacity,
            max_depth,
            path,
            visited,
        };
        Ok((frontier, skipped))
    }

    pub fn push(&self, url: &str, depth: u32) -> io::Result<Push> {
        if depth > self.max_depth {
            return Ok(Push::Rejected(RejectReason::BudgetExceeded));
        }
        if self.visited.contains(url) {
            return Ok(Push::Rejected(RejectReason::AlreadyVisited));
        }

        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Ok(Push::Rejected(RejectReason::Full));
        }
        queue.push_back((url.to_string(), depth));
        self.persist(&queue)?;
        Ok(Push::Accepted)
    }

    pub fn pop(&self) -> io::Result<Option<(String, u32)>> {
        let mut queue = self.queue.lock();
        let entry = queue.pop_front();
        if entry.is_some() {
            self.persist(&queue)?;
        }
        Ok(entry)
    }

    /// Current contents in FIFO order.
    pub fn snapshot(&self) -> Vec<(String, u32)> {
        self.queue.lock().iter().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.queue.lock().len()
    }

    fn persist(&self, queue: &VecDeque<(String, u32)>) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        for (url, depth) in queue {
            writeln!(writer, "{url} {depth}")?;
        }
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_visited(dir: &TempDir) -> Arc<VisitedRegistry> {
        Arc::new(VisitedRegistry::open(dir.path().join("visited_urls.data")).unwrap())
    }

    #[test]
    fn test_push_pop_fifo_order() {
        let dir = TempDir::new().unwrap();
        let frontier = Frontier::new(dir.path().join("j.queue"), 100, 5, make_visited(&dir));

        assert_eq!(frontier.push("http://a.example/", 0).unwrap(), Push::Accepted);
        assert_eq!(frontier.push("http://b.example/", 1).unwrap(), Push::Accepted);
        assert_eq!(frontier.push("http://c.example/", 1).unwrap(), Push::Accepted);

        assert_eq!(
            frontier.pop().unwrap(),
            Some(("http://a.example/".to_string(), 0))
        );
        assert_eq!(
            frontier.pop().unwrap(),
            Some(("http://b.example/".to_string(), 1))
        );
        assert_eq!(
            frontier.pop().unwrap(),
            Some(("http://c.example/".to_string(), 1))
        );
        assert_eq!(frontier.pop().unwrap(), None);
    }

    #[test]
    fn test_size_tracks_accepts_only() {
        let dir = TempDir::new().unwrap();
        let visited = make_visited(&dir);
        let frontier = Frontier::new(dir.path().join("j.queue"), 2, 3, visited.clone());

        assert_eq!(frontier.size(), 0);
        frontier.push("http://a.example/", 0).unwrap();
        assert_eq!(frontier.size(), 1);

        // depth over budget: size unchanged
        assert_eq!(
            frontier.push("http://deep.example/", 4).unwrap(),
            Push::Rejected(RejectReason::BudgetExceeded)
        );
        assert_eq!(frontier.size(), 1);

        // visited: size unchanged
        visited.mark("http://seen.example/", "job").unwrap();
        assert_eq!(
            frontier.push("http://seen.example/", 1).unwrap(),
            Push::Rejected(RejectReason::AlreadyVisited)
        );
        assert_eq!(frontier.size(), 1);

        // full: size unchanged, older entries keep their order
        frontier.push("http://b.example/", 1).unwrap();
        assert_eq!(
            frontier.push("http://c.example/", 1).unwrap(),
            Push::Rejected(RejectReason::Full)
        );
        assert_eq!(frontier.size(), 2);
        assert_eq!(
            frontier.snapshot(),
            vec![
                ("http://a.example/".to_string(), 0),
                ("http://b.example/".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_mirror_file_tracks_queue() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("j.queue");
        let frontier = Frontier::new(&path, 100, 5, make_visited(&dir));

        frontier.push("http://a.example/", 0).unwrap();
        frontier.push("http://b.example/", 1).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "http://a.example/ 0\nhttp://b.example/ 1\n"
        );

        frontier.pop().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "http://b.example/ 1\n"
        );
    }

    #[test]
    fn test_load_restores_order_and_skips_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("j.queue");
        std::fs::write(
            &path,
            "http://a.example/ 0\nbroken-line\nhttp://b.example/ not-a-depth\nhttp://c.example/ 2\n",
        )
        .unwrap();

        let (frontier, skipped) = Frontier::load(&path, 100, 5, make_visited(&dir)).unwrap();
        assert_eq!(skipped, 2);
        assert_eq!(
            frontier.snapshot(),
            vec![
                ("http://a.example/".to_string(), 0),
                ("http://c.example/".to_string(), 2),
            ]
        );
    }
}
