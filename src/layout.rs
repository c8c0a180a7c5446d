//! On-disk layout of the platform's data directory.
//!
//! ```text
//! data/
//!   visited_urls.data       global append-only visited log
//!   crawlers/{id}.status    JSON status snapshot (last write wins)
//!   crawlers/{id}.log       newline-delimited job log
//!   crawlers/{id}.queue     frontier mirror, one "url depth" per line
//!   storage/{letter}.data   inverted index shards
//!   logs/                   process logs (tracing appender)
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// Root the layout at `root`, creating the subdirectories if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let layout = Self {
            root: root.as_ref().to_path_buf(),
        };
        fs::create_dir_all(layout.crawlers_dir())?;
        fs::create_dir_all(layout.storage_dir())?;
        fs::create_dir_all(layout.logs_dir())?;
        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn visited_file(&self) -> PathBuf {
        self.root.join("visited_urls.data")
    }

    pub fn crawlers_dir(&self) -> PathBuf {
        self.root.join("crawlers")
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.root.join("storage")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn status_file(&self, id: &str) -> PathBuf {
        self.crawlers_dir().join(format!("{id}.status"))
    }

    pub fn log_file(&self, id: &str) -> PathBuf {
        self.crawlers_dir().join(format!("{id}.log"))
    }

    pub fn queue_file(&self, id: &str) -> PathBuf {
        self.crawlers_dir().join(format!("{id}.queue"))
    }
}

/// Wall-clock seconds since the Unix epoch, as stored in status files and
/// visited marks.
pub fn now_ts() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_creates_directories() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path().join("data")).unwrap();

        assert!(layout.crawlers_dir().is_dir());
        assert!(layout.storage_dir().is_dir());
        assert!(layout.logs_dir().is_dir());
        assert_eq!(
            layout.status_file("abc"),
            layout.crawlers_dir().join("abc.status")
        );
        assert_eq!(
            layout.queue_file("abc"),
            layout.crawlers_dir().join("abc.queue")
        );
    }
}
