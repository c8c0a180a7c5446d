//! Inverted index writer: append-only word postings sharded by first letter.
//!
//! Appends never compact or deduplicate; ranking accounts for repeated
//! postings. Writes within one shard are serialized by a per-shard lock,
//! writes to different shards may interleave.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// One line of the inverted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub word: String,
    pub relevant_url: String,
    pub origin_url: String,
    pub depth: u32,
    pub frequency: usize,
}

impl Posting {
    /// Parse a shard line. URLs are canonical and therefore space-free, so
    /// the five fields split unambiguously; anything else is malformed.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let word = parts.next()?.to_string();
        let relevant_url = parts.next()?.to_string();
        let origin_url = parts.next()?.to_string();
        let depth = parts.next()?.parse().ok()?;
        let frequency = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            word,
            relevant_url,
            origin_url,
            depth,
            frequency,
        })
    }

    fn render(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.word, self.relevant_url, self.origin_url, self.depth, self.frequency
        )
    }
}

/// Shard file name for a word. ASCII letters map to `{c}.data`; any other
/// Unicode letter maps to `u{codepoint:04x}.data` (e.g. `u00e9.data`).
/// Words are lowercase letter runs, so the first char is always a letter.
pub fn shard_file_name(word: &str) -> Option<String> {
    let first = word.chars().next()?;
    if !first.is_alphabetic() {
        return None;
    }
    Some(if first.is_ascii_alphabetic() {
        format!("{first}.data")
    } else {
        format!("u{:04x}.data", first as u32)
    })
}

pub struct IndexWriter {
    storage_dir: PathBuf,
    shard_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IndexWriter {
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            shard_locks: DashMap::new(),
        }
    }

    /// Append a batch of postings, grouped per shard file.
    pub fn append(&self, postings: &[Posting]) -> io::Result<()> {
        let mut by_shard: HashMap<String, Vec<&Posting>> = HashMap::new();
        for posting in postings {
            if let Some(shard) = shard_file_name(&posting.word) {
                by_shard.entry(shard).or_default().push(posting);
            }
        }

        for (shard, group) in by_shard {
            let lock = self
                .shard_locks
                .entry(shard.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let _guard = lock.lock();

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.storage_dir.join(&shard))?;
            let mut writer = BufWriter::new(file);
            for posting in group {
                writeln!(writer, "{}", posting.render())?;
            }
            writer.flush()?;
        }
        Ok(())
    }

    /// Shard file names currently on disk, sorted.
    pub fn shard_files(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.storage_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".data") && entry.path().is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Total posting lines across all shards.
    pub fn word_count(&self) -> io::Result<usize> {
        let mut count = 0;
        for name in self.shard_files()? {
            let reader = BufReader::new(fs::File::open(self.storage_dir.join(name))?);
            count += reader
                .lines()
                .filter(|l| l.as_ref().map(|s| !s.trim().is_empty()).unwrap_or(false))
                .count();
        }
        Ok(count)
    }

    /// Administrative clear: delete every shard file. Returns how many files
    /// were removed.
    pub fn clear(&self) -> io::Result<usize> {
        let names = self.shard_files()?;
        for name in &names {
            fs::remove_file(self.storage_dir.join(name))?;
        }
        Ok(names.len())
    }
}
