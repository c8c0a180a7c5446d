//! Ranked search over the on-disk word index.
//!
//! Queries are tokenized exactly like crawled pages. Each query token selects
//! the shard named by its first letter and matches stored words by prefix
//! (`python` matches `pythonic`); a line matches the query when it matches
//! any token.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::Serialize;

use crate::extractor;
use crate::index_writer::{shard_file_name, Posting};

// Ranking constants. Frequency dominates, shallower pages beat deeper ones,
// and an exact token match outranks a plain prefix match at equal frequency
// and depth.
const FREQUENCY_WEIGHT: i64 = 10;
const DEPTH_BASE: i64 = 100;
const EXACT_MATCH_BONUS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Relevance,
    Frequency,
    Depth,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(SortBy::Relevance),
            "frequency" => Ok(SortBy::Frequency),
            "depth" => Ok(SortBy::Depth),
            other => Err(format!("unknown sortBy value: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchHit {
    pub word: String,
    pub relevant_url: String,
    pub origin_url: String,
    pub depth: u32,
    pub frequency: usize,
    pub score: i64,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub total_results: usize,
    pub query_words: Vec<String>,
    pub results: Vec<SearchHit>,
}

pub struct SearchEngine {
    storage_dir: PathBuf,
}

impl SearchEngine {
    pub fn new<P: AsRef<Path>>(storage_dir: P) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
        }
    }

    /// Evaluate `query` and return one page of ranked results.
    pub fn search(
        &self,
        query: &str,
        page_limit: usize,
        page_offset: usize,
        sort_by: SortBy,
    ) -> io::Result<SearchResponse> {
        let query_words = query_tokens(query);

        // tokens grouped per shard so each file is scanned once
        let mut shards: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for word in &query_words {
            if let Some(shard) = shard_file_name(word) {
                shards.entry(shard).or_default().push(word);
            }
        }

        let mut hits = Vec::new();
        for (shard, tokens) in shards {
            let path = self.storage_dir.join(shard);
            if !path.exists() {
                continue;
            }
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                let Some(posting) = Posting::parse(&line) else {
                    continue;
                };
                if !tokens.iter().any(|t| posting.word.starts_with(t)) {
                    continue;
                }
                let exact = tokens.iter().any(|t| posting.word == *t);
                hits.push(score_hit(posting, exact));
            }
        }

        sort_hits(&mut hits, sort_by);

        let total_results = hits.len();
        let results = hits
            .into_iter()
            .skip(page_offset)
            .take(page_limit)
            .collect();

        Ok(SearchResponse {
            total_results,
            query_words,
            results,
        })
    }

    /// Uniformly random word from the index: a random non-empty shard file,
    /// then a random line of it. `None` when nothing has been indexed yet.
    pub fn random_word(&self) -> io::Result<Option<String>> {
        let mut shards = Vec::new();
        if self.storage_dir.exists() {
            for entry in fs::read_dir(&self.storage_dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(".data") && entry.metadata()?.len() > 0 {
                    shards.push(entry.path());
                }
            }
        }

        let mut rng = rand::thread_rng();
        let Some(shard) = shards.choose(&mut rng) else {
            return Ok(None);
        };

        let reader = BufReader::new(File::open(shard)?);
        let words: Vec<String> = reader
            .lines()
            .filter_map(|l| l.ok())
            .filter_map(|l| Posting::parse(&l).map(|p| p.word))
            .collect();

        Ok(words.choose(&mut rng).cloned())
    }
}

/// Query tokens in first-occurrence order, deduplicated.
fn query_tokens(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    extractor::tokens(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn score_hit(posting: Posting, exact: bool) -> SearchHit {
    let mut score = posting.frequency as i64 * FREQUENCY_WEIGHT
        + (DEPTH_BASE - posting.depth as i64).max(0);
    if exact {
        score += EXACT_MATCH_BONUS;
    }
    SearchHit {
        word: posting.word,
        relevant_url: posting.relevant_url,
        origin_url: posting.origin_url,
        depth: posting.depth,
        frequency: posting.frequency,
        score,
    }
}

// Every ordering ends with word then url so that equal keys produce the same
// result list on every run.
fn sort_hits(hits: &mut [SearchHit], sort_by: SortBy) {
    match sort_by {
        SortBy::Relevance => hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.word.cmp(&b.word))
                .then_with(|| a.relevant_url.cmp(&b.relevant_url))
        }),
        SortBy::Frequency => hits.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.word.cmp(&b.word))
                .then_with(|| a.relevant_url.cmp(&b.relevant_url))
        }),
        SortBy::Depth => hits.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.word.cmp(&b.word))
                .then_with(|| a.relevant_url.cmp(&b.relevant_url))
        }),
    }
}
