use serde::{Deserialize, Serialize};

use crate::error::CrawlError;
use crate::url_norm;

pub struct Config;

impl Config {
    pub const DEFAULT_PORT: u16 = 3600;
    pub const FETCH_TIMEOUT_SECS: u64 = 10;
    pub const USER_AGENT: &'static str = "Mozilla/5.0 (compatible; Crawlspace/1.0)";

    pub const WORKERS_PER_JOB: usize = 8;
    pub const LOG_RING_CAPACITY: usize = 10_000;
    pub const DISPATCH_IDLE_DELAY_MS: u64 = 25;

    pub const MIN_DEPTH: u32 = 1;
    pub const MAX_DEPTH: u32 = 1000;

    pub const MIN_HIT_RATE: f64 = 0.1;
    pub const MAX_HIT_RATE: f64 = 1000.0;
    pub const DEFAULT_HIT_RATE: f64 = 100.0;

    pub const MIN_QUEUE_CAPACITY: usize = 100;
    pub const MAX_QUEUE_CAPACITY: usize = 100_000;
    pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

    pub const MAX_URLS_TO_VISIT: u64 = 10_000;
    pub const DEFAULT_MAX_URLS_TO_VISIT: u64 = 1000;
}

/// Per-job configuration as submitted by the operator.
///
/// `max_urls_to_visit == 0` means unbounded: the crawl stops only when the
/// frontier drains. The zero value is never re-purposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub origin: String,
    pub max_depth: u32,
    #[serde(default = "default_hit_rate")]
    pub hit_rate: f64,
    #[serde(default = "default_queue_capacity")]
    pub max_queue_capacity: usize,
    #[serde(default = "default_max_urls")]
    pub max_urls_to_visit: u64,
}

fn default_hit_rate() -> f64 {
    Config::DEFAULT_HIT_RATE
}

fn default_queue_capacity() -> usize {
    Config::DEFAULT_QUEUE_CAPACITY
}

fn default_max_urls() -> u64 {
    Config::DEFAULT_MAX_URLS_TO_VISIT
}

impl JobConfig {
    /// Range-check every field and canonicalize the origin URL.
    pub fn validated(mut self) -> Result<Self, CrawlError> {
        self.origin = url_norm::normalize(&self.origin, None).ok_or_else(|| {
            CrawlError::invalid(format!("origin is not a valid http(s) URL: {}", self.origin))
        })?;

        if !(Config::MIN_DEPTH..=Config::MAX_DEPTH).contains(&self.max_depth) {
            return Err(CrawlError::invalid(format!(
                "max_depth must be between {} and {}",
                Config::MIN_DEPTH,
                Config::MAX_DEPTH
            )));
        }

        if !self.hit_rate.is_finite()
            || self.hit_rate < Config::MIN_HIT_RATE
            || self.hit_rate > Config::MAX_HIT_RATE
        {
            return Err(CrawlError::invalid(format!(
                "hit_rate must be between {} and {}",
                Config::MIN_HIT_RATE,
                Config::MAX_HIT_RATE
            )));
        }

        if !(Config::MIN_QUEUE_CAPACITY..=Config::MAX_QUEUE_CAPACITY)
            .contains(&self.max_queue_capacity)
        {
            return Err(CrawlError::invalid(format!(
                "max_queue_capacity must be between {} and {}",
                Config::MIN_QUEUE_CAPACITY,
                Config::MAX_QUEUE_CAPACITY
            )));
        }

        if self.max_urls_to_visit > Config::MAX_URLS_TO_VISIT {
            return Err(CrawlError::invalid(format!(
                "max_urls_to_visit must be at most {} (0 = unbounded)",
                Config::MAX_URLS_TO_VISIT
            )));
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> JobConfig {
        JobConfig {
            origin: "http://example.com/".to_string(),
            max_depth: 2,
            hit_rate: Config::DEFAULT_HIT_RATE,
            max_queue_capacity: Config::DEFAULT_QUEUE_CAPACITY,
            max_urls_to_visit: Config::DEFAULT_MAX_URLS_TO_VISIT,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let cfg = base_config().validated().unwrap();
        assert_eq!(cfg.origin, "http://example.com/");
    }

    #[test]
    fn test_origin_is_canonicalized() {
        let cfg = JobConfig {
            origin: "HTTP://Example.COM:80/a/../b#frag".to_string(),
            ..base_config()
        };
        assert_eq!(cfg.validated().unwrap().origin, "http://example.com/b");
    }

    #[test]
    fn test_rejects_bad_origin() {
        let cfg = JobConfig {
            origin: "ftp://example.com/".to_string(),
            ..base_config()
        };
        assert!(matches!(cfg.validated(), Err(CrawlError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_out_of_range_fields() {
        assert!(JobConfig {
            max_depth: 0,
            ..base_config()
        }
        .validated()
        .is_err());
        assert!(JobConfig {
            max_depth: 1001,
            ..base_config()
        }
        .validated()
        .is_err());
        assert!(JobConfig {
            hit_rate: 0.01,
            ..base_config()
        }
        .validated()
        .is_err());
        assert!(JobConfig {
            max_queue_capacity: 10,
            ..base_config()
        }
        .validated()
        .is_err());
        assert!(JobConfig {
            max_urls_to_visit: 10_001,
            ..base_config()
        }
        .validated()
        .is_err());
    }

    #[test]
    fn test_zero_url_budget_means_unbounded() {
        let cfg = JobConfig {
            max_urls_to_visit: 0,
            ..base_config()
        };
        assert_eq!(cfg.validated().unwrap().max_urls_to_visit, 0);
    }

    #[test]
    fn test_defaults_fill_in_from_json() {
        let cfg: JobConfig =
            serde_json::from_str(r#"{"origin": "http://example.com/", "max_depth": 3}"#).unwrap();
        assert_eq!(cfg.hit_rate, Config::DEFAULT_HIT_RATE);
        assert_eq!(cfg.max_queue_capacity, Config::DEFAULT_QUEUE_CAPACITY);
        assert_eq!(cfg.max_urls_to_visit, Config::DEFAULT_MAX_URLS_TO_VISIT);
    }
}
