pub mod api;
pub mod cli;
pub mod config;
pub mod crawl_job;
pub mod error;
pub mod extractor;
pub mod frontier;
pub mod index_writer;
pub mod layout;
pub mod logging;
pub mod network;
pub mod rate_limit;
pub mod registry;
pub mod search;
pub mod url_norm;
pub mod visited;

// Re-export main types for library usage
pub use config::{Config, JobConfig};
pub use crawl_job::{CrawlJob, JobStatus, StatusSnapshot};
pub use error::CrawlError;
pub use frontier::{Frontier, Push, RejectReason};
pub use index_writer::{IndexWriter, Posting};
pub use layout::DataLayout;
pub use network::{FetchClient, FetchError};
pub use registry::JobRegistry;
pub use search::{SearchEngine, SortBy};
pub use visited::VisitedRegistry;
