use thiserror::Error;

/// Errors surfaced to operators through the registry and the control API.
///
/// Per-URL failures (fetch errors, unparseable pages) are deliberately not
/// here: they are logged against the owning job and the crawl continues.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("crawler not found: {0}")]
    NotFound(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CrawlError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CrawlError::InvalidInput(msg.into())
    }
}
