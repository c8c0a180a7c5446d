use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use crate::config::Config;

/// HTTP fetch layer shared by every job.
///
/// Carries a strict-TLS client and a permissive fallback: a URL whose
/// certificate fails verification is retried exactly once with checks
/// disabled, matching how operators expect a best-effort crawler to behave
/// on self-signed hosts.
#[derive(Debug, Clone)]
pub struct FetchClient {
    strict: Client,
    permissive: Client,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timeout")]
    Timeout,

    #[error("DNS resolution failed")]
    Dns,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl FetchClient {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(Config::FETCH_TIMEOUT_SECS);

        let strict = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        let permissive = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { strict, permissive })
    }

    /// Fetch a page body within the overall request deadline. TLS failures
    /// get one retry against the permissive client; everything else is
    /// returned to the caller to log and skip.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match self.fetch_with(&self.strict, url).await {
            Err(FetchError::Tls(_)) => self.fetch_with(&self.permissive, url).await,
            other => other,
        }
    }

    async fn fetch_with(&self, client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

impl FetchError {
    fn from_reqwest_error(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return FetchError::Timeout;
        }

        let message = error.to_string();
        let lower = message.to_lowercase();

        if lower.contains("certificate") || lower.contains("ssl") || lower.contains("tls") {
            return FetchError::Tls(message);
        }

        if error.is_connect() {
            if lower.contains("connection refused") {
                return FetchError::ConnectionRefused;
            }
            if lower.contains("dns")
                || lower.contains("name resolution")
                || lower.contains("no such host")
            {
                return FetchError::Dns;
            }
        }

        FetchError::Network(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_client_builds() {
        assert!(FetchClient::new(Config::USER_AGENT).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let client = FetchClient::new(Config::USER_AGENT).unwrap();
        let body = client.fetch(&format!("{}/page", server.uri())).await.unwrap();
        assert_eq!(body, b"<html>ok</html>");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = FetchClient::new(Config::USER_AGENT).unwrap();
        let err = client.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn test_fetch_connection_error() {
        // nothing listens on this port
        let client = FetchClient::new(Config::USER_AGENT).unwrap();
        let err = client.fetch("http://127.0.0.1:9/none").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::ConnectionRefused | FetchError::Network(_) | FetchError::Timeout
        ));
    }
}
