//! Indexer verification.
//!
//! The indexer is the source of truth for whether a mint happened: a
//! reveal the ledger accepted but the indexer never recognized is not a
//! mint. The poller re-queries with doubling backoff until the token shows
//! up or the verification deadline passes; it never concludes failure
//! early, since indexer lag is indistinguishable from rejection until the
//! deadline.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::*;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("bad response: {0}")]
    BadResponse(String),
}

/// Standard response envelope the indexer wraps every payload in.
#[derive(Debug, Deserialize)]
pub struct IndexerEnvelope<T> {
    pub status: String,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
}

/// A token as the indexer reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRecord {
    pub id: u64,
    #[serde(default)]
    pub owner: Option<String>,
}

/// A collection as the indexer reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionRecord {
    pub ticker: String,
    #[serde(default)]
    pub supply: Option<u64>,
}

/// Read-only indexer queries the engine needs.
#[async_trait]
pub trait IndexerApi: Send + Sync + 'static {
    /// `None` when the indexer does not know the collection (yet).
    async fn get_collection(&self, ticker: &str)
        -> Result<Option<CollectionRecord>, IndexerError>;

    /// `None` when the indexer has not recognized the token (yet).
    async fn get_token(&self, ticker: &str, id: u64)
        -> Result<Option<TokenRecord>, IndexerError>;
}

/// REST client for the indexer service.
pub struct HttpIndexerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpIndexerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get_entity<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, IndexerError> {
        let url = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        // The indexer answers 404 for anything it has not seen; that is a
        // negative answer, not an error.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(IndexerError::BadResponse(format!(
                "{url}: http {}",
                resp.status()
            )));
        }

        let envelope: IndexerEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| IndexerError::BadResponse(e.to_string()))?;
        if envelope.status != "success" {
            return Ok(None);
        }
        Ok(envelope.result)
    }
}

#[async_trait]
impl IndexerApi for HttpIndexerClient {
    async fn get_collection(
        &self,
        ticker: &str,
    ) -> Result<Option<CollectionRecord>, IndexerError> {
        self.get_entity(&format!("collections/{ticker}")).await
    }

    async fn get_token(
        &self,
        ticker: &str,
        id: u64,
    ) -> Result<Option<TokenRecord>, IndexerError> {
        self.get_entity(&format!("collections/{ticker}/tokens/{id}")).await
    }
}

/// Outcome of a bounded verification wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The indexer reported the token.
    Confirmed,

    /// The deadline passed without the indexer reporting it. Not a
    /// rejection verdict; the caller keeps the reservation `Confirming`.
    Unverified,
}

/// Re-queries the indexer with doubling backoff up to a deadline.
pub struct IndexerPoller<I> {
    api: Arc<I>,
    poll_interval: Duration,
    max_backoff: Duration,
    verify_timeout: Duration,
}

impl<I: IndexerApi> IndexerPoller<I> {
    pub fn new(
        api: Arc<I>,
        poll_interval: Duration,
        max_backoff: Duration,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            api,
            poll_interval,
            max_backoff,
            verify_timeout,
        }
    }

    /// Waits for the indexer to recognize `(ticker, token_id)`.
    ///
    /// Query errors and empty answers are both treated as "not yet"; only
    /// the deadline ends the wait.
    pub async fn verify_token(&self, ticker: &str, token_id: u64) -> VerifyOutcome {
        let deadline = tokio::time::Instant::now() + self.verify_timeout;
        let mut delay = self.poll_interval;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.api.get_token(ticker, token_id).await {
                Ok(Some(_)) => {
                    debug!(%ticker, %token_id, %attempt, "indexer verified token");
                    return VerifyOutcome::Confirmed;
                }
                Ok(None) => {
                    trace!(%ticker, %token_id, %attempt, "token not indexed yet");
                }
                Err(e) => {
                    warn!(%ticker, %token_id, %attempt, err = %e, "indexer query failed");
                }
            }

            let now = tokio::time::Instant::now();
            if now + delay >= deadline {
                warn!(%ticker, %token_id, %attempt, "verification deadline passed");
                return VerifyOutcome::Unverified;
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.max_backoff);
        }
    }
}
