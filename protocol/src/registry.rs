//! # Registry Publisher
//!
//! Outbound HTTP to the identifier registry: documents to the publish
//! endpoint, history fragments to the history endpoint. Create is POST,
//! update is PUT, bodies are JSON, and any non-2xx response is fatal —
//! there is no retry here. A process that cannot publish its identity must
//! not pretend it has one; retry policy, if wanted, belongs to the caller.
//!
//! The trait exists so the identity lifecycle can be tested against a
//! recording double without a registry on the network.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::debug;

use crate::config::{Settings, DID_PLACEHOLDER};
use crate::store::{HistoryFragment, IdentifierRecord};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while publishing to the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The request could not be sent or the response not read.
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("registry rejected publish to {url}: HTTP {status}")]
    Status {
        /// The URL that was posted to.
        url: String,
        /// The HTTP status code received.
        status: u16,
    },
}

// ---------------------------------------------------------------------------
// Publisher Trait
// ---------------------------------------------------------------------------

/// Idempotent create/update publishing of identifier material.
///
/// `update` selects PUT over POST: `false` for a brand-new identifier,
/// `true` when refreshing one the registry has seen before.
#[async_trait]
pub trait RegistryPublisher: Send + Sync {
    /// Publishes an identifier document.
    async fn publish_document(
        &self,
        record: &IdentifierRecord,
        update: bool,
    ) -> Result<(), RegistryError>;

    /// Publishes a chained identifier's history fragment.
    async fn publish_history(
        &self,
        did: &str,
        history: &HistoryFragment,
        update: bool,
    ) -> Result<(), RegistryError>;
}

// ---------------------------------------------------------------------------
// HTTP Implementation
// ---------------------------------------------------------------------------

/// [`RegistryPublisher`] over plain HTTP via a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    publish_url: String,
    history_url: String,
}

impl HttpRegistry {
    /// Builds a publisher for the given endpoints. `history_url` must
    /// contain the `{did}` placeholder (enforced by
    /// [`Settings::validate`](crate::Settings::validate)).
    pub fn new(publish_url: impl Into<String>, history_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            publish_url: publish_url.into(),
            history_url: history_url.into(),
        }
    }

    /// Builds a publisher from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.publish_url.clone(), settings.history_url.clone())
    }

    /// The history endpoint for a specific identifier.
    fn history_url_for(&self, did: &str) -> String {
        self.history_url.replace(DID_PLACEHOLDER, did)
    }

    async fn send(&self, url: &str, body: String, update: bool) -> Result<(), RegistryError> {
        let request = if update {
            self.client.put(url)
        } else {
            self.client.post(url)
        };
        let response = request
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(%url, update, status = status.as_u16(), "registry publish accepted");
        Ok(())
    }
}

#[async_trait]
impl RegistryPublisher for HttpRegistry {
    async fn publish_document(
        &self,
        record: &IdentifierRecord,
        update: bool,
    ) -> Result<(), RegistryError> {
        let body = record.document.to_string();
        self.send(&self.publish_url, body, update).await
    }

    async fn publish_history(
        &self,
        did: &str,
        history: &HistoryFragment,
        update: bool,
    ) -> Result<(), RegistryError> {
        let url = self.history_url_for(did);
        self.send(&url, history.as_str().to_string(), update).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
