//! # Trust Manager
//!
//! The process-wide entry point. Construction validates settings and runs
//! the identity lifecycle exactly once; every hook handed out afterwards
//! borrows that provisioned identity. This ordering is a strict
//! happens-before: no hook exists until the local identifier is published
//! and persisted.
//!
//! The manager is deliberately an owned value, not a global. Tests run
//! several of them side by side against independent stores; applications
//! typically hold one in an `Arc`.
//!
//! Two factory paths with different peer-discovery rules:
//!
//! - **Client side** ([`client_hook`](TrustManager::client_hook)): the
//!   connection target string *is* the peer identifier.
//! - **Server side**
//!   ([`server_hook_from_query`](TrustManager::server_hook_from_query)):
//!   the peer identifier arrives in the reserved `did` query parameter of
//!   the inbound request. A request without one cannot be authenticated
//!   and is rejected before any store call.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::config::{Settings, SettingsError, DID_QUERY_PARAM};
use crate::hook::{HookError, TransportHook};
use crate::identity::{self, IdentityError, LocalIdentity};
use crate::registry::RegistryPublisher;
use crate::store::{SecureStore, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by manager construction and hook dispatch.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The settings record is malformed.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Provisioning the local identity failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A hook could not be constructed for the requested peer.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// The secure store failed during a pass-through operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An inbound request carried no `did` query parameter. Without a
    /// declared peer identity the connection cannot be authenticated.
    #[error("inbound request is missing the `did` query parameter")]
    MissingPeerIdentity,
}

// ---------------------------------------------------------------------------
// TrustManager
// ---------------------------------------------------------------------------

/// Owns the provisioned local identity and produces per-peer transport
/// hooks on demand.
pub struct TrustManager {
    settings: Settings,
    store: Arc<dyn SecureStore>,
    identity: LocalIdentity,
}

impl TrustManager {
    /// Validates settings, provisions the local identity through `registry`,
    /// and returns a ready manager.
    ///
    /// The registry publisher is only needed during construction, so it is
    /// borrowed rather than owned.
    pub async fn new(
        alias: &str,
        settings: Settings,
        store: Arc<dyn SecureStore>,
        registry: &dyn RegistryPublisher,
    ) -> Result<Self, ManagerError> {
        settings.validate()?;
        let identity = identity::provision(alias, &settings, store.as_ref(), registry).await?;
        Ok(Self {
            settings,
            store,
            identity,
        })
    }

    /// Convenience constructor wiring up an [`HttpRegistry`] from the
    /// settings' publish URLs.
    ///
    /// [`HttpRegistry`]: crate::registry::HttpRegistry
    pub async fn with_http_registry(
        alias: &str,
        settings: Settings,
        store: Arc<dyn SecureStore>,
    ) -> Result<Self, ManagerError> {
        let registry = crate::registry::HttpRegistry::from_settings(&settings);
        Self::new(alias, settings, store, &registry).await
    }

    /// The provisioned local identifier.
    pub fn did(&self) -> &str {
        &self.identity.did
    }

    /// The full local identity record.
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// The settings this manager was constructed with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Produces a hook for an outbound connection. The target string the
    /// caller will dial through the transport is the peer identifier.
    pub async fn client_hook(&self, target: &str) -> Result<TransportHook, ManagerError> {
        Ok(self.hook_for(target).await?)
    }

    /// Produces a hook for an inbound connection, extracting the peer
    /// identifier from the request's raw query string (with or without a
    /// leading `?`).
    ///
    /// # Errors
    ///
    /// [`ManagerError::MissingPeerIdentity`] when no `did` parameter is
    /// present — checked before any store access.
    pub async fn server_hook_from_query(&self, query: &str) -> Result<TransportHook, ManagerError> {
        let peer_did = match did_from_query(query) {
            Some(did) => did,
            None => {
                warn!("received inbound request without a peer identifier");
                return Err(ManagerError::MissingPeerIdentity);
            }
        };
        Ok(self.hook_for(&peer_did).await?)
    }

    /// Retrieves an opaque key-value entry from the secure store. Thin
    /// pass-through for surrounding application state; not interpreted
    /// here.
    pub async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, ManagerError> {
        Ok(self.store.get(key).await?)
    }

    async fn hook_for(&self, peer_did: &str) -> Result<TransportHook, HookError> {
        TransportHook::connect(
            Arc::clone(&self.store),
            &self.identity.did,
            peer_did,
            self.settings.verbose,
            self.settings.mismatch_policy,
        )
        .await
    }
}

impl std::fmt::Debug for TrustManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustManager")
            .field("did", &self.identity.did)
            .field("scheme", &self.settings.scheme)
            .finish_non_exhaustive()
    }
}

/// Extracts the reserved `did` parameter from a raw query string.
fn did_from_query(query: &str) -> Option<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == DID_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
