//! # SecureStore Capability
//!
//! The abstract cryptographic wallet this crate consumes. Everything that
//! actually touches key material — identifier creation, envelope sealing
//! and opening, identifier-document verification — lives behind the
//! [`SecureStore`] trait. This crate never sees a private key and never
//! interprets envelope internals; it just routes opaque bytes.
//!
//! ## Error classification
//!
//! Verification failures come in kinds, not strings. A registry that has
//! never heard of an identifier ([`VerifyOutcome::NotFound`]) and a registry
//! that is briefly unreachable ([`VerifyOutcome::Transient`]) are both
//! recoverable during identity provisioning (fall through to creation).
//! Anything else surfaces as a [`StoreError`] and is fatal — inconsistent
//! identity state must not be papered over.
//!
//! Implementations back this trait with a real cryptographic engine. The
//! [`memory`] module provides a deterministic, crypto-free fake for tests
//! and local development.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by [`SecureStore`] operations.
///
/// These are the *fatal* kinds. The expected verification outcomes
/// (absent identifier, transient network trouble) are modeled as
/// [`VerifyOutcome`] variants instead, so callers branch on kind rather
/// than matching error text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected or could not complete an operation. Covers
    /// backend I/O, corrupt state, and refused key operations.
    #[error("secure store failure: {0}")]
    Internal(String),

    /// An envelope could not be parsed or failed its integrity check.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Sealing was attempted from or to an identifier the store does not
    /// hold key material for.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
}

// ---------------------------------------------------------------------------
// Verification Outcome
// ---------------------------------------------------------------------------

/// Result of verifying an identifier against its registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The identifier resolved and verified; carries its current declared
    /// transport endpoint.
    Verified(String),

    /// The registry does not know this identifier. Recoverable during
    /// provisioning (a fresh identity is created).
    NotFound,

    /// The registry could not be reached. Treated like [`NotFound`] during
    /// provisioning; fatal for hook construction, where an endpoint is
    /// required.
    ///
    /// [`NotFound`]: VerifyOutcome::NotFound
    Transient(String),
}

// ---------------------------------------------------------------------------
// Identifier Record & History
// ---------------------------------------------------------------------------

/// A newly created identifier together with its publishable document.
///
/// The `id` is the store-issued canonical identifier string, which may
/// differ from the name that was requested (chained-scheme backends
/// normalize and extend the requested name). The `document` is the opaque
/// registry payload; this crate serializes it verbatim and never inspects
/// its contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierRecord {
    /// Canonical identifier string (e.g. `did:webvh:...`).
    pub id: String,

    /// Transport endpoint declared in the document.
    pub endpoint: String,

    /// The identifier document as produced by the store.
    pub document: serde_json::Value,

    /// When the store created this record.
    pub created: DateTime<Utc>,
}

impl IdentifierRecord {
    /// Builds a record with an empty document. Mainly useful for tests
    /// that pre-seed a store with an already-provisioned identity.
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            document: serde_json::Value::Null,
            created: Utc::now(),
        }
    }
}

/// An append-only history fragment for a chained identifier.
///
/// Produced alongside the identifier at creation time and published to the
/// registry's history endpoint before the identifier is usable by others.
/// Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFragment(pub String);

impl HistoryFragment {
    /// The raw serialized history payload.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Opened Message
// ---------------------------------------------------------------------------

/// A successfully opened envelope.
///
/// Transport hooks only deliver [`Generic`](OpenedMessage::Generic) frames;
/// any other kind aborts that frame's processing (the tool-calling layer
/// has no use for partial or control messages).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenedMessage {
    /// An ordinary single-message payload between two identifiers.
    Generic {
        /// Declared sender identifier.
        sender: String,
        /// Declared receiver identifier.
        receiver: String,
        /// The recovered plaintext bytes.
        payload: Vec<u8>,
    },

    /// A store-internal control message (e.g. relationship negotiation).
    /// Never delivered to the transport.
    Control {
        /// Declared sender identifier.
        sender: String,
        /// Declared receiver identifier.
        receiver: String,
        /// Store-defined control kind label.
        kind: String,
    },
}

impl OpenedMessage {
    /// The declared sender identifier, regardless of kind.
    pub fn sender(&self) -> &str {
        match self {
            OpenedMessage::Generic { sender, .. } => sender,
            OpenedMessage::Control { sender, .. } => sender,
        }
    }

    /// The declared receiver identifier, regardless of kind.
    pub fn receiver(&self) -> &str {
        match self {
            OpenedMessage::Generic { receiver, .. } => receiver,
            OpenedMessage::Control { receiver, .. } => receiver,
        }
    }
}

// ---------------------------------------------------------------------------
// SecureStore Trait
// ---------------------------------------------------------------------------

/// The durable, keyed cryptographic identity wallet.
///
/// Implementations must be internally thread-safe: the identity lifecycle
/// writes the alias table once at startup, after which any number of
/// transport hooks issue concurrent verify/seal/open calls. Sealing and
/// opening may mutate internal key material (ratcheting); tolerating
/// concurrent calls for the same identifier pair is the implementation's
/// responsibility.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Resolves a local alias to a previously stored identifier, if any.
    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, StoreError>;

    /// Verifies an identifier against its registry and resolves its current
    /// declared endpoint. Expected failures are [`VerifyOutcome`] variants;
    /// `Err` means the store itself is in trouble.
    async fn verify_identifier(&self, did: &str) -> Result<VerifyOutcome, StoreError>;

    /// Creates a bound identifier: a one-shot association between the given
    /// identifier string and the endpoint.
    async fn create_bound_identifier(
        &self,
        did: &str,
        endpoint: &str,
    ) -> Result<IdentifierRecord, StoreError>;

    /// Creates a chained identifier from a requested name. Yields both the
    /// record (whose canonical `id` may differ from the requested name) and
    /// the initial history fragment that must be published before the
    /// identifier is usable by others.
    async fn create_chained_identifier(
        &self,
        name: &str,
        endpoint: &str,
    ) -> Result<(IdentifierRecord, HistoryFragment), StoreError>;

    /// Persists a created identifier under a local alias so future process
    /// starts can reuse it. Re-registering an alias overwrites it.
    async fn register_identifier(
        &self,
        record: &IdentifierRecord,
        alias: &str,
    ) -> Result<(), StoreError>;

    /// Seals a plaintext payload from `sender` to `receiver`, returning the
    /// opaque envelope bytes.
    async fn seal(
        &self,
        sender: &str,
        receiver: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, StoreError>;

    /// Opens an envelope, recovering the declared sender and receiver plus
    /// the message content.
    async fn open(&self, envelope: &[u8]) -> Result<OpenedMessage, StoreError>;

    /// Retrieves an opaque key-value entry persisted in the wallet.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
