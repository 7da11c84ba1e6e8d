//! # Transport Hook
//!
//! One hook per remote peer. The hook binds a (local identifier, peer
//! identifier) pair, resolves the peer's endpoint once at construction,
//! and from then on does exactly two things per frame: seal outbound
//! plaintext into an encoded envelope, and open inbound envelopes back
//! into plaintext. It never touches connection setup beyond handing the
//! transport the endpoint to dial.
//!
//! ## Wire encoding
//!
//! Envelopes are binary; the surrounding tool-calling transport carries
//! payloads in text fields. We bridge with URL-safe base64, tolerant of
//! missing padding on decode — peers' encoders disagree about padding more
//! often than you'd hope.
//!
//! ## Mismatch policy
//!
//! An opened envelope declares its own sender and receiver. Under the
//! default lenient policy a declaration that disagrees with the hook's
//! configured pair is logged and the frame is delivered anyway; under the
//! strict policy it fails the frame. See
//! [`MismatchPolicy`](crate::config::MismatchPolicy) for the tradeoff.

use std::sync::Arc;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, Engine, GeneralPurpose, GeneralPurposeConfig};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{MismatchPolicy, DID_QUERY_PARAM};
use crate::store::{OpenedMessage, SecureStore, StoreError, VerifyOutcome};

/// URL-safe base64, standard padding on encode, indifferent on decode.
const WIRE_ENCODING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by hook construction and per-frame processing.
#[derive(Debug, Error)]
pub enum HookError {
    /// The secure store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The peer identifier does not resolve on any registry. No endpoint
    /// can be derived, so the hook cannot exist.
    #[error("peer identifier not found: {did}")]
    PeerNotFound {
        /// The identifier that failed to resolve.
        did: String,
    },

    /// The peer's registry could not be reached during resolution.
    #[error("peer identifier unreachable: {did}: {reason}")]
    PeerUnreachable {
        /// The identifier that failed to resolve.
        did: String,
        /// Transport-level reason.
        reason: String,
    },

    /// An inbound payload was not valid wire encoding.
    #[error("invalid envelope encoding: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// An opened envelope was not the expected single-message kind.
    #[error("unexpected frame kind from {sender}: {kind}")]
    UnexpectedFrame {
        /// Declared sender of the offending frame.
        sender: String,
        /// The store-reported kind label.
        kind: String,
    },

    /// Strict policy: the declared receiver is not this hook's local
    /// identifier.
    #[error("envelope receiver mismatch: declared {declared}, expected {expected}")]
    ReceiverMismatch {
        /// Receiver declared inside the envelope.
        declared: String,
        /// The hook's local identifier.
        expected: String,
    },

    /// Strict policy: the declared sender is not this hook's peer.
    #[error("envelope sender mismatch: declared {declared}, expected {expected}")]
    SenderMismatch {
        /// Sender declared inside the envelope.
        declared: String,
        /// The hook's configured peer identifier.
        expected: String,
    },

    /// The recovered plaintext was not valid UTF-8.
    #[error("envelope payload is not valid UTF-8")]
    Payload(#[from] std::string::FromUtf8Error),
}

// ---------------------------------------------------------------------------
// TransportHook
// ---------------------------------------------------------------------------

/// Per-peer payload transformer and endpoint source.
///
/// Immutable after construction; safe to invoke from any number of
/// concurrent frames as long as the underlying store tolerates concurrent
/// seal/open for the same identifier pair.
pub struct TransportHook {
    store: Arc<dyn SecureStore>,
    local_did: String,
    peer_did: String,
    peer_endpoint: String,
    verbose: bool,
    policy: MismatchPolicy,
}

impl TransportHook {
    /// Binds a hook to `(local_did, peer_did)`, resolving the peer's
    /// endpoint via the store.
    ///
    /// # Errors
    ///
    /// Fails when the peer identifier cannot be resolved — unknown and
    /// unreachable peers are both fatal here, since no endpoint can be
    /// derived.
    pub async fn connect(
        store: Arc<dyn SecureStore>,
        local_did: &str,
        peer_did: &str,
        verbose: bool,
        policy: MismatchPolicy,
    ) -> Result<Self, HookError> {
        let peer_endpoint = match store.verify_identifier(peer_did).await? {
            VerifyOutcome::Verified(endpoint) => endpoint,
            VerifyOutcome::NotFound => {
                return Err(HookError::PeerNotFound {
                    did: peer_did.to_string(),
                })
            }
            VerifyOutcome::Transient(reason) => {
                return Err(HookError::PeerUnreachable {
                    did: peer_did.to_string(),
                    reason,
                })
            }
        };
        debug!(peer = %peer_did, endpoint = %peer_endpoint, "transport hook bound");

        Ok(Self {
            store,
            local_did: local_did.to_string(),
            peer_did: peer_did.to_string(),
            peer_endpoint,
            verbose,
            policy,
        })
    }

    /// The local identifier this hook seals from.
    pub fn local_did(&self) -> &str {
        &self.local_did
    }

    /// The peer identifier this hook seals to.
    pub fn peer_did(&self) -> &str {
        &self.peer_did
    }

    /// The peer's resolved base endpoint, without authentication
    /// parameters.
    pub fn peer_endpoint(&self) -> &str {
        &self.peer_endpoint
    }

    /// The endpoint the transport should dial for this peer: the resolved
    /// base endpoint with `did=<local identifier>` appended, so the serving
    /// side can recover which identity the caller expects to talk to.
    pub fn endpoint(&self) -> String {
        append_query_param(&self.peer_endpoint, DID_QUERY_PARAM, &self.local_did)
    }

    /// Seals an outbound plaintext payload into an encoded envelope.
    pub async fn seal(&self, payload: &str) -> Result<String, HookError> {
        if self.verbose {
            debug!(
                sender = %self.local_did,
                receiver = %self.peer_did,
                bytes = payload.len(),
                "sealing frame"
            );
        }

        let envelope = self
            .store
            .seal(&self.local_did, &self.peer_did, payload.as_bytes())
            .await?;
        let encoded = WIRE_ENCODING.encode(envelope);

        if self.verbose {
            debug!(
                sender = %self.local_did,
                receiver = %self.peer_did,
                frame = %encoded,
                "sealed frame"
            );
        }
        Ok(encoded)
    }

    /// Opens an inbound encoded envelope back into plaintext.
    ///
    /// # Errors
    ///
    /// Per-frame failures only: bad encoding, a malformed envelope, an
    /// unexpected frame kind, or (strict policy) a sender/receiver
    /// mismatch.
    pub async fn open(&self, payload: &str) -> Result<String, HookError> {
        let envelope = WIRE_ENCODING.decode(payload)?;
        if self.verbose {
            debug!(bytes = envelope.len(), "opening frame");
        }

        let opened = self.store.open(&envelope).await?;
        self.check_pair(&opened)?;

        match opened {
            OpenedMessage::Generic { payload, .. } => Ok(String::from_utf8(payload)?),
            OpenedMessage::Control { sender, kind, .. } => {
                Err(HookError::UnexpectedFrame { sender, kind })
            }
        }
    }

    /// Enforces the sender/receiver declarations against this hook's pair,
    /// per the configured policy.
    fn check_pair(&self, opened: &OpenedMessage) -> Result<(), HookError> {
        if opened.receiver() != self.local_did {
            warn!(
                declared = %opened.receiver(),
                expected = %self.local_did,
                "envelope receiver does not match local identifier"
            );
            if self.policy == MismatchPolicy::Strict {
                return Err(HookError::ReceiverMismatch {
                    declared: opened.receiver().to_string(),
                    expected: self.local_did.clone(),
                });
            }
        }
        if opened.sender() != self.peer_did {
            warn!(
                declared = %opened.sender(),
                expected = %self.peer_did,
                "envelope sender does not match peer identifier"
            );
            if self.policy == MismatchPolicy::Strict {
                return Err(HookError::SenderMismatch {
                    declared: opened.sender().to_string(),
                    expected: self.peer_did.clone(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TransportHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHook")
            .field("local_did", &self.local_did)
            .field("peer_did", &self.peer_did)
            .field("peer_endpoint", &self.peer_endpoint)
            .field("verbose", &self.verbose)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Appends `key=value` to a URL, choosing `?` or `&` by whether the URL
/// already carries a query string. The value goes out verbatim — DID
/// strings are query-safe and registries expect them unescaped.
fn append_query_param(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{key}={value}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
