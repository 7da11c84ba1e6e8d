//! # In-Memory SecureStore
//!
//! A deterministic, crypto-free implementation of [`SecureStore`] for tests
//! and local development. Nothing here is secret: "sealing" packs the
//! sender, receiver, and payload into a bincode envelope with a BLAKE3
//! integrity tag instead of real encryption, and "verification" consults an
//! in-process directory instead of a registry.
//!
//! In production this role is played by a real cryptographic engine. The
//! fake exists so the identity lifecycle and transport hooks can be
//! exercised end to end without key material, network access, or a wallet
//! file on disk.
//!
//! Test-only affordances: [`MemoryStore::seed_identifier`] populates the
//! directory the way a registry publish would, [`MemoryStore::inject_transient`]
//! and [`MemoryStore::inject_internal`] simulate registry failure classes,
//! and [`MemoryStore::seal_control`] produces the non-generic frames a
//! transport hook must reject.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{
    HistoryFragment, IdentifierRecord, OpenedMessage, SecureStore, StoreError, VerifyOutcome,
};

// ---------------------------------------------------------------------------
// Envelope Wire Format
// ---------------------------------------------------------------------------

/// The fake envelope: everything in the clear, plus an integrity tag so
/// corrupted frames still fail to open like they would with real AEAD.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    sender: String,
    receiver: String,
    kind: EnvelopeKind,
    payload: Vec<u8>,
    tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum EnvelopeKind {
    Generic,
    Control(String),
}

fn envelope_tag(sender: &str, receiver: &str, payload: &[u8]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(sender.as_bytes());
    hasher.update(b"|");
    hasher.update(receiver.as_bytes());
    hasher.update(b"|");
    hasher.update(payload);
    hex::encode(hasher.finalize().as_bytes())
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    /// Local alias -> identifier.
    aliases: HashMap<String, String>,
    /// Identifiers this store holds (fake) key material for.
    owned: HashMap<String, IdentifierRecord>,
    /// Emulated registry view: identifier -> declared endpoint.
    directory: HashMap<String, String>,
    /// Opaque key-value entries.
    kv: HashMap<String, Vec<u8>>,
    /// Identifiers whose verification reports a transient failure.
    transient: HashSet<String>,
    /// Identifiers whose verification reports an internal store failure.
    broken: HashSet<String>,
    verify_calls: u64,
}

/// In-memory [`SecureStore`] fake. See the module docs.
#[derive(Debug)]
pub struct MemoryStore {
    /// Wallet connection label, kept for diagnostics only.
    label: String,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::open(":memory:", "")
    }

    /// Creates an empty store from wallet connection parameters. The
    /// credential is ignored; the URL is kept only as a diagnostic label.
    pub fn open(wallet_url: &str, _wallet_password: &str) -> Self {
        Self {
            label: wallet_url.to_string(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// The wallet connection label this store was opened with.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Makes an identifier resolvable with the given endpoint, as if its
    /// document had been published to a registry.
    pub fn seed_identifier(&self, did: &str, endpoint: &str) {
        self.inner
            .lock()
            .directory
            .insert(did.to_string(), endpoint.to_string());
    }

    /// Makes verification of `did` report a transient (network-class)
    /// failure.
    pub fn inject_transient(&self, did: &str) {
        self.inner.lock().transient.insert(did.to_string());
    }

    /// Makes verification of `did` fail with an internal store error.
    pub fn inject_internal(&self, did: &str) {
        self.inner.lock().broken.insert(did.to_string());
    }

    /// Number of `verify_identifier` calls made so far.
    pub fn verify_call_count(&self) -> u64 {
        self.inner.lock().verify_calls
    }

    /// Stores an opaque key-value entry (the write half of
    /// [`SecureStore::get`], which the capability surface does not expose).
    pub fn put(&self, key: &str, value: Vec<u8>) {
        self.inner.lock().kv.insert(key.to_string(), value);
    }

    /// Seals a control frame. Transport hooks must reject these; only
    /// tests produce them.
    pub fn seal_control(
        &self,
        sender: &str,
        receiver: &str,
        kind: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let envelope = Envelope {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            kind: EnvelopeKind::Control(kind.to_string()),
            payload: Vec::new(),
            tag: envelope_tag(sender, receiver, &[]),
        };
        bincode::serialize(&envelope).map_err(|e| StoreError::Internal(e.to_string()))
    }

    fn fake_document(id: &str, endpoint: &str) -> serde_json::Value {
        // A stand-in identifier document with a fingerprint where a real
        // store would place verification key material.
        let fingerprint = {
            let mut hasher = blake3::Hasher::new();
            hasher.update(id.as_bytes());
            hasher.update(endpoint.as_bytes());
            hex::encode(hasher.finalize().as_bytes())
        };
        serde_json::json!({
            "id": id,
            "transport": endpoint,
            "publicKeyFingerprint": fingerprint,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SecureStore for MemoryStore {
    async fn resolve_alias(&self, alias: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().aliases.get(alias).cloned())
    }

    async fn verify_identifier(&self, did: &str) -> Result<VerifyOutcome, StoreError> {
        let mut inner = self.inner.lock();
        inner.verify_calls += 1;
        if inner.broken.contains(did) {
            return Err(StoreError::Internal(format!(
                "identifier state corrupt: {did}"
            )));
        }
        if inner.transient.contains(did) {
            return Ok(VerifyOutcome::Transient(format!(
                "registry unreachable while resolving {did}"
            )));
        }
        Ok(match inner.directory.get(did) {
            Some(endpoint) => VerifyOutcome::Verified(endpoint.clone()),
            None => VerifyOutcome::NotFound,
        })
    }

    async fn create_bound_identifier(
        &self,
        did: &str,
        endpoint: &str,
    ) -> Result<IdentifierRecord, StoreError> {
        let record = IdentifierRecord {
            id: did.to_string(),
            endpoint: endpoint.to_string(),
            document: Self::fake_document(did, endpoint),
            created: Utc::now(),
        };
        self.inner
            .lock()
            .owned
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn create_chained_identifier(
        &self,
        name: &str,
        endpoint: &str,
    ) -> Result<(IdentifierRecord, HistoryFragment), StoreError> {
        // Chained backends normalize the requested name and prepend a
        // self-certifying id, so the canonical identifier differs from the
        // requested one. The fake mimics that with a hash-derived prefix.
        let scid = {
            let mut hasher = blake3::Hasher::new();
            hasher.update(name.as_bytes());
            hasher.update(endpoint.as_bytes());
            hex::encode(&hasher.finalize().as_bytes()[..8])
        };
        let id = format!("did:webvh:{}:{}", scid, name.replace('/', ":"));
        let record = IdentifierRecord {
            id: id.clone(),
            endpoint: endpoint.to_string(),
            document: Self::fake_document(&id, endpoint),
            created: Utc::now(),
        };
        let history = HistoryFragment(
            serde_json::json!({
                "versionId": format!("1-{scid}"),
                "id": id,
                "transport": endpoint,
            })
            .to_string(),
        );
        self.inner
            .lock()
            .owned
            .insert(record.id.clone(), record.clone());
        Ok((record, history))
    }

    async fn register_identifier(
        &self,
        record: &IdentifierRecord,
        alias: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner
            .owned
            .insert(record.id.clone(), record.clone());
        inner
            .aliases
            .insert(alias.to_string(), record.id.clone());
        Ok(())
    }

    async fn seal(
        &self,
        sender: &str,
        receiver: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, StoreError> {
        if !self.inner.lock().owned.contains_key(sender) {
            return Err(StoreError::UnknownIdentifier(sender.to_string()));
        }
        let envelope = Envelope {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            kind: EnvelopeKind::Generic,
            payload: plaintext.to_vec(),
            tag: envelope_tag(sender, receiver, plaintext),
        };
        bincode::serialize(&envelope).map_err(|e| StoreError::Internal(e.to_string()))
    }

    async fn open(&self, envelope: &[u8]) -> Result<OpenedMessage, StoreError> {
        let envelope: Envelope = bincode::deserialize(envelope)
            .map_err(|e| StoreError::MalformedEnvelope(e.to_string()))?;
        if envelope.tag != envelope_tag(&envelope.sender, &envelope.receiver, &envelope.payload) {
            return Err(StoreError::MalformedEnvelope(
                "integrity tag mismatch".to_string(),
            ));
        }
        Ok(match envelope.kind {
            EnvelopeKind::Generic => OpenedMessage::Generic {
                sender: envelope.sender,
                receiver: envelope.receiver,
                payload: envelope.payload,
            },
            EnvelopeKind::Control(kind) => OpenedMessage::Control {
                sender: envelope.sender,
                receiver: envelope.receiver,
                kind,
            },
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().kv.get(key).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
