// Copyright (c) 2026 VEIL Contributors. MIT License.
// See LICENSE for details.

//! # VEIL Protocol — Core Library
//!
//! VEIL (Verifiable Encrypted Identity Layer) overlays an opaque, per-peer
//! cryptographic trust layer onto an existing request/response tool-calling
//! transport. The transport keeps doing what it does — framing, connections,
//! protocol semantics. VEIL only touches two things: who you are, and what
//! your payload bytes look like on the wire.
//!
//! Concretely, this crate gives a process:
//!
//! 1. A stable, registry-published cryptographic identifier (a DID) that
//!    survives restarts, and
//! 2. Per-peer hooks that seal every outbound frame into an authenticated
//!    envelope and open every inbound one, while deriving the network
//!    endpoint to dial from the peer's resolved identity.
//!
//! ## Architecture
//!
//! The modules mirror the actual concerns of the trust layer:
//!
//! - **config** — Immutable settings: registry URLs, identifier templates,
//!   scheme selection. Read once, never mutated.
//! - **store** — The [`SecureStore`](store::SecureStore) capability: the
//!   abstract cryptographic wallet this crate *consumes* but never
//!   implements. Real crypto lives behind it; a deterministic in-memory
//!   fake lives in [`store::memory`] for tests.
//! - **identity** — The identity lifecycle: resolve, verify, create,
//!   publish, persist. Runs once per process, before any hook exists.
//! - **registry** — The HTTP publisher for identifier documents and
//!   history fragments. Idempotent create/update, no silent retries.
//! - **hook** — The per-peer transport hook: endpoint derivation and
//!   bidirectional payload sealing/opening.
//! - **manager** — The factory tying it together: one provisioned local
//!   identity, hooks on demand for both the dialing and the serving side.
//!
//! ## Design Philosophy
//!
//! 1. Cryptography is someone else's job. This crate moves sealed bytes
//!    around; it never interprets them.
//! 2. Identity state is explicit, owned, and passed by reference — no
//!    ambient globals, so tests can run many managers side by side.
//! 3. Expected failures ("this DID isn't on the registry yet") are typed
//!    outcomes, not string-matched exception text.

pub mod config;
pub mod hook;
pub mod identity;
pub mod manager;
pub mod registry;
pub mod store;

pub use config::{MismatchPolicy, Settings};
pub use hook::TransportHook;
pub use identity::{IdScheme, LocalIdentity};
pub use manager::TrustManager;
pub use registry::{HttpRegistry, RegistryPublisher};
pub use store::{OpenedMessage, SecureStore, VerifyOutcome};
