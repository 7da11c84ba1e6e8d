//! # Identity Lifecycle
//!
//! Guarantees the process has exactly one valid, registry-reachable local
//! identifier before any transport hook exists. Runs once, at manager
//! construction, and makes at most one round trip to the registry when an
//! existing identity can be reused.
//!
//! The resolution order:
//!
//! 1. Look up the scheme-specific wallet alias.
//! 2. Discard a stored identifier whose prefix disagrees with the
//!    configured scheme.
//! 3. Verify the survivor against the registry. An exact endpoint match
//!    means reuse — done, zero publishes. Absence (not-found or a
//!    network-class failure) falls through to creation. Anything else is
//!    fatal: inconsistent identity state is not papered over.
//! 4. Create: the bound scheme re-binds and updates the same identifier
//!    when only its endpoint drifted; the chained scheme rotates to a
//!    fresh identifier (rotation is cheap, and history must reflect the
//!    authoritative endpoint).
//! 5. Publish the document (and history, for chained identifiers). Any
//!    non-success response is fatal — the process must not run with an
//!    unpublished identity.
//! 6. Persist the identifier under the wallet alias, only after
//!    publication succeeded.

pub mod scheme;

pub use scheme::IdScheme;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Settings;
use crate::registry::{RegistryError, RegistryPublisher};
use crate::store::{SecureStore, StoreError, VerifyOutcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while provisioning the local identity. All of them are
/// fatal for manager construction.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The secure store failed outside the expected "absent" verification
    /// outcomes.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Publishing the identifier document or history to the registry
    /// failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

// ---------------------------------------------------------------------------
// Local Identity
// ---------------------------------------------------------------------------

/// The provisioned process identity: wallet alias, canonical identifier,
/// and the transport address declared in its published document.
///
/// Owned by the manager; hooks only ever borrow the identifier string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// The scheme-specific wallet alias the identifier is stored under.
    pub alias: String,
    /// The canonical identifier string.
    pub did: String,
    /// The declared transport address.
    pub transport: String,
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

/// Resolves or creates the local identity per the lifecycle described in
/// the module docs.
///
/// # Errors
///
/// Store failures outside the expected absent classification and any
/// registry publish failure abort provisioning. Nothing is persisted on
/// failure.
pub async fn provision(
    alias: &str,
    settings: &Settings,
    store: &dyn SecureStore,
    registry: &dyn RegistryPublisher,
) -> Result<LocalIdentity, IdentityError> {
    let scheme = settings.scheme;
    let wallet_alias = scheme.wallet_alias(alias);

    let stored = store.resolve_alias(&wallet_alias).await?.filter(|did| {
        let matches = scheme.matches(did);
        if !matches {
            debug!(%did, expected = scheme.prefix(), "stored identifier has wrong scheme, discarding");
        }
        matches
    });

    // An identifier that verified but whose endpoint drifted. Survives for
    // the bound scheme (refreshed in place below); the chained scheme
    // rotates regardless.
    let mut drifted: Option<String> = None;

    if let Some(did) = stored {
        match store.verify_identifier(&did).await? {
            VerifyOutcome::Verified(endpoint) if endpoint == settings.transport => {
                info!(%did, "using existing identifier");
                return Ok(LocalIdentity {
                    alias: wallet_alias,
                    did,
                    transport: settings.transport.clone(),
                });
            }
            VerifyOutcome::Verified(endpoint) => {
                debug!(%did, %endpoint, declared = %settings.transport, "stored identifier endpoint drifted");
                drifted = Some(did);
            }
            VerifyOutcome::NotFound => {
                debug!(%did, "stored identifier no longer resolves, creating a new one");
            }
            VerifyOutcome::Transient(reason) => {
                debug!(%did, %reason, "registry unreachable for stored identifier, creating a new one");
            }
        }
    }

    // Decide what to request from the store. `is_new` drives the registry
    // verb: POST for a brand-new identifier, PUT when refreshing one whose
    // alias already existed.
    let (requested, is_new) = match (drifted, scheme) {
        (Some(did), IdScheme::Web) => (did, false),
        _ => (
            scheme.format_identifier(settings, &scheme.fresh_name(alias)),
            true,
        ),
    };

    let (record, history) = if scheme.requires_history() {
        let (record, history) = store
            .create_chained_identifier(&requested, &settings.transport)
            .await?;
        (record, Some(history))
    } else {
        let record = store
            .create_bound_identifier(&requested, &settings.transport)
            .await?;
        (record, None)
    };

    // The store-issued canonical identifier may differ from the requested
    // name (chained backends normalize it).
    let did = record.id.clone();

    registry.publish_document(&record, !is_new).await?;
    if let Some(history) = &history {
        registry.publish_history(&did, history, !is_new).await?;
    }
    info!(%did, "published identifier");

    store.register_identifier(&record, &wallet_alias).await?;

    Ok(LocalIdentity {
        alias: wallet_alias,
        did,
        transport: settings.transport.clone(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
