//! # Identifier Schemes
//!
//! VEIL supports two near-identical identifier variants that share one
//! lifecycle control flow. The [`IdScheme`] tag carries everything that
//! actually differs between them: the wallet alias suffix, the identifier
//! prefix, the format template, and whether history publication is
//! required. Duplicating the resolve/create/publish flow per scheme would
//! be a maintenance trap; don't.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{Settings, NAME_PLACEHOLDER};

/// Maximum identifier-name length. Both schemes ultimately embed the name
/// in a DNS label, which caps it at 63 octets.
pub const MAX_NAME_LENGTH: usize = 63;

/// The identifier scheme variant in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// Bound scheme (`did:web`): the identifier is directly associated
    /// with a single endpoint at creation. Refreshing re-binds the same
    /// identifier.
    Web,

    /// Chained scheme (`did:webvh`): the endpoint binding is established
    /// via an append-only history log. Identifiers are cheap to rotate,
    /// so endpoint drift produces a brand-new identifier.
    WebVh,
}

impl IdScheme {
    /// The identifier prefix this scheme's identifiers must carry.
    pub fn prefix(&self) -> &'static str {
        match self {
            IdScheme::Web => "did:web:",
            IdScheme::WebVh => "did:webvh:",
        }
    }

    /// Whether `did` belongs to this scheme. A stored identifier failing
    /// this check is discarded, never reinterpreted.
    pub fn matches(&self, did: &str) -> bool {
        did.starts_with(self.prefix())
    }

    /// The wallet alias to store identifiers of this scheme under.
    ///
    /// The chained scheme gets a distinct suffix so that switching schemes
    /// in configuration never overwrites the other variant's stored
    /// identity.
    pub fn wallet_alias(&self, alias: &str) -> String {
        match self {
            IdScheme::Web => alias.to_string(),
            IdScheme::WebVh => format!("{alias}vh"),
        }
    }

    /// Whether identifiers of this scheme require a published history
    /// fragment before they are usable by others.
    pub fn requires_history(&self) -> bool {
        matches!(self, IdScheme::WebVh)
    }

    /// Generates a fresh identifier name: the normalized alias plus a
    /// random uniqueness suffix, truncated to [`MAX_NAME_LENGTH`].
    pub fn fresh_name(&self, alias: &str) -> String {
        let normalized: String = alias.chars().filter(|c| !c.is_whitespace()).collect();
        let mut name = format!("{}-{}", normalized, Uuid::new_v4());
        name.truncate(MAX_NAME_LENGTH);
        name
    }

    /// Formats a name into the scheme's identifier template from settings.
    pub fn format_identifier(&self, settings: &Settings, name: &str) -> String {
        let template = match self {
            IdScheme::Web => &settings.web_format,
            IdScheme::WebVh => &settings.webvh_format,
        };
        template.replace(NAME_PLACEHOLDER, name)
    }
}
