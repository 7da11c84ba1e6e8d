//! # Trust Layer Configuration
//!
//! Every knob in VEIL lives here. The [`Settings`] record is read once at
//! manager construction and never mutated afterwards — if you find yourself
//! wanting runtime mutation, you actually want a second manager.
//!
//! Defaults favor the chained (`did:webvh`) scheme and verbose frame
//! diagnostics, which is what you want during integration. Production
//! deployments override via [`Settings::from_env`] or struct literal update
//! syntax.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::IdScheme;

/// Placeholder substituted with the generated identifier name in the
/// scheme format templates.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Placeholder substituted with the final identifier in the history
/// publish URL template.
pub const DID_PLACEHOLDER: &str = "{did}";

/// Reserved query parameter carrying a peer's identifier on inbound
/// connections and appended to outbound endpoints.
pub const DID_QUERY_PARAM: &str = "did";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by settings validation.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A format template is missing its required placeholder, so identifier
    /// construction could never produce a usable value.
    #[error("template `{field}` must contain `{placeholder}`")]
    MissingPlaceholder {
        /// Name of the offending settings field.
        field: &'static str,
        /// The placeholder that was expected.
        placeholder: &'static str,
    },

    /// A required URL field is empty.
    #[error("settings field `{0}` must not be empty")]
    EmptyField(&'static str),
}

// ---------------------------------------------------------------------------
// Mismatch Policy
// ---------------------------------------------------------------------------

/// What to do when an opened envelope's declared sender or receiver does
/// not match the hook's configured pair.
///
/// The lenient default reproduces long-observed behavior: the frame is
/// still decrypted and delivered, with a warning. That trades strict
/// authentication for robustness against identity drift and is a known
/// weak point — deployments that rotate identities carefully should run
/// `Strict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MismatchPolicy {
    /// Log a warning and deliver the frame anyway.
    Lenient,
    /// Fail the frame.
    Strict,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Immutable configuration for the trust layer.
///
/// Constructed once, handed to [`TrustManager::new`](crate::TrustManager::new),
/// and shared read-only from then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Registry endpoint accepting identifier documents (POST to create,
    /// PUT to update).
    pub publish_url: String,

    /// Registry endpoint template for chained-scheme history fragments.
    /// Must contain `{did}`, substituted with the final identifier.
    pub history_url: String,

    /// Identifier format template for the bound (`did:web`) scheme.
    /// Must contain `{name}`.
    pub web_format: String,

    /// Identifier name template for the chained (`did:webvh`) scheme.
    /// Must contain `{name}`. The backing store derives the final
    /// `did:webvh:` identifier from it, so no prefix appears here.
    pub webvh_format: String,

    /// The transport address declared in published identifier documents.
    /// Clients are not publicly dialable by default, hence the opaque
    /// scheme-only default.
    pub transport: String,

    /// When `true`, hooks log envelope diagnostics for every frame.
    pub verbose: bool,

    /// Connection string for the wallet backing the [`SecureStore`]
    /// implementation. Opaque to this crate; applications hand it to
    /// whatever store they construct.
    ///
    /// [`SecureStore`]: crate::store::SecureStore
    pub wallet_url: String,

    /// Credential for the wallet connection. Opaque to this crate.
    pub wallet_password: String,

    /// Which identifier scheme to provision and require.
    pub scheme: IdScheme,

    /// Sender/receiver mismatch handling on inbound frames.
    pub mismatch_policy: MismatchPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            publish_url: "https://registry.veil.dev/add-vid".to_string(),
            history_url: "https://registry.veil.dev/add-history/{did}".to_string(),
            web_format: "did:web:registry.veil.dev:endpoint:{name}".to_string(),
            webvh_format: "registry.veil.dev/endpoint/{name}".to_string(),
            transport: "veil://".to_string(),
            verbose: true,
            wallet_url: "sqlite://wallet.sqlite".to_string(),
            wallet_password: "unsecure".to_string(),
            scheme: IdScheme::WebVh,
            mismatch_policy: MismatchPolicy::Lenient,
        }
    }
}

impl Settings {
    /// Builds settings from `VEIL_*` environment variables, falling back to
    /// the defaults for anything unset.
    ///
    /// Recognized variables:
    ///
    /// | Variable                | Field              |
    /// |-------------------------|--------------------|
    /// | `VEIL_PUBLISH_URL`      | `publish_url`      |
    /// | `VEIL_HISTORY_URL`      | `history_url`      |
    /// | `VEIL_WEB_FORMAT`       | `web_format`       |
    /// | `VEIL_WEBVH_FORMAT`     | `webvh_format`     |
    /// | `VEIL_TRANSPORT`        | `transport`        |
    /// | `VEIL_VERBOSE`          | `verbose` ("0"/"false" disable) |
    /// | `VEIL_WALLET_URL`       | `wallet_url`       |
    /// | `VEIL_WALLET_PASSWORD`  | `wallet_password`  |
    /// | `VEIL_SCHEME`           | `scheme` ("web" or "webvh") |
    /// | `VEIL_STRICT_MISMATCH`  | `mismatch_policy` ("1"/"true" enable) |
    pub fn from_env() -> Self {
        let mut s = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(v) = var("VEIL_PUBLISH_URL") {
            s.publish_url = v;
        }
        if let Some(v) = var("VEIL_HISTORY_URL") {
            s.history_url = v;
        }
        if let Some(v) = var("VEIL_WEB_FORMAT") {
            s.web_format = v;
        }
        if let Some(v) = var("VEIL_WEBVH_FORMAT") {
            s.webvh_format = v;
        }
        if let Some(v) = var("VEIL_TRANSPORT") {
            s.transport = v;
        }
        if let Some(v) = var("VEIL_VERBOSE") {
            s.verbose = !matches!(v.to_lowercase().as_str(), "0" | "false" | "no");
        }
        if let Some(v) = var("VEIL_WALLET_URL") {
            s.wallet_url = v;
        }
        if let Some(v) = var("VEIL_WALLET_PASSWORD") {
            s.wallet_password = v;
        }
        if let Some(v) = var("VEIL_SCHEME") {
            s.scheme = match v.to_lowercase().as_str() {
                "web" => IdScheme::Web,
                _ => IdScheme::WebVh,
            };
        }
        if let Some(v) = var("VEIL_STRICT_MISMATCH") {
            if matches!(v.to_lowercase().as_str(), "1" | "true" | "yes") {
                s.mismatch_policy = MismatchPolicy::Strict;
            }
        }
        s
    }

    /// Validates structural requirements on the settings.
    ///
    /// Called by the manager at construction; a malformed record fails
    /// setup immediately rather than producing broken identifiers later.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.publish_url.is_empty() {
            return Err(SettingsError::EmptyField("publish_url"));
        }
        if self.transport.is_empty() {
            return Err(SettingsError::EmptyField("transport"));
        }
        if !self.history_url.contains(DID_PLACEHOLDER) {
            return Err(SettingsError::MissingPlaceholder {
                field: "history_url",
                placeholder: DID_PLACEHOLDER,
            });
        }
        if !self.web_format.contains(NAME_PLACEHOLDER) {
            return Err(SettingsError::MissingPlaceholder {
                field: "web_format",
                placeholder: NAME_PLACEHOLDER,
            });
        }
        if !self.webvh_format.contains(NAME_PLACEHOLDER) {
            return Err(SettingsError::MissingPlaceholder {
                field: "webvh_format",
                placeholder: NAME_PLACEHOLDER,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().expect("default settings");
    }

    #[test]
    fn default_scheme_is_chained() {
        let s = Settings::default();
        assert_eq!(s.scheme, IdScheme::WebVh);
        assert_eq!(s.mismatch_policy, MismatchPolicy::Lenient);
        assert!(s.verbose);
    }

    #[test]
    fn history_url_without_placeholder_rejected() {
        let s = Settings {
            history_url: "https://registry.veil.dev/add-history".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(SettingsError::MissingPlaceholder {
                field: "history_url",
                ..
            })
        ));
    }

    #[test]
    fn format_template_without_placeholder_rejected() {
        let s = Settings {
            web_format: "did:web:registry.veil.dev:endpoint:fixed".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(SettingsError::MissingPlaceholder {
                field: "web_format",
                ..
            })
        ));
    }

    #[test]
    fn empty_publish_url_rejected() {
        let s = Settings {
            publish_url: String::new(),
            ..Settings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(SettingsError::EmptyField("publish_url"))
        ));
    }

    #[test]
    fn env_overrides_are_parsed() {
        // Sole test touching these variables; saved values are restored so
        // the process environment is left as found.
        let vars = ["VEIL_SCHEME", "VEIL_VERBOSE", "VEIL_STRICT_MISMATCH"];
        let saved: Vec<_> = vars.iter().map(|v| std::env::var(v).ok()).collect();

        std::env::set_var("VEIL_SCHEME", "web");
        std::env::set_var("VEIL_VERBOSE", "false");
        std::env::set_var("VEIL_STRICT_MISMATCH", "1");
        let s = Settings::from_env();
        assert_eq!(s.scheme, IdScheme::Web);
        assert!(!s.verbose);
        assert_eq!(s.mismatch_policy, MismatchPolicy::Strict);

        std::env::set_var("VEIL_SCHEME", "webvh");
        std::env::set_var("VEIL_VERBOSE", "0");
        std::env::set_var("VEIL_STRICT_MISMATCH", "no");
        let s = Settings::from_env();
        assert_eq!(s.scheme, IdScheme::WebVh);
        assert!(!s.verbose);
        assert_eq!(s.mismatch_policy, MismatchPolicy::Lenient);

        // Unset (and empty) variables fall back to the defaults.
        for v in vars {
            std::env::remove_var(v);
        }
        std::env::set_var("VEIL_VERBOSE", "");
        let s = Settings::from_env();
        assert_eq!(s.scheme, IdScheme::WebVh);
        assert!(s.verbose);
        assert_eq!(s.mismatch_policy, MismatchPolicy::Lenient);
        std::env::remove_var("VEIL_VERBOSE");

        for (var, value) in vars.iter().zip(saved) {
            match value {
                Some(value) => std::env::set_var(var, value),
                None => std::env::remove_var(var),
            }
        }
    }

    #[test]
    fn settings_serde_roundtrip() {
        let s = Settings::default();
        let json = serde_json::to_string(&s).expect("serialize");
        let recovered: Settings = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(recovered.publish_url, s.publish_url);
        assert_eq!(recovered.scheme, s.scheme);
    }
}
