//! Provider model types.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Unique identifier for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub i64);

impl ProviderId {
    /// Create a new provider ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How accounts of a provider authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Username and password.
    #[default]
    Password,
    /// `OAuth2` bearer token (the stored secret is the access token).
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl ConnectionMode {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::OAuth2 => "oauth2",
        }
    }

    /// Parses the storage representation, defaulting to password.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "oauth2" => Self::OAuth2,
            _ => Self::Password,
        }
    }
}

/// Provider health as seen by validation.
///
/// Variant order is the selection priority: `Active` ranks before `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Last known to work (or never checked).
    #[default]
    Active,
    /// Demoted after a failed verification.
    Inactive,
}

impl ProviderStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parses the storage representation. Unknown values count as inactive.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            _ => Self::Inactive,
        }
    }

    /// Sort rank used by candidate queries.
    #[must_use]
    pub const fn rank(self) -> i64 {
        match self {
            Self::Active => 0,
            Self::Inactive => 1,
        }
    }
}

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Short label shown in provider listings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "plaintext",
            Self::Tls => "implicit-tls",
            Self::StartTls => "starttls",
        }
    }

    /// Get default SMTP port for the security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Tls => 465,
        }
    }
}

/// SMTP connection descriptor stored on a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpDescriptor {
    /// Server hostname.
    pub host: String,
    /// Server port (0 means "default for the security mode").
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Verify/send timeout override in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Extra auth/connection fields passed through to the transport.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SmtpDescriptor {
    /// Creates a descriptor for a host with the default port of `security`.
    #[must_use]
    pub fn new(host: impl Into<String>, security: Security) -> Self {
        Self {
            host: host.into(),
            port: security.default_port(),
            security,
            ..Default::default()
        }
    }

    /// Returns true if the descriptor has no host to connect to.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.host.trim().is_empty()
    }

    /// Port to connect to, substituting the security default for 0.
    #[must_use]
    pub const fn effective_port(&self) -> u16 {
        if self.port == 0 {
            self.security.default_port()
        } else {
            self.port
        }
    }

    /// Well-known SMTP settings for an email address, if the domain is recognized.
    #[must_use]
    pub fn preset_for(email: &str) -> Option<(&'static str, Self)> {
        let domain = email.split('@').nth(1)?.to_lowercase();
        let preset = match domain.as_str() {
            "gmail.com" | "googlemail.com" => ("Gmail", Self::new("smtp.gmail.com", Security::Tls)),
            "outlook.com" | "hotmail.com" | "live.com" => (
                "Outlook",
                Self::new("smtp.office365.com", Security::StartTls),
            ),
            "yahoo.com" | "ymail.com" => {
                ("Yahoo", Self::new("smtp.mail.yahoo.com", Security::Tls))
            }
            "icloud.com" | "me.com" | "mac.com" => {
                ("iCloud", Self::new("smtp.mail.me.com", Security::StartTls))
            }
            _ => return None,
        };
        Some(preset)
    }
}

/// A named mail-service configuration shared by accounts.
#[derive(Debug, Clone, Default)]
pub struct Provider {
    /// Unique identifier (None for unsaved providers).
    pub id: Option<ProviderId>,
    /// Display name.
    pub name: String,
    /// Authentication mode inherited by every account.
    pub mode: ConnectionMode,
    /// SMTP connection descriptor.
    pub smtp: Option<SmtpDescriptor>,
    /// Stored secret: password or `OAuth2` access token.
    pub secret: Option<SecretString>,
    /// Health status, written only by validation.
    pub status: ProviderStatus,
}

impl Provider {
    /// Creates an unsaved, active provider.
    #[must_use]
    pub fn new(name: impl Into<String>, mode: ConnectionMode, smtp: SmtpDescriptor) -> Self {
        Self {
            name: name.into(),
            mode,
            smtp: Some(smtp),
            ..Default::default()
        }
    }

    /// Sets the stored secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Creates a provider pre-filled from a well-known email domain.
    #[must_use]
    pub fn preset_for(email: &str, mode: ConnectionMode) -> Option<Self> {
        SmtpDescriptor::preset_for(email).map(|(name, smtp)| Self::new(name, mode, smtp))
    }

    /// Label for logs and messages: identifier when persisted, otherwise the name.
    #[must_use]
    pub fn label(&self) -> String {
        self.id.map_or_else(
            || format!("'{}'", self.name),
            |id| format!("{id} ('{}')", self.name),
        )
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::similar_names
)]
mod tests {
    use super::*;

    mod status_tests {
        use super::*;

        #[test]
        fn active_sorts_before_inactive() {
            assert!(ProviderStatus::Active < ProviderStatus::Inactive);
            assert!(ProviderStatus::Active.rank() < ProviderStatus::Inactive.rank());
        }

        #[test]
        fn storage_round_trip() {
            for status in [ProviderStatus::Active, ProviderStatus::Inactive] {
                assert_eq!(ProviderStatus::parse(status.as_str()), status);
            }
            assert_eq!(ProviderStatus::parse("disabled"), ProviderStatus::Inactive);
        }
    }

    mod mode_tests {
        use super::*;

        #[test]
        fn parse_defaults_to_password() {
            assert_eq!(ConnectionMode::parse("oauth2"), ConnectionMode::OAuth2);
            assert_eq!(ConnectionMode::parse("login"), ConnectionMode::Password);
        }

        #[test]
        fn serde_names() {
            assert_eq!(
                serde_json::to_string(&ConnectionMode::OAuth2).unwrap(),
                "\"oauth2\""
            );
            assert_eq!(
                serde_json::to_string(&ConnectionMode::Password).unwrap(),
                "\"password\""
            );
        }
    }

    mod descriptor_tests {
        use super::*;

        #[test]
        fn default_ports() {
            assert_eq!(Security::Tls.default_port(), 465);
            assert_eq!(Security::StartTls.default_port(), 587);
            assert_eq!(Security::None.default_port(), 25);
        }

        #[test]
        fn security_labels() {
            assert_eq!(Security::None.label(), "plaintext");
            assert_eq!(Security::Tls.label(), "implicit-tls");
            assert_eq!(Security::StartTls.label(), "starttls");
        }

        #[test]
        fn zero_port_uses_security_default() {
            let descriptor = SmtpDescriptor {
                host: "smtp.example.com".into(),
                security: Security::StartTls,
                ..Default::default()
            };
            assert_eq!(descriptor.effective_port(), 587);
        }

        #[test]
        fn blank_host_is_empty() {
            assert!(SmtpDescriptor::new("  ", Security::Tls).is_empty());
            assert!(!SmtpDescriptor::new("smtp.example.com", Security::Tls).is_empty());
        }

        #[test]
        fn json_with_extra_fields() {
            let descriptor: SmtpDescriptor = serde_json::from_str(
                r#"{"host":"smtp.example.com","port":2525,"security":"starttls","extra":{"helloName":"relay.local"}}"#,
            )
            .unwrap();
            assert_eq!(descriptor.port, 2525);
            assert_eq!(descriptor.security, Security::StartTls);
            assert_eq!(descriptor.extra["helloName"], "relay.local");
        }

        #[test]
        fn presets() {
            let (name, gmail) = SmtpDescriptor::preset_for("user@gmail.com").unwrap();
            assert_eq!(name, "Gmail");
            assert_eq!(gmail.host, "smtp.gmail.com");
            assert_eq!(gmail.port, 465);

            let (name, outlook) = SmtpDescriptor::preset_for("user@Hotmail.com").unwrap();
            assert_eq!(name, "Outlook");
            assert_eq!(outlook.security, Security::StartTls);

            let (_, icloud) = SmtpDescriptor::preset_for("user@me.com").unwrap();
            assert_eq!(icloud.host, "smtp.mail.me.com");

            assert!(SmtpDescriptor::preset_for("user@example.org").is_none());
            assert!(SmtpDescriptor::preset_for("not-an-address").is_none());
        }
    }

    #[test]
    fn label_prefers_identifier() {
        let mut provider = Provider::new(
            "Relay",
            ConnectionMode::Password,
            SmtpDescriptor::new("smtp.example.com", Security::Tls),
        );
        assert_eq!(provider.label(), "'Relay'");
        provider.id = Some(ProviderId::new(4));
        assert_eq!(provider.label(), "4 ('Relay')");
    }

    #[test]
    fn debug_redacts_secret() {
        let provider = Provider::preset_for("user@yahoo.com", ConnectionMode::Password)
            .unwrap()
            .with_secret("hunter2");
        let debug = format!("{provider:?}");
        assert!(!debug.contains("hunter2"));
    }
}
