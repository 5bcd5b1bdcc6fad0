//! Credential mapping: provider configuration plus mailbox identity to
//! protocol-level connection parameters.

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;

use crate::provider::{ConnectionMode, Provider, Security};
use crate::{Error, Result};

/// SMTP authentication type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    /// Password login (PLAIN/LOGIN).
    Login,
    /// `OAuth2` bearer token (XOAUTH2).
    OAuth2,
}

impl AuthType {
    /// Wire name of the auth type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::OAuth2 => "oauth2",
        }
    }
}

impl From<ConnectionMode> for AuthType {
    fn from(mode: ConnectionMode) -> Self {
        match mode {
            ConnectionMode::OAuth2 => Self::OAuth2,
            ConnectionMode::Password => Self::Login,
        }
    }
}

/// Authentication block of the connection parameters.
#[derive(Debug, Clone)]
pub struct AuthBlock {
    /// Login user (the mailbox address).
    pub user: String,
    /// Password or access token; empty when none is stored.
    pub pass: SecretString,
    /// How `pass` is presented to the server.
    pub auth_type: AuthType,
}

/// Everything a transport needs to connect and authenticate.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Verify/send timeout, when the provider sets one.
    pub timeout: Option<Duration>,
    /// Extra descriptor fields.
    pub extra: BTreeMap<String, String>,
    /// Credentials.
    pub auth: AuthBlock,
}

impl ConnectionParams {
    /// Fills in `timeout` when the provider left it unset.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.get_or_insert(timeout);
        self
    }

    /// Replaces the provider secret with a mailbox-specific one.
    #[must_use]
    pub fn with_pass_override(mut self, pass: Option<&SecretString>) -> Self {
        if let Some(pass) = pass {
            self.auth.pass = pass.clone();
        }
        self
    }

    /// Returns true if an extra field is set to a truthy value.
    #[must_use]
    pub fn extra_flag(&self, key: &str) -> bool {
        self.extra
            .get(key)
            .is_some_and(|v| matches!(v.trim(), "true" | "1" | "yes"))
    }

    /// `host:port` for logs.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Maps a provider and mailbox to connection parameters.
///
/// An empty `mailbox` falls back to `fallback_mailbox` (the bound default
/// account's email), then to an empty user.
///
/// # Errors
///
/// Returns [`Error::ConfigurationMissing`] if the provider has no SMTP descriptor.
pub fn map_credentials(
    provider: &Provider,
    mailbox: &str,
    fallback_mailbox: Option<&str>,
) -> Result<ConnectionParams> {
    let smtp = provider
        .smtp
        .as_ref()
        .filter(|smtp| !smtp.is_empty())
        .ok_or_else(|| {
            Error::ConfigurationMissing(format!(
                "provider {} has no SMTP connection settings",
                provider.label()
            ))
        })?;

    let user = if mailbox.is_empty() {
        fallback_mailbox.unwrap_or_default()
    } else {
        mailbox
    };

    Ok(ConnectionParams {
        host: smtp.host.trim().to_string(),
        port: smtp.effective_port(),
        security: smtp.security,
        timeout: smtp.timeout_secs.map(Duration::from_secs),
        extra: smtp.extra.clone(),
        auth: AuthBlock {
            user: user.to_string(),
            pass: provider
                .secret
                .clone()
                .unwrap_or_else(|| SecretString::new(String::new())),
            auth_type: provider.mode.into(),
        },
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::similar_names
)]
mod tests {
    use proptest::prelude::*;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::provider::SmtpDescriptor;

    fn provider(mode: ConnectionMode) -> Provider {
        Provider::new(
            "Relay",
            mode,
            SmtpDescriptor::new("smtp.example.com", Security::StartTls),
        )
        .with_secret("stored-secret")
    }

    #[test]
    fn password_mode_maps_to_login() {
        let params =
            map_credentials(&provider(ConnectionMode::Password), "ops@example.com", None).unwrap();
        assert_eq!(params.auth.auth_type, AuthType::Login);
        assert_eq!(params.auth.auth_type.as_str(), "login");
        assert_eq!(params.auth.user, "ops@example.com");
        assert_eq!(params.auth.pass.expose_secret(), "stored-secret");
        assert_eq!(params.host, "smtp.example.com");
        assert_eq!(params.port, 587);
        assert_eq!(params.security, Security::StartTls);
    }

    #[test]
    fn oauth2_mode_maps_to_oauth2() {
        let params =
            map_credentials(&provider(ConnectionMode::OAuth2), "ops@example.com", None).unwrap();
        assert_eq!(params.auth.auth_type.as_str(), "oauth2");
    }

    #[test]
    fn empty_mailbox_falls_back_to_default_then_empty() {
        let p = provider(ConnectionMode::Password);
        let params = map_credentials(&p, "", Some("default@example.com")).unwrap();
        assert_eq!(params.auth.user, "default@example.com");

        let params = map_credentials(&p, "", None).unwrap();
        assert_eq!(params.auth.user, "");
    }

    #[test]
    fn missing_secret_maps_to_empty_pass() {
        let mut p = provider(ConnectionMode::Password);
        p.secret = None;
        let params = map_credentials(&p, "ops@example.com", None).unwrap();
        assert!(params.auth.pass.expose_secret().is_empty());
    }

    #[test]
    fn missing_descriptor_is_configuration_error() {
        let mut p = provider(ConnectionMode::Password);
        p.smtp = None;
        let err = map_credentials(&p, "ops@example.com", None).unwrap_err();
        assert!(matches!(err, Error::ConfigurationMissing(_)));

        p.smtp = Some(SmtpDescriptor::default());
        assert!(map_credentials(&p, "ops@example.com", None).is_err());
    }

    #[test]
    fn descriptor_extras_and_timeout_carry_over() {
        let mut p = provider(ConnectionMode::Password);
        if let Some(smtp) = p.smtp.as_mut() {
            smtp.timeout_secs = Some(5);
            smtp.extra.insert("helloName".into(), "relay.local".into());
            smtp.extra.insert("acceptInvalidCerts".into(), "true".into());
        }
        let params = map_credentials(&p, "ops@example.com", None)
            .unwrap()
            .with_default_timeout(Duration::from_secs(30));
        assert_eq!(params.timeout, Some(Duration::from_secs(5)));
        assert_eq!(params.extra["helloName"], "relay.local");
        assert!(params.extra_flag("acceptInvalidCerts"));
        assert!(!params.extra_flag("missing"));
    }

    #[test]
    fn default_timeout_applies_when_unset() {
        let params = map_credentials(&provider(ConnectionMode::Password), "a@example.com", None)
            .unwrap()
            .with_default_timeout(Duration::from_secs(30));
        assert_eq!(params.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn pass_override_replaces_provider_secret() {
        let override_pass = SecretString::new("mailbox-secret".into());
        let params = map_credentials(&provider(ConnectionMode::Password), "a@example.com", None)
            .unwrap()
            .with_pass_override(Some(&override_pass));
        assert_eq!(params.auth.pass.expose_secret(), "mailbox-secret");
    }

    #[test]
    fn debug_output_redacts_pass() {
        let params =
            map_credentials(&provider(ConnectionMode::Password), "a@example.com", None).unwrap();
        assert!(!format!("{params:?}").contains("stored-secret"));
    }

    proptest! {
        #[test]
        fn auth_type_follows_mode(oauth in any::<bool>(), mailbox in "[a-z]{0,8}(@[a-z]{1,8}\\.com)?") {
            let mode = if oauth { ConnectionMode::OAuth2 } else { ConnectionMode::Password };
            let params = map_credentials(&provider(mode), &mailbox, None).unwrap();
            let expected = if oauth { "oauth2" } else { "login" };
            prop_assert_eq!(params.auth.auth_type.as_str(), expected);
            prop_assert_eq!(params.auth.user, mailbox);
        }
    }
}
