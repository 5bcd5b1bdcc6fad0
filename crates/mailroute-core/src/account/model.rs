//! Account model types.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::provider::{Provider, ProviderId};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mailbox bound to exactly one provider.
///
/// Host settings and auth mode come from the provider; the account only
/// supplies the sending identity and, optionally, its own secret.
#[derive(Debug, Clone)]
pub struct Account {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<AccountId>,
    /// Email address used as login and default sender.
    pub email: String,
    /// Owning provider.
    pub provider_id: ProviderId,
    /// Provider record, when loaded alongside the account.
    pub provider: Option<Provider>,
    /// Secret replacing the provider's stored secret for this mailbox.
    pub auth_override: Option<SecretString>,
    /// Creation time; older accounts win ties during default selection.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates an unsaved account for `email` under `provider_id`.
    #[must_use]
    pub fn new(email: impl Into<String>, provider_id: ProviderId) -> Self {
        Self {
            id: None,
            email: email.into(),
            provider_id,
            provider: None,
            auth_override: None,
            created_at: Utc::now(),
        }
    }

    /// Attaches a loaded provider record.
    #[must_use]
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets a mailbox-specific secret.
    #[must_use]
    pub fn with_auth_override(mut self, secret: impl Into<String>) -> Self {
        self.auth_override = Some(SecretString::new(secret.into()));
        self
    }

    /// Label for logs and messages: identifier when persisted, otherwise the email.
    #[must_use]
    pub fn label(&self) -> String {
        self.id
            .map_or_else(|| self.email.clone(), |id| id.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn account_id_display() {
        assert_eq!(format!("{}", AccountId::new(123)), "123");
        assert_eq!(AccountId::new(1), AccountId::new(1));
        assert_ne!(AccountId::new(1), AccountId::new(2));
    }

    #[test]
    fn new_account_is_unsaved() {
        let account = Account::new("ops@example.com", ProviderId::new(2));
        assert!(account.id.is_none());
        assert!(account.provider.is_none());
        assert!(account.auth_override.is_none());
        assert_eq!(account.label(), "ops@example.com");
    }

    #[test]
    fn label_uses_id_once_saved() {
        let mut account = Account::new("ops@example.com", ProviderId::new(2));
        account.id = Some(AccountId::new(11));
        assert_eq!(account.label(), "11");
    }

    #[test]
    fn debug_redacts_override() {
        let account =
            Account::new("ops@example.com", ProviderId::new(2)).with_auth_override("s3cret");
        assert!(!format!("{account:?}").contains("s3cret"));
    }
}
