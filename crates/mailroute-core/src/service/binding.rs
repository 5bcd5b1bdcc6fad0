//! Process-wide default transport binding.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::Result;
use crate::account::{Account, AccountId};
use crate::provider::Provider;
use crate::transport::{Transport, TransportFactory, map_credentials};

/// A live transport paired with the account it was built for.
#[derive(Debug, Clone)]
pub struct DefaultBinding {
    /// Bound account, with its provider attached.
    pub account: Account,
    /// Cached transport handle.
    pub transport: Arc<dyn Transport>,
    /// Time budget for sends through this transport.
    pub timeout: Duration,
}

impl DefaultBinding {
    /// Maps credentials for `account` under `provider` and builds its transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider has no SMTP configuration.
    pub fn build(
        factory: &dyn TransportFactory,
        account: Account,
        provider: Provider,
        fallback_mailbox: Option<&str>,
        default_timeout: Duration,
    ) -> Result<Self> {
        let params = map_credentials(&provider, &account.email, fallback_mailbox)?
            .with_pass_override(account.auth_override.as_ref())
            .with_default_timeout(default_timeout);
        let timeout = params.timeout.unwrap_or(default_timeout);
        let transport = factory.build(params);

        Ok(Self {
            account: account.with_provider(provider),
            transport,
            timeout,
        })
    }
}

/// Shared cell holding the current default binding, if any.
///
/// Writers replace the whole value; the last writer wins.
#[derive(Debug, Clone, Default)]
pub struct DefaultCell {
    inner: Arc<RwLock<Option<DefaultBinding>>>,
}

impl DefaultCell {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the current binding.
    pub async fn get(&self) -> Option<DefaultBinding> {
        self.inner.read().await.clone()
    }

    /// Installs `binding`, replacing any previous one.
    pub async fn install(&self, binding: DefaultBinding) {
        *self.inner.write().await = Some(binding);
    }

    /// Removes the binding, returning what was bound.
    pub async fn clear(&self) -> Option<DefaultBinding> {
        self.inner.write().await.take()
    }

    /// Identifier of the bound account.
    pub async fn account_id(&self) -> Option<AccountId> {
        self.inner.read().await.as_ref().and_then(|b| b.account.id)
    }

    /// Email of the bound account.
    pub async fn email(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|b| b.account.email.clone())
    }
}
