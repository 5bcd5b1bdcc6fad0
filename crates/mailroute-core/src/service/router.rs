//! Send routing over the default binding and per-account transports.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::binding::{DefaultBinding, DefaultCell};
use super::selector::DefaultSelector;
use super::validator::{Validation, Validator};
use crate::account::{Account, AccountId};
use crate::config::Config;
use crate::message::{MessageReceipt, OutgoingMessage};
use crate::provider::Provider;
use crate::store::{AccountStore, ProviderStore};
use crate::transport::{TransportFactory, send_within};
use crate::{Error, Result};

/// Public view of the default binding. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultInfo {
    /// True if a default is bound.
    pub found: bool,
    /// Email of the bound account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Routes outgoing mail and manages the default binding.
#[derive(Clone)]
pub struct SendRouter {
    accounts: Arc<dyn AccountStore>,
    providers: Arc<dyn ProviderStore>,
    factory: Arc<dyn TransportFactory>,
    binding: DefaultCell,
    validator: Validator,
    selector: DefaultSelector,
    config: Config,
}

impl SendRouter {
    /// Creates a router with a fresh, unbound default cell.
    #[must_use]
    pub fn new(
        config: Config,
        accounts: Arc<dyn AccountStore>,
        providers: Arc<dyn ProviderStore>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self::with_binding(config, accounts, providers, factory, DefaultCell::new())
    }

    /// Creates a router around an existing default cell.
    #[must_use]
    pub fn with_binding(
        config: Config,
        accounts: Arc<dyn AccountStore>,
        providers: Arc<dyn ProviderStore>,
        factory: Arc<dyn TransportFactory>,
        binding: DefaultCell,
    ) -> Self {
        let validator = Validator::new(
            Arc::clone(&providers),
            Arc::clone(&factory),
            binding.clone(),
            config.timeout(),
        );
        let selector = DefaultSelector::new(
            Arc::clone(&accounts),
            Arc::clone(&factory),
            validator.clone(),
            binding.clone(),
            config.candidate_limit,
            config.timeout(),
        );
        Self {
            accounts,
            providers,
            factory,
            binding,
            validator,
            selector,
            config,
        }
    }

    /// Runs default selection if the configuration asks for it at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate query fails.
    pub async fn boot(&self) -> Result<bool> {
        if !self.config.set_default_on_mount {
            debug!("Default selection at startup disabled");
            return Ok(false);
        }
        self.select_default().await
    }

    /// Picks a new default from the candidate pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate query fails.
    pub async fn select_default(&self) -> Result<bool> {
        self.selector.select_default().await
    }

    /// Validates a provider for a mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider has no SMTP configuration.
    pub async fn validate(&self, provider: &Provider, mailbox: &str) -> Result<Validation> {
        self.validator.validate(provider, mailbox).await
    }

    /// Binds `account` as the default without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if the account's provider cannot
    /// be resolved or has no SMTP configuration.
    pub async fn set_default(&self, mut account: Account) -> Result<()> {
        let provider = self.provider_for(&mut account).await?;
        let fallback = self.binding.email().await;
        let binding = DefaultBinding::build(
            self.factory.as_ref(),
            account,
            provider,
            fallback.as_deref(),
            self.config.timeout(),
        )?;
        info!(
            "Default mail account set to {} ({})",
            binding.account.label(),
            binding.account.email
        );
        self.binding.install(binding).await;
        Ok(())
    }

    /// Reacts to the default account going away.
    ///
    /// With no id, or the id of the bound account, selection runs again and
    /// the binding is cleared if nothing replaces it. Any other id is a no-op.
    /// Returns true if a default is bound afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate query fails; the stale binding is
    /// cleared first.
    pub async fn reset_default(&self, account_id: Option<AccountId>) -> Result<bool> {
        let current = self.binding.account_id().await;
        if let Some(id) = account_id
            && current != Some(id)
        {
            debug!("Reset for account {id} ignored: not the default");
            return Ok(current.is_some());
        }

        match self.selector.select_default().await {
            Ok(true) => Ok(true),
            Ok(false) => {
                if self.binding.clear().await.is_some() {
                    info!("Default mail account cleared");
                }
                Ok(false)
            }
            Err(e) => {
                self.binding.clear().await;
                Err(e)
            }
        }
    }

    /// Sends `message` through the default or the requested account.
    ///
    /// # Errors
    ///
    /// - [`Error::NoUsableTransport`] if no account is requested and none is bound
    /// - [`Error::ConfigurationMissing`] if the requested account or its provider
    ///   cannot be resolved
    /// - [`Error::SendFailed`] if the transport rejects the message
    pub async fn send(&self, message: &OutgoingMessage) -> Result<MessageReceipt> {
        let route = self.route(message.account_id).await?;
        let from = message
            .from
            .clone()
            .unwrap_or_else(|| route.account.email.clone());

        let receipt = send_within(route.transport.as_ref(), &from, message, route.timeout)
            .await
            .map_err(|source| {
                warn!("Send through account {} failed: {source}", route.account.label());
                Error::SendFailed {
                    account: route.account.label(),
                    source,
                }
            })?;

        debug!(
            "Sent {} through account {}",
            receipt.message_id,
            route.account.label()
        );
        Ok(receipt)
    }

    /// Describes the current default binding.
    pub async fn default_info(&self) -> DefaultInfo {
        let email = self.binding.email().await;
        DefaultInfo {
            found: email.is_some(),
            email,
        }
    }

    /// Waits for background work started by validations, such as provider
    /// demotions. Call before dropping the runtime.
    pub async fn shutdown(&self) {
        self.validator.drain().await;
    }

    /// The shared default cell.
    #[must_use]
    pub const fn binding(&self) -> &DefaultCell {
        &self.binding
    }

    async fn route(&self, account_id: Option<AccountId>) -> Result<DefaultBinding> {
        let current = self.binding.get().await;
        match (account_id, current) {
            (None, Some(binding)) => Ok(binding),
            (Some(id), Some(binding)) if binding.account.id == Some(id) => Ok(binding),
            (None, None) => Err(Error::NoUsableTransport),
            (Some(id), _) => {
                let mut account = self
                    .accounts
                    .find_by_id(id, true)
                    .await
                    .map_err(|e| {
                        warn!("Could not load account {id}: {e}");
                        Error::ConfigurationMissing(format!("account {id} could not be loaded"))
                    })?
                    .ok_or_else(|| Error::ConfigurationMissing(format!("account {id} not found")))?;
                let provider = self.provider_for(&mut account).await?;
                let fallback = self.binding.email().await;
                debug!("Building one-off transport for account {id}");
                DefaultBinding::build(
                    self.factory.as_ref(),
                    account,
                    provider,
                    fallback.as_deref(),
                    self.config.timeout(),
                )
            }
        }
    }

    /// Takes the attached provider or loads it by reference.
    async fn provider_for(&self, account: &mut Account) -> Result<Provider> {
        if let Some(provider) = account.provider.take() {
            return Ok(provider);
        }

        let missing = || {
            Error::ConfigurationMissing(format!(
                "account {} references provider {} which cannot be loaded",
                account.label(),
                account.provider_id
            ))
        };
        match self.providers.find_by_id(account.provider_id).await {
            Ok(Some(provider)) => Ok(provider),
            Ok(None) => Err(missing()),
            Err(e) => {
                warn!("Provider lookup for account {} failed: {e}", account.label());
                Err(missing())
            }
        }
    }
}
