//! Transport validation and failure-driven provider demotion.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::binding::DefaultCell;
use crate::Result;
use crate::provider::{Provider, ProviderId, ProviderStatus};
use crate::store::ProviderStore;
use crate::transport::{TransportError, TransportFactory, map_credentials, verify_within};

/// Outcome of a validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    /// True if the transport connected and authenticated.
    pub ok: bool,
    /// Diagnostic for a failed validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Validation {
    const fn passed() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    const fn failed(message: String) -> Self {
        Self {
            ok: false,
            message: Some(message),
        }
    }
}

/// Builds a transport for a provider and checks that it works.
#[derive(Clone)]
pub struct Validator {
    providers: Arc<dyn ProviderStore>,
    factory: Arc<dyn TransportFactory>,
    binding: DefaultCell,
    default_timeout: Duration,
    demotions: Arc<Mutex<JoinSet<()>>>,
}

impl Validator {
    /// Creates a validator.
    #[must_use]
    pub fn new(
        providers: Arc<dyn ProviderStore>,
        factory: Arc<dyn TransportFactory>,
        binding: DefaultCell,
        default_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            factory,
            binding,
            default_timeout,
            demotions: Arc::default(),
        }
    }

    /// Validates `provider` for `mailbox`.
    ///
    /// A failed check is returned as `ok: false`, never as an error. When the
    /// provider is active and persisted, a background demotion to inactive is
    /// started; its own failure is only logged.
    ///
    /// # Errors
    ///
    /// Returns an error only if the provider has no SMTP configuration.
    pub async fn validate(&self, provider: &Provider, mailbox: &str) -> Result<Validation> {
        self.validate_with(provider, mailbox, None).await
    }

    pub(crate) async fn validate_with(
        &self,
        provider: &Provider,
        mailbox: &str,
        pass_override: Option<&SecretString>,
    ) -> Result<Validation> {
        let fallback = self.binding.email().await;
        let params = map_credentials(provider, mailbox, fallback.as_deref())?
            .with_pass_override(pass_override)
            .with_default_timeout(self.default_timeout);
        let limit = params.timeout.unwrap_or(self.default_timeout);
        let endpoint = params.endpoint();
        let transport = self.factory.build(params);

        match verify_within(transport.as_ref(), limit).await {
            Ok(()) => {
                debug!("Provider {} verified at {endpoint}", provider.label());
                Ok(Validation::passed())
            }
            Err(e) => {
                let message = failure_message(provider, &e);
                warn!("{message}");
                if provider.status == ProviderStatus::Active
                    && let Some(id) = provider.id
                {
                    self.spawn_demotion(id);
                }
                Ok(Validation::failed(message))
            }
        }
    }

    /// Waits for every demotion started so far.
    ///
    /// Callers that are about to drop the runtime or the last validator
    /// handle must call this first, or pending status writes are cancelled.
    pub async fn drain(&self) {
        let mut pending = std::mem::take(&mut *self.lock_demotions());
        if !pending.is_empty() {
            debug!("Waiting for {} provider demotions", pending.len());
        }
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!("Provider demotion task failed: {e}");
            }
        }
    }

    /// Starts the demotion of `id` to inactive; errors are logged, never returned.
    fn spawn_demotion(&self, id: ProviderId) {
        let providers = Arc::clone(&self.providers);
        let mut demotions = self.lock_demotions();
        // Reap finished writes so the set only holds pending ones.
        while demotions.try_join_next().is_some() {}
        demotions.spawn(async move {
            match providers.update_status(id, ProviderStatus::Inactive).await {
                Ok(()) => info!("Provider {id} marked inactive after failed verification"),
                Err(e) => warn!("Could not mark provider {id} inactive: {e}"),
            }
        });
    }

    fn lock_demotions(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.demotions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn failure_message(provider: &Provider, error: &TransportError) -> String {
    provider.id.map_or_else(
        || format!("Mail transport verification failed: {error}"),
        |id| format!("Mail transport verification failed for provider {id}: {error}"),
    )
}
