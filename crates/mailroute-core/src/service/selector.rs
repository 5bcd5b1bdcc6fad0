//! Default account selection.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::binding::{DefaultBinding, DefaultCell};
use super::validator::Validator;
use crate::Result;
use crate::account::Account;
use crate::provider::Provider;
use crate::store::AccountStore;
use crate::transport::TransportFactory;

/// An account paired with its provider, ready for validation.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Candidate account (provider detached).
    pub account: Account,
    /// The account's provider.
    pub provider: Provider,
}

/// Orders fetched candidates for selection.
///
/// Accounts without a provider are dropped. The rest are ordered by provider
/// status (active first), then account creation time (oldest first); the
/// sort is stable so equal keys keep their fetched order.
#[must_use]
pub fn rank_candidates(accounts: Vec<Account>) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = accounts
        .into_iter()
        .filter_map(|mut account| {
            let provider = account.provider.take()?;
            Some(Candidate { account, provider })
        })
        .collect();
    ranked.sort_by_key(|c| (c.provider.status, c.account.created_at));
    ranked
}

/// Scans candidate accounts and binds the first one whose transport validates.
#[derive(Clone)]
pub struct DefaultSelector {
    accounts: Arc<dyn AccountStore>,
    factory: Arc<dyn TransportFactory>,
    validator: Validator,
    binding: DefaultCell,
    limit: usize,
    default_timeout: Duration,
}

impl DefaultSelector {
    /// Creates a selector scanning at most `limit` candidates.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        factory: Arc<dyn TransportFactory>,
        validator: Validator,
        binding: DefaultCell,
        limit: usize,
        default_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            factory,
            validator,
            binding,
            limit,
            default_timeout,
        }
    }

    /// Picks and binds a new default. Returns true if one was committed.
    ///
    /// Candidates are validated one at a time; the first success wins and no
    /// later candidate is tried. When nothing validates the current binding
    /// is left as it is.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate query fails.
    pub async fn select_default(&self) -> Result<bool> {
        let candidates = rank_candidates(self.accounts.find_candidates(self.limit).await?);
        debug!("Evaluating {} default account candidates", candidates.len());

        for Candidate { account, provider } in candidates {
            let validation = match self
                .validator
                .validate_with(&provider, &account.email, account.auth_override.as_ref())
                .await
            {
                Ok(validation) => validation,
                Err(e) => {
                    warn!("Skipping account {}: {e}", account.label());
                    continue;
                }
            };

            if !validation.ok {
                debug!("Account {} rejected as default", account.label());
                continue;
            }

            let fallback = self.binding.email().await;
            let binding = DefaultBinding::build(
                self.factory.as_ref(),
                account,
                provider,
                fallback.as_deref(),
                self.default_timeout,
            )?;
            info!(
                "Default mail account set to {} ({})",
                binding.account.label(),
                binding.account.email
            );
            self.binding.install(binding).await;
            return Ok(true);
        }

        warn!("No usable default mail account found");
        Ok(false)
    }
}
