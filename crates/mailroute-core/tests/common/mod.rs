//! Shared fixtures: in-memory repositories and a recording transport factory.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as TimeDelta, Utc};
use secrecy::ExposeSecret;

use mailroute_core::transport::{AuthType, ConnectionParams};
use mailroute_core::{
    Account, AccountRepository, Config, ConnectionMode, Database, MessageReceipt,
    OutgoingMessage, Provider, ProviderId, ProviderRepository, ProviderStatus, ProviderStore,
    Result, Security, SendRouter, SmtpDescriptor, Transport, TransportError, TransportFactory,
};

/// How a mock server at a given host behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Verifies and accepts mail.
    #[default]
    Healthy,
    /// Fails verification and rejects mail.
    Broken,
    /// Never answers the verification.
    Hanging,
}

/// Transport handle recording what it was asked to do.
#[derive(Debug)]
pub struct MockTransport {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub auth_type: AuthType,
    pub behavior: Behavior,
    pub verify_calls: AtomicUsize,
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn verify(&self) -> std::result::Result<(), TransportError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Healthy => Ok(()),
            Behavior::Broken => Err(TransportError::Other(format!(
                "connection refused by {}",
                self.host
            ))),
            Behavior::Hanging => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn send(
        &self,
        from: &str,
        message: &OutgoingMessage,
    ) -> std::result::Result<MessageReceipt, TransportError> {
        if self.behavior == Behavior::Broken {
            return Err(TransportError::Other("550 relay denied".into()));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((from.to_string(), message.subject.clone()));
        Ok(MessageReceipt {
            message_id: format!("<{}@{}>", sent.len(), self.host),
            response: vec!["2.0.0 OK".to_string()],
        })
    }
}

/// Factory handing out [`MockTransport`]s, keyed by host behavior.
#[derive(Debug, Default)]
pub struct MockFactory {
    behaviors: Mutex<HashMap<String, Behavior>>,
    built: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockFactory {
    pub fn set_behavior(&self, host: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(host.to_string(), behavior);
    }

    pub fn built(&self) -> Vec<Arc<MockTransport>> {
        self.built.lock().unwrap().clone()
    }

    pub fn build_count(&self) -> usize {
        self.built.lock().unwrap().len()
    }

    /// Hosts that received a verification, in call order of construction.
    pub fn verified_hosts(&self) -> Vec<String> {
        self.built()
            .iter()
            .filter(|t| t.verify_count() > 0)
            .map(|t| t.host.clone())
            .collect()
    }
}

impl TransportFactory for MockFactory {
    fn build(&self, params: ConnectionParams) -> Arc<dyn Transport> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&params.host)
            .copied()
            .unwrap_or_default();
        let transport = Arc::new(MockTransport {
            host: params.host.clone(),
            user: params.auth.user.clone(),
            pass: params.auth.pass.expose_secret().clone(),
            auth_type: params.auth.auth_type,
            behavior,
            verify_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        });
        self.built.lock().unwrap().push(Arc::clone(&transport));
        transport
    }
}

/// Provider store wrapper counting status updates.
#[derive(Debug)]
pub struct CountingProviders {
    pub inner: ProviderRepository,
    pub updates: AtomicUsize,
}

impl CountingProviders {
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderStore for CountingProviders {
    async fn find_by_id(&self, id: ProviderId) -> Result<Option<Provider>> {
        self.inner.find_by_id(id).await
    }

    async fn update_status(&self, id: ProviderId, status: ProviderStatus) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update_status(id, status).await
    }
}

/// Router wired to in-memory storage and a mock factory.
pub struct Harness {
    pub accounts: AccountRepository,
    pub providers: Arc<CountingProviders>,
    pub factory: Arc<MockFactory>,
    pub router: SendRouter,
}

pub async fn harness() -> Harness {
    harness_with(Config::default()).await
}

pub async fn harness_with(config: Config) -> Harness {
    let db = Database::in_memory().await.unwrap();
    let accounts = db.accounts();
    let providers = Arc::new(CountingProviders {
        inner: db.providers(),
        updates: AtomicUsize::new(0),
    });
    let factory = Arc::new(MockFactory::default());
    let router = SendRouter::new(
        config,
        Arc::new(accounts.clone()),
        Arc::clone(&providers) as Arc<dyn ProviderStore>,
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );
    Harness {
        accounts,
        providers,
        factory,
        router,
    }
}

impl Harness {
    /// Saves a provider served by `host`, with the given status.
    pub async fn provider(
        &self,
        host: &str,
        mode: ConnectionMode,
        status: ProviderStatus,
    ) -> Provider {
        let smtp = SmtpDescriptor::new(host, Security::StartTls);
        let mut provider =
            Provider::new(host, mode, smtp).with_secret(format!("secret-for-{host}"));
        self.providers.inner.save(&mut provider).await.unwrap();
        if status == ProviderStatus::Inactive {
            self.providers
                .inner
                .update_status(provider.id.unwrap(), status)
                .await
                .unwrap();
            provider.status = status;
        }
        provider
    }

    /// Saves an account created `age_minutes` ago.
    pub async fn account(&self, email: &str, provider: &Provider, age_minutes: i64) -> Account {
        let mut account = Account::new(email, provider.id.unwrap());
        account.created_at = Utc::now() - TimeDelta::minutes(age_minutes);
        self.accounts.save(&mut account).await.unwrap();
        account
    }

    /// Current stored status of a provider.
    pub async fn status_of(&self, provider: &Provider) -> ProviderStatus {
        self.providers
            .inner
            .find_by_id(provider.id.unwrap())
            .await
            .unwrap()
            .unwrap()
            .status
    }

    /// Polls until the provider reaches `status` or two seconds pass.
    pub async fn wait_for_status(&self, provider: &Provider, status: ProviderStatus) -> bool {
        for _ in 0..100 {
            if self.status_of(provider).await == status {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}
