//! SMTP transport backed by a pooled `lettre` client.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use secrecy::ExposeSecret;
use tracing::debug;

use super::{AuthType, ConnectionParams, Transport, TransportError, TransportFactory};
use crate::message::{MessageReceipt, OutgoingMessage, generate_message_id};
use crate::provider::Security;

/// Extra descriptor field naming the EHLO client hostname.
const HELLO_NAME: &str = "helloName";

/// Extra descriptor field disabling certificate verification.
const ACCEPT_INVALID_CERTS: &str = "acceptInvalidCerts";

/// Factory producing [`SmtpTransport`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpTransportFactory;

impl TransportFactory for SmtpTransportFactory {
    fn build(&self, params: ConnectionParams) -> Arc<dyn Transport> {
        Arc::new(SmtpTransport::new(&params))
    }
}

/// Pooled SMTP handle.
///
/// Construction never fails: parameters the client rejects are kept as an
/// error and reported by the first `verify` or `send`.
pub struct SmtpTransport {
    endpoint: String,
    inner: Result<AsyncSmtpTransport<Tokio1Executor>, String>,
}

impl SmtpTransport {
    /// Creates a handle for `params`. Must be called within a tokio runtime.
    #[must_use]
    pub fn new(params: &ConnectionParams) -> Self {
        let endpoint = params.endpoint();
        let inner = build_client(params).map_err(|e| e.to_string());
        if let Err(e) = &inner {
            debug!("Transport for {endpoint} has unusable parameters: {e}");
        }
        Self { endpoint, inner }
    }

    fn client(&self) -> Result<&AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        self.inner
            .as_ref()
            .map_err(|e| TransportError::InvalidParams(e.clone()))
    }
}

impl fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("endpoint", &self.endpoint)
            .field("usable", &self.inner.is_ok())
            .finish()
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn verify(&self) -> Result<(), TransportError> {
        if self.client()?.test_connection().await? {
            debug!("SMTP connection check passed for {}", self.endpoint);
            Ok(())
        } else {
            Err(TransportError::Rejected)
        }
    }

    async fn send(
        &self,
        from: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageReceipt, TransportError> {
        let client = self.client()?;
        let message_id = generate_message_id(from);
        let email = message.to_email(from, &message_id)?;

        let response = client.send(email).await?;
        debug!(
            "Message {message_id} accepted by {} with code {}",
            self.endpoint,
            response.code()
        );

        Ok(MessageReceipt {
            message_id,
            response: response.message().map(str::to_string).collect(),
        })
    }
}

/// SASL mechanisms offered for an auth type.
fn mechanisms(auth_type: AuthType) -> Vec<Mechanism> {
    match auth_type {
        AuthType::Login => vec![Mechanism::Plain, Mechanism::Login],
        AuthType::OAuth2 => vec![Mechanism::Xoauth2],
    }
}

fn build_client(
    params: &ConnectionParams,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, lettre::transport::smtp::Error> {
    let tls = match params.security {
        Security::None => Tls::None,
        Security::Tls => Tls::Wrapper(tls_parameters(params)?),
        Security::StartTls => Tls::Required(tls_parameters(params)?),
    };

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(params.host.as_str())
        .port(params.port)
        .tls(tls)
        .timeout(params.timeout);

    if let Some(name) = params.extra.get(HELLO_NAME) {
        builder = builder.hello_name(ClientId::Domain(name.clone()));
    }

    if !params.auth.user.is_empty() {
        builder = builder
            .credentials(Credentials::new(
                params.auth.user.clone(),
                params.auth.pass.expose_secret().clone(),
            ))
            .authentication(mechanisms(params.auth.auth_type));
    }

    Ok(builder.build())
}

fn tls_parameters(
    params: &ConnectionParams,
) -> Result<TlsParameters, lettre::transport::smtp::Error> {
    TlsParameters::builder(params.host.clone())
        .dangerous_accept_invalid_certs(params.extra_flag(ACCEPT_INVALID_CERTS))
        .build()
}
