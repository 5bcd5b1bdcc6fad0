//! The SMTP factory against a local listener that hangs up immediately.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use tokio::net::TcpListener;

use mailroute_core::{
    Account, Config, ConnectionMode, Database, Error, OutgoingMessage, Provider, ProviderStatus,
    ProviderStore, Security, SendRouter, SmtpDescriptor, SmtpTransportFactory,
};

/// Accepts connections and drops them without a greeting.
async fn hang_up_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    port
}

fn router(db: &Database) -> SendRouter {
    SendRouter::new(
        Config {
            timeout_secs: 5,
            ..Config::default()
        },
        Arc::new(db.accounts()),
        Arc::new(db.providers()),
        Arc::new(SmtpTransportFactory),
    )
}

fn local_provider(port: u16) -> Provider {
    let mut smtp = SmtpDescriptor::new("127.0.0.1", Security::None);
    smtp.port = port;
    Provider::new("local", ConnectionMode::Password, smtp).with_secret("pw")
}

#[tokio::test]
async fn dropped_connection_fails_validation_and_demotes() {
    let port = hang_up_server().await;
    let db = Database::in_memory().await.unwrap();
    let router = router(&db);
    let mut provider = local_provider(port);
    db.providers().save(&mut provider).await.unwrap();

    let validation = router.validate(&provider, "me@local.test").await.unwrap();
    assert!(!validation.ok);
    assert!(validation.message.is_some());

    let mut demoted = false;
    for _ in 0..100 {
        let stored = db
            .providers()
            .find_by_id(provider.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        if stored.status == ProviderStatus::Inactive {
            demoted = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(demoted);
}

#[tokio::test]
async fn dropped_connection_fails_send() {
    let port = hang_up_server().await;
    let db = Database::in_memory().await.unwrap();
    let router = router(&db);
    let mut provider = local_provider(port);
    db.providers().save(&mut provider).await.unwrap();
    let mut account = Account::new("me@local.test", provider.id.unwrap());
    db.accounts().save(&mut account).await.unwrap();

    router.set_default(account).await.unwrap();
    let err = router
        .send(
            &OutgoingMessage::new("unreachable")
                .to("rcpt@example.com")
                .text("body"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SendFailed { .. }));
}
