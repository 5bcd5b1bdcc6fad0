//! Demotions started by a validation survive the runtime going away once the
//! router has been shut down.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use common::{Behavior, MockFactory};
use mailroute_core::{
    Config, ConnectionMode, Database, Provider, ProviderStatus, ProviderStore, Security,
    SendRouter, SmtpDescriptor,
};
use tokio::runtime::Runtime;

fn stored_status(path: &str, provider: &Provider) -> ProviderStatus {
    let runtime = Runtime::new().unwrap();
    runtime.block_on(async {
        let db = Database::open(path).await.unwrap();
        db.providers()
            .find_by_id(provider.id.unwrap())
            .await
            .unwrap()
            .unwrap()
            .status
    })
}

#[test]
fn demotion_lands_before_runtime_is_dropped() {
    for round in 0..10 {
        let path = std::env::temp_dir()
            .join(format!("mailroute-shutdown-{}.db", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();

        let runtime = Runtime::new().unwrap();
        let provider = runtime.block_on(async {
            let db = Database::open(&path).await.unwrap();
            let factory = Arc::new(MockFactory::default());
            factory.set_behavior("smtp.down.test", Behavior::Broken);
            let router = SendRouter::new(
                Config::default(),
                Arc::new(db.accounts()),
                Arc::new(db.providers()),
                factory,
            );

            let mut provider = Provider::new(
                "down",
                ConnectionMode::Password,
                SmtpDescriptor::new("smtp.down.test", Security::StartTls),
            );
            db.providers().save(&mut provider).await.unwrap();

            let validation = router.validate(&provider, "ops@down.test").await.unwrap();
            assert!(!validation.ok);
            router.shutdown().await;
            provider
        });
        drop(runtime);

        assert_eq!(
            stored_status(&path, &provider),
            ProviderStatus::Inactive,
            "demotion lost in round {round}"
        );
        let _ = std::fs::remove_file(&path);
    }
}

#[tokio::test]
async fn shutdown_without_pending_work_returns() {
    let db = Database::in_memory().await.unwrap();
    let router = SendRouter::new(
        Config::default(),
        Arc::new(db.accounts()),
        Arc::new(db.providers()),
        Arc::new(MockFactory::default()),
    );
    router.shutdown().await;
    router.shutdown().await;
}
