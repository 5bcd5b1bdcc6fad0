//! Default selection, validation and provider demotion.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::{Behavior, harness, harness_with};
use mailroute_core::{
    Config, ConnectionMode, Error, Provider, ProviderStatus, Security, SmtpDescriptor,
};

#[tokio::test]
async fn no_candidates_binds_nothing() {
    let h = harness().await;
    assert!(!h.router.select_default().await.unwrap());
    assert!(!h.router.default_info().await.found);
}

#[tokio::test]
async fn first_working_candidate_wins_and_later_ones_are_untouched() {
    let h = harness().await;
    h.factory.set_behavior("smtp.dead.test", Behavior::Broken);
    let dead = h
        .provider("smtp.dead.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;
    let good = h
        .provider("smtp.good.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;
    let spare = h
        .provider("smtp.spare.test", ConnectionMode::Password, ProviderStatus::Inactive)
        .await;

    // Oldest first among active providers; the inactive one ranks last
    // despite being the oldest of all.
    h.account("spare@spare.test", &spare, 500).await;
    h.account("dead@dead.test", &dead, 300).await;
    h.account("good@good.test", &good, 200).await;
    h.account("later@good.test", &good, 100).await;

    assert!(h.router.select_default().await.unwrap());
    assert_eq!(
        h.router.default_info().await.email.as_deref(),
        Some("good@good.test")
    );
    assert_eq!(
        h.factory.verified_hosts(),
        ["smtp.dead.test", "smtp.good.test"]
    );
}

#[tokio::test]
async fn failing_candidates_are_never_bound() {
    let h = harness().await;
    h.factory.set_behavior("smtp.dead.test", Behavior::Broken);
    let dead = h
        .provider("smtp.dead.test", ConnectionMode::Password, ProviderStatus::Inactive)
        .await;
    h.account("a@dead.test", &dead, 20).await;
    h.account("b@dead.test", &dead, 10).await;

    assert!(!h.router.select_default().await.unwrap());
    assert!(!h.router.default_info().await.found);
    assert_eq!(h.factory.verified_hosts().len(), 2);
}

#[tokio::test]
async fn failed_selection_keeps_existing_binding() {
    let h = harness().await;
    let up = h
        .provider("smtp.up.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;
    let bound = h.account("bound@up.test", &up, 10).await;
    h.router.set_default(bound).await.unwrap();

    h.factory.set_behavior("smtp.up.test", Behavior::Broken);
    assert!(!h.router.select_default().await.unwrap());
    assert_eq!(
        h.router.default_info().await.email.as_deref(),
        Some("bound@up.test")
    );
}

#[tokio::test]
async fn candidate_limit_bounds_the_scan() {
    let h = harness_with(Config {
        candidate_limit: 2,
        ..Config::default()
    })
    .await;
    h.factory.set_behavior("smtp.dead.test", Behavior::Broken);
    let dead = h
        .provider("smtp.dead.test", ConnectionMode::Password, ProviderStatus::Inactive)
        .await;
    let good = h
        .provider("smtp.good.test", ConnectionMode::Password, ProviderStatus::Inactive)
        .await;
    h.account("a@dead.test", &dead, 30).await;
    h.account("b@dead.test", &dead, 20).await;
    h.account("c@good.test", &good, 10).await;

    assert!(!h.router.select_default().await.unwrap());
    assert_eq!(h.factory.verified_hosts(), ["smtp.dead.test", "smtp.dead.test"]);
}

#[tokio::test]
async fn failed_validation_demotes_active_provider() {
    let h = harness().await;
    h.factory.set_behavior("smtp.flaky.test", Behavior::Broken);
    let provider = h
        .provider("smtp.flaky.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;

    let validation = h.router.validate(&provider, "ops@flaky.test").await.unwrap();
    assert!(!validation.ok);
    assert!(validation.message.unwrap().contains("smtp.flaky.test"));

    assert!(
        h.wait_for_status(&provider, ProviderStatus::Inactive).await,
        "provider was not demoted"
    );
    assert_eq!(h.providers.update_count(), 1);
}

#[tokio::test]
async fn inactive_provider_is_not_demoted_again() {
    let h = harness().await;
    h.factory.set_behavior("smtp.flaky.test", Behavior::Broken);
    let provider = h
        .provider("smtp.flaky.test", ConnectionMode::Password, ProviderStatus::Inactive)
        .await;

    let validation = h.router.validate(&provider, "ops@flaky.test").await.unwrap();
    assert!(!validation.ok);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.providers.update_count(), 0);
}

#[tokio::test]
async fn successful_validation_leaves_status_alone() {
    let h = harness().await;
    let provider = h
        .provider("smtp.ok.test", ConnectionMode::Password, ProviderStatus::Inactive)
        .await;

    let validation = h.router.validate(&provider, "ops@ok.test").await.unwrap();
    assert!(validation.ok);
    assert!(validation.message.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.status_of(&provider).await, ProviderStatus::Inactive);
    assert_eq!(h.providers.update_count(), 0);
}

#[tokio::test]
async fn unpersisted_provider_is_validated_without_demotion() {
    let h = harness().await;
    h.factory.set_behavior("smtp.draft.test", Behavior::Broken);
    let draft = Provider::new(
        "draft",
        ConnectionMode::Password,
        SmtpDescriptor::new("smtp.draft.test", Security::Tls),
    );

    let validation = h.router.validate(&draft, "me@draft.test").await.unwrap();
    assert!(!validation.ok);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.providers.update_count(), 0);
}

#[tokio::test]
async fn provider_without_smtp_settings_is_an_error() {
    let h = harness().await;
    let provider = Provider {
        name: "empty".to_string(),
        ..Default::default()
    };
    let err = h.router.validate(&provider, "me@x.test").await.unwrap_err();
    assert!(matches!(err, Error::ConfigurationMissing(_)));
    assert_eq!(h.factory.build_count(), 0);
}

#[tokio::test]
async fn timed_out_verification_counts_as_failure() {
    let h = harness_with(Config {
        timeout_secs: 1,
        ..Config::default()
    })
    .await;
    h.factory.set_behavior("smtp.slow.test", Behavior::Hanging);
    let slow = h
        .provider("smtp.slow.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;
    let fast = h
        .provider("smtp.fast.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;
    h.account("slow@slow.test", &slow, 20).await;
    h.account("fast@fast.test", &fast, 10).await;

    assert!(h.router.select_default().await.unwrap());
    assert_eq!(
        h.router.default_info().await.email.as_deref(),
        Some("fast@fast.test")
    );
    assert!(h.wait_for_status(&slow, ProviderStatus::Inactive).await);
}

#[tokio::test]
async fn boot_selects_only_when_enabled() {
    let off = harness().await;
    let provider = off
        .provider("smtp.a.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;
    off.account("a@a.test", &provider, 1).await;
    assert!(!off.router.boot().await.unwrap());
    assert_eq!(off.factory.build_count(), 0);

    let on = harness_with(Config {
        set_default_on_mount: true,
        ..Config::default()
    })
    .await;
    let provider = on
        .provider("smtp.a.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;
    on.account("a@a.test", &provider, 1).await;
    assert!(on.router.boot().await.unwrap());
    assert_eq!(
        on.router.default_info().await.email.as_deref(),
        Some("a@a.test")
    );
}

#[tokio::test]
async fn selected_default_is_used_for_sending() {
    let h = harness().await;
    let provider = h
        .provider("smtp.a.test", ConnectionMode::Password, ProviderStatus::Active)
        .await;
    h.account("a@a.test", &provider, 1).await;
    assert!(h.router.select_default().await.unwrap());
    let builds = h.factory.build_count();

    let receipt = h
        .router
        .send(
            &mailroute_core::OutgoingMessage::new("hi")
                .to("rcpt@example.com")
                .text("body"),
        )
        .await
        .unwrap();
    assert!(!receipt.message_id.is_empty());
    assert_eq!(h.factory.build_count(), builds);
}
