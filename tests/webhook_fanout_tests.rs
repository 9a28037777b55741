//! Webhook fan-out against mock subscriber endpoints.

use std::sync::Arc;
use std::time::Duration;

use adnexum::repositories::WebhookConfigRepository;
use adnexum::repositories::webhook_config::NewWebhookConfig;
use adnexum::webhook_dispatch::{DispatchReport, WebhookDispatcher};
use serde_json::{Value, json};
use tokio_util::task::TaskTracker;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

mod test_utils;
use test_utils::{drain, lead_store_on, new_lead, setup_test_db, test_config};

fn subscription(url: String, events: &[&str]) -> NewWebhookConfig {
    NewWebhookConfig {
        url,
        events: events.iter().map(|e| e.to_string()).collect(),
        active: true,
    }
}

#[tokio::test]
async fn delivers_to_every_matching_subscriber() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/a"))
        .and(body_partial_json(json!({ "event": "lead.won" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks-only"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let db = setup_test_db().await?;
    let repo = WebhookConfigRepository::new(Arc::clone(&db));
    let user = Uuid::new_v4();
    repo.create(user, subscription(format!("{}/a", server.uri()), &["lead.won"]))
        .await?;
    repo.create(
        user,
        subscription(format!("{}/b", server.uri()), &["lead.won", "lead.created"]),
    )
    .await?;
    repo.create(
        user,
        subscription(format!("{}/tasks-only", server.uri()), &["task.created"]),
    )
    .await?;

    let dispatcher = WebhookDispatcher::new(&test_config(), repo)?;
    let report = dispatcher
        .dispatch(user, "lead.won", json!({ "id": "lead-1" }))
        .await?;

    assert_eq!(
        report,
        DispatchReport {
            count: 2,
            delivered: 2,
            failed: 0
        }
    );
    Ok(())
}

#[tokio::test]
async fn envelope_carries_event_payload_and_timestamp() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let db = setup_test_db().await?;
    let repo = WebhookConfigRepository::new(Arc::clone(&db));
    let user = Uuid::new_v4();
    repo.create(user, subscription(server.uri(), &["task.created"]))
        .await?;

    let dispatcher = WebhookDispatcher::new(&test_config(), repo)?;
    dispatcher
        .dispatch(user, "task.created", json!({ "title": "Llamar" }))
        .await?;

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body)?;
    assert_eq!(body["event"], "task.created");
    assert_eq!(body["payload"]["title"], "Llamar");
    assert!(body["timestamp"].as_str().is_some_and(|ts| ts.ends_with('Z')));
    Ok(())
}

#[tokio::test]
async fn failing_endpoint_does_not_block_siblings() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let db = setup_test_db().await?;
    let repo = WebhookConfigRepository::new(Arc::clone(&db));
    let user = Uuid::new_v4();
    repo.create(user, subscription(format!("{}/broken", server.uri()), &["lead.updated"]))
        .await?;
    repo.create(user, subscription(format!("{}/ok", server.uri()), &["lead.updated"]))
        .await?;

    let dispatcher = WebhookDispatcher::new(&test_config(), repo)?;
    let report = dispatcher.dispatch(user, "lead.updated", json!({})).await?;

    assert_eq!(report.count, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    Ok(())
}

#[tokio::test]
async fn slow_endpoint_times_out() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let db = setup_test_db().await?;
    let repo = WebhookConfigRepository::new(Arc::clone(&db));
    let user = Uuid::new_v4();
    repo.create(user, subscription(server.uri(), &["lead.created"]))
        .await?;

    let dispatcher = WebhookDispatcher::new(&test_config(), repo)?;
    let started = std::time::Instant::now();
    let report = dispatcher.dispatch(user, "lead.created", json!({})).await?;

    assert_eq!(report.failed, 1);
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[tokio::test]
async fn inactive_and_foreign_subscriptions_are_skipped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let db = setup_test_db().await?;
    let repo = WebhookConfigRepository::new(Arc::clone(&db));
    let user = Uuid::new_v4();
    let mut paused = subscription(server.uri(), &["lead.created"]);
    paused.active = false;
    repo.create(user, paused).await?;
    repo.create(Uuid::new_v4(), subscription(server.uri(), &["lead.created"]))
        .await?;

    let dispatcher = WebhookDispatcher::new(&test_config(), repo)?;
    let report = dispatcher.dispatch(user, "lead.created", json!({})).await?;
    assert_eq!(report, DispatchReport::default());
    Ok(())
}

#[tokio::test]
async fn lead_mutations_notify_in_background() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "event": "lead.created" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "event": "lead.won" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let db = setup_test_db().await?;
    let config = test_config();
    let user = Uuid::new_v4();
    WebhookConfigRepository::new(Arc::clone(&db))
        .create(user, subscription(server.uri(), &["lead.created", "lead.won"]))
        .await?;

    let tracker = TaskTracker::new();
    let store = lead_store_on(&db, &config, tracker.clone())?;
    let lead = store.create(user, new_lead("Pizzería")).await?;
    store.move_stage(user, lead.id, "ganado", None, None).await?;
    drain(&tracker).await;

    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn invalid_subscriptions_are_rejected() -> anyhow::Result<()> {
    let db = setup_test_db().await?;
    let repo = WebhookConfigRepository::new(Arc::clone(&db));
    let user = Uuid::new_v4();

    assert!(
        repo.create(user, subscription("ftp://example.com".into(), &["lead.created"]))
            .await
            .is_err()
    );
    assert!(
        repo.create(user, subscription("https://example.com".into(), &["lead.deleted"]))
            .await
            .is_err()
    );
    assert!(
        repo.create(user, subscription("https://example.com".into(), &[]))
            .await
            .is_err()
    );
    assert!(repo.list(user).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn lead_creation_survives_failing_subscriber() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/healthy"))
        .and(body_partial_json(json!({
            "event": "lead.created",
            "payload": { "business_name": "Heladería Sur" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tasks"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let db = setup_test_db().await?;
    let config = test_config();
    let user = Uuid::new_v4();
    let repo = WebhookConfigRepository::new(Arc::clone(&db));
    repo.create(user, subscription(format!("{}/healthy", server.uri()), &["lead.created"]))
        .await?;
    repo.create(user, subscription(format!("{}/broken", server.uri()), &["lead.created"]))
        .await?;
    repo.create(user, subscription(format!("{}/tasks", server.uri()), &["task.created"]))
        .await?;

    let tracker = TaskTracker::new();
    let store = lead_store_on(&db, &config, tracker.clone())?;
    let created = store.create(user, new_lead("Heladería Sur")).await?;
    assert_eq!(created.business_name, "Heladería Sur");
    drain(&tracker).await;

    server.verify().await;
    let healthy: Vec<_> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == "/healthy")
        .collect();
    assert_eq!(healthy.len(), 1);
    Ok(())
}
