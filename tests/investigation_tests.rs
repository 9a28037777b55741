//! Investigation job client against a mock investigation service.

use std::time::Duration;

use adnexum::investigation::{InvestigationClient, InvestigationError, JobState, JobStatus};
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

const POLL: Duration = Duration::from_millis(20);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn service_client(base: impl Into<String>) -> InvestigationClient {
    InvestigationClient::new(base, REQUEST_TIMEOUT).expect("http client builds")
}

async fn mount_submit(server: &MockServer, job_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/investigate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": job_id })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn submit_sends_target_and_options() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/investigate"))
        .and(body_json(json!({
            "url": "https://barcentral.com.ar/",
            "include_maps": true,
            "include_social": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "job-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = service_client(format!("{}/", server.uri()));
    let job = client.start("https://barcentral.com.ar", true, false).await?;

    assert_eq!(job.job_id, "job-1");
    assert_eq!(job.status, JobState::Pending);
    Ok(())
}

#[tokio::test]
async fn invalid_target_is_rejected_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = service_client(server.uri());
    for target in ["barcentral.com.ar", "ftp://barcentral.com.ar", ""] {
        let err = client.start(target, false, false).await.unwrap_err();
        assert!(matches!(err, InvestigationError::InvalidUrl(_)));
    }
}

#[tokio::test]
async fn wait_polls_until_completed() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_submit(&server, "job-2").await;
    Mock::given(method("GET"))
        .and(path("/api/investigate/job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job-2",
            "status": "running",
            "progress": 40,
            "current_step": "Analizando sitio web..."
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/investigate/job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job-2",
            "status": "completed",
            "progress": 100,
            "current_step": "Listo",
            "result": {
                "diagnosis": {
                    "business_name": "Bar Central",
                    "overall_score": 64,
                    "problems": [{ "title": "Sin reservas online", "severity": 6 }]
                },
                "loom_script": "Hola, soy..."
            }
        })))
        .mount(&server)
        .await;

    let client = service_client(server.uri());
    let job = client.start("https://barcentral.com.ar", false, false).await?;
    let (progress_tx, progress_rx) = watch::channel::<Option<JobStatus>>(None);

    let result = client
        .wait(&job.job_id, POLL, &progress_tx, CancellationToken::new())
        .await?;

    assert_eq!(result.business_name, "Bar Central");
    assert_eq!(result.overall_score, 64);
    assert_eq!(result.problems.len(), 1);
    assert_eq!(result.loom_script, "Hola, soy...");

    let last = progress_rx.borrow().clone().expect("progress published");
    assert_eq!(last.status, JobState::Completed);
    assert_eq!(last.progress, 100);
    Ok(())
}

#[tokio::test]
async fn failed_job_surfaces_its_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/investigate/job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job-3",
            "status": "failed",
            "progress": 30,
            "current_step": "Error",
            "error": "sitio inaccesible"
        })))
        .mount(&server)
        .await;

    let client = service_client(server.uri());
    let (progress_tx, _progress_rx) = watch::channel(None);
    let err = client
        .wait("job-3", POLL, &progress_tx, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        InvestigationError::JobFailed(message) => assert_eq!(message, "sitio inaccesible"),
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn completed_job_without_result_is_an_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/investigate/job-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job-4",
            "status": "completed",
            "progress": 100,
            "current_step": "Listo"
        })))
        .mount(&server)
        .await;

    let client = service_client(server.uri());
    let (progress_tx, _progress_rx) = watch::channel(None);
    let err = client
        .wait("job-4", POLL, &progress_tx, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, InvestigationError::MissingResult));
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_polling() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/investigate/job-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job-5",
            "status": "running",
            "progress": 10,
            "current_step": "Buscando en Google Maps..."
        })))
        .mount(&server)
        .await;

    let client = service_client(server.uri());
    let (progress_tx, _progress_rx) = watch::channel(None);
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        client.wait("job-5", POLL, &progress_tx, shutdown),
    )
    .await?
    .unwrap_err();
    assert!(matches!(err, InvestigationError::Cancelled));

    let polls = server.received_requests().await.unwrap_or_default().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = server.received_requests().await.unwrap_or_default().len();
    assert_eq!(polls, after);
    Ok(())
}

#[tokio::test]
async fn service_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/investigate/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("job not found"))
        .mount(&server)
        .await;

    let client = service_client(server.uri());
    match client.status("missing").await {
        Err(InvestigationError::Api { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "job not found");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_interrupts_in_flight_poll() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/investigate/job-6"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "job_id": "job-6",
                    "status": "running",
                    "progress": 20,
                    "current_step": "Analizando sitio web..."
                }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = service_client(server.uri());
    let (progress_tx, progress_rx) = watch::channel(None);
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = client
        .wait("job-6", Duration::from_millis(50), &progress_tx, shutdown)
        .await
        .unwrap_err();

    assert!(matches!(err, InvestigationError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(progress_rx.borrow().is_none());
    Ok(())
}

#[tokio::test]
async fn already_cancelled_token_sends_no_request() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = service_client(server.uri());
    let (progress_tx, _progress_rx) = watch::channel(None);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let err = client
        .wait("job-7", POLL, &progress_tx, shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, InvestigationError::Cancelled));
    Ok(())
}

#[tokio::test]
async fn stalled_status_endpoint_times_out() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/investigate/job-8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "job_id": "job-8", "status": "running" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = InvestigationClient::new(server.uri(), Duration::from_millis(200))?;
    let (progress_tx, _progress_rx) = watch::channel(None);

    let started = std::time::Instant::now();
    let err = client
        .wait("job-8", POLL, &progress_tx, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, InvestigationError::Timeout), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}
