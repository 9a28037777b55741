//! # Webhook Fan-out
//!
//! Best-effort delivery of lead and task events to the user's subscriber
//! endpoints. Every matching endpoint is attempted concurrently, bounded by a
//! semaphore, and each attempt has its own timeout. Failures are logged and
//! counted, never retried and never surfaced to the caller of the mutation
//! that produced the event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use metrics::{counter, histogram};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::CrmError;
use crate::models::webhook_config;
use crate::repositories::WebhookConfigRepository;

/// Event names subscribers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookEvent {
    LeadCreated,
    LeadUpdated,
    LeadWon,
    TaskCreated,
}

impl WebhookEvent {
    pub const ALL: [WebhookEvent; 4] = [
        WebhookEvent::LeadCreated,
        WebhookEvent::LeadUpdated,
        WebhookEvent::LeadWon,
        WebhookEvent::TaskCreated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WebhookEvent::LeadCreated => "lead.created",
            WebhookEvent::LeadUpdated => "lead.updated",
            WebhookEvent::LeadWon => "lead.won",
            WebhookEvent::TaskCreated => "task.created",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body POSTed to every subscriber.
#[derive(Debug, Serialize)]
struct Envelope {
    event: String,
    payload: Value,
    timestamp: String,
}

impl Envelope {
    fn new(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispatchReport {
    /// Matching endpoints
    pub count: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint answered {0}")]
    Status(StatusCode),
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error("dispatcher is shutting down")]
    Closed,
}

impl DeliveryError {
    fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Transport(_) => "transport",
            DeliveryError::Status(_) => "status",
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::Closed => "closed",
        }
    }
}

/// scheme://host of a subscriber URL, for logs.
fn redacted_target(webhook_url: &str) -> String {
    Url::parse(webhook_url)
        .ok()
        .map(|parsed| {
            let host = parsed.host_str().unwrap_or("unknown");
            format!("{}://{}", parsed.scheme(), host)
        })
        .unwrap_or_else(|| "[invalid-url]".to_string())
}

#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: Client,
    configs: WebhookConfigRepository,
    timeout: Duration,
    max_concurrency: usize,
}

impl WebhookDispatcher {
    pub fn new(config: &AppConfig, configs: WebhookConfigRepository) -> Result<Self, reqwest::Error> {
        let timeout = config.webhook_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("adnexum/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            configs,
            timeout,
            max_concurrency: config.webhook_max_concurrency.max(1),
        })
    }

    /// Delivers `event` to every active subscriber of the user and waits for all attempts.
    ///
    /// Only loading the subscriber list can fail; delivery failures are in the report.
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        event: &str,
        payload: Value,
    ) -> Result<DispatchReport, CrmError> {
        let targets = self.configs.subscribers(user_id, event).await?;
        if targets.is_empty() {
            debug!(user_id = %user_id, event, "No webhook subscribers");
            return Ok(DispatchReport::default());
        }
        Ok(self.deliver_all(targets, event, payload).await)
    }

    /// Runs [`dispatch`](Self::dispatch) on `tracker` so shutdown can wait for it.
    pub fn dispatch_in_background(
        &self,
        tracker: &TaskTracker,
        user_id: Uuid,
        event: WebhookEvent,
        payload: Value,
    ) {
        let dispatcher = self.clone();
        tracker.spawn(async move {
            match dispatcher.dispatch(user_id, event.as_str(), payload).await {
                Ok(report) if report.failed > 0 => {
                    warn!(user_id = %user_id, %event, failed = report.failed, count = report.count, "Webhook fan-out had failures");
                }
                Ok(report) => {
                    debug!(user_id = %user_id, %event, delivered = report.delivered, "Webhook fan-out finished");
                }
                Err(err) => {
                    warn!(user_id = %user_id, %event, error = %err, "Webhook fan-out skipped");
                }
            }
        });
    }

    async fn deliver_all(
        &self,
        targets: Vec<webhook_config::Model>,
        event: &str,
        payload: Value,
    ) -> DispatchReport {
        let body = Arc::new(Envelope::new(event, payload));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut report = DispatchReport {
            count: targets.len(),
            ..DispatchReport::default()
        };

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let semaphore = Arc::clone(&semaphore);
            let client = self.client.clone();
            let body = Arc::clone(&body);
            let timeout = self.timeout;

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (target.url, Err(DeliveryError::Closed));
                };
                let result = deliver(&client, &target.url, &body, timeout).await;
                (target.url, result)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((url, Err(err))) => {
                    report.failed += 1;
                    counter!("webhook_delivery_failures_total", "reason" => err.kind()).increment(1);
                    warn!(event, target = %redacted_target(&url), error = %err, "Webhook delivery failed");
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(event, error = ?err, "Webhook delivery task panicked or was cancelled");
                }
            }
        }

        counter!("webhook_deliveries_total").increment(report.delivered as u64);
        info!(
            event,
            count = report.count,
            delivered = report.delivered,
            failed = report.failed,
            "Webhook fan-out complete"
        );
        report
    }
}

async fn deliver(
    client: &Client,
    url: &str,
    body: &Envelope,
    timeout: Duration,
) -> Result<(), DeliveryError> {
    let started = Instant::now();
    let response = tokio::time::timeout(timeout, client.post(url).json(body).send())
        .await
        .map_err(|_| DeliveryError::Timeout(timeout))??;
    histogram!("webhook_delivery_latency_ms").record(started.elapsed().as_secs_f64() * 1_000.0);

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status(status))
    }
}
