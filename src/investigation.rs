//! # Prospecting investigations
//!
//! Client for the external investigation service. A job is submitted with
//! `POST /api/investigate` and polled at `GET /api/investigate/{job_id}` until
//! it completes or fails. The finished result is rendered as a plain-text
//! report for the CLI.

use std::fmt::Write as _;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum InvestigationError {
    #[error("invalid target URL '{0}': must be an absolute http(s) URL")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("investigation API did not answer in time")]
    Timeout,
    #[error("investigation API answered {status}: {message}")]
    Api { status: u16, message: String },
    #[error("investigation failed: {0}")]
    JobFailed(String),
    #[error("job completed without a result")]
    MissingResult,
    #[error("could not decode result: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("polling cancelled")]
    Cancelled,
}

#[derive(Debug, Serialize)]
struct InvestigateRequest<'a> {
    url: &'a str,
    include_maps: bool,
    include_social: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    /// Absent on the submit response, which only carries the id.
    #[serde(default)]
    pub status: JobState,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub current_step: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Problem {
    pub title: String,
    pub description: String,
    pub evidence: String,
    pub source: String,
    /// 0-10
    pub severity: u8,
    pub solution: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Opportunity {
    pub title: String,
    pub description: String,
    pub solution: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Strength {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MapsData {
    pub rating: Option<f64>,
    pub total_reviews: u32,
    pub pain_signals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InvestigationResult {
    pub business_name: String,
    /// 0-100
    pub overall_score: u8,
    pub executive_summary: Vec<String>,
    pub problems: Vec<Problem>,
    pub opportunities: Vec<Opportunity>,
    pub strengths: Vec<Strength>,
    pub recommended_solutions: Vec<String>,
    pub maps_data: Option<MapsData>,
    pub loom_script: String,
    pub call_questions: Vec<String>,
}

impl InvestigationResult {
    /// Decodes a job result. Diagnosis fields nested under `diagnosis` are lifted
    /// to the top level; top-level keys win on conflict.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut value = value;
        if let Value::Object(map) = &mut value {
            if let Some(Value::Object(diagnosis)) = map.remove("diagnosis") {
                for (key, field) in diagnosis {
                    map.entry(key).or_insert(field);
                }
            }
            if map.get("maps_data").is_some_and(|maps| maps.get("error").is_some()) {
                map.remove("maps_data");
            }
        }
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone)]
pub struct InvestigationClient {
    client: Client,
    base: String,
}

impl InvestigationClient {
    /// Client for the service at `base`; every request is bounded by `timeout`.
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self, InvestigationError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("adnexum/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Submits a job for `target`.
    pub async fn start(
        &self,
        target: &str,
        include_maps: bool,
        include_social: bool,
    ) -> Result<JobStatus, InvestigationError> {
        let parsed =
            Url::parse(target).map_err(|_| InvestigationError::InvalidUrl(target.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InvestigationError::InvalidUrl(target.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/api/investigate", self.base))
            .json(&InvestigateRequest {
                url: parsed.as_str(),
                include_maps,
                include_social,
            })
            .send()
            .await
            .map_err(transport)?;
        let status: JobStatus = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        info!(job_id = %status.job_id, target = %parsed, "Investigation submitted");
        Ok(status)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus, InvestigationError> {
        let response = self
            .client
            .get(format!("{}/api/investigate/{}", self.base, job_id))
            .send()
            .await
            .map_err(transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport)
    }

    /// Polls `job_id` every `interval` until it finishes.
    ///
    /// Each observed status is published on `progress`. Cancelling `shutdown`
    /// stops polling with [`InvestigationError::Cancelled`], including while a
    /// status request is in flight.
    pub async fn wait(
        &self,
        job_id: &str,
        interval: Duration,
        progress: &watch::Sender<Option<JobStatus>>,
        shutdown: CancellationToken,
    ) -> Result<InvestigationResult, InvestigationError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(InvestigationError::Cancelled),
                _ = ticker.tick() => {}
            }

            let status = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(InvestigationError::Cancelled),
                status = self.status(job_id) => status?,
            };
            debug!(job_id, progress = status.progress, step = %status.current_step, "Investigation progress");
            progress.send_replace(Some(status.clone()));

            match status.status {
                JobState::Completed => {
                    let result = status.result.ok_or(InvestigationError::MissingResult)?;
                    return Ok(InvestigationResult::from_value(result)?);
                }
                JobState::Failed => {
                    return Err(InvestigationError::JobFailed(
                        status.error.unwrap_or_else(|| status.current_step.clone()),
                    ));
                }
                JobState::Pending | JobState::Running => {}
            }
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, InvestigationError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(InvestigationError::Api { status, message })
        }
    }
}

fn transport(error: reqwest::Error) -> InvestigationError {
    if error.is_timeout() {
        InvestigationError::Timeout
    } else {
        InvestigationError::Network(error)
    }
}

fn score_label(score: u8) -> &'static str {
    match score {
        70.. => "bueno",
        40..=69 => "mejorable",
        _ => "crítico",
    }
}

/// Plain-text report of a finished investigation.
pub fn render_report(result: &InvestigationResult) -> String {
    let mut out = String::new();
    let name = if result.business_name.trim().is_empty() {
        "(sin nombre)"
    } else {
        result.business_name.as_str()
    };

    let _ = writeln!(out, "=== {} ===", name);
    let _ = writeln!(
        out,
        "Puntaje general: {}/100 ({})",
        result.overall_score,
        score_label(result.overall_score)
    );

    if !result.executive_summary.is_empty() {
        let _ = writeln!(out, "\nResumen ejecutivo");
        for line in &result.executive_summary {
            let _ = writeln!(out, "  - {}", line);
        }
    }

    if !result.problems.is_empty() {
        let _ = writeln!(out, "\nProblemas ({})", result.problems.len());
        let mut problems: Vec<&Problem> = result.problems.iter().collect();
        problems.sort_by(|a, b| b.severity.cmp(&a.severity));
        for problem in problems {
            let _ = writeln!(out, "  [{}/10] {}", problem.severity, problem.title);
            if !problem.description.is_empty() {
                let _ = writeln!(out, "         {}", problem.description);
            }
            if !problem.evidence.is_empty() {
                let _ = writeln!(out, "         Evidencia: {} ({})", problem.evidence, problem.source);
            }
            if let Some(solution) = &problem.solution {
                let _ = writeln!(out, "         Solución: {}", solution);
            }
        }
    }

    if !result.opportunities.is_empty() {
        let _ = writeln!(out, "\nOportunidades");
        for opportunity in &result.opportunities {
            let _ = writeln!(out, "  + {}: {}", opportunity.title, opportunity.description);
        }
    }

    if !result.strengths.is_empty() {
        let _ = writeln!(out, "\nFortalezas");
        for strength in &result.strengths {
            let _ = writeln!(out, "  * {}", strength.title);
        }
    }

    if let Some(maps) = &result.maps_data {
        let rating = maps
            .rating
            .map(|r| format!("{:.1}", r))
            .unwrap_or_else(|| "s/d".to_string());
        let _ = writeln!(
            out,
            "\nGoogle Maps: {} estrellas, {} reseñas",
            rating, maps.total_reviews
        );
        for signal in &maps.pain_signals {
            let _ = writeln!(out, "  ! {}", signal);
        }
    }

    if !result.recommended_solutions.is_empty() {
        let _ = writeln!(out, "\nSoluciones recomendadas");
        for solution in &result.recommended_solutions {
            let _ = writeln!(out, "  - {}", solution);
        }
    }

    if !result.call_questions.is_empty() {
        let _ = writeln!(out, "\nPreguntas para la llamada");
        for (i, question) in result.call_questions.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, question);
        }
    }

    if !result.loom_script.trim().is_empty() {
        let _ = writeln!(out, "\nGuion Loom\n{}", result.loom_script.trim_end());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_tolerates_missing_and_extra_fields() {
        let result = InvestigationResult::from_value(json!({
            "business_name": "Ferretería Sur",
            "overall_score": 42,
            "unexpected": { "nested": true }
        }))
        .unwrap();
        assert_eq!(result.business_name, "Ferretería Sur");
        assert!(result.problems.is_empty());
        assert!(result.maps_data.is_none());
    }

    #[test]
    fn diagnosis_fields_are_lifted() {
        let result = InvestigationResult::from_value(json!({
            "url": "https://example.com",
            "diagnosis": {
                "business_name": "Bar Central",
                "overall_score": 80,
                "problems": [{ "title": "Sin WhatsApp", "severity": 7 }]
            },
            "maps_data": { "status": "error", "error": "timeout" },
            "loom_script": "Hola",
            "call_questions": ["¿Cuál es tu rol?"]
        }))
        .unwrap();
        assert_eq!(result.business_name, "Bar Central");
        assert_eq!(result.problems[0].severity, 7);
        assert!(result.maps_data.is_none());
        assert_eq!(result.call_questions.len(), 1);
    }

    #[test]
    fn report_orders_problems_by_severity() {
        let result = InvestigationResult {
            business_name: "Bar".into(),
            overall_score: 35,
            problems: vec![
                Problem {
                    title: "Menor".into(),
                    severity: 2,
                    ..Default::default()
                },
                Problem {
                    title: "Mayor".into(),
                    severity: 9,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let report = render_report(&result);
        assert!(report.contains("35/100 (crítico)"));
        let major = report.find("Mayor").unwrap();
        let minor = report.find("Menor").unwrap();
        assert!(major < minor);
    }

    #[test]
    fn job_status_decodes_service_payload() {
        let status: JobStatus = serde_json::from_value(json!({
            "job_id": "job_1",
            "status": "running",
            "progress": 40,
            "current_step": "Investigando reputación en Google Maps..."
        }))
        .unwrap();
        assert_eq!(status.status, JobState::Running);
        assert!(!status.status.is_finished());
        assert!(status.result.is_none());
    }
}
