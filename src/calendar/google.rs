//! Google Calendar link
//!
//! OAuth web flow (authorize URL, code exchange, refresh) and the two Calendar
//! API calls the CRM needs: listing the primary calendar and inserting an
//! event. A user is "connected" while a token row exists for them; any refresh
//! failure or 401 from Google removes the row.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::GoogleCalendarConfig;
use crate::error::CrmError;
use crate::repositories::GoogleCalendarTokenRepository;

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/calendar.events",
];
pub const UNTITLED_EVENT: &str = "Sin título";
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
const DEFAULT_LIST_WINDOW_DAYS: i64 = 30;
const MAX_RESULTS: &str = "100";
const STATE_TTL: StdDuration = StdDuration::from_secs(600);
const STATE_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Google OAuth client credentials are not configured")]
    NotConfigured,
    #[error("OAuth request failed: {0}")]
    OAuth(String),
    #[error("token response did not include both access and refresh tokens")]
    MissingTokens,
    #[error("Calendar API answered {status}: {message}")]
    Api { status: u16, message: String },
    #[error("access token rejected")]
    Unauthorized,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<GoogleError> for CrmError {
    fn from(error: GoogleError) -> Self {
        CrmError::external("google_calendar", error)
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))
    }
}

#[derive(Debug, Default, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    id: String,
    summary: Option<String>,
    description: Option<String>,
    #[serde(default)]
    start: EventTime,
    #[serde(default)]
    end: EventTime,
    location: Option<String>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    items: Vec<RawEvent>,
}

/// A Google event flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    /// RFC 3339 date-time, or a bare date for all-day events
    pub start: String,
    pub end: String,
    pub location: String,
    pub html_link: String,
    pub is_all_day: bool,
}

impl From<RawEvent> for GoogleEvent {
    fn from(raw: RawEvent) -> Self {
        let is_all_day = raw.start.date_time.is_none();
        let pick = |time: EventTime| time.date_time.or(time.date).unwrap_or_default();
        Self {
            id: raw.id,
            title: raw
                .summary
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNTITLED_EVENT.to_string()),
            description: raw.description.unwrap_or_default(),
            start: pick(raw.start),
            end: pick(raw.end),
            location: raw.location.unwrap_or_default(),
            html_link: raw.html_link.unwrap_or_default(),
            is_all_day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GoogleEventList {
    pub connected: bool,
    pub events: Vec<GoogleEvent>,
}

impl GoogleEventList {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewGoogleEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    /// IANA zone name; the configured default is used when absent
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleCalendarService {
    config: GoogleCalendarConfig,
    client: Client,
    tokens: GoogleCalendarTokenRepository,
    pending_states: Arc<Mutex<HashMap<String, (Uuid, Instant)>>>,
}

impl GoogleCalendarService {
    /// Every Google request made by the service is bounded by `timeout`.
    pub fn new(
        config: GoogleCalendarConfig,
        tokens: GoogleCalendarTokenRepository,
        timeout: StdDuration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("adnexum/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config,
            client,
            tokens,
            pending_states: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    fn credentials(&self) -> Result<(&str, &str), GoogleError> {
        match (&self.config.client_id, &self.config.client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Ok((id.as_str(), secret.as_str()))
            }
            _ => Err(GoogleError::NotConfigured),
        }
    }

    /// Google consent URL for `state`.
    pub fn authorize_url(&self, state: &str) -> Result<Url, GoogleError> {
        let (client_id, _) = self.credentials()?;
        let mut url = Url::parse(&format!("{}/o/oauth2/v2/auth", self.config.auth_base))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url)
    }

    /// Starts the OAuth flow for `user_id`, remembering the state nonce.
    pub fn begin_authorization(&self, user_id: Uuid) -> Result<Url, GoogleError> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();
        let url = self.authorize_url(&state)?;

        let mut pending = self
            .pending_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.retain(|_, (_, issued)| issued.elapsed() < STATE_TTL);
        pending.insert(state, (user_id, Instant::now()));
        Ok(url)
    }

    /// Calendar page of the web app, flagged with the outcome of the consent round-trip.
    pub fn return_url(&self, error: Option<&str>) -> Result<Url, GoogleError> {
        let mut url = Url::parse(&self.config.app_origin)?.join("/calendario")?;
        match error {
            Some(error) => url.query_pairs_mut().append_pair("gcal_error", error),
            None => url.query_pairs_mut().append_pair("gcal_connected", "true"),
        };
        Ok(url)
    }

    /// Consumes a state nonce, returning the user that started the flow.
    pub fn take_state(&self, state: &str) -> Option<Uuid> {
        let mut pending = self
            .pending_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pending
            .remove(state)
            .filter(|(_, issued)| issued.elapsed() < STATE_TTL)
            .map(|(user_id, _)| user_id)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, GoogleError> {
        let response = self
            .client
            .post(format!("{}/token", self.config.oauth_base))
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(GoogleError::OAuth(format!("{} - {}", status, body)))
        }
    }

    /// Exchanges an authorization code and stores the token pair for the user.
    pub async fn exchange_code(&self, user_id: Uuid, code: &str) -> Result<(), CrmError> {
        let (client_id, client_secret) = self.credentials()?;
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .await?;

        let expires_at = response.expires_at(Utc::now());
        let (Some(access), Some(refresh)) = (response.access_token, response.refresh_token) else {
            return Err(GoogleError::MissingTokens.into());
        };

        self.tokens.upsert(user_id, &access, &refresh, expires_at).await?;
        info!(user_id = %user_id, "Google Calendar connected");
        Ok(())
    }

    /// The stored access token if still valid, refreshing it when expired.
    ///
    /// `None` means not connected. A failed refresh disconnects the user.
    pub async fn valid_access_token(&self, user_id: Uuid) -> Result<Option<String>, CrmError> {
        let Some(token) = self.tokens.find(user_id).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if token.expires_at.with_timezone(&Utc) > now {
            return Ok(Some(token.access_token));
        }

        debug!(user_id = %user_id, "Google access token expired, refreshing");
        let refreshed = match self.credentials() {
            Ok((client_id, client_secret)) => {
                self.token_request(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", token.refresh_token.as_str()),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                ])
                .await
            }
            Err(err) => Err(err),
        };

        match refreshed {
            Ok(TokenResponse {
                access_token: Some(access),
                expires_in,
                ..
            }) => {
                let expires_at =
                    now + Duration::seconds(expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
                self.tokens
                    .update_access_token(token, &access, expires_at)
                    .await?;
                Ok(Some(access))
            }
            Ok(_) => {
                warn!(user_id = %user_id, "Refresh response had no access token, disconnecting");
                self.tokens.delete(user_id).await?;
                Ok(None)
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Google token refresh failed, disconnecting");
                self.tokens.delete(user_id).await?;
                Ok(None)
            }
        }
    }

    /// Events on the primary calendar between `time_min` and `time_max`.
    ///
    /// Defaults to the next 30 days.
    pub async fn list_events(
        &self,
        user_id: Uuid,
        time_min: Option<DateTime<Utc>>,
        time_max: Option<DateTime<Utc>>,
    ) -> Result<GoogleEventList, CrmError> {
        let Some(access_token) = self.valid_access_token(user_id).await? else {
            return Ok(GoogleEventList::disconnected());
        };

        let now = Utc::now();
        let time_min = time_min.unwrap_or(now);
        let time_max = time_max.unwrap_or(now + Duration::days(DEFAULT_LIST_WINDOW_DAYS));

        match self.fetch_events(&access_token, time_min, time_max).await {
            Ok(events) => Ok(GoogleEventList {
                connected: true,
                events,
            }),
            Err(GoogleError::Unauthorized) => {
                warn!(user_id = %user_id, "Google rejected access token, disconnecting");
                self.tokens.delete(user_id).await?;
                Ok(GoogleEventList::disconnected())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn fetch_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<GoogleEvent>, GoogleError> {
        let time_min = time_min.to_rfc3339();
        let time_max = time_max.to_rfc3339();
        let response = self
            .client
            .get(format!("{}/calendars/primary/events", self.config.api_base))
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", MAX_RESULTS),
            ])
            .send()
            .await?;

        let page: EventsPage = Self::check(response).await?.json().await?;
        Ok(page.items.into_iter().map(GoogleEvent::from).collect())
    }

    /// Inserts an event on the primary calendar and returns Google's record.
    pub async fn create_event(&self, user_id: Uuid, event: NewGoogleEvent) -> Result<Value, CrmError> {
        if event.title.trim().is_empty() {
            return Err(CrmError::validation("title", "title is required"));
        }
        if event.end < event.start {
            return Err(CrmError::validation("end", "end must not be before start"));
        }
        let Some(access_token) = self.valid_access_token(user_id).await? else {
            return Err(CrmError::Auth("Google Calendar not connected".to_string()));
        };

        let time_zone = event
            .time_zone
            .unwrap_or_else(|| self.config.default_time_zone.clone());
        let body = serde_json::json!({
            "summary": event.title,
            "description": event.description.unwrap_or_default(),
            "start": { "dateTime": event.start.to_rfc3339(), "timeZone": time_zone },
            "end": { "dateTime": event.end.to_rfc3339(), "timeZone": time_zone },
            "location": event.location.unwrap_or_default(),
        });

        let response = self
            .client
            .post(format!("{}/calendars/primary/events", self.config.api_base))
            .bearer_auth(&access_token)
            .json(&body)
            .send()
            .await
            .map_err(GoogleError::from)?;

        match Self::check(response).await {
            Ok(response) => {
                let created: Value = response.json().await.map_err(GoogleError::from)?;
                info!(user_id = %user_id, "Google Calendar event created");
                Ok(created)
            }
            Err(GoogleError::Unauthorized) => {
                self.tokens.delete(user_id).await?;
                Err(CrmError::Auth("Google Calendar not connected".to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GoogleError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(GoogleError::Unauthorized),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(GoogleError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_event_normalizes_missing_fields() {
        let raw: RawEvent = serde_json::from_value(serde_json::json!({
            "id": "evt1",
            "start": { "date": "2025-03-10" },
            "end": { "date": "2025-03-11" }
        }))
        .unwrap();
        let event = GoogleEvent::from(raw);
        assert_eq!(event.title, UNTITLED_EVENT);
        assert!(event.is_all_day);
        assert_eq!(event.start, "2025-03-10");
        assert_eq!(event.location, "");
    }

    #[test]
    fn timed_event_is_not_all_day() {
        let raw: RawEvent = serde_json::from_value(serde_json::json!({
            "id": "evt2",
            "summary": "Discovery",
            "start": { "dateTime": "2025-03-10T10:00:00-03:00" },
            "end": { "dateTime": "2025-03-10T11:00:00-03:00" },
            "htmlLink": "https://calendar.google.com/x"
        }))
        .unwrap();
        let event = GoogleEvent::from(raw);
        assert!(!event.is_all_day);
        assert_eq!(event.title, "Discovery");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["htmlLink"], "https://calendar.google.com/x");
        assert_eq!(json["isAllDay"], false);
    }

    #[test]
    fn token_expiry_defaults_to_one_hour() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: Some("a".into()),
            refresh_token: None,
            expires_in: None,
        };
        assert_eq!(response.expires_at(now), now + Duration::hours(1));
    }
}
