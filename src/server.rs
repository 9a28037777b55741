//! # Server Configuration
//!
//! Application state, router and the serve loop for the CRM API.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, patch, post},
};
use chrono::FixedOffset;
use sea_orm::DatabaseConnection;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::calendar::GoogleCalendarService;
use crate::config::AppConfig;
use crate::handlers;
use crate::lead_store::LeadStore;
use crate::realtime::ChangeFeed;
use crate::repositories::{
    CalendarEventRepository, GoogleCalendarTokenRepository, LeadRepository,
    MessageTemplateRepository, ProjectRepository, TaskRepository, WebhookConfigRepository,
};
use crate::telemetry::trace_id_middleware;
use crate::webhook_dispatch::WebhookDispatcher;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub leads: LeadStore,
    pub tasks: TaskRepository,
    pub events: CalendarEventRepository,
    pub templates: MessageTemplateRepository,
    pub projects: ProjectRepository,
    pub webhooks: WebhookConfigRepository,
    pub dispatcher: WebhookDispatcher,
    pub google: GoogleCalendarService,
    pub feed: ChangeFeed,
    /// Background webhook deliveries; drained on shutdown
    pub tracker: TaskTracker,
    /// Cancelled when the server starts shutting down; ends open lead streams
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires repositories and services over one connection pool.
    pub fn new(config: AppConfig, db: DatabaseConnection) -> Result<Self, reqwest::Error> {
        let db = Arc::new(db);
        let webhooks = WebhookConfigRepository::new(Arc::clone(&db));
        let dispatcher = WebhookDispatcher::new(&config, webhooks.clone())?;
        let feed = ChangeFeed::new();
        let tracker = TaskTracker::new();
        let leads = LeadStore::new(
            LeadRepository::new(Arc::clone(&db)),
            feed.clone(),
            dispatcher.clone(),
            tracker.clone(),
            config.local_offset(),
        );
        let google = GoogleCalendarService::new(
            config.google.clone(),
            GoogleCalendarTokenRepository::new(Arc::clone(&db)),
            config.outbound_timeout(),
        )?;

        Ok(Self {
            tasks: TaskRepository::new(Arc::clone(&db)),
            events: CalendarEventRepository::new(Arc::clone(&db)),
            templates: MessageTemplateRepository::new(Arc::clone(&db)),
            projects: ProjectRepository::new(Arc::clone(&db)),
            config: Arc::new(config),
            db,
            leads,
            webhooks,
            dispatcher,
            google,
            feed,
            tracker,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn offset(&self) -> FixedOffset {
        self.leads.offset()
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/leads",
            get(handlers::leads::list_leads).post(handlers::leads::create_lead),
        )
        .route(
            "/leads/{id}",
            get(handlers::leads::get_lead)
                .patch(handlers::leads::update_lead)
                .delete(handlers::leads::delete_lead),
        )
        .route("/leads/stream", get(handlers::leads::lead_stream))
        .route("/leads/{id}/move", post(handlers::leads::move_lead))
        .route("/leads/{id}/follow-up", post(handlers::leads::mark_follow_up))
        .route("/leads/{id}/history", get(handlers::leads::lead_history))
        .route(
            "/leads/{id}/interactions",
            get(handlers::leads::lead_interactions),
        )
        .route("/pipeline", get(handlers::views::pipeline))
        .route("/follow-ups", get(handlers::views::follow_ups))
        .route("/dashboard", get(handlers::views::dashboard))
        .route("/stages", get(handlers::views::stages))
        .route(
            "/tasks",
            get(handlers::tasks::list_tasks).post(handlers::tasks::create_task),
        )
        .route("/tasks/from-stage", post(handlers::tasks::create_stage_tasks))
        .route(
            "/tasks/{id}",
            patch(handlers::tasks::update_task).delete(handlers::tasks::delete_task),
        )
        .route("/tasks/{id}/toggle", post(handlers::tasks::toggle_task))
        .route(
            "/calendar/events",
            get(handlers::calendar::list_events).post(handlers::calendar::create_event),
        )
        .route(
            "/calendar/events/{id}",
            axum::routing::delete(handlers::calendar::delete_event),
        )
        .route("/calendar/grid", get(handlers::calendar::month_grid))
        .route(
            "/google-calendar/authorize",
            get(handlers::google_calendar::authorize),
        )
        .route(
            "/google-calendar/events",
            get(handlers::google_calendar::list_events)
                .post(handlers::google_calendar::create_event),
        )
        .route(
            "/templates",
            get(handlers::templates::list_templates).post(handlers::templates::create_template),
        )
        .route(
            "/templates/defaults",
            post(handlers::templates::seed_default_templates),
        )
        .route(
            "/templates/{id}",
            patch(handlers::templates::update_template)
                .delete(handlers::templates::delete_template),
        )
        .route(
            "/templates/{id}/render",
            get(handlers::templates::render_template),
        )
        .route(
            "/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route(
            "/projects/{id}",
            patch(handlers::projects::update_project).delete(handlers::projects::delete_project),
        )
        .route(
            "/webhooks",
            get(handlers::webhooks::list_webhooks).post(handlers::webhooks::create_webhook),
        )
        .route(
            "/webhooks/{id}",
            axum::routing::delete(handlers::webhooks::delete_webhook),
        )
        .route("/webhooks/trigger", post(handlers::webhooks::trigger_webhooks))
        .route("/gamification", get(handlers::gamification::profile))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/google-calendar/callback",
            get(handlers::google_calendar::callback),
        )
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::new(config, db)?;
    let tracker = state.tracker.clone();
    let shutdown = state.shutdown.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracker.close();
    tracing::info!(pending = tracker.len(), "Waiting for webhook deliveries");
    tracker.wait().await;
    Ok(())
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::leads::list_leads,
        crate::handlers::leads::create_lead,
        crate::handlers::leads::get_lead,
        crate::handlers::leads::update_lead,
        crate::handlers::leads::delete_lead,
        crate::handlers::leads::move_lead,
        crate::handlers::leads::mark_follow_up,
        crate::handlers::leads::lead_history,
        crate::handlers::leads::lead_interactions,
        crate::handlers::leads::lead_stream,
        crate::handlers::views::pipeline,
        crate::handlers::views::follow_ups,
        crate::handlers::views::dashboard,
        crate::handlers::views::stages,
        crate::handlers::tasks::list_tasks,
        crate::handlers::tasks::create_task,
        crate::handlers::tasks::create_stage_tasks,
        crate::handlers::tasks::update_task,
        crate::handlers::tasks::delete_task,
        crate::handlers::tasks::toggle_task,
        crate::handlers::calendar::list_events,
        crate::handlers::calendar::create_event,
        crate::handlers::calendar::delete_event,
        crate::handlers::calendar::month_grid,
        crate::handlers::google_calendar::authorize,
        crate::handlers::google_calendar::callback,
        crate::handlers::google_calendar::list_events,
        crate::handlers::google_calendar::create_event,
        crate::handlers::templates::list_templates,
        crate::handlers::templates::create_template,
        crate::handlers::templates::seed_default_templates,
        crate::handlers::templates::update_template,
        crate::handlers::templates::delete_template,
        crate::handlers::templates::render_template,
        crate::handlers::projects::list_projects,
        crate::handlers::projects::create_project,
        crate::handlers::projects::update_project,
        crate::handlers::projects::delete_project,
        crate::handlers::webhooks::list_webhooks,
        crate::handlers::webhooks::create_webhook,
        crate::handlers::webhooks::delete_webhook,
        crate::handlers::webhooks::trigger_webhooks,
        crate::handlers::gamification::profile,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
        )
    ),
    modifiers(&BearerSecurity),
    info(
        title = "Adnexum CRM API",
        description = "Leads, follow-ups, tasks, calendar and outbound webhooks for a small sales team",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
