pub mod routes;
pub mod session;
pub mod templates;

use crate::{
    routes::{health_check, logout, oauth2callback, signin, signin_redirect, AuthState},
    session::CookieSessionService,
    templates::SigninRenderer,
};
use axum::{routing::get, Router};
use config::ApiConfig;
use services::auth::{
    flow::{CALLBACK_PATH, LOGOUT_PATH, SIGNIN_PATH, SIGNIN_REDIRECT_PATH},
    AuditLogSubscriber, EventNotifier, GoogleApiClient, LoginFlowController, RouteUrls,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const HEALTH_PATH: &str = "/health";

/// Subscribers wired by default: an audit line per login and logout
pub fn default_notifier() -> EventNotifier {
    EventNotifier::new().with_subscriber(Arc::new(AuditLogSubscriber))
}

/// Named routes usable as `landing_route`
pub fn route_urls(config: &ApiConfig) -> RouteUrls {
    RouteUrls::new(config.server.public_url())
        .with_route("auth_signin", SIGNIN_PATH)
        .with_route("auth_logout", LOGOUT_PATH)
        .with_route("health", HEALTH_PATH)
}

/// Build the Google client, session service, flow controller and page renderer
pub fn init_auth_state(config: &ApiConfig, notifier: EventNotifier) -> anyhow::Result<AuthState> {
    let settings = Arc::new(config.google_login.clone());

    let provider = Arc::new(GoogleApiClient::new(settings.clone())?);
    let sessions = Arc::new(CookieSessionService::new(&config.session)?);

    tracing::info!(
        hosted_domain = settings.restricted_domain().unwrap_or("-"),
        access_type = settings.access_type.as_str(),
        subscribers = notifier.len(),
        "Google login configured"
    );

    let flow = LoginFlowController::new(
        provider,
        sessions.clone(),
        notifier,
        settings,
        route_urls(config),
    );

    Ok(AuthState {
        flow: Arc::new(flow),
        sessions,
        renderer: Arc::new(SigninRenderer::new()?),
    })
}

pub fn build_auth_routes(auth_state: AuthState) -> Router {
    Router::new()
        .route(SIGNIN_PATH, get(signin))
        .route(SIGNIN_REDIRECT_PATH, get(signin_redirect))
        .route(CALLBACK_PATH, get(oauth2callback))
        .route(LOGOUT_PATH, get(logout))
        .with_state(auth_state)
}

/// Build the complete application router
pub fn build_app(auth_state: AuthState) -> Router {
    let health = Router::new()
        .route(HEALTH_PATH, get(health_check))
        .with_state(auth_state.clone());

    build_auth_routes(auth_state)
        .merge(health)
        .layer(TraceLayer::new_for_http())
}
