use crate::{session::CookieSessionService, templates::SigninRenderer};
use axum::{
    extract::{RawQuery, State},
    http::{
        header::{HeaderName, HeaderValue, LOCATION},
        StatusCode,
    },
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use services::auth::{CallbackParams, FlowResponse, LoginFlowController, SigninParams};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct AuthState {
    pub flow: Arc<LoginFlowController>,
    pub sessions: Arc<CookieSessionService>,
    pub renderer: Arc<SigninRenderer>,
}

/// Sign-in page, or a redirect when the browser already has a session
pub async fn signin(
    State(state): State<AuthState>,
    jar: CookieJar,
    RawQuery(query): RawQuery,
) -> Response {
    let params = SigninParams::from_query(query.as_deref());
    let principal = state.sessions.authenticated_principal(&jar);

    let response = state.flow.signin(params, principal.as_deref());
    into_http_response(&state, response)
}

/// Redirect to Google, carrying `url` through the OAuth2 state
pub async fn signin_redirect(
    State(state): State<AuthState>,
    RawQuery(query): RawQuery,
) -> Response {
    let params = SigninParams::from_query(query.as_deref());

    let response = state.flow.signin_redirect(params.url);
    into_http_response(&state, response)
}

/// Google redirects back here. Always answers with a redirect.
pub async fn oauth2callback(
    State(state): State<AuthState>,
    RawQuery(query): RawQuery,
) -> Response {
    debug!("Google callback received");
    let params = CallbackParams::from_query(query.as_deref());

    let response = state.flow.callback(params).await;
    into_http_response(&state, response)
}

pub async fn logout(State(state): State<AuthState>, jar: CookieJar) -> Response {
    let principal = state.sessions.authenticated_principal(&jar);

    let response = state.flow.logout(principal.as_deref()).await;
    into_http_response(&state, response)
}

fn into_http_response(state: &AuthState, response: FlowResponse) -> Response {
    match response {
        FlowResponse::Redirect { location, headers } => {
            let location = HeaderValue::try_from(location).unwrap_or_else(|_| {
                warn!("Redirect target is not a valid header value, using /");
                HeaderValue::from_static("/")
            });

            let mut response = (StatusCode::FOUND, [(LOCATION, location)]).into_response();
            for (name, value) in headers {
                match (
                    HeaderName::try_from(name.as_str()),
                    HeaderValue::try_from(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().append(name, value);
                    }
                    _ => warn!(header = %name, "Dropping invalid response header"),
                }
            }
            response
        }
        FlowResponse::SigninPage(page) => match state.renderer.render(&page) {
            Ok(html) => Html(html).into_response(),
            Err(e) => {
                error!("Failed to render sign-in page: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}
