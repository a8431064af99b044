use super::AuthState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Redirect URI the Google console must list for this deployment
    pub callback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_domain: Option<String>,
}

/// Liveness check. Also reports the login wiring so a misconfigured public URL shows up early.
pub async fn health_check(State(state): State<AuthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        callback_url: state.flow.callback_url(),
        hosted_domain: state.flow.restricted_domain().map(str::to_string),
    })
}
