#![allow(dead_code)]

use api::{build_app, init_auth_state};
use async_trait::async_trait;
use axum::http::{header::SET_COOKIE, HeaderValue};
use axum_test::{TestResponse, TestServer};
use config::{ApiConfig, GoogleLoginConfig, LoggingConfig, ServerConfig, SessionConfig};
use httpmock::prelude::*;
use services::auth::{
    EventNotifier, LoginSubscriber, ResponseHeaders, UserLoggedIn, UserLoggedOut,
};
use std::sync::{Arc, Mutex};

pub const PUBLIC_URL: &str = "http://localhost:3000";
pub const CALLBACK_URL: &str = "http://localhost:3000/auth/oauth2callback";
pub const ACCESS_TOKEN: &str = "ya29.e2e-access-token";

/// Helper function to create a test configuration pointing at a mock Google
pub fn test_config(google: &MockServer) -> ApiConfig {
    let mut google_login = GoogleLoginConfig::new("CLIENT_ID", "CLIENT_SECRET");
    google_login.endpoints.authorize = google.url("/o/oauth2/auth");
    google_login.endpoints.token = google.url("/token");
    google_login.endpoints.userinfo = google.url("/userinfo");
    google_login.http_timeout_secs = 5;

    ApiConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            public_url: Some(PUBLIC_URL.to_string()),
        },
        logging: LoggingConfig::default(),
        session: SessionConfig::new("e2e-session-secret"),
        google_login,
    }
}

pub fn setup_test_server(config: &ApiConfig, notifier: EventNotifier) -> TestServer {
    let auth_state = init_auth_state(config, notifier).unwrap();
    TestServer::new(build_app(auth_state)).unwrap()
}

/// Google answers the token exchange and userinfo calls for `email`
pub async fn mock_google_login(google: &MockServer, email: &str, hosted_domain: &str) {
    google
        .mock_async(|when, then| {
            when.method(POST).path("/token").body_contains("code=CODE");
            then.status(200).json_body(serde_json::json!({
                "access_token": ACCESS_TOKEN,
                "token_type": "Bearer",
                "expires_in": 3599
            }));
        })
        .await;

    let claims = serde_json::json!({
        "id": "108",
        "email": email,
        "verified_email": true,
        "hd": hosted_domain
    });
    google
        .mock_async(|when, then| {
            when.method(GET)
                .path("/userinfo")
                .query_param("access_token", ACCESS_TOKEN);
            then.status(200).json_body(claims);
        })
        .await;
}

pub fn location(response: &TestResponse) -> String {
    response
        .headers()
        .get("location")
        .expect("redirect without a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn query_value(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// `name=value` of the first Set-Cookie, ready to send back as a Cookie header
pub fn session_cookie(response: &TestResponse) -> HeaderValue {
    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .expect("no Set-Cookie header")
        .to_str()
        .unwrap();
    let pair = set_cookie.split(';').next().unwrap();
    HeaderValue::from_str(pair).unwrap()
}

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Records `in:<principal>` and `out:<principal>`
pub struct RecordingSubscriber(pub EventLog);

#[async_trait]
impl LoginSubscriber for RecordingSubscriber {
    async fn user_logged_in(&self, event: &mut UserLoggedIn) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(format!("in:{}", event.principal));
        Ok(())
    }

    async fn user_logged_out(&self, event: &UserLoggedOut) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(format!("out:{}", event.principal));
        Ok(())
    }
}

pub struct FailingSubscriber;

#[async_trait]
impl LoginSubscriber for FailingSubscriber {
    async fn user_logged_in(&self, _event: &mut UserLoggedIn) -> anyhow::Result<()> {
        anyhow::bail!("provisioning backend unavailable")
    }
}

pub struct HeaderOverrideSubscriber(pub ResponseHeaders);

#[async_trait]
impl LoginSubscriber for HeaderOverrideSubscriber {
    async fn user_logged_in(&self, event: &mut UserLoggedIn) -> anyhow::Result<()> {
        event.headers = Some(self.0.clone());
        Ok(())
    }
}
