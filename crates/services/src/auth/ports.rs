use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

/// Response headers as `(name, value)` pairs, in emission order
pub type ResponseHeaders = Vec<(String, String)>;

/// Tokens returned by the token endpoint.
///
/// Lives for a single callback transaction and is never persisted here.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Tokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuth2Tokens {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: None,
            expires_in: None,
            id_token: None,
            scope: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Decode a token endpoint body; `None` when there is no usable access token.
    ///
    /// Optional fields of an unexpected type are dropped rather than failing the body.
    pub fn from_json(body: Value) -> Option<Self> {
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())?;

        let text = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);

        let expires_in = body.get("expires_in").and_then(|value| match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        let scope = match body.get("scope") {
            Some(Value::Array(scopes)) => Some(
                scopes
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => text("scope"),
        };

        Some(Self {
            access_token: access_token.to_string(),
            refresh_token: text("refresh_token"),
            token_type: text("token_type"),
            expires_in,
            id_token: text("id_token"),
            scope,
        })
    }
}

impl fmt::Debug for OAuth2Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Tokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Identity claims returned by the userinfo endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfo(pub Map<String, Value>);

impl UserInfo {
    /// String form of a claim. Numbers and booleans are rendered, anything else is absent.
    pub fn claim(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for UserInfo {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => UserInfo(map),
            _ => UserInfo::default(),
        }
    }
}

/// One page of the Workspace directory listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainUsers {
    pub users: Vec<UserInfo>,
    pub next_page_token: Option<String>,
}

impl DomainUsers {
    pub fn from_json(body: &Value) -> Self {
        let users = body
            .get("users")
            .and_then(Value::as_array)
            .map(|users| users.iter().cloned().map(UserInfo::from).collect())
            .unwrap_or_default();

        Self {
            users,
            next_page_token: body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Query parameters the provider sends back to the callback route
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = first_values(query);
        Self {
            code: params.shift_remove("code"),
            state: params.shift_remove("state"),
            error: params.shift_remove("error"),
        }
    }
}

/// Query parameters of the sign-in page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SigninParams {
    pub message: Option<String>,
    pub url: Option<String>,
}

impl SigninParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = first_values(query);
        Self {
            message: params.shift_remove("message"),
            url: params.shift_remove("url"),
        }
    }
}

/// Parse a raw query string keeping the first value of each key
fn first_values(query: Option<&str>) -> IndexMap<String, String> {
    let mut params = IndexMap::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

// Error types
//
// The four known kinds carry a reason that is safe to show to the user verbatim.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    ConfigError(String),

    #[error("{0}")]
    ProviderError(String),

    #[error("{0}")]
    UpstreamError(String),

    #[error("{0}")]
    PolicyError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Reason rendered in the failure redirect; unclassified errors never leak their text
    pub fn user_reason(&self) -> String {
        match self {
            AuthError::ConfigError(_)
            | AuthError::ProviderError(_)
            | AuthError::UpstreamError(_)
            | AuthError::PolicyError(_) => self.to_string(),
            AuthError::InternalError(_) => "unkown".to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::ConfigError(_) => "configuration",
            AuthError::ProviderError(_) => "provider",
            AuthError::UpstreamError(_) => "upstream",
            AuthError::PolicyError(_) => "policy",
            AuthError::InternalError(_) => "internal",
        }
    }
}

/// The remote half of the login: authorize URL, token exchange, userinfo, local policy
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn build_authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, AuthError>;

    async fn exchange_token_from_code(
        &self,
        params: &CallbackParams,
        redirect_uri: &str,
    ) -> Result<OAuth2Tokens, AuthError>;

    async fn get_userinfo_from_token(&self, tokens: &OAuth2Tokens) -> Result<UserInfo, AuthError>;

    fn check_hosted_domain(&self, userinfo: &UserInfo) -> Result<(), AuthError>;

    fn get_principal(&self, userinfo: &UserInfo) -> Result<String, AuthError>;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuth2Tokens, AuthError>;

    /// Public directory entries of the restricted domain, at most `limit` of them
    async fn get_domain_users(
        &self,
        access_token: &str,
        limit: u32,
    ) -> Result<DomainUsers, AuthError>;
}

/// Host session mechanics: turns a principal into response headers and back out again
pub trait SessionService: Send + Sync {
    fn remember(&self, principal: &str) -> ResponseHeaders;

    fn forget(&self) -> ResponseHeaders;
}
