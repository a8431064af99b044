use super::ports::{
    AuthError, CallbackParams, DomainUsers, IdentityProvider, OAuth2Tokens, UserInfo,
};
use async_trait::async_trait;
use config::GoogleLoginConfig;
use oauth2::{basic::BasicClient, AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};
use reqwest::Client;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Page size ceiling of the admin directory API
pub const MAX_DOMAIN_USERS: u32 = 500;

/// Google OAuth2 web-server flow client.
///
/// See <https://developers.google.com/identity/protocols/oauth2/web-server>.
pub struct GoogleApiClient {
    settings: Arc<GoogleLoginConfig>,
    http_client: Client,
}

impl GoogleApiClient {
    pub fn new(settings: Arc<GoogleLoginConfig>) -> Result<Self, AuthError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::ConfigError(format!("Invalid settings (http client: {e})")))?;

        Ok(Self::with_http_client(settings, http_client))
    }

    pub fn with_http_client(settings: Arc<GoogleLoginConfig>, http_client: Client) -> Self {
        Self {
            settings,
            http_client,
        }
    }

    pub fn settings(&self) -> &GoogleLoginConfig {
        &self.settings
    }

    fn client_id(&self) -> Result<&str, AuthError> {
        self.settings
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::ConfigError("Missing settings".to_string()))
    }

    fn credentials(&self) -> Result<(&str, &str), AuthError> {
        let client_id = self.client_id()?;
        let client_secret = self
            .settings
            .client_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| AuthError::ConfigError("Missing settings".to_string()))?;
        Ok((client_id, client_secret))
    }

    /// POST a grant to the token endpoint
    async fn request_tokens(&self, form: &[(&str, &str)]) -> Result<OAuth2Tokens, AuthError> {
        let response = self
            .http_client
            .post(&self.settings.endpoints.token)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                AuthError::UpstreamError(format!(
                    "Failed to get token from Google ({})",
                    e.without_url()
                ))
            })?;

        let status = response.status();
        debug!("Google token endpoint response status: {}", status);

        if !status.is_success() {
            return Err(AuthError::UpstreamError(format!(
                "Failed to get token from Google (HTTP {status})"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            warn!(error = %e.without_url(), "Unknown error while decoding token endpoint response");
            AuthError::UpstreamError("Failed to get token from Google (unknown error)".to_string())
        })?;

        OAuth2Tokens::from_json(body).ok_or_else(|| {
            AuthError::ProviderError("No access_token in response from Google".to_string())
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleApiClient {
    fn build_authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, AuthError> {
        let client_id = self.client_id()?;

        let auth_url = AuthUrl::new(self.settings.endpoints.authorize.clone()).map_err(|e| {
            AuthError::ConfigError(format!("Invalid settings (authorize endpoint: {e})"))
        })?;
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|e| AuthError::ConfigError(format!("Invalid settings (redirect uri: {e})")))?;

        let client = BasicClient::new(ClientId::new(client_id.to_string()))
            .set_auth_uri(auth_url)
            .set_redirect_uri(redirect_url);

        let state = state.to_string();
        let mut request = client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.settings.scope_list().into_iter().map(Scope::new))
            .add_extra_param("access_type", self.settings.access_type.as_str());

        if let Some(hosted_domain) = self.settings.restricted_domain() {
            request = request.add_extra_param("hd", hosted_domain);
        }

        let (authorize_url, _state) = request.url();
        Ok(authorize_url.to_string())
    }

    async fn exchange_token_from_code(
        &self,
        params: &CallbackParams,
        redirect_uri: &str,
    ) -> Result<OAuth2Tokens, AuthError> {
        if let Some(error) = &params.error {
            return Err(AuthError::ProviderError(format!(
                "Error from Google ({error})"
            )));
        }

        let code = params
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                AuthError::ProviderError("No authorization code from Google".to_string())
            })?;

        let (client_id, client_secret) = self.credentials()?;

        debug!("Exchanging Google code for token");

        self.request_tokens(&[
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn get_userinfo_from_token(&self, tokens: &OAuth2Tokens) -> Result<UserInfo, AuthError> {
        let failed = || AuthError::UpstreamError("Failed to get userinfo from Google".to_string());

        debug!("Fetching Google user info with access token");

        // The URL carries the access token: only ever log errors stripped of it.
        let response = self
            .http_client
            .get(&self.settings.endpoints.userinfo)
            .query(&[("access_token", tokens.access_token.as_str())])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e.without_url(), "Unknown error calling userinfo endpoint");
                failed()
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Google userinfo endpoint returned an error status");
            return Err(failed());
        }

        match response.json::<Value>().await {
            Ok(Value::Object(claims)) => Ok(UserInfo(claims)),
            Ok(_) => {
                warn!("Google userinfo endpoint returned a non-object body");
                Err(failed())
            }
            Err(e) => {
                warn!(error = %e.without_url(), "Failed to decode userinfo response");
                Err(failed())
            }
        }
    }

    fn check_hosted_domain(&self, userinfo: &UserInfo) -> Result<(), AuthError> {
        let Some(hosted_domain) = self.settings.restricted_domain() else {
            return Ok(());
        };

        let user_hosted_domain = userinfo.claim("hd").ok_or_else(|| {
            AuthError::PolicyError("Missing hd field from Google userinfo".to_string())
        })?;

        if user_hosted_domain != hosted_domain {
            return Err(AuthError::PolicyError(format!(
                "You logged in with an unkown domain ({user_hosted_domain} rather than {hosted_domain})"
            )));
        }

        Ok(())
    }

    fn get_principal(&self, userinfo: &UserInfo) -> Result<String, AuthError> {
        userinfo
            .claim(&self.settings.user_id_field)
            .filter(|principal| !principal.is_empty())
            .ok_or_else(|| {
                AuthError::PolicyError("Missing principal field from Google userinfo".to_string())
            })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuth2Tokens, AuthError> {
        let (client_id, client_secret) = self.credentials()?;

        let tokens = self
            .request_tokens(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;

        info!("Refreshed Google access token");
        Ok(tokens)
    }

    async fn get_domain_users(
        &self,
        access_token: &str,
        limit: u32,
    ) -> Result<DomainUsers, AuthError> {
        let domain = self
            .settings
            .restricted_domain()
            .ok_or_else(|| AuthError::ConfigError("Missing settings".to_string()))?;
        let failed =
            |reason: String| AuthError::UpstreamError(format!("Failed to get domain users ({reason})"));

        let max_results = limit.clamp(1, MAX_DOMAIN_USERS).to_string();
        debug!(domain, max_results = %max_results, "Listing Google domain users");

        // Same as userinfo: the URL carries the access token.
        let response = self
            .http_client
            .get(&self.settings.endpoints.domain_users)
            .query(&[
                ("maxResults", max_results.as_str()),
                ("domain", domain),
                ("viewType", "domain_public"),
                ("access_token", access_token),
            ])
            .send()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Google directory endpoint returned an error status");
            return Err(failed(format!("HTTP {status}")));
        }

        match response.json::<Value>().await {
            Ok(body @ Value::Object(_)) => Ok(DomainUsers::from_json(&body)),
            Ok(_) => Err(failed("unknown error".to_string())),
            Err(e) => {
                warn!(error = %e.without_url(), "Failed to decode directory response");
                Err(failed("unknown error".to_string()))
            }
        }
    }
}
