use super::{
    events::{EventNotifier, UserLoggedIn, UserLoggedOut},
    ports::{
        AuthError, CallbackParams, IdentityProvider, OAuth2Tokens, ResponseHeaders,
        SessionService, SigninParams, UserInfo,
    },
    state::AuthorizationState,
};
use config::GoogleLoginConfig;
use futures::FutureExt;
use serde::Serialize;
use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};
use tracing::{debug, info, warn};
use url::form_urlencoded;

pub const SIGNIN_PATH: &str = "/auth/signin";
pub const SIGNIN_REDIRECT_PATH: &str = "/auth/signin_redirect";
pub const CALLBACK_PATH: &str = "/auth/oauth2callback";
pub const LOGOUT_PATH: &str = "/auth/logout";

pub const LOGGED_OUT_MESSAGE: &str = "You are logged out!";
const APPLICATION_ERROR: &str = "application error";

/// Absolute URLs for the host application, plus its named routes
#[derive(Debug, Clone)]
pub struct RouteUrls {
    base_url: String,
    named: HashMap<String, String>,
}

impl RouteUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            named: HashMap::new(),
        }
    }

    /// Register a named route usable as a landing route
    pub fn with_route(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.named.insert(name.into(), path.into());
        self
    }

    pub fn route_path(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

/// Context of the sign-in page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigninPage {
    pub signin_redirect_url: String,
    pub message: Option<String>,
    pub signin_banner: Option<String>,
    pub signin_advice: Option<String>,
    pub hosted_domain: Option<String>,
}

/// What a flow step asks the web layer to send back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResponse {
    Redirect {
        location: String,
        headers: ResponseHeaders,
    },
    SigninPage(SigninPage),
}

impl FlowResponse {
    pub fn redirect(location: impl Into<String>) -> Self {
        FlowResponse::Redirect {
            location: location.into(),
            headers: Vec::new(),
        }
    }
}

/// Drives sign-in, the provider callback and logout
pub struct LoginFlowController {
    provider: Arc<dyn IdentityProvider>,
    sessions: Arc<dyn SessionService>,
    notifier: EventNotifier,
    settings: Arc<GoogleLoginConfig>,
    routes: RouteUrls,
}

impl LoginFlowController {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<dyn SessionService>,
        notifier: EventNotifier,
        settings: Arc<GoogleLoginConfig>,
        routes: RouteUrls,
    ) -> Self {
        Self {
            provider,
            sessions,
            notifier,
            settings,
            routes,
        }
    }

    pub fn routes(&self) -> &RouteUrls {
        &self.routes
    }

    /// The `redirect_uri` registered with the provider
    pub fn callback_url(&self) -> String {
        self.routes.url(CALLBACK_PATH, &[])
    }

    /// Domain logins are restricted to, if one is configured
    pub fn restricted_domain(&self) -> Option<&str> {
        self.settings.restricted_domain()
    }

    /// Where a user goes after login when nothing better is known
    pub fn landing_path(&self) -> String {
        if let Some(route) = &self.settings.landing_route {
            match self.routes.route_path(route) {
                Some(path) => return path.to_string(),
                None => debug!(route = %route, "Unknown landing route, ignoring"),
            }
        }

        self.settings
            .landing_url
            .clone()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| "/".to_string())
    }

    pub fn redirect_to_signin(
        &self,
        message: Option<&str>,
        url: Option<&str>,
        headers: ResponseHeaders,
    ) -> FlowResponse {
        let mut query = Vec::new();
        if let Some(message) = message {
            query.push(("message", message));
        }
        if let Some(url) = url {
            query.push(("url", url));
        }

        FlowResponse::Redirect {
            location: self.routes.url(SIGNIN_PATH, &query),
            headers,
        }
    }

    fn login_failed(&self, reason: &str) -> FlowResponse {
        let message = format!("Google Login failed ({reason})");
        warn!("{}", message);
        self.redirect_to_signin(Some(&message), None, Vec::new())
    }

    pub fn signin(&self, params: SigninParams, authenticated: Option<&str>) -> FlowResponse {
        let url = params.url.filter(|url| !url.is_empty());

        if let Some(principal) = authenticated {
            debug!(principal = %principal, "Already signed in, skipping sign-in page");
            return FlowResponse::redirect(url.unwrap_or_else(|| self.landing_path()));
        }

        let signin_redirect_url = match &url {
            Some(url) => self.routes.url(SIGNIN_REDIRECT_PATH, &[("url", url.as_str())]),
            None => self.routes.url(SIGNIN_REDIRECT_PATH, &[]),
        };

        FlowResponse::SigninPage(SigninPage {
            signin_redirect_url,
            message: params.message,
            signin_banner: self.settings.signin_banner.clone(),
            signin_advice: self.settings.signin_advice.clone(),
            hosted_domain: self.settings.restricted_domain().map(str::to_string),
        })
    }

    pub fn signin_redirect(&self, url: Option<String>) -> FlowResponse {
        let mut state = AuthorizationState::new();
        if let Some(url) = url {
            state = state.with_url(url);
        }

        match self
            .provider
            .build_authorize_url(&state.encode(), &self.callback_url())
        {
            Ok(authorize_url) => {
                debug!("Redirecting to Google for authorization");
                FlowResponse::redirect(authorize_url)
            }
            Err(e) => self.login_failed(&e.user_reason()),
        }
    }

    pub async fn callback(&self, params: CallbackParams) -> FlowResponse {
        let outcome = AssertUnwindSafe(self.authenticate(&params))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AuthError::InternalError("provider panicked".to_string())));

        let (principal, tokens, userinfo) = match outcome {
            Ok(identity) => identity,
            Err(e) => {
                debug!(kind = e.kind(), "Google callback failed");
                return self.login_failed(&e.user_reason());
            }
        };

        let location = self.resolve_redirect(params.state.as_deref());

        let mut event = UserLoggedIn::new(principal, tokens, userinfo);
        if self.notifier.notify_logged_in(&mut event).await.is_err() {
            return self.login_failed(APPLICATION_ERROR);
        }

        let headers = match event.override_headers() {
            Some(headers) => headers.clone(),
            None => self.sessions.remember(&event.principal),
        };

        info!(principal = %event.principal, "Google Login succeeded");
        FlowResponse::Redirect { location, headers }
    }

    /// Token exchange, userinfo, domain policy and principal, in that order
    async fn authenticate(
        &self,
        params: &CallbackParams,
    ) -> Result<(String, OAuth2Tokens, UserInfo), AuthError> {
        let tokens = self
            .provider
            .exchange_token_from_code(params, &self.callback_url())
            .await?;
        let userinfo = self.provider.get_userinfo_from_token(&tokens).await?;
        self.provider.check_hosted_domain(&userinfo)?;
        let principal = self.provider.get_principal(&userinfo)?;
        Ok((principal, tokens, userinfo))
    }

    /// Redirect target carried in the state, else the landing path. Never fails.
    fn resolve_redirect(&self, state: Option<&str>) -> String {
        state
            .and_then(AuthorizationState::redirect_url)
            .unwrap_or_else(|| self.landing_path())
    }

    pub async fn logout(&self, principal: Option<&str>) -> FlowResponse {
        if let Some(principal) = principal {
            let event = UserLoggedOut::new(principal);
            if let Err(e) = self.notifier.notify_logged_out(&event).await {
                warn!(error = %e, "Logout notification failed");
            }
        }

        let headers = self.sessions.forget();
        self.redirect_to_signin(Some(LOGGED_OUT_MESSAGE), None, headers)
    }
}
