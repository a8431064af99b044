use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashMap},
    env,
    fmt,
    str::FromStr,
};

use crate::ConfigError;

/// Environment prefix shared by every provider setting
pub const GOOGLE_LOGIN_PREFIX: &str = "GOOGLE_LOGIN_";

/// Scope requested on every authorization, whatever the configuration says
pub const BASELINE_SCOPE: &str = "email";

pub const DEFAULT_AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v3/token";
pub const DEFAULT_USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const DEFAULT_DOMAIN_USERS_ENDPOINT: &str =
    "https://www.googleapis.com/admin/directory/v1/users";

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub google_login: GoogleLoginConfig,
}

impl ApiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env(),
            session: SessionConfig::from_env()?,
            google_login: GoogleLoginConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Startup checks shared by the env and file loaders
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.google_login.validate()?;
        if self.session.secret.is_empty() {
            return Err(ConfigError::MissingSetting {
                name: "SESSION_SECRET".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base of every absolute URL handed to the browser or the provider
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| default_host()),
            port: parse_env("SERVER_PORT", default_port())?,
            public_url: env::var("SERVER_PUBLIC_URL").ok(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

/// Logging Configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut modules = HashMap::new();

        if let Ok(level) = env::var("LOG_MODULE_API") {
            modules.insert("api".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_SERVICES") {
            modules.insert("services".to_string(), level);
        }

        Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| default_log_format()),
            modules,
        }
    }

    /// Filter directive understood by `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> String {
        let mut filter = self.level.clone();
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();
        for (module, level) in modules {
            filter.push_str(&format!(",{module}={level}"));
        }
        filter
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            modules: HashMap::new(),
        }
    }
}

/// Signed session cookie settings
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub secure: bool,
    /// Seconds a signed cookie stays valid after it was issued
    #[serde(default = "default_session_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_cookie_name() -> String {
    "auth_tkt".to_string()
}

fn default_session_max_age_secs() -> u64 {
    12 * 60 * 60
}

impl SessionConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            cookie_name: default_cookie_name(),
            secure: false,
            max_age_secs: default_session_max_age_secs(),
        }
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: required_env("SESSION_SECRET")?,
            cookie_name: env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| default_cookie_name()),
            secure: parse_env("SESSION_COOKIE_SECURE", false)?,
            max_age_secs: parse_env("SESSION_MAX_AGE_SECS", default_session_max_age_secs())?,
        })
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("cookie_name", &self.cookie_name)
            .field("secure", &self.secure)
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

/// `access_type` sent on the authorization request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    #[default]
    Online,
    Offline,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Online => "online",
            AccessType::Offline => "offline",
        }
    }
}

impl FromStr for AccessType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "online" => Ok(AccessType::Online),
            "offline" => Ok(AccessType::Offline),
            other => Err(ConfigError::InvalidSetting {
                name: format!("{GOOGLE_LOGIN_PREFIX}ACCESS_TYPE"),
                reason: format!("expected online or offline, got {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleEndpoints {
    #[serde(default = "default_authorize_endpoint")]
    pub authorize: String,
    #[serde(default = "default_token_endpoint")]
    pub token: String,
    #[serde(default = "default_userinfo_endpoint")]
    pub userinfo: String,
    /// Admin directory listing, used by offline-access maintenance jobs
    #[serde(default = "default_domain_users_endpoint")]
    pub domain_users: String,
}

fn default_authorize_endpoint() -> String {
    DEFAULT_AUTHORIZE_ENDPOINT.to_string()
}

fn default_token_endpoint() -> String {
    DEFAULT_TOKEN_ENDPOINT.to_string()
}

fn default_userinfo_endpoint() -> String {
    DEFAULT_USERINFO_ENDPOINT.to_string()
}

fn default_domain_users_endpoint() -> String {
    DEFAULT_DOMAIN_USERS_ENDPOINT.to_string()
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            authorize: default_authorize_endpoint(),
            token: default_token_endpoint(),
            userinfo: default_userinfo_endpoint(),
            domain_users: default_domain_users_endpoint(),
        }
    }
}

/// Provider settings, built once at startup and shared read-only by every request.
///
/// `client_id` and `client_secret` stay optional here so that library users can
/// build partial settings; the startup loaders reject them through [`validate`].
///
/// [`validate`]: GoogleLoginConfig::validate
#[derive(Clone, Deserialize)]
pub struct GoogleLoginConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default, deserialize_with = "deserialize_non_empty")]
    pub hosted_domain: Option<String>,
    #[serde(default)]
    pub access_type: AccessType,
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes: BTreeSet<String>,
    #[serde(default = "default_user_id_field")]
    pub user_id_field: String,
    #[serde(default)]
    pub landing_route: Option<String>,
    #[serde(default)]
    pub landing_url: Option<String>,
    #[serde(default)]
    pub signin_banner: Option<String>,
    #[serde(default)]
    pub signin_advice: Option<String>,
    #[serde(default)]
    pub endpoints: GoogleEndpoints,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_user_id_field() -> String {
    "email".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

/// A blank value means the setting is unset
fn deserialize_non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

fn deserialize_scopes<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Scopes::deserialize(deserializer)? {
        Scopes::List(list) => parse_scopes(&list.join(" ")),
        Scopes::Text(text) => parse_scopes(&text),
    })
}

/// Split a space and/or comma separated scope list; the baseline scope is always added.
pub fn parse_scopes(raw: &str) -> BTreeSet<String> {
    let mut scopes: BTreeSet<String> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    scopes.insert(BASELINE_SCOPE.to_string());
    scopes
}

impl GoogleLoginConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            ..Self::default()
        }
    }

    /// Load from `GOOGLE_LOGIN_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| env::var(format!("{GOOGLE_LOGIN_PREFIX}{name}")).ok();

        let access_type = match var("ACCESS_TYPE") {
            Some(raw) => raw.parse()?,
            None => AccessType::default(),
        };

        let endpoints = GoogleEndpoints {
            authorize: var("AUTHORIZE_ENDPOINT").unwrap_or_else(default_authorize_endpoint),
            token: var("TOKEN_ENDPOINT").unwrap_or_else(default_token_endpoint),
            userinfo: var("USERINFO_ENDPOINT").unwrap_or_else(default_userinfo_endpoint),
            domain_users: var("DOMAIN_USERS_ENDPOINT").unwrap_or_else(default_domain_users_endpoint),
        };

        let config = Self {
            client_id: var("CLIENT_ID"),
            client_secret: var("CLIENT_SECRET"),
            hosted_domain: var("HOSTED_DOMAIN").filter(|d| !d.trim().is_empty()),
            access_type,
            scopes: parse_scopes(&var("SCOPES").unwrap_or_default()),
            user_id_field: var("USER_ID_FIELD").unwrap_or_else(default_user_id_field),
            landing_route: var("LANDING_ROUTE"),
            landing_url: var("LANDING_URL"),
            signin_banner: var("SIGNIN_BANNER"),
            signin_advice: var("SIGNIN_ADVICE"),
            endpoints,
            http_timeout_secs: parse_env(
                &format!("{GOOGLE_LOGIN_PREFIX}HTTP_TIMEOUT_SECS"),
                default_http_timeout_secs(),
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Client credentials are mandatory for a running server
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("CLIENT_ID", &self.client_id),
            ("CLIENT_SECRET", &self.client_secret),
        ] {
            if value.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingSetting {
                    name: format!("{GOOGLE_LOGIN_PREFIX}{name}"),
                });
            }
        }
        Ok(())
    }

    /// The Google Workspace domain logins are restricted to, if any
    pub fn restricted_domain(&self) -> Option<&str> {
        self.hosted_domain
            .as_deref()
            .filter(|domain| !domain.trim().is_empty())
    }

    /// Effective scope set: configured scopes plus the baseline, sorted and deduplicated
    pub fn scope_list(&self) -> BTreeSet<String> {
        let mut scopes = self.scopes.clone();
        scopes.insert(BASELINE_SCOPE.to_string());
        scopes
    }
}

impl Default for GoogleLoginConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            hosted_domain: None,
            access_type: AccessType::default(),
            scopes: parse_scopes(""),
            user_id_field: default_user_id_field(),
            landing_route: None,
            landing_url: None,
            signin_banner: None,
            signin_advice: None,
            endpoints: GoogleEndpoints::default(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl fmt::Debug for GoogleLoginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleLoginConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("hosted_domain", &self.hosted_domain)
            .field("access_type", &self.access_type)
            .field("scopes", &self.scopes)
            .field("user_id_field", &self.user_id_field)
            .field("landing_route", &self.landing_route)
            .field("landing_url", &self.landing_url)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingSetting {
            name: name.to_string(),
        })
}

fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidSetting {
            name: name.to_string(),
            reason: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
