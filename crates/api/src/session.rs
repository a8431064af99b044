//! Signed-cookie sessions.
//!
//! The cookie value is `base64url(principal) "." issued_at "." hex(mac)`, where the MAC is
//! HMAC-SHA256 over everything before the last dot and `issued_at` is in Unix seconds.
//! Nothing is stored server side, so logging out only clears the browser copy and a
//! cookie expires `max_age_secs` after it was issued.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use config::SessionConfig;
use hmac::{Hmac, Mac};
use services::auth::{ResponseHeaders, SessionService};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct CookieSessionService {
    mac: HmacSha256,
    cookie_name: String,
    secure: bool,
    max_age_secs: i64,
}

impl CookieSessionService {
    pub fn new(config: &SessionConfig) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(config.secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid session secret: {e}"))?;

        Ok(Self {
            mac,
            cookie_name: config.cookie_name.clone(),
            secure: config.secure,
            max_age_secs: i64::try_from(config.max_age_secs).unwrap_or(i64::MAX),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn signature(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }

    fn sign_at(&self, principal: &str, issued_at: i64) -> String {
        let signed = format!("{}.{issued_at}", URL_SAFE_NO_PAD.encode(principal.as_bytes()));
        let tag = self.signature(&signed).finalize().into_bytes();
        format!("{signed}.{}", hex::encode(tag))
    }

    /// Principal of a cookie value, if its signature checks out and it has not expired
    pub fn verify(&self, value: &str) -> Option<String> {
        self.verify_at(value, Utc::now().timestamp())
    }

    fn verify_at(&self, value: &str, now: i64) -> Option<String> {
        let (signed, tag) = value.rsplit_once('.')?;
        let tag = hex::decode(tag).ok()?;
        self.signature(signed).verify_slice(&tag).ok()?;

        let (payload, issued_at) = signed.split_once('.')?;
        let issued_at: i64 = issued_at.parse().ok()?;
        let age = now.checked_sub(issued_at)?;
        if !(0..=self.max_age_secs).contains(&age) {
            debug!(age, "Session cookie expired");
            return None;
        }

        let principal = URL_SAFE_NO_PAD.decode(payload).ok()?;
        String::from_utf8(principal).ok()
    }

    /// The signed-in principal carried by the request cookies
    pub fn authenticated_principal(&self, jar: &CookieJar) -> Option<String> {
        let cookie = jar.get(&self.cookie_name)?;
        let principal = self.verify(cookie.value());
        if principal.is_none() {
            debug!(cookie = %self.cookie_name, "Ignoring session cookie with a bad signature");
        }
        principal
    }

    fn set_cookie(cookie: Cookie<'_>) -> ResponseHeaders {
        vec![("Set-Cookie".to_string(), cookie.to_string())]
    }
}

impl SessionService for CookieSessionService {
    fn remember(&self, principal: &str) -> ResponseHeaders {
        let value = self.sign_at(principal, Utc::now().timestamp());
        let cookie = Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build();
        Self::set_cookie(cookie)
    }

    fn forget(&self) -> ResponseHeaders {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        Self::set_cookie(cookie)
    }
}
