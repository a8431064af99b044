//! Round-trip state carried through the provider as the OAuth2 `state` parameter.
//!
//! The value is an `application/x-www-form-urlencoded` bag of pairs. Key order and
//! repeated keys are preserved. The provider treats it as opaque, so decoding has to
//! cope with absent, truncated or forged input and never fails.

use indexmap::IndexMap;
use url::form_urlencoded;

/// Key holding the page the user wanted before signing in
pub const URL_KEY: &str = "url";

/// Decoded state: each key maps to every value it was given, in order
pub type StateParams = IndexMap<String, Vec<String>>;

pub fn encode_state<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

pub fn decode_state(state: &str) -> StateParams {
    let mut params = StateParams::new();
    for (key, value) in form_urlencoded::parse(state.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}

/// Payload of the `state` parameter built by the sign-in redirect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationState {
    pairs: Vec<(String, String)>,
}

impl AuthorizationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.pairs.push((URL_KEY.to_string(), url.into()));
        self
    }

    pub fn encode(&self) -> String {
        encode_state(&self.pairs)
    }

    /// First non-empty `url` value of an encoded state, if any
    pub fn redirect_url(state: &str) -> Option<String> {
        decode_state(state)
            .shift_remove(URL_KEY)?
            .into_iter()
            .next()
            .filter(|url| !url.is_empty())
    }
}
