//! Per-run session state and bearer token propagation.

use serde_json::Value;
use tracing::{debug, info};

use crate::dispatch::ApiResponse;
use crate::spec::EndpointDescriptor;

/// Body keys that may carry a bearer token, checked in order.
pub const TOKEN_KEYS: [&str; 4] = ["access_token", "token", "accessToken", "id_token"];

/// Path words that mark an endpoint as login-type.
pub const DEFAULT_LOGIN_HINTS: [&str; 6] =
    ["login", "signin", "token", "auth", "authenticate", "session"];

/// State that lives for the whole run and is passed through every request.
#[derive(Debug, Clone, Default)]
pub struct Session {
    token: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Replace the active token. At most one token is active at a time.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }
}

/// Whether `descriptor` looks like a login endpoint.
///
/// Matches `hints` (case-insensitively) against the words of the last literal
/// path segment, ignoring `{param}` segments. Words are split on any
/// non-alphanumeric character and may carry a plural `s`, so `/access-token`
/// and `/sessions` match while `/authors` does not.
pub fn is_login_endpoint<S: AsRef<str>>(descriptor: &EndpointDescriptor, hints: &[S]) -> bool {
    let Some(segment) = descriptor
        .path
        .split('/')
        .filter(|s| !s.is_empty() && !s.starts_with('{'))
        .last()
    else {
        return false;
    };
    let segment = segment.to_ascii_lowercase();
    segment
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .any(|word| {
            let singular = word.strip_suffix('s').unwrap_or(word);
            hints.iter().any(|hint| {
                let hint = hint.as_ref().to_ascii_lowercase();
                word == hint || singular == hint
            })
        })
}

/// Find a non-empty token string under one of [`TOKEN_KEYS`].
pub fn find_token(body: &Value) -> Option<&str> {
    TOKEN_KEYS
        .iter()
        .filter_map(|key| body.get(*key))
        .filter_map(|v| v.as_str())
        .find(|t| !t.is_empty())
}

/// Capture a bearer token from a login-type response into `session`.
///
/// Returns `true` when the session token was replaced. Non-2xx responses and
/// bodies without a token leave the session untouched.
pub fn propagate_token(response: &ApiResponse, session: &mut Session) -> bool {
    if !response.is_success() {
        debug!(status = response.status, "not capturing token from unsuccessful response");
        return false;
    }
    match response.json().and_then(find_token) {
        Some(token) => {
            session.set_token(token);
            info!("captured bearer token from login response");
            true
        }
        None => {
            debug!("login response carried no token");
            false
        }
    }
}
