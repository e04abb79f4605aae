//! Session tokens from the identity provider.
//!
//! The provider and this service share an HMAC secret. A token is
//! `base64url(claims_json) "." base64url(hmac_sha256(secret, first_part))`
//! and is accepted from `Authorization: Bearer ...` or the `__session`
//! cookie. Handlers that take an [`AuthSession`] argument are rejected with
//! 401 before they run, so no collaborator is contacted.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::Error;
use crate::web::AppState;

const SESSION_COOKIE: &str = "__session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id at the identity provider.
    pub sub: String,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Sign `claims` with `secret`.
pub fn issue_token(secret: &str, claims: &SessionClaims) -> Result<String, Error> {
    let payload = serde_json::to_vec(claims).map_err(|_| Error::Auth)?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| Error::Auth)?;
    mac.update(payload_b64.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{payload_b64}.{sig_b64}"))
}

/// Check signature and expiry. `now` is unix seconds.
pub fn verify_token(secret: &str, token: &str, now: i64) -> Result<SessionClaims, Error> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(Error::Auth)?;
    let sig = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| Error::Auth)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| Error::Auth)?;
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&sig).map_err(|_| Error::Auth)?;

    let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| Error::Auth)?;
    let claims: SessionClaims = serde_json::from_slice(&payload).map_err(|_| Error::Auth)?;
    if claims.exp <= now {
        return Err(Error::Auth);
    }
    Ok(claims)
}

/// Pull the raw token out of the request headers.
fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim());
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then_some(value)
        })
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: String,
}

impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.session_secret.as_deref().filter(|s| !s.is_empty()) else {
            tracing::warn!(path = %parts.uri.path(), "Rejecting request: session secret not configured");
            return Err(Error::Auth);
        };
        let token = token_from_headers(&parts.headers).ok_or(Error::Auth)?;
        let claims = verify_token(secret, token, chrono::Utc::now().timestamp()).map_err(|e| {
            tracing::debug!(path = %parts.uri.path(), "Invalid session token");
            e
        })?;
        Ok(AuthSession { user_id: claims.sub })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn claims(exp: i64) -> SessionClaims {
        SessionClaims { sub: "user_123".into(), exp }
    }

    #[test]
    fn accepts_fresh_token() {
        let token = issue_token(SECRET, &claims(2_000)).unwrap();
        let got = verify_token(SECRET, &token, 1_000).unwrap();
        assert_eq!(got.sub, "user_123");
    }

    #[test]
    fn rejects_expired_token() {
        let token = issue_token(SECRET, &claims(1_000)).unwrap();
        assert_eq!(verify_token(SECRET, &token, 1_000), Err(Error::Auth));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue_token("other", &claims(2_000)).unwrap();
        assert_eq!(verify_token(SECRET, &token, 1_000), Err(Error::Auth));
    }

    #[test]
    fn rejects_tampered_payload() {
        let token = issue_token(SECRET, &claims(2_000)).unwrap();
        let (_, sig) = token.split_once('.').unwrap();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"admin","exp":9999999999}"#);
        assert_eq!(
            verify_token(SECRET, &format!("{forged}.{sig}"), 1_000),
            Err(Error::Auth)
        );
        assert_eq!(verify_token(SECRET, "garbage", 1_000), Err(Error::Auth));
    }

    #[test]
    fn reads_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; __session=abc.def"));
        assert_eq!(token_from_headers(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz.uvw"));
        assert_eq!(token_from_headers(&headers), Some("xyz.uvw"));
    }

    #[test]
    fn missing_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(token_from_headers(&headers), None);
    }
}
