use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::Mac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use super::error::RelayError;

type HmacSha256 = hmac::Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "genrelay_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Stateless HMAC-signed sessions. A token is
/// `base64url(payload) "." base64url(HMAC-SHA256(secret, base64url(payload)))`.
#[derive(Clone)]
pub struct SessionAuthenticator {
    secret: Option<String>,
    ttl: Duration,
}

impl SessionAuthenticator {
    /// The dedicated secret wins; the operator password is the fallback.
    /// Empty values count as unset.
    pub fn new(session_secret: Option<String>, admin_password: Option<String>, ttl: Duration) -> Self {
        let secret = session_secret
            .filter(|s| !s.is_empty())
            .or(admin_password.filter(|s| !s.is_empty()));
        Self { secret, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self) -> Result<String, RelayError> {
        self.issue_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn issue_at(&self, now_ms: i64) -> Result<String, RelayError> {
        let secret = self.secret.as_deref().ok_or_else(|| {
            RelayError::Configuration(
                "no session secret configured: set GENRELAY_SESSION_SECRET or GENRELAY_ADMIN_PASSWORD"
                    .to_string(),
            )
        })?;
        let session = Session {
            issued_at: now_ms,
            expires_at: now_ms.saturating_add(self.ttl.as_millis() as i64),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&session)?);
        let mut mac = keyed(secret)?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify(&self, token: &str) -> bool {
        self.verify_at(token, chrono::Utc::now().timestamp_millis())
    }

    pub fn verify_at(&self, token: &str, now_ms: i64) -> bool {
        self.decode_at(token, now_ms).is_some()
    }

    fn decode_at(&self, token: &str, now_ms: i64) -> Option<Session> {
        let secret = self.secret.as_deref()?;
        let (payload, signature) = token.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = keyed(secret).ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;
        let raw = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let session: Session = serde_json::from_slice(&raw).ok()?;
        (now_ms < session.expires_at).then_some(session)
    }
}

fn keyed(secret: &str) -> Result<HmacSha256, RelayError> {
    <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| RelayError::Configuration(format!("unusable session secret: {}", e)))
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
