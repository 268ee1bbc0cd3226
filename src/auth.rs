use crate::api::AnalyticsApi;
use crate::config::ServiceAccountConfig;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::session::SessionStore;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Session key under which the current access token is kept.
pub const AUTH_SESSION_KEY: &str = "auth";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Access token plus the instant it stops being usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Service-account key file as downloaded from the cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> AnalyticsResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AnalyticsError::Authentication(format!(
                "cannot read service account key {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> AnalyticsResult<Self> {
        serde_json::from_str(raw).map_err(|e| {
            AnalyticsError::Authentication(format!("malformed service account key: {e}"))
        })
    }

    /// Sign the RS256 bearer assertion exchanged for an access token.
    pub fn sign_assertion(
        &self,
        scopes: &[String],
        audience: &str,
        now: DateTime<Utc>,
        lifetime_secs: i64,
    ) -> AnalyticsResult<String> {
        let exp = Duration::try_seconds(lifetime_secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AnalyticsError::Authentication(format!(
                    "assertion lifetime out of range: {lifetime_secs}"
                ))
            })?;
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: scopes.join(" "),
            aud: audience.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| AnalyticsError::Authentication(format!("invalid private key: {e}")))?;

        encode(&header, &claims, &key)
            .map_err(|e| AnalyticsError::Authentication(format!("sign assertion: {e}")))
    }
}

/// Obtains and refreshes the service-account access token for a session.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    key_path: PathBuf,
    scopes: Vec<String>,
    token_uri: Option<String>,
    lifetime_secs: i64,
}

impl TokenProvider {
    pub fn new(config: &ServiceAccountConfig) -> Self {
        Self {
            key_path: config.key_path.clone(),
            scopes: config.scopes.clone(),
            token_uri: config.token_uri.clone(),
            lifetime_secs: config.token_lifetime_secs,
        }
    }

    pub fn stored_token(session: &SessionStore) -> Option<StoredToken> {
        session.get_as(AUTH_SESSION_KEY)
    }

    /// Return the session's token while it is unexpired, otherwise run the
    /// assertion flow and record the new token in the session.
    pub async fn ensure_valid_token<A>(
        &self,
        api: &A,
        session: &SessionStore,
    ) -> AnalyticsResult<String>
    where
        A: AnalyticsApi + ?Sized,
    {
        let now = Utc::now();
        if let Some(token) = Self::stored_token(session) {
            if token.is_valid_at(now) {
                return Ok(token.access_token);
            }
            tracing::debug!(expires_at = %token.expires_at, "stored access token expired");
        }

        // Key material is read on every refresh.
        let key = ServiceAccountKey::from_file(&self.key_path)?;
        let token_uri = self.token_uri.as_deref().unwrap_or(&key.token_uri);
        let assertion = key.sign_assertion(&self.scopes, token_uri, now, self.lifetime_secs)?;

        let grant = api
            .exchange_assertion(token_uri, &assertion)
            .await
            .map_err(|e| AnalyticsError::Authentication(format!("token exchange failed: {e}")))?;

        if grant.access_token.is_empty() {
            return Err(AnalyticsError::Authentication(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        let expires_at = Some(grant.expires_in)
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AnalyticsError::Authentication(format!(
                    "token endpoint returned an invalid expires_in: {}",
                    grant.expires_in
                ))
            })?;

        let token = StoredToken {
            access_token: grant.access_token,
            expires_at,
        };
        session
            .set_as(AUTH_SESSION_KEY, &token)
            .map_err(|e| AnalyticsError::Authentication(format!("store token: {e}")))?;

        tracing::info!(
            client_email = %key.client_email,
            expires_at = %token.expires_at,
            "obtained service account access token"
        );
        Ok(token.access_token)
    }
}
