//! JWT issuance.

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};

use terasync_core::config::auth::AuthConfig;
use terasync_core::error::AppError;

use super::claims::{Claims, TokenType};

/// Signs tokens with the shared secret.
#[derive(Clone)]
pub struct JwtEncoder {
    encoding_key: EncodingKey,
    issuer: String,
    service_ttl_seconds: i64,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtEncoder {
    /// Creates a new encoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            service_ttl_seconds: config.service_token_ttl_seconds as i64,
        }
    }

    /// Mint a token identifying this process to another TeraSync process.
    pub fn issue_service_token(&self, shard: &str) -> Result<String, AppError> {
        self.sign(shard, None, TokenType::Service, self.service_ttl_seconds)
    }

    /// Mint a client token. Production clients get theirs from the account
    /// service; this is used by tooling and tests.
    pub fn issue_user_token(
        &self,
        uid: &str,
        alias: Option<&str>,
        ttl_seconds: i64,
    ) -> Result<String, AppError> {
        self.sign(uid, alias, TokenType::User, ttl_seconds)
    }

    fn sign(
        &self,
        sub: &str,
        alias: Option<&str>,
        token_type: TokenType,
        ttl_seconds: i64,
    ) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            alias: alias.map(str::to_string),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + ttl_seconds,
            token_type,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Token signing failed: {e}")))
    }
}
