//! Token extractors. `AuthUser` accepts client tokens, `ServiceCaller`
//! accepts tokens minted for other TeraSync processes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use terasync_auth::Claims;
use terasync_core::error::AppError;
use terasync_core::types::Uid;
use terasync_entity::UserData;

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated client.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: Uid,
    pub alias: Option<String>,
    /// Served from the priority download lane.
    pub priority: bool,
}

impl AuthUser {
    /// Validate a raw client token.
    pub fn from_token(state: &AppState, token: &str) -> Result<Self, AppError> {
        let claims = state.jwt_decoder.decode_user_token(token)?;
        Self::from_claims(&claims)
    }

    fn from_claims(claims: &Claims) -> Result<Self, AppError> {
        Ok(Self {
            uid: claims.uid()?,
            alias: claims.alias.clone().filter(|a| !a.trim().is_empty()),
            priority: claims.has_priority(),
        })
    }

    pub fn user_data(&self) -> UserData {
        UserData::new(self.uid.clone(), self.alias.clone())
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts, state).await?;
        Ok(Self::from_token(state, &token)?)
    }
}

/// Another TeraSync process, identified by the shard name in its token.
#[derive(Debug, Clone)]
pub struct ServiceCaller {
    pub shard: String,
}

impl FromRequestParts<AppState> for ServiceCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts, state).await?;
        let claims = state.jwt_decoder.decode_service_token(&token).map_err(|e| {
            // A valid client token on an internal route is a permission
            // problem, not an authentication one.
            if state.jwt_decoder.decode_user_token(&token).is_ok() {
                AppError::authorization("Service token required")
            } else {
                e
            }
        })?;
        Ok(Self { shard: claims.sub })
    }
}

/// Bearer token from the `Authorization` header.
async fn bearer_token(parts: &mut Parts, state: &AppState) -> Result<String, AppError> {
    let TypedHeader(Authorization(bearer)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::authentication("Missing or malformed Authorization header"))?;
    Ok(bearer.token().to_string())
}
