//! Caller identity for the agent endpoints.
//!
//! - When `DEV_MODE=true`, every request runs as a fixed development user
//! - Otherwise requests need `Authorization: Bearer <jwt>`, signed HS256 with
//!   `JWT_SECRET` and carrying `sub` plus optional `email` and `name`
//!
//! The resolved [`UserBase`] is attached to the request as an extension.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};

use super::error::ApiError;
use super::routes::AppState;
use crate::agents::types::UserBase;
use crate::config::Config;

const DEV_USER_ID: &str = "dev-user";
const DEV_USER_EMAIL: &str = "dev@localhost";

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Claims {
    /// Caller id
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    /// Expiration unix seconds
    exp: i64,
}

/// Identity used for every request in dev mode.
pub fn dev_user() -> UserBase {
    UserBase {
        id: DEV_USER_ID.to_string(),
        email: Some(DEV_USER_EMAIL.to_string()),
        name: Some("Developer".to_string()),
    }
}

/// Sign a token for `user`, valid for `ttl_days`.
pub fn issue_jwt(secret: &str, user: &UserBase, ttl_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
        exp: (Utc::now() + Duration::days(ttl_days.max(1))).timestamp(),
    };
    Ok(jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

fn verify_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Resolve the caller from request headers.
pub fn resolve_user(config: &Config, headers: &HeaderMap) -> Result<UserBase, ApiError> {
    if config.dev_mode {
        return Ok(dev_user());
    }

    // Config loading refuses non-dev mode without a secret; fail closed anyway.
    let secret = config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("JWT_SECRET not configured"))?;

    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .unwrap_or("")
        .trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("Missing Authorization header"));
    }

    let claims = verify_jwt(token, secret).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        ApiError::unauthorized("Invalid or expired token")
    })?;
    if claims.sub.trim().is_empty() {
        return Err(ApiError::unauthorized("Token has no subject"));
    }
    Ok(UserBase {
        id: claims.sub,
        email: claims.email,
        name: claims.name,
    })
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match resolve_user(&state.config, req.headers()) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    fn secured_config() -> Config {
        let mut config = Config::new("sk", "https://api.openai.com/v1");
        config.dev_mode = false;
        config.jwt_secret = Some("s3cret".to_string());
        config
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_dev_mode_uses_fixed_user() {
        let config = Config::new("sk", "https://api.openai.com/v1");
        assert_eq!(resolve_user(&config, &HeaderMap::new()).unwrap(), dev_user());
    }

    #[test]
    fn test_valid_token_resolves_claims() {
        let user = UserBase::new("user-42").with_email("a@b.c");
        let token = issue_jwt("s3cret", &user, 1).unwrap();
        let resolved = resolve_user(&secured_config(), &bearer(&token)).unwrap();
        assert_eq!(resolved, user);
    }

    #[test]
    fn test_missing_or_bad_token_is_unauthorized() {
        let config = secured_config();
        let err = resolve_user(&config, &HeaderMap::new()).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let forged = issue_jwt("other-secret", &UserBase::new("x"), 1).unwrap();
        let err = resolve_user(&config, &bearer(&forged)).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
