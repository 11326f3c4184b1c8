//! JWT Authentication Middleware
//!
//! Issues and validates bearer tokens and turns verified claims into the
//! `CallerContext` every core call takes.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use intern_core::{CallerContext, Role, User, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::error::ErrorResponse;

/// Default token lifetime, in seconds
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 30 * 60;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HS256 secret
    pub secret: String,
    /// Issuer written into and required on tokens
    pub issuer: Option<String>,
    /// Token lifetime in seconds
    pub ttl_secs: u64,
}

/// Error type for JWT configuration
#[derive(Debug, Clone, Error)]
#[error("JWT config error: {message}")]
pub struct JwtConfigError {
    pub message: String,
}

impl JwtConfig {
    /// Minimum secret length
    pub const MIN_SECRET_LENGTH: usize = 32;

    pub fn try_new(secret: impl Into<String>) -> Result<Self, JwtConfigError> {
        let secret = secret.into();
        if secret.len() < Self::MIN_SECRET_LENGTH {
            return Err(JwtConfigError {
                message: format!(
                    "JWT secret must be at least {} bytes. Got {} bytes.",
                    Self::MIN_SECRET_LENGTH,
                    secret.len()
                ),
            });
        }
        Ok(Self {
            secret,
            issuer: None,
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        })
    }

    /// Read `INTERN_JWT_SECRET`, `INTERN_JWT_ISSUER` and `INTERN_JWT_TTL_SECS`
    pub fn try_from_env() -> Result<Self, JwtConfigError> {
        let secret = std::env::var("INTERN_JWT_SECRET").map_err(|_| JwtConfigError {
            message: "INTERN_JWT_SECRET is not set".to_string(),
        })?;
        let mut config = Self::try_new(secret)?;
        if let Ok(issuer) = std::env::var("INTERN_JWT_ISSUER") {
            config = config.with_issuer(issuer);
        }
        if let Some(ttl) = std::env::var("INTERN_JWT_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|t: &u64| *t > 0)
        {
            config.ttl_secs = ttl;
        }
        Ok(config)
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub role: Role,
    pub enrollment: String,
}

impl AuthClaims {
    pub fn for_user(user: &User, config: &JwtConfig) -> Self {
        let now = Utc::now().timestamp().max(0) as u64;
        Self {
            sub: user.id.to_string(),
            exp: now + config.ttl_secs,
            iat: now,
            iss: config.issuer.clone(),
            role: user.role,
            enrollment: user.enrollment.clone(),
        }
    }

    /// Caller identity for core calls
    pub fn caller(&self) -> Result<CallerContext, AuthError> {
        let user_id: UserId = self
            .sub
            .parse()
            .map_err(|_| AuthError::ValidationFailed("subject is not a user id".to_string()))?;
        Ok(CallerContext::new(user_id, self.role))
    }
}

/// Authentication error
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingToken,
    #[error("Invalid authorization header format. Expected: Bearer <token>")]
    InvalidTokenFormat,
    #[error("{0}")]
    ValidationFailed(String),
    #[error("Token has expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = match self {
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidTokenFormat => "INVALID_TOKEN_FORMAT",
            AuthError::ValidationFailed(_) => "TOKEN_VALIDATION_FAILED",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: self.to_string(),
            details: None,
        };

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Sign a token for `user`
pub fn issue_token(user: &User, config: &JwtConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = AuthClaims::for_user(user, config);
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Strip the `Bearer ` prefix
pub fn extract_token(auth_header: &str) -> Result<&str, AuthError> {
    auth_header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidTokenFormat)
}

/// Validate a token and return its claims
pub fn validate_token(token: &str, config: &JwtConfig) -> Result<AuthClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(ref iss) = config.issuer {
        validation.set_issuer(&[iss]);
    }

    let key = DecodingKey::from_secret(config.secret.as_bytes());
    let token_data = decode::<AuthClaims>(token, &key, &validation).map_err(|e| {
        if e.kind() == &jsonwebtoken::errors::ErrorKind::ExpiredSignature {
            AuthError::TokenExpired
        } else {
            AuthError::ValidationFailed(e.to_string())
        }
    })?;

    Ok(token_data.claims)
}

/// Authentication state for the middleware
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<JwtConfig>,
}

impl AuthState {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Require authentication middleware
///
/// Validates the bearer token and stores its claims in request extensions.
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = extract_token(auth_header)?;
    let claims = validate_token(token, &auth_state.config)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extractor for the authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub CallerContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AuthClaims>()
            .ok_or(AuthError::MissingToken)?;
        claims.caller().map(Caller)
    }
}
