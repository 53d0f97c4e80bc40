//! Bearer-token authentication
//!
//! Identity is established by an external auth provider; this service only
//! verifies the bearer token and turns its claims into a [`User`].
//! [`require_auth`] guards every route except health and provider callbacks.

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use shared::error::AppError;
use shared::models::{User, UserRole};
use thiserror::Error;

use crate::state::AppState;

const DEFAULT_EXPIRY_MINUTES: i64 = 24 * 60;

/// Claims carried by the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    /// Expiration (Unix timestamp seconds)
    pub exp: i64,
    /// Issued at (Unix timestamp seconds)
    pub iat: i64,
}

impl From<Claims> for User {
    fn from(claims: Claims) -> Self {
        User {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            role: claims.role,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    Missing,

    #[error("Invalid Authorization format")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token generation failed: {0}")]
    Generation(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing => AppError::not_authenticated(),
            AuthError::Expired => AppError::token_expired(),
            AuthError::Malformed | AuthError::Invalid(_) => AppError::invalid_token(err.to_string()),
            AuthError::Generation(msg) => AppError::internal(msg),
        }
    }
}

/// Verifies a bearer token and yields the caller
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<User, AuthError>;
}

/// HS256 JWT verification against a shared secret
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_minutes: i64,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_minutes: DEFAULT_EXPIRY_MINUTES,
        }
    }

    pub fn with_expiration_minutes(mut self, minutes: i64) -> Self {
        self.expiration_minutes = minutes;
        self
    }

    /// Issue a token for `user` (test fixtures, service accounts)
    pub fn create_token(&self, user: &User) -> Result<String, AuthError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            exp: (now + chrono::Duration::minutes(self.expiration_minutes)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Generation(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "exp"]);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        Ok(self.validate_token(token)?.into())
    }
}

/// Extract the token from `Authorization: Bearer <token>`
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::Missing)?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::Malformed)
}

/// Middleware that verifies the bearer token and stores the [`CurrentUser`]
/// in request extensions
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if req.method() == http::Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let token = bearer_token(header).inspect_err(|_| {
        tracing::debug!(uri = %req.uri(), "Request without bearer token");
    })?;

    match state.auth.authenticate(token).await {
        Ok(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            Ok(next.run(req).await)
        }
        Err(e) => {
            tracing::warn!(error = %e, uri = %req.uri(), "Token verification failed");
            Err(e.into())
        }
    }
}

/// Caller identity, placed in extensions by [`require_auth`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.0.is_staff() {
            Ok(())
        } else {
            Err(AppError::staff_required())
        }
    }

    /// Customers may only see their own records
    pub fn ensure_access(&self, email: &str, customer_id: Option<&str>) -> Result<(), AppError> {
        if self.0.can_access(email, customer_id) {
            Ok(())
        } else {
            Err(AppError::permission_denied(
                "You do not have access to this resource",
            ))
        }
    }

    pub fn is_staff(&self) -> bool {
        self.0.is_staff()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(AppError::not_authenticated)
    }
}
