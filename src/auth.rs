//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs carrying an `account_id` and a `user_id`. Expiry is
//! not enforced so that long running load tests can reuse one token per user.
use std::future::{Ready, ready};

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing or invalid Authorization header")]
    MissingToken,

    #[error("Authorization header must be 'Bearer <token>'")]
    MalformedHeader,

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),

    #[error("Token must contain account_id and user_id")]
    MissingClaims,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    pub account_id: String,
    pub user_id: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn generate_token(&self, account_id: &str, user_id: &str) -> Result<String, AuthError> {
        let (account_id, user_id) = (account_id.trim(), user_id.trim());
        if account_id.is_empty() || user_id.is_empty() {
            return Err(AuthError::MissingClaims);
        }

        let claims = Claims {
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
            iat: Some(Utc::now().timestamp()),
            exp: None,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<UserContext, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let (account_id, user_id) = (data.claims.account_id.trim(), data.claims.user_id.trim());
        if account_id.is_empty() || user_id.is_empty() {
            return Err(AuthError::MissingClaims);
        }

        Ok(UserContext {
            account_id: account_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

pub fn bearer_token(authorization: &str) -> Result<&str, AuthError> {
    let authorization = authorization.trim();
    if authorization.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let mut parts = authorization.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

fn authenticate(req: &HttpRequest) -> Result<UserContext, ApiError> {
    let keys = req
        .app_data::<web::Data<JwtKeys>>()
        .ok_or_else(|| ApiError::Unauthorized("Authentication is not configured".to_string()))?;

    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    bearer_token(header)
        .and_then(|token| keys.validate(token))
        .map_err(|e| ApiError::Unauthorized(e.to_string()))
}

impl FromRequest for UserContext {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}
