use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::user::{Identity, Role};
use crate::models::UserId;

/// Claims carried by the platform's login tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: UserId,
    pub role: Role,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Turns a bearer credential into a verified identity.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, bearer: &str) -> Result<Identity, AppError>;
}

/// Verifies HS256 access tokens issued by the platform's login service.
pub struct JwtAuthenticator {
    decoding_key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            decoding_key: secret.map(|secret| DecodingKey::from_secret(secret.as_bytes())),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, bearer: &str) -> Result<Identity, AppError> {
        let key = self.decoding_key.as_ref().ok_or_else(|| {
            AppError::Configuration("JWT_SECRET is not configured".to_string())
        })?;

        let claims = decode::<AccessClaims>(bearer, key, &self.validation)
            .map_err(|_| AppError::Unauthorized("invalid token".to_string()))?
            .claims;

        Ok(Identity {
            user_id: claims.user_id,
            role: claims.role,
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Result<&str, AppError> {
    match header.split_once(' ') {
        Some(("Bearer", token)) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AppError::Unauthorized("malformed authorization header".to_string())),
    }
}
