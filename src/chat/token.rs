use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const RELAY_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: RelayClaims,
}

/// Mints HS256 tokens that let clients subscribe to the broker directly.
pub struct TokenIssuer {
    keys: Option<(EncodingKey, DecodingKey)>,
}

impl TokenIssuer {
    pub fn new(secret: Option<&str>) -> Self {
        let keys = secret.map(|secret| {
            (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            )
        });
        Self { keys }
    }

    pub fn issue(&self, user_id: &str) -> Result<IssuedToken, AppError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: &str, issued_at: DateTime<Utc>) -> Result<IssuedToken, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::InvalidInput("user_id required".to_string()));
        }
        let (encoding_key, _) = self.keys()?;

        let claims = RelayClaims {
            sub: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + Duration::hours(RELAY_TOKEN_TTL_HOURS)).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, encoding_key)
            .map_err(|err| AppError::Internal(format!("token signing failed: {err}")))?;

        Ok(IssuedToken { token, claims })
    }

    /// Checks signature and expiry with no leeway.
    pub fn verify(&self, token: &str) -> Result<RelayClaims, AppError> {
        let (_, decoding_key) = self.keys()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<RelayClaims>(token, decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("relay token expired".to_string())
                }
                _ => AppError::Unauthorized(format!("invalid relay token: {err}")),
            })
    }

    fn keys(&self) -> Result<&(EncodingKey, DecodingKey), AppError> {
        self.keys.as_ref().ok_or_else(|| {
            AppError::Configuration("broker token secret is not configured".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{TokenIssuer, RELAY_TOKEN_TTL_HOURS};
    use crate::error::AppError;

    #[test]
    fn token_carries_subject_and_24h_expiry() {
        let issuer = TokenIssuer::new(Some("broker-secret"));
        let issued = issuer.issue("17").unwrap();

        let claims = issuer.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, "17");
        assert_eq!(claims.exp - claims.iat, RELAY_TOKEN_TTL_HOURS * 3600);
    }

    #[test]
    fn token_past_its_window_is_rejected() {
        let issuer = TokenIssuer::new(Some("broker-secret"));
        let issued = issuer
            .issue_at("17", Utc::now() - Duration::hours(24) - Duration::seconds(5))
            .unwrap();

        let result = issuer.verify(&issued.token);
        match result {
            Err(AppError::Unauthorized(msg)) => assert!(msg.contains("expired")),
            other => panic!("expected expiry rejection, got {other:?}"),
        }
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issued = TokenIssuer::new(Some("one")).issue("17").unwrap();
        let result = TokenIssuer::new(Some("two")).verify(&issued.token);
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let issuer = TokenIssuer::new(None);
        assert!(matches!(
            issuer.issue("17"),
            Err(AppError::Configuration(_))
        ));
    }
}
