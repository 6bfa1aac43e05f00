//! HS256 bearer-token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;

use crate::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("malformed or badly signed token: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Turns a raw bearer token into verified claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// Shared-secret (HS256) validator.
///
/// The claim time window uses `issued_at`/`expires_at`, so the registered `exp`
/// claim is neither required nor checked by the decoder.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use construcbill_core::UserId;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use crate::Role;

    fn mint(secret: &str, claims: &JwtClaims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verifies_signature_and_window() {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: UserId::new(),
            roles: vec![Role::PROJECT_MANAGER],
            issued_at: now - Duration::seconds(5),
            expires_at: now + Duration::minutes(5),
        };
        let validator = Hs256JwtValidator::new("s3cret");

        let token = mint("s3cret", &claims);
        assert_eq!(validator.validate(&token, now).unwrap(), claims);

        let forged = mint("other", &claims);
        assert!(matches!(validator.validate(&forged, now), Err(JwtError::Decode(_))));

        let later = now + Duration::hours(1);
        assert!(matches!(
            validator.validate(&token, later),
            Err(JwtError::Claims(TokenValidationError::Expired))
        ));
    }
}
