mod auth_service;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtSettings;
use crate::error::{AppError, AppResult, Denial};

pub use auth_service::{AuthService, AuthSession, SignUpMetadata};

/// JWT Claims structure that will be encoded in the token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID, shared with the profile)
    pub sub: Uuid,
    /// Session ID, removed on sign-out
    pub jti: Uuid,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

/// Configuration for JWT tokens
pub struct JwtConfig {
    /// Secret key for signing tokens
    encoding_key: EncodingKey,
    /// Key for verifying token signatures
    decoding_key: DecodingKey,
    /// Token expiration time in seconds
    expiration: i64,
    /// Issuer claim value
    issuer: String,
}

impl JwtConfig {
    pub fn new(secret: &str, expiration: i64, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration,
            issuer: issuer.into(),
        }
    }

    pub fn from_settings(settings: &JwtSettings) -> Self {
        Self::new(
            &settings.secret,
            settings.expiration_seconds,
            settings.issuer.clone(),
        )
    }

    /// Generate a signed token for a session
    pub fn generate_token(&self, account_id: Uuid, session_id: Uuid) -> AppResult<(String, Claims)> {
        let now = OffsetDateTime::now_utc();
        let expiration = now + Duration::seconds(self.expiration);

        let claims = Claims {
            sub: account_id,
            jti: session_id,
            iat: now.unix_timestamp(),
            exp: expiration.unix_timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to generate JWT token: {}", e)))?;

        debug!("Generated JWT token for account_id: {}", account_id);
        Ok((token, claims))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            debug!("Rejected JWT token: {}", e);
            AppError::Unauthorized(Denial::NoSession)
        })?;

        debug!("Validated JWT token for account_id: {}", token_data.claims.sub);
        Ok(token_data.claims)
    }

    pub fn expiration_seconds(&self) -> i64 {
        self.expiration
    }
}
