use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::JwtConfig;
use crate::error::{AppError, AppResult, Denial};
use crate::model::{ActingProfile, CurrentUser, Profile, Role};
use crate::store::{NewProfile, Store};

const MIN_PASSWORD_LENGTH: usize = 6;
const DEFAULT_ORGANIZATION_NAME: &str = "Chrona Workspace";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignUpMetadata {
    #[serde(default)]
    pub full_name: String,
    /// Start a new organization with the caller as its admin
    #[serde(default)]
    pub organization_name: Option<String>,
}

/// A signed-in caller and the bearer token for the session
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: CurrentUser,
    pub profile: Profile,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Authentication service: accounts, sessions and the acting profile
pub struct AuthService {
    store: Arc<dyn Store>,
    /// JWT configuration
    pub jwt_config: JwtConfig,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, jwt_config: JwtConfig) -> Self {
        Self { store, jwt_config }
    }

    /// Hash a password using Argon2
    pub fn hash_password(password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing error: {}", e)))?
            .to_string();
        Ok(password_hash)
    }

    /// Verify a password against a hash using Argon2
    pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(password_hash)
            .map_err(|e| AppError::Internal(format!("Password hash parsing error: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Create an account and its profile, then open a session.
    ///
    /// The first sign-up, or one naming an organization, founds an
    /// organization and becomes its admin. Everyone else starts without an
    /// organization until an admin assigns them.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> AppResult<AuthSession> {
        let email = normalize_email(email)?;
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let full_name = match metadata.full_name.trim() {
            "" => email.split('@').next().unwrap_or("User").to_string(),
            name => name.to_string(),
        };
        let organization_name = metadata
            .organization_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let password_hash = Self::hash_password(password)?;
        let account = self.store.create_account(&email, &password_hash).await?;

        let founding = match organization_name {
            Some(name) => Some(name.to_string()),
            None if !self.store.organization_exists().await? => {
                Some(DEFAULT_ORGANIZATION_NAME.to_string())
            }
            None => None,
        };
        let (org_id, role) = match founding {
            Some(name) => {
                let org = self.store.create_organization(&name).await?;
                info!("Created organization {} for {}", org.id, email);
                (Some(org.id), Role::Admin)
            }
            None => (None, Role::Freelancer),
        };

        let profile = self
            .store
            .create_profile(NewProfile {
                id: account.id,
                org_id,
                role,
                full_name,
                email: email.clone(),
            })
            .await?;

        info!("New user registered: {} ({})", email, role);
        self.open_session(CurrentUser { id: account.id, email }, profile)
            .await
    }

    /// Verify credentials and open a session
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthSession> {
        let email = email.trim().to_lowercase();
        let Some(account) = self.store.get_account_by_email(&email).await? else {
            warn!("Sign-in attempt for unknown email: {}", email);
            return Err(AppError::Unauthorized(Denial::InvalidCredentials));
        };

        if !Self::verify_password(password, &account.password_hash)? {
            warn!("Password verification failed for user: {}", email);
            return Err(AppError::Unauthorized(Denial::InvalidCredentials));
        }

        let profile = self
            .store
            .get_profile(account.id)
            .await?
            .ok_or_else(|| AppError::not_found("Profile"))?;

        info!("User authenticated successfully: {}", email);
        self.open_session(
            CurrentUser {
                id: account.id,
                email: account.email,
            },
            profile,
        )
        .await
    }

    /// End the session behind `token`. Unknown or expired tokens are a no-op.
    pub async fn sign_out(&self, token: &str) -> AppResult<()> {
        if let Ok(claims) = self.jwt_config.validate_token(token) {
            self.store.delete_session(claims.jti).await?;
            info!("Session {} closed for account_id: {}", claims.jti, claims.sub);
        }
        Ok(())
    }

    /// Resolve a bearer token to its account, if the session is still open
    pub async fn get_current_user(&self, token: &str) -> AppResult<Option<CurrentUser>> {
        let Ok(claims) = self.jwt_config.validate_token(token) else {
            return Ok(None);
        };

        let Some(session) = self.store.get_session(claims.jti).await? else {
            debug!("No open session {} for account_id: {}", claims.jti, claims.sub);
            return Ok(None);
        };
        if session.account_id != claims.sub || session.expires_at <= OffsetDateTime::now_utc() {
            return Ok(None);
        }

        Ok(self
            .store
            .get_account(claims.sub)
            .await?
            .map(|account| CurrentUser {
                id: account.id,
                email: account.email,
            }))
    }

    /// Resolve a bearer token to the identity services act on. The role
    /// and organization are read from the profile on every call.
    pub async fn acting_profile(&self, token: &str) -> AppResult<Option<ActingProfile>> {
        let current = self.whoami(token).await?;
        Ok(current.map(|(_, profile)| profile.acting()))
    }

    /// Account and profile behind `token`, if the session is still open
    pub async fn whoami(&self, token: &str) -> AppResult<Option<(CurrentUser, Profile)>> {
        let Some(user) = self.get_current_user(token).await? else {
            return Ok(None);
        };
        let profile = self.store.get_profile(user.id).await?;
        Ok(profile.map(|profile| (user, profile)))
    }

    async fn open_session(&self, user: CurrentUser, profile: Profile) -> AppResult<AuthSession> {
        let session_id = Uuid::new_v4();
        let (token, claims) = self.jwt_config.generate_token(user.id, session_id)?;
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|e| AppError::Internal(format!("Invalid token expiry: {}", e)))?;

        self.store
            .create_session(session_id, user.id, expires_at)
            .await?;

        Ok(AuthSession {
            user,
            profile,
            token,
            expires_at,
        })
    }
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::validation("Please enter a valid email address")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn auth_service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryStore::new()),
            JwtConfig::new("test_secret_key_for_jwt_token_testing", 3600, "chrona"),
        )
    }

    fn metadata(full_name: &str) -> SignUpMetadata {
        SignUpMetadata {
            full_name: full_name.to_string(),
            organization_name: None,
        }
    }

    #[test]
    fn test_password_hashing() {
        let hash = AuthService::hash_password("test_password").unwrap();
        assert!(AuthService::verify_password("test_password", &hash).unwrap());
        assert!(!AuthService::verify_password("wrong_password", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_first_sign_up_founds_organization() {
        let auth = auth_service();

        let admin = auth.sign_up("ada@example.com", "secret1", metadata("Ada")).await.unwrap();
        assert_eq!(admin.profile.role, Role::Admin);
        assert!(admin.profile.org_id.is_some());

        let freelancer = auth
            .sign_up("grace@example.com", "secret2", metadata(""))
            .await
            .unwrap();
        assert_eq!(freelancer.profile.role, Role::Freelancer);
        assert!(freelancer.profile.org_id.is_none());
        assert_eq!(freelancer.profile.full_name, "grace");
    }

    #[tokio::test]
    async fn test_named_organization_makes_admin() {
        let auth = auth_service();
        auth.sign_up("ada@example.com", "secret1", metadata("Ada")).await.unwrap();

        let founder = auth
            .sign_up(
                "linus@example.com",
                "secret3",
                SignUpMetadata {
                    full_name: "Linus".to_string(),
                    organization_name: Some("Kernel Crew".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(founder.profile.role, Role::Admin);
        assert!(founder.profile.org_id.is_some());
    }

    #[tokio::test]
    async fn test_sign_up_validation_and_duplicates() {
        let auth = auth_service();
        assert!(matches!(
            auth.sign_up("not-an-email", "secret1", metadata("X")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            auth.sign_up("x@example.com", "short", metadata("X")).await,
            Err(AppError::Validation(_))
        ));

        auth.sign_up("x@example.com", "secret1", metadata("X")).await.unwrap();
        assert!(matches!(
            auth.sign_up("X@example.com", "secret1", metadata("X")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_in_and_sign_out() {
        let auth = auth_service();
        auth.sign_up("ada@example.com", "secret1", metadata("Ada")).await.unwrap();

        assert!(matches!(
            auth.sign_in("ada@example.com", "wrong").await,
            Err(AppError::Unauthorized(Denial::InvalidCredentials))
        ));
        assert!(matches!(
            auth.sign_in("nobody@example.com", "secret1").await,
            Err(AppError::Unauthorized(Denial::InvalidCredentials))
        ));

        let session = auth.sign_in("ada@example.com", "secret1").await.unwrap();
        let user = auth.get_current_user(&session.token).await.unwrap().unwrap();
        assert_eq!(user.email, "ada@example.com");

        let acting = auth.acting_profile(&session.token).await.unwrap().unwrap();
        assert_eq!(acting.id, user.id);
        assert_eq!(acting.role, Role::Admin);

        auth.sign_out(&session.token).await.unwrap();
        assert!(auth.get_current_user(&session.token).await.unwrap().is_none());
        assert!(auth.acting_profile(&session.token).await.unwrap().is_none());
    }
}
