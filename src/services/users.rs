use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::required_text;
use crate::error::{AppError, AppResult};
use crate::gate::{self, Command};
use crate::model::{ActingProfile, Currency, Profile, Role};
use crate::store::{ProfileSettings, Store};

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsInput {
    pub full_name: String,
    #[serde(default)]
    pub default_hourly_rate: Option<f64>,
    #[serde(default)]
    pub preferred_currency: Option<Currency>,
}

/// Organization membership and profile administration
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Every profile in the organization, active or not, by name
    pub async fn list(&self, actor: Option<&ActingProfile>) -> AppResult<Vec<Profile>> {
        let scope = gate::authorize(actor, &Command::ListUsers)?;
        self.store.list_profiles(scope.org_id, false).await
    }

    pub async fn update_role(
        &self,
        actor: Option<&ActingProfile>,
        target: Uuid,
        role: Role,
    ) -> AppResult<Profile> {
        let scope = gate::authorize(actor, &Command::ChangeRole { target })?;
        let profile = self.store.update_profile_role(scope.org_id, target, role).await?;
        info!("User {} is now {} (by user_id: {})", target, role, scope.user_id);
        Ok(profile)
    }

    pub async fn update_status(
        &self,
        actor: Option<&ActingProfile>,
        target: Uuid,
        is_active: bool,
    ) -> AppResult<Profile> {
        let scope = gate::authorize(actor, &Command::ChangeStatus { target })?;
        let profile = self
            .store
            .update_profile_status(scope.org_id, target, is_active)
            .await?;
        info!(
            "User {} {} by user_id: {}",
            target,
            if is_active { "activated" } else { "deactivated" },
            scope.user_id
        );
        Ok(profile)
    }

    /// Bring a signed-up profile without an organization into the caller's
    /// organization as a freelancer
    pub async fn assign_to_org(&self, actor: Option<&ActingProfile>, email: &str) -> AppResult<Profile> {
        let scope = gate::authorize(actor, &Command::AssignUserToOrg)?;
        let email = email.trim().to_lowercase();

        let profile = self
            .store
            .get_profile_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        match profile.org_id {
            Some(org_id) if org_id == scope.org_id => {
                return Err(AppError::conflict("User is already a member of this organization"));
            }
            Some(_) => {
                return Err(AppError::conflict("User already belongs to an organization"));
            }
            None => {}
        }

        let profile = self.store.assign_profile_org(profile.id, scope.org_id).await?;
        info!("User {} assigned to organization {}", profile.id, scope.org_id);
        Ok(profile)
    }

    /// The caller's own settings. Needs a session but no organization.
    pub async fn update_settings(
        &self,
        actor: Option<&ActingProfile>,
        input: SettingsInput,
    ) -> AppResult<Profile> {
        let actor = gate::authenticated(actor)?;
        let full_name = required_text(&input.full_name, "Full name is required")?;
        let default_hourly_rate = match input.default_hourly_rate {
            Some(rate) if !rate.is_finite() || rate < 0.0 => {
                return Err(AppError::validation("Hourly rate cannot be negative"));
            }
            rate => rate,
        };

        let profile = self
            .store
            .update_profile_settings(
                actor.id,
                ProfileSettings {
                    full_name,
                    default_hourly_rate,
                    preferred_currency: input.preferred_currency,
                },
            )
            .await?;
        info!("Settings updated for user_id: {}", actor.id);
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Denial;
    use crate::services::testing;
    use crate::store::NewProfile;

    #[tokio::test]
    async fn test_admin_cannot_demote_or_deactivate_self() {
        let org = testing::org().await;
        let service = UserService::new(org.store.clone());

        assert!(matches!(
            service.update_role(Some(&org.admin), org.admin.id, Role::Freelancer).await,
            Err(AppError::Unauthorized(Denial::SelfModification))
        ));
        assert!(matches!(
            service.update_status(Some(&org.admin), org.admin.id, false).await,
            Err(AppError::Unauthorized(Denial::SelfModification))
        ));

        let promoted = service
            .update_role(Some(&org.admin), org.freelancer.id, Role::Admin)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);

        let deactivated = service
            .update_status(Some(&org.admin), org.freelancer.id, false)
            .await
            .unwrap();
        assert!(!deactivated.is_active);
    }

    #[tokio::test]
    async fn test_freelancer_cannot_manage_users() {
        let org = testing::org().await;
        let service = UserService::new(org.store.clone());
        assert!(matches!(
            service.list(Some(&org.freelancer)).await,
            Err(AppError::Unauthorized(Denial::AdminRequired))
        ));
        assert!(matches!(
            service.update_role(Some(&org.freelancer), org.admin.id, Role::Freelancer).await,
            Err(AppError::Unauthorized(Denial::AdminRequired))
        ));

        let users = service.list(Some(&org.admin)).await.unwrap();
        assert_eq!(
            users.iter().map(|u| u.full_name.as_str()).collect::<Vec<_>>(),
            vec!["Alice", "Bob"]
        );
    }

    #[tokio::test]
    async fn test_assign_unaffiliated_profile() {
        let org = testing::org().await;
        let service = UserService::new(org.store.clone());
        let newcomer = org
            .store
            .create_profile(NewProfile {
                id: Uuid::new_v4(),
                org_id: None,
                role: Role::Freelancer,
                full_name: "Dana".to_string(),
                email: "dana@example.com".to_string(),
            })
            .await
            .unwrap();

        let assigned = service
            .assign_to_org(Some(&org.admin), " Dana@Example.com ")
            .await
            .unwrap();
        assert_eq!(assigned.id, newcomer.id);
        assert_eq!(assigned.org_id, Some(org.org_id));
        assert_eq!(assigned.role, Role::Freelancer);

        assert!(matches!(
            service.assign_to_org(Some(&org.admin), "dana@example.com").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            service.assign_to_org(Some(&org.admin), "ghost@example.com").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_settings_need_only_a_session() {
        let org = testing::org().await;
        let service = UserService::new(org.store.clone());
        let mut orphan = org.freelancer;
        orphan.org_id = None;

        let updated = service
            .update_settings(
                Some(&orphan),
                SettingsInput {
                    full_name: "Robert".to_string(),
                    default_hourly_rate: Some(55.0),
                    preferred_currency: Some(Currency::Usdc),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name, "Robert");
        assert_eq!(updated.preferred_currency, Some(Currency::Usdc));

        assert!(matches!(
            service
                .update_settings(
                    None,
                    SettingsInput {
                        full_name: "X".to_string(),
                        default_hourly_rate: None,
                        preferred_currency: None,
                    },
                )
                .await,
            Err(AppError::Unauthorized(Denial::NoSession))
        ));
    }
}
