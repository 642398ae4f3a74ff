use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{non_blank, required_text};
use crate::error::{AppError, AppResult};
use crate::gate::{self, Command, Scope};
use crate::model::{ActingProfile, Project, ProjectMember, ProjectMemberDetail, ProjectStatus};
use crate::store::{NewProject, NewProjectMember, ProjectUpdate, Store};

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberInput {
    pub user_id: Uuid,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
}

pub struct ProjectService {
    store: Arc<dyn Store>,
}

impl ProjectService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, actor: Option<&ActingProfile>, input: ProjectInput) -> AppResult<Project> {
        let scope = gate::authorize(actor, &Command::CreateProject)?;
        let name = required_text(&input.name, "Project name is required")?;

        let project = self
            .store
            .create_project(NewProject {
                org_id: scope.org_id,
                name,
                description: non_blank(input.description),
            })
            .await?;
        info!("Project {} created by user_id: {}", project.id, scope.user_id);
        Ok(project)
    }

    pub async fn update(
        &self,
        actor: Option<&ActingProfile>,
        id: Uuid,
        input: ProjectInput,
    ) -> AppResult<Project> {
        let scope = gate::authorize(actor, &Command::UpdateProject)?;
        let name = required_text(&input.name, "Project name is required")?;

        let project = self
            .store
            .update_project(
                scope.org_id,
                id,
                ProjectUpdate {
                    name,
                    description: non_blank(input.description),
                },
            )
            .await?;
        info!("Project {} updated by user_id: {}", id, scope.user_id);
        Ok(project)
    }

    pub async fn archive(&self, actor: Option<&ActingProfile>, id: Uuid) -> AppResult<Project> {
        let scope = gate::authorize(actor, &Command::ArchiveProject)?;
        self.set_status(scope, id, ProjectStatus::Archived).await
    }

    pub async fn restore(&self, actor: Option<&ActingProfile>, id: Uuid) -> AppResult<Project> {
        let scope = gate::authorize(actor, &Command::RestoreProject)?;
        self.set_status(scope, id, ProjectStatus::Active).await
    }

    /// Organization projects ordered by name
    pub async fn list(
        &self,
        actor: Option<&ActingProfile>,
        include_archived: bool,
    ) -> AppResult<Vec<Project>> {
        let scope = gate::authorize(actor, &Command::ListProjects)?;
        self.store.list_projects(scope.org_id, include_archived).await
    }

    /// Active projects the caller can log time against
    pub async fn assigned(&self, actor: Option<&ActingProfile>) -> AppResult<Vec<Project>> {
        let scope = gate::authorize(actor, &Command::ListAssignedProjects)?;
        if scope.is_admin() {
            return self.store.list_projects(scope.org_id, false).await;
        }

        let projects = self
            .store
            .list_member_projects(scope.org_id, scope.user_id)
            .await?;
        Ok(projects.into_iter().filter(Project::is_active).collect())
    }

    pub async fn members(
        &self,
        actor: Option<&ActingProfile>,
        project_id: Uuid,
    ) -> AppResult<Vec<ProjectMemberDetail>> {
        let scope = gate::authorize(actor, &Command::ListProjectMembers)?;
        self.load(&scope, project_id).await?;
        let members = self
            .store
            .list_project_members(scope.org_id, project_id)
            .await?;
        debug!("Project {} has {} members", project_id, members.len());
        Ok(members)
    }

    /// Assign an organization member to the project. Assigning twice is a conflict.
    pub async fn add_member(
        &self,
        actor: Option<&ActingProfile>,
        project_id: Uuid,
        input: MemberInput,
    ) -> AppResult<ProjectMember> {
        let scope = gate::authorize(actor, &Command::AddProjectMember)?;
        let hourly_rate = match input.hourly_rate {
            Some(rate) if !rate.is_finite() || rate < 0.0 => {
                return Err(AppError::validation("Hourly rate cannot be negative"));
            }
            Some(rate) if rate > 0.0 => Some(rate),
            _ => None,
        };

        self.load(&scope, project_id).await?;
        if self
            .store
            .get_org_profile(scope.org_id, input.user_id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found("User"));
        }

        let member = self
            .store
            .add_project_member(
                scope.org_id,
                NewProjectMember {
                    project_id,
                    user_id: input.user_id,
                    hourly_rate,
                },
            )
            .await?;
        info!("User {} assigned to project {}", input.user_id, project_id);
        Ok(member)
    }

    pub async fn remove_member(
        &self,
        actor: Option<&ActingProfile>,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let scope = gate::authorize(actor, &Command::RemoveProjectMember)?;
        self.load(&scope, project_id).await?;
        self.store
            .remove_project_member(scope.org_id, project_id, user_id)
            .await?;
        info!("User {} removed from project {}", user_id, project_id);
        Ok(())
    }

    async fn load(&self, scope: &Scope, id: Uuid) -> AppResult<Project> {
        self.store
            .get_project(scope.org_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Project"))
    }

    async fn set_status(&self, scope: Scope, id: Uuid, status: ProjectStatus) -> AppResult<Project> {
        let project = self.store.set_project_status(scope.org_id, id, status).await?;
        info!(
            "Project {} set to {:?} by user_id: {}",
            id, status, scope.user_id
        );
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Denial;
    use crate::services::testing;

    fn input(name: &str) -> ProjectInput {
        ProjectInput {
            name: name.to_string(),
            description: Some(" ".to_string()),
        }
    }

    #[tokio::test]
    async fn test_project_crud_is_admin_only() {
        let org = testing::org().await;
        let service = ProjectService::new(org.store.clone());

        assert!(matches!(
            service.create(Some(&org.freelancer), input("Website")).await,
            Err(AppError::Unauthorized(Denial::AdminRequired))
        ));
        assert!(matches!(
            service.create(Some(&org.admin), input("  ")).await,
            Err(AppError::Validation(_))
        ));

        let project = service.create(Some(&org.admin), input(" Website ")).await.unwrap();
        assert_eq!(project.name, "Website");
        assert!(project.description.is_none());

        let renamed = service
            .update(Some(&org.admin), project.id, input("Web app"))
            .await
            .unwrap();
        assert_eq!(renamed.name, "Web app");
    }

    #[tokio::test]
    async fn test_archive_hides_project_from_default_listing() {
        let org = testing::org().await;
        let service = ProjectService::new(org.store.clone());
        let b = service.create(Some(&org.admin), input("Beta")).await.unwrap();
        service.create(Some(&org.admin), input("Alpha")).await.unwrap();

        service.archive(Some(&org.admin), b.id).await.unwrap();
        let active = service.list(Some(&org.freelancer), false).await.unwrap();
        assert_eq!(active.len(), 1);
        let all = service.list(Some(&org.freelancer), true).await.unwrap();
        assert_eq!(
            all.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["Alpha", "Beta"]
        );

        let restored = service.restore(Some(&org.admin), b.id).await.unwrap();
        assert!(restored.is_active());
    }

    #[tokio::test]
    async fn test_assigned_projects() {
        let org = testing::org().await;
        let service = ProjectService::new(org.store.clone());
        let assigned = org.project("Assigned").await;
        service.create(Some(&org.admin), input("Other")).await.unwrap();

        let freelancer_view = service.assigned(Some(&org.freelancer)).await.unwrap();
        assert_eq!(freelancer_view.len(), 1);
        assert_eq!(freelancer_view[0].id, assigned.id);

        service.archive(Some(&org.admin), assigned.id).await.unwrap();
        assert!(service.assigned(Some(&org.freelancer)).await.unwrap().is_empty());
        assert_eq!(service.assigned(Some(&org.admin)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_assignment_conflicts() {
        let org = testing::org().await;
        let service = ProjectService::new(org.store.clone());
        let project = service.create(Some(&org.admin), input("Website")).await.unwrap();
        let member = MemberInput {
            user_id: org.freelancer.id,
            hourly_rate: Some(40.0),
        };

        service
            .add_member(Some(&org.admin), project.id, member.clone())
            .await
            .unwrap();
        let err = service
            .add_member(Some(&org.admin), project.id, member)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let members = service.members(Some(&org.admin), project.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member.hourly_rate, Some(40.0));
        assert_eq!(members[0].user.id, org.freelancer.id);

        service
            .remove_member(Some(&org.admin), project.id, org.freelancer.id)
            .await
            .unwrap();
        assert!(service.members(Some(&org.admin), project.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_member_must_belong_to_org() {
        let org = testing::org().await;
        let service = ProjectService::new(org.store.clone());
        let project = service.create(Some(&org.admin), input("Website")).await.unwrap();

        let err = service
            .add_member(
                Some(&org.admin),
                project.id,
                MemberInput {
                    user_id: Uuid::new_v4(),
                    hourly_rate: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
