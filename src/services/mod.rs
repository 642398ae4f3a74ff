//! Business operations. Every operation takes the acting profile
//! explicitly and runs it through the authorization gate before touching
//! storage.

mod dashboard;
mod entries;
mod export;
mod projects;
mod timesheets;
mod users;

pub use dashboard::{DashboardService, DashboardStats, TeamMemberHours};
pub use entries::{EntryFilter, EntryInput, EntryService};
pub use export::ExportService;
pub use projects::{MemberInput, ProjectInput, ProjectService};
pub use timesheets::{TimesheetDetails, TimesheetService, WeekView};
pub use users::{SettingsInput, UserService};

use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{Profile, Project, Timesheet};
use crate::store::Store;

/// Trimmed text, or `None` when nothing is left
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn required_text(value: &str, message: &str) -> AppResult<String> {
    match value.trim() {
        "" => Err(AppError::validation(message)),
        text => Ok(text.to_string()),
    }
}

pub(crate) fn index_projects(projects: Vec<Project>) -> HashMap<Uuid, Project> {
    projects.into_iter().map(|p| (p.id, p)).collect()
}

pub(crate) fn index_profiles(profiles: Vec<Profile>) -> HashMap<Uuid, Profile> {
    profiles.into_iter().map(|p| (p.id, p)).collect()
}

pub(crate) async fn load_timesheet(
    store: &dyn Store,
    org_id: Uuid,
    id: Uuid,
) -> AppResult<Timesheet> {
    store
        .get_timesheet(org_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Timesheet"))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the service tests

    use std::sync::Arc;
    use uuid::Uuid;

    use crate::model::{ActingProfile, Project, Role};
    use crate::store::{MemoryStore, NewProfile, NewProject, NewProjectMember, Store};

    pub struct Org {
        pub store: Arc<dyn Store>,
        pub org_id: Uuid,
        pub admin: ActingProfile,
        pub freelancer: ActingProfile,
    }

    pub async fn member(store: &Arc<dyn Store>, org_id: Uuid, role: Role, name: &str) -> ActingProfile {
        let id = Uuid::new_v4();
        store
            .create_profile(NewProfile {
                id,
                org_id: Some(org_id),
                role,
                full_name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
            })
            .await
            .unwrap()
            .acting()
    }

    pub async fn org() -> Org {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let org_id = store.create_organization("Acme").await.unwrap().id;
        let admin = member(&store, org_id, Role::Admin, "Alice").await;
        let freelancer = member(&store, org_id, Role::Freelancer, "Bob").await;
        Org {
            store,
            org_id,
            admin,
            freelancer,
        }
    }

    impl Org {
        /// Active project with the freelancer assigned
        pub async fn project(&self, name: &str) -> Project {
            let project = self
                .store
                .create_project(NewProject {
                    org_id: self.org_id,
                    name: name.to_string(),
                    description: None,
                })
                .await
                .unwrap();
            self.store
                .add_project_member(
                    self.org_id,
                    NewProjectMember {
                        project_id: project.id,
                        user_id: self.freelancer.id,
                        hourly_rate: None,
                    },
                )
                .await
                .unwrap();
            project
        }
    }
}
