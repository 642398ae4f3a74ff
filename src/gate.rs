//! Authorization gate.
//!
//! Each service operation is described by a [`Command`] whose
//! [`Requirement`] says who may run it. Rules are checked in a fixed order:
//! session, organization, role or ownership, then self-protection.

use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult, Denial};
use crate::model::{ActingProfile, Role};

/// Who may run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Any active profile in the organization
    Member,
    Admin,
    /// The profile owning the resource, and nobody else
    Owner(Uuid),
    /// The owner, or an admin reading on their behalf
    OwnerOrAdmin(Uuid),
    /// An admin acting on a profile other than their own
    AdminOnOther(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CreateProject,
    UpdateProject,
    ArchiveProject,
    RestoreProject,
    ListProjects,
    ListAssignedProjects,
    ListProjectMembers,
    AddProjectMember,
    RemoveProjectMember,

    ListUsers,
    ChangeRole { target: Uuid },
    ChangeStatus { target: Uuid },
    AssignUserToOrg,

    CreateEntry,
    UpdateEntry { owner: Uuid },
    DeleteEntry { owner: Uuid },
    ListOwnEntries,
    ListAllEntries,

    OpenTimesheet,
    ListTimesheets,
    ViewTimesheet { owner: Uuid },
    UpdateSummary { owner: Uuid },
    SubmitTimesheet { owner: Uuid },
    ApproveTimesheet,
    RequestChanges,
    CommentOnTimesheet { owner: Uuid },

    ExportTimesheet { owner: Uuid },
    ExportRange,

    ViewDashboard,
}

impl Command {
    pub fn requirement(&self) -> Requirement {
        use Command::*;
        match *self {
            CreateProject | UpdateProject | ArchiveProject | RestoreProject
            | ListProjectMembers | AddProjectMember | RemoveProjectMember => Requirement::Admin,
            ListUsers | AssignUserToOrg => Requirement::Admin,
            ChangeRole { target } | ChangeStatus { target } => Requirement::AdminOnOther(target),
            ListAllEntries | ApproveTimesheet | RequestChanges | ExportRange => Requirement::Admin,
            UpdateEntry { owner }
            | DeleteEntry { owner }
            | UpdateSummary { owner }
            | SubmitTimesheet { owner } => Requirement::Owner(owner),
            ViewTimesheet { owner }
            | CommentOnTimesheet { owner }
            | ExportTimesheet { owner } => Requirement::OwnerOrAdmin(owner),
            ListProjects | ListAssignedProjects | CreateEntry | ListOwnEntries | OpenTimesheet
            | ListTimesheets | ViewDashboard => Requirement::Member,
        }
    }

    pub fn name(&self) -> &'static str {
        use Command::*;
        match self {
            CreateProject => "create_project",
            UpdateProject => "update_project",
            ArchiveProject => "archive_project",
            RestoreProject => "restore_project",
            ListProjects => "list_projects",
            ListAssignedProjects => "list_assigned_projects",
            ListProjectMembers => "list_project_members",
            AddProjectMember => "add_project_member",
            RemoveProjectMember => "remove_project_member",
            ListUsers => "list_users",
            ChangeRole { .. } => "change_role",
            ChangeStatus { .. } => "change_status",
            AssignUserToOrg => "assign_user_to_org",
            CreateEntry => "create_entry",
            UpdateEntry { .. } => "update_entry",
            DeleteEntry { .. } => "delete_entry",
            ListOwnEntries => "list_own_entries",
            ListAllEntries => "list_all_entries",
            OpenTimesheet => "open_timesheet",
            ListTimesheets => "list_timesheets",
            ViewTimesheet { .. } => "view_timesheet",
            UpdateSummary { .. } => "update_summary",
            SubmitTimesheet { .. } => "submit_timesheet",
            ApproveTimesheet => "approve_timesheet",
            RequestChanges => "request_changes",
            CommentOnTimesheet { .. } => "comment_on_timesheet",
            ExportTimesheet { .. } => "export_timesheet",
            ExportRange => "export_range",
            ViewDashboard => "view_dashboard",
        }
    }
}

/// An authenticated, organization-scoped caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: Role,
}

impl Scope {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Role, ownership and self-protection checks for `command`
    pub fn authorize(&self, command: &Command) -> AppResult<()> {
        let outcome = match command.requirement() {
            Requirement::Member => Ok(()),
            Requirement::Admin => self.require_admin(),
            Requirement::Owner(owner) => {
                if owner == self.user_id {
                    Ok(())
                } else {
                    Err(Denial::NotOwner)
                }
            }
            Requirement::OwnerOrAdmin(owner) => {
                if owner == self.user_id || self.is_admin() {
                    Ok(())
                } else {
                    Err(Denial::NotOwner)
                }
            }
            Requirement::AdminOnOther(target) => self.require_admin().and_then(|_| {
                if target == self.user_id {
                    Err(Denial::SelfModification)
                } else {
                    Ok(())
                }
            }),
        };

        outcome.map_err(|denial| {
            debug!(
                "Denied {} for user_id: {} ({:?})",
                command.name(),
                self.user_id,
                denial
            );
            AppError::Unauthorized(denial)
        })
    }

    fn require_admin(&self) -> Result<(), Denial> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Denial::AdminRequired)
        }
    }
}

/// Rule 1 only: there is a caller
pub fn authenticated(actor: Option<&ActingProfile>) -> AppResult<&ActingProfile> {
    actor.ok_or(AppError::Unauthorized(Denial::NoSession))
}

/// Rules 1 and 2: there is an active caller with an organization
pub fn session(actor: Option<&ActingProfile>) -> AppResult<Scope> {
    let actor = authenticated(actor)?;
    let org_id = actor
        .org_id
        .ok_or(AppError::Unauthorized(Denial::NoOrganization))?;
    if !actor.is_active {
        return Err(AppError::Unauthorized(Denial::Deactivated));
    }
    Ok(Scope {
        user_id: actor.id,
        org_id,
        role: actor.role,
    })
}

/// All rules for a command whose requirement is known up front
pub fn authorize(actor: Option<&ActingProfile>, command: &Command) -> AppResult<Scope> {
    let scope = session(actor)?;
    scope.authorize(command)?;
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: Role) -> ActingProfile {
        ActingProfile {
            id: Uuid::new_v4(),
            org_id: Some(Uuid::new_v4()),
            role,
            is_active: true,
        }
    }

    fn denial(result: AppResult<Scope>) -> Denial {
        match result {
            Err(AppError::Unauthorized(denial)) => denial,
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_session_is_rejected_first() {
        assert_eq!(
            denial(authorize(None, &Command::ApproveTimesheet)),
            Denial::NoSession
        );
    }

    #[test]
    fn test_profile_without_org_is_rejected() {
        let mut actor = profile(Role::Admin);
        actor.org_id = None;
        assert_eq!(
            denial(authorize(Some(&actor), &Command::ListProjects)),
            Denial::NoOrganization
        );
    }

    #[test]
    fn test_deactivated_profile_is_rejected() {
        let mut actor = profile(Role::Freelancer);
        actor.is_active = false;
        assert_eq!(
            denial(authorize(Some(&actor), &Command::CreateEntry)),
            Denial::Deactivated
        );
    }

    #[test]
    fn test_admin_only_commands() {
        let freelancer = profile(Role::Freelancer);
        let admin = profile(Role::Admin);
        for command in [
            Command::CreateProject,
            Command::AddProjectMember,
            Command::ApproveTimesheet,
            Command::RequestChanges,
            Command::ListAllEntries,
        ] {
            assert_eq!(
                denial(authorize(Some(&freelancer), &command)),
                Denial::AdminRequired
            );
            assert!(authorize(Some(&admin), &command).is_ok());
        }
    }

    #[test]
    fn test_owner_commands_exclude_admins() {
        let owner = profile(Role::Freelancer);
        let admin = profile(Role::Admin);
        let command = Command::SubmitTimesheet { owner: owner.id };
        assert!(authorize(Some(&owner), &command).is_ok());
        assert_eq!(denial(authorize(Some(&admin), &command)), Denial::NotOwner);
    }

    #[test]
    fn test_admin_may_read_but_not_write_entries_of_others() {
        let owner = profile(Role::Freelancer);
        let admin = profile(Role::Admin);
        assert!(authorize(Some(&admin), &Command::ViewTimesheet { owner: owner.id }).is_ok());
        assert_eq!(
            denial(authorize(Some(&admin), &Command::UpdateEntry { owner: owner.id })),
            Denial::NotOwner
        );
    }

    #[test]
    fn test_admin_cannot_modify_self() {
        let admin = profile(Role::Admin);
        assert_eq!(
            denial(authorize(Some(&admin), &Command::ChangeRole { target: admin.id })),
            Denial::SelfModification
        );
        assert_eq!(
            denial(authorize(Some(&admin), &Command::ChangeStatus { target: admin.id })),
            Denial::SelfModification
        );
        assert!(authorize(Some(&admin), &Command::ChangeRole { target: Uuid::new_v4() }).is_ok());
    }
}
