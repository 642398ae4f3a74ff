//! Storage collaborator.
//!
//! Every tenant-owned read or write takes the caller's `org_id`; rows from
//! another organization behave as if they did not exist. Two backends
//! implement the traits: [`PgStore`] over PostgreSQL and [`MemoryStore`]
//! for tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::dates::DateRange;
use crate::error::AppResult;
use crate::model::{
    Account, Currency, EntrySource, Organization, Profile, Project, ProjectMember,
    ProjectMemberDetail, ProjectStatus, Role, Session, TimeEntry, Timesheet, TimesheetComment,
    TimesheetStatus,
};

// ── Records ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub role: Role,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileSettings {
    pub full_name: String,
    pub default_hourly_rate: Option<f64>,
    pub preferred_currency: Option<Currency>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProjectUpdate {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewTimeEntry {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub date: Date,
    pub minutes: i32,
    pub description: Option<String>,
    pub deliverable_url: Option<String>,
    pub source: EntrySource,
}

/// Full replacement of the user-editable entry fields
#[derive(Debug, Clone)]
pub struct TimeEntryPatch {
    pub project_id: Uuid,
    pub date: Date,
    pub minutes: i32,
    pub description: Option<String>,
    pub deliverable_url: Option<String>,
    /// Clear the timesheet link, used when an entry leaves its linked week
    pub unlink: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    pub user_id: Option<Uuid>,
    pub range: Option<DateRange>,
    pub project_id: Option<Uuid>,
    pub newest_first: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimesheetOrder {
    /// Most recent week first
    #[default]
    WeekDesc,
    /// Most recently touched first
    UpdatedDesc,
    /// Longest waiting submission first
    SubmittedAsc,
}

#[derive(Debug, Clone, Default)]
pub struct TimesheetQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<TimesheetStatus>,
    pub order: TimesheetOrder,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub org_id: Uuid,
    pub timesheet_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}

/// Link the owner's unlinked entries within `range` to the timesheet
#[derive(Debug, Clone, Copy)]
pub struct EntryLink {
    pub user_id: Uuid,
    pub range: DateRange,
}

/// One status change and its side effects, applied in a single transaction.
///
/// The status only changes while it is still one of `from`; stamps that are
/// `Some` are written, the rest are left untouched.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub timesheet_id: Uuid,
    pub from: &'static [TimesheetStatus],
    pub to: TimesheetStatus,
    pub submitted_at: Option<OffsetDateTime>,
    pub approved_at: Option<OffsetDateTime>,
    pub approved_by: Option<Uuid>,
    pub link: Option<EntryLink>,
    pub comment: Option<NewComment>,
}

#[derive(Debug, Clone)]
pub struct AppliedTransition {
    pub timesheet: Timesheet,
    pub linked_entries: u64,
    pub comment: Option<TimesheetComment>,
}

// ── Traits ───────────────────────────────────────────────────────────────

/// Accounts and sessions owned by the auth collaborator
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, email: &str, password_hash: &str) -> AppResult<Account>;
    async fn get_account_by_email(&self, email: &str) -> AppResult<Option<Account>>;
    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>>;
    async fn create_session(
        &self,
        id: Uuid,
        account_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> AppResult<Session>;
    async fn get_session(&self, id: Uuid) -> AppResult<Option<Session>>;
    async fn delete_session(&self, id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn create_organization(&self, name: &str) -> AppResult<Organization>;
    async fn organization_exists(&self) -> AppResult<bool>;
    async fn create_profile(&self, profile: NewProfile) -> AppResult<Profile>;
    /// Unscoped lookup used to resolve the acting profile
    async fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>>;
    async fn get_profile_by_email(&self, email: &str) -> AppResult<Option<Profile>>;
    async fn get_org_profile(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Profile>>;
    /// Profiles of the organization ordered by full name
    async fn list_profiles(&self, org_id: Uuid, active_only: bool) -> AppResult<Vec<Profile>>;
    async fn update_profile_role(&self, org_id: Uuid, id: Uuid, role: Role) -> AppResult<Profile>;
    async fn update_profile_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        is_active: bool,
    ) -> AppResult<Profile>;
    async fn update_profile_settings(
        &self,
        id: Uuid,
        settings: ProfileSettings,
    ) -> AppResult<Profile>;
    /// Place an unassigned profile into an organization as a freelancer
    async fn assign_profile_org(&self, id: Uuid, org_id: Uuid) -> AppResult<Profile>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, project: NewProject) -> AppResult<Project>;
    async fn get_project(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Project>>;
    async fn update_project(
        &self,
        org_id: Uuid,
        id: Uuid,
        update: ProjectUpdate,
    ) -> AppResult<Project>;
    async fn set_project_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: ProjectStatus,
    ) -> AppResult<Project>;
    /// Projects ordered by name
    async fn list_projects(&self, org_id: Uuid, include_archived: bool) -> AppResult<Vec<Project>>;
    async fn count_projects(&self, org_id: Uuid, status: ProjectStatus) -> AppResult<i64>;
    /// Fails with `Conflict` when the user is already on the project
    async fn add_project_member(
        &self,
        org_id: Uuid,
        member: NewProjectMember,
    ) -> AppResult<ProjectMember>;
    async fn remove_project_member(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()>;
    async fn list_project_members(
        &self,
        org_id: Uuid,
        project_id: Uuid,
    ) -> AppResult<Vec<ProjectMemberDetail>>;
    /// Projects the user is assigned to, any status, ordered by name
    async fn list_member_projects(&self, org_id: Uuid, user_id: Uuid) -> AppResult<Vec<Project>>;
    async fn is_project_member(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool>;
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn list_entries(&self, org_id: Uuid, query: EntryQuery) -> AppResult<Vec<TimeEntry>>;
    async fn get_entry(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<TimeEntry>>;
    async fn create_entry(&self, entry: NewTimeEntry) -> AppResult<TimeEntry>;
    async fn update_entry(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: TimeEntryPatch,
    ) -> AppResult<TimeEntry>;
    async fn delete_entry(&self, org_id: Uuid, id: Uuid) -> AppResult<()>;
    /// Stamp unlinked entries only; already linked entries keep their link
    async fn link_entries_to_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        range: DateRange,
        timesheet_id: Uuid,
    ) -> AppResult<u64>;
}

#[async_trait]
pub trait TimesheetStore: Send + Sync {
    /// Returns the existing row for (user, week) or inserts a draft
    async fn get_or_create_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        week_start: Date,
    ) -> AppResult<Timesheet>;
    async fn find_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        week_start: Date,
    ) -> AppResult<Option<Timesheet>>;
    async fn get_timesheet(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Timesheet>>;
    async fn list_timesheets(
        &self,
        org_id: Uuid,
        query: TimesheetQuery,
    ) -> AppResult<Vec<Timesheet>>;
    async fn count_timesheets(
        &self,
        org_id: Uuid,
        status: TimesheetStatus,
        approved_since: Option<OffsetDateTime>,
    ) -> AppResult<i64>;
    /// Overwrite the summary while the status is one of `editable`.
    /// `None` when the row is gone or its status moved on.
    async fn update_summary(
        &self,
        org_id: Uuid,
        id: Uuid,
        editable: &'static [TimesheetStatus],
        summary: Option<String>,
    ) -> AppResult<Option<Timesheet>>;
    /// Compare-and-swap the status and apply the record's side effects.
    /// `None` when the row is gone or its status is not in `record.from`.
    async fn apply_transition(
        &self,
        org_id: Uuid,
        record: TransitionRecord,
    ) -> AppResult<Option<AppliedTransition>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn add_comment(&self, comment: NewComment) -> AppResult<TimesheetComment>;
    /// Comments oldest first
    async fn list_comments(
        &self,
        org_id: Uuid,
        timesheet_id: Uuid,
    ) -> AppResult<Vec<TimesheetComment>>;
}

/// Everything the services need from persistence
pub trait Store:
    AccountStore + ProfileStore + ProjectStore + EntryStore + TimesheetStore + CommentStore
{
}

impl<T> Store for T where
    T: AccountStore + ProfileStore + ProjectStore + EntryStore + TimesheetStore + CommentStore
{
}
