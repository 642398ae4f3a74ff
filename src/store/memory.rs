use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AccountStore, AppliedTransition, CommentStore, EntryQuery, EntryStore, NewComment,
    NewProfile, NewProject, NewProjectMember, NewTimeEntry, ProfileSettings, ProfileStore,
    ProjectStore, ProjectUpdate, TimeEntryPatch, TimesheetOrder, TimesheetQuery, TimesheetStore,
    TransitionRecord,
};
use crate::dates::DateRange;
use crate::error::{AppError, AppResult};
use crate::model::{
    Account, Organization, Profile, Project, ProjectMember, ProjectMemberDetail, ProjectStatus,
    Role, Session, TimeEntry, Timesheet, TimesheetComment, TimesheetStatus,
};

#[derive(Default)]
struct Tables {
    organizations: HashMap<Uuid, Organization>,
    accounts: HashMap<Uuid, Account>,
    sessions: HashMap<Uuid, Session>,
    profiles: HashMap<Uuid, Profile>,
    projects: HashMap<Uuid, Project>,
    project_members: HashMap<Uuid, ProjectMember>,
    entries: HashMap<Uuid, TimeEntry>,
    timesheets: HashMap<Uuid, Timesheet>,
    comments: HashMap<Uuid, TimesheetComment>,
}

impl Tables {
    fn project_in_org(&self, org_id: Uuid, id: Uuid) -> Option<&Project> {
        self.projects.get(&id).filter(|p| p.org_id == org_id)
    }

    fn insert_comment(&mut self, comment: NewComment, now: OffsetDateTime) -> TimesheetComment {
        let comment = TimesheetComment {
            id: Uuid::new_v4(),
            org_id: comment.org_id,
            timesheet_id: comment.timesheet_id,
            author_id: comment.author_id,
            body: comment.body,
            created_at: now,
            updated_at: now,
        };
        self.comments.insert(comment.id, comment.clone());
        comment
    }

    fn link_entries(
        &mut self,
        org_id: Uuid,
        user_id: Uuid,
        range: DateRange,
        timesheet_id: Uuid,
        now: OffsetDateTime,
    ) -> u64 {
        let mut linked = 0;
        for entry in self.entries.values_mut().filter(|e| {
            e.org_id == org_id
                && e.user_id == user_id
                && range.contains(e.date)
                && e.timesheet_id.is_none()
        }) {
            entry.timesheet_id = Some(timesheet_id);
            entry.updated_at = now;
            linked += 1;
        }
        linked
    }
}

/// In-process store. A single lock guards every table, so multi-row
/// operations are atomic with respect to each other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> AppResult<Account> {
        let mut tables = self.tables.lock().await;
        if tables.accounts.values().any(|a| a.email == email) {
            return Err(AppError::conflict("Email is already registered"));
        }
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let tables = self.tables.lock().await;
        Ok(tables.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>> {
        let tables = self.tables.lock().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn create_session(
        &self,
        id: Uuid,
        account_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> AppResult<Session> {
        let mut tables = self.tables.lock().await;
        let session = Session {
            id,
            account_id,
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> AppResult<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.get(&id).cloned())
    }

    async fn delete_session(&self, id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.sessions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn create_organization(&self, name: &str) -> AppResult<Organization> {
        let mut tables = self.tables.lock().await;
        let now = OffsetDateTime::now_utc();
        let org = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.organizations.insert(org.id, org.clone());
        Ok(org)
    }

    async fn organization_exists(&self) -> AppResult<bool> {
        let tables = self.tables.lock().await;
        Ok(!tables.organizations.is_empty())
    }

    async fn create_profile(&self, profile: NewProfile) -> AppResult<Profile> {
        let mut tables = self.tables.lock().await;
        if tables.profiles.contains_key(&profile.id) {
            return Err(AppError::conflict("Profile already exists"));
        }
        let now = OffsetDateTime::now_utc();
        let profile = Profile {
            id: profile.id,
            org_id: profile.org_id,
            role: profile.role,
            full_name: profile.full_name,
            email: profile.email,
            is_active: true,
            default_hourly_rate: None,
            preferred_currency: None,
            created_at: now,
            updated_at: now,
        };
        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>> {
        let tables = self.tables.lock().await;
        Ok(tables.profiles.get(&id).cloned())
    }

    async fn get_profile_by_email(&self, email: &str) -> AppResult<Option<Profile>> {
        let tables = self.tables.lock().await;
        Ok(tables.profiles.values().find(|p| p.email == email).cloned())
    }

    async fn get_org_profile(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Profile>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .profiles
            .get(&id)
            .filter(|p| p.org_id == Some(org_id))
            .cloned())
    }

    async fn list_profiles(&self, org_id: Uuid, active_only: bool) -> AppResult<Vec<Profile>> {
        let tables = self.tables.lock().await;
        let mut profiles: Vec<Profile> = tables
            .profiles
            .values()
            .filter(|p| p.org_id == Some(org_id) && (!active_only || p.is_active))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(profiles)
    }

    async fn update_profile_role(&self, org_id: Uuid, id: Uuid, role: Role) -> AppResult<Profile> {
        let mut tables = self.tables.lock().await;
        let profile = tables
            .profiles
            .get_mut(&id)
            .filter(|p| p.org_id == Some(org_id))
            .ok_or_else(|| AppError::not_found("User"))?;
        profile.role = role;
        profile.updated_at = OffsetDateTime::now_utc();
        Ok(profile.clone())
    }

    async fn update_profile_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        is_active: bool,
    ) -> AppResult<Profile> {
        let mut tables = self.tables.lock().await;
        let profile = tables
            .profiles
            .get_mut(&id)
            .filter(|p| p.org_id == Some(org_id))
            .ok_or_else(|| AppError::not_found("User"))?;
        profile.is_active = is_active;
        profile.updated_at = OffsetDateTime::now_utc();
        Ok(profile.clone())
    }

    async fn update_profile_settings(
        &self,
        id: Uuid,
        settings: ProfileSettings,
    ) -> AppResult<Profile> {
        let mut tables = self.tables.lock().await;
        let profile = tables
            .profiles
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Profile"))?;
        profile.full_name = settings.full_name;
        profile.default_hourly_rate = settings.default_hourly_rate;
        profile.preferred_currency = settings.preferred_currency;
        profile.updated_at = OffsetDateTime::now_utc();
        Ok(profile.clone())
    }

    async fn assign_profile_org(&self, id: Uuid, org_id: Uuid) -> AppResult<Profile> {
        let mut tables = self.tables.lock().await;
        let profile = tables
            .profiles
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("User"))?;
        if profile.org_id.is_some() {
            return Err(AppError::conflict("User already belongs to an organization"));
        }
        profile.org_id = Some(org_id);
        profile.role = Role::Freelancer;
        profile.updated_at = OffsetDateTime::now_utc();
        Ok(profile.clone())
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create_project(&self, project: NewProject) -> AppResult<Project> {
        let mut tables = self.tables.lock().await;
        let now = OffsetDateTime::now_utc();
        let project = Project {
            id: Uuid::new_v4(),
            org_id: project.org_id,
            name: project.name,
            description: project.description,
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Project>> {
        let tables = self.tables.lock().await;
        Ok(tables.project_in_org(org_id, id).cloned())
    }

    async fn update_project(
        &self,
        org_id: Uuid,
        id: Uuid,
        update: ProjectUpdate,
    ) -> AppResult<Project> {
        let mut tables = self.tables.lock().await;
        let project = tables
            .projects
            .get_mut(&id)
            .filter(|p| p.org_id == org_id)
            .ok_or_else(|| AppError::not_found("Project"))?;
        project.name = update.name;
        project.description = update.description;
        project.updated_at = OffsetDateTime::now_utc();
        Ok(project.clone())
    }

    async fn set_project_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: ProjectStatus,
    ) -> AppResult<Project> {
        let mut tables = self.tables.lock().await;
        let project = tables
            .projects
            .get_mut(&id)
            .filter(|p| p.org_id == org_id)
            .ok_or_else(|| AppError::not_found("Project"))?;
        project.status = status;
        project.updated_at = OffsetDateTime::now_utc();
        Ok(project.clone())
    }

    async fn list_projects(&self, org_id: Uuid, include_archived: bool) -> AppResult<Vec<Project>> {
        let tables = self.tables.lock().await;
        let mut projects: Vec<Project> = tables
            .projects
            .values()
            .filter(|p| p.org_id == org_id && (include_archived || p.is_active()))
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn count_projects(&self, org_id: Uuid, status: ProjectStatus) -> AppResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .projects
            .values()
            .filter(|p| p.org_id == org_id && p.status == status)
            .count() as i64)
    }

    async fn add_project_member(
        &self,
        org_id: Uuid,
        member: NewProjectMember,
    ) -> AppResult<ProjectMember> {
        let mut tables = self.tables.lock().await;
        if tables.project_in_org(org_id, member.project_id).is_none() {
            return Err(AppError::not_found("Project"));
        }
        if tables
            .project_members
            .values()
            .any(|m| m.project_id == member.project_id && m.user_id == member.user_id)
        {
            return Err(AppError::conflict("User is already assigned to this project"));
        }
        let now = OffsetDateTime::now_utc();
        let member = ProjectMember {
            id: Uuid::new_v4(),
            project_id: member.project_id,
            user_id: member.user_id,
            hourly_rate: member.hourly_rate,
            created_at: now,
            updated_at: now,
        };
        tables.project_members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn remove_project_member(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.project_in_org(org_id, project_id).is_none() {
            return Err(AppError::not_found("Project"));
        }
        tables
            .project_members
            .retain(|_, m| !(m.project_id == project_id && m.user_id == user_id));
        Ok(())
    }

    async fn list_project_members(
        &self,
        org_id: Uuid,
        project_id: Uuid,
    ) -> AppResult<Vec<ProjectMemberDetail>> {
        let tables = self.tables.lock().await;
        if tables.project_in_org(org_id, project_id).is_none() {
            return Ok(Vec::new());
        }
        let mut members: Vec<ProjectMemberDetail> = tables
            .project_members
            .values()
            .filter(|m| m.project_id == project_id)
            .filter_map(|m| {
                tables.profiles.get(&m.user_id).map(|user| ProjectMemberDetail {
                    member: m.clone(),
                    user: user.clone(),
                })
            })
            .collect();
        members.sort_by(|a, b| a.member.created_at.cmp(&b.member.created_at));
        Ok(members)
    }

    async fn list_member_projects(&self, org_id: Uuid, user_id: Uuid) -> AppResult<Vec<Project>> {
        let tables = self.tables.lock().await;
        let mut projects: Vec<Project> = tables
            .project_members
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| tables.project_in_org(org_id, m.project_id).cloned())
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn is_project_member(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.project_in_org(org_id, project_id).is_some()
            && tables
                .project_members
                .values()
                .any(|m| m.project_id == project_id && m.user_id == user_id))
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn list_entries(&self, org_id: Uuid, query: EntryQuery) -> AppResult<Vec<TimeEntry>> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<TimeEntry> = tables
            .entries
            .values()
            .filter(|e| e.org_id == org_id)
            .filter(|e| query.user_id.is_none_or(|u| e.user_id == u))
            .filter(|e| query.project_id.is_none_or(|p| e.project_id == p))
            .filter(|e| query.range.is_none_or(|r| r.contains(e.date)))
            .cloned()
            .collect();
        entries.sort_by(|a, b| (a.date, a.created_at).cmp(&(b.date, b.created_at)));
        if query.newest_first {
            entries.reverse();
        }
        Ok(entries)
    }

    async fn get_entry(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<TimeEntry>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .entries
            .get(&id)
            .filter(|e| e.org_id == org_id)
            .cloned())
    }

    async fn create_entry(&self, entry: NewTimeEntry) -> AppResult<TimeEntry> {
        let mut tables = self.tables.lock().await;
        let now = OffsetDateTime::now_utc();
        let entry = TimeEntry {
            id: Uuid::new_v4(),
            org_id: entry.org_id,
            user_id: entry.user_id,
            project_id: entry.project_id,
            date: entry.date,
            minutes: entry.minutes,
            description: entry.description,
            deliverable_url: entry.deliverable_url,
            timesheet_id: None,
            source: entry.source,
            created_at: now,
            updated_at: now,
        };
        tables.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn update_entry(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: TimeEntryPatch,
    ) -> AppResult<TimeEntry> {
        let mut tables = self.tables.lock().await;
        let entry = tables
            .entries
            .get_mut(&id)
            .filter(|e| e.org_id == org_id)
            .ok_or_else(|| AppError::not_found("Time entry"))?;
        entry.project_id = patch.project_id;
        entry.date = patch.date;
        entry.minutes = patch.minutes;
        entry.description = patch.description;
        entry.deliverable_url = patch.deliverable_url;
        if patch.unlink {
            entry.timesheet_id = None;
        }
        entry.updated_at = OffsetDateTime::now_utc();
        Ok(entry.clone())
    }

    async fn delete_entry(&self, org_id: Uuid, id: Uuid) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.entries.get(&id) {
            Some(entry) if entry.org_id == org_id => {
                tables.entries.remove(&id);
                Ok(())
            }
            _ => Err(AppError::not_found("Time entry")),
        }
    }

    async fn link_entries_to_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        range: DateRange,
        timesheet_id: Uuid,
    ) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        Ok(tables.link_entries(org_id, user_id, range, timesheet_id, OffsetDateTime::now_utc()))
    }
}

#[async_trait]
impl TimesheetStore for MemoryStore {
    async fn get_or_create_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        week_start: Date,
    ) -> AppResult<Timesheet> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .timesheets
            .values()
            .find(|t| t.user_id == user_id && t.week_start == week_start)
        {
            if existing.org_id != org_id {
                return Err(AppError::not_found("Timesheet"));
            }
            return Ok(existing.clone());
        }
        let now = OffsetDateTime::now_utc();
        let timesheet = Timesheet {
            id: Uuid::new_v4(),
            org_id,
            user_id,
            week_start,
            status: TimesheetStatus::Draft,
            summary: None,
            submitted_at: None,
            approved_at: None,
            approved_by: None,
            payment_mode: None,
            payment_status: None,
            external_payment_id: None,
            created_at: now,
            updated_at: now,
        };
        tables.timesheets.insert(timesheet.id, timesheet.clone());
        Ok(timesheet)
    }

    async fn find_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        week_start: Date,
    ) -> AppResult<Option<Timesheet>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .timesheets
            .values()
            .find(|t| t.org_id == org_id && t.user_id == user_id && t.week_start == week_start)
            .cloned())
    }

    async fn get_timesheet(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Timesheet>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .timesheets
            .get(&id)
            .filter(|t| t.org_id == org_id)
            .cloned())
    }

    async fn list_timesheets(
        &self,
        org_id: Uuid,
        query: TimesheetQuery,
    ) -> AppResult<Vec<Timesheet>> {
        let tables = self.tables.lock().await;
        let mut timesheets: Vec<Timesheet> = tables
            .timesheets
            .values()
            .filter(|t| t.org_id == org_id)
            .filter(|t| query.user_id.is_none_or(|u| t.user_id == u))
            .filter(|t| query.status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        match query.order {
            TimesheetOrder::WeekDesc => timesheets.sort_by(|a, b| b.week_start.cmp(&a.week_start)),
            TimesheetOrder::UpdatedDesc => {
                timesheets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at))
            }
            // Rows without a submission time sort last
            TimesheetOrder::SubmittedAsc => timesheets.sort_by(|a, b| {
                match (a.submitted_at, b.submitted_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            }),
        }
        if let Some(limit) = query.limit {
            timesheets.truncate(limit.max(0) as usize);
        }
        Ok(timesheets)
    }

    async fn count_timesheets(
        &self,
        org_id: Uuid,
        status: TimesheetStatus,
        approved_since: Option<OffsetDateTime>,
    ) -> AppResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .timesheets
            .values()
            .filter(|t| t.org_id == org_id && t.status == status)
            .filter(|t| match approved_since {
                Some(since) => t.approved_at.is_some_and(|at| at >= since),
                None => true,
            })
            .count() as i64)
    }

    async fn update_summary(
        &self,
        org_id: Uuid,
        id: Uuid,
        editable: &'static [TimesheetStatus],
        summary: Option<String>,
    ) -> AppResult<Option<Timesheet>> {
        let mut tables = self.tables.lock().await;
        let Some(timesheet) = tables
            .timesheets
            .get_mut(&id)
            .filter(|t| t.org_id == org_id && editable.contains(&t.status))
        else {
            return Ok(None);
        };
        timesheet.summary = summary;
        timesheet.updated_at = OffsetDateTime::now_utc();
        Ok(Some(timesheet.clone()))
    }

    async fn apply_transition(
        &self,
        org_id: Uuid,
        record: TransitionRecord,
    ) -> AppResult<Option<AppliedTransition>> {
        let mut tables = self.tables.lock().await;
        let now = OffsetDateTime::now_utc();

        let Some(timesheet) = tables
            .timesheets
            .get_mut(&record.timesheet_id)
            .filter(|t| t.org_id == org_id && record.from.contains(&t.status))
        else {
            return Ok(None);
        };
        timesheet.status = record.to;
        if record.submitted_at.is_some() {
            timesheet.submitted_at = record.submitted_at;
        }
        if record.approved_at.is_some() {
            timesheet.approved_at = record.approved_at;
        }
        if record.approved_by.is_some() {
            timesheet.approved_by = record.approved_by;
        }
        timesheet.updated_at = now;
        let timesheet = timesheet.clone();

        let linked_entries = match record.link {
            Some(link) => tables.link_entries(org_id, link.user_id, link.range, timesheet.id, now),
            None => 0,
        };
        let comment = record
            .comment
            .map(|comment| tables.insert_comment(comment, now));

        Ok(Some(AppliedTransition {
            timesheet,
            linked_entries,
            comment,
        }))
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn add_comment(&self, comment: NewComment) -> AppResult<TimesheetComment> {
        let mut tables = self.tables.lock().await;
        if !tables
            .timesheets
            .get(&comment.timesheet_id)
            .is_some_and(|t| t.org_id == comment.org_id)
        {
            return Err(AppError::not_found("Timesheet"));
        }
        Ok(tables.insert_comment(comment, OffsetDateTime::now_utc()))
    }

    async fn list_comments(
        &self,
        org_id: Uuid,
        timesheet_id: Uuid,
    ) -> AppResult<Vec<TimesheetComment>> {
        let tables = self.tables.lock().await;
        let mut comments: Vec<TimesheetComment> = tables
            .comments
            .values()
            .filter(|c| c.org_id == org_id && c.timesheet_id == timesheet_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }
}
