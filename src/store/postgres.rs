use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::{Date, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::{
    AccountStore, AppliedTransition, CommentStore, EntryQuery, EntryStore, NewComment,
    NewProfile, NewProject, NewProjectMember, NewTimeEntry, ProfileSettings, ProfileStore,
    ProjectStore, ProjectUpdate, TimeEntryPatch, TimesheetOrder, TimesheetQuery, TimesheetStore,
    TransitionRecord,
};
use crate::dates::DateRange;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::model::{
    Account, Organization, Profile, Project, ProjectMember, ProjectMemberDetail, ProjectStatus,
    Role, Session, TimeEntry, Timesheet, TimesheetComment, TimesheetStatus,
};

/// PostgreSQL store. Tenant-owned queries run inside a transaction carrying
/// the organization context, and also filter on `org_id` explicitly.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn scoped(&self, org_id: Uuid) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        db::set_transaction_org_context(&mut tx, org_id).await?;
        Ok(tx)
    }
}

fn status_names(statuses: &[TimesheetStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Map a unique violation to a conflict with a readable message
fn conflict_on_duplicate(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::conflict(message)
        }
        _ => AppError::from(err),
    }
}

async fn insert_comment(
    tx: &mut Transaction<'_, Postgres>,
    comment: NewComment,
    now: OffsetDateTime,
) -> AppResult<TimesheetComment> {
    let comment = sqlx::query_as::<_, TimesheetComment>(
        "INSERT INTO timesheet_comments (id, org_id, timesheet_id, author_id, body, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $6)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(comment.org_id)
    .bind(comment.timesheet_id)
    .bind(comment.author_id)
    .bind(comment.body)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;
    Ok(comment)
}

async fn link_entries(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    user_id: Uuid,
    range: DateRange,
    timesheet_id: Uuid,
    now: OffsetDateTime,
) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE time_entries
         SET timesheet_id = $1, updated_at = $2
         WHERE org_id = $3 AND user_id = $4 AND date BETWEEN $5 AND $6
           AND timesheet_id IS NULL",
    )
    .bind(timesheet_id)
    .bind(now)
    .bind(org_id)
    .bind(user_id)
    .bind(range.start)
    .bind(range.end)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> AppResult<Account> {
        sqlx::query_as::<_, Account>(
            "INSERT INTO accounts (id, email, password_hash, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Email is already registered"))
    }

    async fn get_account_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn get_account(&self, id: Uuid) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn create_session(
        &self,
        id: Uuid,
        account_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> AppResult<Session> {
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, account_id, expires_at, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(id)
        .bind(account_id)
        .bind(expires_at)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> AppResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn delete_session(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn create_organization(&self, name: &str) -> AppResult<Organization> {
        let org = sqlx::query_as::<_, Organization>(
            "INSERT INTO organizations (id, name, created_at, updated_at)
             VALUES ($1, $2, $3, $3)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await?;
        Ok(org)
    }

    async fn organization_exists(&self) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM organizations)")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn create_profile(&self, profile: NewProfile) -> AppResult<Profile> {
        sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (id, org_id, role, full_name, email, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6)
             RETURNING *",
        )
        .bind(profile.id)
        .bind(profile.org_id)
        .bind(profile.role)
        .bind(profile.full_name)
        .bind(profile.email)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_duplicate(e, "Profile already exists"))
    }

    async fn get_profile(&self, id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn get_profile_by_email(&self, email: &str) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn get_org_profile(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles WHERE id = $1 AND org_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn list_profiles(&self, org_id: Uuid, active_only: bool) -> AppResult<Vec<Profile>> {
        let profiles = sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles
             WHERE org_id = $1 AND ($2 = FALSE OR is_active)
             ORDER BY full_name",
        )
        .bind(org_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(profiles)
    }

    async fn update_profile_role(&self, org_id: Uuid, id: Uuid, role: Role) -> AppResult<Profile> {
        sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET role = $1, updated_at = $2
             WHERE id = $3 AND org_id = $4
             RETURNING *",
        )
        .bind(role)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
    }

    async fn update_profile_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        is_active: bool,
    ) -> AppResult<Profile> {
        sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET is_active = $1, updated_at = $2
             WHERE id = $3 AND org_id = $4
             RETURNING *",
        )
        .bind(is_active)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
    }

    async fn update_profile_settings(
        &self,
        id: Uuid,
        settings: ProfileSettings,
    ) -> AppResult<Profile> {
        sqlx::query_as::<_, Profile>(
            "UPDATE profiles
             SET full_name = $1, default_hourly_rate = $2, preferred_currency = $3, updated_at = $4
             WHERE id = $5
             RETURNING *",
        )
        .bind(settings.full_name)
        .bind(settings.default_hourly_rate)
        .bind(settings.preferred_currency)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Profile"))
    }

    async fn assign_profile_org(&self, id: Uuid, org_id: Uuid) -> AppResult<Profile> {
        let updated = sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET org_id = $1, role = 'freelancer', updated_at = $2
             WHERE id = $3 AND org_id IS NULL
             RETURNING *",
        )
        .bind(org_id)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(profile) => Ok(profile),
            None if self.get_profile(id).await?.is_some() => Err(AppError::conflict(
                "User already belongs to an organization",
            )),
            None => Err(AppError::not_found("User")),
        }
    }
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn create_project(&self, project: NewProject) -> AppResult<Project> {
        let mut tx = self.scoped(project.org_id).await?;
        let created = sqlx::query_as::<_, Project>(
            "INSERT INTO projects (id, org_id, name, description, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'active', $5, $5)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(project.org_id)
        .bind(project.name)
        .bind(project.description)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_project(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Project>> {
        let mut tx = self.scoped(org_id).await?;
        let project = sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE id = $1 AND org_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(project)
    }

    async fn update_project(
        &self,
        org_id: Uuid,
        id: Uuid,
        update: ProjectUpdate,
    ) -> AppResult<Project> {
        let mut tx = self.scoped(org_id).await?;
        let project = sqlx::query_as::<_, Project>(
            "UPDATE projects SET name = $1, description = $2, updated_at = $3
             WHERE id = $4 AND org_id = $5
             RETURNING *",
        )
        .bind(update.name)
        .bind(update.description)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
        tx.commit().await?;
        Ok(project)
    }

    async fn set_project_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: ProjectStatus,
    ) -> AppResult<Project> {
        let mut tx = self.scoped(org_id).await?;
        let project = sqlx::query_as::<_, Project>(
            "UPDATE projects SET status = $1, updated_at = $2
             WHERE id = $3 AND org_id = $4
             RETURNING *",
        )
        .bind(status)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
        tx.commit().await?;
        Ok(project)
    }

    async fn list_projects(&self, org_id: Uuid, include_archived: bool) -> AppResult<Vec<Project>> {
        let mut tx = self.scoped(org_id).await?;
        let projects = sqlx::query_as::<_, Project>(
            "SELECT * FROM projects
             WHERE org_id = $1 AND ($2 OR status = 'active')
             ORDER BY name",
        )
        .bind(org_id)
        .bind(include_archived)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(projects)
    }

    async fn count_projects(&self, org_id: Uuid, status: ProjectStatus) -> AppResult<i64> {
        let mut tx = self.scoped(org_id).await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM projects WHERE org_id = $1 AND status = $2",
        )
        .bind(org_id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn add_project_member(
        &self,
        org_id: Uuid,
        member: NewProjectMember,
    ) -> AppResult<ProjectMember> {
        let mut tx = self.scoped(org_id).await?;
        let project_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = $1 AND org_id = $2)",
        )
        .bind(member.project_id)
        .bind(org_id)
        .fetch_one(&mut *tx)
        .await?;
        if !project_exists {
            return Err(AppError::not_found("Project"));
        }

        let now = OffsetDateTime::now_utc();
        let created = sqlx::query_as::<_, ProjectMember>(
            "INSERT INTO project_members (id, project_id, user_id, hourly_rate, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(member.project_id)
        .bind(member.user_id)
        .bind(member.hourly_rate)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_duplicate(e, "User is already assigned to this project"))?;
        tx.commit().await?;
        Ok(created)
    }

    async fn remove_project_member(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let mut tx = self.scoped(org_id).await?;
        let result = sqlx::query(
            "DELETE FROM project_members pm
             USING projects p
             WHERE pm.project_id = p.id AND p.org_id = $1
               AND pm.project_id = $2 AND pm.user_id = $3",
        )
        .bind(org_id)
        .bind(project_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        debug!(
            "Removed {} membership rows for project_id: {}",
            result.rows_affected(),
            project_id
        );
        Ok(())
    }

    async fn list_project_members(
        &self,
        org_id: Uuid,
        project_id: Uuid,
    ) -> AppResult<Vec<ProjectMemberDetail>> {
        let mut tx = self.scoped(org_id).await?;
        let members = sqlx::query_as::<_, ProjectMember>(
            "SELECT pm.* FROM project_members pm
             JOIN projects p ON p.id = pm.project_id
             WHERE pm.project_id = $1 AND p.org_id = $2
             ORDER BY pm.created_at",
        )
        .bind(project_id)
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        let user_ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
        let profiles = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ANY($1)")
            .bind(&user_ids)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(members
            .into_iter()
            .filter_map(|member| {
                profiles
                    .iter()
                    .find(|p| p.id == member.user_id)
                    .cloned()
                    .map(|user| ProjectMemberDetail { member, user })
            })
            .collect())
    }

    async fn list_member_projects(&self, org_id: Uuid, user_id: Uuid) -> AppResult<Vec<Project>> {
        let mut tx = self.scoped(org_id).await?;
        let projects = sqlx::query_as::<_, Project>(
            "SELECT p.* FROM projects p
             JOIN project_members pm ON pm.project_id = p.id
             WHERE p.org_id = $1 AND pm.user_id = $2
             ORDER BY p.name",
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(projects)
    }

    async fn is_project_member(
        &self,
        org_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let mut tx = self.scoped(org_id).await?;
        let member: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM project_members pm
                JOIN projects p ON p.id = pm.project_id
                WHERE p.org_id = $1 AND pm.project_id = $2 AND pm.user_id = $3
            )",
        )
        .bind(org_id)
        .bind(project_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(member)
    }
}

#[async_trait]
impl EntryStore for PgStore {
    async fn list_entries(&self, org_id: Uuid, query: EntryQuery) -> AppResult<Vec<TimeEntry>> {
        let order = if query.newest_first {
            "date DESC, created_at DESC"
        } else {
            "date ASC, created_at ASC"
        };
        let sql = format!(
            "SELECT * FROM time_entries
             WHERE org_id = $1
               AND ($2::uuid IS NULL OR user_id = $2)
               AND ($3::uuid IS NULL OR project_id = $3)
               AND ($4::date IS NULL OR date >= $4)
               AND ($5::date IS NULL OR date <= $5)
             ORDER BY {}",
            order
        );

        let mut tx = self.scoped(org_id).await?;
        let entries = sqlx::query_as::<_, TimeEntry>(&sql)
            .bind(org_id)
            .bind(query.user_id)
            .bind(query.project_id)
            .bind(query.range.map(|r| r.start))
            .bind(query.range.map(|r| r.end))
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(entries)
    }

    async fn get_entry(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<TimeEntry>> {
        let mut tx = self.scoped(org_id).await?;
        let entry = sqlx::query_as::<_, TimeEntry>(
            "SELECT * FROM time_entries WHERE id = $1 AND org_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn create_entry(&self, entry: NewTimeEntry) -> AppResult<TimeEntry> {
        let mut tx = self.scoped(entry.org_id).await?;
        let created = sqlx::query_as::<_, TimeEntry>(
            "INSERT INTO time_entries
                (id, org_id, user_id, project_id, date, minutes, description, deliverable_url,
                 source, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(entry.org_id)
        .bind(entry.user_id)
        .bind(entry.project_id)
        .bind(entry.date)
        .bind(entry.minutes)
        .bind(entry.description)
        .bind(entry.deliverable_url)
        .bind(entry.source)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn update_entry(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: TimeEntryPatch,
    ) -> AppResult<TimeEntry> {
        let mut tx = self.scoped(org_id).await?;
        let entry = sqlx::query_as::<_, TimeEntry>(
            "UPDATE time_entries
             SET project_id = $1, date = $2, minutes = $3, description = $4,
                 deliverable_url = $5,
                 timesheet_id = CASE WHEN $6 THEN NULL ELSE timesheet_id END,
                 updated_at = $7
             WHERE id = $8 AND org_id = $9
             RETURNING *",
        )
        .bind(patch.project_id)
        .bind(patch.date)
        .bind(patch.minutes)
        .bind(patch.description)
        .bind(patch.deliverable_url)
        .bind(patch.unlink)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Time entry"))?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn delete_entry(&self, org_id: Uuid, id: Uuid) -> AppResult<()> {
        let mut tx = self.scoped(org_id).await?;
        let result = sqlx::query("DELETE FROM time_entries WHERE id = $1 AND org_id = $2")
            .bind(id)
            .bind(org_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Time entry"));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn link_entries_to_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        range: DateRange,
        timesheet_id: Uuid,
    ) -> AppResult<u64> {
        let mut tx = self.scoped(org_id).await?;
        let linked = link_entries(
            &mut tx,
            org_id,
            user_id,
            range,
            timesheet_id,
            OffsetDateTime::now_utc(),
        )
        .await?;
        tx.commit().await?;
        Ok(linked)
    }
}

#[async_trait]
impl TimesheetStore for PgStore {
    async fn get_or_create_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        week_start: Date,
    ) -> AppResult<Timesheet> {
        let mut tx = self.scoped(org_id).await?;
        sqlx::query(
            "INSERT INTO timesheets (id, org_id, user_id, week_start, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'draft', $5, $5)
             ON CONFLICT (user_id, week_start) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(user_id)
        .bind(week_start)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *tx)
        .await?;

        let timesheet = sqlx::query_as::<_, Timesheet>(
            "SELECT * FROM timesheets WHERE org_id = $1 AND user_id = $2 AND week_start = $3",
        )
        .bind(org_id)
        .bind(user_id)
        .bind(week_start)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Timesheet"))?;
        tx.commit().await?;
        Ok(timesheet)
    }

    async fn find_timesheet(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        week_start: Date,
    ) -> AppResult<Option<Timesheet>> {
        let mut tx = self.scoped(org_id).await?;
        let timesheet = sqlx::query_as::<_, Timesheet>(
            "SELECT * FROM timesheets WHERE org_id = $1 AND user_id = $2 AND week_start = $3",
        )
        .bind(org_id)
        .bind(user_id)
        .bind(week_start)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(timesheet)
    }

    async fn get_timesheet(&self, org_id: Uuid, id: Uuid) -> AppResult<Option<Timesheet>> {
        let mut tx = self.scoped(org_id).await?;
        let timesheet = sqlx::query_as::<_, Timesheet>(
            "SELECT * FROM timesheets WHERE id = $1 AND org_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(timesheet)
    }

    async fn list_timesheets(
        &self,
        org_id: Uuid,
        query: TimesheetQuery,
    ) -> AppResult<Vec<Timesheet>> {
        let order = match query.order {
            TimesheetOrder::WeekDesc => "week_start DESC",
            TimesheetOrder::UpdatedDesc => "updated_at DESC",
            TimesheetOrder::SubmittedAsc => "submitted_at ASC NULLS LAST",
        };
        let sql = format!(
            "SELECT * FROM timesheets
             WHERE org_id = $1
               AND ($2::uuid IS NULL OR user_id = $2)
               AND ($3::text IS NULL OR status::text = $3)
             ORDER BY {}
             LIMIT $4",
            order
        );

        let mut tx = self.scoped(org_id).await?;
        let timesheets = sqlx::query_as::<_, Timesheet>(&sql)
            .bind(org_id)
            .bind(query.user_id)
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.limit)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(timesheets)
    }

    async fn count_timesheets(
        &self,
        org_id: Uuid,
        status: TimesheetStatus,
        approved_since: Option<OffsetDateTime>,
    ) -> AppResult<i64> {
        let mut tx = self.scoped(org_id).await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM timesheets
             WHERE org_id = $1 AND status = $2
               AND ($3::timestamptz IS NULL OR approved_at >= $3)",
        )
        .bind(org_id)
        .bind(status)
        .bind(approved_since)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn update_summary(
        &self,
        org_id: Uuid,
        id: Uuid,
        editable: &'static [TimesheetStatus],
        summary: Option<String>,
    ) -> AppResult<Option<Timesheet>> {
        let mut tx = self.scoped(org_id).await?;
        let timesheet = sqlx::query_as::<_, Timesheet>(
            "UPDATE timesheets SET summary = $1, updated_at = $2
             WHERE id = $3 AND org_id = $4 AND status::text = ANY($5)
             RETURNING *",
        )
        .bind(summary)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(org_id)
        .bind(status_names(editable))
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(timesheet)
    }

    async fn apply_transition(
        &self,
        org_id: Uuid,
        record: TransitionRecord,
    ) -> AppResult<Option<AppliedTransition>> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.scoped(org_id).await?;

        let updated = sqlx::query_as::<_, Timesheet>(
            "UPDATE timesheets
             SET status = $1,
                 submitted_at = COALESCE($2, submitted_at),
                 approved_at = COALESCE($3, approved_at),
                 approved_by = COALESCE($4, approved_by),
                 updated_at = $5
             WHERE id = $6 AND org_id = $7 AND status::text = ANY($8)
             RETURNING *",
        )
        .bind(record.to)
        .bind(record.submitted_at)
        .bind(record.approved_at)
        .bind(record.approved_by)
        .bind(now)
        .bind(record.timesheet_id)
        .bind(org_id)
        .bind(status_names(record.from))
        .fetch_optional(&mut *tx)
        .await?;

        // Lost the race or the row is gone; nothing was written
        let Some(timesheet) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        let linked_entries = match record.link {
            Some(link) => {
                link_entries(&mut tx, org_id, link.user_id, link.range, timesheet.id, now).await?
            }
            None => 0,
        };
        let comment = match record.comment {
            Some(comment) => Some(insert_comment(&mut tx, comment, now).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(Some(AppliedTransition {
            timesheet,
            linked_entries,
            comment,
        }))
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn add_comment(&self, comment: NewComment) -> AppResult<TimesheetComment> {
        let mut tx = self.scoped(comment.org_id).await?;
        let timesheet_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM timesheets WHERE id = $1 AND org_id = $2)",
        )
        .bind(comment.timesheet_id)
        .bind(comment.org_id)
        .fetch_one(&mut *tx)
        .await?;
        if !timesheet_exists {
            return Err(AppError::not_found("Timesheet"));
        }
        let created = insert_comment(&mut tx, comment, OffsetDateTime::now_utc()).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn list_comments(
        &self,
        org_id: Uuid,
        timesheet_id: Uuid,
    ) -> AppResult<Vec<TimesheetComment>> {
        let mut tx = self.scoped(org_id).await?;
        let comments = sqlx::query_as::<_, TimesheetComment>(
            "SELECT * FROM timesheet_comments
             WHERE org_id = $1 AND timesheet_id = $2
             ORDER BY created_at",
        )
        .bind(org_id)
        .bind(timesheet_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(comments)
    }
}
