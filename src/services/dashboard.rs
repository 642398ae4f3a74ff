use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use time::Date;
use tracing::debug;
use uuid::Uuid;

use super::index_profiles;
use crate::aggregate;
use crate::dates::{self, DateRange};
use crate::error::AppResult;
use crate::gate::{self, Command, Scope};
use crate::model::{
    ActingProfile, Profile, Project, ProjectStatus, Role, Timesheet, TimesheetStatus,
    TimesheetWithUser,
};
use crate::store::{EntryQuery, Store, TimesheetOrder, TimesheetQuery};

const RECENT_LIMIT: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct TeamMemberHours {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub hours_this_week: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub is_admin: bool,
    pub week_start: Date,
    /// Caller's hours this week, or the organization's for admins
    pub total_hours: f64,
    /// Submitted timesheets awaiting review (admins)
    pub pending_timesheets: i64,
    /// Timesheets approved since the week began (admins)
    pub approved_this_week: i64,
    /// Caller's own timesheet status this week
    pub current_timesheet_status: TimesheetStatus,
    pub recent_timesheets: Vec<TimesheetWithUser>,
    pub projects_count: i64,
    pub team_size: usize,
    pub team_members: Vec<TeamMemberHours>,
    pub assigned_projects: Vec<Project>,
    pub pending_for_review: Vec<TimesheetWithUser>,
}

#[derive(Debug, Default)]
struct ReviewCounts {
    pending: i64,
    approved_this_week: i64,
}

/// Read-only rollups for the landing page
pub struct DashboardService {
    store: Arc<dyn Store>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Stats for the week containing `today`. Every read is independent,
    /// so they run concurrently.
    pub async fn stats(&self, actor: Option<&ActingProfile>, today: Date) -> AppResult<DashboardStats> {
        let scope = gate::authorize(actor, &Command::ViewDashboard)?;
        let week = DateRange::week_of(today);

        let (
            total_minutes,
            counts,
            current_status,
            recent,
            projects_count,
            team_members,
            assigned_projects,
            pending_for_review,
            profiles,
        ) = tokio::try_join!(
            self.week_minutes(&scope, week),
            self.review_counts(&scope, week),
            self.current_status(&scope, week),
            self.recent_timesheets(&scope),
            self.store.count_projects(scope.org_id, ProjectStatus::Active),
            self.team_hours(&scope, week),
            self.assigned_projects(&scope),
            self.pending_for_review(&scope),
            self.store.list_profiles(scope.org_id, false),
        )?;

        let profiles = index_profiles(profiles);
        let with_user = |timesheets: Vec<Timesheet>| -> Vec<TimesheetWithUser> {
            timesheets
                .into_iter()
                .map(|timesheet| TimesheetWithUser {
                    user: profiles.get(&timesheet.user_id).cloned(),
                    timesheet,
                })
                .collect()
        };

        debug!("Dashboard built for user_id: {}", scope.user_id);
        Ok(DashboardStats {
            is_admin: scope.is_admin(),
            week_start: week.start,
            total_hours: dates::rounded_hours(total_minutes),
            pending_timesheets: counts.pending,
            approved_this_week: counts.approved_this_week,
            current_timesheet_status: current_status,
            recent_timesheets: with_user(recent),
            projects_count,
            team_size: if scope.is_admin() {
                team_members.len().max(1)
            } else {
                1
            },
            team_members,
            assigned_projects,
            pending_for_review: with_user(pending_for_review),
        })
    }

    async fn week_minutes(&self, scope: &Scope, week: DateRange) -> AppResult<i64> {
        let entries = self
            .store
            .list_entries(
                scope.org_id,
                EntryQuery {
                    user_id: (!scope.is_admin()).then_some(scope.user_id),
                    range: Some(week),
                    ..Default::default()
                },
            )
            .await?;
        Ok(aggregate::total_minutes(&entries))
    }

    async fn review_counts(&self, scope: &Scope, week: DateRange) -> AppResult<ReviewCounts> {
        if !scope.is_admin() {
            return Ok(ReviewCounts::default());
        }
        let week_began = week.start.midnight().assume_utc();
        let (pending, approved_this_week) = tokio::try_join!(
            self.store
                .count_timesheets(scope.org_id, TimesheetStatus::Submitted, None),
            self.store
                .count_timesheets(scope.org_id, TimesheetStatus::Approved, Some(week_began)),
        )?;
        Ok(ReviewCounts {
            pending,
            approved_this_week,
        })
    }

    /// Draft until a timesheet for the week exists
    async fn current_status(&self, scope: &Scope, week: DateRange) -> AppResult<TimesheetStatus> {
        let timesheet = self
            .store
            .find_timesheet(scope.org_id, scope.user_id, week.start)
            .await?;
        Ok(timesheet.map_or(TimesheetStatus::Draft, |t| t.status))
    }

    async fn recent_timesheets(&self, scope: &Scope) -> AppResult<Vec<Timesheet>> {
        self.store
            .list_timesheets(
                scope.org_id,
                TimesheetQuery {
                    user_id: (!scope.is_admin()).then_some(scope.user_id),
                    status: None,
                    order: TimesheetOrder::UpdatedDesc,
                    limit: Some(RECENT_LIMIT),
                },
            )
            .await
    }

    /// One weekly rollup per active member, admins only
    async fn team_hours(&self, scope: &Scope, week: DateRange) -> AppResult<Vec<TeamMemberHours>> {
        if !scope.is_admin() {
            return Ok(Vec::new());
        }
        let members: Vec<Profile> = self.store.list_profiles(scope.org_id, true).await?;

        let rollups = try_join_all(members.iter().map(|member| {
            self.store.list_entries(
                scope.org_id,
                EntryQuery {
                    user_id: Some(member.id),
                    range: Some(week),
                    ..Default::default()
                },
            )
        }))
        .await?;

        Ok(members
            .into_iter()
            .zip(rollups)
            .map(|(member, entries)| TeamMemberHours {
                id: member.id,
                full_name: member.full_name,
                email: member.email,
                role: member.role,
                hours_this_week: dates::rounded_hours(aggregate::total_minutes(&entries)),
            })
            .collect())
    }

    async fn assigned_projects(&self, scope: &Scope) -> AppResult<Vec<Project>> {
        if scope.is_admin() {
            return Ok(Vec::new());
        }
        let projects = self
            .store
            .list_member_projects(scope.org_id, scope.user_id)
            .await?;
        Ok(projects.into_iter().filter(Project::is_active).collect())
    }

    /// Oldest submissions first, admins only
    async fn pending_for_review(&self, scope: &Scope) -> AppResult<Vec<Timesheet>> {
        if !scope.is_admin() {
            return Ok(Vec::new());
        }
        self.store
            .list_timesheets(
                scope.org_id,
                TimesheetQuery {
                    user_id: None,
                    status: Some(TimesheetStatus::Submitted),
                    order: TimesheetOrder::SubmittedAsc,
                    limit: Some(RECENT_LIMIT),
                },
            )
            .await
    }
}
