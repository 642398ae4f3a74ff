use serde::Serialize;
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{index_profiles, index_projects, load_timesheet, non_blank, required_text};
use crate::aggregate::WeekAggregate;
use crate::dates::{self, DateRange};
use crate::error::{AppError, AppResult};
use crate::gate::{self, Command};
use crate::lifecycle::Transition;
use crate::model::{
    ActingProfile, Profile, TimeEntryDetail, Timesheet, TimesheetComment, TimesheetCommentDetail,
    TimesheetStatus, TimesheetWithUser,
};
use crate::store::{EntryLink, EntryQuery, NewComment, Store, TimesheetQuery, TransitionRecord};

/// A week as its owner sees it
#[derive(Debug, Serialize)]
pub struct WeekView {
    pub timesheet: Timesheet,
    pub entries: Vec<TimeEntryDetail>,
    pub aggregate: WeekAggregate,
    pub can_edit: bool,
}

#[derive(Debug, Serialize)]
pub struct TimesheetDetails {
    pub timesheet: Timesheet,
    pub user: Option<Profile>,
    pub entries: Vec<TimeEntryDetail>,
    pub comments: Vec<TimesheetCommentDetail>,
    pub aggregate: WeekAggregate,
    /// The caller owns the timesheet and it is still editable
    pub can_edit: bool,
    /// The caller is an admin and the timesheet awaits review
    pub can_review: bool,
}

/// Weekly timesheets and their approval lifecycle
pub struct TimesheetService {
    store: Arc<dyn Store>,
}

impl TimesheetService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The caller's timesheet for the week containing `date`, created as a
    /// draft on first access
    pub async fn get_or_create(&self, actor: Option<&ActingProfile>, date: Date) -> AppResult<Timesheet> {
        let scope = gate::authorize(actor, &Command::OpenTimesheet)?;
        let week_start = dates::week_start(date);
        self.store
            .get_or_create_timesheet(scope.org_id, scope.user_id, week_start)
            .await
    }

    pub async fn current_week(&self, actor: Option<&ActingProfile>, today: Date) -> AppResult<WeekView> {
        self.week(actor, today).await
    }

    /// Timesheet, entries and totals for the caller's week containing `date`
    pub async fn week(&self, actor: Option<&ActingProfile>, date: Date) -> AppResult<WeekView> {
        let timesheet = self.get_or_create(actor, date).await?;
        let range = DateRange::week_of(timesheet.week_start);

        let (entries, projects) = tokio::try_join!(
            self.store.list_entries(
                timesheet.org_id,
                EntryQuery {
                    user_id: Some(timesheet.user_id),
                    range: Some(range),
                    ..Default::default()
                },
            ),
            self.store.list_projects(timesheet.org_id, true),
        )?;

        let aggregate = WeekAggregate::from_entries(timesheet.week_start, &entries);
        let projects = index_projects(projects);
        let entries = entries
            .into_iter()
            .map(|entry| TimeEntryDetail {
                project: projects.get(&entry.project_id).cloned(),
                user: None,
                entry,
            })
            .collect();

        Ok(WeekView {
            can_edit: timesheet.status.is_editable(),
            timesheet,
            entries,
            aggregate,
        })
    }

    /// Admins see the organization, everyone else their own timesheets.
    /// Newest week first.
    pub async fn list(
        &self,
        actor: Option<&ActingProfile>,
        status: Option<TimesheetStatus>,
    ) -> AppResult<Vec<TimesheetWithUser>> {
        let scope = gate::authorize(actor, &Command::ListTimesheets)?;
        let query = TimesheetQuery {
            user_id: (!scope.is_admin()).then_some(scope.user_id),
            status,
            ..Default::default()
        };

        let (timesheets, profiles) = tokio::try_join!(
            self.store.list_timesheets(scope.org_id, query),
            self.store.list_profiles(scope.org_id, false),
        )?;
        let profiles = index_profiles(profiles);

        debug!(
            "Listed {} timesheets for user_id: {}",
            timesheets.len(),
            scope.user_id
        );
        Ok(timesheets
            .into_iter()
            .map(|timesheet| TimesheetWithUser {
                user: profiles.get(&timesheet.user_id).cloned(),
                timesheet,
            })
            .collect())
    }

    pub async fn details(&self, actor: Option<&ActingProfile>, id: Uuid) -> AppResult<TimesheetDetails> {
        let scope = gate::session(actor)?;
        let timesheet = load_timesheet(self.store.as_ref(), scope.org_id, id).await?;
        scope.authorize(&Command::ViewTimesheet {
            owner: timesheet.user_id,
        })?;

        let range = DateRange::week_of(timesheet.week_start);
        let (entries, projects, profiles, comments) = tokio::try_join!(
            self.store.list_entries(
                scope.org_id,
                EntryQuery {
                    user_id: Some(timesheet.user_id),
                    range: Some(range),
                    ..Default::default()
                },
            ),
            self.store.list_projects(scope.org_id, true),
            self.store.list_profiles(scope.org_id, false),
            self.store.list_comments(scope.org_id, timesheet.id),
        )?;

        let aggregate = WeekAggregate::from_entries(timesheet.week_start, &entries);
        let projects = index_projects(projects);
        let profiles = index_profiles(profiles);

        let entries = entries
            .into_iter()
            .map(|entry| TimeEntryDetail {
                project: projects.get(&entry.project_id).cloned(),
                user: None,
                entry,
            })
            .collect();
        let comments = comments
            .into_iter()
            .map(|comment| TimesheetCommentDetail {
                author: profiles.get(&comment.author_id).cloned(),
                comment,
            })
            .collect();

        Ok(TimesheetDetails {
            user: profiles.get(&timesheet.user_id).cloned(),
            can_edit: timesheet.user_id == scope.user_id && timesheet.status.is_editable(),
            can_review: scope.is_admin() && timesheet.status.is_reviewable(),
            timesheet,
            entries,
            comments,
            aggregate,
        })
    }

    /// Overwrite the summary; blank text clears it
    pub async fn update_summary(
        &self,
        actor: Option<&ActingProfile>,
        id: Uuid,
        summary: Option<String>,
    ) -> AppResult<Timesheet> {
        const ACTION: &str = "edit the summary of";

        let scope = gate::session(actor)?;
        let timesheet = load_timesheet(self.store.as_ref(), scope.org_id, id).await?;
        scope.authorize(&Command::UpdateSummary {
            owner: timesheet.user_id,
        })?;
        timesheet.status.ensure_editable(ACTION)?;

        match self
            .store
            .update_summary(scope.org_id, id, TimesheetStatus::EDITABLE, non_blank(summary))
            .await?
        {
            Some(updated) => {
                info!("Summary updated for timesheet_id: {}", id);
                Ok(updated)
            }
            None => Err(self.lost_race(scope.org_id, id, ACTION).await),
        }
    }

    /// Hand the week to an admin and link the owner's unlinked entries to it
    pub async fn submit(&self, actor: Option<&ActingProfile>, id: Uuid) -> AppResult<Timesheet> {
        let scope = gate::session(actor)?;
        let timesheet = load_timesheet(self.store.as_ref(), scope.org_id, id).await?;
        scope.authorize(&Command::SubmitTimesheet {
            owner: timesheet.user_id,
        })?;

        let transition = Transition::Submit;
        let to = transition.apply(timesheet.status)?;
        let record = TransitionRecord {
            timesheet_id: id,
            from: transition.sources(),
            to,
            submitted_at: Some(OffsetDateTime::now_utc()),
            approved_at: None,
            approved_by: None,
            link: Some(EntryLink {
                user_id: timesheet.user_id,
                range: DateRange::week_of(timesheet.week_start),
            }),
            comment: None,
        };

        match self.store.apply_transition(scope.org_id, record).await? {
            Some(applied) => {
                info!(
                    "Timesheet {} submitted, {} entries linked",
                    id, applied.linked_entries
                );
                Ok(applied.timesheet)
            }
            None => Err(self.lost_race(scope.org_id, id, transition.verb()).await),
        }
    }

    pub async fn approve(&self, actor: Option<&ActingProfile>, id: Uuid) -> AppResult<Timesheet> {
        let scope = gate::authorize(actor, &Command::ApproveTimesheet)?;
        let timesheet = load_timesheet(self.store.as_ref(), scope.org_id, id).await?;

        let transition = Transition::Approve;
        let to = transition.apply(timesheet.status)?;
        let record = TransitionRecord {
            timesheet_id: id,
            from: transition.sources(),
            to,
            submitted_at: None,
            approved_at: Some(OffsetDateTime::now_utc()),
            approved_by: Some(scope.user_id),
            link: None,
            comment: None,
        };

        match self.store.apply_transition(scope.org_id, record).await? {
            Some(applied) => {
                info!("Timesheet {} approved by user_id: {}", id, scope.user_id);
                Ok(applied.timesheet)
            }
            None => Err(self.lost_race(scope.org_id, id, transition.verb()).await),
        }
    }

    /// Send the week back to its owner with an explanation
    pub async fn request_changes(
        &self,
        actor: Option<&ActingProfile>,
        id: Uuid,
        comment: &str,
    ) -> AppResult<(Timesheet, TimesheetComment)> {
        let scope = gate::authorize(actor, &Command::RequestChanges)?;
        let body = required_text(comment, "Comment cannot be empty")?;
        let timesheet = load_timesheet(self.store.as_ref(), scope.org_id, id).await?;

        let transition = Transition::RequestChanges;
        let to = transition.apply(timesheet.status)?;
        let record = TransitionRecord {
            timesheet_id: id,
            from: transition.sources(),
            to,
            submitted_at: None,
            approved_at: None,
            approved_by: None,
            link: None,
            comment: Some(NewComment {
                org_id: scope.org_id,
                timesheet_id: id,
                author_id: scope.user_id,
                body,
            }),
        };

        let Some(applied) = self.store.apply_transition(scope.org_id, record).await? else {
            return Err(self.lost_race(scope.org_id, id, transition.verb()).await);
        };
        let comment = applied.comment.ok_or_else(|| {
            AppError::Internal(format!("No comment recorded for timesheet {}", id))
        })?;

        info!("Changes requested on timesheet {} by user_id: {}", id, scope.user_id);
        Ok((applied.timesheet, comment))
    }

    /// Discussion comment from the owner or an admin, in any status
    pub async fn add_comment(
        &self,
        actor: Option<&ActingProfile>,
        id: Uuid,
        body: &str,
    ) -> AppResult<TimesheetComment> {
        let scope = gate::session(actor)?;
        let body = required_text(body, "Comment cannot be empty")?;
        let timesheet = load_timesheet(self.store.as_ref(), scope.org_id, id).await?;
        scope.authorize(&Command::CommentOnTimesheet {
            owner: timesheet.user_id,
        })?;

        let comment = self
            .store
            .add_comment(NewComment {
                org_id: scope.org_id,
                timesheet_id: id,
                author_id: scope.user_id,
                body,
            })
            .await?;
        info!("Comment added to timesheet {} by user_id: {}", id, scope.user_id);
        Ok(comment)
    }

    /// Error for a transition whose compare-and-swap found a different status
    async fn lost_race(&self, org_id: Uuid, id: Uuid, action: &'static str) -> AppError {
        match self.store.get_timesheet(org_id, id).await {
            Ok(Some(current)) => {
                warn!(
                    "Timesheet {} changed to {} before {} completed",
                    id, current.status, action
                );
                AppError::InvalidTransition {
                    status: current.status,
                    action,
                }
            }
            Ok(None) => AppError::not_found("Timesheet"),
            Err(err) => err,
        }
    }
}
