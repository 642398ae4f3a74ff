use serde::Deserialize;
use std::sync::Arc;
use time::Date;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::{index_profiles, index_projects, non_blank};
use crate::dates::{self, DateRange};
use crate::error::{AppError, AppResult, Denial};
use crate::gate::{self, Command, Scope};
use crate::model::{ActingProfile, EntrySource, TimeEntry, TimeEntryDetail, Timesheet};
use crate::store::{EntryQuery, NewTimeEntry, Store, TimeEntryPatch};

const MIN_HOURS: f64 = 0.01;
const MAX_HOURS: f64 = 24.0;

/// Time entry as submitted by a form
#[derive(Debug, Clone, Deserialize)]
pub struct EntryInput {
    pub project_id: String,
    pub date: Date,
    pub hours: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub deliverable_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryFilter {
    /// Any day of the week to list; the whole week is returned
    pub week_start: Option<Date>,
    pub project_id: Option<Uuid>,
    /// Only honoured on org-wide listings
    pub user_id: Option<Uuid>,
}

#[derive(Debug)]
struct ValidEntry {
    project_id: Uuid,
    date: Date,
    minutes: i32,
    description: Option<String>,
    deliverable_url: Option<String>,
}

impl EntryInput {
    fn validate(self) -> AppResult<ValidEntry> {
        let project_id = Uuid::parse_str(self.project_id.trim())
            .map_err(|_| AppError::validation("Please select a project"))?;

        if !self.hours.is_finite() || self.hours < MIN_HOURS {
            return Err(AppError::validation("Hours must be greater than 0"));
        }
        if self.hours > MAX_HOURS {
            return Err(AppError::validation("Hours cannot exceed 24"));
        }

        let deliverable_url = match non_blank(self.deliverable_url) {
            Some(raw) => {
                Url::parse(&raw).map_err(|_| AppError::validation("Please enter a valid URL"))?;
                Some(raw)
            }
            None => None,
        };

        Ok(ValidEntry {
            project_id,
            date: self.date,
            minutes: dates::hours_to_minutes(self.hours),
            description: non_blank(self.description),
            deliverable_url,
        })
    }
}

/// Time entry bookkeeping for the acting profile
pub struct EntryService {
    store: Arc<dyn Store>,
}

impl EntryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, actor: Option<&ActingProfile>, input: EntryInput) -> AppResult<TimeEntry> {
        let scope = gate::authorize(actor, &Command::CreateEntry)?;
        let valid = input.validate()?;

        self.ensure_project_open(&scope, valid.project_id).await?;
        self.ensure_week_open(&scope, valid.date, "add time to").await?;

        let entry = self
            .store
            .create_entry(NewTimeEntry {
                org_id: scope.org_id,
                user_id: scope.user_id,
                project_id: valid.project_id,
                date: valid.date,
                minutes: valid.minutes,
                description: valid.description,
                deliverable_url: valid.deliverable_url,
                source: EntrySource::Manual,
            })
            .await?;

        info!(
            "Time entry {} logged by user_id: {} ({} min)",
            entry.id, scope.user_id, entry.minutes
        );
        Ok(entry)
    }

    pub async fn update(
        &self,
        actor: Option<&ActingProfile>,
        id: Uuid,
        input: EntryInput,
    ) -> AppResult<TimeEntry> {
        const ACTION: &str = "edit time on";

        let scope = gate::session(actor)?;
        let entry = self.load(&scope, id).await?;
        scope.authorize(&Command::UpdateEntry { owner: entry.user_id })?;
        let valid = input.validate()?;

        if valid.project_id != entry.project_id {
            self.ensure_project_open(&scope, valid.project_id).await?;
        }
        let parent = self.ensure_entry_open(&scope, &entry, ACTION).await?;
        self.ensure_week_open(&scope, valid.date, ACTION).await?;

        // An entry moved out of its linked week no longer belongs to that timesheet
        let unlink = parent.is_some_and(|t| t.week_start != dates::week_start(valid.date));

        let updated = self
            .store
            .update_entry(
                scope.org_id,
                id,
                TimeEntryPatch {
                    project_id: valid.project_id,
                    date: valid.date,
                    minutes: valid.minutes,
                    description: valid.description,
                    deliverable_url: valid.deliverable_url,
                    unlink,
                },
            )
            .await?;

        info!("Time entry {} updated by user_id: {}", id, scope.user_id);
        Ok(updated)
    }

    pub async fn delete(&self, actor: Option<&ActingProfile>, id: Uuid) -> AppResult<()> {
        let scope = gate::session(actor)?;
        let entry = self.load(&scope, id).await?;
        scope.authorize(&Command::DeleteEntry { owner: entry.user_id })?;
        self.ensure_entry_open(&scope, &entry, "remove time from").await?;

        self.store.delete_entry(scope.org_id, id).await?;
        info!("Time entry {} deleted by user_id: {}", id, scope.user_id);
        Ok(())
    }

    /// The caller's entries, newest first
    pub async fn list_own(
        &self,
        actor: Option<&ActingProfile>,
        filter: EntryFilter,
    ) -> AppResult<Vec<TimeEntryDetail>> {
        let scope = gate::authorize(actor, &Command::ListOwnEntries)?;
        let query = EntryQuery {
            user_id: Some(scope.user_id),
            range: filter.week_start.map(DateRange::week_of),
            project_id: filter.project_id,
            newest_first: true,
        };

        let (entries, projects) = tokio::try_join!(
            self.store.list_entries(scope.org_id, query),
            self.store.list_projects(scope.org_id, true),
        )?;
        let projects = index_projects(projects);

        debug!("Listed {} entries for user_id: {}", entries.len(), scope.user_id);
        Ok(entries
            .into_iter()
            .map(|entry| TimeEntryDetail {
                project: projects.get(&entry.project_id).cloned(),
                user: None,
                entry,
            })
            .collect())
    }

    /// Every entry in the organization, newest first, with project and owner
    pub async fn list_all(
        &self,
        actor: Option<&ActingProfile>,
        filter: EntryFilter,
    ) -> AppResult<Vec<TimeEntryDetail>> {
        let scope = gate::authorize(actor, &Command::ListAllEntries)?;
        let query = EntryQuery {
            user_id: filter.user_id,
            range: filter.week_start.map(DateRange::week_of),
            project_id: filter.project_id,
            newest_first: true,
        };

        let (entries, projects, profiles) = tokio::try_join!(
            self.store.list_entries(scope.org_id, query),
            self.store.list_projects(scope.org_id, true),
            self.store.list_profiles(scope.org_id, false),
        )?;
        let projects = index_projects(projects);
        let profiles = index_profiles(profiles);

        Ok(entries
            .into_iter()
            .map(|entry| TimeEntryDetail {
                project: projects.get(&entry.project_id).cloned(),
                user: profiles.get(&entry.user_id).cloned(),
                entry,
            })
            .collect())
    }

    async fn load(&self, scope: &Scope, id: Uuid) -> AppResult<TimeEntry> {
        self.store
            .get_entry(scope.org_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Time entry"))
    }

    /// The project must be active and, for freelancers, assigned to them
    async fn ensure_project_open(&self, scope: &Scope, project_id: Uuid) -> AppResult<()> {
        let project = self
            .store
            .get_project(scope.org_id, project_id)
            .await?
            .ok_or_else(|| AppError::not_found("Project"))?;
        if !project.is_active() {
            return Err(AppError::validation("Project is archived"));
        }
        if !scope.is_admin()
            && !self
                .store
                .is_project_member(scope.org_id, project_id, scope.user_id)
                .await?
        {
            return Err(AppError::Unauthorized(Denial::NotProjectMember));
        }
        Ok(())
    }

    /// The caller's timesheet for the week of `date`, if any, must be editable
    async fn ensure_week_open(&self, scope: &Scope, date: Date, action: &'static str) -> AppResult<()> {
        if let Some(timesheet) = self
            .store
            .find_timesheet(scope.org_id, scope.user_id, dates::week_start(date))
            .await?
        {
            timesheet.status.ensure_editable(action)?;
        }
        Ok(())
    }

    /// The entry's week and its linked timesheet must both be editable.
    /// Returns the linked timesheet.
    async fn ensure_entry_open(
        &self,
        scope: &Scope,
        entry: &TimeEntry,
        action: &'static str,
    ) -> AppResult<Option<Timesheet>> {
        self.ensure_week_open(scope, entry.date, action).await?;
        let parent = match entry.timesheet_id {
            Some(timesheet_id) => self.store.get_timesheet(scope.org_id, timesheet_id).await?,
            None => None,
        };
        if let Some(parent) = &parent {
            parent.status.ensure_editable(action)?;
        }
        Ok(parent)
    }
}
