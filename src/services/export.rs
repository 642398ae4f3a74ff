use std::collections::HashMap;
use std::sync::Arc;
use time::Date;
use tracing::info;
use uuid::Uuid;

use super::{index_profiles, index_projects, load_timesheet};
use crate::dates::{self, DateRange};
use crate::error::{AppError, AppResult};
use crate::gate::{self, Command};
use crate::model::{ActingProfile, Profile, Project, TimeEntry};
use crate::store::{EntryQuery, Store};

const UNKNOWN: &str = "Unknown";

const TIMESHEET_HEADERS: [&str; 5] = ["Date", "Project", "Hours", "Description", "Deliverable URL"];
const RANGE_HEADERS: [&str; 6] = [
    "Date",
    "User",
    "Project",
    "Hours",
    "Description",
    "Deliverable URL",
];

/// CSV renderings of logged time
pub struct ExportService {
    store: Arc<dyn Store>,
}

impl ExportService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Every entry the timesheet owner logged in its week, oldest first
    pub async fn timesheet_csv(&self, actor: Option<&ActingProfile>, id: Uuid) -> AppResult<String> {
        let scope = gate::session(actor)?;
        let timesheet = load_timesheet(self.store.as_ref(), scope.org_id, id).await?;
        scope.authorize(&Command::ExportTimesheet {
            owner: timesheet.user_id,
        })?;

        let (entries, projects) = tokio::try_join!(
            self.store.list_entries(
                scope.org_id,
                EntryQuery {
                    user_id: Some(timesheet.user_id),
                    range: Some(DateRange::week_of(timesheet.week_start)),
                    ..Default::default()
                },
            ),
            self.store.list_projects(scope.org_id, true),
        )?;
        let projects = index_projects(projects);

        let rows = entries.iter().map(|entry| {
            vec![
                dates::format_date(entry.date),
                project_name(&projects, entry),
                dates::format_duration(entry.minutes),
                entry.description.clone().unwrap_or_default(),
                entry.deliverable_url.clone().unwrap_or_default(),
            ]
        });

        info!(
            "Timesheet {} exported by user_id: {} ({} entries)",
            id,
            scope.user_id,
            entries.len()
        );
        Ok(render(&TIMESHEET_HEADERS, rows))
    }

    /// Organization-wide entries between `start` and `end` inclusive,
    /// optionally narrowed to one user
    pub async fn range_csv(
        &self,
        actor: Option<&ActingProfile>,
        start: Date,
        end: Date,
        user_id: Option<Uuid>,
    ) -> AppResult<String> {
        let scope = gate::authorize(actor, &Command::ExportRange)?;
        if start > end {
            return Err(AppError::validation("Start date must not be after end date"));
        }

        let (entries, projects, profiles) = tokio::try_join!(
            self.store.list_entries(
                scope.org_id,
                EntryQuery {
                    user_id,
                    range: Some(DateRange::new(start, end)),
                    ..Default::default()
                },
            ),
            self.store.list_projects(scope.org_id, true),
            self.store.list_profiles(scope.org_id, false),
        )?;
        let projects = index_projects(projects);
        let profiles = index_profiles(profiles);

        let rows = entries.iter().map(|entry| {
            vec![
                dates::format_date(entry.date),
                user_name(&profiles, entry),
                project_name(&projects, entry),
                dates::format_duration(entry.minutes),
                entry.description.clone().unwrap_or_default(),
                entry.deliverable_url.clone().unwrap_or_default(),
            ]
        });

        info!(
            "Range {}..{} exported by user_id: {} ({} entries)",
            start,
            end,
            scope.user_id,
            entries.len()
        );
        Ok(render(&RANGE_HEADERS, rows))
    }
}

fn project_name(projects: &HashMap<Uuid, Project>, entry: &TimeEntry) -> String {
    projects
        .get(&entry.project_id)
        .map_or_else(|| UNKNOWN.to_string(), |p| p.name.clone())
}

fn user_name(profiles: &HashMap<Uuid, Profile>, entry: &TimeEntry) -> String {
    profiles
        .get(&entry.user_id)
        .map_or_else(|| UNKNOWN.to_string(), |p| p.full_name.clone())
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// Bare header line, then one fully quoted line per row
fn render<I>(headers: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut lines = vec![headers.join(",")];
    lines.extend(rows.into_iter().map(|row| {
        row.iter()
            .map(|cell| quote(cell))
            .collect::<Vec<_>>()
            .join(",")
    }));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Denial;
    use crate::model::{EntrySource, Role};
    use crate::services::testing::{self, Org};
    use crate::store::NewTimeEntry;
    use time::macros::date;

    async fn log(org: &Org, user_id: Uuid, project_id: Uuid, date: Date, minutes: i32, description: &str) {
        org.store
            .create_entry(NewTimeEntry {
                org_id: org.org_id,
                user_id,
                project_id,
                date,
                minutes,
                description: Some(description.to_string()),
                deliverable_url: None,
                source: EntrySource::Manual,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_render_quotes_cells_but_not_headers() {
        let csv = render(
            &["A", "B"],
            vec![vec!["say \"hi\"".to_string(), "x,y".to_string()]],
        );
        assert_eq!(csv, "A,B\n\"say \"\"hi\"\"\",\"x,y\"");
    }

    #[test]
    fn test_render_without_rows_is_header_only() {
        assert_eq!(render(&TIMESHEET_HEADERS, Vec::new()), "Date,Project,Hours,Description,Deliverable URL");
    }

    #[tokio::test]
    async fn test_timesheet_csv_lists_week_in_date_order() {
        let org = testing::org().await;
        let project = org.project("Website").await;
        let timesheet = org
            .store
            .get_or_create_timesheet(org.org_id, org.freelancer.id, date!(2024 - 01 - 01))
            .await
            .unwrap();
        log(&org, org.freelancer.id, project.id, date!(2024 - 01 - 03), 120, "Review").await;
        log(&org, org.freelancer.id, project.id, date!(2024 - 01 - 01), 90, "Build").await;
        log(&org, org.freelancer.id, project.id, date!(2024 - 01 - 08), 60, "Next week").await;

        let service = ExportService::new(org.store.clone());
        let csv = service
            .timesheet_csv(Some(&org.freelancer), timesheet.id)
            .await
            .unwrap();
        assert_eq!(
            csv,
            "Date,Project,Hours,Description,Deliverable URL\n\
             \"Jan 1, 2024\",\"Website\",\"1h 30m\",\"Build\",\"\"\n\
             \"Jan 3, 2024\",\"Website\",\"2h\",\"Review\",\"\""
        );

        // admins may export anyone's timesheet, other freelancers may not
        assert!(service.timesheet_csv(Some(&org.admin), timesheet.id).await.is_ok());
        let other = testing::member(&org.store, org.org_id, Role::Freelancer, "Carol").await;
        assert!(matches!(
            service.timesheet_csv(Some(&other), timesheet.id).await,
            Err(AppError::Unauthorized(Denial::NotOwner))
        ));
    }

    #[tokio::test]
    async fn test_range_csv_is_admin_only_and_filters_user() {
        let org = testing::org().await;
        let project = org.project("Website").await;
        log(&org, org.freelancer.id, project.id, date!(2024 - 01 - 02), 45, "Fix").await;
        log(&org, org.admin.id, project.id, date!(2024 - 01 - 02), 30, "Plan").await;
        log(&org, org.admin.id, project.id, date!(2024 - 02 - 01), 30, "Later").await;

        let service = ExportService::new(org.store.clone());
        assert!(matches!(
            service
                .range_csv(Some(&org.freelancer), date!(2024 - 01 - 01), date!(2024 - 01 - 31), None)
                .await,
            Err(AppError::Unauthorized(Denial::AdminRequired))
        ));
        assert!(matches!(
            service
                .range_csv(Some(&org.admin), date!(2024 - 01 - 31), date!(2024 - 01 - 01), None)
                .await,
            Err(AppError::Validation(_))
        ));

        let csv = service
            .range_csv(Some(&org.admin), date!(2024 - 01 - 01), date!(2024 - 01 - 31), None)
            .await
            .unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.starts_with("Date,User,Project,Hours,Description,Deliverable URL\n"));

        let csv = service
            .range_csv(
                Some(&org.admin),
                date!(2024 - 01 - 01),
                date!(2024 - 01 - 31),
                Some(org.freelancer.id),
            )
            .await
            .unwrap();
        assert_eq!(
            csv.lines().nth(1),
            Some("\"Jan 2, 2024\",\"Bob\",\"Website\",\"0h 45m\",\"Fix\",\"\"")
        );
        assert_eq!(csv.lines().count(), 2);
    }
}
