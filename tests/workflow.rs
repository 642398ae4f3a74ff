use std::sync::Arc;
use time::{Date, macros::date};
use uuid::Uuid;

use chrona::error::{AppError, Denial};
use chrona::model::{ActingProfile, Role, TimesheetStatus};
use chrona::services::{EntryInput, MemberInput, ProjectInput, ProjectService, EntryService, TimesheetService};
use chrona::store::{EntryQuery, MemoryStore, NewProfile, Store};

const WEEK: Date = date!(2024 - 01 - 01);

struct Workspace {
    store: Arc<dyn Store>,
    org_id: Uuid,
    admin: ActingProfile,
    freelancer: ActingProfile,
    project_id: Uuid,
}

async fn profile(store: &Arc<dyn Store>, org_id: Uuid, role: Role, name: &str) -> ActingProfile {
    store
        .create_profile(NewProfile {
            id: Uuid::new_v4(),
            org_id: Some(org_id),
            role,
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
        })
        .await
        .unwrap()
        .acting()
}

async fn workspace() -> Workspace {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let org_id = store.create_organization("Acme").await.unwrap().id;
    let admin = profile(&store, org_id, Role::Admin, "Alice").await;
    let freelancer = profile(&store, org_id, Role::Freelancer, "Bob").await;

    let projects = ProjectService::new(store.clone());
    let project = projects
        .create(
            Some(&admin),
            ProjectInput {
                name: "Website".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
    projects
        .add_member(
            Some(&admin),
            project.id,
            MemberInput {
                user_id: freelancer.id,
                hourly_rate: Some(50.0),
            },
        )
        .await
        .unwrap();

    Workspace {
        store,
        org_id,
        admin,
        freelancer,
        project_id: project.id,
    }
}

impl Workspace {
    async fn log(&self, date: Date, hours: f64) -> Uuid {
        EntryService::new(self.store.clone())
            .create(
                Some(&self.freelancer),
                EntryInput {
                    project_id: self.project_id.to_string(),
                    date,
                    hours,
                    description: Some("Work".to_string()),
                    deliverable_url: None,
                },
            )
            .await
            .unwrap()
            .id
    }
}

#[tokio::test]
async fn test_week_submitted_approved_then_locked() {
    let ws = workspace().await;
    ws.log(date!(2024 - 01 - 01), 2.0).await;
    ws.log(date!(2024 - 01 - 02), 1.5).await;
    ws.log(date!(2024 - 01 - 04), 0.75).await;

    let timesheets = TimesheetService::new(ws.store.clone());
    let week = timesheets.week(Some(&ws.freelancer), WEEK).await.unwrap();
    assert_eq!(week.aggregate.total_minutes, 255);
    assert!(week.can_edit);

    let submitted = timesheets
        .submit(Some(&ws.freelancer), week.timesheet.id)
        .await
        .unwrap();
    assert_eq!(submitted.status, TimesheetStatus::Submitted);
    assert!(submitted.submitted_at.is_some());

    let linked = ws
        .store
        .list_entries(
            ws.org_id,
            EntryQuery {
                user_id: Some(ws.freelancer.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(linked.iter().all(|e| e.timesheet_id == Some(week.timesheet.id)));

    let approved = timesheets
        .approve(Some(&ws.admin), week.timesheet.id)
        .await
        .unwrap();
    assert_eq!(approved.status, TimesheetStatus::Approved);
    assert_eq!(approved.approved_by, Some(ws.admin.id));

    let err = timesheets
        .submit(Some(&ws.freelancer), week.timesheet.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            status: TimesheetStatus::Approved,
            ..
        }
    ));
}

#[tokio::test]
async fn test_freelancer_cannot_approve() {
    let ws = workspace().await;
    ws.log(date!(2024 - 01 - 03), 1.0).await;

    let timesheets = TimesheetService::new(ws.store.clone());
    let timesheet = timesheets
        .get_or_create(Some(&ws.freelancer), WEEK)
        .await
        .unwrap();
    timesheets
        .submit(Some(&ws.freelancer), timesheet.id)
        .await
        .unwrap();

    assert!(matches!(
        timesheets.approve(Some(&ws.freelancer), timesheet.id).await,
        Err(AppError::Unauthorized(Denial::AdminRequired))
    ));
    let details = timesheets
        .details(Some(&ws.admin), timesheet.id)
        .await
        .unwrap();
    assert_eq!(details.timesheet.status, TimesheetStatus::Submitted);
    assert!(details.can_review);
}

#[tokio::test]
async fn test_changes_requested_round_trip_keeps_links() {
    let ws = workspace().await;
    let first = ws.log(date!(2024 - 01 - 01), 1.0).await;

    let timesheets = TimesheetService::new(ws.store.clone());
    let timesheet = timesheets
        .get_or_create(Some(&ws.freelancer), WEEK)
        .await
        .unwrap();
    timesheets
        .submit(Some(&ws.freelancer), timesheet.id)
        .await
        .unwrap();

    assert!(matches!(
        timesheets
            .request_changes(Some(&ws.admin), timesheet.id, "   ")
            .await,
        Err(AppError::Validation(_))
    ));
    let (sent_back, comment) = timesheets
        .request_changes(Some(&ws.admin), timesheet.id, "Split the Tuesday entry")
        .await
        .unwrap();
    assert_eq!(sent_back.status, TimesheetStatus::ChangesRequested);
    assert_eq!(comment.author_id, ws.admin.id);

    let second = ws.log(date!(2024 - 01 - 05), 2.0).await;
    let resubmitted = timesheets
        .submit(Some(&ws.freelancer), timesheet.id)
        .await
        .unwrap();
    assert_eq!(resubmitted.status, TimesheetStatus::Submitted);

    let details = timesheets
        .details(Some(&ws.freelancer), timesheet.id)
        .await
        .unwrap();
    assert_eq!(details.entries.len(), 2);
    assert_eq!(details.comments.len(), 1);
    for id in [first, second] {
        let entry = ws.store.get_entry(ws.org_id, id).await.unwrap().unwrap();
        assert_eq!(entry.timesheet_id, Some(timesheet.id));
    }
}

#[tokio::test]
async fn test_duplicate_assignment_leaves_original_membership() {
    let ws = workspace().await;
    let projects = ProjectService::new(ws.store.clone());

    let err = projects
        .add_member(
            Some(&ws.admin),
            ws.project_id,
            MemberInput {
                user_id: ws.freelancer.id,
                hourly_rate: Some(80.0),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let members = projects.members(Some(&ws.admin), ws.project_id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].member.hourly_rate, Some(50.0));
}

#[tokio::test]
async fn test_other_organization_is_invisible() {
    let ws = workspace().await;
    let other_org = ws.store.create_organization("Globex").await.unwrap().id;
    let outsider = profile(&ws.store, other_org, Role::Admin, "Eve").await;

    let timesheets = TimesheetService::new(ws.store.clone());
    let timesheet = timesheets
        .get_or_create(Some(&ws.freelancer), WEEK)
        .await
        .unwrap();

    assert!(matches!(
        timesheets.details(Some(&outsider), timesheet.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        timesheets.approve(Some(&outsider), timesheet.id).await,
        Err(AppError::NotFound(_))
    ));
}
