//! JSON API over the services.
//!
//! Handlers resolve the bearer token to an [`Actor`] and hand it to the
//! service untouched; the gate inside each service decides. Mutations
//! name the views they invalidate in the `x-chrona-revalidate` header.

mod auth;
mod dashboard;
mod entries;
mod extract;
mod projects;
mod timesheets;
mod users;

pub use extract::{Actor, BearerToken};

use axum::{
    Router,
    http::{HeaderName, HeaderValue, header},
    response::{IntoResponseParts, ResponseParts},
};
use std::convert::Infallible;
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthService, JwtConfig};
use crate::services::{
    DashboardService, EntryService, ExportService, ProjectService, TimesheetService, UserService,
};
use crate::store::Store;

pub const REVALIDATE_HEADER: HeaderName = HeaderName::from_static("x-chrona-revalidate");

const ENTRY_VIEWS: &str = "/app/time,/app/dashboard";
const TIMESHEET_VIEWS: &str = "/app/timesheets,/app/dashboard";
const PROJECT_VIEWS: &str = "/app/projects";
const USER_VIEWS: &str = "/app/users";

/// Views a successful mutation makes stale
#[derive(Debug, Clone, Copy)]
pub struct Revalidate(&'static str);

impl Revalidate {
    pub const ENTRIES: Revalidate = Revalidate(ENTRY_VIEWS);
    pub const TIMESHEETS: Revalidate = Revalidate(TIMESHEET_VIEWS);
    pub const PROJECTS: Revalidate = Revalidate(PROJECT_VIEWS);
    pub const USERS: Revalidate = Revalidate(USER_VIEWS);
}

impl IntoResponseParts for Revalidate {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.headers_mut()
            .insert(REVALIDATE_HEADER, HeaderValue::from_static(self.0));
        Ok(res)
    }
}

/// Shared handles for every handler
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub dashboard: Arc<DashboardService>,
    pub entries: Arc<EntryService>,
    pub export: Arc<ExportService>,
    pub projects: Arc<ProjectService>,
    pub timesheets: Arc<TimesheetService>,
    pub users: Arc<UserService>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, jwt_config: JwtConfig) -> Self {
        Self {
            auth: Arc::new(AuthService::new(store.clone(), jwt_config)),
            dashboard: Arc::new(DashboardService::new(store.clone())),
            entries: Arc::new(EntryService::new(store.clone())),
            export: Arc::new(ExportService::new(store.clone())),
            projects: Arc::new(ProjectService::new(store.clone())),
            timesheets: Arc::new(TimesheetService::new(store.clone())),
            users: Arc::new(UserService::new(store)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(dashboard::routes())
        .merge(projects::routes())
        .merge(entries::routes())
        .merge(timesheets::routes())
        .merge(users::routes());

    Router::new()
        .nest("/auth", auth::routes())
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive().expose_headers([REVALIDATE_HEADER, header::CONTENT_DISPOSITION]))
        .with_state(state)
}

/// Calendar day the server considers "today"
pub(crate) fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Header pair for a CSV download
pub(crate) fn csv_headers(filename: &str) -> [(HeaderName, String); 2] {
    [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ]
}
