use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use time::{Date, format_description::FormatItem, macros::format_description};
use uuid::Uuid;

use super::{Actor, AppState, Revalidate, csv_headers, today};
use crate::error::{AppError, AppResult};
use crate::model::{Timesheet, TimesheetComment, TimesheetStatus, TimesheetWithUser};
use crate::services::{TimesheetDetails, WeekView};

const PATH_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Default, Deserialize)]
pub struct TimesheetListQuery {
    #[serde(default)]
    pub status: Option<TimesheetStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(alias = "comment")]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct ChangesRequested {
    pub timesheet: Timesheet,
    pub comment: TimesheetComment,
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/timesheets", get(list))
        .route("/timesheets/current", get(current_week))
        .route("/timesheets/week/:date", get(week))
        .route("/timesheets/:id", get(details))
        .route("/timesheets/:id/summary", put(update_summary))
        .route("/timesheets/:id/submit", post(submit))
        .route("/timesheets/:id/approve", post(approve))
        .route("/timesheets/:id/request-changes", post(request_changes))
        .route("/timesheets/:id/comments", post(add_comment))
        .route("/timesheets/:id/export", get(export))
}

async fn list(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<TimesheetListQuery>,
) -> AppResult<Json<Vec<TimesheetWithUser>>> {
    let timesheets = state.timesheets.list(actor.profile(), query.status).await?;
    Ok(Json(timesheets))
}

async fn current_week(State(state): State<AppState>, actor: Actor) -> AppResult<Json<WeekView>> {
    Ok(Json(state.timesheets.current_week(actor.profile(), today()).await?))
}

async fn week(
    State(state): State<AppState>,
    actor: Actor,
    Path(date): Path<String>,
) -> AppResult<Json<WeekView>> {
    let date = Date::parse(&date, PATH_DATE)
        .map_err(|_| AppError::validation("Dates must look like 2024-01-31"))?;
    Ok(Json(state.timesheets.week(actor.profile(), date).await?))
}

async fn details(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TimesheetDetails>> {
    Ok(Json(state.timesheets.details(actor.profile(), id).await?))
}

async fn update_summary(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<SummaryRequest>,
) -> AppResult<impl IntoResponse> {
    let timesheet = state
        .timesheets
        .update_summary(actor.profile(), id, request.summary)
        .await?;
    Ok((Revalidate::TIMESHEETS, Json(timesheet)))
}

async fn submit(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let timesheet = state.timesheets.submit(actor.profile(), id).await?;
    Ok((Revalidate::TIMESHEETS, Json(timesheet)))
}

async fn approve(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let timesheet = state.timesheets.approve(actor.profile(), id).await?;
    Ok((Revalidate::TIMESHEETS, Json(timesheet)))
}

async fn request_changes(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let (timesheet, comment) = state
        .timesheets
        .request_changes(actor.profile(), id, &request.body)
        .await?;
    Ok((Revalidate::TIMESHEETS, Json(ChangesRequested { timesheet, comment })))
}

async fn add_comment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<CommentRequest>,
) -> AppResult<impl IntoResponse> {
    let comment = state
        .timesheets
        .add_comment(actor.profile(), id, &request.body)
        .await?;
    Ok((StatusCode::CREATED, Revalidate::TIMESHEETS, Json(comment)))
}

async fn export(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let csv = state.export.timesheet_csv(actor.profile(), id).await?;
    Ok((csv_headers(&format!("timesheet-{}.csv", id)), csv))
}
