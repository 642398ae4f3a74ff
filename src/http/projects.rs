use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use uuid::Uuid;

use super::{Actor, AppState, Revalidate};
use crate::error::AppResult;
use crate::model::{Project, ProjectMemberDetail};
use crate::services::{MemberInput, ProjectInput};

#[derive(Debug, Default, Deserialize)]
pub struct ProjectListQuery {
    #[serde(default)]
    pub include_archived: bool,
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list).post(create))
        .route("/projects/assigned", get(assigned))
        .route("/projects/:id", put(update))
        .route("/projects/:id/archive", post(archive))
        .route("/projects/:id/restore", post(restore))
        .route("/projects/:id/members", get(members).post(add_member))
        .route("/projects/:id/members/:user_id", delete(remove_member))
}

async fn list(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ProjectListQuery>,
) -> AppResult<Json<Vec<Project>>> {
    let projects = state
        .projects
        .list(actor.profile(), query.include_archived)
        .await?;
    Ok(Json(projects))
}

async fn assigned(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<Project>>> {
    Ok(Json(state.projects.assigned(actor.profile()).await?))
}

async fn create(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<ProjectInput>,
) -> AppResult<impl IntoResponse> {
    let project = state.projects.create(actor.profile(), input).await?;
    Ok((StatusCode::CREATED, Revalidate::PROJECTS, Json(project)))
}

async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<ProjectInput>,
) -> AppResult<impl IntoResponse> {
    let project = state.projects.update(actor.profile(), id, input).await?;
    Ok((Revalidate::PROJECTS, Json(project)))
}

async fn archive(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let project = state.projects.archive(actor.profile(), id).await?;
    Ok((Revalidate::PROJECTS, Json(project)))
}

async fn restore(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let project = state.projects.restore(actor.profile(), id).await?;
    Ok((Revalidate::PROJECTS, Json(project)))
}

async fn members(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<ProjectMemberDetail>>> {
    Ok(Json(state.projects.members(actor.profile(), id).await?))
}

async fn add_member(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<MemberInput>,
) -> AppResult<impl IntoResponse> {
    let member = state.projects.add_member(actor.profile(), id, input).await?;
    Ok((StatusCode::CREATED, Revalidate::PROJECTS, Json(member)))
}

async fn remove_member(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<impl IntoResponse> {
    state
        .projects
        .remove_member(actor.profile(), id, user_id)
        .await?;
    Ok((StatusCode::NO_CONTENT, Revalidate::PROJECTS, ()))
}
