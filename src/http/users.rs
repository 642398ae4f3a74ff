use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use uuid::Uuid;

use super::{Actor, AppState, Revalidate};
use crate::error::AppResult;
use crate::model::{Profile, Role};
use crate::services::SettingsInput;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub email: String,
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list))
        .route("/users/assign", post(assign_to_org))
        .route("/users/:id/role", put(update_role))
        .route("/users/:id/status", put(update_status))
        .route("/settings", put(update_settings))
}

async fn list(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.users.list(actor.profile()).await?))
}

async fn update_role(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<RoleRequest>,
) -> AppResult<impl IntoResponse> {
    let profile = state
        .users
        .update_role(actor.profile(), id, request.role)
        .await?;
    Ok((Revalidate::USERS, Json(profile)))
}

async fn update_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> AppResult<impl IntoResponse> {
    let profile = state
        .users
        .update_status(actor.profile(), id, request.is_active)
        .await?;
    Ok((Revalidate::USERS, Json(profile)))
}

async fn assign_to_org(
    State(state): State<AppState>,
    actor: Actor,
    Json(request): Json<AssignRequest>,
) -> AppResult<impl IntoResponse> {
    let profile = state
        .users
        .assign_to_org(actor.profile(), &request.email)
        .await?;
    Ok((Revalidate::USERS, Json(profile)))
}

async fn update_settings(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<SettingsInput>,
) -> AppResult<Json<Profile>> {
    Ok(Json(state.users.update_settings(actor.profile(), input).await?))
}
