use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use uuid::Uuid;

use super::{Actor, AppState, Revalidate};
use crate::error::AppResult;
use crate::model::TimeEntryDetail;
use crate::services::{EntryFilter, EntryInput};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/entries", get(list_own).post(create))
        .route("/entries/all", get(list_all))
        .route("/entries/:id", put(update).delete(remove))
}

async fn list_own(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<EntryFilter>,
) -> AppResult<Json<Vec<TimeEntryDetail>>> {
    let entries = state.entries.list_own(actor.profile(), filter).await?;
    Ok(Json(entries))
}

async fn list_all(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<EntryFilter>,
) -> AppResult<Json<Vec<TimeEntryDetail>>> {
    let entries = state.entries.list_all(actor.profile(), filter).await?;
    Ok(Json(entries))
}

async fn create(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<EntryInput>,
) -> AppResult<impl IntoResponse> {
    let entry = state.entries.create(actor.profile(), input).await?;
    Ok((StatusCode::CREATED, Revalidate::ENTRIES, Json(entry)))
}

async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<EntryInput>,
) -> AppResult<impl IntoResponse> {
    let entry = state.entries.update(actor.profile(), id, input).await?;
    Ok((Revalidate::ENTRIES, Json(entry)))
}

async fn remove(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    state.entries.delete(actor.profile(), id).await?;
    Ok((StatusCode::NO_CONTENT, Revalidate::ENTRIES, ()))
}
