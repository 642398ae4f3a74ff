use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use time::Date;
use uuid::Uuid;

use super::{Actor, AppState, csv_headers, today};
use crate::error::AppResult;
use crate::services::DashboardStats;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub start: Date,
    pub end: Date,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/export", get(export_range))
}

async fn dashboard(State(state): State<AppState>, actor: Actor) -> AppResult<Json<DashboardStats>> {
    let stats = state.dashboard.stats(actor.profile(), today()).await?;
    Ok(Json(stats))
}

async fn export_range(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ExportQuery>,
) -> AppResult<impl IntoResponse> {
    let csv = state
        .export
        .range_csv(actor.profile(), query.start, query.end, query.user_id)
        .await?;
    let filename = format!("time-{}-to-{}.csv", query.start, query.end);
    Ok((csv_headers(&filename), csv))
}
