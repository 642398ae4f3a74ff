use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::{AppState, BearerToken};
use crate::auth::SignUpMetadata;
use crate::error::{AppError, AppResult, Denial};
use crate::model::{CurrentUser, Profile};

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub metadata: SignUpMetadata,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: CurrentUser,
    pub profile: Profile,
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .route("/signout", post(sign_out))
        .route("/me", get(me))
}

async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> AppResult<impl IntoResponse> {
    let session = state
        .auth
        .sign_up(&request.email, &request.password, request.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> AppResult<impl IntoResponse> {
    let session = state.auth.sign_in(&request.email, &request.password).await?;
    Ok(Json(session))
}

async fn sign_out(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> AppResult<StatusCode> {
    if let Some(token) = token {
        state.auth.sign_out(&token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn me(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> AppResult<Json<MeResponse>> {
    let token = token.ok_or(AppError::Unauthorized(Denial::NoSession))?;
    let (user, profile) = state
        .auth
        .whoami(&token)
        .await?
        .ok_or(AppError::Unauthorized(Denial::NoSession))?;
    Ok(Json(MeResponse { user, profile }))
}
