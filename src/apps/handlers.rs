use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{SubmitApplicationRequest, SubmitApplicationResponse},
    repo::{self, Application},
};
use crate::{error::AppResult, extract::ApiJson, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_applications))
        .route("/submit", post(submit_application))
}

#[instrument(skip(state))]
pub async fn list_applications(State(state): State<AppState>) -> AppResult<Json<Vec<Application>>> {
    let apps = repo::list_active(&state.db).await?;
    Ok(Json(apps))
}

#[instrument(skip(state, payload))]
pub async fn submit_application(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SubmitApplicationRequest>,
) -> AppResult<(StatusCode, Json<SubmitApplicationResponse>)> {
    let submission = payload.validate()?;
    let id = repo::insert_submission(&state.db, &submission).await?;
    info!(%id, nama = %submission.nama, "application submitted");
    Ok((
        StatusCode::CREATED,
        Json(SubmitApplicationResponse {
            message: "Application submitted!".into(),
            id,
        }),
    ))
}
