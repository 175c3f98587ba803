use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use super::{dto::CreateReportRequest, repo};
use crate::{
    error::{AppError, AppResult, MessageResponse},
    extract::ApiJson,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", post(create_report))
}

#[instrument(skip(state, payload))]
pub async fn create_report(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateReportRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let report = payload.validate()?;
    let id = match repo::insert_report(&state.db, &report).await {
        Ok(id) => id,
        Err(e) if repo::is_foreign_key_violation(&e) => {
            warn!(id_app = %report.id_app, "report for unknown application");
            return Err(AppError::validation("Unknown application."));
        }
        Err(e) => return Err(e.into()),
    };
    info!(%id, id_app = %report.id_app, "report created");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Report sent!")),
    ))
}
