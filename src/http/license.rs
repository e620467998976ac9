use crate::http::AppState;
use crate::license::LicenseStatus;
use axum::extract::State;
use axum::Json;

pub async fn status(State(state): State<AppState>) -> Json<LicenseStatus> {
    Json(state.license.status().await)
}

/// Accepts the raw license blob as the request body (`text/plain` or
/// unspecified content type -- the blob has no internal structure an
/// HTTP-level content type would describe).
pub async fn upload(State(state): State<AppState>, body: String) -> crate::error::AppResult<Json<LicenseStatus>> {
    let status = state.license.install(body.trim()).await?;
    Ok(Json(status))
}
