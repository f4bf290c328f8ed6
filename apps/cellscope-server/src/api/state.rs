use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::responses::ApiError;
use crate::{study, AppState};

pub async fn healthz() -> Json<Value> {
    Json(json!({"ok": true}))
}

pub async fn state_files(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let files = study::known_files(&state).await?;
    Ok(Json(json!({
        "count": files.len(),
        "items": files.as_ref(),
    })))
}

pub async fn state_cache(State(state): State<AppState>) -> Json<Value> {
    let stats = state.cache().stats();
    Json(json!({"cache": stats}))
}
