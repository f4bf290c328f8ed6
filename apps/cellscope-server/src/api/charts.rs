use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::charts::{self, ChartSpec, TimeSeriesKind};
use crate::responses::ApiError;
use crate::{study, AppState};

#[derive(Debug, Deserialize)]
pub struct TimeSeriesParams {
    file: Option<String>,
    cycle: Option<String>,
}

/// One of the four raw per-cycle views. Empty data is a valid chart; only a
/// failing query is an error.
pub async fn chart_time_series(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<TimeSeriesParams>,
) -> Result<Json<ChartSpec>, ApiError> {
    let kind = TimeSeriesKind::from_slug(&kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown time-series chart '{}'", kind)))?;
    let file = params
        .file
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing 'file' query parameter".into()))?;
    let cycle: i64 = params
        .cycle
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("missing 'cycle' query parameter".into()))?
        .parse()
        .map_err(|_| ApiError::BadRequest("'cycle' must be an integer".into()))?;
    if cycle < 0 {
        return Err(ApiError::BadRequest("'cycle' must be non-negative".into()));
    }
    let rows = study::time_series(&state, &file, cycle).await?;
    Ok(Json(charts::time_series_spec(kind, rows.as_ref().clone())))
}

pub async fn chart_discharge_over_cycle(
    State(state): State<AppState>,
) -> Result<Json<ChartSpec>, ApiError> {
    let rows = study::discharge_over_cycle(&state).await?;
    Ok(Json(charts::discharge_over_cycle_spec(rows.as_ref().clone())))
}

pub async fn chart_voltage_delta(
    State(state): State<AppState>,
) -> Result<Json<ChartSpec>, ApiError> {
    let rows = study::voltage_delta(&state).await?;
    Ok(Json(charts::voltage_delta_spec(rows.as_ref().clone())))
}

pub async fn chart_curve_variance(
    State(state): State<AppState>,
) -> Result<Json<ChartSpec>, ApiError> {
    let rows = study::curve_variance(&state).await?;
    Ok(Json(charts::curve_variance_spec(rows.as_ref().clone())))
}
