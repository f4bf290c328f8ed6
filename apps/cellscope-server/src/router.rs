use axum::{routing::get, Router};

use crate::{api, AppState};

pub mod paths {
    pub const HEALTHZ: &str = "/healthz";
    pub const STATE_FILES: &str = "/state/files";
    pub const STATE_CACHE: &str = "/state/cache";
    pub const CHART_TIME_SERIES: &str = "/charts/time-series/{kind}";
    pub const CHART_DISCHARGE_OVER_CYCLE: &str = "/charts/discharge-over-cycle";
    pub const CHART_VOLTAGE_DELTA: &str = "/charts/voltage-delta";
    pub const CHART_CURVE_VARIANCE: &str = "/charts/curve-variance";
}

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route(paths::HEALTHZ, get(api::state::healthz))
        .route(paths::STATE_FILES, get(api::state::state_files))
        .route(paths::STATE_CACHE, get(api::state::state_cache))
        .route(paths::CHART_TIME_SERIES, get(api::charts::chart_time_series))
        .route(
            paths::CHART_DISCHARGE_OVER_CYCLE,
            get(api::charts::chart_discharge_over_cycle),
        )
        .route(paths::CHART_VOLTAGE_DELTA, get(api::charts::chart_voltage_delta))
        .route(paths::CHART_CURVE_VARIANCE, get(api::charts::chart_curve_variance))
}
