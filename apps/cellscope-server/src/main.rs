use cellscope_kernel::Store;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod charts;
mod config;
mod query_cache;
mod responses;
mod router;
mod study;

pub(crate) use app_state::AppState;

use query_cache::QueryCache;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let db_path = config::db_path();
    let store = Store::open(&db_path)?;
    info!(db = %store.db_path().display(), "store opened");

    let state = AppState::new(store, QueryCache::from_env(), config::source_tag());
    let app = router::build_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config::bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "cellscope server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use crate::charts::TimeSeriesKind;
    use crate::router::paths;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use cellscope_analysis::{BASELINE_CYCLE, COMPARISON_CYCLE, OUTLIER_FILE};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    const TAG: &str = "test_tag";

    fn build_state(dir: &Path) -> AppState {
        let store = Store::open(dir).expect("open store for tests");
        AppState::new(
            store,
            QueryCache::new(16, Duration::from_secs(60)),
            TAG.to_string(),
        )
    }

    fn app(state: AppState) -> Router {
        router::build_router().with_state(state)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = resp.status();
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn empty_selection_renders_empty_charts_not_errors() {
        let tmp = tempdir().unwrap();
        let state = build_state(tmp.path());
        let app = app(state);
        for kind in TimeSeriesKind::ALL {
            let uri = format!("/charts/time-series/{}?file=A&cycle=5", kind.slug());
            let (status, body) = get_json(&app, &uri).await;
            assert_eq!(status, StatusCode::OK, "kind {}", kind.slug());
            assert_eq!(body["rows"].as_array().map(|a| a.len()), Some(0));
            assert_eq!(body["color"], "step_type");
        }
    }

    #[tokio::test]
    async fn time_series_chart_returns_samples() {
        let tmp = tempdir().unwrap();
        let state = build_state(tmp.path());
        state
            .store()
            .insert_time_series_sample("a.csv", 100, 0.0, 3.3, 1.1, "charge", 0.0, 0.2, TAG)
            .unwrap();
        state
            .store()
            .insert_time_series_sample("a.csv", 100, 1.0, 3.0, -1.1, "discharge", 1.05, 0.0, TAG)
            .unwrap();
        let app = app(state);
        let (status, body) = get_json(&app, "/charts/time-series/voltage?file=a.csv&cycle=100").await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["step_type"], "charge");
        assert_eq!(body["y"], "voltage");
        assert_eq!(body["labels"]["voltage"], "Voltage (V)");
    }

    #[tokio::test]
    async fn malformed_chart_requests_are_bad_requests() {
        let tmp = tempdir().unwrap();
        let app = app(build_state(tmp.path()));
        let (status, _) = get_json(&app, "/charts/time-series/voltage?cycle=5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(&app, "/charts/time-series/voltage?file=a.csv").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(&app, "/charts/time-series/voltage?file=a.csv&cycle=ten").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(&app, "/charts/time-series/voltage?file=a.csv&cycle=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = get_json(&app, "/charts/time-series/temperature?file=a.csv&cycle=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn discharge_over_cycle_applies_window_and_outlier() {
        let tmp = tempdir().unwrap();
        let state = build_state(tmp.path());
        let store = state.store();
        store.insert_cell_metadata("a.csv", 500, TAG).unwrap();
        store.insert_cell_metadata(OUTLIER_FILE, 2000, TAG).unwrap();
        store
            .insert_time_series_sample("a.csv", 1, 0.0, 3.0, -1.1, "discharge", 1.05, 0.0, TAG)
            .unwrap();
        store
            .insert_time_series_sample("a.csv", 2, 0.0, 3.0, -1.1, "discharge", 2.0, 0.0, TAG)
            .unwrap();
        store
            .insert_time_series_sample(OUTLIER_FILE, 1, 0.0, 3.0, -1.1, "discharge", 1.0, 0.0, TAG)
            .unwrap();
        let app = app(state);
        let (status, body) = get_json(&app, paths::CHART_DISCHARGE_OVER_CYCLE).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["file_name"], "a.csv");
        assert_eq!(rows[0]["cycle_index_end_of_life"], 500);
        for row in rows {
            let q = row["discharge_capacity"].as_f64().unwrap();
            assert!(q > 0.85 && q < 1.5);
            assert_ne!(row["file_name"], OUTLIER_FILE);
        }
    }

    #[tokio::test]
    async fn voltage_delta_and_variance_share_the_same_join() {
        let tmp = tempdir().unwrap();
        let state = build_state(tmp.path());
        let store = state.store();
        store.insert_cell_metadata("a.csv", 500, TAG).unwrap();
        for (v, q10, q100) in [(2.5, 0.0, 1.0), (2.6, 0.0, 2.0), (2.7, 0.0, 3.0)] {
            store
                .insert_voltage_sample("a.csv", BASELINE_CYCLE, v, q10, TAG)
                .unwrap();
            store
                .insert_voltage_sample("a.csv", COMPARISON_CYCLE, v, q100, TAG)
                .unwrap();
        }
        // Comparison-only voltage; the exact-match join must drop it.
        store
            .insert_voltage_sample("a.csv", COMPARISON_CYCLE, 2.8, 9.0, TAG)
            .unwrap();
        let app = app(state);

        let (status, body) = get_json(&app, paths::CHART_VOLTAGE_DELTA).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            let v = row["voltage"].as_f64().unwrap();
            assert!(v > 2.03 && v < 3.25);
        }

        let (status, body) = get_json(&app, paths::CHART_CURVE_VARIANCE).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        // diffs [1, 2, 3] -> sample variance 1.0
        let variance = rows[0]["voltage_curve_variance"].as_f64().unwrap();
        assert!((variance - 1.0).abs() < 1e-9);
        assert!(body["log_x"].as_bool().unwrap());
        assert!(body["log_y"].as_bool().unwrap());
    }

    #[tokio::test]
    async fn state_endpoints_report_files_and_cache() {
        let tmp = tempdir().unwrap();
        let state = build_state(tmp.path());
        state
            .store()
            .insert_time_series_sample("a.csv", 1, 0.0, 3.3, 1.1, "charge", 0.0, 0.2, TAG)
            .unwrap();
        let app = app(state);

        let (status, _) = get_json(&app, paths::HEALTHZ).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get_json(&app, paths::STATE_FILES).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["items"][0], "a.csv");

        // Second fetch of the same derived view should be served from cache.
        let _ = get_json(&app, "/charts/time-series/current?file=a.csv&cycle=1").await;
        let _ = get_json(&app, "/charts/time-series/current?file=a.csv&cycle=1").await;
        let (status, body) = get_json(&app, paths::STATE_CACHE).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["cache"]["hits"].as_u64().unwrap() >= 1);
        assert!(body["cache"]["enabled"].as_bool().unwrap());
        assert_eq!(body["cache"]["ttl_secs"], 60);
    }
}
