//! The study's five data operations, composed from the kernel's raw queries
//! and the analysis crate's derivations, memoized through the query cache.

use anyhow::Result;
use cellscope_analysis::{self as analysis, VoltageDeltaPoint};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::app_state::AppState;
use crate::query_cache::QueryKey;

fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(Into::into))
        .collect()
}

/// Distinct file identifiers for the study's source tag, database order.
pub async fn known_files(state: &AppState) -> Result<Arc<Vec<Value>>> {
    state
        .cache()
        .get_or_compute(QueryKey::op("known_files"), || async {
            let files = state.store().list_files_async(state.source_tag()).await?;
            Ok(files.into_iter().map(Value::String).collect())
        })
        .await
}

/// Raw cycler samples for one file and cycle. An unknown file or cycle is an
/// empty table, not an error.
pub async fn time_series(state: &AppState, file_name: &str, cycle_index: i64) -> Result<Arc<Vec<Value>>> {
    state
        .cache()
        .get_or_compute(
            QueryKey::with_args("time_series", file_name, cycle_index),
            || async {
                let samples = state.store().time_series_async(file_name, cycle_index).await?;
                debug!(file = file_name, cycle = cycle_index, rows = samples.len(), "time series fetched");
                to_rows(&samples)
            },
        )
        .await
}

/// Per-cycle maximum discharge capacity with cycle life, capacity window and
/// outlier exclusion applied.
pub async fn discharge_over_cycle(state: &AppState) -> Result<Arc<Vec<Value>>> {
    state
        .cache()
        .get_or_compute(QueryKey::op("discharge_over_cycle"), || async {
            let tag = state.source_tag();
            let maxima = state.store().max_discharge_by_cycle_async(tag).await?;
            let metadata = state.store().cell_metadata_async(tag).await?;
            let points = analysis::capacity_fade(&maxima, &metadata);
            debug!(rows = points.len(), "capacity fade derived");
            to_rows(&points)
        })
        .await
}

async fn voltage_delta_points(state: &AppState) -> Result<Vec<VoltageDeltaPoint>> {
    let tag = state.source_tag();
    let baseline = state
        .store()
        .voltage_series_at_cycle_async(tag, analysis::BASELINE_CYCLE)
        .await?;
    let comparison = state
        .store()
        .voltage_series_at_cycle_async(tag, analysis::COMPARISON_CYCLE)
        .await?;
    let metadata = state.store().cell_metadata_async(tag).await?;
    Ok(analysis::voltage_delta(&baseline, &comparison, &metadata))
}

/// Q_100 - Q_10 per exactly-matching voltage, windowed and outlier-free.
pub async fn voltage_delta(state: &AppState) -> Result<Arc<Vec<Value>>> {
    state
        .cache()
        .get_or_compute(QueryKey::op("voltage_delta"), || async {
            let points = voltage_delta_points(state).await?;
            debug!(rows = points.len(), "voltage delta derived");
            to_rows(&points)
        })
        .await
}

/// Sample variance of each cell's voltage-curve difference.
pub async fn curve_variance(state: &AppState) -> Result<Arc<Vec<Value>>> {
    state
        .cache()
        .get_or_compute(QueryKey::op("curve_variance"), || async {
            let deltas = voltage_delta_points(state).await?;
            let points = analysis::curve_variance(&deltas);
            debug!(rows = points.len(), "curve variance derived");
            to_rows(&points)
        })
        .await
}
