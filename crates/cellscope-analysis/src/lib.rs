//! Deterministic derivations over rows fetched by `cellscope-kernel`.
//!
//! Everything here is a pure function of its inputs, which is what makes the
//! server-side query cache safe: identical inputs always produce identical
//! derived tables. Filtering, joining, and aggregation for the study figures
//! live in one place so every derived view applies the same rules.

use cellscope_kernel::{CellMetadata, CycleCapacity, VoltageSample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One long-life cell skews the color scale of every figure; the study plots
/// drop it everywhere.
pub const OUTLIER_FILE: &str = "cycler_data/2018-04-12_batch8_CH17.csv";

/// Open interval for plausible per-cycle discharge capacity (Ah).
pub const CAPACITY_WINDOW: (f64, f64) = (0.85, 1.5);

/// Open interval of voltages (V) where the discharge curves overlap cleanly.
pub const VOLTAGE_WINDOW: (f64, f64) = (2.03, 3.25);

/// Baseline and comparison cycles for the voltage-curve difference.
pub const BASELINE_CYCLE: i64 = 10;
pub const COMPARISON_CYCLE: i64 = 100;

/// Per-cycle maximum discharge capacity with the cell's cycle life attached.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CapacityFadePoint {
    pub file_name: String,
    pub cycle_index: i64,
    pub discharge_capacity: f64,
    pub cycle_index_end_of_life: i64,
}

/// Q_100 - Q_10 at one exactly-matching voltage.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VoltageDeltaPoint {
    pub file_name: String,
    pub voltage: f64,
    pub discharge_capacity_diff_100_10: f64,
    pub cycle_index_end_of_life: i64,
}

/// Sample variance of one cell's voltage-curve difference values.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CurveVariancePoint {
    pub file_name: String,
    pub voltage_curve_variance: f64,
    pub cycle_index_end_of_life: i64,
}

fn cycle_life_by_file(metadata: &[CellMetadata]) -> HashMap<&str, i64> {
    metadata
        .iter()
        .map(|m| (m.file_name.as_str(), m.cycle_index_end_of_life))
        .collect()
}

fn within_open(value: f64, window: (f64, f64)) -> bool {
    value > window.0 && value < window.1
}

/// Capacity-fade view: per-cycle maxima inner-joined with cycle life, capacity
/// window applied, outlier cell dropped. Input order (file, then cycle) is
/// preserved; files without metadata are dropped by the join.
pub fn capacity_fade(
    maxima: &[CycleCapacity],
    metadata: &[CellMetadata],
) -> Vec<CapacityFadePoint> {
    let life = cycle_life_by_file(metadata);
    maxima
        .iter()
        .filter(|m| m.file_name != OUTLIER_FILE)
        .filter(|m| within_open(m.discharge_capacity, CAPACITY_WINDOW))
        .filter_map(|m| {
            life.get(m.file_name.as_str()).map(|&eol| CapacityFadePoint {
                file_name: m.file_name.clone(),
                cycle_index: m.cycle_index,
                discharge_capacity: m.discharge_capacity,
                cycle_index_end_of_life: eol,
            })
        })
        .collect()
}

/// Equality join of the comparison cycle against the baseline cycle on
/// (file, voltage). Voltages must match exactly (bit-for-bit); rows without a
/// counterpart are dropped, never interpolated. Applies the voltage window
/// and the outlier exclusion, and attaches cycle life.
pub fn voltage_delta(
    baseline: &[VoltageSample],
    comparison: &[VoltageSample],
    metadata: &[CellMetadata],
) -> Vec<VoltageDeltaPoint> {
    let life = cycle_life_by_file(metadata);
    let baseline_by_key: HashMap<(&str, u64), f64> = baseline
        .iter()
        .map(|s| ((s.file_name.as_str(), s.voltage.to_bits()), s.discharge_capacity))
        .collect();
    comparison
        .iter()
        .filter(|s| s.file_name != OUTLIER_FILE)
        .filter(|s| within_open(s.voltage, VOLTAGE_WINDOW))
        .filter_map(|s| {
            let base = baseline_by_key.get(&(s.file_name.as_str(), s.voltage.to_bits()))?;
            let eol = life.get(s.file_name.as_str())?;
            Some(VoltageDeltaPoint {
                file_name: s.file_name.clone(),
                voltage: s.voltage,
                discharge_capacity_diff_100_10: s.discharge_capacity - base,
                cycle_index_end_of_life: *eol,
            })
        })
        .collect()
}

/// Sample variance (n - 1 denominator) of each file's difference values.
/// Files with fewer than two points are dropped, matching SQL `VARIANCE`
/// returning NULL for singleton groups. Output is sorted by file name.
pub fn curve_variance(deltas: &[VoltageDeltaPoint]) -> Vec<CurveVariancePoint> {
    let mut grouped: HashMap<&str, (Vec<f64>, i64)> = HashMap::new();
    for d in deltas {
        let entry = grouped
            .entry(d.file_name.as_str())
            .or_insert_with(|| (Vec::new(), d.cycle_index_end_of_life));
        entry.0.push(d.discharge_capacity_diff_100_10);
    }
    let mut out: Vec<CurveVariancePoint> = grouped
        .into_iter()
        .filter(|(_, (values, _))| values.len() >= 2)
        .map(|(file, (values, eol))| CurveVariancePoint {
            file_name: file.to_string(),
            voltage_curve_variance: sample_variance(&values),
            cycle_index_end_of_life: eol,
        })
        .collect();
    out.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    out
}

fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}
