//! Scatter-plot specifications for the study figures.
//!
//! A chart is fully described by its data rows plus the value mappings below;
//! any charting consumer that accepts this shape can render it. No
//! computation happens here.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const COLOR_SCALE: &str = "RdBu";

#[derive(Debug, Serialize, Clone)]
pub struct ChartSpec {
    pub rows: Vec<Value>,
    pub x: &'static str,
    pub y: &'static str,
    pub color: &'static str,
    pub color_scale: &'static str,
    pub width: u32,
    pub height: u32,
    pub labels: BTreeMap<&'static str, &'static str>,
    pub title: &'static str,
    pub log_x: bool,
    pub log_y: bool,
}

/// The four per-cycle raw views, colored by step type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSeriesKind {
    Current,
    Voltage,
    DischargeCapacity,
    ChargeCapacity,
}

impl TimeSeriesKind {
    pub const ALL: [TimeSeriesKind; 4] = [
        TimeSeriesKind::Current,
        TimeSeriesKind::Voltage,
        TimeSeriesKind::DischargeCapacity,
        TimeSeriesKind::ChargeCapacity,
    ];

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "current" => Some(Self::Current),
            "voltage" => Some(Self::Voltage),
            "discharge-capacity" => Some(Self::DischargeCapacity),
            "charge-capacity" => Some(Self::ChargeCapacity),
            _ => None,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Voltage => "voltage",
            Self::DischargeCapacity => "discharge-capacity",
            Self::ChargeCapacity => "charge-capacity",
        }
    }

    fn y(&self) -> &'static str {
        match self {
            Self::Current => "cell_current",
            Self::Voltage => "voltage",
            Self::DischargeCapacity => "discharge_capacity",
            Self::ChargeCapacity => "charge_capacity",
        }
    }

    fn y_label(&self) -> &'static str {
        match self {
            Self::Current => "Current (A)",
            Self::Voltage => "Voltage (V)",
            Self::DischargeCapacity => "Discharge Capacity (Ah)",
            Self::ChargeCapacity => "Charge Capacity (Ah)",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Current => "Current",
            Self::Voltage => "Voltage",
            Self::DischargeCapacity => "Discharge Capacity",
            Self::ChargeCapacity => "Charge Capacity",
        }
    }
}

pub fn time_series_spec(kind: TimeSeriesKind, rows: Vec<Value>) -> ChartSpec {
    let mut labels = BTreeMap::new();
    labels.insert("test_time", "Test Time (s)");
    labels.insert(kind.y(), kind.y_label());
    ChartSpec {
        rows,
        x: "test_time",
        y: kind.y(),
        color: "step_type",
        color_scale: COLOR_SCALE,
        width: 600,
        height: 300,
        labels,
        title: kind.title(),
        log_x: false,
        log_y: false,
    }
}

pub fn discharge_over_cycle_spec(rows: Vec<Value>) -> ChartSpec {
    let mut labels = BTreeMap::new();
    labels.insert("cycle_index", "Cycle Index");
    labels.insert("discharge_capacity", "Discharge Capacity (Ah)");
    labels.insert("cycle_index_end_of_life", "Cycle life");
    ChartSpec {
        rows,
        x: "cycle_index",
        y: "discharge_capacity",
        color: "cycle_index_end_of_life",
        color_scale: COLOR_SCALE,
        width: 1000,
        height: 400,
        labels,
        title: "Discharge Capacity over Cycles",
        log_x: false,
        log_y: false,
    }
}

pub fn voltage_delta_spec(rows: Vec<Value>) -> ChartSpec {
    let mut labels = BTreeMap::new();
    labels.insert("discharge_capacity_diff_100_10", "Q_100 - Q_10 (Ah)");
    labels.insert("voltage", "Voltage (V)");
    labels.insert("cycle_index_end_of_life", "Cycle life");
    ChartSpec {
        rows,
        x: "discharge_capacity_diff_100_10",
        y: "voltage",
        color: "cycle_index_end_of_life",
        color_scale: COLOR_SCALE,
        width: 600,
        height: 500,
        labels,
        title: "Difference of the discharge capacity curves",
        log_x: false,
        log_y: false,
    }
}

pub fn curve_variance_spec(rows: Vec<Value>) -> ChartSpec {
    let mut labels = BTreeMap::new();
    labels.insert("voltage_curve_variance", "Var(Q_100 - Q_10(V))");
    labels.insert("cycle_index_end_of_life", "Cycle life");
    ChartSpec {
        rows,
        x: "voltage_curve_variance",
        y: "cycle_index_end_of_life",
        color: "cycle_index_end_of_life",
        color_scale: COLOR_SCALE,
        width: 600,
        height: 500,
        labels,
        title: "Cycle life as a function of voltage curve variance",
        log_x: true,
        log_y: true,
    }
}
