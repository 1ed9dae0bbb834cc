//! KPI aggregation over one window of records.
//!
//! All indicators are computed from the supplied window only; an empty
//! window degrades to an all-zero snapshot rather than an error. Records
//! missing a numeric field are excluded from the reductions that would
//! consume it.

use crate::feed::types::{MachineState, TelemetryRecord};
use serde::{Deserialize, Serialize};

/// The fixed set of scalar indicators for one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    /// Share of records in state RUN, percent.
    pub uptime_pct: f64,
    /// Share of records in state IDLE, percent.
    pub idle_pct: f64,
    /// Share of records in state OFF, percent.
    pub off_pct: f64,
    /// Mean instantaneous power (kW).
    pub avg_kw: f64,
    /// Energy register delta over the window (kWh). Reads wrong across an
    /// upstream counter reset or wrap; kept as-is.
    pub energy: f64,
    /// Mean power factor over RUN/IDLE records.
    pub avg_pf: f64,
    /// Unit counter delta divided by the configured window length
    /// (units/min). The denominator is the configured length, not the
    /// elapsed span of the window's records.
    pub throughput: f64,
    /// Mean per-record phase current imbalance, percent.
    pub phase_imbalance: f64,
}

impl KpiSnapshot {
    /// Compute all indicators for `window`.
    pub fn compute(window: &[TelemetryRecord], window_minutes: u32) -> Self {
        if window.is_empty() {
            return Self::default();
        }

        Self {
            uptime_pct: state_pct(window, MachineState::Run),
            idle_pct: state_pct(window, MachineState::Idle),
            off_pct: state_pct(window, MachineState::Off),
            avg_kw: mean(window.iter().filter_map(|r| r.kw)),
            energy: register_delta(window.iter().filter_map(|r| r.kwh_total)),
            avg_pf: mean(
                window
                    .iter()
                    .filter(|r| r.is_powered())
                    .filter_map(|r| r.pf),
            ),
            throughput: register_delta(window.iter().filter_map(|r| r.count_total))
                / f64::from(window_minutes),
            phase_imbalance: mean(window.iter().filter_map(per_record_imbalance)),
        }
    }

    /// Whether any indicator moved by more than its significance threshold
    /// relative to `previous`.
    pub fn significant_change(&self, previous: &KpiSnapshot, thresholds: &KpiThresholds) -> bool {
        (self.uptime_pct - previous.uptime_pct).abs() > thresholds.uptime_pct
            || (self.idle_pct - previous.idle_pct).abs() > thresholds.idle_pct
            || (self.off_pct - previous.off_pct).abs() > thresholds.off_pct
            || (self.avg_kw - previous.avg_kw).abs() > thresholds.avg_kw
            || (self.energy - previous.energy).abs() > thresholds.energy
            || (self.avg_pf - previous.avg_pf).abs() > thresholds.avg_pf
            || (self.throughput - previous.throughput).abs() > thresholds.throughput
            || (self.phase_imbalance - previous.phase_imbalance).abs()
                > thresholds.phase_imbalance
    }
}

/// Per-indicator absolute deltas below which a change is treated as
/// imperceptible and not propagated downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiThresholds {
    pub uptime_pct: f64,
    pub idle_pct: f64,
    pub off_pct: f64,
    pub avg_kw: f64,
    pub energy: f64,
    pub avg_pf: f64,
    pub throughput: f64,
    pub phase_imbalance: f64,
}

impl Default for KpiThresholds {
    fn default() -> Self {
        Self {
            uptime_pct: 1.0,
            idle_pct: 1.0,
            off_pct: 1.0,
            avg_kw: 0.1,
            energy: 0.01,
            avg_pf: 0.01,
            throughput: 0.1,
            phase_imbalance: 0.5,
        }
    }
}

fn state_pct(window: &[TelemetryRecord], state: MachineState) -> f64 {
    let matching = window.iter().filter(|r| r.state == state).count();
    (matching as f64 / window.len() as f64) * 100.0
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// `max - min` of a cumulative register over the window; 0 when no record
/// carries the register.
fn register_delta(values: impl Iterator<Item = f64>) -> f64 {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut seen = false;
    for v in values {
        min = min.min(v);
        max = max.max(v);
        seen = true;
    }
    if seen {
        max - min
    } else {
        0.0
    }
}

/// `((max - min) / mean) * 100` of the three phase currents for one record;
/// 0 when the mean is 0, `None` when a current is missing.
fn per_record_imbalance(record: &TelemetryRecord) -> Option<f64> {
    let currents = record.phase_currents()?;
    let max = currents.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = currents.iter().cloned().fold(f64::INFINITY, f64::min);
    let avg = currents.iter().sum::<f64>() / 3.0;
    if avg > 0.0 {
        Some(((max - min) / avg) * 100.0)
    } else {
        Some(0.0)
    }
}
