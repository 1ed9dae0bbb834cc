//! Rule-based insight detection over one window of records.
//!
//! Each detector is an independent single-pass interval tracker over the
//! window in timestamp order. The engine concatenates their findings in
//! evaluation order (idle, demand, power factor) and caps the list at
//! [`MAX_INSIGHTS`].

use crate::feed::types::{MachineState, TelemetryRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of findings reported per pass.
pub const MAX_INSIGHTS: usize = 3;

/// Severity tier of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Info,
    Warning,
    Danger,
}

impl InsightKind {
    /// Lowercase label, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::Info => "info",
            InsightKind::Warning => "warning",
            InsightKind::Danger => "danger",
        }
    }
}

/// One rule-based finding about the current window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub message: String,
}

/// Detector thresholds and minimum durations.
///
/// The phase-imbalance settings are part of the configuration surface even
/// though no phase-imbalance detector is wired up yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    /// Idle-run duration (minutes) above which a finding is raised. The
    /// effective threshold is capped at half the window length.
    pub idle_threshold_min: u32,
    /// Length of the trailing demand sub-window (minutes).
    pub demand_window_min: u32,
    /// Power factor below which a record counts toward a low-PF run.
    pub pf_threshold: f64,
    /// Minimum low-PF run duration (minutes) for a run to qualify.
    pub pf_min_duration_min: f64,
    /// Phase imbalance percentage threshold.
    pub phase_imbalance_threshold_pct: f64,
    /// Minimum phase-imbalance duration (minutes).
    pub phase_imbalance_min_duration_min: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            idle_threshold_min: 30,
            demand_window_min: 15,
            pf_threshold: 0.8,
            pf_min_duration_min: 5.0,
            phase_imbalance_threshold_pct: 15.0,
            phase_imbalance_min_duration_min: 2.0,
        }
    }
}

/// Run all detectors over `window` and return at most [`MAX_INSIGHTS`]
/// findings in evaluation order.
pub fn detect(
    window: &[TelemetryRecord],
    window_minutes: u32,
    config: &InsightConfig,
) -> Vec<Insight> {
    if window.is_empty() {
        return Vec::new();
    }

    let mut insights = Vec::new();
    if let Some(insight) = detect_idle_period(window, window_minutes, config) {
        insights.push(insight);
    }
    if let Some(insight) = detect_peak_demand(window, config) {
        insights.push(insight);
    }
    if let Some(insight) = detect_low_power_factor(window, config) {
        insights.push(insight);
    }
    insights.truncate(MAX_INSIGHTS);
    insights
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}

/// Longest contiguous IDLE run in the window, including a run still open at
/// the window's end.
fn detect_idle_period(
    window: &[TelemetryRecord],
    window_minutes: u32,
    config: &InsightConfig,
) -> Option<Insight> {
    let threshold = f64::from(config.idle_threshold_min).min(f64::from(window_minutes) * 0.5);

    let mut run_start: Option<DateTime<Utc>> = None;
    let mut max_duration = 0.0_f64;
    let mut max_start: Option<DateTime<Utc>> = None;

    for record in window {
        if record.state == MachineState::Idle {
            run_start.get_or_insert(record.timestamp);
        } else if let Some(start) = run_start.take() {
            let duration = minutes_between(start, record.timestamp);
            if duration > max_duration {
                max_duration = duration;
                max_start = Some(start);
            }
        }
    }
    if let (Some(start), Some(last)) = (run_start, window.last()) {
        let duration = minutes_between(start, last.timestamp);
        if duration > max_duration {
            max_duration = duration;
            max_start = Some(start);
        }
    }

    if max_duration >= threshold {
        let start = max_start?;
        Some(Insight {
            kind: InsightKind::Warning,
            title: "Extended Idle Period Detected".to_string(),
            message: format!(
                "Machine was idle for {:.1} minutes starting at {}. \
                 This may indicate production inefficiency.",
                max_duration,
                start.format("%H:%M:%S")
            ),
        })
    } else {
        None
    }
}

/// Maximum trailing-sub-window average power across the window.
///
/// One filter pass per record, O(n²) over the window. Fine at one record per
/// second; a sliding accumulator would be the optimization if volumes grow,
/// provided it stays numerically identical.
fn detect_peak_demand(window: &[TelemetryRecord], config: &InsightConfig) -> Option<Insight> {
    let demand_span = Duration::minutes(i64::from(config.demand_window_min));

    let mut max_demand = 0.0_f64;
    let mut max_demand_time: Option<DateTime<Utc>> = None;

    for record in window {
        let sub_end = record.timestamp;
        let sub_start = sub_end - demand_span;

        let mut sum = 0.0;
        let mut count = 0usize;
        for sample in window
            .iter()
            .filter(|r| r.timestamp >= sub_start && r.timestamp <= sub_end)
        {
            if let Some(kw) = sample.kw {
                sum += kw;
                count += 1;
            }
        }
        if count > 0 {
            let avg = sum / count as f64;
            if avg > max_demand {
                max_demand = avg;
                max_demand_time = Some(sub_end);
            }
        }
    }

    if max_demand > 0.0 {
        let at = max_demand_time?;
        Some(Insight {
            kind: InsightKind::Info,
            title: format!("Peak {}-Minute Demand", config.demand_window_min),
            message: format!(
                "Maximum rolling {}-minute average power demand: {:.2} kW at {}.",
                config.demand_window_min,
                max_demand,
                at.format("%H:%M:%S")
            ),
        })
    } else {
        None
    }
}

/// Longest qualifying run of low power factor while the machine is powered.
///
/// A record without a power factor reading breaks the run.
fn detect_low_power_factor(window: &[TelemetryRecord], config: &InsightConfig) -> Option<Insight> {
    let mut run_start: Option<DateTime<Utc>> = None;
    let mut max_duration = 0.0_f64;
    let mut max_start: Option<DateTime<Utc>> = None;

    for record in window {
        let in_run = record.is_powered()
            && record.pf.map(|pf| pf < config.pf_threshold).unwrap_or(false);
        if in_run {
            run_start.get_or_insert(record.timestamp);
        } else if let Some(start) = run_start.take() {
            let duration = minutes_between(start, record.timestamp);
            if duration >= config.pf_min_duration_min && duration > max_duration {
                max_duration = duration;
                max_start = Some(start);
            }
        }
    }
    if let (Some(start), Some(last)) = (run_start, window.last()) {
        let duration = minutes_between(start, last.timestamp);
        if duration >= config.pf_min_duration_min && duration > max_duration {
            max_duration = duration;
            max_start = Some(start);
        }
    }

    if max_duration >= config.pf_min_duration_min {
        let start = max_start?;
        Some(Insight {
            kind: InsightKind::Danger,
            title: "Low Power Factor Detected".to_string(),
            message: format!(
                "Power factor below {} for {:.1} minutes starting at {}. \
                 This may indicate reactive power issues.",
                config.pf_threshold,
                max_duration,
                start.format("%H:%M:%S")
            ),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(mins: f64, state: MachineState) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: Utc
                .timestamp_opt(1_700_000_000 + (mins * 60.0) as i64, 0)
                .unwrap(),
            machine_id: String::new(),
            state,
            mode: None,
            status: None,
            vr: None,
            vy: None,
            vb: None,
            ir: None,
            iy: None,
            ib: None,
            kw: None,
            kwh_total: None,
            pf: None,
            count_total: None,
            temp_c: None,
            alarm_code: None,
        }
    }

    #[test]
    fn test_empty_window_no_insights() {
        assert!(detect(&[], 60, &InsightConfig::default()).is_empty());
    }

    #[test]
    fn test_idle_run_over_threshold_detected() {
        // 35 minutes of IDLE inside a 60-minute window (threshold 30).
        let mut window: Vec<TelemetryRecord> = (0..=35)
            .map(|m| record(f64::from(m), MachineState::Idle))
            .collect();
        window.push(record(35.0, MachineState::Run));

        let insights = detect(&window, 60, &InsightConfig::default());
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].kind, InsightKind::Warning);
        assert!(insights[0].message.contains("35.0 minutes"));
    }

    #[test]
    fn test_idle_run_under_threshold_ignored() {
        let window: Vec<TelemetryRecord> = (0..=20)
            .map(|m| record(f64::from(m), MachineState::Idle))
            .collect();
        assert!(detect(&window, 60, &InsightConfig::default()).is_empty());
    }

    #[test]
    fn test_idle_threshold_capped_at_half_window() {
        // A 10-minute run in a 15-minute window: the configured 30-minute
        // threshold caps down to 7.5 minutes, so the run qualifies.
        let window: Vec<TelemetryRecord> = (0..=10)
            .map(|m| record(f64::from(m), MachineState::Idle))
            .collect();
        let insights = detect(&window, 15, &InsightConfig::default());
        assert_eq!(insights.len(), 1);
    }

    #[test]
    fn test_open_idle_run_at_window_end_counts() {
        // IDLE from minute 0 through minute 35 with no closing state change.
        let window: Vec<TelemetryRecord> = (0..=35)
            .map(|m| record(f64::from(m), MachineState::Idle))
            .collect();
        let insights = detect(&window, 60, &InsightConfig::default());
        assert_eq!(insights.len(), 1);
        assert!(insights[0].message.contains("35.0 minutes"));
    }

    #[test]
    fn test_peak_demand_reports_maximum() {
        let mut window: Vec<TelemetryRecord> = (0..30)
            .map(|m| record(f64::from(m), MachineState::Run))
            .collect();
        for (i, r) in window.iter_mut().enumerate() {
            r.kw = Some(if (10..20).contains(&i) { 10.0 } else { 2.0 });
        }
        let insights = detect(&window, 60, &InsightConfig::default());
        let demand = insights
            .iter()
            .find(|i| i.kind == InsightKind::Info)
            .expect("demand insight");
        assert!(demand.title.contains("15-Minute Demand"));
    }

    #[test]
    fn test_peak_demand_absent_without_positive_power() {
        let mut window: Vec<TelemetryRecord> = (0..10)
            .map(|m| record(f64::from(m), MachineState::Off))
            .collect();
        for r in &mut window {
            r.kw = Some(0.0);
        }
        assert!(detect(&window, 60, &InsightConfig::default())
            .iter()
            .all(|i| i.kind != InsightKind::Info));
    }

    #[test]
    fn test_low_pf_run_detected() {
        let mut window: Vec<TelemetryRecord> = (0..=8)
            .map(|m| record(f64::from(m), MachineState::Run))
            .collect();
        for r in &mut window[0..=6] {
            r.pf = Some(0.6);
        }
        window[7].pf = Some(0.95);
        window[8].pf = Some(0.95);
        let insights = detect(&window, 60, &InsightConfig::default());
        let pf = insights
            .iter()
            .find(|i| i.kind == InsightKind::Danger)
            .expect("pf insight");
        assert!(pf.message.contains("7.0 minutes"));
    }

    #[test]
    fn test_low_pf_short_run_ignored() {
        let mut window: Vec<TelemetryRecord> = (0..=4)
            .map(|m| record(f64::from(m), MachineState::Run))
            .collect();
        for r in &mut window[0..=2] {
            r.pf = Some(0.5);
        }
        window[3].pf = Some(0.95);
        window[4].pf = Some(0.95);
        assert!(detect(&window, 60, &InsightConfig::default())
            .iter()
            .all(|i| i.kind != InsightKind::Danger));
    }

    #[test]
    fn test_missing_pf_breaks_run() {
        // Two 3-minute low-PF stretches separated by a record with no PF
        // reading never reach the 5-minute minimum.
        let mut window: Vec<TelemetryRecord> = (0..=7)
            .map(|m| record(f64::from(m), MachineState::Run))
            .collect();
        for r in &mut window {
            r.pf = Some(0.5);
        }
        window[3].pf = None;
        window[7].pf = Some(0.95);
        assert!(detect(&window, 60, &InsightConfig::default())
            .iter()
            .all(|i| i.kind != InsightKind::Danger));
    }

    #[test]
    fn test_at_most_three_insights() {
        let mut window: Vec<TelemetryRecord> = (0..=40)
            .map(|m| record(f64::from(m), MachineState::Idle))
            .collect();
        for r in &mut window {
            r.kw = Some(3.0);
            r.pf = Some(0.5);
        }
        let insights = detect(&window, 60, &InsightConfig::default());
        assert!(insights.len() <= MAX_INSIGHTS);
        assert!(!insights.is_empty());
    }
}
