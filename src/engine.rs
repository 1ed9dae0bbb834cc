//! The streaming analytics engine.
//!
//! Ties the pieces together on one logical timeline: records go into the
//! [`Ingestor`], the [`UpdateThrottle`] decides when a recompute pass runs,
//! and a pass extracts the window once, derives KPIs and insights from that
//! same slice, gates them on significance, and rate-limits render frames
//! separately. All results come back as plain [`EngineEvent`] values; the
//! presentation layer is an external collaborator.

use crate::config::{Config, ConfigError};
use crate::core::ingest::{GapCheck, Ingestor};
use crate::core::insights::{detect, Insight, InsightConfig};
use crate::core::kpi::{KpiSnapshot, KpiThresholds};
use crate::core::window::window_of;
use crate::feed::types::TelemetryRecord;
use crate::schedule::{Clock, RenderGate, SystemClock, ThrottleDecision, UpdateThrottle};
use std::time::Duration;

/// Everything a render pass needs: the latest window and its length.
#[derive(Debug, Clone)]
pub struct RenderFrame {
    pub records: Vec<TelemetryRecord>,
    pub window_minutes: u32,
}

/// Outputs of the engine, in emission order.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A new accepted KPI snapshot.
    Kpis(KpiSnapshot),
    /// The findings for the same window as the preceding snapshot.
    Insights(Vec<Insight>),
    /// A render-cadence frame with the latest window.
    Render(RenderFrame),
    /// The inter-arrival gap threshold was exceeded.
    Gap { duration_ms: i64 },
    /// A record arrived within the gap threshold; connectivity is fine.
    GapCleared,
}

/// Streaming windowed-analytics engine.
///
/// Single-threaded: the host loop feeds it records via [`handle_record`]
/// and drives deferred work via [`tick`]. A recompute pass never observes
/// the history changing underneath it.
///
/// [`handle_record`]: AnalyticsEngine::handle_record
/// [`tick`]: AnalyticsEngine::tick
pub struct AnalyticsEngine<C: Clock = SystemClock> {
    ingestor: Ingestor,
    throttle: UpdateThrottle<C>,
    render_gate: RenderGate<C>,
    thresholds: KpiThresholds,
    insight_config: InsightConfig,
    window_minutes: u32,
    last_kpis: Option<KpiSnapshot>,
}

impl AnalyticsEngine<SystemClock> {
    /// Create an engine on the wall clock.
    pub fn new(config: &Config) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> AnalyticsEngine<C> {
    /// Create an engine on an injected clock (tests use a manual clock).
    pub fn with_clock(config: &Config, clock: C) -> Self {
        Self {
            ingestor: Ingestor::with_gap_threshold(
                config.window_minutes,
                config.gap_threshold_ms,
            ),
            throttle: UpdateThrottle::new(
                Duration::from_millis(config.update_throttle_ms),
                clock.clone(),
            ),
            render_gate: RenderGate::new(
                Duration::from_millis(config.render_interval_ms),
                clock,
            ),
            thresholds: config.thresholds.clone(),
            insight_config: config.insights.clone(),
            window_minutes: config.window_minutes,
            last_kpis: None,
        }
    }
}

impl<C: Clock> AnalyticsEngine<C> {
    /// Ingest one record and run whatever work its arrival unlocks.
    ///
    /// Gap classification is forwarded immediately and unthrottled; the
    /// recompute pass itself is subject to the update throttle.
    pub fn handle_record(&mut self, record: TelemetryRecord) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        match self.ingestor.ingest(record) {
            GapCheck::Gap { duration_ms } => events.push(EngineEvent::Gap { duration_ms }),
            GapCheck::NoGap => events.push(EngineEvent::GapCleared),
            GapCheck::First => {}
        }

        if self.throttle.on_arrival() == ThrottleDecision::RunNow {
            self.recompute(&mut events);
        }
        events
    }

    /// Drive deferred work: a trailing throttle fire that has come due.
    ///
    /// The host loop calls this between channel polls; it is cheap when
    /// nothing is pending.
    pub fn tick(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.throttle.fire_due() {
            self.recompute(&mut events);
        }
        events
    }

    /// Change the analysis window length.
    ///
    /// Rejects a zero-length window at the boundary; on success the history
    /// is re-trimmed, the throttle gate opens, and one unthrottled recompute
    /// runs immediately.
    pub fn set_window_minutes(&mut self, minutes: u32) -> Result<Vec<EngineEvent>, ConfigError> {
        if minutes == 0 {
            return Err(ConfigError::InvalidWindow(minutes));
        }
        self.window_minutes = minutes;
        self.ingestor.set_window_minutes(minutes);
        self.throttle.reset();

        let mut events = Vec::new();
        self.recompute(&mut events);
        Ok(events)
    }

    /// Drop all retained records and the previous snapshot.
    pub fn clear(&mut self) {
        self.ingestor.clear();
        self.last_kpis = None;
    }

    /// Current window length in minutes.
    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }

    /// Read-only view of the retained history.
    pub fn history(&self) -> &[TelemetryRecord] {
        self.ingestor.history()
    }

    /// The most recently accepted snapshot, if any.
    pub fn last_kpis(&self) -> Option<&KpiSnapshot> {
        self.last_kpis.as_ref()
    }

    /// One recompute pass over one immutable window snapshot.
    fn recompute(&mut self, events: &mut Vec<EngineEvent>) {
        let window = window_of(self.ingestor.history(), self.window_minutes);

        let kpis = KpiSnapshot::compute(window, self.window_minutes);
        let accepted = match &self.last_kpis {
            None => true,
            Some(previous) => kpis.significant_change(previous, &self.thresholds),
        };

        if accepted {
            let insights = detect(window, self.window_minutes, &self.insight_config);
            events.push(EngineEvent::Kpis(kpis.clone()));
            events.push(EngineEvent::Insights(insights));
            self.last_kpis = Some(kpis);
        }

        if self.render_gate.should_render() {
            events.push(EngineEvent::Render(RenderFrame {
                records: window.to_vec(),
                window_minutes: self.window_minutes,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::MachineState;
    use crate::schedule::ManualClock;
    use chrono::{TimeZone, Utc};

    fn record_at(secs: i64, kw: f64) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            machine_id: "M-01".to_string(),
            state: MachineState::Run,
            mode: None,
            status: None,
            vr: None,
            vy: None,
            vb: None,
            ir: None,
            iy: None,
            ib: None,
            kw: Some(kw),
            kwh_total: None,
            pf: None,
            count_total: None,
            temp_c: None,
            alarm_code: None,
        }
    }

    fn engine(clock: &ManualClock) -> AnalyticsEngine<ManualClock> {
        AnalyticsEngine::with_clock(&Config::default(), clock.clone())
    }

    fn kpi_count(events: &[EngineEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::Kpis(_)))
            .count()
    }

    #[test]
    fn test_first_record_recomputes_immediately() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);
        let events = engine.handle_record(record_at(0, 5.0));
        assert_eq!(kpi_count(&events), 1);
    }

    #[test]
    fn test_burst_coalesces_into_single_pass() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);

        let mut immediate = 0;
        for i in 0..5 {
            clock.advance(std::time::Duration::from_millis(40));
            immediate += kpi_count(&engine.handle_record(record_at(i, 5.0 + i as f64)));
        }
        // Only the first arrival of the burst ran a pass.
        assert_eq!(immediate, 1);

        // The sixth arrival after the throttle interval runs immediately.
        clock.advance(std::time::Duration::from_millis(2500));
        let events = engine.handle_record(record_at(10, 50.0));
        assert_eq!(kpi_count(&events), 1);
    }

    #[test]
    fn test_trailing_fire_runs_on_tick() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);

        engine.handle_record(record_at(0, 1.0));
        clock.advance(std::time::Duration::from_millis(100));
        engine.handle_record(record_at(1, 100.0));

        assert!(engine.tick().is_empty());
        clock.advance(std::time::Duration::from_millis(2000));
        let events = engine.tick();
        assert_eq!(kpi_count(&events), 1);
        // One trailing fire only.
        clock.advance(std::time::Duration::from_millis(10));
        assert!(engine.tick().is_empty());
    }

    #[test]
    fn test_insignificant_change_retains_previous_snapshot() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);

        engine.handle_record(record_at(0, 5.0));
        let first = engine.last_kpis().cloned().expect("first snapshot");

        // Identical power: every indicator delta is below threshold.
        clock.advance(std::time::Duration::from_millis(2500));
        let events = engine.handle_record(record_at(1, 5.0));
        assert_eq!(kpi_count(&events), 0);
        assert_eq!(engine.last_kpis(), Some(&first));
    }

    #[test]
    fn test_significant_change_notifies() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);

        engine.handle_record(record_at(0, 5.0));
        clock.advance(std::time::Duration::from_millis(2500));
        let events = engine.handle_record(record_at(1, 50.0));
        assert_eq!(kpi_count(&events), 1);
    }

    #[test]
    fn test_window_change_bypasses_throttle() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);

        engine.handle_record(record_at(0, 5.0));
        // Still inside the throttle window; a record would be deferred, but
        // a window change recomputes immediately.
        clock.advance(std::time::Duration::from_millis(100));
        let events = engine.set_window_minutes(30).expect("valid window");
        // The same data re-evaluated: snapshot unchanged except throughput
        // (different denominator); throughput is 0 here, so the pass is
        // gated as insignificant. The pass still ran: render already fired
        // at t=0, so no frame, and no KPI event either.
        assert_eq!(kpi_count(&events), 0);
        assert_eq!(engine.window_minutes(), 30);

        // The gate stayed open: the next arrival recomputes immediately.
        let events = engine.handle_record(record_at(1, 50.0));
        assert_eq!(kpi_count(&events), 1);
    }

    #[test]
    fn test_zero_window_rejected() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);
        assert!(engine.set_window_minutes(0).is_err());
    }

    #[test]
    fn test_gap_events_surface_unthrottled() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);

        engine.handle_record(record_at(0, 5.0));
        let events = engine.handle_record(record_at(11, 5.0));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Gap { duration_ms: 11_000 })));

        let events = engine.handle_record(record_at(14, 5.0));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::GapCleared)));
    }

    #[test]
    fn test_render_frames_rate_limited() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);

        let events = engine.handle_record(record_at(0, 5.0));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Render(_))));

        // A second pass inside the render interval produces no frame.
        clock.advance(std::time::Duration::from_millis(2100));
        let events = engine.handle_record(record_at(1, 50.0));
        assert_eq!(kpi_count(&events), 1);
        assert!(!events.iter().any(|e| matches!(e, EngineEvent::Render(_))));

        // Past the render interval a frame comes through again.
        clock.advance(std::time::Duration::from_millis(1000));
        let events = engine.handle_record(record_at(2, 5.0));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Render(_))));
    }

    #[test]
    fn test_clear_resets_snapshot_history() {
        let clock = ManualClock::new();
        let mut engine = engine(&clock);

        engine.handle_record(record_at(0, 5.0));
        engine.clear();
        assert!(engine.history().is_empty());
        assert!(engine.last_kpis().is_none());

        // After a clear the next snapshot is always accepted.
        clock.advance(std::time::Duration::from_millis(2500));
        let events = engine.handle_record(record_at(100, 5.0));
        assert_eq!(kpi_count(&events), 1);
    }
}
