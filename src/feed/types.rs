//! Telemetry record types shared by the feed and analytics layers.
//!
//! One record is one sample from the machine: operating state, electrical
//! readings, cumulative registers, and an optional alarm code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating state reported by the machine.
///
/// Wire values outside the known set deserialize to [`MachineState::Unknown`]
/// rather than failing the whole record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    #[serde(rename = "RUN")]
    Run,
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "OFF")]
    Off,
    #[default]
    #[serde(other, rename = "UNKNOWN")]
    Unknown,
}

/// A single telemetry sample.
///
/// Mirrors the wire shape: one JSON object per record with an ISO-8601 `ts`
/// field. Numeric fields may be absent on the wire and are excluded from the
/// aggregations that would otherwise consume them. Records are immutable once
/// ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Sample timestamp. Authoritative in replay mode; overwritten with the
    /// arrival time by the live feed.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Identifier of the reporting machine.
    #[serde(default)]
    pub machine_id: String,
    /// Operating state at sample time.
    #[serde(default)]
    pub state: MachineState,
    /// Free-form operating mode string, carried through for export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Free-form status string, carried through for export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Phase voltages (V).
    #[serde(default)]
    pub vr: Option<f64>,
    #[serde(default)]
    pub vy: Option<f64>,
    #[serde(default)]
    pub vb: Option<f64>,
    /// Phase currents (A).
    #[serde(default)]
    pub ir: Option<f64>,
    #[serde(default)]
    pub iy: Option<f64>,
    #[serde(default)]
    pub ib: Option<f64>,
    /// Instantaneous real power (kW).
    #[serde(default)]
    pub kw: Option<f64>,
    /// Cumulative energy register (kWh). Monotonic counter; may wrap or
    /// reset upstream, which is not corrected here.
    #[serde(default)]
    pub kwh_total: Option<f64>,
    /// Power factor.
    #[serde(default)]
    pub pf: Option<f64>,
    /// Cumulative unit counter.
    #[serde(default)]
    pub count_total: Option<f64>,
    /// Machine temperature (°C).
    #[serde(default)]
    pub temp_c: Option<f64>,
    /// Alarm code, if the machine raised one. Numeric codes on the wire are
    /// coerced to their string form.
    #[serde(
        default,
        deserialize_with = "de_alarm_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub alarm_code: Option<String>,
}

impl MachineState {
    /// Wire spelling of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Run => "RUN",
            MachineState::Idle => "IDLE",
            MachineState::Off => "OFF",
            MachineState::Unknown => "UNKNOWN",
        }
    }
}

impl TelemetryRecord {
    /// Whether the machine was powered (RUN or IDLE) at sample time.
    pub fn is_powered(&self) -> bool {
        matches!(self.state, MachineState::Run | MachineState::Idle)
    }

    /// The three phase currents, if all are present.
    pub fn phase_currents(&self) -> Option<[f64; 3]> {
        match (self.ir, self.iy, self.ib) {
            (Some(ir), Some(iy), Some(ib)) => Some([ir, iy, ib]),
            _ => None,
        }
    }
}

/// Errors raised while decoding a wire record.
#[derive(Debug)]
pub enum ParseError {
    /// The payload was not a valid record object.
    Malformed(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Malformed(e) => write!(f, "malformed record: {e}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Decode one wire record from a JSON line.
///
/// Missing numeric fields become `None`; an unrecognized `state` becomes
/// [`MachineState::Unknown`]. Only a payload that cannot be decoded at all
/// (bad JSON, missing/invalid `ts`) is an error.
pub fn parse_record(line: &str) -> Result<TelemetryRecord, ParseError> {
    serde_json::from_str(line).map_err(|e| ParseError::Malformed(e.to_string()))
}

/// Alarm codes arrive as either a string or a bare number.
fn de_alarm_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}
