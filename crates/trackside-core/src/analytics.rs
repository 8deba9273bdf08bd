//! KPI snapshots and historical series from the analytics endpoints.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WireError;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeRange {
    Hour,
    SixHours,
    #[default]
    Day,
    Week,
    Month,
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "1h",
            Self::SixHours => "6h",
            Self::Day => "1d",
            Self::Week => "1w",
            Self::Month => "1m",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Self::Hour),
            "6h" => Ok(Self::SixHours),
            "1d" => Ok(Self::Day),
            "1w" => Ok(Self::Week),
            "1m" => Ok(Self::Month),
            other => Err(WireError::UnknownTimeRange(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Hourly,
    Daily,
    Weekly,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(WireError::UnknownPeriod(other.to_string())),
        }
    }
}

/// Metrics the historical endpoint knows how to chart.
pub const HISTORICAL_METRICS: &[&str] = &[
    "punctuality",
    "rtp",
    "averageDelay",
    "p90Delay",
    "throughput",
    "utilization",
    "acceptanceRate",
    "openConflicts",
    "headwayAdherence",
    "headwayBreaches",
];

// ---------------------------------------------------------------------------
// KPI snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Up,
    Down,
    #[serde(other)]
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    #[serde(default)]
    pub change: Option<f64>,
    #[serde(default)]
    pub direction: Option<TrendDirection>,
}

impl Trend {
    /// Change with its sign taken from `direction`.
    pub fn signed_delta(&self) -> Option<f64> {
        let change = self.change?;
        Some(match self.direction {
            Some(TrendDirection::Down) => -change.abs(),
            Some(TrendDirection::Up) => change.abs(),
            _ => change,
        })
    }
}

/// `GET /api/analytics/kpis` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    #[serde(default)]
    pub time_range: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub kpis: Map<String, Value>,
    #[serde(default)]
    pub trends: BTreeMap<String, Trend>,
}

impl KpiSnapshot {
    /// Numeric KPI value; non-numeric or missing entries are `None`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.kpis.get(name).and_then(Value::as_f64)
    }
}

// ---------------------------------------------------------------------------
// Historical series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub metric: String,
    pub period: Period,
    pub values: Vec<f64>,
}

/// Extract the numeric series from a historical response.
///
/// The list lives under `series` (or `data` on older servers); each point
/// is `{"v": n}`, `{"value": n}` or a bare number. Points without a
/// numeric value are skipped.
pub fn parse_series(body: &Value) -> Vec<f64> {
    let Some(points) = body
        .get("series")
        .or_else(|| body.get("data"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    points
        .iter()
        .filter_map(|point| match point {
            Value::Object(fields) => fields
                .get("v")
                .or_else(|| fields.get("value"))
                .and_then(Value::as_f64),
            other => other.as_f64(),
        })
        .collect()
}
