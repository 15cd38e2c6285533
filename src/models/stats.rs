//! Derived statistics models.

use serde::{Deserialize, Serialize};

/// Default number of recent matches an aggregation looks at.
pub const DEFAULT_WINDOW: usize = 10;

/// Selection of stored matches an aggregation runs over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Only matches on this map (case-insensitive)
    pub map: Option<String>,

    /// Most recent N matches by start time
    pub last_n: usize,
}

impl Window {
    pub fn last(last_n: usize) -> Self {
        Self { map: None, last_n }
    }

    pub fn on_map(mut self, map: impl Into<String>) -> Self {
        self.map = Some(map.into());
        self
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::last(DEFAULT_WINDOW)
    }
}

/// Result of an aggregation: either figures or an explicit "nothing stored".
///
/// Callers must not render `NoData` as a zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Aggregate<T> {
    NoData,
    Data(T),
}

impl<T> Aggregate<T> {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Aggregate::NoData)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Aggregate::Data(d) => Some(d),
            Aggregate::NoData => None,
        }
    }
}

/// Kill/death ratio over a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kdr {
    /// Kills / deaths, rounded to 2 decimals (0 when nothing happened)
    Ratio(f64),

    /// Kills with zero deaths
    Infinite,
}

impl Kdr {
    pub fn as_f64(&self) -> f64 {
        match self {
            Kdr::Ratio(r) => *r,
            Kdr::Infinite => f64::INFINITY,
        }
    }
}

impl std::fmt::Display for Kdr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kdr::Ratio(r) => write!(f, "{:.2}", r),
            Kdr::Infinite => write!(f, "undefined (no deaths)"),
        }
    }
}

/// Output of `average_kdr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdrReport {
    pub matches_considered: usize,
    pub kills: u32,
    pub deaths: u32,
    pub kdr: Kdr,
}

/// Per-match averages over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub kills: f64,
    pub deaths: f64,
    pub assists: f64,
    pub kdr: Kdr,

    /// Percent of hits that were headshots, 0 when no hits were recorded
    pub headshot_rate: f64,

    pub score: Option<f64>,
    pub damage_made: Option<f64>,
    pub damage_received: Option<f64>,
    pub credits_spent: Option<f64>,
    pub loadout_value: Option<f64>,
}

/// Output of `summarize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub matches_considered: usize,
    pub averages: Averages,

    /// Fraction of considered matches won, when outcomes are known
    pub win_rate: Option<f64>,

    pub most_played_character: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_default() {
        let w = Window::default();
        assert_eq!(w.last_n, 10);
        assert!(w.map.is_none());
        assert_eq!(Window::last(5).on_map("Bind").map.as_deref(), Some("Bind"));
    }

    #[test]
    fn test_aggregate_no_data_serialization() {
        let agg: Aggregate<KdrReport> = Aggregate::NoData;
        let json = serde_json::to_string(&agg).unwrap();
        assert_eq!(json, r#"{"status":"no_data"}"#);
        assert!(agg.is_no_data());
        assert!(agg.data().is_none());
    }

    #[test]
    fn test_aggregate_data_serialization() {
        let agg = Aggregate::Data(KdrReport {
            matches_considered: 2,
            kills: 30,
            deaths: 20,
            kdr: Kdr::Ratio(1.5),
        });
        let json = serde_json::to_string(&agg).unwrap();
        assert!(json.contains(r#""status":"data""#));
        assert!(json.contains(r#""kdr":{"ratio":1.5}"#));
    }

    #[test]
    fn test_kdr_display() {
        assert_eq!(Kdr::Ratio(1.5).to_string(), "1.50");
        assert_eq!(Kdr::Ratio(0.0).to_string(), "0.00");
        assert_eq!(Kdr::Infinite.to_string(), "undefined (no deaths)");
        assert!(Kdr::Infinite.as_f64().is_infinite());
    }
}
