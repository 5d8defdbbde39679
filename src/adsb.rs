//! Normalized ADS-B observation types shared by all source adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which upstream feed an observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Local,
    RadiusExternal,
    BboxExternal,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::RadiusExternal => write!(f, "radius-external"),
            SourceKind::BboxExternal => write!(f, "bbox-external"),
        }
    }
}

/// One normalized observation for one aircraft from one fetch.
///
/// Feeds that omit a numeric field report it as 0; a (0, 0) position means
/// "no fix" and is discarded by the tick orchestrator before reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// 6-character hexadecimal transponder address, lowercase
    pub hex: String,
    /// Callsign as transmitted, trimmed; may be empty
    pub flight: String,
    pub lat: f64,
    pub lon: f64,
    /// Barometric altitude, feet
    pub alt_baro: f64,
    /// Geometric (GNSS) altitude, feet
    pub alt_geom: f64,
    /// Ground speed, knots
    pub gs: f64,
    /// True airspeed, knots
    pub tas: f64,
    /// True heading, degrees [0, 360)
    pub true_heading: f64,
    /// Magnetic heading, degrees [0, 360)
    pub mag_heading: f64,
    /// Track over ground, degrees [0, 360)
    pub track: f64,
    /// Barometric vertical rate, feet/minute
    pub baro_rate: f64,
    /// 4-digit octal transponder code
    pub squawk: String,
    /// Emitter category code (e.g. "A3")
    pub category: String,
    /// Explicit on-ground flag when the feed carries one; overrides inference
    pub on_ground: Option<bool>,
    pub source: SourceKind,
    pub timestamp: DateTime<Utc>,
}

impl Target {
    /// True when the feed delivered no usable position fix
    pub fn has_no_fix(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }

    /// Best available track: track over ground, falling back to true heading
    pub fn best_track(&self) -> f64 {
        if self.track > 0.0 {
            self.track
        } else {
            self.true_heading
        }
    }
}

/// Scalar that external feeds ship as a number, a string, or a bool.
///
/// The radius feed reports grounded aircraft with `"alt_baro": "ground"` and
/// occasionally numbers-as-strings; this models that without falling back to
/// untyped JSON values.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FlexValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl FlexValue {
    /// Numeric view. `"ground"` coerces to 0, other parseable strings to
    /// their value, booleans to 0/1, anything else to `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FlexValue::Number(n) => Some(*n),
            FlexValue::Text(s) => {
                let t = s.trim();
                if t.eq_ignore_ascii_case("ground") {
                    Some(0.0)
                } else {
                    t.parse::<f64>().ok()
                }
            }
            FlexValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|v| v.round() as i64)
    }

    pub fn as_string(&self) -> String {
        match self {
            FlexValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            FlexValue::Text(s) => s.trim().to_string(),
            FlexValue::Flag(b) => b.to_string(),
        }
    }

    /// True when the value is the literal ground sentinel
    pub fn is_ground_sentinel(&self) -> bool {
        matches!(self, FlexValue::Text(s) if s.trim().eq_ignore_ascii_case("ground"))
    }
}

impl Default for FlexValue {
    fn default() -> Self {
        FlexValue::Number(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flex_value_parses_number() {
        let v: FlexValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(v.as_f64(), Some(12.5));
        assert_eq!(v.as_i64(), Some(13));
    }

    #[test]
    fn flex_value_parses_numeric_string() {
        let v: FlexValue = serde_json::from_str("\"7700\"").unwrap();
        assert_eq!(v.as_f64(), Some(7700.0));
        assert_eq!(v.as_string(), "7700");
    }

    #[test]
    fn flex_value_ground_sentinel_is_zero() {
        let v: FlexValue = serde_json::from_str("\"ground\"").unwrap();
        assert!(v.is_ground_sentinel());
        assert_eq!(v.as_f64(), Some(0.0));
        assert_eq!(v.as_i64(), Some(0));
    }

    #[test]
    fn flex_value_bool_coerces() {
        let v: FlexValue = serde_json::from_str("true").unwrap();
        assert_eq!(v.as_f64(), Some(1.0));
        assert_eq!(v.as_string(), "true");
    }

    #[test]
    fn flex_value_garbage_string_is_none() {
        let v = FlexValue::Text("n/a".to_string());
        assert_eq!(v.as_f64(), None);
    }

    #[test]
    fn flex_value_integral_number_formats_without_fraction() {
        assert_eq!(FlexValue::Number(250.0).as_string(), "250");
        assert_eq!(FlexValue::Number(250.5).as_string(), "250.5");
    }

    #[test]
    fn target_no_fix_detection() {
        let mut t = test_target();
        assert!(!t.has_no_fix());
        t.lat = 0.0;
        t.lon = 0.0;
        assert!(t.has_no_fix());
    }

    #[test]
    fn target_best_track_falls_back_to_heading() {
        let mut t = test_target();
        assert_eq!(t.best_track(), 241.0);
        t.track = 0.0;
        assert_eq!(t.best_track(), 240.0);
    }

    fn test_target() -> Target {
        Target {
            hex: "c01234".to_string(),
            flight: "ACA101".to_string(),
            lat: 43.6777,
            lon: -79.6248,
            alt_baro: 5000.0,
            alt_geom: 5100.0,
            gs: 250.0,
            tas: 260.0,
            true_heading: 240.0,
            mag_heading: 250.0,
            track: 241.0,
            baro_rate: -500.0,
            squawk: "3421".to_string(),
            category: "A3".to_string(),
            on_ground: None,
            source: SourceKind::Local,
            timestamp: Utc::now(),
        }
    }
}
