//! Runway dataset and the approach/departure geometry classifier.
//!
//! Runways load from an OurAirports-shaped CSV (one row per runway, both
//! thresholds with coordinates). Each threshold gets a heading derived from
//! the bearing to the opposite threshold and a precomputed extended
//! centerline polyline at 1-NM increments, which the API exposes for map
//! rendering.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::PhasesConfig;
use crate::geometry::{
    angular_difference, cross_track_distance_nm, destination_point, haversine_distance_nm,
    initial_bearing,
};

/// One runway end. `heading` points down the runway toward the opposite
/// threshold, i.e. the direction of travel for traffic using this end.
#[derive(Debug, Clone, Serialize)]
pub struct RunwayThreshold {
    pub ident: String,
    pub lat: f64,
    pub lon: f64,
    /// True heading from this threshold to the opposite one, degrees
    pub heading: f64,
    /// Points extending away from the runway behind this threshold, one per
    /// NM out to the configured extension length. Approaching traffic flies
    /// along this line toward the threshold.
    pub extended_centerline: Vec<(f64, f64)>,
}

/// A runway: identifier like "05/23" plus its two thresholds
#[derive(Debug, Clone, Serialize)]
pub struct Runway {
    pub airport_ident: String,
    pub ident: String,
    pub thresholds: [RunwayThreshold; 2],
}

/// Raw CSV row, OurAirports column naming
#[derive(Debug, Deserialize)]
struct RunwayRecord {
    airport_ident: String,
    le_ident: String,
    le_latitude_deg: Option<f64>,
    le_longitude_deg: Option<f64>,
    he_ident: String,
    he_latitude_deg: Option<f64>,
    he_longitude_deg: Option<f64>,
    #[serde(default)]
    closed: Option<u8>,
}

/// All runways for the station's airport(s), keyed by airport ident
#[derive(Debug, Clone, Default)]
pub struct RunwayDb {
    runways: HashMap<String, Vec<Runway>>,
}

/// Result of a successful approach alignment test
#[derive(Debug, Clone, Serialize)]
pub struct ApproachInfo {
    pub airport: String,
    pub runway: String,
    pub threshold_lat: f64,
    pub threshold_lon: f64,
    /// Distance from the aircraft to the threshold, NM
    pub distance_nm: f64,
    /// Perpendicular offset from the extended centerline, NM
    pub cross_track_nm: f64,
    /// |aircraft track − runway heading|, degrees
    pub heading_diff_deg: f64,
}

/// Result of a successful departure alignment test
#[derive(Debug, Clone, Serialize)]
pub struct DepartureInfo {
    pub airport: String,
    pub runway: String,
    pub distance_nm: f64,
    pub heading_diff_deg: f64,
}

impl RunwayDb {
    /// Load the runway CSV, restricted to `airport_code` when non-empty.
    /// Missing file or an empty dataset is fatal at startup.
    pub fn load(path: &Path, airport_code: &str, extension_length_nm: f64) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to open runway database {}", path.display()))?;

        let mut runways: HashMap<String, Vec<Runway>> = HashMap::new();
        let mut skipped = 0usize;

        for row in reader.deserialize::<RunwayRecord>() {
            let record = match row {
                Ok(r) => r,
                Err(e) => {
                    skipped += 1;
                    debug!("skipping unreadable runway row: {e}");
                    continue;
                }
            };
            if !airport_code.is_empty() && record.airport_ident != airport_code {
                continue;
            }
            if record.closed == Some(1) {
                continue;
            }
            let (Some(le_lat), Some(le_lon), Some(he_lat), Some(he_lon)) = (
                record.le_latitude_deg,
                record.le_longitude_deg,
                record.he_latitude_deg,
                record.he_longitude_deg,
            ) else {
                skipped += 1;
                continue;
            };

            let runway = build_runway(
                &record.airport_ident,
                &record.le_ident,
                le_lat,
                le_lon,
                &record.he_ident,
                he_lat,
                he_lon,
                extension_length_nm,
            );
            runways
                .entry(record.airport_ident.clone())
                .or_default()
                .push(runway);
        }

        if skipped > 0 {
            warn!("skipped {skipped} runway rows without threshold coordinates");
        }
        let total: usize = runways.values().map(|v| v.len()).sum();
        if total == 0 {
            bail!(
                "runway database {} contains no usable runways for airport '{}'",
                path.display(),
                airport_code
            );
        }
        info!(
            "loaded {} runways for {} airport(s) from {}",
            total,
            runways.len(),
            path.display()
        );

        Ok(Self { runways })
    }

    /// Build directly from threshold pairs; used by tests and simulation
    pub fn from_thresholds(
        airport: &str,
        pairs: &[(&str, f64, f64, &str, f64, f64)],
        extension_length_nm: f64,
    ) -> Self {
        let mut runways = HashMap::new();
        runways.insert(
            airport.to_string(),
            pairs
                .iter()
                .map(|(le, le_lat, le_lon, he, he_lat, he_lon)| {
                    build_runway(
                        airport,
                        le,
                        *le_lat,
                        *le_lon,
                        he,
                        *he_lat,
                        *he_lon,
                        extension_length_nm,
                    )
                })
                .collect(),
        );
        Self { runways }
    }

    pub fn all(&self) -> impl Iterator<Item = &Runway> {
        self.runways.values().flatten()
    }

    pub fn thresholds(&self) -> impl Iterator<Item = (&Runway, &RunwayThreshold)> {
        self.all()
            .flat_map(|r| r.thresholds.iter().map(move |t| (r, t)))
    }

    /// Find the nearest runway the aircraft is lined up to land on.
    ///
    /// Qualification per threshold: within `approach_max_distance_nm` of the
    /// threshold, within `approach_centerline_tolerance_nm` of the extended
    /// centerline, and tracking within `approach_heading_tolerance_deg` of
    /// the runway heading. The aircraft must be on the approach side, i.e.
    /// the threshold lies ahead along its track.
    pub fn detect_approach(
        &self,
        lat: f64,
        lon: f64,
        track: f64,
        _altitude: f64,
        config: &PhasesConfig,
    ) -> Option<ApproachInfo> {
        let mut best: Option<ApproachInfo> = None;

        for (runway, threshold) in self.thresholds() {
            let distance = haversine_distance_nm(lat, lon, threshold.lat, threshold.lon);
            if distance > config.approach_max_distance_nm {
                continue;
            }

            let heading_diff = angular_difference(track, threshold.heading);
            if heading_diff > config.approach_heading_tolerance_deg {
                continue;
            }

            // The approach course starts on the extended centerline behind
            // the threshold and runs along the runway heading. Cross-track is
            // measured against that course.
            let approach_fix = threshold
                .extended_centerline
                .last()
                .copied()
                .unwrap_or((threshold.lat, threshold.lon));
            let cross_track = cross_track_distance_nm(
                approach_fix.0,
                approach_fix.1,
                threshold.heading,
                lat,
                lon,
            );
            if cross_track.abs() > config.approach_centerline_tolerance_nm {
                continue;
            }

            // Threshold must be ahead: bearing to it roughly along track
            let bearing_to_threshold = initial_bearing(lat, lon, threshold.lat, threshold.lon);
            if angular_difference(bearing_to_threshold, track) > 90.0 {
                continue;
            }

            let qualifies_better = best
                .as_ref()
                .map(|b| distance < b.distance_nm)
                .unwrap_or(true);
            if qualifies_better {
                best = Some(ApproachInfo {
                    airport: runway.airport_ident.clone(),
                    runway: threshold.ident.clone(),
                    threshold_lat: threshold.lat,
                    threshold_lon: threshold.lon,
                    distance_nm: distance,
                    cross_track_nm: cross_track,
                    heading_diff_deg: heading_diff,
                });
            }
        }

        best
    }

    /// Find the runway the aircraft just departed from: tracking along a
    /// runway heading, moving away from the far threshold, within range of
    /// the station.
    pub fn detect_departure(
        &self,
        lat: f64,
        lon: f64,
        track: f64,
        station_lat: f64,
        station_lon: f64,
        config: &PhasesConfig,
    ) -> Option<DepartureInfo> {
        let station_distance = haversine_distance_nm(lat, lon, station_lat, station_lon);
        if station_distance > config.approach_max_distance_nm {
            return None;
        }

        let mut best: Option<DepartureInfo> = None;

        for (runway, threshold) in self.thresholds() {
            let heading_diff = angular_difference(track, threshold.heading);
            if heading_diff > config.approach_heading_tolerance_deg {
                continue;
            }

            // Departing traffic moves away from the threshold it rolled
            // from: the bearing from the threshold to the aircraft follows
            // the runway heading.
            let bearing_from_threshold = initial_bearing(threshold.lat, threshold.lon, lat, lon);
            if angular_difference(bearing_from_threshold, threshold.heading)
                > config.approach_heading_tolerance_deg
            {
                continue;
            }

            let distance = haversine_distance_nm(lat, lon, threshold.lat, threshold.lon);
            let qualifies_better = best
                .as_ref()
                .map(|b| distance < b.distance_nm)
                .unwrap_or(true);
            if qualifies_better {
                best = Some(DepartureInfo {
                    airport: runway.airport_ident.clone(),
                    runway: threshold.ident.clone(),
                    distance_nm: distance,
                    heading_diff_deg: heading_diff,
                });
            }
        }

        best
    }
}

#[allow(clippy::too_many_arguments)]
fn build_runway(
    airport: &str,
    le_ident: &str,
    le_lat: f64,
    le_lon: f64,
    he_ident: &str,
    he_lat: f64,
    he_lon: f64,
    extension_length_nm: f64,
) -> Runway {
    let le_heading = initial_bearing(le_lat, le_lon, he_lat, he_lon);
    let he_heading = initial_bearing(he_lat, he_lon, le_lat, le_lon);

    Runway {
        airport_ident: airport.to_string(),
        ident: format!("{le_ident}/{he_ident}"),
        thresholds: [
            RunwayThreshold {
                ident: le_ident.to_string(),
                lat: le_lat,
                lon: le_lon,
                heading: le_heading,
                extended_centerline: extended_centerline(
                    le_lat,
                    le_lon,
                    le_heading,
                    extension_length_nm,
                ),
            },
            RunwayThreshold {
                ident: he_ident.to_string(),
                lat: he_lat,
                lon: he_lon,
                heading: he_heading,
                extended_centerline: extended_centerline(
                    he_lat,
                    he_lon,
                    he_heading,
                    extension_length_nm,
                ),
            },
        ],
    }
}

/// Points marching away from the runway behind a threshold, 1 NM apart.
/// The reciprocal of the threshold heading points out along the approach.
fn extended_centerline(lat: f64, lon: f64, heading: f64, length_nm: f64) -> Vec<(f64, f64)> {
    let outbound = (heading + 180.0) % 360.0;
    let steps = length_nm.max(1.0).round() as usize;
    (1..=steps)
        .map(|nm| destination_point(lat, lon, outbound, nm as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::destination_point;

    // A synthetic east-west runway at 43.68N: threshold "09" on the west end
    // (traffic heads 090), threshold "27" on the east end (traffic heads 270).
    fn test_db() -> RunwayDb {
        let west = (43.68, -79.65);
        let east = destination_point(west.0, west.1, 90.0, 1.8);
        RunwayDb::from_thresholds(
            "CYTST",
            &[("09", west.0, west.1, "27", east.0, east.1)],
            10.0,
        )
    }

    fn config() -> PhasesConfig {
        PhasesConfig::default()
    }

    #[test]
    fn thresholds_get_opposite_headings_and_centerlines() {
        let db = test_db();
        let runway = db.all().next().unwrap();
        let [t09, t27] = &runway.thresholds;
        assert!((t09.heading - 90.0).abs() < 1.0, "got {}", t09.heading);
        assert!((t27.heading - 270.0).abs() < 1.0, "got {}", t27.heading);
        assert_eq!(t09.extended_centerline.len(), 10);
        // First centerline point is 1 NM behind the threshold, on the
        // approach side (west of threshold 09)
        let (_clat, clon) = t09.extended_centerline[0];
        assert!(clon < t09.lon);
    }

    #[test]
    fn detect_approach_on_final() {
        let db = test_db();
        let runway = db.all().next().unwrap();
        let t09 = &runway.thresholds[0];
        // 5 NM out on the extended centerline for runway 09, tracking east
        let (lat, lon) = destination_point(t09.lat, t09.lon, 270.0, 5.0);
        let info = db.detect_approach(lat, lon, 90.0, 1500.0, &config());
        let info = info.expect("should detect approach");
        assert_eq!(info.runway, "09");
        assert!((info.distance_nm - 5.0).abs() < 0.1);
        assert!(info.cross_track_nm.abs() < 0.1);
    }

    #[test]
    fn detect_approach_rejects_wrong_heading() {
        let db = test_db();
        let runway = db.all().next().unwrap();
        let t09 = &runway.thresholds[0];
        let (lat, lon) = destination_point(t09.lat, t09.lon, 270.0, 5.0);
        // Crossing the final approach course perpendicular
        assert!(db.detect_approach(lat, lon, 0.0, 1500.0, &config()).is_none());
    }

    #[test]
    fn detect_approach_rejects_offset_from_centerline() {
        let db = test_db();
        let runway = db.all().next().unwrap();
        let t09 = &runway.thresholds[0];
        let (lat, lon) = destination_point(t09.lat, t09.lon, 270.0, 5.0);
        // Displace 3 NM north of the centerline
        let (lat, lon) = destination_point(lat, lon, 0.0, 3.0);
        assert!(db.detect_approach(lat, lon, 90.0, 1500.0, &config()).is_none());
    }

    #[test]
    fn detect_approach_rejects_aircraft_past_threshold() {
        let db = test_db();
        let runway = db.all().next().unwrap();
        let t09 = &runway.thresholds[0];
        // 5 NM beyond threshold 09 heading east: runway behind, departure side
        let (lat, lon) = destination_point(t09.lat, t09.lon, 90.0, 5.0);
        let info = db.detect_approach(lat, lon, 90.0, 1500.0, &config());
        // May match threshold 27 ahead of the aircraft, but never runway 09
        if let Some(info) = info {
            assert_ne!(info.runway, "09");
        }
    }

    #[test]
    fn detect_departure_climbing_out() {
        let db = test_db();
        let runway = db.all().next().unwrap();
        let t09 = &runway.thresholds[0];
        // 3 NM east of threshold 09, tracking east: departed runway 09
        let (lat, lon) = destination_point(t09.lat, t09.lon, 90.0, 3.0);
        let info = db
            .detect_departure(lat, lon, 90.0, t09.lat, t09.lon, &config())
            .expect("should detect departure");
        assert_eq!(info.runway, "09");
    }

    #[test]
    fn detect_departure_rejects_far_from_station() {
        let db = test_db();
        let runway = db.all().next().unwrap();
        let t09 = &runway.thresholds[0];
        let (lat, lon) = destination_point(t09.lat, t09.lon, 90.0, 40.0);
        assert!(
            db.detect_departure(lat, lon, 90.0, t09.lat, t09.lon, &config())
                .is_none()
        );
    }

    #[test]
    fn load_rejects_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runways.csv");
        std::fs::write(
            &path,
            "airport_ident,le_ident,le_latitude_deg,le_longitude_deg,he_ident,he_latitude_deg,he_longitude_deg,closed\n",
        )
        .unwrap();
        assert!(RunwayDb::load(&path, "CYYZ", 10.0).is_err());
    }

    #[test]
    fn load_filters_by_airport_and_skips_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runways.csv");
        std::fs::write(
            &path,
            "airport_ident,le_ident,le_latitude_deg,le_longitude_deg,he_ident,he_latitude_deg,he_longitude_deg,closed\n\
             CYYZ,05,43.66559,-79.64323,23,43.68472,-79.61850,0\n\
             CYYZ,15L,43.68991,-79.62770,33R,43.66598,-79.60754,1\n\
             CYTZ,08,43.62794,-79.40262,26,43.62862,-79.38860,0\n",
        )
        .unwrap();
        let db = RunwayDb::load(&path, "CYYZ", 10.0).unwrap();
        let runways: Vec<_> = db.all().collect();
        assert_eq!(runways.len(), 1, "closed and foreign runways excluded");
        assert_eq!(runways[0].ident, "05/23");
    }
}
