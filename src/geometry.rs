//! Great-circle geometry helpers used by runway alignment and distance
//! calculations. All distances are nautical miles, all angles degrees.

/// Mean Earth radius in nautical miles
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Feet per meter
pub const FEET_PER_METER: f64 = 3.28084;

/// Knots per meter/second
pub const KNOTS_PER_MPS: f64 = 1.943844;

/// Feet-per-minute per meter/second
pub const FPM_PER_MPS: f64 = 196.850394;

/// Haversine distance between two coordinates in nautical miles
pub fn haversine_distance_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_NM * c
}

/// Initial great-circle bearing from point 1 to point 2, degrees in [0, 360)
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Destination point given a start, an initial bearing (degrees) and a
/// distance in nautical miles. Returns (lat, lon) in degrees.
pub fn destination_point(lat: f64, lon: f64, bearing_deg: f64, distance_nm: f64) -> (f64, f64) {
    let delta = distance_nm / EARTH_RADIUS_NM;
    let theta = bearing_deg.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    let lon2 = (lambda2.to_degrees() + 540.0) % 360.0 - 180.0;
    (phi2.to_degrees(), lon2)
}

/// Signed cross-track distance in nautical miles of a point from the
/// great-circle path that starts at (`start_lat`, `start_lon`) with initial
/// bearing `path_bearing_deg`. Positive means right of the path.
pub fn cross_track_distance_nm(
    start_lat: f64,
    start_lon: f64,
    path_bearing_deg: f64,
    point_lat: f64,
    point_lon: f64,
) -> f64 {
    let d13 = haversine_distance_nm(start_lat, start_lon, point_lat, point_lon) / EARTH_RADIUS_NM;
    let theta13 = initial_bearing(start_lat, start_lon, point_lat, point_lon).to_radians();
    let theta12 = path_bearing_deg.to_radians();

    (d13.sin() * (theta13 - theta12).sin()).asin() * EARTH_RADIUS_NM
}

/// Smallest absolute difference between two angles in degrees, result in [0, 180]
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// Meters to feet
pub fn meters_to_feet(m: f64) -> f64 {
    m * FEET_PER_METER
}

/// Meters/second to knots
pub fn mps_to_knots(mps: f64) -> f64 {
    mps * KNOTS_PER_MPS
}

/// Meters/second to feet/minute
pub fn mps_to_fpm(mps: f64) -> f64 {
    mps * FPM_PER_MPS
}

#[cfg(test)]
mod tests {
    use super::*;

    // CYYZ threshold 05 to threshold 23, roughly 1.7 NM apart
    const THR_05: (f64, f64) = (43.66559, -79.64323);
    const THR_23: (f64, f64) = (43.68472, -79.61850);

    #[test]
    fn haversine_known_distance() {
        // JFK to LHR is about 2,990 NM
        let d = haversine_distance_nm(40.6413, -73.7781, 51.4700, -0.4543);
        assert!((d - 2990.0).abs() < 20.0, "got {d}");
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let d = haversine_distance_nm(43.6, -79.6, 43.6, -79.6);
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn bearing_due_north() {
        let b = initial_bearing(43.0, -79.0, 44.0, -79.0);
        assert!(b < 0.5 || b > 359.5, "got {b}");
    }

    #[test]
    fn bearing_due_east_at_equator() {
        let b = initial_bearing(0.0, 0.0, 0.0, 1.0);
        assert!((b - 90.0).abs() < 0.5, "got {b}");
    }

    #[test]
    fn runway_heading_from_thresholds() {
        let b = initial_bearing(THR_05.0, THR_05.1, THR_23.0, THR_23.1);
        // Runway 05 magnetic ~057, true heading ~043 at Toronto
        assert!((b - 43.0).abs() < 3.0, "got {b}");
    }

    #[test]
    fn destination_point_round_trip() {
        let (lat, lon) = destination_point(43.6777, -79.6248, 90.0, 10.0);
        let d = haversine_distance_nm(43.6777, -79.6248, lat, lon);
        assert!((d - 10.0).abs() < 0.01, "got {d}");
        let b = initial_bearing(43.6777, -79.6248, lat, lon);
        assert!((b - 90.0).abs() < 1.0, "got {b}");
    }

    #[test]
    fn cross_track_on_path_is_zero() {
        let (lat, lon) = destination_point(43.6777, -79.6248, 240.0, 5.0);
        let xt = cross_track_distance_nm(43.6777, -79.6248, 240.0, lat, lon);
        assert!(xt.abs() < 0.01, "got {xt}");
    }

    #[test]
    fn cross_track_sign_and_magnitude() {
        // Point 1 NM right of a due-north path
        let (lat, lon) = destination_point(43.0, -79.0, 90.0, 1.0);
        let xt = cross_track_distance_nm(43.0, -79.0, 0.0, lat, lon);
        assert!((xt - 1.0).abs() < 0.05, "got {xt}");
    }

    #[test]
    fn angular_difference_wraps() {
        assert_eq!(angular_difference(350.0, 10.0), 20.0);
        assert_eq!(angular_difference(10.0, 350.0), 20.0);
        assert_eq!(angular_difference(180.0, 0.0), 180.0);
        assert_eq!(angular_difference(90.0, 90.0), 0.0);
    }

    #[test]
    fn unit_conversions() {
        assert!((meters_to_feet(1000.0) - 3280.84).abs() < 0.01);
        assert!((mps_to_knots(10.0) - 19.43844).abs() < 0.0001);
        assert!((mps_to_fpm(5.0) - 984.25).abs() < 0.01);
    }
}
