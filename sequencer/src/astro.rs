//! Coordinate types and the little bit of astronomy the sequencer needs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Equatorial coordinates (J2000)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Right ascension in hours
    pub ra_hours: f64,
    /// Declination in degrees
    pub dec_degrees: f64,
}

impl Coordinates {
    pub fn new(ra_hours: f64, dec_degrees: f64) -> Self {
        Self { ra_hours, dec_degrees }
    }

    pub fn is_valid(&self) -> bool {
        (0.0..24.0).contains(&self.ra_hours) && (-90.0..=90.0).contains(&self.dec_degrees)
    }
}

/// Observer site
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObserverLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Altitude and azimuth in degrees (azimuth from north through east)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizontal {
    pub altitude: f64,
    pub azimuth: f64,
}

/// Calculate Julian Day from a chrono DateTime
pub fn julian_day(dt: &DateTime<Utc>) -> f64 {
    use chrono::{Datelike, Timelike};
    let (y, m) = if dt.month() <= 2 {
        (dt.year() - 1, dt.month() + 12)
    } else {
        (dt.year(), dt.month())
    };

    let a = y / 100;
    let b = 2 - a + a / 4;

    let jd = (365.25 * (y as f64 + 4716.0)).floor()
        + (30.6001 * (m as f64 + 1.0)).floor()
        + dt.day() as f64
        + b as f64
        - 1524.5;

    let time_fraction =
        (dt.hour() as f64 + dt.minute() as f64 / 60.0 + dt.second() as f64 / 3600.0) / 24.0;

    jd + time_fraction
}

/// Local sidereal time in hours
pub fn local_sidereal_time(jd: f64, longitude: f64) -> f64 {
    let t = (jd - 2451545.0) / 36525.0;

    // Greenwich Mean Sidereal Time in degrees
    let gmst = 280.46061837 + 360.98564736629 * (jd - 2451545.0) + 0.000387933 * t * t
        - t * t * t / 38710000.0;

    let lst = (gmst + longitude) % 360.0;
    if lst < 0.0 {
        (lst + 360.0) / 15.0
    } else {
        lst / 15.0
    }
}

/// Convert equatorial coordinates to altitude / azimuth for a site and time
pub fn to_horizontal(
    coordinates: &Coordinates,
    observer: &ObserverLocation,
    at: &DateTime<Utc>,
) -> Horizontal {
    let lst = local_sidereal_time(julian_day(at), observer.longitude);
    let ha_rad = ((lst - coordinates.ra_hours) * 15.0).to_radians();
    let dec_rad = coordinates.dec_degrees.to_radians();
    let lat_rad = observer.latitude.to_radians();

    let sin_alt = lat_rad.sin() * dec_rad.sin() + lat_rad.cos() * dec_rad.cos() * ha_rad.cos();
    let altitude = sin_alt.clamp(-1.0, 1.0).asin().to_degrees();

    let azimuth = (ha_rad.sin())
        .atan2(ha_rad.cos() * lat_rad.sin() - dec_rad.tan() * lat_rad.cos())
        .to_degrees()
        + 180.0;

    Horizontal {
        altitude,
        azimuth: azimuth.rem_euclid(360.0),
    }
}

/// Smallest angle between two azimuths, in degrees
pub fn azimuth_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_julian_day_j2000() {
        let dt = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((julian_day(&dt) - 2451545.0).abs() < 1e-6);
    }

    #[test]
    fn test_pole_star_altitude_matches_latitude() {
        let polaris = Coordinates::new(2.53, 89.26);
        let site = ObserverLocation {
            latitude: 45.0,
            longitude: 7.0,
        };
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        let horizontal = to_horizontal(&polaris, &site, &dt);
        assert!((horizontal.altitude - 45.0).abs() < 1.0);
    }

    #[test]
    fn test_azimuth_difference_wraps() {
        assert!((azimuth_difference(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((azimuth_difference(90.0, 180.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinates::new(5.5, -5.4).is_valid());
        assert!(!Coordinates::new(24.5, 0.0).is_valid());
        assert!(!Coordinates::new(1.0, 91.0).is_valid());
    }
}
