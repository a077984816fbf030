//! Astronomical sunrise/sunset computation (NOAA solar equations).
//!
//! Uses the NOAA General Solar Position Calculations with the standard
//! refraction-corrected zenith of 90.833°. Accuracy is within a couple of
//! minutes for the latitudes a building sits at, which is far below the
//! minute-granular offsets applied by the trigger scheduler.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Refraction-corrected solar zenith for official sunrise/sunset, degrees.
const ZENITH_DEG: f64 = 90.833;

/// Geographic position used for the ephemeris.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoLocation {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

/// Sunrise and sunset instants for one calendar day at one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub date: NaiveDate,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

impl SunTimes {
    /// Compute sunrise/sunset for `date` at `location`.
    ///
    /// Returns `None` during polar day or polar night, when the sun never
    /// crosses the horizon.
    #[must_use]
    pub fn compute(date: NaiveDate, location: GeoLocation) -> Option<Self> {
        let noon_utc = date.and_hms_opt(12, 0, 0)?.and_utc();
        let julian_day = noon_utc.timestamp() as f64 / 86_400.0 + 2_440_587.5;
        let t = (julian_day - 2_451_545.0) / 36_525.0;

        let mean_long = (280.466_46 + t * (36_000.769_83 + t * 0.000_303_2)).rem_euclid(360.0);
        let mean_anom = 357.529_11 + t * (35_999.050_29 - 0.000_153_7 * t);
        let eccentricity = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

        let m_rad = mean_anom.to_radians();
        let eq_of_center = m_rad.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
            + (2.0 * m_rad).sin() * (0.019_993 - 0.000_101 * t)
            + (3.0 * m_rad).sin() * 0.000_289;

        let true_long = mean_long + eq_of_center;
        let omega = (125.04 - 1_934.136 * t).to_radians();
        let apparent_long = true_long - 0.005_69 - 0.004_78 * omega.sin();

        let mean_obliquity =
            23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.000_59 - t * 0.001_813))) / 60.0) / 60.0;
        let obliquity = (mean_obliquity + 0.002_56 * omega.cos()).to_radians();

        let declination = (obliquity.sin() * apparent_long.to_radians().sin()).asin();

        let y = (obliquity / 2.0).tan().powi(2);
        let l0_rad = mean_long.to_radians();
        let eq_of_time_min = 4.0
            * (y * (2.0 * l0_rad).sin() - 2.0 * eccentricity * m_rad.sin()
                + 4.0 * eccentricity * y * m_rad.sin() * (2.0 * l0_rad).cos()
                - 0.5 * y * y * (4.0 * l0_rad).sin()
                - 1.25 * eccentricity * eccentricity * (2.0 * m_rad).sin())
            .to_degrees();

        let lat_rad = location.latitude.to_radians();
        let cos_hour_angle = (ZENITH_DEG.to_radians().cos()
            - lat_rad.sin() * declination.sin())
            / (lat_rad.cos() * declination.cos());
        if !(-1.0..=1.0).contains(&cos_hour_angle) {
            // Polar day or polar night.
            return None;
        }
        let hour_angle_deg = cos_hour_angle.acos().to_degrees();

        let solar_noon_min = 720.0 - 4.0 * location.longitude - eq_of_time_min;
        let sunrise_min = solar_noon_min - 4.0 * hour_angle_deg;
        let sunset_min = solar_noon_min + 4.0 * hour_angle_deg;

        let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
        let at = |minutes: f64| -> DateTime<Utc> {
            midnight + TimeDelta::seconds((minutes * 60.0).round() as i64)
        };

        Some(Self {
            date,
            sunrise: at(sunrise_min),
            sunset: at(sunset_min),
        })
    }

    /// Whether both of the day's sun events are already in the past.
    #[must_use]
    pub fn is_over(&self, now: DateTime<Utc>) -> bool {
        now > self.sunrise && now > self.sunset
    }
}
