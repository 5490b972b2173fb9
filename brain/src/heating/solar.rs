use std::f64::consts::PI;

use serde::Deserialize;

use crate::core::time::DateTime;

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SunPosition {
    pub elevation_deg: f64,
    /// Degrees from north, clockwise.
    pub azimuth_deg: f64,
}

/// NOAA solar position: fractional year, equation of time, declination, hour
/// angle, then elevation/azimuth.
pub fn sun_position(at: DateTime, location: &Location) -> SunPosition {
    let (year, month, day, hour) = at.to_utc_date_hour();

    let days_in_month = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let is_leap_year = (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0);

    let mut day_of_year: i32 = days_in_month.iter().take((month - 1) as usize).sum();
    day_of_year += day as i32;
    if is_leap_year && month > 2 {
        day_of_year += 1;
    }
    let days_in_year = if is_leap_year { 366.0 } else { 365.0 };

    let gamma = 2.0 * PI * (day_of_year as f64 - 1.0 + (hour - 12.0) / 24.0) / days_in_year;

    let eqtime_minutes = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());

    let decl_rad = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    let time_offset_minutes = eqtime_minutes + 4.0 * location.longitude;
    let tst_minutes = hour * 60.0 + time_offset_minutes;
    let ha_rad = (tst_minutes / 4.0 - 180.0).to_radians();

    let lat_rad = location.latitude.to_radians();

    let cos_zenith = lat_rad.sin() * decl_rad.sin() + lat_rad.cos() * decl_rad.cos() * ha_rad.cos();
    let zenith_deg = cos_zenith.clamp(-1.0, 1.0).acos().to_degrees();

    let azimuth_deg = (ha_rad.sin())
        .atan2(ha_rad.cos() * lat_rad.sin() - decl_rad.tan() * lat_rad.cos())
        .to_degrees()
        + 180.0;

    SunPosition {
        elevation_deg: 90.0 - zenith_deg,
        azimuth_deg: azimuth_deg.rem_euclid(360.0),
    }
}

/// Clear-sky maximum radiation for a given solar elevation, W/m².
pub fn clear_sky_radiation(elevation_deg: f64) -> f64 {
    (990.0 * elevation_deg.to_radians().sin() - 30.0).max(0.0)
}

/// Fraction of the clear-sky radiation that passes the cloud layer.
/// Cloud cover in octas, clamped to [0, 8].
pub fn cloud_cover_factor(cloud_cover: f64) -> f64 {
    let octas = cloud_cover.clamp(0.0, 8.0);
    1.0 - 0.75 * (octas / 8.0).powf(3.4)
}

/// Effective solar radiation on the south and west facades, W/m².
#[derive(Debug, Clone)]
pub struct SunRadiation {
    pub south: f64,
    pub west: f64,
    pub debug: String,
}

impl SunRadiation {
    pub fn at(time: DateTime, cloud_cover: f64, location: &Location) -> Self {
        let position = sun_position(time, location);
        let radiation = clear_sky_radiation(position.elevation_deg) * cloud_cover_factor(cloud_cover);

        let south = facade_radiation(radiation, &position, 180.0);
        let west = facade_radiation(radiation, &position, 270.0);

        let debug = format!(
            "Sun {:.1}° elevation, {:.1}° azimuth, {:.1} octas, {:.1} W/m² south, {:.1} W/m² west",
            position.elevation_deg, position.azimuth_deg, cloud_cover, south, west
        );

        Self { south, west, debug }
    }
}

/// Projection of the horizontal-plane radiation onto a vertical facade.
fn facade_radiation(radiation: f64, position: &SunPosition, facade_azimuth_deg: f64) -> f64 {
    if position.elevation_deg <= 0.0 || radiation <= 0.0 {
        return 0.0;
    }

    let incidence = position.elevation_deg.to_radians().cos()
        * (position.azimuth_deg - facade_azimuth_deg).to_radians().cos();

    (radiation * incidence).max(0.0)
}
