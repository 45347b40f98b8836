//! Unit conversion and display helpers for weather values. Inputs are always in DarkSky's `us`
//! units: Fahrenheit, mph, miles, millibars and inches per hour.

use crate::models::WeatherUnits;

const MPH_TO_METERS_PER_SECOND: f64 = 0.44704;
const MILLIBAR_TO_INCHES_OF_MERCURY: f64 = 0.02953;
const MILE_TO_KILOMETER: f64 = 1.609344;

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Rounds half away from zero and prints exactly `decimals` places.
pub fn rounded(value: f64, decimals: usize) -> String {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    // Avoid "-0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.decimals$}")
}

pub fn fahrenheit_to_celsius(temp: f64) -> f64 {
    (temp - 32.0) * (5.0 / 9.0)
}

fn paired(units: WeatherUnits, imperial: String, metric: String) -> String {
    match units {
        WeatherUnits::Both => format!("{imperial} ({metric})"),
        WeatherUnits::Imperial => imperial,
        WeatherUnits::Metric => metric,
    }
}

pub fn temp_to_string(temp: f64, units: WeatherUnits) -> String {
    paired(
        units,
        format!("{}°F", rounded(temp, 0)),
        format!("{}°C", rounded(fahrenheit_to_celsius(temp), 0)),
    )
}

pub fn speed_to_string(speed: f64, units: WeatherUnits) -> String {
    paired(
        units,
        format!("{} mph", rounded(speed, 0)),
        format!("{} m/s", rounded(speed * MPH_TO_METERS_PER_SECOND, 0)),
    )
}

pub fn pressure_to_string(pressure: f64, units: WeatherUnits) -> String {
    paired(
        units,
        format!("{} inHg", rounded(pressure * MILLIBAR_TO_INCHES_OF_MERCURY, 2)),
        format!("{} mb", rounded(pressure, 0)),
    )
}

pub fn visibility_to_string(visibility: f64, units: WeatherUnits) -> String {
    paired(
        units,
        format!("{} mi", rounded(visibility, 0)),
        format!("{} km", rounded(visibility * MILE_TO_KILOMETER, 0)),
    )
}

pub fn percent_to_string(fraction: f64) -> String {
    format!("{}%", rounded(fraction * 100.0, 0))
}

pub fn ozone_to_string(ozone: f64) -> String {
    rounded(ozone, 0)
}

/// 16-point compass direction the wind is blowing from.
pub fn bearing_to_string(bearing: f64) -> &'static str {
    let normalized = bearing.rem_euclid(360.0);
    let index = ((normalized / 22.5).round() as usize) % COMPASS_POINTS.len();
    COMPASS_POINTS[index]
}

pub fn rain_intensity_to_string(inches_per_hour: f64) -> &'static str {
    match inches_per_hour {
        i if i < 0.017 => "very light",
        i if i < 0.1 => "light",
        i if i < 0.4 => "moderate",
        _ => "heavy",
    }
}

/// Snowfall rate is graded by visibility, in miles.
pub fn visibility_to_snow_intensity_string(visibility: f64) -> &'static str {
    match visibility {
        v if v >= 0.62 => "light",
        v if v >= 0.31 => "moderate",
        _ => "heavy",
    }
}
