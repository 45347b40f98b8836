use serde::{Deserialize, Serialize};

use crate::models::{UserSettings, WeatherFieldSettings, WeatherUnits};
use crate::units::{
    bearing_to_string, ozone_to_string, percent_to_string, pressure_to_string,
    rain_intensity_to_string, speed_to_string, temp_to_string, visibility_to_snow_intensity_string,
    visibility_to_string,
};

pub const WEATHER_SUMMARY_MARKER: &str = "Weather Summary";
pub const LINK: &str = "www.stravaweather.net";

/// Apparent temperature is only worth mentioning past this spread, in Fahrenheit.
const FELT_LIKE_THRESHOLD: f64 = 10.0;
const GUST_THRESHOLD: f64 = 5.0;
const UV_INDEX_THRESHOLD: f64 = 7.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecipType {
    Rain,
    Snow,
    Sleet,
}

impl PrecipType {
    fn as_str(self) -> &'static str {
        match self {
            PrecipType::Rain => "rain",
            PrecipType::Snow => "snow",
            PrecipType::Sleet => "sleet",
        }
    }
}

/// DarkSky `currently` data point, requested in `us` units.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub summary: String,
    pub temperature: f64,
    pub apparent_temperature: f64,
    pub wind_speed: f64,
    pub wind_gust: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_bearing: Option<f64>,
    pub humidity: f64,
    pub dew_point: f64,
    pub pressure: f64,
    pub cloud_cover: f64,
    pub visibility: f64,
    pub ozone: f64,
    pub uv_index: f64,
    pub precip_probability: f64,
    pub precip_intensity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precip_type: Option<PrecipType>,
}

fn precipitation_string(
    weather: &WeatherSnapshot,
    fields: &WeatherFieldSettings,
) -> Option<String> {
    if weather.precip_intensity == 0.0 {
        return None;
    }

    let mut parts = Vec::new();

    if fields.precip_intensity {
        let intensity = match weather.precip_type {
            Some(PrecipType::Rain | PrecipType::Sleet) => {
                rain_intensity_to_string(weather.precip_intensity)
            }
            Some(PrecipType::Snow) => visibility_to_snow_intensity_string(weather.visibility),
            None => "",
        };
        parts.push(intensity.to_owned());
    }

    if fields.precip_type {
        if let Some(precip_type) = weather.precip_type {
            parts.push(precip_type.as_str().to_owned());
        }
    }

    if fields.precip_probability && weather.precip_probability != 0.0 {
        parts.push(format!("({})", percent_to_string(weather.precip_probability)));
    }

    let joined = parts.join(" ");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn wind_string(
    weather: &WeatherSnapshot,
    fields: &WeatherFieldSettings,
    units: WeatherUnits,
) -> Option<String> {
    let speed = if fields.wind_speed {
        speed_to_string(weather.wind_speed, units)
    } else {
        String::new()
    };

    let bearing = match weather.wind_bearing {
        Some(bearing) if fields.wind_bearing => bearing_to_string(bearing),
        _ => "",
    };

    let wind = format!("{bearing} {speed}");
    let trimmed = wind.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Renders the enabled weather fields one per line.
pub fn description_from_weather(weather: &WeatherSnapshot, settings: &UserSettings) -> String {
    let fields = &settings.weather_fields;
    let units = settings.weather_units;
    let mut lines = Vec::new();

    if fields.summary {
        lines.push(format!("{WEATHER_SUMMARY_MARKER}: {}", weather.summary));
    }

    if fields.temperature {
        lines.push(format!("Temperature: {}", temp_to_string(weather.temperature, units)));
    }

    if fields.apparent_temperature
        && (weather.apparent_temperature - weather.temperature).abs() > FELT_LIKE_THRESHOLD
    {
        lines.push(format!(
            "Felt Like: {}",
            temp_to_string(weather.apparent_temperature, units)
        ));
    }

    if let Some(precipitation) = precipitation_string(weather, fields) {
        lines.push(format!("Precipitation: {precipitation}"));
    }

    if fields.uv_index && weather.uv_index >= UV_INDEX_THRESHOLD {
        lines.push(format!("UV Index: {}", weather.uv_index));
    }

    if fields.humidity {
        lines.push(format!("Humidity: {}", percent_to_string(weather.humidity)));
    }

    if fields.dew_point {
        lines.push(format!("Dew Point: {}", temp_to_string(weather.dew_point, units)));
    }

    if let Some(wind) = wind_string(weather, fields, units) {
        lines.push(format!("Wind: {wind}"));
    }

    // Gusts below the sustained wind speed are noise
    if fields.wind_gust && weather.wind_gust - weather.wind_speed > GUST_THRESHOLD {
        lines.push(format!("Gusts up to: {}", speed_to_string(weather.wind_gust, units)));
    }

    if fields.pressure {
        lines.push(format!("Pressure: {}", pressure_to_string(weather.pressure, units)));
    }

    if fields.cloud_cover {
        lines.push(format!("Cloud Cover: {}", percent_to_string(weather.cloud_cover)));
    }

    if fields.visibility {
        lines.push(format!(
            "Visibility: {}",
            visibility_to_string(weather.visibility, units)
        ));
    }

    if fields.ozone {
        lines.push(format!("Ozone: {} DU", ozone_to_string(weather.ozone)));
    }

    if fields.link {
        lines.push(LINK.to_owned());
    }

    lines.join("\n")
}

/// Appends the weather block to an existing description, unless one is already there.
pub fn description_with_weather(
    existing: Option<&str>,
    weather: &WeatherSnapshot,
    settings: &UserSettings,
) -> String {
    if let Some(existing) = existing {
        if existing.contains(WEATHER_SUMMARY_MARKER) {
            return existing.to_owned();
        }
    }

    let weather_description = description_from_weather(weather, settings);
    [existing.unwrap_or_default(), weather_description.as_str()]
        .join("\n\n")
        .trim()
        .to_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    const EXAMPLE_FORECAST_RESPONSE: &str = include_str!("../tests/fixtures/forecast.json");

    fn snapshot() -> WeatherSnapshot {
        WeatherSnapshot {
            summary: "Partly Cloudy".to_owned(),
            temperature: 72.0,
            apparent_temperature: 73.0,
            wind_speed: 10.0,
            wind_gust: 12.0,
            wind_bearing: Some(180.0),
            humidity: 0.5,
            dew_point: 50.0,
            pressure: 1013.25,
            cloud_cover: 0.25,
            visibility: 10.0,
            ozone: 300.4,
            uv_index: 3.0,
            precip_probability: 0.0,
            precip_intensity: 0.0,
            precip_type: None,
        }
    }

    fn only(fields: WeatherFieldSettings) -> UserSettings {
        UserSettings {
            weather_fields: fields,
            ..UserSettings::default()
        }
    }

    fn no_fields() -> WeatherFieldSettings {
        WeatherFieldSettings {
            summary: false,
            temperature: false,
            apparent_temperature: false,
            precip_intensity: false,
            precip_type: false,
            precip_probability: false,
            uv_index: false,
            humidity: false,
            dew_point: false,
            wind_speed: false,
            wind_bearing: false,
            wind_gust: false,
            pressure: false,
            cloud_cover: false,
            visibility: false,
            ozone: false,
            link: false,
        }
    }

    #[test]
    fn test_deserialize_forecast() -> anyhow::Result<()> {
        let forecast: crate::darksky::Forecast = serde_json::from_str(EXAMPLE_FORECAST_RESPONSE)?;
        let currently = forecast.currently.expect("currently");
        assert_eq!(currently.summary, "Light Rain");
        assert_eq!(currently.precip_type, Some(PrecipType::Rain));
        Ok(())
    }

    #[test]
    fn test_default_description() {
        let description = description_from_weather(&snapshot(), &UserSettings::default());
        assert_eq!(
            description,
            "Weather Summary: Partly Cloudy\n\
             Temperature: 72°F (22°C)\n\
             Humidity: 50%\n\
             Wind: S 10 mph (4 m/s)\n\
             www.stravaweather.net"
        );
    }

    #[test]
    fn test_felt_like_shown_past_threshold() {
        let weather = WeatherSnapshot {
            apparent_temperature: 85.0,
            ..snapshot()
        };
        let settings = only(WeatherFieldSettings {
            apparent_temperature: true,
            ..no_fields()
        });
        assert_eq!(
            description_from_weather(&weather, &settings),
            "Felt Like: 85°F (29°C)"
        );
    }

    #[test]
    fn test_felt_like_hidden_within_threshold() {
        let settings = only(WeatherFieldSettings {
            apparent_temperature: true,
            ..no_fields()
        });
        assert_eq!(description_from_weather(&snapshot(), &settings), "");
    }

    #[test]
    fn test_rain_precipitation() {
        let weather = WeatherSnapshot {
            precip_intensity: 0.05,
            precip_probability: 0.8,
            precip_type: Some(PrecipType::Rain),
            ..snapshot()
        };
        let settings = only(WeatherFieldSettings {
            precip_intensity: true,
            precip_type: true,
            precip_probability: true,
            ..no_fields()
        });
        assert_eq!(
            description_from_weather(&weather, &settings),
            "Precipitation: light rain (80%)"
        );
    }

    #[test]
    fn test_snow_precipitation_uses_visibility() {
        let weather = WeatherSnapshot {
            precip_intensity: 0.05,
            precip_type: Some(PrecipType::Snow),
            visibility: 0.2,
            ..snapshot()
        };
        let settings = only(WeatherFieldSettings {
            precip_intensity: true,
            precip_type: true,
            precip_probability: true,
            ..no_fields()
        });
        assert_eq!(
            description_from_weather(&weather, &settings),
            "Precipitation: heavy snow"
        );
    }

    #[test]
    fn test_no_precipitation_line_without_intensity() {
        let weather = WeatherSnapshot {
            precip_probability: 0.3,
            precip_type: Some(PrecipType::Rain),
            ..snapshot()
        };
        let settings = only(WeatherFieldSettings {
            precip_type: true,
            precip_probability: true,
            ..no_fields()
        });
        assert_eq!(description_from_weather(&weather, &settings), "");
    }

    #[test]
    fn test_uv_index_threshold() {
        let settings = only(WeatherFieldSettings {
            uv_index: true,
            ..no_fields()
        });
        assert_eq!(description_from_weather(&snapshot(), &settings), "");

        let weather = WeatherSnapshot {
            uv_index: 8.0,
            ..snapshot()
        };
        assert_eq!(description_from_weather(&weather, &settings), "UV Index: 8");
    }

    #[test]
    fn test_wind_without_bearing() {
        let weather = WeatherSnapshot {
            wind_bearing: None,
            ..snapshot()
        };
        let settings = UserSettings {
            weather_units: WeatherUnits::Imperial,
            weather_fields: WeatherFieldSettings {
                wind_speed: true,
                wind_bearing: true,
                ..no_fields()
            },
            ..UserSettings::default()
        };
        assert_eq!(description_from_weather(&weather, &settings), "Wind: 10 mph");
    }

    #[test]
    fn test_wind_bearing_only() {
        let settings = only(WeatherFieldSettings {
            wind_bearing: true,
            ..no_fields()
        });
        assert_eq!(description_from_weather(&snapshot(), &settings), "Wind: S");
    }

    #[test]
    fn test_gusts_over_wind_speed() {
        let weather = WeatherSnapshot {
            wind_gust: 25.0,
            ..snapshot()
        };
        let settings = UserSettings {
            weather_units: WeatherUnits::Metric,
            weather_fields: WeatherFieldSettings {
                wind_gust: true,
                ..no_fields()
            },
            ..UserSettings::default()
        };
        assert_eq!(
            description_from_weather(&weather, &settings),
            "Gusts up to: 11 m/s"
        );

        assert_eq!(description_from_weather(&snapshot(), &settings), "");
    }

    #[test]
    fn test_optional_fields() {
        let settings = only(WeatherFieldSettings {
            dew_point: true,
            pressure: true,
            cloud_cover: true,
            visibility: true,
            ozone: true,
            ..no_fields()
        });
        assert_eq!(
            description_from_weather(&snapshot(), &settings),
            "Dew Point: 50°F (10°C)\n\
             Pressure: 29.92 inHg (1013 mb)\n\
             Cloud Cover: 25%\n\
             Visibility: 10 mi (16 km)\n\
             Ozone: 300 DU"
        );
    }

    #[test]
    fn test_description_with_weather_appends() {
        let settings = only(WeatherFieldSettings {
            summary: true,
            ..no_fields()
        });
        assert_eq!(
            description_with_weather(Some("Morning loop"), &snapshot(), &settings),
            "Morning loop\n\nWeather Summary: Partly Cloudy"
        );
    }

    #[test]
    fn test_description_with_weather_no_existing() {
        let settings = only(WeatherFieldSettings {
            summary: true,
            ..no_fields()
        });
        assert_eq!(
            description_with_weather(None, &snapshot(), &settings),
            "Weather Summary: Partly Cloudy"
        );
        assert_eq!(
            description_with_weather(Some(""), &snapshot(), &settings),
            "Weather Summary: Partly Cloudy"
        );
    }

    #[test]
    fn test_description_with_weather_already_present() {
        let existing = "Ride\n\nWeather Summary: Clear";
        assert_eq!(
            description_with_weather(Some(existing), &snapshot(), &UserSettings::default()),
            existing
        );
    }
}
