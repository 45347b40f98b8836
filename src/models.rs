use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type UserId = u64;
pub type ActivityId = u64;
pub type AuthToken = String;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Partition {
    ActivityWeather,
    ProcessedActivities,
    TokenToUser,
    UserSettings,
    ApiLimits,
}

impl Partition {
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::ActivityWeather => "activityWeather",
            Partition::ProcessedActivities => "processedActivities",
            Partition::TokenToUser => "tokenToUser",
            Partition::UserSettings => "userSettings",
            Partition::ApiLimits => "apiLimits",
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherUnits {
    #[default]
    Both,
    Imperial,
    Metric,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeatherFieldSettings {
    pub summary: bool,
    pub temperature: bool,
    pub apparent_temperature: bool,
    pub precip_intensity: bool,
    pub precip_type: bool,
    pub precip_probability: bool,
    pub uv_index: bool,
    pub humidity: bool,
    pub dew_point: bool,
    pub wind_speed: bool,
    pub wind_bearing: bool,
    pub wind_gust: bool,
    pub pressure: bool,
    pub cloud_cover: bool,
    pub visibility: bool,
    pub ozone: bool,
    pub link: bool,
}

impl Default for WeatherFieldSettings {
    fn default() -> Self {
        Self {
            summary: true,
            temperature: true,
            apparent_temperature: true,
            precip_intensity: true,
            precip_type: true,
            precip_probability: true,
            uv_index: true,
            humidity: true,
            dew_point: false,
            wind_speed: true,
            wind_bearing: true,
            wind_gust: true,
            pressure: false,
            cloud_cover: false,
            visibility: false,
            ozone: false,
            link: true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub auto_update: bool,
    pub ignore_virtual_activities: bool,
    pub weather_units: WeatherUnits,
    pub weather_fields: WeatherFieldSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            auto_update: false,
            ignore_virtual_activities: true,
            weather_units: WeatherUnits::default(),
            weather_fields: WeatherFieldSettings::default(),
        }
    }
}

impl UserSettings {
    /// Applies a partial settings document on top of these settings. Nested objects are merged
    /// key by key rather than replaced.
    pub fn merged_with(&self, patch: &Value) -> Result<Self> {
        if !patch.is_object() {
            anyhow::bail!("settings must be a JSON object");
        }
        let mut base = serde_json::to_value(self)?;
        merge_json(&mut base, patch);
        serde_json::from_value(base).context("invalid settings")
    }
}

fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Last known usage of the Strava and DarkSky quotas. Every field is optional: an unknown value
/// never counts as a reached limit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strava_short_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strava_daily_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strava_short_usage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strava_daily_usage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub darksky_usage: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub strava_short_reset: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub strava_daily_reset: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub dark_sky_reset: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_settings_fill_from_defaults() -> Result<()> {
        let settings: UserSettings = serde_json::from_value(json!({
            "autoUpdate": true,
            "weatherFields": { "ozone": true }
        }))?;

        assert!(settings.auto_update);
        assert!(settings.ignore_virtual_activities);
        assert!(settings.weather_fields.ozone);
        assert!(settings.weather_fields.summary);
        assert_eq!(settings.weather_units, WeatherUnits::Both);

        Ok(())
    }

    #[test]
    fn test_settings_serialize_camel_case() -> Result<()> {
        let value = serde_json::to_value(UserSettings::default())?;
        assert_eq!(value["autoUpdate"], false);
        assert_eq!(value["weatherUnits"], "both");
        assert_eq!(value["weatherFields"]["apparentTemperature"], true);
        Ok(())
    }

    #[test]
    fn test_merged_with_keeps_nested_fields() -> Result<()> {
        let stored = UserSettings {
            weather_units: WeatherUnits::Metric,
            ..UserSettings::default()
        };

        let merged = stored.merged_with(&json!({ "weatherFields": { "summary": false } }))?;

        assert_eq!(merged.weather_units, WeatherUnits::Metric);
        assert!(!merged.weather_fields.summary);
        assert!(merged.weather_fields.temperature);
        Ok(())
    }

    #[test]
    fn test_merged_with_rejects_bad_values() {
        let result = UserSettings::default().merged_with(&json!({ "weatherUnits": "kelvin" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_merged_with_rejects_non_object() {
        assert!(UserSettings::default().merged_with(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_api_limits_millisecond_resets() -> Result<()> {
        let limits: ApiLimits = serde_json::from_value(json!({
            "stravaShortLimit": 600,
            "darkSkyReset": 1_546_300_800_000i64
        }))?;

        assert_eq!(limits.strava_short_limit, Some(600));
        assert_eq!(
            limits.dark_sky_reset.map(|reset| reset.timestamp()),
            Some(1_546_300_800)
        );
        assert_eq!(
            serde_json::to_value(&limits)?,
            json!({ "stravaShortLimit": 600, "darkSkyReset": 1_546_300_800_000i64 })
        );
        Ok(())
    }

    #[test]
    fn test_partition_names() {
        assert_eq!(Partition::TokenToUser.to_string(), "tokenToUser");
        assert_eq!(Partition::ActivityWeather.as_str(), "activityWeather");
    }
}
