use anyhow::Result;
use chrono::Utc;
use lambda_http::Request;
use lambda_http::http::Method;
use log::{debug, info, warn};

use crate::api_status::{ApiStatus, RateHeaders, new_api_limits};
use crate::darksky::DarkSkyClient;
use crate::events::EventQueue;
use crate::handlers::{App, parse_id, required_param};
use crate::models::{ActivityId, ApiLimits};
use crate::response::{ApiError, HandlerResult, ok_text};
use crate::store::TableStore;
use crate::strava::{Activity, RateLimited};
use crate::weather::{WeatherSnapshot, description_with_weather};

/// Running tally of API quota for the duration of one request.
struct Meter {
    limits: ApiLimits,
    darksky_limit: Option<u32>,
}

impl Meter {
    fn record(&mut self, rate: &RateHeaders) {
        self.limits = new_api_limits(&self.limits, rate, Utc::now());
    }

    fn status(&self) -> ApiStatus<'_> {
        ApiStatus::new(&self.limits, self.darksky_limit, Utc::now())
    }

    fn rate_limited(&self) -> ApiError {
        ApiError::RateLimited {
            api_limits: self.limits.clone(),
            retry_after_seconds: self.status().seconds_until_apis_available(),
        }
    }

    fn into_error(mut self, err: anyhow::Error) -> ApiError {
        match err.downcast_ref::<RateLimited>() {
            Some(limited) => {
                warn!("{limited}");
                self.record(&limited.rate);
                self.rate_limited()
            }
            None => ApiError::exception("Error in get-description-with-weather")(err),
        }
    }
}

async fn fetch_weather(
    darksky: &DarkSkyClient,
    activity: &Activity,
    meter: &mut Meter,
) -> Result<Option<WeatherSnapshot>> {
    let Some((latitude, longitude)) = activity.start_location() else {
        info!("Activity {} has no start location", activity.id);
        return Ok(None);
    };

    let snapshot = darksky
        .weather_snapshot(latitude, longitude, activity.start_date)
        .await?;
    meter.record(&snapshot.rate);
    Ok(snapshot.value)
}

async fn describe<S: TableStore, Q>(
    app: &App<S, Q>,
    darksky: &DarkSkyClient,
    token: &str,
    activity_id: ActivityId,
    post: bool,
    meter: &mut Meter,
) -> Result<String> {
    let activity = app.strava.activity(token, activity_id).await?;
    meter.record(&activity.rate);
    let activity = activity.value;
    let existing = activity.description.clone().unwrap_or_default();

    let settings = app
        .data
        .user_settings(activity.athlete.id)
        .await?
        .unwrap_or_default();

    if settings.ignore_virtual_activities && activity.is_virtual() {
        info!("Ignoring virtual activity {activity_id}");
        return Ok(existing);
    }

    let weather = match app.data.weather_for_activity(activity_id).await? {
        Some(weather) => {
            debug!("Using cached weather for activity {activity_id}");
            weather
        }
        None => match fetch_weather(darksky, &activity, meter).await? {
            Some(weather) => {
                app.data
                    .store_weather_for_activity(activity_id, &weather)
                    .await?;
                weather
            }
            None => {
                info!("No weather available for activity {activity_id}");
                return Ok(existing);
            }
        },
    };

    let description =
        description_with_weather(activity.description.as_deref(), &weather, &settings);

    if post {
        let update = app
            .strava
            .update_description(token, activity_id, &description)
            .await?;
        meter.record(&update.rate);
        info!("Updated description of activity {activity_id}");

        if !app.data.is_processed(activity_id).await? {
            app.data
                .store_processed_activity(activity_id, activity.athlete.id)
                .await?;
        }
    }

    Ok(description)
}

/// Builds the weather-annotated description of an activity. A POST also writes it back to
/// Strava. Requests are turned away with 429 while either API's quota is exhausted.
pub async fn run<S: TableStore, Q: EventQueue>(
    app: &App<S, Q>,
    req: &Request,
    raw_activity_id: &str,
) -> HandlerResult {
    let token = required_param(req, "token")?;
    let activity_id = parse_id(raw_activity_id, "activityid")?;
    let darksky = app
        .darksky
        .as_ref()
        .ok_or(ApiError::Configuration("DARK_SKY_API_KEY"))?;
    let post = req.method() == Method::POST;

    let mut meter = Meter {
        limits: app
            .data
            .api_limits()
            .await
            .map_err(ApiError::exception("Error loading API limits"))?,
        darksky_limit: app.config.dark_sky_api_limit,
    };

    if meter.status().limit_reached() {
        return Err(meter.rate_limited());
    }

    let result = describe(app, darksky, &token, activity_id, post, &mut meter).await;

    if let Err(e) = app.data.store_api_limits(&meter.limits).await {
        warn!("Failed to store API limits: {e:#}");
    }

    match result {
        Ok(description) => ok_text(description),
        Err(e) => Err(meter.into_error(e)),
    }
}
